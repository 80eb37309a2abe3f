// A looping mono buffer read at a fractional playback rate.
//
// Channel 3's wave RAM and channel 4's noise are both fixed recordings; the
// pitch comes from how fast we walk through them, not from their contents.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    pub data: Vec<f32>, // one period (wave RAM) or one second (noise)
}

impl SampleBuffer {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read at a fractional position, wrapping around the end.
    pub fn sample_looped(&self, pos: f64) -> f32 {
        let len = self.data.len();
        if len == 0 {
            return 0.0;
        }
        let pos = pos.rem_euclid(len as f64);
        let i = pos as usize % len;
        let frac = (pos - pos.floor()) as f32;
        let a = self.data[i];
        let b = self.data[(i + 1) % len];
        a * (1.0 - frac) + b * frac
    }

    /// Advance a read head by `rate` samples, keeping it inside the loop.
    pub fn advance(&self, pos: f64, rate: f64) -> f64 {
        let len = self.data.len() as f64;
        if len == 0.0 {
            return 0.0;
        }
        (pos + rate).rem_euclid(len)
    }
}
