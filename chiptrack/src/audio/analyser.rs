use std::f32::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use super::frame::StereoFrame;
use crate::shared::NUM_CHANNELS;

pub const FFT_SIZE: usize = 256;

/// Rolling window of the last `FFT_SIZE` mono samples.
#[derive(Clone, Debug)]
pub struct Analyser {
    ring: [f32; FFT_SIZE],
    pos: usize,
}

impl Default for Analyser {
    fn default() -> Self {
        Self {
            ring: [0.0; FFT_SIZE],
            pos: 0,
        }
    }
}

impl Analyser {
    pub fn push(&mut self, frames: &[StereoFrame]) {
        for f in frames {
            self.ring[self.pos] = f.downmix();
            self.pos = (self.pos + 1) % FFT_SIZE;
        }
    }

    /// Oldest sample first.
    pub fn waveform(&self) -> [f32; FFT_SIZE] {
        std::array::from_fn(|i| self.ring[(self.pos + i) % FFT_SIZE])
    }

    pub fn rms(&self) -> f32 {
        rms(&self.ring)
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Magnitude spectrum (FFT_SIZE / 2 bins) of a Blackman-windowed block.
pub fn spectrum(samples: &[f32; FFT_SIZE]) -> Vec<f32> {
    let mut buf: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| Complex::new(s * blackman(i), 0.0))
        .collect();
    FftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE).process(&mut buf);
    buf.iter()
        .take(FFT_SIZE / 2)
        .map(|c| c.norm() / FFT_SIZE as f32)
        .collect()
}

fn blackman(i: usize) -> f32 {
    let x = 2.0 * PI * i as f32 / FFT_SIZE as f32;
    0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
}

/// What the render thread publishes after every block for the meters.
#[derive(Clone, Debug)]
pub struct MeterSnapshot {
    pub bus_levels: [f32; NUM_CHANNELS], // rms per channel bus, post gain
    pub master_level: f32,
    pub master_waveform: [f32; FFT_SIZE],
}

impl Default for MeterSnapshot {
    fn default() -> Self {
        Self {
            bus_levels: [0.0; NUM_CHANNELS],
            master_level: 0.0,
            master_waveform: [0.0; FFT_SIZE],
        }
    }
}

impl MeterSnapshot {
    pub fn spectrum(&self) -> Vec<f32> {
        spectrum(&self.master_waveform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_the_latest_samples() {
        let mut a = Analyser::default();
        let frames: Vec<StereoFrame> = (0..300).map(|i| StereoFrame::mono(i as f32)).collect();
        a.push(&frames);
        let w = a.waveform();
        assert_eq!(w[0], 44.0);
        assert_eq!(w[FFT_SIZE - 1], 299.0);
    }

    #[test]
    fn rms_of_a_square_is_its_amplitude() {
        let mut a = Analyser::default();
        let frames: Vec<StereoFrame> = (0..FFT_SIZE)
            .map(|i| StereoFrame::mono(if i % 2 == 0 { 0.5 } else { -0.5 }))
            .collect();
        a.push(&frames);
        assert!((a.rms() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn spectrum_peaks_at_the_tone_bin() {
        let bin = 16;
        let samples: [f32; FFT_SIZE] =
            std::array::from_fn(|i| (2.0 * PI * bin as f32 * i as f32 / FFT_SIZE as f32).sin());
        let mags = spectrum(&samples);
        assert_eq!(mags.len(), FFT_SIZE / 2);
        let peak = mags
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, m)| if *m > best.1 { (i, *m) } else { best });
        assert_eq!(peak.0, bin);
    }
}
