use std::f32::consts::FRAC_PI_2;
use std::ops::{AddAssign, Mul};

// The smallest unit of audio; one stereo frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self { // just giving `default` a better name for clarity
        Self::default()
    }

    pub fn mono(s: f32) -> Self {
        Self { left: s, right: s }
    }

    /// Equal-power pan of a mono sample, -1.0 hard left to 1.0 hard right.
    pub fn panned(s: f32, pan: f32) -> Self {
        let x = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5 * FRAC_PI_2;
        Self {
            left: s * x.cos(),
            right: s * x.sin(),
        }
    }

    pub fn peak(self) -> f32 {
        self.left.abs().max(self.right.abs())
    }

    // analysers look at the mono downmix
    pub fn downmix(self) -> f32 {
        (self.left + self.right) * 0.5
    }
}

impl AddAssign for StereoFrame {
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<f32> for StereoFrame {
    type Output = Self;

    fn mul(self, gain: f32) -> Self {
        Self {
            left: self.left * gain,
            right: self.right * gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pan_is_equal_power() {
        let f = StereoFrame::panned(1.0, 0.0);
        assert!((f.left - f.right).abs() < 1e-6);
        assert!((f.left * f.left + f.right * f.right - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hard_pans_silence_the_other_side() {
        let left = StereoFrame::panned(1.0, -1.0);
        assert!(left.right.abs() < 1e-6);
        let right = StereoFrame::panned(1.0, 1.0);
        assert!(right.left.abs() < 1e-6);
    }
}
