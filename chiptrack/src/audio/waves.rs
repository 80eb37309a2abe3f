// Channel waveforms: band-limited pulses, 4-bit wave RAM and LFSR noise.

use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use super::sample_buffer::SampleBuffer;
use crate::pipeline::project::DutyCycle;

pub const PULSE_TERMS: usize = 64;
pub const PULSE_TABLE_LEN: usize = 2048;
pub const WAVE_RAM_LEN: usize = 32;
pub const WAVE_HEADROOM: f32 = 0.8;
pub const NOISE_SEED: u16 = 0x7FFF;
pub const NOISE_BASE_HZ: f64 = 500.0;
pub const NOISE_SECONDS: f64 = 1.0;

/// One period of a pulse wave built from its Fourier series, peak-normalized.
#[derive(Clone, Debug)]
pub struct PulseWave {
    table: Vec<f32>,
}

impl PulseWave {
    pub fn new(duty: f32) -> Self {
        let duty = duty as f64;
        let coeffs: Vec<f64> = (1..PULSE_TERMS)
            .map(|n| {
                let n = n as f64;
                2.0 / (n * PI) * (n * PI * duty).sin()
            })
            .collect();

        let raw: Vec<f64> = (0..PULSE_TABLE_LEN)
            .map(|k| {
                let x = TAU * k as f64 / PULSE_TABLE_LEN as f64;
                coeffs
                    .iter()
                    .enumerate()
                    .map(|(i, c)| c * ((i + 1) as f64 * x).sin())
                    .sum()
            })
            .collect();

        let peak = raw.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let scale = if peak > 0.0 { 1.0 / peak } else { 1.0 };
        Self {
            table: raw.into_iter().map(|v| (v * scale) as f32).collect(),
        }
    }

    /// `phase` in cycles; only the fractional part matters.
    pub fn sample(&self, phase: f64) -> f32 {
        let len = self.table.len();
        let pos = phase.rem_euclid(1.0) * len as f64;
        let i = pos as usize % len;
        let frac = (pos - pos.floor()) as f32;
        self.table[i] * (1.0 - frac) + self.table[(i + 1) % len] * frac
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveShape {
    Triangle,
    Saw,
    Square,
}

impl WaveShape {
    // ch3 reuses the duty setting to pick its wave
    pub fn for_duty(duty: DutyCycle) -> Self {
        match duty {
            DutyCycle::Quarter => WaveShape::Saw,
            DutyCycle::Half => WaveShape::Square,
            DutyCycle::Eighth => WaveShape::Triangle,
        }
    }

    fn index(self) -> usize {
        match self {
            WaveShape::Triangle => 0,
            WaveShape::Saw => 1,
            WaveShape::Square => 2,
        }
    }
}

/// 32 samples of 4-bit wave RAM, with the DAC's 16 levels and headroom.
pub fn wave_ram(shape: WaveShape) -> [f32; WAVE_RAM_LEN] {
    std::array::from_fn(|i| {
        let val = match shape {
            WaveShape::Triangle => {
                let v = if i < 16 { i } else { 31 - i };
                v as f32 / 15.0 * 2.0 - 1.0
            }
            WaveShape::Saw => i as f32 / 31.0 * 2.0 - 1.0,
            WaveShape::Square => {
                if i < 16 { 1.0 } else { -1.0 }
            }
        };
        let quantized = ((val + 1.0) * 7.5).round() / 7.5 - 1.0;
        quantized * WAVE_HEADROOM
    })
}

/// Linear-feedback shift register noise. Metallic mode also feeds the new bit
/// into bit 6, which shortens the period to 127 steps.
#[derive(Clone, Debug)]
pub struct Lfsr {
    register: u16,
    metallic: bool,
}

impl Lfsr {
    pub fn new(metallic: bool) -> Self {
        Self {
            register: NOISE_SEED,
            metallic,
        }
    }

    pub fn register(&self) -> u16 {
        self.register
    }

    pub fn step(&mut self) -> f32 {
        let r = self.register;
        let bit = (r ^ (r >> 1)) & 1;
        let mut next = (r >> 1) | (bit << 14);
        if self.metallic {
            next = (next & !(1 << 6)) | (bit << 6);
        }
        self.register = next;
        if next & 1 == 1 { 0.5 } else { -0.5 }
    }
}

pub fn noise_buffer(sample_rate: u32, metallic: bool) -> SampleBuffer {
    let len = (sample_rate as f64 * NOISE_SECONDS) as usize;
    let mut lfsr = Lfsr::new(metallic);
    SampleBuffer::new((0..len).map(|_| lfsr.step()).collect())
}

/// Every waveform a voice can need, built once per engine and shared.
#[derive(Clone, Debug)]
pub struct WaveBank {
    sample_rate: u32,
    pulses: [Arc<PulseWave>; 3],
    wave_ram: [Arc<SampleBuffer>; 3],
    soft_noise: Arc<SampleBuffer>,
    metallic_noise: Arc<SampleBuffer>,
}

impl WaveBank {
    pub fn new(sample_rate: u32) -> Self {
        let shapes = [WaveShape::Triangle, WaveShape::Saw, WaveShape::Square];
        Self {
            sample_rate,
            pulses: DutyCycle::ALL.map(|d| Arc::new(PulseWave::new(d.fraction()))),
            wave_ram: shapes.map(|s| Arc::new(SampleBuffer::new(wave_ram(s).to_vec()))),
            soft_noise: Arc::new(noise_buffer(sample_rate, false)),
            metallic_noise: Arc::new(noise_buffer(sample_rate, true)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn pulse(&self, duty: DutyCycle) -> Arc<PulseWave> {
        let i = DutyCycle::ALL.iter().position(|d| *d == duty).unwrap_or(2);
        Arc::clone(&self.pulses[i])
    }

    pub fn wave_ram(&self, shape: WaveShape) -> Arc<SampleBuffer> {
        Arc::clone(&self.wave_ram[shape.index()])
    }

    pub fn noise(&self, duty: DutyCycle) -> Arc<SampleBuffer> {
        if duty == DutyCycle::METALLIC_NOISE {
            Arc::clone(&self.metallic_noise)
        } else {
            Arc::clone(&self.soft_noise)
        }
    }

    /// Playback-rate reference for wave RAM: one full loop per period.
    pub fn wave_base_hz(&self) -> f64 {
        self.sample_rate as f64 / WAVE_RAM_LEN as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_series_has_no_dc_and_depends_on_duty() {
        let waves = DutyCycle::ALL.map(|d| PulseWave::new(d.fraction()));
        for wave in &waves {
            let mean: f32 = wave.table.iter().sum::<f32>() / PULSE_TABLE_LEN as f32;
            assert!(mean.abs() < 1e-4);
            assert!(wave.sample(0.0).abs() < 1e-6);
        }
        assert_ne!(waves[0].table, waves[2].table);
        assert_ne!(waves[1].table, waves[2].table);
    }

    #[test]
    fn pulse_is_peak_normalized() {
        let wave = PulseWave::new(0.125);
        let peak = (0..PULSE_TABLE_LEN)
            .map(|k| wave.sample(k as f64 / PULSE_TABLE_LEN as f64).abs())
            .fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-4);
    }

    #[test]
    fn wave_ram_is_four_bit() {
        for shape in [WaveShape::Triangle, WaveShape::Saw, WaveShape::Square] {
            for s in wave_ram(shape) {
                let level = (s / WAVE_HEADROOM + 1.0) * 7.5;
                assert!((level - level.round()).abs() < 1e-4);
                assert!(s.abs() <= WAVE_HEADROOM + 1e-6);
            }
        }
        let tri = wave_ram(WaveShape::Triangle);
        assert_eq!(tri[0], -WAVE_HEADROOM);
        assert_eq!(tri[15], WAVE_HEADROOM);
        assert_eq!(tri[16], WAVE_HEADROOM);
        let square = wave_ram(WaveShape::Square);
        assert_eq!(square[15], WAVE_HEADROOM);
        assert_eq!(square[16], -WAVE_HEADROOM);
    }

    #[test]
    fn duty_picks_the_wave_shape() {
        assert_eq!(WaveShape::for_duty(DutyCycle::Quarter), WaveShape::Saw);
        assert_eq!(WaveShape::for_duty(DutyCycle::Half), WaveShape::Square);
        assert_eq!(WaveShape::for_duty(DutyCycle::Eighth), WaveShape::Triangle);
    }

    #[test]
    fn noise_is_deterministic() {
        for metallic in [false, true] {
            let a = noise_buffer(8000, metallic);
            let b = noise_buffer(8000, metallic);
            assert_eq!(a.data, b.data);
            assert!(a.data.iter().all(|s| *s == 0.5 || *s == -0.5));
        }
        assert_ne!(noise_buffer(8000, false).data, noise_buffer(8000, true).data);
    }

    #[test]
    fn lfsr_first_steps() {
        let mut lfsr = Lfsr::new(false);
        // 0x7FFF: low bits equal, so the feedback bit is 0
        assert_eq!(lfsr.step(), 0.5);
        assert_eq!(lfsr.register(), 0x3FFF);
    }

    #[test]
    fn metallic_noise_has_a_short_period() {
        let mut lfsr = Lfsr::new(true);
        for _ in 0..200 {
            lfsr.step();
        }
        let seq: Vec<f32> = (0..254).map(|_| lfsr.step()).collect();
        assert_eq!(seq[..127], seq[127..]);

        let mut soft = Lfsr::new(false);
        let long: Vec<f32> = (0..254).map(|_| soft.step()).collect();
        assert_ne!(long[..127], long[127..]);
    }
}
