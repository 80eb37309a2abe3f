use crate::pipeline::mixer::MixerState;
use crate::pipeline::project::{DutyCycle, Effect, TrackerRow};
use crate::pitch::{self, NoiseInstrument};
use crate::shared::NOISE_CHANNEL;

pub const VIBRATO_DEPTH: f32 = 6.0;
pub const SLIDE_RATIO: f64 = 1.5; // implicit slide target, relative to the base pitch
const DEFAULT_ARP: &str = "4,7";

/// A fully resolved sound event. Times are seconds relative to the start of
/// the scheduled segment.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    pub frequency: f64,
    pub duration: f64,
    pub time: f64,
    pub channel: u8,
    pub volume: f32, // 0.0 - 1.0
    pub duty_cycle: DutyCycle,
    pub vibrato: Option<f32>,
    pub slide: Option<f64>, // target Hz
    pub arpeggio: Option<Vec<i32>>, // semitone offsets
    pub decay: u8,
    pub panning: Option<f32>,
}

impl Note {
    /// Plain note with no modulation; handy for previews.
    pub fn simple(channel: u8, frequency: f64, time: f64, duration: f64) -> Self {
        Self {
            frequency,
            duration,
            time,
            channel,
            volume: 12.0 / 15.0,
            duty_cycle: DutyCycle::channel_default(channel),
            vibrato: None,
            slide: None,
            arpeggio: None,
            decay: 0,
            panning: None,
        }
    }
}

fn parse_offsets(raw: &str) -> Vec<i32> {
    raw.split(',').filter_map(|n| n.trim().parse().ok()).collect()
}

/// Resolve a row into a Note. Silent rows and unresolvable pitches give None.
///
/// Duty comes from the row, else (noise) the detected drum's default, else the
/// channel's mixer default.
pub fn row_to_note(row: &TrackerRow, ch: u8, time: f64, duration: f64, mixer: &MixerState) -> Option<Note> {
    if !row.is_sounding() {
        return None;
    }
    let pitch = pitch::normalize_pitch(&row.pitch);
    let frequency = pitch::frequency_for(&pitch, ch)?;

    let duty_cycle = row.duty_cycle.unwrap_or_else(|| {
        if ch == NOISE_CHANNEL {
            NoiseInstrument::detect(&pitch, DutyCycle::Half).defaults().duty
        } else {
            mixer.default_duty(ch)
        }
    });

    let effect = row.effect.unwrap_or_default();
    let arpeggio = (effect == Effect::Arpeggio)
        .then(|| parse_offsets(row.arp_notes.as_deref().unwrap_or(DEFAULT_ARP)));
    let slide = match effect {
        Effect::Slide => match row.slide.as_deref() {
            Some(target) => pitch::frequency_for(&pitch::normalize_pitch(target), ch),
            None => Some(frequency * SLIDE_RATIO),
        },
        _ => None,
    };

    Some(Note {
        frequency,
        duration,
        time,
        channel: ch,
        volume: row.volume as f32 / 15.0,
        duty_cycle,
        vibrato: (effect == Effect::Vibrato).then_some(VIBRATO_DEPTH),
        slide,
        arpeggio,
        decay: row.decay.unwrap_or(0),
        panning: row.panning,
    })
}
