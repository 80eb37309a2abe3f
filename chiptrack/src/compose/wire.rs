// Compact note wire format.
//
// Generators write notes as `{s, p, l?, v?, d?, dec?, fx?, a?, sl?}` but also
// drift into the verbose spellings (`step`, `pitch`, `dutyCycle`, ...) and into
// numbers-as-strings. Stage one is this lenient serde layer; stage two is
// `CompactNote::validate`, which is the only place defaults and clamps live.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::pipeline::project::{DutyCycle, Effect, DEFAULT_VOLUME, MAX_DECAY, MAX_VOLUME};
use crate::pitch::{self, EMPTY};
use crate::shared::LAST_STEP;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CompactNote {
    #[serde(default, alias = "step", deserialize_with = "loose_number")]
    pub s: Option<f64>,
    #[serde(default, alias = "pitch", deserialize_with = "loose_string")]
    pub p: Option<String>,
    #[serde(default, alias = "length", deserialize_with = "loose_number")]
    pub l: Option<f64>,
    #[serde(default, alias = "volume", deserialize_with = "loose_number")]
    pub v: Option<f64>,
    #[serde(default, alias = "duty", alias = "dutyCycle", deserialize_with = "loose_string")]
    pub d: Option<String>,
    #[serde(default, alias = "decay", deserialize_with = "loose_number")]
    pub dec: Option<f64>,
    #[serde(default, alias = "effect", deserialize_with = "loose_string")]
    pub fx: Option<String>,
    #[serde(default, alias = "arpNotes", deserialize_with = "loose_string")]
    pub a: Option<String>,
    #[serde(default, alias = "slide", deserialize_with = "loose_string")]
    pub sl: Option<String>,
}

/// A note that passed validation, with every field filled in.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedNote {
    pub step: u8,
    pub pitch: String,
    pub length: u8,
    pub volume: u8,
    pub duty: DutyCycle,
    pub decay: u8,
    pub effect: Effect,
    pub arp_notes: Option<String>,
    pub slide: Option<String>,
}

impl CompactNote {
    pub fn step(&self) -> Option<i64> {
        self.s.map(|s| s.floor() as i64)
    }

    /// True when this note would survive pitch normalization.
    pub fn has_pitch(&self) -> bool {
        self.p
            .as_deref()
            .is_some_and(|p| pitch::normalize_pitch(p) != EMPTY)
    }

    /// Drop notes off the grid or without a pitch; default and clamp the rest.
    pub fn validate(&self) -> Option<ValidatedNote> {
        let step = self.step()?;
        if !(0..=LAST_STEP as i64).contains(&step) {
            return None;
        }
        let pitch = pitch::normalize_pitch(self.p.as_deref().unwrap_or(""));
        if pitch == EMPTY {
            return None;
        }

        let effect = self.fx.as_deref().and_then(Effect::parse).unwrap_or_default();
        let slide = match (effect, self.sl.as_deref()) {
            (Effect::Slide, Some(target)) => Some(pitch::normalize_pitch(target)),
            (_, Some(target)) if !target.is_empty() => Some(target.to_string()),
            _ => None,
        };

        Some(ValidatedNote {
            step: step as u8,
            pitch,
            length: self.l.map(|l| l.floor().max(1.0)).unwrap_or(1.0).min(u8::MAX as f64) as u8,
            volume: clamp_u8(self.v, DEFAULT_VOLUME, MAX_VOLUME),
            duty: self.d.as_deref().and_then(DutyCycle::parse).unwrap_or_default(),
            decay: clamp_u8(self.dec, 0, MAX_DECAY),
            effect,
            arp_notes: self.a.clone().filter(|a| !a.is_empty()),
            slide,
        })
    }
}

fn clamp_u8(raw: Option<f64>, default: u8, max: u8) -> u8 {
    match raw {
        Some(v) if v.is_finite() => v.round().clamp(0.0, max as f64) as u8,
        _ => default,
    }
}

/// One song section as the composer returns it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompactSection {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub ch1: Vec<CompactNote>,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub ch2: Vec<CompactNote>,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub ch3: Vec<CompactNote>,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub ch4: Vec<CompactNote>,
}

impl CompactSection {
    pub fn channel(&self, ch: u8) -> &[CompactNote] {
        match ch {
            1 => &self.ch1,
            2 => &self.ch2,
            3 => &self.ch3,
            4 => &self.ch4,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompactComposition {
    #[serde(default, deserialize_with = "loose_number")]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub sections: Vec<CompactSection>,
}

/// A generated clip: same channel keys as a section, plus a name.
pub type CompactClip = CompactSection;

// numbers, or strings holding numbers; anything else reads as absent
fn loose_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// strings, or numbers printed as strings ("d": 0.25)
fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// one malformed note shouldn't cost the whole channel
fn lenient_notes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<CompactNote>, D::Error> {
    let raw = match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(kind = %value_kind(&other), "expected a note array");
            return Ok(Vec::new());
        }
        None => return Ok(Vec::new()),
    };
    Ok(raw
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<CompactNote>(item) {
            Ok(note) => Some(note),
            Err(err) => {
                warn!(%err, "skipping malformed note");
                None
            }
        })
        .collect())
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
