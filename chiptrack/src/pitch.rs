// Pitch names, the frequency table, and the noise channel's pitch rules.
//
// Pitches stay strings throughout the data model ("C-4", "F#5"), with two
// sentinels: "---" for an empty row and "OFF" for an explicit note-off. The
// clipboard adds a third, "EMPTY_CELL", that never reaches a pattern.

use crate::pipeline::project::DutyCycle;
use crate::shared::NOISE_CHANNEL;

pub const EMPTY: &str = "---";
pub const OFF: &str = "OFF";
pub const EMPTY_CELL: &str = "EMPTY_CELL";
pub const DEFAULT_PITCH: &str = "C-4";

/// Fallback when a noise pitch is neither a table note nor an octave bucket.
pub const NOISE_FALLBACK_HZ: f64 = 1000.0;

/// 7 octaves x 12 semitones, ascending.
pub const PITCH_TABLE: [(&str, f64); 84] = [
    ("C-1", 32.70), ("C#1", 34.65), ("D-1", 36.71), ("D#1", 38.89), ("E-1", 41.20), ("F-1", 43.65),
    ("F#1", 46.25), ("G-1", 49.00), ("G#1", 51.91), ("A-1", 55.00), ("A#1", 58.27), ("B-1", 61.74),
    ("C-2", 65.41), ("C#2", 69.30), ("D-2", 73.42), ("D#2", 77.78), ("E-2", 82.41), ("F-2", 87.31),
    ("F#2", 92.50), ("G-2", 98.00), ("G#2", 103.83), ("A-2", 110.00), ("A#2", 116.54), ("B-2", 123.47),
    ("C-3", 130.81), ("C#3", 138.59), ("D-3", 146.83), ("D#3", 155.56), ("E-3", 164.81), ("F-3", 174.61),
    ("F#3", 185.00), ("G-3", 196.00), ("G#3", 207.65), ("A-3", 220.00), ("A#3", 233.08), ("B-3", 246.94),
    ("C-4", 261.63), ("C#4", 277.18), ("D-4", 293.66), ("D#4", 311.13), ("E-4", 329.63), ("F-4", 349.23),
    ("F#4", 369.99), ("G-4", 392.00), ("G#4", 415.30), ("A-4", 440.00), ("A#4", 466.16), ("B-4", 493.88),
    ("C-5", 523.25), ("C#5", 554.37), ("D-5", 587.33), ("D#5", 622.25), ("E-5", 659.25), ("F-5", 698.46),
    ("F#5", 739.99), ("G-5", 783.99), ("G#5", 830.61), ("A-5", 880.00), ("A#5", 932.33), ("B-5", 987.77),
    ("C-6", 1046.50), ("C#6", 1108.73), ("D-6", 1174.66), ("D#6", 1244.51), ("E-6", 1318.51), ("F-6", 1396.91),
    ("F#6", 1479.98), ("G-6", 1567.98), ("G#6", 1661.22), ("A-6", 1760.00), ("A#6", 1864.66), ("B-6", 1975.53),
    ("C-7", 2093.00), ("C#7", 2217.46), ("D-7", 2349.32), ("D#7", 2489.02), ("E-7", 2637.02), ("F-7", 2793.83),
    ("F#7", 2959.96), ("G-7", 3135.96), ("G#7", 3322.44), ("A-7", 3520.00), ("A#7", 3729.31), ("B-7", 3951.07),
];

/// Coarse noise "divider" buckets, keyed by octave digit.
const NOISE_OCTAVE_HZ: [(u32, f64); 7] = [
    (1, 44.0),
    (2, 110.0),
    (3, 220.0),
    (4, 550.0),
    (5, 1800.0),
    (6, 6000.0),
    (7, 14000.0),
];

const FLATS: [(&str, &str); 5] = [("DB", "C#"), ("EB", "D#"), ("GB", "F#"), ("AB", "G#"), ("BB", "A#")];

/// True for anything that actually makes sound.
pub fn is_sounding(pitch: &str) -> bool {
    !pitch.is_empty() && pitch != EMPTY && pitch != OFF && pitch != EMPTY_CELL
}

/// Bring user or generator input into canonical form.
///
/// Sentinels pass through, blank input becomes "---", flats become sharps,
/// and anything that still isn't a table note becomes "C-4".
pub fn normalize_pitch(raw: &str) -> String {
    if raw.is_empty() {
        return EMPTY.to_string();
    }
    if raw == EMPTY || raw == OFF {
        return raw.to_string();
    }

    let mut p = raw.trim().to_uppercase();
    if p.is_empty() {
        return EMPTY.to_string();
    }
    for (flat, sharp) in FLATS {
        if let Some(rest) = p.strip_prefix(flat) {
            p = format!("{sharp}{rest}");
            break;
        }
    }
    let p: String = p.chars().filter(|c| *c != '-').collect();

    let chars: Vec<char> = p.chars().collect();
    let canonical = match chars.as_slice() {
        [letter @ 'A'..='G', octave] if octave.is_ascii_digit() => format!("{letter}-{octave}"),
        [letter @ 'A'..='G', '#', octave] if octave.is_ascii_digit() => format!("{letter}#{octave}"),
        _ => return DEFAULT_PITCH.to_string(),
    };

    if table_index(&canonical).is_some() {
        canonical
    } else {
        DEFAULT_PITCH.to_string()
    }
}

fn table_index(canonical: &str) -> Option<usize> {
    PITCH_TABLE.iter().position(|(name, _)| *name == canonical)
}

/// Position in the ascending pitch list, after normalizing.
pub fn pitch_to_index(pitch: &str) -> Option<usize> {
    table_index(&normalize_pitch(pitch))
}

/// Pitch at an index, clamped to the ends of the table.
pub fn index_to_pitch(index: i32) -> &'static str {
    let last = PITCH_TABLE.len() as i32 - 1;
    PITCH_TABLE[index.clamp(0, last) as usize].0
}

/// Shift a pitch by semitones. Sentinels are returned unchanged.
pub fn transpose(pitch: &str, semitones: i32) -> String {
    if !is_sounding(pitch) {
        return pitch.to_string();
    }
    match pitch_to_index(pitch) {
        Some(index) => index_to_pitch(index as i32 + semitones).to_string(),
        None => pitch.to_string(),
    }
}

pub fn table_frequency(pitch: &str) -> Option<f64> {
    PITCH_TABLE
        .iter()
        .find(|(name, _)| *name == pitch)
        .map(|(_, hz)| *hz)
}

/// Resolve a pitch to Hz for a channel.
///
/// Melodic channels need an exact table note. The noise channel prefers the
/// table too (per-semitone LFSR clocking), then falls back to the octave
/// bucket of the last digit, then to 1 kHz.
pub fn frequency_for(pitch: &str, channel: u8) -> Option<f64> {
    if !is_sounding(pitch) {
        return None;
    }
    if channel != NOISE_CHANNEL {
        return table_frequency(pitch);
    }
    if let Some(hz) = table_frequency(pitch) {
        return Some(hz);
    }
    let bucket = octave_digit(pitch).and_then(|octave| {
        NOISE_OCTAVE_HZ
            .iter()
            .find(|(o, _)| *o == octave)
            .map(|(_, hz)| *hz)
    });
    Some(bucket.unwrap_or(NOISE_FALLBACK_HZ))
}

fn octave_digit(pitch: &str) -> Option<u32> {
    pitch.chars().last().and_then(|c| c.to_digit(10))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseInstrument {
    Kick,
    Snare,
    Hat,
}

pub struct NoiseDefaults {
    pub pitch: &'static str,
    pub decay: u8,
    pub duty: DutyCycle,
}

impl NoiseInstrument {
    /// Guess what a noise hit is meant to be from its pitch and LFSR mode.
    pub fn detect(pitch: &str, duty: DutyCycle) -> Self {
        if duty == DutyCycle::METALLIC_NOISE {
            return NoiseInstrument::Hat;
        }
        let octave = octave_digit(pitch).filter(|o| *o > 0).unwrap_or(4);
        match octave {
            0..=2 => NoiseInstrument::Kick,
            6.. => NoiseInstrument::Hat,
            _ => NoiseInstrument::Snare,
        }
    }

    pub fn defaults(self) -> NoiseDefaults {
        match self {
            NoiseInstrument::Kick => NoiseDefaults { pitch: "C-2", decay: 10, duty: DutyCycle::SOFT_NOISE },
            NoiseInstrument::Snare => NoiseDefaults { pitch: "C-4", decay: 6, duty: DutyCycle::SOFT_NOISE },
            NoiseInstrument::Hat => NoiseDefaults { pitch: "C-7", decay: 14, duty: DutyCycle::METALLIC_NOISE },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NoiseInstrument::Kick => "Kick Drum",
            NoiseInstrument::Snare => "Snare Drum",
            NoiseInstrument::Hat => "Hi-Hat / Metal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_spellings() {
        assert_eq!(normalize_pitch("C4"), "C-4");
        assert_eq!(normalize_pitch("c-4"), "C-4");
        assert_eq!(normalize_pitch("F#5"), "F#5");
        assert_eq!(normalize_pitch("Eb3"), "D#3");
        assert_eq!(normalize_pitch("bb2"), "A#2");
        assert_eq!(normalize_pitch(" g-6 "), "G-6");
    }

    #[test]
    fn sentinels_pass_through_and_garbage_becomes_default() {
        assert_eq!(normalize_pitch(""), EMPTY);
        assert_eq!(normalize_pitch("---"), EMPTY);
        assert_eq!(normalize_pitch("OFF"), OFF);
        assert_eq!(normalize_pitch("banana"), DEFAULT_PITCH);
        assert_eq!(normalize_pitch("H4"), DEFAULT_PITCH);
        assert_eq!(normalize_pitch("C9"), DEFAULT_PITCH);
    }

    #[test]
    fn transposes_by_octaves() {
        assert_eq!(transpose("C-4", 12), "C-5");
        assert_eq!(transpose("C-4", -12), "C-3");
        assert_eq!(transpose("B-7", 5), "B-7");
        assert_eq!(transpose("C-1", -3), "C-1");
        assert_eq!(transpose(OFF, 3), OFF);
    }

    #[test]
    fn table_is_ascending_and_complete() {
        assert_eq!(PITCH_TABLE.len(), 7 * 12);
        assert!(PITCH_TABLE.windows(2).all(|w| w[0].1 < w[1].1));
        assert_eq!(pitch_to_index("C-1"), Some(0));
        assert_eq!(index_to_pitch(83), "B-7");
    }

    #[test]
    fn resolves_frequencies_per_channel() {
        assert_eq!(frequency_for("A-4", 1), Some(440.0));
        assert_eq!(frequency_for("OFF", 1), None);
        assert_eq!(frequency_for("X-9", 2), None);
        // noise: exact note first, then octave bucket, then the flat fallback
        assert_eq!(frequency_for("A-4", 4), Some(440.0));
        assert_eq!(frequency_for("Q-2", 4), Some(110.0));
        assert_eq!(frequency_for("ZZ", 4), Some(NOISE_FALLBACK_HZ));
    }

    #[test]
    fn detects_noise_instruments() {
        assert_eq!(NoiseInstrument::detect("C-2", DutyCycle::Half), NoiseInstrument::Kick);
        assert_eq!(NoiseInstrument::detect("C-4", DutyCycle::Half), NoiseInstrument::Snare);
        assert_eq!(NoiseInstrument::detect("C-6", DutyCycle::Half), NoiseInstrument::Hat);
        assert_eq!(NoiseInstrument::detect("C-2", DutyCycle::Eighth), NoiseInstrument::Hat);
    }
}
