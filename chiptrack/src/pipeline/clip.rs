// Clips: drag payloads, stamping onto a pattern, and the built-in library.

use std::collections::BTreeMap;

use super::ids::next_row_id;
use super::project::{
    ChannelRows, ClipCategory, ClipRow, DutyCycle, Effect, Instrument, Pattern, PatternClip, TrackerRow,
    DEFAULT_VOLUME,
};
use crate::pitch::{self, DEFAULT_PITCH};
use crate::shared::{is_valid_channel, STEPS_PER_PATTERN};

const PAYLOAD_PREFIX: &str = "clip:";
const PATTERN_END: usize = STEPS_PER_PATTERN;

/// A parsed drag payload of the form `clip:<id>`.
#[derive(Debug, PartialEq, Eq)]
pub struct ClipPayload<'a> {
    pub clip_id: &'a str,
}

impl<'a> ClipPayload<'a> {
    pub fn parse(raw: &'a str) -> Option<Self> {
        let clip_id = raw.strip_prefix(PAYLOAD_PREFIX)?;
        if clip_id.is_empty() {
            return None;
        }
        Some(Self { clip_id })
    }

    pub fn format(clip_id: &str) -> String {
        format!("{PAYLOAD_PREFIX}{clip_id}")
    }
}

/// Built-ins first, then the project's own clips.
pub fn find_clip(id: &str, custom: &[PatternClip]) -> Option<PatternClip> {
    builtin_clips()
        .into_iter()
        .find(|c| c.id == id)
        .or_else(|| custom.iter().find(|c| c.id == id).cloned())
}

/// Steps the clip spans: its last used step plus one.
pub fn clip_length(clip: &PatternClip) -> usize {
    clip.channels
        .values()
        .flat_map(|rows| rows.iter().map(|r| r.step as usize))
        .max()
        .unwrap_or(0)
        + 1
}

fn fill_row(cr: &ClipRow, ch: u8, step: u8) -> TrackerRow {
    TrackerRow {
        id: next_row_id("clip"),
        step,
        pitch: cr
            .pitch
            .as_deref()
            .map(pitch::normalize_pitch)
            .unwrap_or_else(|| DEFAULT_PITCH.to_string()),
        instrument: cr.instrument.unwrap_or(Instrument::channel_default(ch)),
        volume: cr.volume.unwrap_or(DEFAULT_VOLUME),
        duty_cycle: Some(cr.duty_cycle.unwrap_or(DutyCycle::channel_default(ch))),
        effect: Some(cr.effect.unwrap_or(Effect::None)),
        arp_notes: cr.arp_notes.clone(),
        slide: cr.slide.clone(),
        decay: cr.decay,
        panning: cr.panning,
    }
}

/// Stamp a clip onto a pattern at `drop_step`.
///
/// Each clip channel lands on the same channel of the pattern. The clip's
/// footprint `[drop, drop + len)` is cleared first; rows past step 63 are cut.
/// Every clip note is followed by an OFF unless the clip continues on the next
/// step or that step is already taken, and a clip longer than one step gets a
/// closing OFF at its end when that cell is free.
pub fn stamp_clip(pattern: &Pattern, clip: &PatternClip, drop_step: u8) -> Pattern {
    let drop = drop_step as usize;
    let len = clip_length(clip);
    let mut channels: ChannelRows = pattern.channels.clone();

    for (&ch, clip_rows) in &clip.channels {
        if !is_valid_channel(ch as i32) {
            continue;
        }

        let mut rows: BTreeMap<u8, TrackerRow> = pattern
            .channels
            .get(ch)
            .iter()
            .filter(|r| (r.step as usize) < drop || (r.step as usize) >= drop + len)
            .map(|r| (r.step, r.clone()))
            .collect();

        let mut stamped: BTreeMap<u8, TrackerRow> = BTreeMap::new();
        for cr in clip_rows {
            let target = drop + cr.step as usize;
            if target < PATTERN_END {
                stamped.insert(target as u8, fill_row(cr, ch, target as u8));
            }
        }

        for (step, row) in stamped {
            let sounding = row.is_sounding();
            rows.insert(step, row);
            if !sounding {
                continue;
            }
            let cut = step as usize + 1;
            let clip_continues = clip_rows.iter().any(|r| drop + r.step as usize == cut);
            if cut < PATTERN_END && !clip_continues && !rows.contains_key(&(cut as u8)) {
                rows.insert(cut as u8, TrackerRow::note_off(cut as u8));
            }
        }

        let end = drop + len;
        if len > 1 && end < PATTERN_END {
            rows.entry(end as u8).or_insert_with(|| TrackerRow::note_off(end as u8));
        }

        channels.set(ch, rows.into_values().collect());
    }

    pattern.with_channels(channels)
}

fn clip(id: &str, name: &str, category: ClipCategory, channels: Vec<(u8, Vec<ClipRow>)>) -> PatternClip {
    PatternClip {
        id: id.to_string(),
        name: name.to_string(),
        category,
        channels: channels.into_iter().collect(),
    }
}

fn hits(pitch: &str, steps: &[u8], volume: u8) -> Vec<ClipRow> {
    steps.iter().map(|&s| ClipRow::at(s, pitch).vol(volume)).collect()
}

/// The clips that ship with every project.
pub fn builtin_clips() -> Vec<PatternClip> {
    use ClipCategory::*;

    let rock = {
        let mut rows = vec![
            ClipRow::at(0, "C-2").vol(15),
            ClipRow::at(4, "C-5").vol(12).decay(8),
            ClipRow::at(8, "C-2").vol(15),
            ClipRow::at(12, "C-5").vol(12).decay(8),
        ];
        rows.extend([2, 6, 10].map(|s| ClipRow::at(s, "C-6").vol(6).decay(12)));
        rows.push(ClipRow::at(14, "C-6").vol(8).decay(12));
        rows
    };

    let disco = vec![
        ClipRow::at(0, "C-2").vol(15),
        ClipRow::at(4, "C-5").vol(12),
        ClipRow::at(8, "C-2").vol(15),
        ClipRow::at(12, "C-5").vol(12),
        ClipRow::at(2, "C-6").vol(8).pan(-0.5).decay(14),
        ClipRow::at(6, "C-6").vol(8).pan(0.5).decay(14),
        ClipRow::at(10, "C-6").vol(8).pan(-0.5).decay(14),
        ClipRow::at(14, "G-6").vol(6).pan(0.5).decay(10),
    ];

    let snare_build: Vec<ClipRow> = [6, 7, 8, 9, 10, 11, 13]
        .iter()
        .enumerate()
        .map(|(i, &v)| ClipRow::at(i as u8 * 2, "C-4").vol(v))
        .chain(std::iter::once(ClipRow::at(14, "C-4").vol(15).decay(15)))
        .collect();

    let offbeat_saw = {
        let mut rows: Vec<ClipRow> = [2, 6, 10, 14]
            .map(|s| ClipRow::at(s, "C-2").vol(14).duty(DutyCycle::Quarter).decay(5))
            .to_vec();
        rows.push(ClipRow::at(16, "OFF"));
        rows
    };

    let acid = vec![
        ClipRow::at(0, "C-2").vol(15).duty(DutyCycle::Quarter).decay(8),
        ClipRow {
            slide: Some("C-2".into()),
            ..ClipRow::at(4, "C-3").vol(14).duty(DutyCycle::Quarter).effect(Effect::Slide)
        },
        ClipRow::at(8, "C-2").vol(15).duty(DutyCycle::Quarter).decay(8),
        ClipRow {
            slide: Some("C-2".into()),
            ..ClipRow::at(12, "G-2").vol(14).duty(DutyCycle::Quarter).effect(Effect::Slide)
        },
        ClipRow::at(16, "OFF"),
    ];

    let arp_lead = vec![
        ClipRow {
            arp_notes: Some("3,7".into()),
            ..ClipRow::at(0, "A-4").vol(11).duty(DutyCycle::Quarter).effect(Effect::Arpeggio)
        },
        ClipRow {
            arp_notes: Some("4,7".into()),
            ..ClipRow::at(8, "F-4").vol(11).duty(DutyCycle::Quarter).effect(Effect::Arpeggio)
        },
        ClipRow::at(16, "OFF"),
    ];

    let fanfare = vec![
        ClipRow::at(0, "C-5").vol(13).duty(DutyCycle::Half),
        ClipRow::at(2, "E-5").vol(13).duty(DutyCycle::Half),
        ClipRow::at(4, "G-5").vol(13).duty(DutyCycle::Half),
        ClipRow::at(6, "C-6").vol(14).duty(DutyCycle::Half).effect(Effect::Vibrato),
        ClipRow::at(12, "OFF"),
    ];

    vec![
        clip("drum_basic_rock", "BASIC ROCK 4/4", Drums, vec![(4, rock)]),
        clip("drum_stereo_disco", "STEREO DISCO", Drums, vec![(4, disco)]),
        clip("drum_intro_count", "INTRO COUNT", Drums, vec![(4, hits("C-6", &[0, 4, 8, 12], 15)
            .into_iter()
            .map(|r| r.decay(15))
            .collect())]),
        clip("drum_fill_snare", "SNARE BUILD", Drums, vec![(4, snare_build)]),
        clip("bass_offbeat_saw", "OFFBEAT SAW", Bass, vec![(3, offbeat_saw)]),
        clip("bass_acid_slide", "ACID SLIDE", Bass, vec![(3, acid)]),
        clip("lead_minor_arp", "MINOR ARP", Lead, vec![(2, arp_lead)]),
        clip("lead_fanfare", "FANFARE", Lead, vec![(1, fanfare)]),
        clip("combo_pulse_groove", "PULSE GROOVE", Combo, vec![
            (3, hits("C-2", &[0, 8], 14)),
            (4, hits("C-2", &[0, 8], 15).into_iter().chain(hits("C-5", &[4, 12], 12)).collect()),
        ]),
    ]
}
