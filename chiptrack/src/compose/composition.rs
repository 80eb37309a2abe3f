// From generator output to project content.
//
// The generator itself is someone else's problem: we get text (streamed in
// chunks or all at once), dig the JSON out of it, and build patterns, an
// arrangement, and clips. Nothing here touches a ProjectState; the caller
// applies a finished Composition in one go, so an abort leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::translate::translate_notes;
use super::wire::{CompactClip, CompactComposition, CompactNote, CompactSection};
use crate::pipeline::ids::{next_clip_id, next_pattern_id};
use crate::pipeline::project::{
    ChannelRows, ClipCategory, ClipRow, Pattern, PatternClip, DEFAULT_BPM,
};
use crate::shared::{CHANNELS, STEPS_PER_PATTERN};

pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 240.0;
const SECTION_NAME_LEN: usize = 15;
const CLIP_NAME_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("composition aborted")]
    Aborted,
    #[error("generator produced invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("response did not contain any sections")]
    NoSections,
}

/// Shared abort flag. Clone it into whatever produces the stream.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Composition {
    pub bpm: f64,
    pub patterns: Vec<Pattern>,
    pub arrangement: Vec<String>,
}

/// Find the JSON payload in a chatty response: a ```json fence, a bare
/// object/array, the outermost braces, or failing all that the whole text.
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(first), Some(last)) if first < last => &text[first..=last],
        _ => trimmed,
    }
}

/// Accumulate streamed chunks, checking for cancellation before each one.
pub fn collect_stream<I>(chunks: I, cancel: &CancelToken, mut on_update: impl FnMut(&str)) -> Result<String, ComposeError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut full = String::new();
    for chunk in chunks {
        if cancel.is_cancelled() {
            info!(received = full.len(), "composition aborted");
            return Err(ComposeError::Aborted);
        }
        full.push_str(chunk.as_ref());
        on_update(&full);
    }
    if cancel.is_cancelled() {
        return Err(ComposeError::Aborted);
    }
    Ok(full)
}

pub fn compose_from_stream<I>(chunks: I, cancel: &CancelToken, on_update: impl FnMut(&str)) -> Result<Composition, ComposeError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let text = collect_stream(chunks, cancel, on_update)?;
    compose_from_text(&text)
}

pub fn compose_from_text(text: &str) -> Result<Composition, ComposeError> {
    let data: CompactComposition = serde_json::from_str(extract_json(text))?;
    build_composition(&data)
}

fn section_name(raw: Option<&str>, index: usize) -> String {
    let name: String = raw
        .unwrap_or("")
        .to_uppercase()
        .chars()
        .take(SECTION_NAME_LEN)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == ' ')
        .collect();
    if name.trim().is_empty() {
        format!("SECTION {}", index + 1)
    } else {
        name
    }
}

fn translate_section(section: &CompactSection) -> ChannelRows {
    let mut channels = ChannelRows::default();
    for ch in CHANNELS {
        let in_range: Vec<CompactNote> = section
            .channel(ch)
            .iter()
            .filter(|n| n.step().unwrap_or(0) < STEPS_PER_PATTERN as i64)
            .cloned()
            .collect();
        channels.set(ch, translate_notes(&in_range, ch));
    }
    channels
}

/// Sections become patterns; an INTRO (the first section's ch2 + ch3) is put
/// in front, and a fixed pop form is laid out over whatever sections exist.
#[instrument(skip_all, fields(sections = data.sections.len()))]
pub fn build_composition(data: &CompactComposition) -> Result<Composition, ComposeError> {
    if data.sections.is_empty() {
        return Err(ComposeError::NoSections);
    }

    let mut patterns = Vec::with_capacity(data.sections.len() + 1);
    let mut by_name: HashMap<String, String> = HashMap::new();

    for (index, section) in data.sections.iter().enumerate() {
        let name = section_name(section.name.as_deref(), index);
        let id = format!("{}-{}", next_pattern_id(), name.to_lowercase().replace(' ', "-"));
        patterns.push(Pattern {
            id: id.clone(),
            name: name.clone(),
            channels: translate_section(section),
        });

        by_name.insert(name, id.clone());
        // positional fallbacks, in case the sections aren't named the usual way
        if let Some(role) = ["VERSE", "CHORUS", "BRIDGE", "OUTRO"].get(index) {
            by_name.insert(role.to_string(), id);
        }
    }

    let first = &patterns[0];
    let mut intro = Pattern::new(format!("{}-intro", next_pattern_id()), "INTRO");
    intro.channels.set(2, first.channels.get(2).to_vec());
    intro.channels.set(3, first.channels.get(3).to_vec());
    let intro_id = intro.id.clone();
    patterns.insert(0, intro);

    let by_index = |i: usize| patterns.get(i).map(|p| p.id.clone());
    let verse = by_name.get("VERSE").cloned().or_else(|| by_index(1)).unwrap_or_else(|| intro_id.clone());
    let chorus = by_name.get("CHORUS").cloned().or_else(|| by_index(2)).unwrap_or_else(|| verse.clone());
    let bridge = by_name.get("BRIDGE").cloned().or_else(|| by_index(3)).unwrap_or_else(|| chorus.clone());
    let outro = by_name.get("OUTRO").cloned().or_else(|| by_index(4)).unwrap_or_else(|| chorus.clone());

    let arrangement = vec![
        intro_id,
        verse.clone(),
        chorus.clone(),
        verse,
        bridge,
        chorus.clone(),
        chorus,
        outro,
    ];

    let bpm = data.bpm.filter(|b| b.is_finite() && *b != 0.0).unwrap_or(DEFAULT_BPM).clamp(MIN_BPM, MAX_BPM);
    info!(patterns = patterns.len(), bpm, "composition built");

    Ok(Composition {
        bpm,
        patterns,
        arrangement,
    })
}

fn clip_name(raw: Option<&str>) -> String {
    let name: String = raw
        .unwrap_or("AI CLIP")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect::<String>()
        .to_uppercase()
        .chars()
        .take(CLIP_NAME_LEN)
        .collect();
    if name.trim().is_empty() { "AI CLIP".to_string() } else { name }
}

/// Parse a clip-generation response into AI clips.
pub fn clips_from_response(text: &str) -> Result<Vec<PatternClip>, ComposeError> {
    let raw: Vec<CompactClip> = serde_json::from_str(extract_json(text))?;
    let clips: Vec<PatternClip> = raw
        .iter()
        .map(|c| {
            let channels: BTreeMap<u8, Vec<ClipRow>> = CHANNELS
                .iter()
                .map(|&ch| (ch, translate_notes(c.channel(ch), ch).iter().map(ClipRow::from).collect()))
                .collect();
            PatternClip {
                id: next_clip_id(),
                name: clip_name(c.name.as_deref()),
                category: ClipCategory::Ai,
                channels,
            }
        })
        .collect();
    if clips.is_empty() {
        warn!("clip response contained no clips");
    }
    Ok(clips)
}
