use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};

use super::mode::TuiState;
use crate::shared::InputEvent;

const BPM_STEP: f64 = 1.0;

// poll for input from tui, resolves keys into input events for the backend
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(vec![]);
        }
        return Ok(handle_key(key.code, ts));
    }
    Ok(vec![])
}

fn handle_key(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    match code {
        KeyCode::Esc => vec![InputEvent::Quit],
        KeyCode::Char(' ') => vec![InputEvent::PlayPress],
        KeyCode::Char('p') if ts.playing => vec![InputEvent::Pause],
        KeyCode::Char('l') => vec![InputEvent::ToggleLoop],
        KeyCode::Char('m') => vec![InputEvent::ToggleMode],
        KeyCode::Char('u') => vec![InputEvent::Undo],

        // number row mutes, shifted number row solos
        KeyCode::Char(c @ '1'..='4') => vec![InputEvent::ToggleMute(c as u8 - b'0')],
        KeyCode::Char(c @ ('!' | '@' | '#' | '$')) => match solo_channel(c) {
            Some(ch) => vec![InputEvent::ToggleSolo(ch)],
            None => vec![],
        },

        KeyCode::Char('[') => vec![InputEvent::SelectPattern(-1)],
        KeyCode::Char(']') => vec![InputEvent::SelectPattern(1)],
        KeyCode::Char('-') => vec![InputEvent::AdjustBpm(-BPM_STEP)],
        KeyCode::Char('=') => vec![InputEvent::AdjustBpm(BPM_STEP)],

        KeyCode::Char('?') => {
            ts.help = !ts.help;
            vec![]
        }
        _ => vec![],
    }
}

// us layout shifted digits
fn solo_channel(c: char) -> Option<u8> {
    let ch = match c {
        '!' => 1,
        '@' => 2,
        '#' => 3,
        '$' => 4,
        _ => return None,
    };
    Some(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_keys() {
        let mut ts = TuiState::default();
        assert_eq!(handle_key(KeyCode::Char(' '), &mut ts), vec![InputEvent::PlayPress]);
        assert_eq!(handle_key(KeyCode::Char('l'), &mut ts), vec![InputEvent::ToggleLoop]);
        assert_eq!(handle_key(KeyCode::Char('m'), &mut ts), vec![InputEvent::ToggleMode]);
        assert_eq!(handle_key(KeyCode::Esc, &mut ts), vec![InputEvent::Quit]);
    }

    #[test]
    fn pause_only_while_playing() {
        let mut ts = TuiState::default();
        assert!(handle_key(KeyCode::Char('p'), &mut ts).is_empty());
        ts.playing = true;
        assert_eq!(handle_key(KeyCode::Char('p'), &mut ts), vec![InputEvent::Pause]);
    }

    #[test]
    fn mute_and_solo_map_to_channels() {
        let mut ts = TuiState::default();
        assert_eq!(handle_key(KeyCode::Char('3'), &mut ts), vec![InputEvent::ToggleMute(3)]);
        assert_eq!(handle_key(KeyCode::Char('$'), &mut ts), vec![InputEvent::ToggleSolo(4)]);
        assert!(handle_key(KeyCode::Char('5'), &mut ts).is_empty());
    }

    #[test]
    fn pattern_and_bpm_nudges() {
        let mut ts = TuiState::default();
        assert_eq!(handle_key(KeyCode::Char('['), &mut ts), vec![InputEvent::SelectPattern(-1)]);
        assert_eq!(handle_key(KeyCode::Char('='), &mut ts), vec![InputEvent::AdjustBpm(1.0)]);
    }

    #[test]
    fn help_toggle_stays_local() {
        let mut ts = TuiState::default();
        assert!(handle_key(KeyCode::Char('?'), &mut ts).is_empty());
        assert!(ts.help);
        handle_key(KeyCode::Char('?'), &mut ts);
        assert!(!ts.help);
    }
}
