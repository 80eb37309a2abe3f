use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

use super::grid::draw_pattern_grid;
use super::mode::TuiState;
use crate::shared::{DisplayState, NUM_CHANNELS};

const HELP: &str = "space play/stop  p pause  l loop  m song/pattern  1-4 mute  !@#$ solo  [ ] pattern  - = bpm  u undo  esc quit";

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState, blink_on: bool) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),  // header
            Constraint::Length(12), // two banks
            Constraint::Length(3),  // mixer
            Constraint::Min(1),     // status / help
        ])
        .split(area);

    draw_header(frame, sections[0], state, blink_on);
    draw_pattern_grid(frame, sections[1], state);
    draw_mixer(frame, sections[2], state);
    draw_footer(frame, sections[3], state, ts);
}

fn draw_header(frame: &mut Frame, area: Rect, state: &DisplayState, blink_on: bool) {
    let transport = if state.playing {
        if blink_on { "▶" } else { " " }
    } else {
        "■"
    };
    let mode = if state.song_mode {
        format!("SONG {}/{}", state.arrangement_index + 1, state.arrangement_len.max(1))
    } else {
        "PATTERN".to_string()
    };
    let line = Line::from(vec![
        Span::styled(format!(" {transport} "), Style::default().fg(Color::LightGreen)),
        Span::styled(state.pattern_name.clone(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {mode}  {:.0} BPM", state.bpm)),
        Span::styled(
            if state.looping { "  LOOP" } else { "" },
            Style::default().fg(Color::LightYellow),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_mixer(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, NUM_CHANNELS as u32); NUM_CHANNELS])
        .split(area);

    for (ch, col) in cols.iter().enumerate() {
        let flags = match (state.muted[ch], state.soloed[ch]) {
            (true, _) => " M",
            (_, true) => " S",
            _ => "",
        };
        let color = if state.muted[ch] { Color::DarkGray } else { Color::Magenta };
        // rms of a full-scale square is 1.0; scale up so quiet channels still move
        let ratio = (state.levels[ch] as f64 * 2.0).clamp(0.0, 1.0);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(format!("CH{}{flags}", ch + 1)))
            .gauge_style(Style::default().fg(color))
            .ratio(ratio)
            .label("");
        frame.render_widget(gauge, *col);
    }
}

fn draw_footer(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let text = if ts.help { HELP.to_string() } else { format!("{}   (? for keys)", state.status) };
    frame.render_widget(Paragraph::new(text).style(Style::default().fg(Color::Gray)), area);
}
