use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::shared::{DisplayState, LaneCell, NUM_CHANNELS, STEPS_PER_BANK};

const CHANNEL_NAMES: [&str; NUM_CHANNELS] = ["PU1", "PU2", "WAV", "NOI"];
const CHANNEL_COLORS: [Color; NUM_CHANNELS] = [Color::LightMagenta, Color::LightCyan, Color::LightYellow, Color::LightGreen];

// two banks of 32 steps, one row per channel, each cell two columns wide
pub fn draw_pattern_grid(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let banks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(NUM_CHANNELS as u16 + 2); 2])
        .split(area);

    for (bank, bank_area) in banks.iter().enumerate() {
        let first = bank * STEPS_PER_BANK;
        let title = format!(" {:02}-{:02} ", first, first + STEPS_PER_BANK - 1);
        let lines: Vec<Line> = (0..NUM_CHANNELS).map(|ch| lane_line(state, ch, bank)).collect();
        let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(widget, *bank_area);
    }
}

fn lane_line(state: &DisplayState, ch: usize, bank: usize) -> Line<'static> {
    let silenced = state.muted[ch] || (state.soloed.iter().any(|s| *s) && !state.soloed[ch]);
    let base = if silenced {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(CHANNEL_COLORS[ch])
    };

    let mut spans = Vec::with_capacity(STEPS_PER_BANK + 1);
    spans.push(Span::styled(format!("{} ", CHANNEL_NAMES[ch]), base.add_modifier(Modifier::BOLD)));

    for col in 0..STEPS_PER_BANK {
        let step = bank * STEPS_PER_BANK + col;
        let text = cell_text(state.lanes[ch][step], state.labels[ch][step].as_deref(), step);
        let mut style = base;
        if state.playing_step == Some(step as u8) {
            style = style.add_modifier(Modifier::REVERSED);
        }
        spans.push(Span::styled(text, style));
    }
    Line::from(spans)
}

// note starts show a short pitch ("C-4" -> "C4"), beats get a heavier dot
fn cell_text(cell: LaneCell, label: Option<&str>, step: usize) -> String {
    match cell {
        LaneCell::NoteStart => {
            let short: String = label.unwrap_or("").chars().filter(|c| *c != '-').take(2).collect();
            format!("{short:<2}")
        }
        LaneCell::Sustain => "══".to_string(),
        LaneCell::Off => "x ".to_string(),
        LaneCell::Empty if step % 4 == 0 => "• ".to_string(),
        LaneCell::Empty => "· ".to_string(),
    }
}
