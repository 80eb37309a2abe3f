// Grid geometry and the types the front-end and the middle layer agree on.
//
// The grid is 4 channels by 64 steps, shown to the user as two banks of 32
// steps. Channels are numbered 1..=4 everywhere (that is how the project
// format keys them), steps 0..=63.
//
//   ch1, ch2   pulse oscillators (duty 12.5% / 25% / 50%)
//   ch3        4-bit wavetable (triangle / saw / square)
//   ch4        LFSR noise (15-bit soft / 7-bit metallic)

pub const NUM_CHANNELS: usize = 4;
pub const STEPS_PER_PATTERN: usize = 64;
pub const STEPS_PER_BANK: usize = 32;
pub const CHANNELS: [u8; NUM_CHANNELS] = [1, 2, 3, 4];

pub const WAVE_CHANNEL: u8 = 3;
pub const NOISE_CHANNEL: u8 = 4;

pub const MIN_CHANNEL: i32 = 1;
pub const MAX_CHANNEL: i32 = NUM_CHANNELS as i32;
pub const LAST_STEP: i32 = STEPS_PER_PATTERN as i32 - 1;

pub fn clamp_channel(ch: i32) -> u8 {
    ch.clamp(MIN_CHANNEL, MAX_CHANNEL) as u8
}

pub fn clamp_step(step: i32) -> u8 {
    step.clamp(0, LAST_STEP) as u8
}

pub fn is_valid_channel(ch: i32) -> bool {
    (MIN_CHANNEL..=MAX_CHANNEL).contains(&ch)
}

pub fn is_valid_step(step: i32) -> bool {
    (0..=LAST_STEP).contains(&step)
}

/// One (channel, step) position on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub ch: u8,
    pub step: u8,
}

impl Cell {
    pub fn new(ch: u8, step: u8) -> Self {
        Self { ch, step }
    }

    /// Shift by a delta, clamping into the grid instead of wrapping.
    pub fn shifted(self, delta: StepDelta) -> Self {
        Self {
            ch: clamp_channel(self.ch as i32 + delta.ch),
            step: clamp_step(self.step as i32 + delta.step),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepDelta {
    pub ch: i32,
    pub step: i32,
}

impl StepDelta {
    pub fn new(ch: i32, step: i32) -> Self {
        Self { ch, step }
    }

    pub fn between(from: Cell, to: Cell) -> Self {
        Self {
            ch: to.ch as i32 - from.ch as i32,
            step: to.step as i32 - from.step as i32,
        }
    }
}

/// Inclusive step range inside one pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepRange {
    pub start_step: u8,
    pub end_step: u8,
}

impl StepRange {
    pub fn new(start_step: u8, end_step: u8) -> Self {
        Self {
            start_step: start_step.min(end_step),
            end_step: start_step.max(end_step),
        }
    }

    pub fn contains(&self, step: u8) -> bool {
        (self.start_step..=self.end_step).contains(&step)
    }

    pub fn len(&self) -> usize {
        (self.end_step - self.start_step) as usize + 1
    }
}

// Key plan for the terminal front-end:
//
//   Space          PlayPress (play / stop)
//   p              Pause
//   l              ToggleLoop
//   m              ToggleMode (song <-> pattern)
//   1 2 3 4        ToggleMute(ch)
//   ! @ # $        ToggleSolo(ch)
//   [ / ]          previous / next pattern
//   - / =          bpm down / up
//   u              Undo
//   Esc            Quit
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    PlayPress,
    Pause,
    ToggleLoop,
    ToggleMode,
    ToggleMute(u8),
    ToggleSolo(u8),
    SelectPattern(i32), // relative move through the pattern list
    AdjustBpm(f64),
    Undo,
    Quit,
}

/// What a single grid cell shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaneCell {
    Empty,
    NoteStart,
    Sustain,
    Off,
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub pattern_name: String,
    pub lanes: [[LaneCell; STEPS_PER_PATTERN]; NUM_CHANNELS],
    pub labels: [[Option<String>; STEPS_PER_PATTERN]; NUM_CHANNELS], // pitch text at note starts
    pub playing_step: Option<u8>,
    pub arrangement_index: usize,
    pub arrangement_len: usize,
    pub playing: bool,
    pub looping: bool,
    pub song_mode: bool,
    pub bpm: f64,
    pub muted: [bool; NUM_CHANNELS],
    pub soloed: [bool; NUM_CHANNELS],
    pub levels: [f32; NUM_CHANNELS],
    pub status: String,
}
