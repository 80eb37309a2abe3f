pub mod audio;
pub mod audio_api;
pub mod compose;
pub mod middle;
pub mod pipeline;
pub mod pitch;
pub mod playback;
pub mod selection;
pub mod shared;
pub mod tui;
