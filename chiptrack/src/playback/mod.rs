// Rows in, scheduled notes out.
pub mod note;
pub mod scheduler;

pub use note::{row_to_note, Note};
pub use scheduler::{PlaybackMode, PlaybackTarget, Scheduler};
