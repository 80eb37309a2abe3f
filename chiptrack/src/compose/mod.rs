// Generated content in, tracker rows out.
pub mod composition;
pub mod translate;
pub mod wire;

pub use composition::{
    clips_from_response, compose_from_stream, compose_from_text, CancelToken, ComposeError, Composition,
};
pub use translate::translate_notes;
