//! Transient video-call state and signaling relay. Nothing here is ever
//! persisted: a restart empties every call.

pub mod signaling;
pub mod state;

pub use state::{CallParticipant, VideoState};
