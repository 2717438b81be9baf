//! Boundaries to the audio collaborators the scheduler drives.
//!
//! - [`SpeechSynthesizer`]: (voice, text, instructions) -> encoded audio bytes
//! - [`AudioOutput`]: plays encoded audio on a logical output, and can stop it
//!
//! Concrete implementations live outside the core (see the `plastic-audio`
//! crate); tests use in-memory fakes.

mod output;
mod synthesis;

pub use output::{AudioOutput, PlaybackError, DEFAULT_OUTPUT};
pub use synthesis::{SpeechSynthesizer, SynthesisError};

// Shared audio utilities
pub mod utils;
