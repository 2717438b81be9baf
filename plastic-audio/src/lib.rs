// Concrete audio collaborators for the playback core

// Shared process and path helpers
pub(crate) mod utils;

pub mod wav;

pub mod player;

pub use player::{CommandAudioOutput, PlayerConfig, PlayerKind};

#[cfg(feature = "local-tts")]
pub mod local;

#[cfg(feature = "local-tts")]
pub use local::{LocalSpeechSynthesizer, LocalSynthConfig};

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiSpeechSynthesizer, OpenAiSynthConfig};
