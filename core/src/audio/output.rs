use async_trait::async_trait;
use thiserror::Error;

/// Logical output identifier used when a speaker has no dedicated device.
pub const DEFAULT_OUTPUT: &str = "default";

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Output {output_id} unavailable: {reason}")]
    OutputUnavailable { output_id: String, reason: String },

    #[error("No audio player available")]
    NoPlayer,

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plays encoded audio on independently addressable outputs.
///
/// `play` resolves when the sound ends, either naturally or because `stop`
/// was called for the same output. `stop` must be callable while a `play`
/// on that output is pending, and is a no-op when nothing is playing.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(
        &self,
        audio: &[u8],
        output_id: &str,
        volume: f32,
        pan: f32,
    ) -> Result<(), PlaybackError>;

    async fn stop(&self, output_id: &str);
}
