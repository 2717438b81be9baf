use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Synthesis timed out after {0} ms")]
    Timeout(u64),
}

/// Converts text into encoded audio for a given voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        voice: &str,
        text: &str,
        instructions: &str,
    ) -> Result<Vec<u8>, SynthesisError>;
}
