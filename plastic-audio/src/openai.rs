//! OpenAI-compatible speech synthesis over HTTP.
//!
//! POST `{base_url}/audio/speech` with `{model, voice, input, instructions?,
//! response_format}` and return the response body as the audio.
//!
//! Env overrides:
//! - OPENAI_API_KEY
//! - OPENAI_BASE_URL (default https://api.openai.com/v1)
//! - OPENAI_TTS_MODEL (default tts-1)
//! - OPENAI_TTS_FORMAT (default wav, so gain and pan can be applied)
//! - TTS_TIMEOUT_MS

use crate::utils::env_u64;
use async_trait::async_trait;
use plastic_core::{SpeechSynthesizer, SynthesisError};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct OpenAiSynthConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub response_format: String,
    pub request_timeout_ms: u64,
}

impl Default for OpenAiSynthConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: std::env::var("OPENAI_TTS_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "tts-1".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            response_format: std::env::var("OPENAI_TTS_FORMAT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "wav".to_string()),
            request_timeout_ms: env_u64("TTS_TIMEOUT_MS").unwrap_or(30_000),
        }
    }
}

#[derive(Clone)]
pub struct OpenAiSpeechSynthesizer {
    http: Client,
    cfg: OpenAiSynthConfig,
}

impl OpenAiSpeechSynthesizer {
    pub fn new(cfg: OpenAiSynthConfig) -> Result<Self, SynthesisError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| SynthesisError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self, SynthesisError> {
        Self::new(OpenAiSynthConfig::default())
    }

    pub fn has_credentials(&self) -> bool {
        self.cfg.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.cfg.base_url.trim_end_matches('/'))
    }
}

/// JSON body for the speech endpoint; empty instructions are omitted.
pub fn speech_request_body(
    cfg: &OpenAiSynthConfig,
    voice: &str,
    text: &str,
    instructions: &str,
) -> serde_json::Value {
    let mut body = json!({
        "model": cfg.model,
        "voice": voice,
        "input": text,
        "response_format": cfg.response_format,
    });
    if !instructions.trim().is_empty() {
        body["instructions"] = json!(instructions);
    }
    body
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(
        &self,
        voice: &str,
        text: &str,
        instructions: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        let url = self.endpoint();
        debug!(target = "tts", voice, chars = text.len(), "POST {}", url);

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let body = speech_request_body(&self.cfg, voice, text, instructions);
        let resp = req.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                SynthesisError::Timeout(self.cfg.request_timeout_ms)
            } else {
                SynthesisError::Network(e.to_string())
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target = "tts", %status, body = %text, "Speech endpoint error");
            return Err(SynthesisError::Provider(format!(
                "status={} body={}",
                status, text
            )));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| SynthesisError::Network(format!("Failed to read audio body: {e}")))?;
        if audio.is_empty() {
            return Err(SynthesisError::Provider("empty audio response".into()));
        }
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpenAiSynthConfig {
        OpenAiSynthConfig {
            base_url: "http://localhost:9/v1/".into(),
            model: "tts-1".into(),
            api_key: None,
            response_format: "wav".into(),
            request_timeout_ms: 500,
        }
    }

    #[test]
    fn body_omits_blank_instructions() {
        let body = speech_request_body(&config(), "nova", "Hello", "  ");
        assert_eq!(body["voice"], "nova");
        assert_eq!(body["input"], "Hello");
        assert_eq!(body["response_format"], "wav");
        assert!(body.get("instructions").is_none());

        let body = speech_request_body(&config(), "nova", "Hello", "whisper");
        assert_eq!(body["instructions"], "whisper");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let synth = OpenAiSpeechSynthesizer::new(config()).unwrap();
        assert_eq!(synth.endpoint(), "http://localhost:9/v1/audio/speech");
        assert!(!synth.has_credentials());
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_network_error() {
        let synth = OpenAiSpeechSynthesizer::new(config()).unwrap();
        let err = synth.synthesize("nova", "Hello", "").await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Network(_) | SynthesisError::Timeout(_)
        ));
    }
}
