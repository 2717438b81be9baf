//! Local speech synthesis with command-line engines.
//!
//! - Prefer Piper (higher quality, requires a voice model)
//! - Fallback to espeak-ng (widely available)
//!
//! Both write a WAV file which is read back as the synthesized audio.
//! Instructions have no local equivalent and are ignored.
//!
//! Env overrides:
//! - PIPER_BIN, PIPER_VOICE, PIPER_VOICE_DIR
//! - ESPEAK_BIN
//! - TTS_TIMEOUT_MS, TTS_TEMP_DIR

use crate::utils::{env_u64, get_from_env_or_path, get_from_path, temp_stem};
use async_trait::async_trait;
use plastic_core::{SpeechSynthesizer, SynthesisError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tokio::task;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct LocalSynthConfig {
    pub temp_dir: PathBuf,
    pub timeout_ms: u64,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
}

impl Default for LocalSynthConfig {
    fn default() -> Self {
        let temp_dir = std::env::var("TTS_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let espeak_bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));

        Self {
            temp_dir,
            timeout_ms: env_u64("TTS_TIMEOUT_MS").unwrap_or(20_000),
            piper_bin: get_from_env_or_path("PIPER_BIN", "piper"),
            piper_voice: std::env::var("PIPER_VOICE").ok().map(PathBuf::from),
            piper_voice_dir: std::env::var("PIPER_VOICE_DIR").ok().map(PathBuf::from),
            espeak_bin,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Engine {
    Piper(PathBuf),
    Espeak,
}

pub struct LocalSpeechSynthesizer {
    cfg: LocalSynthConfig,
}

impl LocalSpeechSynthesizer {
    pub fn new(cfg: Option<LocalSynthConfig>) -> Self {
        let cfg = cfg.unwrap_or_default();
        // Log detected engines once
        if let Some(ref p) = cfg.piper_bin {
            info!(target = "tts", bin = ?p, "Detected Piper binary");
        }
        if let Some(ref e) = cfg.espeak_bin {
            info!(target = "tts", bin = ?e, "Detected espeak-ng binary");
        }
        Self { cfg }
    }

    pub fn has_engine(&self) -> bool {
        self.cfg.piper_bin.is_some() || self.cfg.espeak_bin.is_some()
    }

    fn select_engine(&self, voice: &str) -> Option<Engine> {
        if self.cfg.piper_bin.is_some() {
            if let Some(model) = resolve_piper_voice_path(&self.cfg, voice) {
                return Some(Engine::Piper(model));
            }
            debug!(target = "tts", voice, "No Piper model for voice");
        }
        self.cfg.espeak_bin.as_ref().map(|_| Engine::Espeak)
    }
}

#[async_trait]
impl SpeechSynthesizer for LocalSpeechSynthesizer {
    async fn synthesize(
        &self,
        voice: &str,
        text: &str,
        instructions: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        let engine = self
            .select_engine(voice)
            .ok_or_else(|| SynthesisError::Engine("no local TTS engine available".into()))?;
        if !instructions.is_empty() {
            debug!(target = "tts", "Local engines ignore instructions");
        }

        let cfg = self.cfg.clone();
        let voice = voice.to_string();
        let text = text.to_string();
        let join = task::spawn_blocking(move || {
            let wav_path = cfg.temp_dir.join(format!("{}.wav", temp_stem("tts")));
            let result = match &engine {
                Engine::Piper(model) => synth_with_piper(&cfg, model, &text, &wav_path),
                Engine::Espeak => synth_with_espeak(&cfg, &voice, &text, &wav_path),
            }
            .and_then(|_| {
                std::fs::read(&wav_path).map_err(|e| SynthesisError::Engine(e.to_string()))
            });
            let _ = std::fs::remove_file(&wav_path);
            result
        });

        match timeout(Duration::from_millis(self.cfg.timeout_ms), join).await {
            Ok(joined) => joined.map_err(|e| SynthesisError::Engine(e.to_string()))?,
            Err(_) => {
                warn!(target = "tts", timeout_ms = self.cfg.timeout_ms, "Local synthesis timed out");
                Err(SynthesisError::Timeout(self.cfg.timeout_ms))
            }
        }
    }
}

fn resolve_piper_voice_path(cfg: &LocalSynthConfig, voice: &str) -> Option<PathBuf> {
    if !voice.is_empty() {
        let vh = PathBuf::from(voice);
        if vh.exists() {
            return Some(vh);
        }
        if let Some(dir) = &cfg.piper_voice_dir {
            let candidate = dir.join(voice);
            if candidate.exists() {
                return Some(candidate);
            }
            for ext in ["onnx", "onnx.gz"].iter() {
                let c = dir.join(format!("{}.{}", voice, ext));
                if c.exists() {
                    return Some(c);
                }
            }
        }
    }
    cfg.piper_voice.clone()
}

fn synth_with_piper(
    cfg: &LocalSynthConfig,
    model: &Path,
    text: &str,
    out_wav: &Path,
) -> Result<(), SynthesisError> {
    let piper = cfg
        .piper_bin
        .as_ref()
        .ok_or_else(|| SynthesisError::Engine("Piper binary not found".into()))?;

    let mut cmd = Command::new(piper);
    cmd.arg("-m").arg(model);
    cmd.arg("-f").arg(out_wav);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!(target = "tts", command = ?cmd, "Running piper");
    let mut child = cmd.spawn().map_err(|e| SynthesisError::Engine(e.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| SynthesisError::Engine(e.to_string()))?;
    }
    let output = child
        .wait_with_output()
        .map_err(|e| SynthesisError::Engine(e.to_string()))?;
    if !output.status.success() {
        return Err(SynthesisError::Engine(format!(
            "Piper failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

fn synth_with_espeak(
    cfg: &LocalSynthConfig,
    voice: &str,
    text: &str,
    out_wav: &Path,
) -> Result<(), SynthesisError> {
    let espeak = cfg
        .espeak_bin
        .as_ref()
        .ok_or_else(|| SynthesisError::Engine("espeak-ng not found".into()))?;
    let mut cmd = Command::new(espeak);
    cmd.args(espeak_args(voice, out_wav)).arg(text);
    debug!(target = "tts", command = ?cmd, "Running espeak-ng");
    let output = cmd
        .output()
        .map_err(|e| SynthesisError::Engine(e.to_string()))?;
    if !output.status.success() {
        return Err(SynthesisError::Engine(format!(
            "espeak-ng failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

// Provider voice names (alloy, nova, ...) mean nothing to espeak
fn espeak_args(voice: &str, out_wav: &Path) -> Vec<String> {
    let mut args = Vec::new();
    if !voice.is_empty() && !is_provider_voice(voice) {
        args.push("-v".to_string());
        args.push(voice.to_string());
    }
    args.push("-w".to_string());
    args.push(out_wav.to_string_lossy().to_string());
    args
}

fn is_provider_voice(voice: &str) -> bool {
    matches!(
        voice,
        "alloy" | "ash" | "coral" | "echo" | "fable" | "onyx" | "nova" | "sage" | "shimmer"
    )
}
