//! Audio output through a command-line player.
//!
//! Each `play` writes the (gain/pan processed) audio to a temp file and runs
//! one player process against the requested output device. `stop` kills the
//! process currently playing on that output. Supported players:
//! - aplay   (`-D <device>`)
//! - paplay  (`--device=<sink>`)
//! - ffplay  (device via `AUDIODEV`)
//!
//! Env overrides:
//! - PLAYER_BIN (path or name; otherwise aplay, paplay, ffplay from PATH)
//! - TTS_TEMP_DIR

use crate::utils::{get_from_env_or_path, get_from_path, temp_stem};
use crate::wav;
use async_trait::async_trait;
use dashmap::DashMap;
use plastic_core::{AudioOutput, PlaybackError, DEFAULT_OUTPUT};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub player_bin: Option<PathBuf>,
    pub temp_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let temp_dir = std::env::var("TTS_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let player_bin = get_from_env_or_path("PLAYER_BIN", "aplay")
            .or_else(|| get_from_path("paplay"))
            .or_else(|| get_from_path("ffplay"));
        Self {
            player_bin,
            temp_dir,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerKind {
    Aplay,
    Paplay,
    Ffplay,
    Other,
}

impl PlayerKind {
    pub fn from_bin(bin: &Path) -> Self {
        match bin.file_name().and_then(|s| s.to_str()).unwrap_or("") {
            "aplay" => PlayerKind::Aplay,
            "paplay" => PlayerKind::Paplay,
            "ffplay" => PlayerKind::Ffplay,
            _ => PlayerKind::Other,
        }
    }

    /// Arguments and extra environment for playing `file` on `output_id`.
    pub fn command_args(
        &self,
        output_id: &str,
        file: &Path,
    ) -> (Vec<String>, Vec<(String, String)>) {
        let file = file.to_string_lossy().to_string();
        let device = (!output_id.is_empty() && output_id != DEFAULT_OUTPUT).then_some(output_id);
        match (self, device) {
            (PlayerKind::Aplay, Some(dev)) => {
                (vec!["-q".into(), "-D".into(), dev.into(), file], vec![])
            }
            (PlayerKind::Aplay, None) => (vec!["-q".into(), file], vec![]),
            (PlayerKind::Paplay, Some(dev)) => (vec![format!("--device={}", dev), file], vec![]),
            (PlayerKind::Paplay, None) => (vec![file], vec![]),
            (PlayerKind::Ffplay, dev) => (
                vec![
                    "-autoexit".into(),
                    "-nodisp".into(),
                    "-loglevel".into(),
                    "error".into(),
                    file,
                ],
                dev.map(|d| vec![("AUDIODEV".to_string(), d.to_string())])
                    .unwrap_or_default(),
            ),
            (PlayerKind::Other, _) => (vec![file], vec![]),
        }
    }
}

struct ActivePlayback {
    id: u64,
    stop: oneshot::Sender<()>,
}

// Removes the temp file however playback ends
struct TempAudio(PathBuf);

impl Drop for TempAudio {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

pub struct CommandAudioOutput {
    cfg: PlayerConfig,
    active: DashMap<String, ActivePlayback>,
    seq: AtomicU64,
}

impl CommandAudioOutput {
    pub fn new(cfg: Option<PlayerConfig>) -> Self {
        let cfg = cfg.unwrap_or_default();
        match &cfg.player_bin {
            Some(bin) => info!(target = "player", bin = ?bin, "Detected audio player"),
            None => warn!(target = "player", "No audio player found; playback will fail"),
        }
        Self {
            cfg,
            active: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Outputs with a sound currently playing.
    pub fn busy_outputs(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }

    fn prepare(&self, audio: &[u8], volume: f32, pan: f32) -> Vec<u8> {
        if wav::is_neutral(volume, pan) {
            return audio.to_vec();
        }
        match wav::apply_gain_pan(audio, volume, pan) {
            Ok(processed) => processed,
            Err(e) => {
                warn!(target = "player", error = %e, "Cannot apply gain/pan; playing unprocessed audio");
                audio.to_vec()
            }
        }
    }
}

#[async_trait]
impl AudioOutput for CommandAudioOutput {
    async fn play(
        &self,
        audio: &[u8],
        output_id: &str,
        volume: f32,
        pan: f32,
    ) -> Result<(), PlaybackError> {
        let bin = self.cfg.player_bin.as_ref().ok_or(PlaybackError::NoPlayer)?;
        let kind = PlayerKind::from_bin(bin);

        let temp = TempAudio(self.cfg.temp_dir.join(format!("{}.wav", temp_stem("plastic"))));
        tokio::fs::write(&temp.0, self.prepare(audio, volume, pan)).await?;

        // One sound per output
        self.stop(output_id).await;

        let (args, envs) = kind.command_args(output_id, &temp.0);
        let mut cmd = Command::new(bin);
        cmd.args(&args)
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(target = "player", command = ?cmd, output = output_id, "Starting player");
        let mut child = cmd.spawn().map_err(|e| PlaybackError::OutputUnavailable {
            output_id: output_id.to_string(),
            reason: format!("failed to start player: {}", e),
        })?;

        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.active.insert(
            output_id.to_string(),
            ActivePlayback { id, stop: stop_tx },
        );

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = stop_rx => None,
        };
        self.active.remove_if(output_id, |_, a| a.id == id);

        let Some(status) = status else {
            if let Err(e) = child.kill().await {
                debug!(target = "player", error = %e, "Player already gone");
            }
            debug!(target = "player", output = output_id, "Playback stopped");
            return Ok(());
        };

        let status = status?;
        if status.success() {
            return Ok(());
        }
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr).await;
        }
        Err(PlaybackError::OutputUnavailable {
            output_id: output_id.to_string(),
            reason: format!("player exited with {}: {}", status, stderr.trim()),
        })
    }

    async fn stop(&self, output_id: &str) {
        if let Some((_, active)) = self.active.remove(output_id) {
            let _ = active.stop.send(());
            debug!(target = "player", output = output_id, "Stop requested");
        }
    }
}
