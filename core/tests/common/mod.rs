// Test doubles for the audio seams
#![allow(dead_code)]

use async_trait::async_trait;
use plastic_core::{AudioOutput, PlaybackError, SpeechSynthesizer, SynthesisError};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayRecord {
    pub output_id: String,
    pub audio: Vec<u8>,
    pub volume: f32,
    pub pan: f32,
}

impl PlayRecord {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.audio).into_owned()
    }
}

/// Records plays and stops. When gated, each play blocks until `release`.
#[derive(Default)]
pub struct RecordingOutput {
    plays: Mutex<Vec<PlayRecord>>,
    stops: Mutex<Vec<String>>,
    unavailable: Mutex<HashSet<String>>,
    gated: bool,
    // Stop ends the gated play like a killed player process
    release_on_stop: bool,
    gate: Notify,
    started: Notify,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    /// Gated, and `stop` lets the blocked play return `Ok`.
    pub fn released_by_stop() -> Self {
        Self {
            gated: true,
            release_on_stop: true,
            ..Self::default()
        }
    }

    pub fn mark_unavailable(&self, output_id: &str) {
        self.unavailable.lock().unwrap().insert(output_id.to_string());
    }

    /// Let one blocked (or the next) play finish.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Resolves when a play begins.
    pub async fn play_started(&self) {
        self.started.notified().await;
    }

    pub fn plays(&self) -> Vec<PlayRecord> {
        self.plays.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<String> {
        self.stops.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn play(
        &self,
        audio: &[u8],
        output_id: &str,
        volume: f32,
        pan: f32,
    ) -> Result<(), PlaybackError> {
        if self.unavailable.lock().unwrap().contains(output_id) {
            return Err(PlaybackError::OutputUnavailable {
                output_id: output_id.to_string(),
                reason: "unplugged".into(),
            });
        }
        self.plays.lock().unwrap().push(PlayRecord {
            output_id: output_id.to_string(),
            audio: audio.to_vec(),
            volume,
            pan,
        });
        self.started.notify_one();
        if self.gated {
            self.gate.notified().await;
        }
        Ok(())
    }

    async fn stop(&self, output_id: &str) {
        self.stops.lock().unwrap().push(output_id.to_string());
        if self.release_on_stop {
            self.gate.notify_one();
            // Give the woken play time to finish before the caller continues
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// "Synthesizes" by returning the text bytes; fails on listed texts.
#[derive(Default)]
pub struct EchoSynth {
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl EchoSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for EchoSynth {
    async fn synthesize(
        &self,
        _voice: &str,
        text: &str,
        _instructions: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(text) {
            return Err(SynthesisError::Provider("quota exceeded".into()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Poll `check` until it holds or the timeout elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
