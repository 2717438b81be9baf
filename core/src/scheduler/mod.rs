//! Playback scheduler.
//!
//! A single loop drains the line queue: pop a line, resolve its speaker,
//! fetch audio through the synthesis cache, play it, repeat. Operator
//! controls (`push`, `interrupt`, `set_playing`, ...) mutate the same state
//! through one async mutex, and wake the loop when it is idle.
//!
//! Interruptions preempt the running line: its output is stopped, the
//! interruption lines are spliced at the head of the queue followed by a
//! continuity phrase and the preempted line, and the epoch channel tells the
//! running line to abandon whatever it is awaiting.

mod config;
mod state;

pub use config::SchedulerConfig;

use crate::audio::{AudioOutput, PlaybackError};
use crate::cache::SynthesisCache;
use crate::event::{Event, EventBus};
use crate::model::{
    Conversation, CurrentPlayback, Line, SpeakerConfig, SpeakerId, TransportState,
};
use crate::script::{self, Segment};
use crate::{PlasticError, Result};
use state::SchedulerState;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Queue empty or paused; the loop waited
    Idle,
    /// A line was voiced to completion
    Spoke { speaker: SpeakerId },
    /// No speaker config for the line; dropped
    Skipped { speaker: SpeakerId },
    /// Synthesis or playback failed; line abandoned
    Failed { speaker: SpeakerId, error: String },
    /// An interruption took over mid-line
    Preempted { speaker: SpeakerId },
}

/// Point-in-time copy of the scheduler state
#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub queue: Vec<Line>,
    pub current: CurrentPlayback,
    pub transport: TransportState,
    pub speakers: Vec<SpeakerId>,
    pub conversations: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum LineEnd {
    Completed,
    Preempted,
}

struct Inner {
    state: Mutex<SchedulerState>,
    wake: Notify,
    epoch: watch::Sender<u64>,
    cache: Arc<SynthesisCache>,
    output: Arc<dyn AudioOutput>,
    bus: Option<Arc<EventBus>>,
    cfg: SchedulerConfig,
}

/// Cheap to clone; clones share one queue and one loop state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        cache: Arc<SynthesisCache>,
        output: Arc<dyn AudioOutput>,
        bus: Option<Arc<EventBus>>,
        cfg: SchedulerConfig,
    ) -> Self {
        let (epoch, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::new(cfg.rng_seed)),
                wake: Notify::new(),
                epoch,
                cache,
                output,
                bus,
                cfg,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.cfg
    }

    /// Spawn the playback loop. It runs until the task is aborted.
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        info!(target = "scheduler", "Playback loop started");
        tokio::spawn(async move {
            loop {
                let outcome = scheduler.tick().await;
                debug!(target = "scheduler", ?outcome, "Tick");
            }
        })
    }

    // ---- queue ----

    /// Append lines to the back of the queue.
    pub async fn push(&self, lines: impl IntoIterator<Item = Line>) {
        let queued = {
            let mut state = self.inner.state.lock().await;
            state.queue.extend(lines);
            state.queue.len()
        };
        debug!(target = "scheduler", queued, "Lines queued");
        self.inner.wake.notify_one();
    }

    pub async fn push_conversation(&self, conversation: &Conversation) {
        info!(
            target = "scheduler",
            title = %conversation.title,
            lines = conversation.lines.len(),
            "Queueing conversation"
        );
        self.push(conversation.lines.iter().cloned()).await;
    }

    /// Replace everything still queued. The current line is unaffected.
    pub async fn replace_queue(&self, lines: Vec<Line>) {
        self.inner.state.lock().await.replace_queue(lines);
        self.inner.wake.notify_one();
    }

    /// Drop all queued lines. The current line keeps playing.
    pub async fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.inner.state.lock().await;
            let n = state.queue.len();
            state.queue.clear();
            n
        };
        info!(target = "scheduler", dropped, "Queue cleared");
        self.publish(Event::new("queue.cleared", "scheduler").with_meta("dropped", dropped))
            .await;
        dropped
    }

    /// Preempt the current line with `lines`.
    ///
    /// Lines with a blank speaker take the preempted line's speaker, else a
    /// random registered speaker, else `unknown`.
    pub async fn interrupt(&self, lines: Vec<Line>) {
        let interrupting = lines.len();
        let (target, resumed, queued) = {
            let mut state = self.inner.state.lock().await;
            let target = state
                .current
                .speaker_config
                .as_ref()
                .map(|c| c.output_id.clone())
                .unwrap_or_else(|| self.inner.cfg.default_output.clone());

            // Epoch first, so the running line sees the preemption before
            // its stopped sound resolves. Both happen under the lock so no
            // newly popped line can start in between.
            self.inner.epoch.send_modify(|e| *e = e.wrapping_add(1));
            self.inner.output.stop(&target).await;

            let resumed = state.splice_interruption(lines, &self.inner.cfg.continuity_phrase);
            (target, resumed, state.queue.len())
        };
        self.inner.wake.notify_one();

        info!(
            target = "scheduler",
            output = %target,
            interrupting,
            resumes = resumed.is_some(),
            queued,
            "Interruption applied"
        );
        let mut event = Event::new("interruption", "scheduler")
            .with_meta("output", &target)
            .with_meta("lines", interrupting)
            .with_priority(80);
        if let Some(line) = resumed {
            event = event.with_meta("resumed_speaker", &line.speaker);
        }
        self.publish(event).await;
    }

    pub async fn interrupt_with_text(&self, text: impl Into<String>) {
        self.interrupt(vec![Line::unattributed(text)]).await;
    }

    // ---- transport ----

    pub async fn set_playing(&self, playing: bool) {
        self.inner.state.lock().await.transport.is_playing = playing;
        self.inner.wake.notify_one();
        info!(target = "scheduler", playing, "Transport changed");
        self.publish(Event::new("transport.changed", "scheduler").with_meta("playing", playing))
            .await;
    }

    /// Flip play/pause and return the new value.
    pub async fn toggle_playing(&self) -> bool {
        let playing = {
            let mut state = self.inner.state.lock().await;
            state.transport.is_playing = !state.transport.is_playing;
            state.transport.is_playing
        };
        self.inner.wake.notify_one();
        info!(target = "scheduler", playing, "Transport toggled");
        self.publish(Event::new("transport.changed", "scheduler").with_meta("playing", playing))
            .await;
        playing
    }

    pub async fn set_auto_pick(&self, enabled: bool) {
        self.inner.state.lock().await.transport.auto_pick_enabled = enabled;
        self.inner.wake.notify_one();
        info!(target = "scheduler", enabled, "Auto-pick changed");
    }

    pub async fn set_language(&self, language: impl Into<String>) {
        let language = language.into();
        info!(target = "scheduler", language = %language, "Language changed");
        self.inner.state.lock().await.transport.current_language = language;
    }

    // ---- configuration ----

    pub async fn register_conversation(&self, conversation: Conversation) {
        let mut state = self.inner.state.lock().await;
        if let Some(existing) = state
            .conversations
            .iter_mut()
            .find(|c| c.title == conversation.title)
        {
            *existing = conversation;
        } else {
            state.conversations.push(conversation);
        }
    }

    pub async fn set_speaker_config(&self, speaker: impl Into<SpeakerId>, config: SpeakerConfig) {
        let speaker = speaker.into();
        debug!(target = "scheduler", speaker = %speaker, output = %config.output_id, voice = %config.voice_id, "Speaker configured");
        self.inner
            .state
            .lock()
            .await
            .speakers
            .insert(speaker, config.normalized());
    }

    pub async fn remove_speaker(&self, speaker: &SpeakerId) -> Option<SpeakerConfig> {
        self.inner.state.lock().await.speakers.remove(speaker)
    }

    pub async fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.inner.state.lock().await;
        SchedulerSnapshot {
            queue: state.queue.iter().cloned().collect(),
            current: state.current.clone(),
            transport: state.transport.clone(),
            speakers: state.speakers.keys().cloned().collect(),
            conversations: state.conversations.iter().map(|c| c.title.clone()).collect(),
        }
    }

    // ---- loop ----

    /// Run one loop iteration.
    pub async fn tick(&self) -> TickOutcome {
        self.auto_pick().await;

        let popped = {
            let mut state = self.inner.state.lock().await;
            if state.queue.is_empty() || !state.transport.is_playing {
                state.current.clear();
                None
            } else {
                // Subscribed under the lock: any later interrupt is observed.
                let epoch = self.inner.epoch.subscribe();
                state.pop_current().map(|line| (line, epoch))
            }
        };

        let Some((line, epoch)) = popped else {
            self.idle().await;
            return TickOutcome::Idle;
        };
        let speaker = line.speaker.clone();

        let config = {
            let mut state = self.inner.state.lock().await;
            match state.speakers.get(&speaker).cloned() {
                Some(config) => {
                    if state.current.is_active() {
                        state.current.speaker_config = Some(config.clone());
                    }
                    Some(config)
                }
                None => {
                    state.current.clear();
                    None
                }
            }
        };

        let Some(config) = config else {
            let err = PlasticError::UnknownSpeaker(speaker.clone());
            warn!(target = "scheduler", speaker = %speaker, error = %err, "Dropping line");
            self.publish(
                Event::new("line.skipped", "scheduler")
                    .with_meta("speaker", &speaker)
                    .with_meta("error", &err),
            )
            .await;
            return TickOutcome::Skipped { speaker };
        };

        info!(
            target = "scheduler",
            speaker = %speaker,
            output = %config.output_id,
            voice = %config.voice_id,
            "Saying line"
        );
        self.publish(
            Event::new("line.start", "scheduler")
                .with_meta("speaker", &speaker)
                .with_meta("output", &config.output_id)
                .with_meta("voice", &config.voice_id)
                .with_meta("text", &line.text),
        )
        .await;

        match self.speak(&line, &config, epoch).await {
            Ok(LineEnd::Completed) => {
                self.publish(Event::new("line.done", "scheduler").with_meta("speaker", &speaker))
                    .await;
                TickOutcome::Spoke { speaker }
            }
            Ok(LineEnd::Preempted) => {
                info!(target = "scheduler", speaker = %speaker, "Line preempted");
                self.publish(
                    Event::new("line.preempted", "scheduler").with_meta("speaker", &speaker),
                )
                .await;
                TickOutcome::Preempted { speaker }
            }
            Err(e) => {
                warn!(target = "scheduler", speaker = %speaker, error = %e, "Abandoning line");
                self.publish(
                    Event::new("line.error", "scheduler")
                        .with_meta("speaker", &speaker)
                        .with_meta("error", &e)
                        .with_priority(70),
                )
                .await;
                TickOutcome::Failed {
                    speaker,
                    error: e.to_string(),
                }
            }
        }
    }

    // Replaces an empty queue with a random conversation in the current language.
    async fn auto_pick(&self) -> Option<String> {
        let picked = {
            let mut state = self.inner.state.lock().await;
            if !state.queue.is_empty()
                || !state.transport.auto_pick_enabled
                || state.conversations.is_empty()
            {
                return None;
            }
            match state.pick_conversation() {
                Some(conversation) => conversation.clone(),
                None => {
                    debug!(
                        target = "scheduler",
                        language = %state.transport.current_language,
                        "No conversation in current language"
                    );
                    return None;
                }
            }
        };

        if !self.inner.cfg.autopick_delay.is_zero() {
            tokio::time::sleep(self.inner.cfg.autopick_delay).await;
        }

        {
            let mut state = self.inner.state.lock().await;
            if !state.queue.is_empty() || !state.transport.auto_pick_enabled {
                debug!(target = "scheduler", "Queue changed during auto-pick delay; skipping");
                return None;
            }
            state.replace_queue(picked.lines.clone());
        }

        info!(
            target = "scheduler",
            title = %picked.title,
            lines = picked.lines.len(),
            "Auto-picked conversation"
        );
        self.publish(
            Event::new("queue.autopick", "scheduler")
                .with_meta("title", &picked.title)
                .with_meta("language", &picked.language),
        )
        .await;
        Some(picked.title)
    }

    // Flush the cache, then wait for a poll interval or an external wake.
    async fn idle(&self) {
        if let Err(e) = self.inner.cache.flush().await {
            warn!(target = "cache", error = %e, "Cache flush failed");
        }
        tokio::select! {
            _ = tokio::time::sleep(self.inner.cfg.poll_interval) => {}
            _ = self.inner.wake.notified() => {
                debug!(target = "scheduler", "Woken from idle");
            }
        }
    }

    async fn speak(
        &self,
        line: &Line,
        config: &SpeakerConfig,
        mut epoch: watch::Receiver<u64>,
    ) -> Result<LineEnd> {
        for segment in script::segments(&line.text) {
            match segment {
                Segment::Pause(pause) => {
                    debug!(target = "scheduler", ?pause, "Pausing mid-line");
                    tokio::select! {
                        biased;
                        _ = preempted(&mut epoch) => return Ok(LineEnd::Preempted),
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                Segment::Speech(text) => {
                    let audio = tokio::select! {
                        biased;
                        _ = preempted(&mut epoch) => return Ok(LineEnd::Preempted),
                        res = self.inner.cache.get_or_create(
                            &config.voice_id,
                            &text,
                            &config.instructions,
                        ) => res?,
                    };
                    if self.play(&audio, config, &mut epoch).await? == LineEnd::Preempted {
                        return Ok(LineEnd::Preempted);
                    }
                }
            }
        }
        Ok(LineEnd::Completed)
    }

    async fn play(
        &self,
        audio: &[u8],
        config: &SpeakerConfig,
        epoch: &mut watch::Receiver<u64>,
    ) -> Result<LineEnd> {
        let output = &self.inner.output;
        let first = tokio::select! {
            biased;
            _ = preempted(epoch) => {
                output.stop(&config.output_id).await;
                return Ok(LineEnd::Preempted);
            }
            res = output.play(audio, &config.output_id, config.volume, config.pan) => res,
        };

        let default_output = &self.inner.cfg.default_output;
        match first {
            Ok(()) => Ok(LineEnd::Completed),
            Err(PlaybackError::OutputUnavailable { reason, .. })
                if config.output_id != *default_output =>
            {
                warn!(
                    target = "scheduler",
                    output = %config.output_id,
                    fallback = %default_output,
                    reason = %reason,
                    "Output unavailable; using default output"
                );
                tokio::select! {
                    biased;
                    _ = preempted(epoch) => {
                        output.stop(default_output).await;
                        Ok(LineEnd::Preempted)
                    }
                    res = output.play(audio, default_output, config.volume, config.pan) => {
                        res?;
                        Ok(LineEnd::Completed)
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.inner.bus {
            if let Err(e) = bus.publish(&self.inner.cfg.event_topic, event).await {
                warn!(target = "scheduler", error = %e, "Failed to publish playback event");
            }
        }
    }
}

// Resolves once an interruption bumps the epoch.
async fn preempted(epoch: &mut watch::Receiver<u64>) {
    if epoch.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}
