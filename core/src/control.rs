//! Control surface binding.
//!
//! Controller input arrives already normalized as [`NoteEvent`]s. Any number
//! of listeners can sit on one note and all of them receive every event.
//! Bindings built here fire their action only on the transition into "on":
//! a held note fires once, and a new press inside the debounce window after
//! the previous fire is ignored.

use crate::model::{Conversation, InterruptionTexts, Line};
use crate::scheduler::Scheduler;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Debounce window used when `PLASTIC_DEBOUNCE_MS` is unset
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Normalized controller event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub note: u8,
    /// 0.0..=1.0; zero is a release
    pub velocity: f32,
    pub is_on_edge: bool,
}

impl NoteEvent {
    pub fn new(note: u8, velocity: f32) -> Self {
        let velocity = if velocity.is_nan() {
            0.0
        } else {
            velocity.clamp(0.0, 1.0)
        };
        Self {
            note,
            velocity,
            is_on_edge: velocity > 0.0,
        }
    }

    /// From a raw 7-bit MIDI velocity.
    pub fn from_midi_velocity(note: u8, velocity: u8) -> Self {
        Self::new(note, f32::from(velocity.min(127)) / 127.0)
    }

    pub fn off(note: u8) -> Self {
        Self::new(note, 0.0)
    }
}

#[async_trait]
pub trait NoteListener: Send + Sync {
    async fn on_note(&self, event: &NoteEvent);
}

/// What a bound note does to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportAction {
    TogglePlay,
    ClearQueue,
    Interrupt(String),
    QueueConversation(Vec<Line>),
}

impl TransportAction {
    pub async fn apply(&self, scheduler: &Scheduler) {
        match self {
            TransportAction::TogglePlay => {
                scheduler.toggle_playing().await;
            }
            TransportAction::ClearQueue => {
                scheduler.clear().await;
            }
            TransportAction::Interrupt(text) => {
                scheduler.interrupt_with_text(text.clone()).await;
            }
            TransportAction::QueueConversation(lines) => {
                scheduler.push(lines.iter().cloned()).await;
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TransportAction::TogglePlay => "toggle_play",
            TransportAction::ClearQueue => "clear_queue",
            TransportAction::Interrupt(_) => "interrupt",
            TransportAction::QueueConversation(_) => "queue_conversation",
        }
    }
}

/// Note numbers for the transport controls; `None` leaves a control unbound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteBindings {
    pub toggle_play: Option<u8>,
    pub clear_queue: Option<u8>,
    pub welcome: Option<u8>,
    pub hush: Option<u8>,
    pub goodbye: Option<u8>,
}

/// Fans note events out to the listeners registered on each note.
pub struct ControlSurface {
    listeners: DashMap<u8, Vec<Arc<dyn NoteListener>>>,
    debounce: Duration,
}

impl Default for ControlSurface {
    fn default() -> Self {
        let debounce = std::env::var("PLASTIC_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);
        Self::new(debounce)
    }
}

impl ControlSurface {
    pub fn new(debounce: Duration) -> Self {
        Self {
            listeners: DashMap::new(),
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn add_listener(&self, note: u8, listener: Arc<dyn NoteListener>) {
        self.listeners.entry(note).or_default().push(listener);
    }

    pub fn bound_notes(&self) -> Vec<u8> {
        let mut notes: Vec<u8> = self.listeners.iter().map(|e| *e.key()).collect();
        notes.sort_unstable();
        notes
    }

    /// Deliver `event` to every listener on its note.
    pub async fn dispatch(&self, event: NoteEvent) -> usize {
        let listeners = match self.listeners.get(&event.note) {
            Some(list) => list.value().clone(),
            None => {
                debug!(target = "control", note = event.note, "Unbound note");
                return 0;
            }
        };
        for listener in &listeners {
            listener.on_note(&event).await;
        }
        listeners.len()
    }

    /// Pump events from `rx` until the sender side closes.
    pub fn start(self: Arc<Self>, mut rx: mpsc::Receiver<NoteEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(target = "control", "Control surface listening");
            while let Some(event) = rx.recv().await {
                self.dispatch(event).await;
            }
            info!(target = "control", "Controller input closed");
        })
    }
}

// Fires its action once per press, with a minimum gap between fires.
struct EdgeBinding {
    action: TransportAction,
    scheduler: Scheduler,
    held: AtomicBool,
    last_fired: Mutex<Option<Instant>>,
    debounce: Duration,
}

impl EdgeBinding {
    fn new(action: TransportAction, scheduler: Scheduler, debounce: Duration) -> Self {
        Self {
            action,
            scheduler,
            held: AtomicBool::new(false),
            last_fired: Mutex::new(None),
            debounce,
        }
    }

    fn should_fire(&self, event: &NoteEvent) -> bool {
        if !event.is_on_edge {
            self.held.store(false, Ordering::SeqCst);
            return false;
        }
        if self.held.swap(true, Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        let Ok(mut last) = self.last_fired.lock() else {
            return false;
        };
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.debounce {
                debug!(target = "control", note = event.note, "Debounced");
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

#[async_trait]
impl NoteListener for EdgeBinding {
    async fn on_note(&self, event: &NoteEvent) {
        if self.should_fire(event) {
            info!(
                target = "control",
                note = event.note,
                action = self.action.name(),
                "Note triggered action"
            );
            self.action.apply(&self.scheduler).await;
        }
    }
}

pub fn bind_action(
    surface: &ControlSurface,
    scheduler: &Scheduler,
    note: u8,
    action: TransportAction,
) {
    let binding = EdgeBinding::new(action, scheduler.clone(), surface.debounce);
    surface.add_listener(note, Arc::new(binding));
}

/// Bind the transport controls and the three canned interruptions.
pub fn bind_transport(
    surface: &ControlSurface,
    scheduler: &Scheduler,
    bindings: &NoteBindings,
    texts: &InterruptionTexts,
) {
    let actions = [
        (bindings.toggle_play, TransportAction::TogglePlay),
        (bindings.clear_queue, TransportAction::ClearQueue),
        (bindings.welcome, TransportAction::Interrupt(texts.welcome.clone())),
        (bindings.hush, TransportAction::Interrupt(texts.hush.clone())),
        (bindings.goodbye, TransportAction::Interrupt(texts.goodbye.clone())),
    ];
    for (note, action) in actions {
        if let Some(note) = note {
            bind_action(surface, scheduler, note, action);
        }
    }
}

/// Bind a note that appends the conversation's lines to the queue.
pub fn bind_conversation(
    surface: &ControlSurface,
    scheduler: &Scheduler,
    note: u8,
    conversation: &Conversation,
) {
    debug!(target = "control", note, title = %conversation.title, "Binding conversation");
    bind_action(
        surface,
        scheduler,
        note,
        TransportAction::QueueConversation(conversation.lines.clone()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_is_normalized() {
        assert!(!NoteEvent::from_midi_velocity(60, 0).is_on_edge);
        let ev = NoteEvent::from_midi_velocity(60, 127);
        assert!(ev.is_on_edge);
        assert_eq!(ev.velocity, 1.0);
        assert_eq!(NoteEvent::new(1, 4.0).velocity, 1.0);
        assert!(!NoteEvent::new(1, -0.5).is_on_edge);
        assert!(!NoteEvent::new(1, f32::NAN).is_on_edge);
    }

    #[test]
    fn bindings_deserialize_partially() {
        let b: NoteBindings = serde_json::from_str(r#"{"toggle_play": 36, "hush": 40}"#).unwrap();
        assert_eq!(b.toggle_play, Some(36));
        assert_eq!(b.hush, Some(40));
        assert_eq!(b.welcome, None);
    }
}
