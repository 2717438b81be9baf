// Plastic Core Library
// Playback scheduling core for speaking mannequins

pub mod audio;
pub mod cache;
pub mod control;
pub mod event;
pub mod model;
pub mod scheduler;
pub mod script;
pub mod storage;

// Export core types
pub use audio::{AudioOutput, PlaybackError, SpeechSynthesizer, SynthesisError, DEFAULT_OUTPUT};
pub use cache::{CacheKey, CacheStats, SynthesisCache};
pub use control::{
    ControlSurface, NoteBindings, NoteEvent, NoteListener, TransportAction, DEFAULT_DEBOUNCE,
};
pub use event::{Event, EventBus, EventHandler, QoSLevel, TopicStats};
pub use model::{
    Conversation, CurrentPlayback, InterruptionTexts, Line, SpeakerConfig, SpeakerId,
    TransportState,
};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerSnapshot, TickOutcome};
pub use storage::{CacheRecord, CacheStore, MemoryCacheStore, RocksDbCacheStore};

use std::sync::Arc;
use std::time::Duration;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlasticError {
    #[error("Unknown speaker: {0}")]
    UnknownSpeaker(SpeakerId),

    #[error("Synthesis failure: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Playback failure: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Malformed conversation text: {0}")]
    MalformedConversation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, PlasticError>;

/// Core runtime: event bus, synthesis cache, scheduler loop and control surface.
pub struct Show {
    pub event_bus: Arc<EventBus>,
    pub cache: Arc<SynthesisCache>,
    pub scheduler: Scheduler,
    pub control: Arc<ControlSurface>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Show {
    pub async fn new(
        output: Arc<dyn AudioOutput>,
        cache: Arc<SynthesisCache>,
        scheduler_cfg: SchedulerConfig,
        debounce: Duration,
    ) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new().await?);
        let scheduler = Scheduler::new(
            Arc::clone(&cache),
            output,
            Some(Arc::clone(&event_bus)),
            scheduler_cfg,
        );
        Ok(Self {
            event_bus,
            cache,
            scheduler,
            control: Arc::new(ControlSurface::new(debounce)),
            handles: Vec::new(),
        })
    }

    /// Bind transport actions and conversation trigger notes on the control surface.
    pub fn bind_controls(
        &self,
        bindings: &NoteBindings,
        texts: &InterruptionTexts,
        conversations: &[Conversation],
    ) {
        control::bind_transport(&self.control, &self.scheduler, bindings, texts);
        for conversation in conversations {
            if let Some(note) = conversation.trigger_note {
                control::bind_conversation(&self.control, &self.scheduler, note, conversation);
            }
        }
        tracing::info!(
            target = "control",
            bound_notes = self.control.bound_notes().len(),
            "Control surface bound"
        );
    }

    /// Start the scheduler loop and pump controller events from `notes`.
    pub async fn start(&mut self, notes: tokio::sync::mpsc::Receiver<NoteEvent>) -> Result<()> {
        tracing::info!("Starting show...");

        if let Err(e) = self.cache.load().await {
            tracing::warn!(target = "cache", error = %e, "Failed to load synthesis cache");
        }
        self.handles.push(self.scheduler.start());
        self.handles.push(Arc::clone(&self.control).start(notes));

        tracing::info!("Show started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down show...");

        for handle in self.handles.drain(..) {
            handle.abort();
        }
        self.cache.flush().await?;
        self.event_bus.shutdown().await?;

        tracing::info!("Show shut down successfully");
        Ok(())
    }
}
