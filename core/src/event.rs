// Playback event bus
use crate::audio::utils::{gen_id, now_ms};
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Observability event published by the scheduler and its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub timestamp_ms: i64,
    pub source: String,
    pub metadata: HashMap<String, String>,
    pub priority: i32,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: gen_id(),
            event_type: event_type.into(),
            timestamp_ms: now_ms(),
            source: source.into(),
            metadata: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// How a subscriber copes with a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QoSLevel {
    /// Small queue; events are dropped while the subscriber lags
    Realtime,
    /// Large queue; the publisher waits for room
    Background,
}

impl QoSLevel {
    fn capacity(self) -> usize {
        match self {
            QoSLevel::Realtime => 64,
            QoSLevel::Background => 4096,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Subscriber {
    id: String,
    event_types: Vec<String>,
    qos: QoSLevel,
    sender: mpsc::Sender<Event>,
}

impl Subscriber {
    fn wants(&self, event: &Event) -> bool {
        self.event_types.is_empty() || self.event_types.contains(&event.event_type)
    }
}

/// Per-topic delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

/// Fan-out of playback events to log sinks and monitors, keyed by topic
pub struct EventBus {
    topics: Arc<DashMap<String, Vec<Subscriber>>>,
    stats: Arc<DashMap<String, TopicStats>>,
}

impl EventBus {
    pub async fn new() -> Result<Self> {
        Ok(Self {
            topics: Arc::new(DashMap::new()),
            stats: Arc::new(DashMap::new()),
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!(target = "event", topics = self.topics.len(), "Event bus shutting down");
        self.topics.clear();
        for mut stats in self.stats.iter_mut() {
            stats.subscribers = 0;
        }
        Ok(())
    }

    /// Deliver `event` to every interested subscriber of `topic`; returns how many got it.
    /// Subscribers whose receiver is gone are forgotten.
    pub async fn publish(&self, topic: &str, event: Event) -> Result<u64> {
        // Clone the list so no map guard is held across awaits
        let subscribers = match self.topics.get(topic) {
            Some(entry) => entry.value().clone(),
            None => {
                self.record(topic, |stats| stats.published += 1);
                debug!(target = "event", topic, kind = %event.event_type, "No subscribers");
                return Ok(0);
            }
        };

        let mut delivered = 0;
        let mut dropped = 0;
        let mut closed = Vec::new();
        for sub in subscribers.iter().filter(|sub| sub.wants(&event)) {
            let sent = match sub.qos {
                QoSLevel::Realtime => match sub.sender.try_send(event.clone()) {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped += 1;
                        continue;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => Err(()),
                },
                QoSLevel::Background => sub.sender.send(event.clone()).await.map_err(|_| ()),
            };
            match sent {
                Ok(()) => delivered += 1,
                Err(()) => closed.push(sub.id.clone()),
            }
        }

        if dropped > 0 {
            warn!(target = "event", topic, dropped, "Lagging subscribers missed an event");
        }
        if !closed.is_empty() {
            self.forget(topic, &closed);
        }
        self.record(topic, |stats| {
            stats.published += 1;
            stats.delivered += delivered;
            stats.dropped += dropped;
        });
        Ok(delivered)
    }

    /// Subscribe to `topic`, optionally narrowed to `event_types`.
    pub async fn subscribe(
        &self,
        topic: &str,
        event_types: Vec<String>,
        qos: QoSLevel,
    ) -> Result<(String, mpsc::Receiver<Event>)> {
        let id = format!("sub_{}_{}", topic, gen_id());
        let (sender, rx) = mpsc::channel(qos.capacity());
        self.topics.entry(topic.to_string()).or_default().push(Subscriber {
            id: id.clone(),
            event_types,
            qos,
            sender,
        });
        self.record(topic, |stats| stats.subscribers += 1);
        debug!(target = "event", topic, id = %id, ?qos, "Subscribed");
        Ok((id, rx))
    }

    /// Subscribe `handler` to a topic; events are handled in order on a spawned task.
    pub async fn attach(
        &self,
        topic: &str,
        event_types: Vec<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let (_, mut rx) = self.subscribe(topic, event_types, QoSLevel::Background).await?;
        Ok(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = handler.handle(event).await {
                    warn!(target = "event", error = %e, "Event handler failed");
                }
            }
        }))
    }

    pub fn stats(&self, topic: &str) -> TopicStats {
        self.stats.get(topic).map(|s| s.clone()).unwrap_or_default()
    }

    fn forget(&self, topic: &str, ids: &[String]) {
        let mut removed = 0;
        if let Some(mut subs) = self.topics.get_mut(topic) {
            let before = subs.len();
            subs.retain(|sub| !ids.contains(&sub.id));
            removed = before - subs.len();
        }
        if removed > 0 {
            debug!(target = "event", topic, removed, "Dropped closed subscriptions");
            self.record(topic, |stats| {
                stats.subscribers = stats.subscribers.saturating_sub(removed)
            });
        }
    }

    fn record(&self, topic: &str, f: impl FnOnce(&mut TopicStats)) {
        f(&mut self.stats.entry(topic.to_string()).or_default());
    }
}
