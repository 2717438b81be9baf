use async_trait::async_trait;
use plastic_core::event::{Event, EventBus, EventHandler, QoSLevel, TopicStats};
use plastic_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn line_event(kind: &str, speaker: &str) -> Event {
    Event::new(kind, "scheduler").with_meta("speaker", speaker)
}

async fn next(rx: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("timeout")
        .expect("channel closed")
}

#[tokio::test]
async fn monitor_narrowed_to_line_starts() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_, mut starts) = bus
        .subscribe("playback", vec!["line.start".to_string()], QoSLevel::Background)
        .await?;
    let (_, mut everything) = bus.subscribe("playback", vec![], QoSLevel::Background).await?;

    bus.publish("playback", line_event("line.start", "[HELIO]")).await?;
    bus.publish("playback", line_event("line.done", "[HELIO]")).await?;
    let delivered = bus.publish("playback", line_event("line.start", "[SELENE]")).await?;
    assert_eq!(delivered, 2);

    let speakers: Vec<String> = [next(&mut starts).await, next(&mut starts).await]
        .iter()
        .map(|e| e.metadata["speaker"].clone())
        .collect();
    assert_eq!(speakers, vec!["[HELIO]", "[SELENE]"]);
    assert!(starts.try_recv().is_err(), "line.done should have been filtered");

    let mut kinds = Vec::new();
    while let Ok(event) = everything.try_recv() {
        kinds.push(event.event_type);
    }
    assert_eq!(kinds, vec!["line.start", "line.done", "line.start"]);
    Ok(())
}

#[tokio::test]
async fn lagging_realtime_monitor_loses_events() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_, mut rx) = bus.subscribe("playback", vec![], QoSLevel::Realtime).await?;

    for _ in 0..100 {
        bus.publish("playback", line_event("line.done", "[A]")).await?;
    }

    let mut received = 0u64;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    let stats = bus.stats("playback");
    assert_eq!(received, 64);
    assert_eq!(stats.published, 100);
    assert_eq!(stats.delivered, 64);
    assert_eq!(stats.dropped, 36);
    Ok(())
}

#[tokio::test]
async fn publishing_without_listeners_still_counts() -> Result<()> {
    let bus = EventBus::new().await?;
    assert_eq!(bus.publish("playback", line_event("line.start", "[A]")).await?, 0);
    assert_eq!(
        bus.stats("playback"),
        TopicStats {
            published: 1,
            ..TopicStats::default()
        }
    );
    assert_eq!(bus.stats("never-used"), TopicStats::default());
    Ok(())
}

#[tokio::test]
async fn dropped_receiver_is_forgotten() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_, gone) = bus.subscribe("playback", vec![], QoSLevel::Background).await?;
    let (_, mut kept) = bus.subscribe("playback", vec![], QoSLevel::Realtime).await?;
    assert_eq!(bus.stats("playback").subscribers, 2);
    drop(gone);

    assert_eq!(bus.publish("playback", line_event("line.start", "[A]")).await?, 1);
    assert_eq!(bus.stats("playback").subscribers, 1);
    assert_eq!(next(&mut kept).await.event_type, "line.start");
    Ok(())
}

#[tokio::test]
async fn shutdown_detaches_everyone() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_, mut rx) = bus.subscribe("playback", vec![], QoSLevel::Background).await?;

    bus.shutdown().await?;

    assert_eq!(bus.publish("playback", line_event("line.start", "[A]")).await?, 0);
    assert_eq!(bus.stats("playback").subscribers, 0);
    assert!(rx.recv().await.is_none());
    Ok(())
}

struct Forward(mpsc::UnboundedSender<Event>);

#[async_trait]
impl EventHandler for Forward {
    async fn handle(&self, event: Event) -> Result<()> {
        let _ = self.0.send(event);
        Ok(())
    }
}

#[tokio::test]
async fn attached_handler_sees_events_in_order() -> Result<()> {
    let bus = EventBus::new().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = bus.attach("playback", vec![], Arc::new(Forward(tx))).await?;

    for speaker in ["one", "two", "three"] {
        bus.publish("playback", line_event("line.done", speaker)).await?;
    }

    for expected in ["one", "two", "three"] {
        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("handler dropped");
        assert_eq!(event.metadata["speaker"], expected);
    }
    handle.abort();
    Ok(())
}

#[test]
fn event_builder_sets_metadata() {
    let event = Event::new("line.error", "scheduler")
        .with_meta("speaker", "[HELIO]")
        .with_meta("attempt", 2)
        .with_priority(70);
    assert_eq!(event.metadata.get("speaker").map(String::as_str), Some("[HELIO]"));
    assert_eq!(event.metadata.get("attempt").map(String::as_str), Some("2"));
    assert_eq!(event.priority, 70);
    assert!(!event.id.is_empty());
}
