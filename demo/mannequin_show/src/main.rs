mod commands;
mod config;

use async_trait::async_trait;
use commands::{Command, HELP};
use config::{ShowConfig, SynthChoice};
use plastic_audio::{CommandAudioOutput, LocalSpeechSynthesizer, OpenAiSpeechSynthesizer};
use plastic_core::script::render_lines;
use plastic_core::{
    CacheStore, Event, EventHandler, NoteEvent, RocksDbCacheStore, Show, SpeechSynthesizer,
    SynthesisCache,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Logs every playback event from the scheduler
struct PlaybackLog;

#[async_trait]
impl EventHandler for PlaybackLog {
    async fn handle(&self, event: Event) -> plastic_core::Result<()> {
        let meta = |k: &str| event.metadata.get(k).cloned().unwrap_or_default();
        match event.event_type.as_str() {
            "line.start" => info!(
                target = "mannequin_show",
                speaker = %meta("speaker"),
                output = %meta("output"),
                "🗣️  {}",
                meta("text").trim()
            ),
            "line.error" | "line.skipped" => warn!(
                target = "mannequin_show",
                speaker = %meta("speaker"),
                error = %meta("error"),
                "{}",
                event.event_type
            ),
            other => info!(target = "mannequin_show", metadata = ?event.metadata, "{}", other),
        }
        Ok(())
    }
}

fn build_synthesizer(cfg: &ShowConfig) -> Arc<dyn SpeechSynthesizer> {
    let local = || -> Arc<dyn SpeechSynthesizer> {
        Arc::new(LocalSpeechSynthesizer::new(Some(cfg.local_synth.clone())))
    };
    let use_openai = match cfg.synthesizer {
        SynthChoice::OpenAi => true,
        SynthChoice::Local => false,
        SynthChoice::Auto => cfg.openai.api_key.is_some(),
    };
    if !use_openai {
        info!(target = "mannequin_show", "Using local speech synthesis");
        return local();
    }
    match OpenAiSpeechSynthesizer::new(cfg.openai.clone()) {
        Ok(synth) => {
            info!(target = "mannequin_show", model = %cfg.openai.model, "Using HTTP speech synthesis");
            Arc::new(synth)
        }
        Err(e) => {
            warn!(target = "mannequin_show", error = %e, "HTTP synthesizer unavailable; using local engines");
            local()
        }
    }
}

fn open_store(cfg: &ShowConfig) -> Option<Arc<dyn CacheStore>> {
    let path = cfg.cache_path.as_ref()?;
    match RocksDbCacheStore::open(path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(target = "mannequin_show", path = ?path, error = %e, "Cache store unavailable; caching in memory only");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,plastic_core=info,mannequin_show=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(target = "mannequin_show", "Starting mannequin show");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = ShowConfig::load();

    let cache = Arc::new(
        SynthesisCache::new(build_synthesizer(&cfg), open_store(&cfg))
            .with_max_entries(cfg.cache_max_entries),
    );
    let output = Arc::new(CommandAudioOutput::new(Some(cfg.player.clone())));
    let mut show = Show::new(output, cache, cfg.scheduler.clone(), cfg.debounce).await?;
    let scheduler = show.scheduler.clone();

    for (id, speaker) in &cfg.speakers {
        scheduler.set_speaker_config(id.as_str(), speaker.clone()).await;
    }

    let mut conversations = Vec::new();
    for entry in &cfg.conversations {
        match entry.load(&cfg.base_dir) {
            Ok(conversation) => {
                info!(
                    target = "mannequin_show",
                    title = %conversation.title,
                    lines = conversation.lines.len(),
                    language = %conversation.language,
                    "Loaded conversation"
                );
                scheduler.register_conversation(conversation.clone()).await;
                conversations.push(conversation);
            }
            Err(e) => warn!(target = "mannequin_show", title = %entry.title, error = %e, "Skipping conversation"),
        }
    }

    scheduler.set_playing(cfg.transport.playing).await;
    scheduler.set_auto_pick(cfg.transport.auto_pick).await;
    scheduler.set_language(cfg.transport.language.clone()).await;
    show.bind_controls(&cfg.bindings, &cfg.interruptions, &conversations);

    let log_handle = show
        .event_bus
        .attach(&cfg.scheduler.event_topic, vec![], Arc::new(PlaybackLog))
        .await?;

    let (note_tx, note_rx) = mpsc::channel::<NoteEvent>(64);
    show.start(note_rx).await?;

    println!("{}", HELP);

    // Operator commands on stdin
    let console = {
        let scheduler = scheduler.clone();
        let cache = Arc::clone(&show.cache);
        let bus = Arc::clone(&show.event_bus);
        let topic = cfg.scheduler.event_topic.clone();
        let conversations = conversations.clone();
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(target = "mannequin_show", error = %e, "stdin read failed");
                        break;
                    }
                };
                let cmd = match Command::parse(&line) {
                    Ok(cmd) => cmd,
                    Err(msg) => {
                        if !msg.is_empty() {
                            println!("{}", msg);
                        }
                        continue;
                    }
                };
                match cmd {
                    Command::Play => scheduler.set_playing(true).await,
                    Command::Pause => scheduler.set_playing(false).await,
                    Command::Toggle => {
                        let playing = scheduler.toggle_playing().await;
                        println!("playing: {}", playing);
                    }
                    Command::Clear => {
                        let dropped = scheduler.clear().await;
                        println!("dropped {} lines", dropped);
                    }
                    Command::Say(title) => {
                        match conversations
                            .iter()
                            .find(|c| c.title.eq_ignore_ascii_case(&title))
                        {
                            Some(conversation) => scheduler.push_conversation(conversation).await,
                            None => println!("no conversation titled '{}'", title),
                        }
                    }
                    Command::Interrupt(text) => scheduler.interrupt_with_text(text).await,
                    Command::Note { note, velocity } => {
                        if note_tx
                            .send(NoteEvent::from_midi_velocity(note, velocity))
                            .await
                            .is_err()
                        {
                            warn!(target = "mannequin_show", "Control surface is not listening");
                        }
                    }
                    Command::Language(language) => scheduler.set_language(language).await,
                    Command::AutoPick(enabled) => scheduler.set_auto_pick(enabled).await,
                    Command::Queue => {
                        let snapshot = scheduler.snapshot().await;
                        if let Some(line) = &snapshot.current.line {
                            println!("now: {} {}", line.speaker, line.text.trim());
                        }
                        print!("{}", render_lines(&snapshot.queue));
                        println!(
                            "({} queued, playing={}, auto_pick={}, language={})",
                            snapshot.queue.len(),
                            snapshot.transport.is_playing,
                            snapshot.transport.auto_pick_enabled,
                            snapshot.transport.current_language
                        );
                    }
                    Command::Stats => {
                        let stats = cache.stats().await;
                        println!(
                            "cache: {} entries, {} hits, {} misses",
                            stats.entries, stats.hits, stats.misses
                        );
                        let events = bus.stats(&topic);
                        println!(
                            "events: {} published, {} delivered, {} dropped, {} subscribers",
                            events.published, events.delivered, events.dropped, events.subscribers
                        );
                    }
                    Command::Help => println!("{}", HELP),
                    Command::Quit => break,
                }
            }
        }
    };

    tokio::select! {
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                error!(target = "mannequin_show", error = %e, "Ctrl+C handler failed");
            }
            info!(target = "mannequin_show", "Shutting down...");
        }
        _ = console => {
            info!(target = "mannequin_show", "Console closed; shutting down...");
        }
    }

    log_handle.abort();
    show.shutdown().await?;
    Ok(())
}
