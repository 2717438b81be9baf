use crate::audio::DEFAULT_OUTPUT;
use std::time::Duration;

/// Scheduler timing and defaults
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Longest idle wait before re-checking the queue
    pub poll_interval: Duration,
    /// Pause before an auto-picked conversation replaces the queue
    pub autopick_delay: Duration,
    /// Output used when nothing is playing and as playback fallback
    pub default_output: String,
    /// Spoken before a preempted line resumes
    pub continuity_phrase: String,
    /// Event bus topic for playback events
    pub event_topic: String,
    /// Fixed seed for conversation and speaker picks (tests, rehearsals)
    pub rng_seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(env_u64("PLASTIC_POLL_MS").unwrap_or(1_000)),
            autopick_delay: Duration::from_millis(
                env_u64("PLASTIC_AUTOPICK_DELAY_MS").unwrap_or(2_000),
            ),
            default_output: std::env::var("PLASTIC_DEFAULT_OUTPUT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_OUTPUT.to_string()),
            continuity_phrase: std::env::var("PLASTIC_CONTINUITY_PHRASE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Where were we?".to_string()),
            event_topic: std::env::var("PLASTIC_EVENT_TOPIC")
                .unwrap_or_else(|_| "playback".to_string()),
            rng_seed: env_u64("PLASTIC_RNG_SEED"),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok())
}
