use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use plastic_audio::{LocalSynthConfig, OpenAiSynthConfig, PlayerConfig};
use plastic_core::script::validate_script;
use plastic_core::{
    Conversation, InterruptionTexts, NoteBindings, SchedulerConfig, SpeakerConfig,
    DEFAULT_DEBOUNCE,
};

/// Which speech synthesizer backs the cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthChoice {
    /// OpenAI when an API key is configured, else local engines
    Auto,
    Local,
    OpenAi,
}

impl SynthChoice {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(SynthChoice::Auto),
            "local" | "piper" | "espeak" => Some(SynthChoice::Local),
            "openai" => Some(SynthChoice::OpenAi),
            _ => None,
        }
    }
}

/// Initial transport flags
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportDefaults {
    pub playing: bool,
    pub auto_pick: bool,
    pub language: String,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            playing: true,
            auto_pick: false,
            language: "english".to_string(),
        }
    }
}

/// A conversation as written in the config: inline text or a script file.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct ConversationEntry {
    pub title: String,
    pub text: Option<String>,
    pub file: Option<PathBuf>,
    pub language: Option<String>,
    pub trigger_note: Option<u8>,
}

impl ConversationEntry {
    /// Read and parse the script. Relative files resolve against `base_dir`.
    pub fn load(&self, base_dir: &Path) -> Result<Conversation, String> {
        let raw = match (&self.text, &self.file) {
            (Some(text), _) => text.clone(),
            (None, Some(file)) => {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read {}: {}", path.display(), e))?
            }
            (None, None) => return Err(format!("conversation '{}' has no text or file", self.title)),
        };
        if let Err(e) = validate_script(&raw) {
            tracing::warn!(target = "mannequin_show", title = %self.title, error = %e, "Script has unattributed text");
        }
        let language = self.language.clone().unwrap_or_else(|| "english".into());
        let mut conversation = Conversation::parse(self.title.clone(), raw, language);
        if let Some(note) = self.trigger_note {
            conversation = conversation.with_trigger_note(note);
        }
        Ok(conversation)
    }
}

/// Full configuration for the show binary
#[derive(Clone, Debug)]
pub struct ShowConfig {
    pub scheduler: SchedulerConfig,
    pub player: PlayerConfig,
    pub local_synth: LocalSynthConfig,
    pub openai: OpenAiSynthConfig,
    pub synthesizer: SynthChoice,
    /// RocksDB directory; `None` keeps the cache in memory only
    pub cache_path: Option<PathBuf>,
    pub cache_max_entries: Option<usize>,
    pub debounce: Duration,
    pub speakers: BTreeMap<String, SpeakerConfig>,
    pub conversations: Vec<ConversationEntry>,
    pub interruptions: InterruptionTexts,
    pub bindings: NoteBindings,
    pub transport: TransportDefaults,
    /// Directory relative conversation files resolve against
    pub base_dir: PathBuf,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            player: PlayerConfig::default(),
            local_synth: LocalSynthConfig::default(),
            openai: OpenAiSynthConfig::default(),
            synthesizer: std::env::var("MANNEQUIN_SYNTH")
                .ok()
                .and_then(|s| SynthChoice::parse(&s))
                .unwrap_or(SynthChoice::Auto),
            cache_path: Some(
                std::env::var("PLASTIC_CACHE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("tts_cache")),
            ),
            cache_max_entries: std::env::var("PLASTIC_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok()),
            debounce: std::env::var("PLASTIC_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DEBOUNCE),
            speakers: BTreeMap::new(),
            conversations: Vec::new(),
            interruptions: InterruptionTexts::default(),
            bindings: NoteBindings::default(),
            transport: TransportDefaults::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl ShowConfig {
    /// Load configuration from a TOML file (path via MANNEQUIN_CONFIG or ./mannequin_show.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("MANNEQUIN_CONFIG").unwrap_or_else(|_| "mannequin_show.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "mannequin_show", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match Self::from_toml_str(&s, default.clone()) {
                Ok(mut cfg) => {
                    if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                        cfg.base_dir = dir.to_path_buf();
                    }
                    cfg
                }
                Err(e) => {
                    tracing::warn!(target = "mannequin_show", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "mannequin_show", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn from_toml_str(s: &str, base: ShowConfig) -> Result<Self, toml::de::Error> {
        Ok(toml::from_str::<ShowToml>(s)?.overlay(base))
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ShowToml {
    pub scheduler: Option<SchedulerToml>,
    pub player: Option<PlayerToml>,
    pub synth: Option<SynthToml>,
    pub cache: Option<CacheToml>,
    pub control: Option<ControlToml>,
    pub transport: Option<TransportToml>,
    pub interruptions: Option<InterruptionTexts>,
    pub bindings: Option<NoteBindings>,
    #[serde(default)]
    pub speakers: BTreeMap<String, SpeakerConfig>,
    #[serde(default)]
    pub conversations: Vec<ConversationEntry>,
}

impl ShowToml {
    fn overlay(self, mut base: ShowConfig) -> ShowConfig {
        if let Some(s) = self.scheduler {
            s.apply(&mut base.scheduler);
        }
        if let Some(p) = self.player {
            p.apply(&mut base.player);
        }
        if let Some(s) = self.synth {
            s.apply(&mut base);
        }
        if let Some(c) = self.cache {
            c.apply(&mut base);
        }
        if let Some(c) = self.control {
            if let Some(ms) = c.debounce_ms {
                base.debounce = Duration::from_millis(ms);
            }
        }
        if let Some(t) = self.transport {
            t.apply(&mut base.transport);
        }
        if let Some(i) = self.interruptions {
            base.interruptions = i;
        }
        if let Some(b) = self.bindings {
            base.bindings = b;
        }
        base.speakers.extend(
            self.speakers
                .into_iter()
                .map(|(id, cfg)| (id, cfg.normalized())),
        );
        base.conversations.extend(self.conversations);
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SchedulerToml {
    pub poll_ms: Option<u64>,
    pub autopick_delay_ms: Option<u64>,
    pub default_output: Option<String>,
    pub continuity_phrase: Option<String>,
    pub event_topic: Option<String>,
    pub rng_seed: Option<u64>,
}
impl SchedulerToml {
    fn apply(self, s: &mut SchedulerConfig) {
        if let Some(x) = self.poll_ms {
            s.poll_interval = Duration::from_millis(x.max(1));
        }
        if let Some(x) = self.autopick_delay_ms {
            s.autopick_delay = Duration::from_millis(x);
        }
        if let Some(x) = self.default_output.filter(|x| !x.is_empty()) {
            s.default_output = x;
        }
        if let Some(x) = self.continuity_phrase.filter(|x| !x.trim().is_empty()) {
            s.continuity_phrase = x;
        }
        if let Some(x) = self.event_topic {
            s.event_topic = x;
        }
        if let Some(x) = self.rng_seed {
            s.rng_seed = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PlayerToml {
    pub player_bin: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
}
impl PlayerToml {
    fn apply(self, p: &mut PlayerConfig) {
        if let Some(x) = self.player_bin {
            p.player_bin = Some(x);
        }
        if let Some(x) = self.temp_dir {
            p.temp_dir = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SynthToml {
    pub engine: Option<String>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub response_format: Option<String>,
}
impl SynthToml {
    fn apply(self, base: &mut ShowConfig) {
        if let Some(x) = self.engine {
            match SynthChoice::parse(&x) {
                Some(choice) => base.synthesizer = choice,
                None => {
                    tracing::warn!(target = "mannequin_show", engine = %x, "Unknown synth engine; keeping default")
                }
            }
        }
        if let Some(x) = self.piper_voice {
            base.local_synth.piper_voice = Some(x);
        }
        if let Some(x) = self.piper_voice_dir {
            base.local_synth.piper_voice_dir = Some(x);
        }
        if let Some(x) = self.timeout_ms {
            base.local_synth.timeout_ms = x;
            base.openai.request_timeout_ms = x;
        }
        if let Some(x) = self.openai_base_url {
            base.openai.base_url = x;
        }
        if let Some(x) = self.openai_model {
            base.openai.model = x;
        }
        if let Some(x) = self.response_format {
            base.openai.response_format = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct CacheToml {
    pub path: Option<PathBuf>,
    pub persist: Option<bool>,
    pub max_entries: Option<usize>,
}
impl CacheToml {
    fn apply(self, base: &mut ShowConfig) {
        if let Some(x) = self.path {
            base.cache_path = Some(x);
        }
        if self.persist == Some(false) {
            base.cache_path = None;
        }
        if let Some(x) = self.max_entries {
            base.cache_max_entries = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ControlToml {
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TransportToml {
    pub playing: Option<bool>,
    pub auto_pick: Option<bool>,
    pub language: Option<String>,
}
impl TransportToml {
    fn apply(self, t: &mut TransportDefaults) {
        if let Some(x) = self.playing {
            t.playing = x;
        }
        if let Some(x) = self.auto_pick {
            t.auto_pick = x;
        }
        if let Some(x) = self.language {
            t.language = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[scheduler]
poll_ms = 250
continuity_phrase = "Now, as I was saying"

[synth]
engine = "local"

[cache]
persist = false

[control]
debounce_ms = 80

[transport]
auto_pick = true
language = "french"

[bindings]
toggle_play = 36
hush = 39

[interruptions]
hush = "Silence!"

[speakers."[HELIO]"]
output_id = "hw:1,0"
voice_id = "onyx"
pan = -4.0

[[conversations]]
title = "Bonsoir"
text = "[HELIO]\nBonsoir.\n"
language = "french"
trigger_note = 60
"#;

    #[test]
    fn toml_overlays_defaults() {
        let cfg = ShowConfig::from_toml_str(SAMPLE, ShowConfig::default()).unwrap();
        assert_eq!(cfg.scheduler.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.scheduler.continuity_phrase, "Now, as I was saying");
        assert_eq!(cfg.synthesizer, SynthChoice::Local);
        assert_eq!(cfg.cache_path, None);
        assert_eq!(cfg.debounce, Duration::from_millis(80));
        assert!(cfg.transport.auto_pick);
        assert!(cfg.transport.playing);
        assert_eq!(cfg.bindings.hush, Some(39));
        assert_eq!(cfg.bindings.welcome, None);
        assert_eq!(cfg.interruptions.hush, "Silence!");
        assert_eq!(cfg.interruptions.welcome, InterruptionTexts::default().welcome);

        let helio = &cfg.speakers["[HELIO]"];
        assert_eq!(helio.output_id, "hw:1,0");
        assert_eq!(helio.pan, -1.0);
        assert_eq!(helio.volume, 1.0);
    }

    #[test]
    fn inline_conversation_loads() {
        let cfg = ShowConfig::from_toml_str(SAMPLE, ShowConfig::default()).unwrap();
        let conversation = cfg.conversations[0].load(Path::new(".")).unwrap();
        assert_eq!(conversation.lines.len(), 1);
        assert_eq!(conversation.language, "french");
        assert_eq!(conversation.trigger_note, Some(60));
    }

    #[test]
    fn conversation_needs_a_source() {
        let entry = ConversationEntry {
            title: "Empty".into(),
            ..Default::default()
        };
        assert!(entry.load(Path::new(".")).is_err());
    }
}
