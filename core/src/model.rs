//! Data model shared by the parser, scheduler and control surface.

use crate::audio::DEFAULT_OUTPUT;
use crate::script;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque speaker handle, usually a bracketed tag such as `[HELIO]`.
///
/// An empty identifier means "pick a contextually appropriate voice" and is
/// only meaningful on interruption lines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerId(String);

impl SpeakerId {
    /// Sentinel used when a blank interruption speaker cannot be resolved.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn blank() -> Self {
        Self(String::new())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpeakerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SpeakerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One speaker turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub speaker: SpeakerId,
    pub text: String,
}

impl Line {
    pub fn new(speaker: impl Into<SpeakerId>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }

    /// A line with no speaker, resolved when it is spliced in as an interruption.
    pub fn unattributed(text: impl Into<String>) -> Self {
        Self {
            speaker: SpeakerId::blank(),
            text: text.into(),
        }
    }
}

/// Per-speaker routing and voice parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    pub output_id: String,
    pub voice_id: String,
    /// Gain in `[0, 2]`
    pub volume: f32,
    /// Stereo position in `[-1, 1]`
    pub pan: f32,
    pub instructions: String,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            output_id: DEFAULT_OUTPUT.to_string(),
            voice_id: "alloy".to_string(),
            volume: 1.0,
            pan: 0.0,
            instructions: String::new(),
        }
    }
}

impl SpeakerConfig {
    pub fn new(output_id: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            output_id: output_id.into(),
            voice_id: voice_id.into(),
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self.normalized()
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self.normalized()
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Clamp volume and pan into their valid ranges (NaN falls back to neutral).
    pub fn normalized(mut self) -> Self {
        self.volume = if self.volume.is_nan() {
            1.0
        } else {
            self.volume.clamp(0.0, 2.0)
        };
        self.pan = if self.pan.is_nan() {
            0.0
        } else {
            self.pan.clamp(-1.0, 1.0)
        };
        self
    }
}

/// An authored, named collection of lines tagged with a language.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub title: String,
    pub raw_text: String,
    pub lines: Vec<Line>,
    pub language: String,
    pub trigger_note: Option<u8>,
}

impl Conversation {
    /// Build a conversation by parsing `raw_text` into lines.
    pub fn parse(
        title: impl Into<String>,
        raw_text: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        let raw_text = raw_text.into();
        let lines = script::parse_lines(&raw_text);
        Self {
            title: title.into(),
            raw_text,
            lines,
            language: language.into(),
            trigger_note: None,
        }
    }

    pub fn with_trigger_note(mut self, note: u8) -> Self {
        self.trigger_note = Some(note);
        self
    }
}

/// Transport flags shared by the loop and the operator controls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportState {
    pub is_playing: bool,
    pub auto_pick_enabled: bool,
    pub current_language: String,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            is_playing: true,
            auto_pick_enabled: false,
            current_language: "english".to_string(),
        }
    }
}

/// The line being voiced, kept so an interruption can put it back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurrentPlayback {
    pub line: Option<Line>,
    pub speaker_config: Option<SpeakerConfig>,
}

impl CurrentPlayback {
    pub fn clear(&mut self) {
        self.line = None;
        self.speaker_config = None;
    }

    pub fn is_active(&self) -> bool {
        self.line.is_some()
    }
}

/// Canned interruption texts fired from the control surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptionTexts {
    pub welcome: String,
    pub hush: String,
    pub goodbye: String,
}

impl Default for InterruptionTexts {
    fn default() -> Self {
        Self {
            welcome: "Oh! Hello there. Welcome, welcome.".to_string(),
            hush: "Shh. Hush now, everyone.".to_string(),
            goodbye: "Leaving already? Goodbye!".to_string(),
        }
    }
}
