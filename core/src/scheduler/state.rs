// Queue and playback state guarded by the scheduler's lock
use crate::model::{Conversation, CurrentPlayback, Line, SpeakerConfig, SpeakerId, TransportState};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, VecDeque};

pub(crate) struct SchedulerState {
    pub queue: VecDeque<Line>,
    pub current: CurrentPlayback,
    pub transport: TransportState,
    pub speakers: BTreeMap<SpeakerId, SpeakerConfig>,
    pub conversations: Vec<Conversation>,
    rng: StdRng,
}

impl SchedulerState {
    pub fn new(rng_seed: Option<u64>) -> Self {
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            queue: VecDeque::new(),
            current: CurrentPlayback::default(),
            transport: TransportState::default(),
            speakers: BTreeMap::new(),
            conversations: Vec::new(),
            rng,
        }
    }

    /// Move the head of the queue into the current slot.
    pub fn pop_current(&mut self) -> Option<Line> {
        let line = self.queue.pop_front()?;
        self.current.line = Some(line.clone());
        self.current.speaker_config = None;
        Some(line)
    }

    pub fn replace_queue(&mut self, lines: Vec<Line>) {
        self.queue = lines.into();
    }

    /// Uniform pick among conversations in the current language.
    pub fn pick_conversation(&mut self) -> Option<&Conversation> {
        let language = &self.transport.current_language;
        let matching: Vec<&Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.language == *language)
            .collect();
        matching.choose(&mut self.rng).copied()
    }

    /// Speaker for a blank interruption line: the resumed line's speaker,
    /// else a uniformly random registered speaker, else `unknown`.
    fn fallback_speaker(&mut self, resumed: Option<&Line>) -> SpeakerId {
        if let Some(line) = resumed {
            return line.speaker.clone();
        }
        let ids: Vec<&SpeakerId> = self.speakers.keys().collect();
        ids.choose(&mut self.rng)
            .map(|id| (*id).clone())
            .unwrap_or_else(SpeakerId::unknown)
    }

    /// Put `lines` at the head of the queue, followed by the continuity
    /// phrase and, when one was playing, the preempted line. Clears the current slot and returns
    /// the line that will be resumed.
    pub fn splice_interruption(&mut self, mut lines: Vec<Line>, continuity: &str) -> Option<Line> {
        let resumed = self.current.line.take();
        for line in lines.iter_mut() {
            if line.speaker.is_blank() {
                line.speaker = self.fallback_speaker(resumed.as_ref());
            }
        }

        // The continuity line is always spliced. Without a resumed line its
        // speaker stays blank and the loop skips it as unknown.
        let continuity_speaker = resumed
            .as_ref()
            .map(|line| line.speaker.clone())
            .unwrap_or_else(SpeakerId::blank);
        let mut splice = lines;
        splice.push(Line::new(continuity_speaker, continuity));
        if let Some(line) = &resumed {
            splice.push(line.clone());
        }
        for line in splice.into_iter().rev() {
            self.queue.push_front(line);
        }
        self.current.clear();
        resumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_speakers(ids: &[&str]) -> SchedulerState {
        let mut state = SchedulerState::new(Some(7));
        for id in ids {
            state
                .speakers
                .insert(SpeakerId::new(*id), SpeakerConfig::default());
        }
        state
    }

    #[test]
    fn queue_is_fifo() {
        let mut state = state_with_speakers(&[]);
        state.queue.push_back(Line::new("[A]", "one"));
        state.queue.push_back(Line::new("[B]", "two"));
        assert_eq!(state.pop_current().unwrap().text, "one");
        assert_eq!(state.pop_current().unwrap().text, "two");
        assert!(state.pop_current().is_none());
    }

    #[test]
    fn pop_sets_current_line() {
        let mut state = state_with_speakers(&[]);
        state.queue.push_back(Line::new("[A]", "one"));
        let line = state.pop_current().unwrap();
        assert_eq!(state.current.line.as_ref(), Some(&line));
        assert!(state.queue.is_empty());
    }

    #[test]
    fn interruption_splices_before_resumed_line() {
        let mut state = state_with_speakers(&["[A]", "[B]"]);
        state.queue.push_back(Line::new("[B]", "later"));
        state.current.line = Some(Line::new("[A]", "current"));

        let resumed = state.splice_interruption(
            vec![Line::new("[B]", "i1"), Line::unattributed("i2")],
            "Where were we?",
        );

        assert_eq!(resumed, Some(Line::new("[A]", "current")));
        let queue: Vec<Line> = state.queue.iter().cloned().collect();
        assert_eq!(
            queue,
            vec![
                Line::new("[B]", "i1"),
                Line::new("[A]", "i2"),
                Line::new("[A]", "Where were we?"),
                Line::new("[A]", "current"),
                Line::new("[B]", "later"),
            ]
        );
        assert!(!state.current.is_active());
    }

    #[test]
    fn blank_speaker_without_current_uses_registered_speaker() {
        let mut state = state_with_speakers(&["[A]", "[B]"]);
        state.splice_interruption(vec![Line::unattributed("hey")], "Where were we?");
        assert_eq!(state.queue.len(), 2);
        let speaker = &state.queue[0].speaker;
        assert!(speaker.as_str() == "[A]" || speaker.as_str() == "[B]");
    }

    #[test]
    fn continuity_line_is_spliced_with_nothing_to_resume() {
        let mut state = state_with_speakers(&["[A]"]);
        state.queue.push_back(Line::new("[A]", "queued"));

        let resumed = state.splice_interruption(vec![Line::new("[A]", "hey")], "Where were we?");

        assert_eq!(resumed, None);
        let queue: Vec<Line> = state.queue.iter().cloned().collect();
        assert_eq!(
            queue,
            vec![
                Line::new("[A]", "hey"),
                Line::new(SpeakerId::blank(), "Where were we?"),
                Line::new("[A]", "queued"),
            ]
        );
    }

    #[test]
    fn blank_speaker_without_any_speaker_is_unknown() {
        let mut state = state_with_speakers(&[]);
        state.splice_interruption(vec![Line::unattributed("hey")], "Where were we?");
        assert_eq!(state.queue[0].speaker, SpeakerId::unknown());
    }

    #[test]
    fn random_fallback_reaches_every_speaker() {
        let mut state = state_with_speakers(&["[A]", "[B]", "[C]"]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(state.fallback_speaker(None));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn pick_only_matches_language() {
        let mut state = state_with_speakers(&[]);
        state
            .conversations
            .push(Conversation::parse("en", "[A]\nhello\n", "english"));
        state
            .conversations
            .push(Conversation::parse("fr", "[A]\nbonjour\n", "french"));
        state.transport.current_language = "french".into();
        for _ in 0..20 {
            assert_eq!(state.pick_conversation().unwrap().title, "fr");
        }
        state.transport.current_language = "german".into();
        assert!(state.pick_conversation().is_none());
    }
}
