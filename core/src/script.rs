//! Conversation script handling.
//!
//! A script is plain text where any line starting with `[` opens a new
//! speaker turn:
//!
//! ```text
//! [HELIO]
//! Good evening. {pause 1.5} Lovely weather for mannequins.
//! [LUNA]
//! Is it?
//! ```
//!
//! The bracket-matched token on a header line becomes the speaker; every
//! following line belongs to that speaker until the next header. Inline
//! `{pause N}` directives split a line's text into speech and silence
//! segments at playback time.

use crate::model::{Line, SpeakerId};
use crate::{PlasticError, Result};
use std::time::Duration;
use tracing::debug;

/// Split authored text into speaker lines.
///
/// Text before the first header has no speaker and is dropped.
pub fn parse_lines(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current: Option<(SpeakerId, String)> = None;
    let mut preamble_chars = 0usize;

    for piece in text.split_inclusive('\n') {
        if piece.starts_with('[') {
            if let Some((speaker, body)) = current.take() {
                lines.push(Line { speaker, text: body });
            }
            let (token, rest) = split_header(piece.trim_end_matches(['\n', '\r']));
            let mut body = String::new();
            let rest = rest.trim();
            if !rest.is_empty() {
                body.push_str(rest);
                body.push('\n');
            }
            current = Some((SpeakerId::new(token), body));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(piece);
        } else {
            preamble_chars += piece.trim().len();
        }
    }

    if let Some((speaker, body)) = current {
        lines.push(Line { speaker, text: body });
    }

    if preamble_chars > 0 {
        debug!(
            target = "script",
            discarded_chars = preamble_chars,
            "Dropped text before first speaker header"
        );
    }
    lines
}

/// Report text that [`parse_lines`] would silently drop.
pub fn validate_script(text: &str) -> Result<()> {
    let mut saw_header = false;
    for (idx, raw) in text.lines().enumerate() {
        if raw.starts_with('[') {
            saw_header = true;
            break;
        }
        if !raw.trim().is_empty() {
            return Err(PlasticError::MalformedConversation(format!(
                "text before first speaker header at line {}",
                idx + 1
            )));
        }
    }
    if !saw_header {
        return Err(PlasticError::MalformedConversation(
            "no speaker header found".into(),
        ));
    }
    Ok(())
}

/// Inverse of [`parse_lines`]: header line followed by the verbatim text.
pub fn render_lines(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.speaker.as_str());
        out.push('\n');
        out.push_str(&line.text);
    }
    out
}

// Returns the bracket-matched token and whatever follows it on the line.
// An unclosed bracket makes the whole line the token.
fn split_header(line: &str) -> (&str, &str) {
    let mut depth = 0usize;
    for (i, c) in line.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return (&line[..=i], &line[i + 1..]);
                }
            }
            _ => {}
        }
    }
    (line.trim_end(), "")
}

/// One playable piece of a line.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Speech(String),
    Pause(Duration),
}

/// Split a line's text on `{pause N}` directives.
///
/// Without directives the text is a single verbatim segment. With
/// directives, speech segments are trimmed at the split boundaries.
/// Whitespace-only speech is never returned.
pub fn segments(text: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut speech_start = 0usize;
    let mut cursor = 0usize;
    let mut split = false;

    while let Some(rel) = text[cursor..].find('{') {
        let open = cursor + rel;
        match parse_pause(&text[open..]) {
            Some((pause, consumed)) => {
                push_speech(&mut out, text[speech_start..open].trim());
                out.push(Segment::Pause(pause));
                speech_start = open + consumed;
                cursor = speech_start;
                split = true;
            }
            // literal brace
            None => cursor = open + 1,
        }
    }

    let tail = &text[speech_start..];
    push_speech(&mut out, if split { tail.trim() } else { tail });
    out
}

fn push_speech(out: &mut Vec<Segment>, speech: &str) {
    if !speech.trim().is_empty() {
        out.push(Segment::Speech(speech.to_string()));
    }
}

// Parses `{pause N}`, `{pause Ns}` or `{pause: N}` at the start of `s`.
// Returns the pause and the number of bytes consumed.
fn parse_pause(s: &str) -> Option<(Duration, usize)> {
    let close = s.find('}')?;
    let inner = s[1..close].trim().to_ascii_lowercase();
    let amount = inner.strip_prefix("pause")?;
    let amount = amount.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    let amount = amount.trim_end().trim_end_matches('s').trim_end();
    let secs: f64 = amount.parse().ok()?;
    // Negative, NaN and out-of-range amounts leave the directive as text
    let pause = Duration::try_from_secs_f64(secs).ok()?;
    Some((pause, close + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_token_is_bracket_matched() {
        assert_eq!(split_header("[HELIO]"), ("[HELIO]", ""));
        assert_eq!(split_header("[A [b]] hi"), ("[A [b]]", " hi"));
        assert_eq!(split_header("[OPEN"), ("[OPEN", ""));
    }

    #[test]
    fn pause_directive_forms() {
        assert_eq!(
            parse_pause("{pause 2}"),
            Some((Duration::from_secs(2), 9))
        );
        assert_eq!(
            parse_pause("{PAUSE 1.5s} rest"),
            Some((Duration::from_millis(1500), 12))
        );
        assert_eq!(parse_pause("{pause: 3}").map(|p| p.0), Some(Duration::from_secs(3)));
        assert_eq!(parse_pause("{pause}"), None);
        assert_eq!(parse_pause("{pause -1}"), None);
        assert_eq!(parse_pause("{laugh}"), None);
        assert_eq!(parse_pause("{pause 2"), None);
    }

    #[test]
    fn oversized_pause_stays_in_text() {
        assert_eq!(parse_pause("{pause 1e20}"), None);
        assert_eq!(parse_pause("{pause inf}"), None);
        assert_eq!(
            segments("Hi {pause 1e20} there"),
            vec![Segment::Speech("Hi {pause 1e20} there".to_string())]
        );
    }

    #[test]
    fn text_without_directive_is_verbatim() {
        assert_eq!(
            segments("  Hello there.\n"),
            vec![Segment::Speech("  Hello there.\n".into())]
        );
        assert!(segments(" \n\n").is_empty());
    }

    #[test]
    fn directive_splits_and_trims_boundaries() {
        assert_eq!(
            segments("Hello. {pause 2} Where was I?\n"),
            vec![
                Segment::Speech("Hello.".into()),
                Segment::Pause(Duration::from_secs(2)),
                Segment::Speech("Where was I?".into()),
            ]
        );
    }

    #[test]
    fn empty_segments_are_skipped() {
        assert_eq!(
            segments("{pause 1}{pause 0.5} Boo"),
            vec![
                Segment::Pause(Duration::from_secs(1)),
                Segment::Pause(Duration::from_millis(500)),
                Segment::Speech("Boo".into()),
            ]
        );
    }

    #[test]
    fn literal_braces_survive() {
        assert_eq!(
            segments("a {b} c"),
            vec![Segment::Speech("a {b} c".into())]
        );
        assert_eq!(
            segments("a {b} c {pause 1} d"),
            vec![
                Segment::Speech("a {b} c".into()),
                Segment::Pause(Duration::from_secs(1)),
                Segment::Speech("d".into()),
            ]
        );
    }
}
