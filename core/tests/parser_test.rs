use plastic_core::script::{parse_lines, render_lines, segments, validate_script, Segment};
use plastic_core::{Conversation, PlasticError};
use std::time::Duration;

const SCRIPT: &str = "[HELIO]\nGood evening.\n\n[LUNA]\nIs it?\nI had not noticed.\n[HELIO] Quite.\n";

#[test]
fn one_line_per_header() {
    let lines = parse_lines(SCRIPT);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].speaker.as_str(), "[HELIO]");
    assert_eq!(lines[0].text, "Good evening.\n\n");
    assert_eq!(lines[1].speaker.as_str(), "[LUNA]");
    assert_eq!(lines[1].text, "Is it?\nI had not noticed.\n");
    assert_eq!(lines[2].text, "Quite.\n");
}

#[test]
fn preamble_is_discarded() {
    let lines = parse_lines("stage notes here\n\n[A]\nHi\n");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "Hi\n");
    assert!(matches!(
        validate_script("stage notes here\n\n[A]\nHi\n"),
        Err(PlasticError::MalformedConversation(_))
    ));
}

#[test]
fn text_without_headers_yields_nothing() {
    assert!(parse_lines("just words\nmore words\n").is_empty());
    assert!(parse_lines("").is_empty());
    assert!(validate_script("just words").is_err());
    assert!(validate_script("\n\n[A]\nok").is_ok());
}

#[test]
fn header_without_body_is_an_empty_line() {
    let lines = parse_lines("[A]\n[B]\nHello\n");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].text, "");
    assert_eq!(lines[1].text, "Hello\n");
}

#[test]
fn render_round_trips_header_on_own_line() {
    let script = "[A]\nOne\ntwo\n[B]\nThree\n";
    assert_eq!(render_lines(&parse_lines(script)), script);
}

#[test]
fn conversation_keeps_raw_text() {
    let conversation = Conversation::parse("Night", SCRIPT, "french").with_trigger_note(48);
    assert_eq!(conversation.raw_text, SCRIPT);
    assert_eq!(conversation.lines.len(), 3);
    assert_eq!(conversation.language, "french");
    assert_eq!(conversation.trigger_note, Some(48));
}

#[test]
fn segments_of_parsed_line() {
    let lines = parse_lines("[A]\nWell. {pause 1.5} Anyway.\n");
    assert_eq!(
        segments(&lines[0].text),
        vec![
            Segment::Speech("Well.".into()),
            Segment::Pause(Duration::from_millis(1500)),
            Segment::Speech("Anyway.".into()),
        ]
    );
}
