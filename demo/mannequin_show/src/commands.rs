// Operator commands read from stdin

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Clear,
    Say(String),
    Interrupt(String),
    Note { note: u8, velocity: u8 },
    Language(String),
    AutoPick(bool),
    Queue,
    Stats,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play | pause | toggle       transport
  clear                       drop queued lines
  say <title>                 queue a conversation
  interrupt <text>            interrupt with a line
  note <n> [velocity]         simulate a controller note (velocity 0 = release)
  lang <language>             switch auto-pick language
  auto on|off                 auto-pick
  queue | stats | help | quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let cmd = match word.to_ascii_lowercase().as_str() {
            "play" => Command::Play,
            "pause" => Command::Pause,
            "toggle" => Command::Toggle,
            "clear" => Command::Clear,
            "say" if !rest.is_empty() => Command::Say(rest.to_string()),
            "interrupt" if !rest.is_empty() => Command::Interrupt(rest.to_string()),
            "note" => {
                let mut parts = rest.split_whitespace();
                let note = parts
                    .next()
                    .and_then(|n| n.parse::<u8>().ok())
                    .filter(|n| *n < 128)
                    .ok_or_else(|| "usage: note <0-127> [velocity]".to_string())?;
                let velocity = match parts.next() {
                    Some(v) => v
                        .parse::<u8>()
                        .map_err(|_| "velocity must be 0-127".to_string())?
                        .min(127),
                    None => 127,
                };
                Command::Note { note, velocity }
            }
            "lang" if !rest.is_empty() => Command::Language(rest.to_string()),
            "auto" => match rest {
                "on" => Command::AutoPick(true),
                "off" => Command::AutoPick(false),
                _ => return Err("usage: auto on|off".into()),
            },
            "queue" => Command::Queue,
            "stats" => Command::Stats,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "" => return Err(String::new()),
            other => return Err(format!("unknown command '{}'; try help", other)),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transport_words() {
        assert_eq!(Command::parse("play"), Ok(Command::Play));
        assert_eq!(Command::parse("  TOGGLE "), Ok(Command::Toggle));
        assert_eq!(Command::parse("auto on"), Ok(Command::AutoPick(true)));
        assert!(Command::parse("auto maybe").is_err());
    }

    #[test]
    fn keeps_free_text_arguments() {
        assert_eq!(
            Command::parse("interrupt Oh! Hello there."),
            Ok(Command::Interrupt("Oh! Hello there.".into()))
        );
        assert_eq!(
            Command::parse("say Late Night Chat"),
            Ok(Command::Say("Late Night Chat".into()))
        );
        assert!(Command::parse("say").is_err());
    }

    #[test]
    fn parses_notes() {
        assert_eq!(
            Command::parse("note 36"),
            Ok(Command::Note {
                note: 36,
                velocity: 127
            })
        );
        assert_eq!(
            Command::parse("note 36 0"),
            Ok(Command::Note {
                note: 36,
                velocity: 0
            })
        );
        assert!(Command::parse("note 200").is_err());
        assert!(Command::parse("note x").is_err());
    }
}
