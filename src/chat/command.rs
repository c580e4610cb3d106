//! Bot command parsing

/// A recognized bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start` — greet the user
    Start,
    /// `/new` — start a fresh conversation
    New,
    /// `/retry` — regenerate the last assistant reply
    Retry,
    /// `/resume_<id>` — switch back to an earlier conversation
    Resume(i64),
    /// `/history` — list this chat's conversations
    History,
    /// `/say` — speak a bot message as a voice note
    Say,
    /// `/modes` — list this chat's modes
    Modes,
    /// `/mode_<id>` — switch to a mode's system prompt
    SelectMode(i64),
    /// `/mode_off` — go back to the default system prompt
    ClearMode,
    /// `/addmode <name> | <prompt>` — define a mode
    AddMode(String),
    /// `/delmode_<id>` — delete a mode
    DeleteMode(i64),
}

impl Command {
    /// Parse a command from message text
    ///
    /// Accepts the `@botname` suffix Telegram appends in group chats.
    /// Returns None for plain text and for unrecognized commands.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if !trimmed.starts_with('/') {
            return None;
        }

        let (word, args) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(w, rest)| (w, rest.trim()));
        let name = word
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or_default();

        match name {
            "start" => Some(Self::Start),
            "new" => Some(Self::New),
            "retry" => Some(Self::Retry),
            "history" => Some(Self::History),
            "say" => Some(Self::Say),
            "modes" => Some(Self::Modes),
            "mode_off" => Some(Self::ClearMode),
            "addmode" => Some(Self::AddMode(args.to_string())),
            _ => {
                if let Some(id) = name.strip_prefix("resume_") {
                    id.parse().ok().map(Self::Resume)
                } else if let Some(id) = name.strip_prefix("delmode_") {
                    id.parse().ok().map(Self::DeleteMode)
                } else if let Some(id) = name.strip_prefix("mode_") {
                    id.parse().ok().map(Self::SelectMode)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/new"), Some(Command::New));
        assert_eq!(Command::parse("/retry"), Some(Command::Retry));
        assert_eq!(Command::parse("/history"), Some(Command::History));
        assert_eq!(Command::parse("/say"), Some(Command::Say));
    }

    #[test]
    fn test_parse_resume_with_id() {
        assert_eq!(Command::parse("/resume_42"), Some(Command::Resume(42)));
        assert_eq!(Command::parse("/resume_abc"), None);
        assert_eq!(Command::parse("/resume_"), None);
    }

    #[test]
    fn test_parse_bot_suffix() {
        assert_eq!(Command::parse("/new@courier_bot"), Some(Command::New));
        assert_eq!(
            Command::parse("/resume_7@courier_bot"),
            Some(Command::Resume(7))
        );
    }

    #[test]
    fn test_parse_mode_commands() {
        assert_eq!(Command::parse("/modes"), Some(Command::Modes));
        assert_eq!(Command::parse("/mode_3"), Some(Command::SelectMode(3)));
        assert_eq!(Command::parse("/mode_off"), Some(Command::ClearMode));
        assert_eq!(Command::parse("/delmode_3"), Some(Command::DeleteMode(3)));
        assert_eq!(Command::parse("/mode_abc"), None);
        assert_eq!(
            Command::parse("/addmode Pirate | Talk like a pirate"),
            Some(Command::AddMode("Pirate | Talk like a pirate".to_string()))
        );
        assert_eq!(Command::parse("/addmode"), Some(Command::AddMode(String::new())));
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse("not /a command"), None);
        assert_eq!(Command::parse("/unknown"), None);
    }
}
