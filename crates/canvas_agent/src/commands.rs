#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Reset,
    Cancel,
    /// Selects the named model, or the next one when no name is given.
    Model(Option<String>),
    Shapes,
    Accept(usize),
    Reject(usize),
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str =
    "Commands: /help, /reset, /cancel, /model [name], /shapes, /accept <n>, /reject <n>, /quit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut words = trimmed.split_whitespace();
    let command = words.next().unwrap_or(trimmed).to_string();
    let argument = words.next().map(str::to_string);

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/reset" => SlashCommand::Reset,
        "/cancel" => SlashCommand::Cancel,
        "/model" => SlashCommand::Model(argument),
        "/shapes" => SlashCommand::Shapes,
        "/accept" | "/reject" => match argument.as_deref().map(str::parse::<usize>) {
            Some(Ok(index)) if command == "/accept" => SlashCommand::Accept(index),
            Some(Ok(index)) => SlashCommand::Reject(index),
            _ => SlashCommand::Unknown(trimmed.to_string()),
        },
        "/quit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_slash_command("draw a cat"), None);
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(parse_slash_command(" /reset "), Some(SlashCommand::Reset));
        assert_eq!(parse_slash_command("/model"), Some(SlashCommand::Model(None)));
        assert_eq!(
            parse_slash_command("/model mock-alt"),
            Some(SlashCommand::Model(Some("mock-alt".to_string())))
        );
        assert_eq!(parse_slash_command("/reject 3"), Some(SlashCommand::Reject(3)));
        assert_eq!(parse_slash_command("/accept 0"), Some(SlashCommand::Accept(0)));
    }

    #[test]
    fn malformed_or_unknown_commands_are_reported() {
        assert_eq!(
            parse_slash_command("/reject last"),
            Some(SlashCommand::Unknown("/reject last".to_string()))
        );
        assert_eq!(
            parse_slash_command("/undo now"),
            Some(SlashCommand::Unknown("/undo".to_string()))
        );
    }
}
