//! Parsing of terminal input lines.

use collab_shared::protocol::CodeReference;

use crate::session::OutgoingMessage;

/// What a line typed by the user asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Send(OutgoingMessage),
    Who,
    Quit,
    Invalid(String),
}

/// Parse one input line.
///
/// - `/ref PATH:START-END text` sends `text` with a code reference
/// - `/who` and `/quit`
/// - anything else is sent as a plain message
pub fn parse_input(line: &str) -> InputCommand {
    let line = line.trim();

    let Some(command) = line.strip_prefix('/') else {
        return InputCommand::Send(OutgoingMessage::text(line));
    };
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));

    match name {
        "who" => InputCommand::Who,
        "quit" | "exit" => InputCommand::Quit,
        "ref" => parse_reference(rest.trim()),
        other => InputCommand::Invalid(format!("unknown command '/{}'", other)),
    }
}

fn parse_reference(rest: &str) -> InputCommand {
    let (location, body) = rest.split_once(' ').unwrap_or((rest, ""));
    if body.trim().is_empty() {
        return InputCommand::Invalid("usage: /ref PATH:START-END message".to_string());
    }

    match CodeReference::parse(location) {
        Ok(reference) => InputCommand::Send(
            OutgoingMessage::text(body.trim()).with_code_reference(reference),
        ),
        Err(e) => InputCommand::Invalid(e.to_string()),
    }
}
