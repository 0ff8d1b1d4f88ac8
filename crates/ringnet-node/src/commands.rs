//! Command parsing for the node console.
//!
//! This module parses input lines into structured [`Command`] values.

use ringnet_proto::BROADCAST_NICKNAME;

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Queue a message.
    Message {
        /// Destination nickname (or `"ALL"`).
        destination: String,
        /// Message text.
        content: String,
    },

    /// Show the outbound queue.
    Queue,

    /// Show the membership table.
    Members,

    /// Show token and queue status.
    Status,

    /// Show the command list.
    Help,

    /// Quit the node.
    Quit,

    /// Unknown or invalid command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// Command summary shown by `/help`.
pub const HELP: &str = "\
commands:
  /send <nickname> <text>   queue a message for one node
  <text>                    queue a message for ALL
  /queue                    show queued messages
  /members                  show known nodes
  /status                   show token and queue status
  /help                     show this list
  /quit                     stop the node
";

/// Parse a user input string into a command.
///
/// Commands start with `/`. Anything else is a message to `"ALL"`.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Message {
            destination: BROADCAST_NICKNAME.to_string(),
            content: input.to_string(),
        };
    };

    let (command, rest) = cmd_str
        .split_once(char::is_whitespace)
        .map_or((cmd_str, ""), |(command, rest)| (command, rest.trim()));

    match command {
        "send" => match rest.split_once(char::is_whitespace) {
            Some((destination, content)) if !content.trim().is_empty() => Command::Message {
                destination: destination.to_string(),
                content: content.trim().to_string(),
            },
            _ => Command::InvalidArgs {
                command: "send".into(),
                error: "Usage: /send <nickname> <text>".into(),
            },
        },

        "queue" => Command::Queue,

        "members" => Command::Members,

        "status" => Command::Status,

        "help" | "?" => Command::Help,

        "quit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}
