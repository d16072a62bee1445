//! Parsing of input lines into driver commands.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text. Empty means "submit the stored draft".
    Submit(String),
    Attach(PathBuf),
    Stop,
    Retry,
    Undo,
    Clear,
    View(usize),
    Close,
    History,
    Draft(String),
    Model(Option<String>),
    Help,
    Quit,
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub usage: &'static str,
    pub description: &'static str,
}

pub const COMMAND_SPECS: &[CommandSpec] = &[
    CommandSpec {
        usage: "/attach <path>",
        description: "Attach an image to the next message",
    },
    CommandSpec {
        usage: "/stop",
        description: "Cancel generation or execution",
    },
    CommandSpec {
        usage: "/retry",
        description: "Retry the failed generation",
    },
    CommandSpec {
        usage: "/undo",
        description: "Remove the last turn",
    },
    CommandSpec {
        usage: "/clear",
        description: "Clear the conversation",
    },
    CommandSpec {
        usage: "/view <n>",
        description: "Preview message n",
    },
    CommandSpec {
        usage: "/close",
        description: "Close the preview",
    },
    CommandSpec {
        usage: "/history",
        description: "List the conversation",
    },
    CommandSpec {
        usage: "/draft <text>",
        description: "Store a draft; an empty line submits it",
    },
    CommandSpec {
        usage: "/model [id]",
        description: "Show or switch the model",
    },
    CommandSpec {
        usage: "/help",
        description: "Show this help",
    },
    CommandSpec {
        usage: "/quit",
        description: "Exit",
    },
];

pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Submit(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "attach" if !arg.is_empty() => Command::Attach(PathBuf::from(arg)),
        "attach" => Command::Invalid("usage: /attach <path>".to_string()),
        "stop" | "cancel" => Command::Stop,
        "retry" => Command::Retry,
        "undo" => Command::Undo,
        "clear" => Command::Clear,
        "view" => match arg.parse() {
            Ok(index) => Command::View(index),
            Err(_) => Command::Invalid("usage: /view <n>".to_string()),
        },
        "close" => Command::Close,
        "history" => Command::History,
        "draft" => Command::Draft(arg.to_string()),
        "model" if arg.is_empty() => Command::Model(None),
        "model" => Command::Model(Some(arg.to_string())),
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{other}")),
    }
}
