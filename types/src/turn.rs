//! Grouping of a flat message list into user/assistant turns.

use crate::{AssistantMessage, Message, UserMessage};

/// Messages per turn: one user message followed by its assistant reply.
pub const TURN_LEN: usize = 2;

/// A user message and the assistant reply that followed it.
///
/// Either half may be missing: a trailing user message with no reply yet, or
/// an out-of-order history loaded from disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turn<'a> {
    pub user: Option<&'a UserMessage>,
    pub assistant: Option<&'a AssistantMessage>,
}

impl Turn<'_> {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.assistant.is_some()
    }
}

/// Pair each user message with the assistant message immediately after it.
#[must_use]
pub fn turns(messages: &[Message]) -> Vec<Turn<'_>> {
    let mut out = Vec::with_capacity(messages.len().div_ceil(TURN_LEN));
    let mut iter = messages.iter().peekable();
    while let Some(msg) = iter.next() {
        match msg {
            Message::User(user) => {
                let assistant = match iter.peek() {
                    Some(Message::Assistant(a)) => {
                        iter.next();
                        Some(a)
                    }
                    _ => None,
                };
                out.push(Turn {
                    user: Some(user),
                    assistant,
                });
            }
            Message::Assistant(a) => out.push(Turn {
                user: None,
                assistant: Some(a),
            }),
        }
    }
    out
}
