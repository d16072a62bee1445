//! Outbound message format sent to the generation endpoint.
//!
//! The endpoint only understands text and image parts, so code blocks are
//! flattened into text.

use serde::Serialize;

use crate::{ContentBlock, ImageRef, Message, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExchangePart {
    Text { text: String },
    Image { image: ImageRef },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeMessage {
    pub role: Role,
    pub content: Vec<ExchangePart>,
}

impl From<&ContentBlock> for ExchangePart {
    fn from(block: &ContentBlock) -> Self {
        match block {
            ContentBlock::Text { text } | ContentBlock::Code { text } => {
                ExchangePart::Text { text: text.clone() }
            }
            ContentBlock::Image { image } => ExchangePart::Image {
                image: image.clone(),
            },
        }
    }
}

/// Convert stored history into the exchange format. Objects and results stay local.
#[must_use]
pub fn to_exchange(messages: &[Message]) -> Vec<ExchangeMessage> {
    messages
        .iter()
        .map(|msg| ExchangeMessage {
            role: msg.role(),
            content: msg.content().iter().map(ExchangePart::from).collect(),
        })
        .collect()
}
