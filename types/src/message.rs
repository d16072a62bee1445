//! Core message domain model.
//!
//! Contains the `Message` sum type and its role-specific structs. Only
//! assistant messages carry a fragment and an execution result, so a user
//! message holding either is unrepresentable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ExecutionResult, Fragment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Opaque reference to inline image data, normally a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One rendered block of a message. Order within a message is display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Code { text: String },
    Image { image: ImageRef },
}

impl ContentBlock {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn code(text: impl Into<String>) -> Self {
        Self::Code { text: text.into() }
    }

    #[must_use]
    pub fn image(image: ImageRef) -> Self {
        Self::Image { image }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: Vec<ContentBlock>,
}

impl UserMessage {
    #[must_use]
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self { content }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    /// Last snapshot folded into this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Fragment>,
    /// Sandbox result for `object`, set once execution completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

impl AssistantMessage {
    #[must_use]
    pub fn new(content: Vec<ContentBlock>, object: Option<Fragment>) -> Self {
        Self {
            content,
            object,
            result: None,
        }
    }
}

/// A complete message.
///
/// This is a real sum type (not a `Role` tag + "sometimes-meaningful" fields).
/// Serializes as a flat record tagged by `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
}

impl Message {
    #[must_use]
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self::User(UserMessage::new(content))
    }

    #[must_use]
    pub fn assistant(content: Vec<ContentBlock>, object: Option<Fragment>) -> Self {
        Self::Assistant(AssistantMessage::new(content, object))
    }

    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Message::User(_) => Role::User,
            Message::Assistant(_) => Role::Assistant,
        }
    }

    #[must_use]
    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Message::User(m) => &m.content,
            Message::Assistant(m) => &m.content,
        }
    }

    #[must_use]
    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(m) => Some(m),
            Message::User(_) => None,
        }
    }

    #[must_use]
    pub fn as_user(&self) -> Option<&UserMessage> {
        match self {
            Message::User(m) => Some(m),
            Message::Assistant(_) => None,
        }
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant(_))
    }

    /// Fragment carried by this message; always `None` for user messages.
    #[must_use]
    pub fn object(&self) -> Option<&Fragment> {
        self.as_assistant().and_then(|m| m.object.as_ref())
    }

    /// Execution result carried by this message; always `None` for user messages.
    #[must_use]
    pub fn result(&self) -> Option<&ExecutionResult> {
        self.as_assistant().and_then(|m| m.result.as_ref())
    }

    /// Shallow-merge `patch` into this message.
    ///
    /// Only the fields present in the patch are replaced. The patch is applied
    /// all-or-nothing: a patch that sets `object` or `result` on a user message
    /// is rejected without touching `content`.
    pub fn apply_patch(&mut self, patch: MessagePatch) -> Result<(), PatchError> {
        let MessagePatch {
            content,
            object,
            result,
        } = patch;

        match self {
            Message::User(m) => {
                if object.is_some() || result.is_some() {
                    return Err(PatchError::AssistantOnlyField);
                }
                if let Some(content) = content {
                    m.content = content;
                }
            }
            Message::Assistant(m) => {
                if let Some(content) = content {
                    m.content = content;
                }
                if let Some(object) = object {
                    m.object = Some(object);
                }
                if let Some(result) = result {
                    m.result = Some(result);
                }
            }
        }
        Ok(())
    }
}

/// Partial message update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<Vec<ContentBlock>>,
    pub object: Option<Fragment>,
    pub result: Option<ExecutionResult>,
}

impl MessagePatch {
    #[must_use]
    pub fn content(content: Vec<ContentBlock>) -> Self {
        Self {
            content: Some(content),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn result(result: ExecutionResult) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_object(mut self, object: Fragment) -> Self {
        self.object = Some(object);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.object.is_none() && self.result.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("object and result can only be set on assistant messages")]
    AssistantOnlyField,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn user_message_serializes_flat_with_role_tag() {
        let msg = Message::user(vec![ContentBlock::text("Build a snake game")]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [{ "type": "text", "text": "Build a snake game" }]
            })
        );
    }

    #[test]
    fn assistant_message_omits_absent_object_and_result() {
        let msg = Message::assistant(vec![ContentBlock::text("hi"), ContentBlock::code("")], None);
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("object").is_none());
        assert!(value.get("result").is_none());
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"][1], json!({ "type": "code", "text": "" }));
    }

    #[test]
    fn user_record_with_stray_result_drops_it() {
        let value = json!({
            "role": "user",
            "content": [],
            "result": { "url": "https://x" }
        });
        let msg: Message = serde_json::from_value(value).unwrap();
        assert_eq!(msg.role(), Role::User);
        assert!(msg.result().is_none());
    }

    #[test]
    fn patch_replaces_only_provided_fields() {
        let fragment = Fragment {
            code: Some("print(1)".to_string()),
            ..Fragment::default()
        };
        let mut msg = Message::assistant(vec![ContentBlock::text("a")], Some(fragment.clone()));

        msg.apply_patch(MessagePatch::result(ExecutionResult::new(json!({ "ok": true }))))
            .unwrap();

        assert_eq!(msg.content(), &[ContentBlock::text("a")]);
        assert_eq!(msg.object(), Some(&fragment));
        assert_eq!(msg.result().map(ExecutionResult::as_value), Some(&json!({ "ok": true })));
    }

    #[test]
    fn patch_rejects_result_on_user_message() {
        let mut msg = Message::user(vec![ContentBlock::text("a")]);
        let patch = MessagePatch {
            content: Some(vec![ContentBlock::text("b")]),
            result: Some(ExecutionResult::new(json!(1))),
            ..MessagePatch::default()
        };

        assert_eq!(msg.apply_patch(patch), Err(PatchError::AssistantOnlyField));
        assert_eq!(msg.content(), &[ContentBlock::text("a")]);
    }

    #[test]
    fn patch_content_on_user_message_is_allowed() {
        let mut msg = Message::user(vec![ContentBlock::text("a")]);
        msg.apply_patch(MessagePatch::content(vec![ContentBlock::text("b")]))
            .unwrap();
        assert_eq!(msg.content(), &[ContentBlock::text("b")]);
    }
}
