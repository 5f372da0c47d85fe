//! Inbound chat messages.
//!
//! A [`Message`] is what the platform hands to the framework for every chat
//! line it observes. The [`MessageKind`] decides which handler list the
//! dispatcher consults.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::Chain;

/// The kind of conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// One-to-one chat with a friend.
    Private,
    /// Group chat.
    Group,
    /// Temporary chat started from inside a group.
    Temp,
}

impl MessageKind {
    /// Returns the canonical lower-case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Temp => "temp",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound chat message.
///
/// `text_origin` is the raw text exactly as received and is what prefix
/// checks look at. `text` starts out identical and may be rewritten by the
/// message middleware; keyword matchers test against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Conversation kind.
    pub kind: MessageKind,
    /// Sender id.
    pub user_id: i64,
    /// Group id for group and temporary chats.
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Raw text as received.
    pub text_origin: String,
    /// Normalized text.
    pub text: String,
    /// Face (emoji) ids contained in the message.
    #[serde(default)]
    pub face: Vec<i64>,
    /// Image urls contained in the message.
    #[serde(default)]
    pub image: Vec<String>,
    /// Platform-specific rich payload.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub time: i64,
}

impl Message {
    /// Creates a message of the given kind with `text` as both raw and
    /// normalized text.
    pub fn new(kind: MessageKind, user_id: i64, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind,
            user_id,
            group_id: None,
            text_origin: text.clone(),
            text,
            face: Vec::new(),
            image: Vec::new(),
            payload: None,
            time: 0,
        }
    }

    /// Creates a private message.
    pub fn private(user_id: i64, text: impl Into<String>) -> Self {
        Self::new(MessageKind::Private, user_id, text)
    }

    /// Creates a group message.
    pub fn group(group_id: i64, user_id: i64, text: impl Into<String>) -> Self {
        Self::new(MessageKind::Group, user_id, text).with_group(group_id)
    }

    /// Creates a temporary-chat message started from `group_id`.
    pub fn temp(group_id: i64, user_id: i64, text: impl Into<String>) -> Self {
        Self::new(MessageKind::Temp, user_id, text).with_group(group_id)
    }

    /// Sets the group id.
    pub fn with_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Replaces the normalized text, leaving `text_origin` untouched.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Sets the face ids.
    pub fn with_faces(mut self, face: Vec<i64>) -> Self {
        self.face = face;
        self
    }

    /// Sets the image urls.
    pub fn with_images(mut self, image: Vec<String>) -> Self {
        self.image = image;
        self
    }

    /// Attaches a rich payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the timestamp.
    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    /// Returns where a reply to this message should be delivered.
    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            kind: self.kind,
            user_id: self.user_id,
            group_id: self.group_id,
        }
    }
}

/// The destination of an outbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub kind: MessageKind,
    pub user_id: i64,
    pub group_id: Option<i64>,
}

/// A reply ready to be handed to the external send channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    /// Where to send the chain. `None` for replies produced by event callbacks,
    /// which have no originating conversation.
    pub target: Option<ReplyTarget>,
    /// The reply itself.
    pub chain: Chain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_fill_both_texts() {
        let msg = Message::group(10, 20, "hello");
        assert_eq!(msg.kind, MessageKind::Group);
        assert_eq!(msg.group_id, Some(10));
        assert_eq!(msg.text_origin, "hello");
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_with_text_keeps_origin() {
        let msg = Message::private(1, "  Hi ").with_text("hi");
        assert_eq!(msg.text_origin, "  Hi ");
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&MessageKind::Temp).unwrap();
        assert_eq!(json, "\"temp\"");
        assert_eq!(MessageKind::Private.to_string(), "private");
    }

    #[test]
    fn test_reply_target() {
        let target = Message::temp(3, 4, "x").reply_target();
        assert_eq!(
            target,
            ReplyTarget {
                kind: MessageKind::Temp,
                user_id: 4,
                group_id: Some(3),
            }
        );
    }
}
