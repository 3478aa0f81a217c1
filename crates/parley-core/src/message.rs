//! Message records
//!
//! Inbound notifications produced by the transport, outbound send intents,
//! and the uniform outcome of a send attempt.

use serde::{Deserialize, Serialize};

use crate::types::{MessageId, Timestamp};

/// Payload of an inbound message.
///
/// Only the shapes that can carry text are modelled; everything else is
/// collapsed into [`MessagePayload::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Plain conversation text
    Conversation {
        /// Message text
        text: String,
    },
    /// Text with link previews, quotes or mentions
    ExtendedText {
        /// Message text
        text: String,
    },
    /// Image, optionally captioned
    Image {
        /// Caption, if any
        caption: Option<String>,
    },
    /// Video, optionally captioned
    Video {
        /// Caption, if any
        caption: Option<String>,
    },
    /// Document, optionally captioned
    Document {
        /// Caption, if any
        caption: Option<String>,
    },
    /// Any other payload (stickers, reactions, protocol messages)
    Other {
        /// Provider payload kind
        kind: String,
    },
}

impl MessagePayload {
    /// Create a plain text payload
    pub fn text(text: impl Into<String>) -> Self {
        Self::Conversation { text: text.into() }
    }

    /// Text carried by this payload, if any
    pub fn text_content(&self) -> Option<&str> {
        match self {
            Self::Conversation { text } | Self::ExtendedText { text } => Some(text),
            Self::Image { caption } | Self::Video { caption } | Self::Document { caption } => {
                caption.as_deref()
            }
            Self::Other { .. } => None,
        }
    }
}

/// One received notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Provider message ID
    pub id: Option<MessageId>,
    /// Sender address (qualified)
    pub sender: String,
    /// Sender display name
    pub sender_name: Option<String>,
    /// Whether this message was sent by our own account
    pub from_me: bool,
    /// Time the message was sent
    pub timestamp: Timestamp,
    /// Message payload
    pub payload: MessagePayload,
}

impl InboundMessage {
    /// Create a text message from a peer
    pub fn text(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: sender.into(),
            sender_name: None,
            from_me: false,
            timestamp: Timestamp::now(),
            payload: MessagePayload::text(text),
        }
    }

    /// Mark the message as originating from our own account
    pub fn from_self(mut self) -> Self {
        self.from_me = true;
        self
    }

    /// Set the sender display name
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Body text, or an empty string when the payload carries none
    pub fn body_text(&self) -> &str {
        self.payload.text_content().unwrap_or("")
    }
}

/// Kind of an inbound notification batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Live traffic
    Notify,
    /// Backlog replay (history sync, offline catch-up)
    Append,
}

/// A batch of inbound notifications, in transport order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundBatch {
    /// Batch kind
    pub kind: NotificationKind,
    /// Messages, in arrival order
    pub messages: Vec<InboundMessage>,
}

impl InboundBatch {
    /// Live notification batch
    pub fn notify(messages: Vec<InboundMessage>) -> Self {
        Self {
            kind: NotificationKind::Notify,
            messages,
        }
    }

    /// Backlog replay batch
    pub fn append(messages: Vec<InboundMessage>) -> Self {
        Self {
            kind: NotificationKind::Append,
            messages,
        }
    }

    /// Whether handlers should see this batch
    pub fn is_live(&self) -> bool {
        self.kind == NotificationKind::Notify
    }
}

/// One text-send intent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Destination, bare or qualified
    pub destination: String,
    /// Message body
    pub body: String,
}

impl OutboundRequest {
    /// Create a new request
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            body: body.into(),
        }
    }
}

/// Result of one send attempt.
///
/// A successful outcome always carries both the message ID and timestamp;
/// a failed one always carries an error description and nothing else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The provider accepted the message
    Sent {
        /// Provider-assigned message ID
        message_id: MessageId,
        /// Provider send timestamp
        timestamp: Timestamp,
    },
    /// The message was not sent
    Failed {
        /// Error description
        error: String,
    },
}

impl SendOutcome {
    /// Successful outcome
    pub fn sent(message_id: MessageId, timestamp: Timestamp) -> Self {
        Self::Sent {
            message_id,
            timestamp,
        }
    }

    /// Failed outcome
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// Whether the send succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    /// Message ID, present iff successful
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Sent { message_id, .. } => Some(message_id),
            Self::Failed { .. } => None,
        }
    }

    /// Send timestamp, present iff successful
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Sent { timestamp, .. } => Some(*timestamp),
            Self::Failed { .. } => None,
        }
    }

    /// Error description, present iff failed
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Sent { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }

    /// Flatten into the record shape
    pub fn to_record(&self) -> SendOutcomeRecord {
        SendOutcomeRecord {
            success: self.is_success(),
            message_id: self.message_id().cloned(),
            timestamp: self.timestamp(),
            error: self.error().map(str::to_string),
        }
    }
}

impl From<SendOutcome> for SendOutcomeRecord {
    fn from(outcome: SendOutcome) -> Self {
        outcome.to_record()
    }
}

/// Flat record form of [`SendOutcome`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcomeRecord {
    /// Whether the send succeeded
    pub success: bool,
    /// Provider-assigned message ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Provider send timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
