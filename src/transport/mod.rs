//! Transport interface types
//!
//! The engine owns no wire format. Inbound messages arrive as
//! `(conversation_id, raw_text)` pairs through `DialogEngine::handle_message`;
//! this module defines the outbound side: semantic replies the caller
//! renders in a channel-appropriate way.

use serde::{Deserialize, Serialize};

/// A file reference delivered alongside a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub url: String,
}

/// An outbound reply for the transport to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message body
    pub text: String,
    /// Selectable labels, when the message is a choice-style prompt
    pub options: Option<Vec<String>>,
    /// File attachments
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    /// Create a plain text message
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: None,
            attachments: Vec::new(),
        }
    }

    /// Create a prompt message with optional selectable labels
    pub fn prompt(text: impl Into<String>, options: Option<Vec<String>>) -> Self {
        Self {
            text: text.into(),
            options,
            attachments: Vec::new(),
        }
    }

    /// Attach a file reference to the message
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}
