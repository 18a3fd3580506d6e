//! The outbound half of the transport boundary.
//!
//! The dispatcher never talks to WhatsApp directly. Whatever carries messages
//! (a socket client, the console transport, a test recorder) implements
//! [`ReplySink`] and is injected at construction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reply delivery.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport shut down")]
    Shutdown,

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

/// An inbound chat message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Raw sender identifier, in whatever address format the transport uses.
    pub sender: String,
    /// Chat the message arrived in; replies go here.
    pub chat_id: String,
    #[serde(default)]
    pub is_group: bool,
    /// Whether the sender administers the group. Meaningless outside groups.
    #[serde(default)]
    pub sender_is_admin: bool,
    /// Whether the message carries or quotes media.
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub text: String,
}

impl InboundMessage {
    /// A private-chat text message.
    pub fn direct(sender: impl Into<String>, text: impl Into<String>) -> Self {
        let sender = sender.into();
        Self {
            chat_id: sender.clone(),
            sender,
            is_group: false,
            sender_is_admin: false,
            has_media: false,
            text: text.into(),
        }
    }

    /// A group-chat text message.
    pub fn group(
        chat_id: impl Into<String>,
        sender: impl Into<String>,
        is_admin: bool,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            chat_id: chat_id.into(),
            is_group: true,
            sender_is_admin: is_admin,
            has_media: false,
            text: text.into(),
        }
    }
}

/// Capability to answer in a chat.
#[async_trait]
pub trait ReplySink: Send + Sync + 'static {
    /// Send a text reply to `chat_id`.
    async fn reply(&self, chat_id: &str, text: &str) -> Result<(), TransportError>;

    /// React to the triggering message. Transports without reactions keep
    /// the default.
    async fn react(&self, _chat_id: &str, _emoji: &str) -> Result<(), TransportError> {
        Err(TransportError::NotSupported("react".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    #[async_trait]
    impl ReplySink for Silent {
        async fn reply(&self, _chat_id: &str, _text: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_react_returns_not_supported() {
        let err = Silent.react("c", "👍").await.unwrap_err();
        assert!(matches!(err, TransportError::NotSupported(_)));
    }

    #[test]
    fn direct_message_replies_to_sender() {
        let msg = InboundMessage::direct("628123@s.whatsapp.net", ".ping");
        assert_eq!(msg.chat_id, msg.sender);
        assert!(!msg.is_group);
    }
}
