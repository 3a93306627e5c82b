//! Messages exchanged between pages and the worker.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// A message posted by a page, tagged by its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate a waiting worker now.
    SkipWaiting,
    /// Ask for the version label; answered on the reply port.
    GetVersion,
    /// Any other `type`; ignored.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Reply sent on a message's port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageReply {
    Version { version: String },
}

/// Sending half of a message channel.
pub type ReplyPort = oneshot::Sender<MessageReply>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_types() {
        assert_eq!(
            ClientMessage::parse(br#"{"type":"SKIP_WAITING"}"#).unwrap(),
            ClientMessage::SkipWaiting
        );
        assert_eq!(
            ClientMessage::parse(br#"{"type":"GET_VERSION","extra":1}"#).unwrap(),
            ClientMessage::GetVersion
        );
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        assert_eq!(
            ClientMessage::parse(br#"{"type":"CLEAR_CACHE"}"#).unwrap(),
            ClientMessage::Unknown
        );
        assert!(ClientMessage::parse(b"{}").is_err());
        assert!(ClientMessage::parse(b"\"SKIP_WAITING\"").is_err());
    }

    #[test]
    fn test_version_reply_shape() {
        let reply = MessageReply::Version {
            version: "sstdms-mobile-v1.0.0".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({"version": "sstdms-mobile-v1.0.0"})
        );
    }
}
