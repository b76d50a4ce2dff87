//! Wire protocol: framed JSON over a full-duplex text channel.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { consent: bool },
    Message { think: String, speech: String },
    Reassign,
    Disconnect,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Waiting {
        position: usize,
    },
    Paired {
        topic: String,
        task: String,
        session_id: String,
    },
    PartnerMessage {
        content: String,
        timestamp: String,
    },
    MessageSent {
        timestamp: String,
    },
    PartnerLeft,
    InactivityKick,
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_join_deserializes() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"join","consent":true}"#).unwrap();
        matches!(frame, ClientFrame::Join { consent: true });
    }

    #[test]
    fn client_message_deserializes() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"message","think":"t","speech":"s"}"#).unwrap();
        match frame {
            ClientFrame::Message { think, speech } => {
                assert_eq!(think, "t");
                assert_eq!(speech, "s");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_waiting_serializes_with_tag() {
        let frame = ServerFrame::Waiting { position: 3 };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"waiting","position":3}"#);
    }

    #[test]
    fn server_paired_serializes() {
        let frame = ServerFrame::Paired {
            topic: "t".to_string(),
            task: "k".to_string(),
            session_id: "s".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"paired""#));
    }
}
