//! Socket frame types
//!
//! Clients may send either raw text or a JSON object. Anything that does not
//! parse as the JSON object shape is treated as raw text, never as an error.

use serde::{Deserialize, Serialize};

use super::message::{MessageBody, MessageType};
use crate::shared::error::SharedError;

/// A frame received from a client socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Image { content: String, filename: Option<String> },
}

#[derive(Deserialize)]
struct JsonFrame {
    #[serde(default)]
    message_type: MessageType,
    content: String,
    #[serde(default)]
    filename: Option<String>,
}

impl ClientFrame {
    /// Parse a raw socket payload, falling back to plain text
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<JsonFrame>(raw) {
            Ok(JsonFrame { message_type: MessageType::Text, content, .. }) => ClientFrame::Text(content),
            Ok(JsonFrame { message_type: MessageType::Image, content, filename }) => {
                ClientFrame::Image { content, filename }
            }
            Err(_) => ClientFrame::Text(raw.to_string()),
        }
    }

    /// Validate the frame and turn it into a message body
    ///
    /// Empty content, content longer than `max_len` characters, and images
    /// without a filename are rejected.
    pub fn into_body(self, max_len: usize) -> Result<MessageBody, SharedError> {
        let content = match &self {
            ClientFrame::Text(content) | ClientFrame::Image { content, .. } => content,
        };
        if content.trim().is_empty() {
            return Err(SharedError::validation("content", "message content cannot be empty"));
        }
        let len = content.chars().count();
        if len > max_len {
            return Err(SharedError::validation(
                "content",
                format!("message content is too long ({len} > {max_len} characters)"),
            ));
        }

        match self {
            ClientFrame::Text(content) => Ok(MessageBody::Text(content)),
            ClientFrame::Image { content, filename } => match filename {
                Some(name) if !name.trim().is_empty() => Ok(MessageBody::Image {
                    url: content,
                    filename: Some(name),
                }),
                _ => Err(SharedError::validation("filename", "image messages require a filename")),
            },
        }
    }
}

/// Error frame pushed to a single client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorFrame {
    pub error: String,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_raw_text_frame() {
        assert_eq!(ClientFrame::parse("I need help"), ClientFrame::Text("I need help".to_string()));
    }

    #[test]
    fn test_malformed_json_falls_back_to_text() {
        let raw = r#"{"message_type": "text", "content": "#;
        assert_eq!(ClientFrame::parse(raw), ClientFrame::Text(raw.to_string()));
    }

    #[test]
    fn test_non_object_json_is_text() {
        assert_eq!(ClientFrame::parse("42"), ClientFrame::Text("42".to_string()));
        assert_eq!(ClientFrame::parse("\"hi\""), ClientFrame::Text("\"hi\"".to_string()));
    }

    #[test]
    fn test_json_text_frame() {
        let frame = ClientFrame::parse(r#"{"message_type":"text","content":"hello","filename":null}"#);
        assert_eq!(frame, ClientFrame::Text("hello".to_string()));
    }

    #[test]
    fn test_json_image_frame() {
        let frame = ClientFrame::parse(r#"{"message_type":"image","content":"https://x/y.png","filename":"y.png"}"#);
        assert_matches!(frame, ClientFrame::Image { ref filename, .. } if filename.as_deref() == Some("y.png"));
    }

    #[test]
    fn test_into_body_rejects_empty_and_long() {
        assert!(ClientFrame::Text("   ".to_string()).into_body(10).is_err());
        assert!(ClientFrame::Text("a".repeat(11)).into_body(10).is_err());
        assert_matches!(ClientFrame::Text("a".repeat(10)).into_body(10), Ok(MessageBody::Text(_)));
    }

    #[test]
    fn test_image_requires_filename() {
        let frame = ClientFrame::Image { content: "https://x/y.png".to_string(), filename: None };
        assert_matches!(frame.into_body(100), Err(SharedError::ValidationError { .. }));
    }
}
