//! In-band control messages
//!
//! A text frame that is a JSON object with `"type": "resize"` and numeric
//! `cols`/`rows` is a control frame. Anything else, including JSON that
//! fails to parse, is terminal input.

use serde::{Deserialize, Serialize};

/// Control message sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Terminal geometry changed
    Resize {
        /// Columns
        cols: u16,
        /// Rows
        rows: u16,
    },
}

impl ControlMessage {
    /// Parses a text frame; `None` means the frame is raw input
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim_start();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Serializes the message as sent on the wire
    #[must_use]
    pub fn to_json(&self) -> String {
        match self {
            Self::Resize { cols, rows } => {
                format!(r#"{{"type":"resize","cols":{cols},"rows":{rows}}}"#)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resize() {
        assert_eq!(
            ControlMessage::parse(r#"{"type":"resize","cols":100,"rows":40}"#),
            Some(ControlMessage::Resize { cols: 100, rows: 40 })
        );
        assert_eq!(
            ControlMessage::parse(r#" {"rows":50,"cols":120,"type":"resize"}"#),
            Some(ControlMessage::Resize { cols: 120, rows: 50 })
        );
    }

    #[test]
    fn test_other_frames_are_input() {
        assert_eq!(ControlMessage::parse("ls -la\r"), None);
        assert_eq!(ControlMessage::parse(r#"{"type":"ping"}"#), None);
        assert_eq!(ControlMessage::parse(r#"{"type":"resize","cols":-1,"rows":40}"#), None);
        assert_eq!(ControlMessage::parse(r#"{"type":"resize","cols":80}"#), None);
        assert_eq!(ControlMessage::parse("{not json"), None);
    }

    #[test]
    fn test_to_json_parses_back() {
        let msg = ControlMessage::Resize { cols: 132, rows: 43 };
        assert_eq!(ControlMessage::parse(&msg.to_json()), Some(msg));
    }
}
