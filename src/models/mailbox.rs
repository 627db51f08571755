use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which end a mailbox slot delivers to.
///
/// Serialized as the `sender_type` the desktop collaborator writes:
/// the computer sends to the mobile browser, the mobile browser sends to the
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    #[serde(rename = "computer")]
    ToMobile,
    #[serde(rename = "mobile")]
    ToServer,
}

impl Direction {
    /// Slot file name inside the control directory.
    pub fn slot_file(self) -> &'static str {
        match self {
            Direction::ToMobile => "text_message.json",
            Direction::ToServer => "mobile_text_message.json",
        }
    }
}

fn unknown_ip() -> String {
    "unknown".to_string()
}

/// One pending text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub text: String,
    #[serde(default = "unknown_ip")]
    pub sender_ip: String,
    /// Unix time in seconds, fractional.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(rename = "sender_type", default)]
    pub direction: Direction,
}

impl MailboxMessage {
    pub fn new(text: impl Into<String>, sender_ip: impl Into<String>, direction: Direction) -> Self {
        let now = Utc::now();
        Self {
            text: text.into(),
            sender_ip: sender_ip.into(),
            timestamp: now.timestamp_millis() as f64 / 1000.0,
            direction,
        }
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis((self.timestamp * 1000.0) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_desktop_format() {
        let raw = r#"{"text":"hello","sender_type":"computer","timestamp":1712345678.5,"sender_ip":"192.168.1.5"}"#;
        let message: MailboxMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.text, "hello");
        assert_eq!(message.sender_ip, "192.168.1.5");
        assert_eq!(message.direction, Direction::ToMobile);
        assert_eq!(message.sent_at().unwrap().timestamp(), 1712345678);
    }

    #[test]
    fn test_missing_fields_default() {
        let message: MailboxMessage = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(message.sender_ip, "unknown");
        assert_eq!(message.timestamp, 0.0);
    }

    #[test]
    fn test_writes_sender_type() {
        let message = MailboxMessage::new("x", "10.0.0.2", Direction::ToServer);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["sender_type"], "mobile");
        assert_eq!(json["sender_ip"], "10.0.0.2");
    }
}
