//! Dialogue value types: messages and the ordered history of a session.
//!
//! The transport form (field names and shapes) is shared by the SSE stream,
//! the SQLite store and the JSON export, so it must stay stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Debater,
    Judge,
    Moderator,
    Panelist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Debater => "debater",
            Role::Judge => "judge",
            Role::Moderator => "moderator",
            Role::Panelist => "panelist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debater" => Some(Role::Debater),
            "judge" => Some(Role::Judge),
            "moderator" => Some(Role::Moderator),
            "panelist" => Some(Role::Panelist),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the motion a speaker argues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    For,
    Against,
    #[default]
    Neutral,
}

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::For => "for",
            Stance::Against => "against",
            Stance::Neutral => "neutral",
        }
    }

    /// Unknown or missing stances are read back as neutral.
    pub fn parse(s: &str) -> Self {
        match s {
            "for" => Stance::For,
            "against" => Stance::Against,
            _ => Stance::Neutral,
        }
    }
}

impl std::fmt::Display for Stance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One utterance in a debate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub stance: Stance,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(default)]
    pub judgement: Option<f64>,
    #[serde(rename = "debate_id")]
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        text: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            stance: Stance::Neutral,
            text: text.into(),
            judgement: None,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_stance(mut self, stance: Stance) -> Self {
        self.stance = stance;
        self
    }

    pub fn with_judgement(mut self, score: f64) -> Self {
        self.judgement = Some(score);
        self
    }

    /// The JSON mapping used by every external interface.
    pub fn to_transport_form(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "role": self.role,
            "stance": self.stance,
            "message": self.text,
            "judgement": self.judgement,
            "debate_id": self.session_id,
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
        })
    }

    pub fn from_transport_form(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Append-only, ordered message sequence for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_form_uses_wire_names() {
        let msg = Message::new("Alice", Role::Debater, "Cats are better.", "abc123")
            .with_stance(Stance::For);
        let v = msg.to_transport_form();
        assert_eq!(v["name"], "Alice");
        assert_eq!(v["role"], "debater");
        assert_eq!(v["stance"], "for");
        assert_eq!(v["message"], "Cats are better.");
        assert_eq!(v["debate_id"], "abc123");
        assert!(v["judgement"].is_null());
    }

    #[test]
    fn transport_form_round_trips() {
        let msg = Message::new("Judge", Role::Judge, "72.5 Solid evidence", "s1").with_judgement(72.5);
        let back = Message::from_transport_form(msg.to_transport_form()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn missing_stance_reads_as_neutral() {
        let v = serde_json::json!({
            "name": "mod",
            "role": "moderator",
            "message": "Please begin",
            "debate_id": "s1",
            "timestamp": "2025-01-01T00:00:00Z",
        });
        let msg = Message::from_transport_form(v).unwrap();
        assert_eq!(msg.stance, Stance::Neutral);
        assert_eq!(msg.judgement, None);
    }

    #[test]
    fn history_preserves_append_order() {
        let mut h = History::new();
        for i in 0..5 {
            h.append(Message::new(format!("p{i}"), Role::Debater, "x", "s"));
        }
        let names: Vec<_> = h.messages().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["p0", "p1", "p2", "p3", "p4"]);
        assert_eq!(h.len(), 5);
    }
}
