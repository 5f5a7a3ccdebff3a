//! Per-participant conversational memory.
//!
//! Dialogue messages from other speakers become user turns rendered as
//! `"<name> (<role> - <STANCE>): <text>"`; a participant's own messages
//! become assistant turns.

use crate::dialogue::Message;
use crate::llm::{ChatTurn, TurnRole};

/// Render a dialogue message as seen by another participant.
pub fn render_foreign(msg: &Message) -> String {
    format!(
        "{} ({} - {}): {}",
        msg.name,
        msg.role,
        msg.stance.as_str().to_uppercase(),
        msg.text
    )
}

/// Translate one dialogue message into a memory turn for `own_name`.
pub fn translate(own_name: &str, msg: &Message) -> ChatTurn {
    if msg.name == own_name {
        ChatTurn::assistant(msg.text.clone())
    } else {
        ChatTurn::user(render_foreign(msg))
    }
}

/// A participant's private memory: system framing followed by turns.
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatTurn::system(system_prompt)],
        }
    }

    pub fn system_prompt(&self) -> &str {
        self.turns
            .first()
            .filter(|t| t.role == TurnRole::System)
            .map(|t| t.content.as_str())
            .unwrap_or("")
    }

    /// Replace the system framing, keeping every later turn.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        match self.turns.first_mut() {
            Some(first) if first.role == TurnRole::System => first.content = prompt.into(),
            _ => self.turns.insert(0, ChatTurn::system(prompt)),
        }
    }

    pub fn absorb(&mut self, own_name: &str, messages: &[Message]) {
        self.turns
            .extend(messages.iter().map(|m| translate(own_name, m)));
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(ChatTurn::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(ChatTurn::assistant(text));
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
