//! Scripted text generator shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use autodebate_engine::ProviderError;
use autodebate_engine::llm::{ChatMessage, Reply, TextGenerator, ToolDef};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

struct Rule {
    marker: String,
    replies: VecDeque<Result<String, String>>,
}

/// Answers by matching the system prompt against registered markers.
///
/// The first rule whose marker occurs in the system prompt and still has
/// replies queued answers the call; otherwise the fallback text is used.
pub struct Scripted {
    rules: Mutex<Vec<Rule>>,
    fallback: String,
    systems: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl Scripted {
    pub fn new(fallback: &str) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback: fallback.to_string(),
            systems: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn on(self, marker: &str, replies: &[&str]) -> Self {
        self.rules.lock().push(Rule {
            marker: marker.to_string(),
            replies: replies.iter().map(|r| Ok(r.to_string())).collect(),
        });
        self
    }

    /// Every call whose system prompt contains `marker` fails.
    pub fn fail_on(self, marker: &str) -> Self {
        self.rules.lock().push(Rule {
            marker: marker.to_string(),
            replies: std::iter::repeat_n(Err("provider unavailable".to_string()), 1000).collect(),
        });
        self
    }

    /// Block every call until a permit is available on `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.systems.lock().len()
    }

    pub fn systems(&self) -> Vec<String> {
        self.systems.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn chat(
        &self,
        system: &str,
        _messages: &[ChatMessage],
        _tools: &[ToolDef],
    ) -> Result<Reply, ProviderError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ProviderError::Other(e.to_string()))?
                .forget();
        }
        self.systems.lock().push(system.to_string());
        let mut rules = self.rules.lock();
        let reply = rules
            .iter_mut()
            .find(|r| system.contains(&r.marker) && !r.replies.is_empty())
            .and_then(|r| r.replies.pop_front())
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        reply.map(Reply::text).map_err(ProviderError::Other)
    }
}
