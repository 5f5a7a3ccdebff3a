//! Text-generation clients with tool-use support.
//!
//! Every participant talks to a provider through [`TextGenerator`]. The wire
//! types follow the Anthropic Messages shape (text, `tool_use` and
//! `tool_result` blocks); the OpenAI client translates to and from it.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A message in a provider conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Message content: either a simple string or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Extract plain text from the content.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse(ToolUseBlock),
    #[serde(rename = "tool_result")]
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Tool definition offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One generation step: the text produced and any tool invocations requested.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub text: String,
    pub tool_uses: Vec<ToolUseBlock>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_uses: Vec::new(),
        }
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_uses.is_empty()
    }

    /// The assistant message to append to a conversation after this step.
    pub fn to_assistant_message(&self) -> ChatMessage {
        let mut blocks = Vec::new();
        if !self.text.trim().is_empty() {
            blocks.push(ContentBlock::Text {
                text: self.text.clone(),
            });
        }
        for tu in &self.tool_uses {
            blocks.push(ContentBlock::ToolUse(tu.clone()));
        }
        ChatMessage {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Speaker of a turn in a participant's private memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// A plain (role, text) turn, the unit of participant memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Split plain turns into a system prompt and provider messages.
///
/// System turns are concatenated. Adjacent turns from the same speaker are
/// merged since providers expect user/assistant alternation.
pub fn split_turns(turns: &[ChatTurn]) -> (String, Vec<ChatMessage>) {
    let mut system = Vec::new();
    let mut merged: Vec<(TurnRole, String)> = Vec::new();
    for turn in turns {
        if turn.role == TurnRole::System {
            system.push(turn.content.as_str());
            continue;
        }
        match merged.last_mut() {
            Some((role, content)) if *role == turn.role => {
                content.push_str("\n\n");
                content.push_str(&turn.content);
            }
            _ => merged.push((turn.role, turn.content.clone())),
        }
    }
    let messages = merged
        .into_iter()
        .map(|(role, content)| match role {
            TurnRole::Assistant => ChatMessage::assistant(content),
            _ => ChatMessage::user(content),
        })
        .collect();
    (system.join("\n\n"), messages)
}

/// The external text-generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One generation step against a conversation, optionally offering tools.
    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<Reply, ProviderError>;

    /// Plain text completion over a participant's memory.
    async fn generate(&self, turns: &[ChatTurn]) -> Result<String, ProviderError> {
        let (system, messages) = split_turns(turns);
        let reply = self.chat(&system, &messages, &[]).await?;
        Ok(reply.text)
    }
}

/// Which provider a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" | "gpt" => Ok(Provider::OpenAi),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Credentials for the supported providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
}

/// Model parameters a session may override.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Build a generator for the given provider.
pub fn connect(
    provider: Provider,
    keys: &ProviderKeys,
    params: &ModelParams,
) -> Result<Arc<dyn TextGenerator>, ProviderError> {
    match provider {
        Provider::Anthropic => {
            let key = keys
                .anthropic
                .clone()
                .ok_or(ProviderError::MissingKey("anthropic"))?;
            let mut client = AnthropicClient::new(key);
            if let Some(model) = &params.model {
                client = client.with_model(model);
            }
            client.temperature = params.temperature;
            Ok(Arc::new(client))
        }
        Provider::OpenAi => {
            let key = keys
                .openai
                .clone()
                .ok_or(ProviderError::MissingKey("openai"))?;
            let mut client = OpenAiClient::new(key);
            if let Some(model) = &params.model {
                client = client.with_model(model);
            }
            client.temperature = params.temperature;
            Ok(Arc::new(client))
        }
    }
}

// ── Anthropic ──────────────────────────────────────────────────────────

/// Response from the Anthropic Messages API.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl From<ApiResponse> for Reply {
    fn from(resp: ApiResponse) -> Self {
        let mut reply = Reply::default();
        for block in resp.content {
            match block {
                ContentBlock::Text { text } => reply.text.push_str(&text),
                ContentBlock::ToolUse(tu) => reply.tool_uses.push(tu),
                ContentBlock::ToolResult(_) => {}
            }
        }
        reply
    }
}

/// Claude API client.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            temperature: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: "https://api.anthropic.com".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<Reply, ProviderError> {
        const PROVIDER: &str = "anthropic";
        let mut body = serde_json::json!({
            "model": &self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": messages,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools).map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;
        }

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed = resp
            .json::<ApiResponse>()
            .await
            .map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = ?parsed.stop_reason,
                "anthropic completion"
            );
        }
        Ok(parsed.into())
    }
}

// ── OpenAI ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

/// OpenAI Chat Completions client.
pub struct OpenAiClient {
    api_key: String,
    model: String,
    pub temperature: Option<f32>,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            temperature: None,
            base_url: "https://api.openai.com".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

/// Translate block-shaped messages into the Chat Completions layout.
fn openai_messages(system: &str, messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    if !system.is_empty() {
        out.push(serde_json::json!({"role": "system", "content": system}));
    }
    for msg in messages {
        match &msg.content {
            MessageContent::Text(text) => {
                out.push(serde_json::json!({"role": msg.role, "content": text}));
            }
            MessageContent::Blocks(blocks) => {
                let mut text = String::new();
                let mut calls = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text: t } => text.push_str(t),
                        ContentBlock::ToolUse(tu) => calls.push(serde_json::json!({
                            "id": tu.id,
                            "type": "function",
                            "function": {"name": tu.name, "arguments": tu.input.to_string()},
                        })),
                        ContentBlock::ToolResult(tr) => out.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": tr.tool_use_id,
                            "content": tr.content,
                        })),
                    }
                }
                if !calls.is_empty() {
                    let content = if text.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::String(text)
                    };
                    out.push(serde_json::json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": calls,
                    }));
                } else if !text.is_empty() {
                    out.push(serde_json::json!({"role": msg.role, "content": text}));
                }
            }
        }
    }
    out
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<Reply, ProviderError> {
        const PROVIDER: &str = "openai";
        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": openai_messages(system, messages),
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
        }

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed = resp
            .json::<OpenAiResponse>()
            .await
            .map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode {
                provider: PROVIDER,
                detail: "response had no choices".to_string(),
            })?;

        let tool_uses = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolUseBlock {
                id: call.id,
                name: call.function.name,
                input: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::String(call.function.arguments)),
            })
            .collect();

        Ok(Reply {
            text: choice.message.content.unwrap_or_default(),
            tool_uses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_turns_merges_adjacent_speakers() {
        let turns = vec![
            ChatTurn::system("be terse"),
            ChatTurn::user("a"),
            ChatTurn::user("b"),
            ChatTurn::assistant("c"),
            ChatTurn::user("d"),
        ];
        let (system, msgs) = split_turns(&turns);
        assert_eq!(system, "be terse");
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content.text(), "a\n\nb");
        assert_eq!(msgs[1].role, "assistant");
        assert_eq!(msgs[2].content.text(), "d");
    }

    #[test]
    fn api_response_splits_text_and_tool_use() {
        let raw = serde_json::json!({
            "content": [
                {"type": "text", "text": "Let me check. "},
                {"type": "tool_use", "id": "t1", "name": "wikipedia", "input": {"query": "Rust"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let resp: ApiResponse = serde_json::from_value(raw).unwrap();
        let reply = Reply::from(resp);
        assert_eq!(reply.text, "Let me check. ");
        assert!(reply.wants_tools());
        assert_eq!(reply.tool_uses[0].name, "wikipedia");
    }

    #[test]
    fn openai_translation_emits_tool_messages() {
        let reply = Reply {
            text: String::new(),
            tool_uses: vec![ToolUseBlock {
                id: "call_1".into(),
                name: "search".into(),
                input: serde_json::json!({"query": "x"}),
            }],
        };
        let result = ChatMessage {
            role: "user".into(),
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult(ToolResultBlock {
                tool_use_id: "call_1".into(),
                content: "found".into(),
                is_error: None,
            })]),
        };
        let out = openai_messages("sys", &[ChatMessage::user("q"), reply.to_assistant_message(), result]);
        assert_eq!(out[0]["role"], "system");
        assert_eq!(out[2]["role"], "assistant");
        assert_eq!(out[2]["tool_calls"][0]["function"]["name"], "search");
        assert!(out[2]["content"].is_null());
        assert_eq!(out[3]["role"], "tool");
        assert_eq!(out[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn provider_parses_aliases() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("bard".parse::<Provider>().is_err());
    }

    /// Answer one HTTP request on a local port with `body`, returning the base
    /// URL and a handle that yields the raw request.
    async fn serve_once(body: serde_json::Value) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_ascii_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let payload = body.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn anthropic_client_posts_messages() {
        let (url, request) = serve_once(serde_json::json!({
            "content": [
                {"type": "text", "text": "Looking it up."},
                {"type": "tool_use", "id": "t1", "name": "wikipedia", "input": {"query": "Rust"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 3, "output_tokens": 4}
        }))
        .await;
        let client = AnthropicClient::new("k-test".into())
            .with_base_url(&format!("{url}/"))
            .with_model("model-a");
        let reply = client
            .chat("be brief", &[ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(reply.text, "Looking it up.");
        assert_eq!(reply.tool_uses[0].input["query"], "Rust");

        let raw = request.await.unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("post /v1/messages "));
        assert!(raw.contains("x-api-key: k-test"));
        assert!(raw.contains(r#""model":"model-a""#));
        assert!(!raw.contains(r#""tools""#));
    }

    #[tokio::test]
    async fn openai_client_decodes_tool_calls() {
        let (url, request) = serve_once(serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"query\":\"heat pumps\"}"}
                    }]
                }
            }]
        }))
        .await;
        let client = OpenAiClient::new("k-test".into()).with_base_url(&url);
        let tool = ToolDef {
            name: "search".into(),
            description: "web search".into(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let reply = client
            .chat("sys", &[ChatMessage::user("q")], &[tool])
            .await
            .unwrap();
        assert!(reply.text.is_empty());
        assert_eq!(reply.tool_uses[0].id, "call_1");
        assert_eq!(reply.tool_uses[0].input["query"], "heat pumps");

        let raw = request.await.unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("post /v1/chat/completions "));
        assert!(raw.contains("authorization: bearer k-test"));
        assert!(raw.contains(r#""parameters""#));
    }

    #[test]
    fn connect_requires_a_key() {
        let err = connect(Provider::OpenAi, &ProviderKeys::default(), &ModelParams::default());
        assert!(matches!(err, Err(ProviderError::MissingKey("openai"))));
    }
}
