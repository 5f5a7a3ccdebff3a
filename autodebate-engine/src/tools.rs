//! Lookup tools available to tool-enabled debaters.
//!
//! Tools return plain text that gets fed back to the model as a tool result.
//! Failures are reported to the model instead of aborting the turn.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::ToolDef;

/// Longest tool output handed back to the model.
const MAX_RESULT_CHARS: usize = 4000;

/// The external tool-execution capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDef;
    async fn invoke(&self, input: &Value) -> Result<String>;
}

/// A named set of tools a participant may call.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolbox {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Wikipedia and DuckDuckGo lookups over a shared HTTP client.
    pub fn web_lookup() -> Self {
        let http = reqwest::Client::new();
        Self::new(vec![
            Arc::new(WikipediaTool::new(http.clone())),
            Arc::new(DuckDuckGoTool::new(http)),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Execute a tool call from the model and return the result.
    pub async fn execute(&self, tool_name: &str, input: &Value) -> Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.definition().name == tool_name)
            .with_context(|| format!("Tool '{tool_name}' not found"))?;
        let mut out = tool.invoke(input).await?;
        if out.len() > MAX_RESULT_CHARS {
            let mut cut = MAX_RESULT_CHARS;
            while !out.is_char_boundary(cut) {
                cut -= 1;
            }
            out.truncate(cut);
            out.push_str("\n... (truncated)");
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.tools.iter().map(|t| t.definition().name).collect();
        f.debug_struct("Toolbox").field("tools", &names).finish()
    }
}

fn query_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "required": ["query"],
        "properties": {
            "query": {
                "type": "string",
                "description": description
            }
        }
    })
}

fn query_arg(input: &Value) -> Result<&str> {
    input["query"]
        .as_str()
        .filter(|q| !q.trim().is_empty())
        .context("missing 'query' argument")
}

/// Page summaries from the Wikipedia REST API.
pub struct WikipediaTool {
    http: reqwest::Client,
    base_url: String,
}

impl WikipediaTool {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: "https://en.wikipedia.org".to_string(),
        }
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "wikipedia".to_string(),
            description: "Look up a topic on Wikipedia and return the article summary.".to_string(),
            input_schema: query_schema("Article title or topic, e.g. 'Nuclear power'"),
        }
    }

    async fn invoke(&self, input: &Value) -> Result<String> {
        let query = query_arg(input)?;
        let search: Value = self
            .http
            .get(format!("{}/w/api.php", self.base_url))
            .query(&[
                ("action", "opensearch"),
                ("search", query),
                ("limit", "1"),
                ("format", "json"),
            ])
            .send()
            .await
            .context("Wikipedia search failed")?
            .json()
            .await
            .context("Failed to parse Wikipedia search")?;
        let Some(title) = search[1][0].as_str() else {
            return Ok(format!("No Wikipedia article found for '{query}'."));
        };

        let summary: Value = self
            .http
            .get(format!(
                "{}/api/rest_v1/page/summary/{}",
                self.base_url,
                title.replace(' ', "_")
            ))
            .send()
            .await
            .context("Wikipedia summary request failed")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse Wikipedia summary")?;
        let extract = summary["extract"].as_str().unwrap_or("");
        Ok(format!("Page: {title}\nSummary: {extract}"))
    }
}

/// Instant answers from the DuckDuckGo API.
pub struct DuckDuckGoTool {
    http: reqwest::Client,
}

impl DuckDuckGoTool {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Tool for DuckDuckGoTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "web_search".to_string(),
            description: "Search the web (DuckDuckGo instant answers) for facts and figures.".to_string(),
            input_schema: query_schema("Search query"),
        }
    }

    async fn invoke(&self, input: &Value) -> Result<String> {
        let query = query_arg(input)?;
        let resp: Value = self
            .http
            .get("https://api.duckduckgo.com/")
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .context("DuckDuckGo request failed")?
            .json()
            .await
            .context("Failed to parse DuckDuckGo response")?;

        let mut parts = Vec::new();
        if let Some(answer) = resp["Answer"].as_str().filter(|s| !s.is_empty()) {
            parts.push(answer.to_string());
        }
        if let Some(abs) = resp["AbstractText"].as_str().filter(|s| !s.is_empty()) {
            parts.push(abs.to_string());
        }
        if let Some(topics) = resp["RelatedTopics"].as_array() {
            parts.extend(
                topics
                    .iter()
                    .filter_map(|t| t["Text"].as_str())
                    .take(5)
                    .map(|t| format!("- {t}")),
            );
        }
        if parts.is_empty() {
            return Ok(format!("No results for '{query}'."));
        }
        Ok(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn definition(&self) -> ToolDef {
            ToolDef {
                name: "echo".into(),
                description: "echo".into(),
                input_schema: query_schema("text"),
            }
        }

        async fn invoke(&self, input: &Value) -> Result<String> {
            Ok(query_arg(input)?.repeat(3000))
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let tb = Toolbox::new(vec![Arc::new(Echo)]);
        let err = tb.execute("nope", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        let tb = Toolbox::new(vec![Arc::new(Echo)]);
        let out = tb.execute("echo", &json!({"query": "ab"})).await.unwrap();
        assert!(out.ends_with("(truncated)"));
        assert!(out.len() < 4100);
    }

    #[tokio::test]
    async fn missing_query_is_rejected() {
        let tb = Toolbox::new(vec![Arc::new(Echo)]);
        assert!(tb.execute("echo", &json!({"query": "  "})).await.is_err());
    }

    #[test]
    fn web_lookup_offers_two_tools() {
        let names: Vec<_> = Toolbox::web_lookup()
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["wikipedia", "web_search"]);
    }
}
