//! Transcript export as JSON or Markdown.

use std::path::Path;

use anyhow::{Context, Result};

use crate::dialogue::{Message, Stance};

/// Export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "md" | "markdown" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }

    /// Format implied by a file extension; JSON unless it is `.md`.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("md") => ExportFormat::Markdown,
            _ => ExportFormat::Json,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }
}

/// Pretty JSON array of transport-form messages.
pub fn to_json(messages: &[Message]) -> String {
    let values: Vec<_> = messages.iter().map(Message::to_transport_form).collect();
    serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
}

pub fn to_markdown(messages: &[Message]) -> String {
    let mut out = String::from("# Debate Transcript\n");
    for msg in messages {
        let stance = match msg.stance {
            Stance::Neutral => String::new(),
            s => format!(" ({s})"),
        };
        let score = msg
            .judgement
            .map(|j| format!(" [score: {j}]"))
            .unwrap_or_default();
        out.push_str(&format!(
            "\n## {} - {}{stance}{score}\n\n{}\n",
            msg.name, msg.role, msg.text
        ));
    }
    out
}

pub fn render(messages: &[Message], format: ExportFormat) -> String {
    match format {
        ExportFormat::Json => to_json(messages),
        ExportFormat::Markdown => to_markdown(messages),
    }
}

/// Write a transcript, choosing the format from the file extension.
pub fn export_file(messages: &[Message], path: &Path) -> Result<()> {
    let content = render(messages, ExportFormat::for_path(path));
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write transcript to {}", path.display()))
}
