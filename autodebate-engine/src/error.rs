//! Error taxonomy for the engine.
//!
//! Judge formatting problems are recoverable once per occurrence, provider
//! failures end the run, and persistence failures never touch a live stream.

/// Failure of the external text-generation capability.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error calling {provider}: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} API error {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("Failed to decode {provider} response: {detail}")]
    Decode {
        provider: &'static str,
        detail: String,
    },
    #[error("Missing API key for {0}")]
    MissingKey(&'static str),
    #[error("Generator error: {0}")]
    Other(String),
}

/// Anything that stops a debate from producing further messages.
#[derive(Debug, thiserror::Error)]
pub enum DebateError {
    #[error("Judgement format error: {0}")]
    JudgementFormat(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Invalid debate configuration: {0}")]
    Config(String),
}

/// Failure to save or load a transcript.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Corrupt row for session {session_id}: {detail}")]
    Decode { session_id: String, detail: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session controller errors surfaced to the request layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session table is full ({0} live sessions)")]
    CapacityExceeded(usize),
    #[error(transparent)]
    Debate(#[from] DebateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
