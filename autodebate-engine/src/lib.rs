//! autodebate-engine: orchestration of debates between language models.
//!
//! Provides the pieces a debate server is made of:
//! - Participants (debaters, judges, moderators, panelists) over a text generator
//! - Turn-taking state machines with judge scoring
//! - A session controller that runs debates in the background and streams them
//! - SQLite transcript storage and export

pub mod conversation;
pub mod debate;
pub mod dialogue;
pub mod error;
pub mod export;
pub mod judgement;
pub mod llm;
pub mod names;
pub mod participant;
pub mod profile;
pub mod prompts;
pub mod runner;
pub mod scoring;
pub mod session;
pub mod store;
pub mod tools;

pub use debate::{Debate, DebateKind};
pub use dialogue::{History, Message, Role, Stance};
pub use error::{DebateError, ProviderError, SessionError, StoreError};
pub use runner::DebateRequest;
pub use session::{Controller, ControllerConfig, GeneratorSource, StreamEvent};
pub use store::TranscriptStore;
