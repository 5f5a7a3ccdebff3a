//! Server configuration from flags and environment.

use std::path::PathBuf;
use std::time::Duration;

use autodebate_engine::llm::{Provider, ProviderKeys};
use autodebate_engine::profile::ProfileStore;
use autodebate_engine::session::{ControllerConfig, GeneratorSource};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "autodebate-server", about = "Run LLM debates and stream them over HTTP")]
pub struct ServerConfig {
    /// HTTP listen address (host:port)
    #[arg(long, env = "AUTODEBATE_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen_addr: String,

    /// SQLite transcript database
    #[arg(long, env = "AUTODEBATE_DB", default_value = "debates.db")]
    pub db_path: PathBuf,

    /// Provider used when a request names none (anthropic or openai)
    #[arg(long, env = "AUTODEBATE_PROVIDER", default_value = "anthropic")]
    pub provider: Provider,

    /// Model used when a request names none
    #[arg(long, env = "AUTODEBATE_MODEL")]
    pub model: Option<String>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Profile file (defaults to ~/.autodebate/profile.md)
    #[arg(long, env = "AUTODEBATE_PROFILE")]
    pub profile_path: Option<PathBuf>,

    /// Seconds a finished session stays in memory
    #[arg(long, env = "AUTODEBATE_SESSION_RETENTION_SECS", default_value_t = 3600)]
    pub session_retention_secs: u64,

    /// Most sessions held in memory at once
    #[arg(long, env = "AUTODEBATE_MAX_SESSIONS", default_value_t = 64)]
    pub max_sessions: usize,

    /// Directory of a built web client to serve
    #[arg(long, env = "AUTODEBATE_WEB_DIR")]
    pub web_static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
            db_path: PathBuf::from("debates.db"),
            provider: Provider::default(),
            model: None,
            anthropic_api_key: None,
            openai_api_key: None,
            profile_path: None,
            session_retention_secs: 3600,
            max_sessions: 64,
            web_static_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn generator_source(&self) -> GeneratorSource {
        GeneratorSource::Providers {
            default: self.provider,
            keys: ProviderKeys {
                anthropic: self.anthropic_api_key.clone(),
                openai: self.openai_api_key.clone(),
            },
            model: self.model.clone(),
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            retention: Duration::from_secs(self.session_retention_secs),
            max_sessions: self.max_sessions,
        }
    }

    pub fn profile_store(&self) -> ProfileStore {
        match &self.profile_path {
            Some(path) => ProfileStore::new(path),
            None => ProfileStore::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cfg = ServerConfig::parse_from([
            "autodebate-server",
            "--provider",
            "gpt",
            "--max-sessions",
            "3",
            "--session-retention-secs",
            "10",
            "--openai-api-key",
            "sk-test",
        ]);
        assert_eq!(cfg.provider, Provider::OpenAi);
        assert_eq!(cfg.controller_config().max_sessions, 3);
        assert_eq!(cfg.controller_config().retention, Duration::from_secs(10));
        match cfg.generator_source() {
            GeneratorSource::Providers { keys, .. } => assert_eq!(keys.openai.as_deref(), Some("sk-test")),
            GeneratorSource::Fixed(_) => panic!("expected provider-backed source"),
        }
    }

    #[test]
    fn explicit_profile_path_wins() {
        let cfg = ServerConfig {
            profile_path: Some(PathBuf::from("/tmp/p.md")),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.profile_store().path(), std::path::Path::new("/tmp/p.md"));
    }
}
