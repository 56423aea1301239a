use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Validation failures surfaced to the operator. Database and IO failures
/// travel as `anyhow::Error` instead.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("unknown channel scope '{0}'")]
    UnknownScope(String),
    #[error("channel scope '{0}' has no channels")]
    EmptyScope(String),
    #[error("agent name is required")]
    MissingAgentName,
    #[error("a record for {agent} on {date} already exists")]
    DuplicateEntry { agent: String, date: NaiveDate },
    #[error("no data rows found in {}", .0.display())]
    EmptyImport(PathBuf),
    #[error("no agent with id '{0}'")]
    UnknownAgent(String),
    #[error("invalid config file {}: {source}", path.display())]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
