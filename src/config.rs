use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use crate::error::DomainError;
use crate::models::Channel;
use crate::window::MonthlyWindow;

pub const DEFAULT_SCOPE: &str = "leaderboard";

/// How records are keyed when aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Agent id when the record carries one, display name otherwise.
    #[default]
    AgentId,
    AgentName,
}

/// A named set of channels summed into "total issues".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScope {
    pub name: String,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: Option<String>,
    pub refresh_secs: u64,
    pub monthly_window: MonthlyWindow,
    pub group_by: GroupBy,
    pub default_scope: String,
    pub top_n: usize,
    pub bottom_n: usize,
    pub dashboard_size: usize,
    pub scopes: BTreeMap<String, Vec<Channel>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            refresh_secs: 300,
            monthly_window: MonthlyWindow::default(),
            group_by: GroupBy::default(),
            default_scope: DEFAULT_SCOPE.to_string(),
            top_n: 5,
            bottom_n: 5,
            dashboard_size: 10,
            scopes: BTreeMap::new(),
        }
    }
}

/// Channel sets used by the stats views before scopes were configurable.
pub fn builtin_scopes() -> BTreeMap<String, Vec<Channel>> {
    use Channel::*;

    BTreeMap::from([
        (
            "leaderboard".to_string(),
            vec![
                Calls,
                LiveChat,
                SalesTickets,
                SupportEmails,
                BillingTickets,
                SocialTickets,
                WalkIns,
            ],
        ),
        (
            "data_entry".to_string(),
            vec![
                HelpdeskTicketing,
                Calls,
                LiveChat,
                SupportEmails,
                SocialTickets,
                BillingTickets,
                WalkIns,
            ],
        ),
        (
            "channel_leaders".to_string(),
            vec![
                HelpdeskTicketing,
                Calls,
                LiveChat,
                SupportEmails,
                SocialTickets,
                BillingTickets,
            ],
        ),
    ])
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("momentum").join("config.toml"))
    }

    /// Loads the config file (an explicit path must exist, the default path
    /// may be absent) and applies `DATABASE_URL` from the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|path| path.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&content).map_err(|source| DomainError::InvalidConfig {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Built-in scopes with any configured scopes layered on top.
    pub fn all_scopes(&self) -> BTreeMap<String, Vec<Channel>> {
        let mut scopes = builtin_scopes();
        for (name, channels) in &self.scopes {
            scopes.insert(name.clone(), channels.clone());
        }
        scopes
    }

    pub fn scope(&self, name: Option<&str>) -> Result<ChannelScope, DomainError> {
        let name = name.unwrap_or(self.default_scope.as_str());
        let channels = self
            .all_scopes()
            .remove(name)
            .ok_or_else(|| DomainError::UnknownScope(name.to_string()))?;

        if channels.is_empty() {
            return Err(DomainError::EmptyScope(name.to_string()));
        }

        Ok(ChannelScope {
            name: name.to_string(),
            channels,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set (environment or config file) to a Postgres instance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_dashboard_behaviour() {
        let config = Config::default();
        assert_eq!(config.refresh_secs, 300);
        assert_eq!(config.monthly_window, MonthlyWindow::CalendarMonth);
        assert_eq!(config.group_by, GroupBy::AgentId);
        assert_eq!(config.top_n, 5);
        assert_eq!(config.dashboard_size, 10);

        let scope = config.scope(None).unwrap();
        assert_eq!(scope.name, "leaderboard");
        assert_eq!(scope.channels.len(), 7);
        assert!(!scope.channels.contains(&Channel::HelpdeskTicketing));
    }

    #[test]
    fn builtin_scopes_differ_on_helpdesk_and_sales() {
        let config = Config::default();
        let entry = config.scope(Some("data_entry")).unwrap();
        let leaders = config.scope(Some("channel_leaders")).unwrap();

        assert!(entry.channels.contains(&Channel::HelpdeskTicketing));
        assert!(!entry.channels.contains(&Channel::SalesTickets));
        assert!(!leaders.channels.contains(&Channel::WalkIns));
    }

    #[test]
    fn parses_overrides_and_custom_scopes() {
        let config = Config::parse(
            r#"
            refresh_secs = 60
            monthly_window = "rolling_30_days"
            group_by = "agent_name"
            default_scope = "phones"

            [scopes]
            phones = ["calls", "walk_ins"]
            "#,
        )
        .unwrap();

        assert_eq!(config.refresh_secs, 60);
        assert_eq!(config.monthly_window, MonthlyWindow::Rolling30Days);
        assert_eq!(config.group_by, GroupBy::AgentName);
        assert_eq!(config.top_n, 5);

        let scope = config.scope(None).unwrap();
        assert_eq!(scope.channels, vec![Channel::Calls, Channel::WalkIns]);
        assert!(config.all_scopes().contains_key("leaderboard"));
    }

    #[test]
    fn unknown_and_empty_scopes_are_rejected() {
        let config = Config::parse("[scopes]\nnothing = []\n").unwrap();
        assert!(matches!(
            config.scope(Some("missing")),
            Err(DomainError::UnknownScope(_))
        ));
        assert!(matches!(
            config.scope(Some("nothing")),
            Err(DomainError::EmptyScope(_))
        ));
    }

    #[test]
    fn loads_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "top_n = 3").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.top_n, 3);
    }

    #[test]
    fn invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "top_n = \"three\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }
}
