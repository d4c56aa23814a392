//! Configuration loading and management.

use std::path::{Path, PathBuf};

use bd_core::classify::{DEFAULT_CLOSED_STATUSES, DEFAULT_POINTS_FIELD_KEY};
use bd_core::{ClassifierConfig, ClosedStatuses};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Custom field key of the story points field.
    pub points_field_key: String,

    /// Edge type that membership mutations must carry, when they carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_edge_type: Option<String>,

    /// Task statuses that count as closed.
    pub closed_statuses: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("burndown.db"),
            points_field_key: DEFAULT_POINTS_FIELD_KEY.to_string(),
            membership_edge_type: None,
            closed_statuses: DEFAULT_CLOSED_STATUSES.into_iter().map(String::from).collect(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // BURNDOWN_DATABASE_PATH, BURNDOWN_POINTS_FIELD_KEY, ...
        figment = figment.merge(Env::prefixed("BURNDOWN_"));

        figment.extract()
    }

    /// Event classification settings derived from this configuration.
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            points_field_key: self.points_field_key.clone(),
            membership_edge_type: self.membership_edge_type.clone(),
            closed_statuses: ClosedStatuses::new(self.closed_statuses.iter().cloned()),
        }
    }
}

/// Returns the platform-specific config directory for burndown.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("burndown"))
}

/// Returns the platform-specific data directory for burndown.
///
/// On Linux: `~/.local/share/burndown`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("burndown"))
}
