//! USCF club head-to-head database builder
//!
//! Scrapes a club's active player roster from the US Chess Federation website,
//! loads the lifetime head-to-head record of every pair of players and stores
//! games and win/loss/draw summaries in SQLite.

pub mod club;
pub mod data;
pub mod head_to_head;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// USCF member id (8 characters)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        PlayerId(s.to_string())
    }
}

/// A player on a club's active player list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub state: Option<String>,
    pub rating: Option<u32>,
    /// Date the rating was recorded
    pub rating_date: Option<NaiveDate>,
    /// Tournaments played with this club
    pub event_count: Option<u32>,
    /// Id of the last tournament played with this club
    pub last_event: Option<String>,
}

impl Player {
    /// Player with only an id and name known
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Player {
            id: PlayerId(id.into()),
            name: name.into(),
            state: None,
            rating: None,
            rating_date: None,
            event_count: None,
            last_event: None,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rating {
            Some(rating) => write!(f, "{} {} ({})", self.id, self.name, rating),
            None => write!(f, "{} {}", self.id, self.name),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum ChessError {
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No cached page for {url} (offline mode)")]
    Offline { url: String },

    #[error("Malformed {page} page: {message}")]
    MalformedPage { page: &'static str, message: String },

    #[error("Invalid game row: {0}")]
    InvalidGame(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChessError {
    /// Whether the operation may succeed if simply tried again
    pub fn is_transient(&self) -> bool {
        matches!(self, ChessError::Timeout { .. })
    }

    pub(crate) fn malformed(page: &'static str, message: impl Into<String>) -> Self {
        ChessError::MalformedPage {
            page,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChessError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub net: NetConfig,
    pub club: ClubConfig,
    pub aggregate: AggregateConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Total attempts for a request that times out
    pub max_attempts: u32,
    pub timeout_secs: u64,
    /// Fixed delay between attempts
    pub retry_delay_secs: u64,
    pub user_agent: String,
}

impl NetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            max_attempts: 3,
            timeout_secs: 20,
            retry_delay_secs: 5,
            user_agent: "chess-clubs/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClubConfig {
    /// Minimum games with the club for a player to count as active
    pub min_games: u32,
}

impl Default for ClubConfig {
    fn default() -> Self {
        ClubConfig { min_games: 5 }
    }
}

/// What to do when one pair of players cannot be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run on the first failing pair
    #[default]
    Abort,
    /// Log the failure, leave the pair out and continue
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub failure_policy: FailurePolicy,
    /// Worker threads for loading pairs (1 = sequential)
    pub jobs: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        AggregateConfig {
            failure_policy: FailurePolicy::Abort,
            jobs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory for `<club_id>.db` files
    pub database_dir: String,
    /// Directory for cached HTML pages
    pub cache_dir: Option<String>,
}

impl DataConfig {
    /// Database file for a club: `<database_dir>/<club_id>.db`
    pub fn database_path(&self, club_id: &str) -> PathBuf {
        Path::new(&self.database_dir).join(format!("{}.db", club_id))
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            database_dir: ".".to_string(),
            cache_dir: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChessError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ChessError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChessError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
