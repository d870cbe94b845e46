//! Runtime configuration.
//!
//! Tunables for the scheduler, the unused-inbox cache, and the explosion
//! manager. Loaded from TOML; every field has a default so an empty file
//! is a valid configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

/// Configuration for the inbox runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Overall awake-set capacity.
    #[serde(default = "default_max_awake_inboxes")]
    pub max_awake_inboxes: usize,

    /// Sub-cap for inboxes kept awake because they hold pending invites.
    #[serde(default = "default_max_awake_pending_invites")]
    pub max_awake_pending_invites: usize,

    /// Inboxes with no activity whose `created_at` is newer than this are
    /// protected from null-activity eviction. Format: "5m", "30s", "1h".
    #[serde(default = "default_new_inbox_protection_window")]
    pub new_inbox_protection_window: String,

    /// Pin window for just-created inboxes, regardless of activity.
    /// In-memory only; does not survive restarts.
    #[serde(default = "default_new_inbox_construction_window")]
    pub new_inbox_construction_window: String,

    /// Pending invites on inboxes older than this are flagged as stale at
    /// launch (deletion is left to an external sweeper).
    #[serde(default = "default_stale_pending_invite_interval")]
    pub stale_pending_invite_interval: String,

    /// How often the external sweeper polls sleeping inboxes for messages.
    #[serde(default = "default_sleeping_inbox_check_interval")]
    pub sleeping_inbox_check_interval: String,

    /// Lead time for the explosion reminder alarm.
    #[serde(default = "default_explosion_reminder_lead")]
    pub explosion_reminder_lead: String,

    /// Directory holding per-inbox encrypted database files.
    #[serde(default = "default_db_directory")]
    pub db_directory: PathBuf,

    /// Connections per local store pool. A device runtime only ever has a
    /// handful of concurrent readers, so this stays small.
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: usize,

    /// How long a caller may wait for a pooled connection before the
    /// query fails fast.
    #[serde(default = "default_db_acquire_timeout")]
    pub db_acquire_timeout: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_awake_inboxes: default_max_awake_inboxes(),
            max_awake_pending_invites: default_max_awake_pending_invites(),
            new_inbox_protection_window: default_new_inbox_protection_window(),
            new_inbox_construction_window: default_new_inbox_construction_window(),
            stale_pending_invite_interval: default_stale_pending_invite_interval(),
            sleeping_inbox_check_interval: default_sleeping_inbox_check_interval(),
            explosion_reminder_lead: default_explosion_reminder_lead(),
            db_directory: default_db_directory(),
            db_pool_size: default_db_pool_size(),
            db_acquire_timeout: default_db_acquire_timeout(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e))?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn new_inbox_protection_window(&self) -> chrono::Duration {
        parse_duration_string(&self.new_inbox_protection_window)
            .unwrap_or_else(|| chrono::Duration::minutes(5))
    }

    pub fn new_inbox_construction_window(&self) -> StdDuration {
        parse_duration_string(&self.new_inbox_construction_window)
            .and_then(|d| d.to_std().ok())
            .unwrap_or_else(|| StdDuration::from_secs(3))
    }

    pub fn stale_pending_invite_interval(&self) -> chrono::Duration {
        parse_duration_string(&self.stale_pending_invite_interval)
            .unwrap_or_else(|| chrono::Duration::days(7))
    }

    pub fn sleeping_inbox_check_interval(&self) -> StdDuration {
        parse_duration_string(&self.sleeping_inbox_check_interval)
            .and_then(|d| d.to_std().ok())
            .unwrap_or_else(|| StdDuration::from_secs(5))
    }

    pub fn explosion_reminder_lead(&self) -> chrono::Duration {
        parse_duration_string(&self.explosion_reminder_lead)
            .unwrap_or_else(|| chrono::Duration::hours(1))
    }

    pub fn db_acquire_timeout(&self) -> StdDuration {
        parse_duration_string(&self.db_acquire_timeout)
            .and_then(|d| d.to_std().ok())
            .unwrap_or_else(|| StdDuration::from_secs(3))
    }

    /// Validate the configuration, collecting every problem rather than
    /// stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_awake_inboxes == 0 {
            errors.push("max_awake_inboxes must be at least 1".to_string());
        }
        if self.db_pool_size == 0 {
            errors.push("db_pool_size must be at least 1".to_string());
        }
        if self.max_awake_pending_invites > self.max_awake_inboxes {
            errors.push(format!(
                "max_awake_pending_invites ({}) exceeds max_awake_inboxes ({})",
                self.max_awake_pending_invites, self.max_awake_inboxes
            ));
        }
        for (field, value) in [
            (
                "new_inbox_protection_window",
                &self.new_inbox_protection_window,
            ),
            (
                "new_inbox_construction_window",
                &self.new_inbox_construction_window,
            ),
            (
                "stale_pending_invite_interval",
                &self.stale_pending_invite_interval,
            ),
            (
                "sleeping_inbox_check_interval",
                &self.sleeping_inbox_check_interval,
            ),
            ("explosion_reminder_lead", &self.explosion_reminder_lead),
            ("db_acquire_timeout", &self.db_acquire_timeout),
        ] {
            if parse_duration_string(value).is_none() {
                errors.push(format!("{field}: invalid duration '{value}'"));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_max_awake_inboxes() -> usize {
    50
}

fn default_max_awake_pending_invites() -> usize {
    3
}

fn default_new_inbox_protection_window() -> String {
    "5m".to_string()
}

fn default_new_inbox_construction_window() -> String {
    "3s".to_string()
}

fn default_stale_pending_invite_interval() -> String {
    "7d".to_string()
}

fn default_sleeping_inbox_check_interval() -> String {
    "5s".to_string()
}

fn default_explosion_reminder_lead() -> String {
    "1h".to_string()
}

fn default_db_directory() -> PathBuf {
    PathBuf::from("inboxes")
}

fn default_db_pool_size() -> usize {
    4
}

fn default_db_acquire_timeout() -> String {
    "3s".to_string()
}

/// Parse a duration string like "7d", "24h", "5m", "30s" into a
/// `chrono::Duration`. Returns `None` for "0", empty, or invalid input.
/// A bare number is interpreted as seconds.
pub fn parse_duration_string(s: &str) -> Option<chrono::Duration> {
    let s = s.trim();
    if s == "0" || s.is_empty() {
        return None;
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 'd')
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 'h')
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 'm')
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 's')
    } else {
        (s, 's')
    };

    let num: i64 = num_str.parse().ok()?;
    if num < 0 {
        return None;
    }
    match unit {
        'd' => Some(chrono::Duration::days(num)),
        'h' => Some(chrono::Duration::hours(num)),
        'm' => Some(chrono::Duration::minutes(num)),
        's' => Some(chrono::Duration::seconds(num)),
        _ => None,
    }
}
