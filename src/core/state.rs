use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::models::usage::BillingPeriodSummary;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode state: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 28).unwrap_or_default()
}

/// Persisted between runs to throttle Cursor exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    /// Unix seconds of the last successful Cursor export.
    #[serde(default, alias = "last_cursor_fetch")]
    pub last_fetch_timestamp: f64,
    #[serde(default, deserialize_with = "lenient_summary")]
    pub last_sent_summary: Option<BillingPeriodSummary>,
    #[serde(default = "default_anchor")]
    pub billing_anchor_date: NaiveDate,
}

/// Older state files store `{}` here; anything that is not a full summary reads as `None`.
fn lenient_summary<'de, D>(deserializer: D) -> Result<Option<BillingPeriodSummary>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

impl Default for CollectionState {
    fn default() -> Self {
        Self {
            last_fetch_timestamp: 0.0,
            last_sent_summary: None,
            billing_anchor_date: default_anchor(),
        }
    }
}

/// True when more than `min_interval` has passed since `last` (both unix seconds).
pub fn should_fetch(last: f64, min_interval: Duration, now: f64) -> bool {
    now - last > min_interval.as_secs_f64()
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_STATE_HOME/ai-usage-tracker/state.json`
    pub fn default_location() -> Self {
        let base = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".local")
                    .join("state")
            });
        Self::new(base.join("ai-usage-tracker").join("state.json"))
    }

    /// Load the state, or the default when missing or unreadable.
    pub fn load(&self) -> CollectionState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CollectionState::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read state file");
                return CollectionState::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt state file");
                CollectionState::default()
            }
        }
    }

    /// Replace the state file atomically: write a sibling temp file, then rename it.
    pub fn save(&self, state: &CollectionState) -> Result<(), StateError> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(&self.path).map_err(|e| StateError::Io(e.error))?;
        tracing::debug!(path = %self.path.display(), "saved collection state");
        Ok(())
    }

    /// Save, logging instead of failing.
    pub fn save_or_warn(&self, state: &CollectionState) {
        if let Err(e) = self.save(state) {
            tracing::warn!(path = %self.path.display(), error = %e, "could not save state file");
        }
    }
}
