use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const TOKEN_ENV: &str = "AI_USAGE_TRACKER_TOKEN";
pub const API_URL_ENV: &str = "DJANGO_API_URL";
pub const JWT_SECRET_ENV: &str = "SERVER_JWT_SECRET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriodMode {
    /// First of the current month up to now.
    Calendar,
    /// Monthly windows stepped from the billing anchor date in the state file.
    Anchored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_interval")]
    pub min_fetch_interval_secs: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_billing_period")]
    pub billing_period: BillingPeriodMode,
}

fn default_interval() -> u64 {
    300
}
fn default_api_url() -> String {
    "https://your-django-app.com".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}
fn default_billing_period() -> BillingPeriodMode {
    BillingPeriodMode::Calendar
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            min_fetch_interval_secs: default_interval(),
            api_url: default_api_url(),
            color: default_color(),
            billing_period: default_billing_period(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Overrides the platform-specific `state.vscdb` location.
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_cursor_base_url")]
    pub base_url: String,
}

fn default_cursor_base_url() -> String {
    "https://cursor.com".to_string()
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            base_url: default_cursor_base_url(),
        }
    }
}

impl CursorConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_cursor_db_path)
    }
}

/// Platform-specific path to Cursor's global storage database.
pub fn default_cursor_db_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if cfg!(target_os = "macos") {
        home.join("Library/Application Support/Cursor/User/globalStorage/state.vscdb")
    } else if cfg!(target_os = "windows") {
        home.join("AppData/Roaming/Cursor/User/globalStorage/state.vscdb")
    } else {
        home.join(".config/Cursor/User/globalStorage/state.vscdb")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeConfig {
    #[serde(default = "default_ccusage_command")]
    pub command: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_ccusage_command() -> String {
    "ccusage".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            command: default_ccusage_command(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub api_token: Option<String>,
    pub server_jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("ai-usage-tracker").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    /// The file holds the API token, so it is written owner-only.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// API token from the environment first, then the config file.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.auth.api_token.clone().filter(|t| !t.is_empty()))
    }

    pub fn api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.settings.api_url.clone())
    }

    pub fn server_jwt_secret(&self) -> String {
        std::env::var(JWT_SECRET_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.auth.server_jwt_secret.clone())
            .unwrap_or_else(|| "development-secret-change-in-production".to_string())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.settings.interval_secs)
    }

    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_secs(self.settings.min_fetch_interval_secs)
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.settings.interval_secs == 0 {
            issues.push("interval_secs must be greater than 0".to_string());
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        let api_url = self.api_url();
        if !api_url.starts_with("https://") && !api_url.starts_with("http://localhost") {
            issues.push(format!(
                "api_url must use HTTPS (or http://localhost), got: {}",
                api_url
            ));
        }
        if !self.cursor.base_url.starts_with("https://") {
            issues.push(format!(
                "cursor.base_url must use HTTPS, got: {}",
                self.cursor.base_url
            ));
        }
        if self.claude.command.trim().is_empty() {
            issues.push("claude.command must not be empty".to_string());
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let issues = config.validate();
        assert!(issues.is_empty(), "Default config should be valid, got: {:?}", issues);
    }

    #[test]
    fn default_intervals_are_five_minutes() {
        let settings = Settings::default();
        assert_eq!(settings.interval_secs, 300);
        assert_eq!(settings.min_fetch_interval_secs, 300);
    }

    #[test]
    fn validate_catches_zero_interval() {
        let mut config = AppConfig::default();
        config.settings.interval_secs = 0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("interval_secs")));
    }

    #[test]
    fn validate_catches_invalid_color() {
        let mut config = AppConfig::default();
        config.settings.color = "blue".to_string();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("color")));
    }

    #[test]
    fn validate_catches_plain_http_cursor_url() {
        let mut config = AppConfig::default();
        config.cursor.base_url = "http://cursor.com".to_string();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("cursor.base_url")));
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[settings]
interval_secs = 60
billing_period = "anchored"

[claude]
command = "npx"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.settings.interval_secs, 60);
        assert_eq!(config.settings.min_fetch_interval_secs, 300);
        assert_eq!(config.settings.billing_period, BillingPeriodMode::Anchored);
        assert_eq!(config.claude.command, "npx");
        assert_eq!(config.claude.timezone, "UTC");
    }

    #[test]
    fn parse_empty_toml_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.settings.color, "auto");
        assert_eq!(config.cursor.base_url, "https://cursor.com");
        assert!(config.auth.api_token.is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.auth.api_token = Some("tok_123".to_string());
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.auth.api_token.as_deref(), Some("tok_123"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.settings.interval_secs, 300);
    }

    #[test]
    fn explicit_db_path_overrides_default() {
        let mut config = CursorConfig::default();
        config.db_path = Some(PathBuf::from("/tmp/state.vscdb"));
        assert_eq!(config.resolved_db_path(), PathBuf::from("/tmp/state.vscdb"));
    }
}
