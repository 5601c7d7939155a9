//! Monitor configuration
//!
//! Loaded once at startup from a TOML file and passed by reference into each
//! component's constructor.
//!
//! ```toml
//! [database]
//! host = "127.0.0.1"
//! port = 3306
//! name = "postal-server-1"
//! user = "postal"
//! password = "secret"
//!
//! [smtp]
//! host = "smtp.example.com"
//! port = 587
//! user = "alerts@example.com"
//! password = "secret"
//! use_tls = true            # STARTTLS; false selects implicit TLS
//!
//! [notifications]
//! email = "ops@example.com"
//! from_email = "alerts@example.com"
//!
//! [monitoring]
//! check_interval_minutes = 5
//! state_file_path = "./last_checked_delivery_id"
//!
//! [testing]
//! verbose_logging = false
//! test_mode = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Sections that must be present in every configuration file
pub const REQUIRED_SECTIONS: [&str; 4] = ["database", "smtp", "notifications", "monitoring"];

/// System-wide configuration location, tried after an explicit path
pub const SYSTEM_CONFIG_PATH: &str = "/etc/postal-monitor/config.toml";

/// Working-directory configuration location, tried last
pub const LOCAL_CONFIG_PATH: &str = "config.toml";

/// Longest accepted polling interval
pub const MAX_CHECK_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Full monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub notifications: NotificationConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub testing: TestingConfig,
}

/// Postal message database connection
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_database_port")]
    pub port: u16,
    /// Database name, e.g. `postal-server-1`
    pub name: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// Outbound SMTP transport
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Empty user disables SMTP authentication
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// `true` selects STARTTLS, `false` implicit TLS
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Disables certificate and hostname verification. Insecure.
    #[serde(default)]
    pub allow_insecure_tls: bool,
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

impl SmtpConfig {
    pub fn tls_mode(&self) -> TlsMode {
        if self.use_tls {
            TlsMode::StartTls
        } else {
            TlsMode::Implicit
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty()
    }
}

/// SMTP encryption mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS (required)
    StartTls,
    /// TLS from the first byte (SMTPS)
    Implicit,
}

impl std::fmt::Display for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsMode::StartTls => write!(f, "STARTTLS"),
            TlsMode::Implicit => write!(f, "implicit TLS"),
        }
    }
}

/// Alert sender and recipient
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Recipient of every alert
    pub email: String,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

/// Polling schedule and checkpoint location
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u64,
    #[serde(default = "default_state_file_path")]
    pub state_file_path: PathBuf,
    /// Pause between successive alert emails within one cycle
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
}

impl MonitoringConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes.saturating_mul(60))
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

/// Optional diagnostics switches
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestingConfig {
    /// Forward the SMTP exchange to the log
    #[serde(default)]
    pub verbose_logging: bool,
    /// Send a test email and exit instead of monitoring
    #[serde(default)]
    pub test_mode: bool,
}

fn default_database_port() -> u16 {
    3306
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_smtp_timeout_secs() -> u64 {
    30
}

fn default_from_name() -> String {
    "Postal Monitor".to_string()
}

fn default_check_interval_minutes() -> u64 {
    5
}

fn default_state_file_path() -> PathBuf {
    PathBuf::from("./last_checked_delivery_id")
}

fn default_send_delay_ms() -> u64 {
    1000
}

impl MonitorConfig {
    /// Locate and load the configuration file.
    ///
    /// An explicit path is tried first, then [`SYSTEM_CONFIG_PATH`], then
    /// [`LOCAL_CONFIG_PATH`]. An explicit path that does not exist falls
    /// through to the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::locate(explicit)?;
        tracing::debug!(path = %path.display(), "Loading configuration");
        Self::from_file(&path)
    }

    /// Resolve the first existing candidate path
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let candidates: Vec<PathBuf> = explicit
            .map(Path::to_path_buf)
            .into_iter()
            .chain([
                PathBuf::from(SYSTEM_CONFIG_PATH),
                PathBuf::from(LOCAL_CONFIG_PATH),
            ])
            .collect();

        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }
        Err(ConfigError::NotFound(candidates))
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| {
            ConfigError::Parse {
                path: None,
                message: e.message().to_string(),
            }
        })?;

        for section in REQUIRED_SECTIONS {
            match table.get(section) {
                Some(toml::Value::Table(_)) => {}
                Some(_) => return Err(ConfigError::NotASection(section)),
                None => return Err(ConfigError::MissingSection(section)),
            }
        }

        let config = toml::Value::Table(table)
            .try_into::<MonitorConfig>()
            .map_err(|e| ConfigError::Parse {
                path: None,
                message: e.message().to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.check_interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "monitoring.check_interval_minutes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.monitoring.check_interval_minutes > MAX_CHECK_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid {
                key: "monitoring.check_interval_minutes",
                reason: format!("must be at most {MAX_CHECK_INTERVAL_MINUTES} (one week)"),
            });
        }
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.smtp.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "smtp.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.smtp.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "smtp.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found (tried {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("Failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration{}: {message}", describe_file(.path))]
    Parse {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("Missing required configuration section: {0}")]
    MissingSection(&'static str),

    #[error("Configuration entry '{0}' must be a section")]
    NotASection(&'static str),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn describe_file(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" file {}", p.display()),
        None => String::new(),
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
