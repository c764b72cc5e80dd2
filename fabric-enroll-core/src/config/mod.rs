//! Configuration management
//!
//! Every constant the enrollment workflow depends on (labels, MSP id,
//! affiliation, role, paths) lives here instead of in code. Values come from
//! defaults, a TOML file, or `FABRIC_ENROLL_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ca::IdentityRole;
use crate::gateway::DiscoveryOptions;
use crate::logging::LogLevel;
use crate::wallet::validate_label;

mod error;

pub use error::ConfigError;

/// File name of the connection profile looked up next to the executable
pub const DEFAULT_PROFILE_FILE: &str = "connection_profile.json";

/// Wallet directory created under the working directory
pub const DEFAULT_WALLET_DIR: &str = "wallet";

const ENV_PREFIX: &str = "FABRIC_ENROLL";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enrollment: EnrollmentConfig,
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub logging: LoggingConfig,
}

/// Who registers whom, and with which attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    /// Wallet label of the registrar identity
    pub admin_label: String,

    /// Wallet label, and CA enrollment id, of the identity to create
    pub user_label: String,

    /// Membership service provider id recorded in the new identity
    pub msp_id: String,

    /// CA affiliation the user is registered under
    pub affiliation: String,

    pub role: IdentityRole,

    /// Upper bound on enrollments with the issued secret; CA default if unset
    pub max_enrollments: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connection profile; defaults to `connection_profile.json` beside the executable
    pub connection_profile: Option<PathBuf>,

    /// Per-request timeout applied by the CA client
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    pub discovery: DiscoveryOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Wallet directory; defaults to `./wallet` under the working directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    pub json_format: bool,

    pub with_timestamp: bool,

    pub with_target: bool,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            admin_label: "admin".to_string(),
            user_label: "user1".to_string(),
            msp_id: "org2msp".to_string(),
            affiliation: "org2".to_string(),
            role: IdentityRole::Client,
            max_enrollments: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connection_profile: None,
            request_timeout: Duration::from_secs(30),
            discovery: DiscoveryOptions::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `FABRIC_ENROLL_<SECTION>_<KEY>`, e.g.
    /// `FABRIC_ENROLL_ENROLLMENT_USER_LABEL=user2`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}_{}", ENV_PREFIX, suffix));
        let mut config = Self::default();

        // Enrollment
        if let Some(label) = var("ENROLLMENT_ADMIN_LABEL") {
            config.enrollment.admin_label = label;
        }
        if let Some(label) = var("ENROLLMENT_USER_LABEL") {
            config.enrollment.user_label = label;
        }
        if let Some(msp_id) = var("ENROLLMENT_MSP_ID") {
            config.enrollment.msp_id = msp_id;
        }
        if let Some(affiliation) = var("ENROLLMENT_AFFILIATION") {
            config.enrollment.affiliation = affiliation;
        }
        if let Some(role) = var("ENROLLMENT_ROLE") {
            config.enrollment.role = role
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid role: {}", e)))?;
        }
        if let Some(max) = var("ENROLLMENT_MAX_ENROLLMENTS") {
            config.enrollment.max_enrollments = Some(max.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid max enrollments: {}", e))
            })?);
        }

        // Network
        if let Some(profile) = var("NETWORK_CONNECTION_PROFILE") {
            config.network.connection_profile = Some(PathBuf::from(profile));
        }
        if let Some(enabled) = var("NETWORK_DISCOVERY_ENABLED") {
            config.network.discovery.enabled = enabled
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid discovery flag: {}", e)))?;
        }
        if let Some(as_localhost) = var("NETWORK_DISCOVERY_AS_LOCALHOST") {
            config.network.discovery.as_localhost = as_localhost.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid as_localhost flag: {}", e))
            })?;
        }
        if let Some(timeout) = var("NETWORK_REQUEST_TIMEOUT") {
            config.network.request_timeout = humantime_serde::re::humantime::parse_duration(
                &timeout,
            )
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid request timeout: {}", e)))?;
        }

        // Wallet
        if let Some(path) = var("WALLET_PATH") {
            config.wallet.path = Some(PathBuf::from(path));
        }

        // Logging
        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = var("LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let enrollment = &self.enrollment;

        for (field, label) in [
            ("admin_label", &enrollment.admin_label),
            ("user_label", &enrollment.user_label),
        ] {
            validate_label(label)
                .map_err(|e| ConfigError::ValidationFailed(format!("{}: {}", field, e)))?;
        }

        if enrollment.admin_label == enrollment.user_label {
            return Err(ConfigError::ValidationFailed(
                "user_label must differ from admin_label".to_string(),
            ));
        }

        if enrollment.msp_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "msp_id must not be empty".to_string(),
            ));
        }

        if enrollment.affiliation.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "affiliation must not be empty".to_string(),
            ));
        }

        if matches!(enrollment.max_enrollments, Some(n) if n < -1) {
            return Err(ConfigError::ValidationFailed(
                "max_enrollments must be -1 (unlimited), 0 (CA default) or positive".to_string(),
            ));
        }

        if self.network.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }

    /// Connection profile path, falling back to the file beside the executable
    pub fn resolve_profile_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.network.connection_profile {
            return Ok(path.clone());
        }

        let exe = env::current_exe().map_err(|e| ConfigError::PathResolution {
            what: "connection profile",
            reason: e.to_string(),
        })?;
        let dir = exe.parent().ok_or_else(|| ConfigError::PathResolution {
            what: "connection profile",
            reason: format!("executable {} has no parent directory", exe.display()),
        })?;

        Ok(dir.join(DEFAULT_PROFILE_FILE))
    }

    /// Wallet directory, falling back to `./wallet` under the working directory
    pub fn resolve_wallet_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.wallet.path {
            return Ok(path.clone());
        }

        let cwd = env::current_dir().map_err(|e| ConfigError::PathResolution {
            what: "wallet directory",
            reason: e.to_string(),
        })?;

        Ok(cwd.join(DEFAULT_WALLET_DIR))
    }
}
