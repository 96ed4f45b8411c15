//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `BADAL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `BADAL_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `BADAL_EMAIL__FROM_EMAIL=onboarding@badal.dev` sets the `email.from_email` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use badalctl::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```

use clap::Parser;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "BADAL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where the onboarding portal is accessible (e.g., "https://onboard.badal.dev")
    /// Used to build the form links embedded in invitation and reminder emails.
    pub portal_url: String,
    /// Set from the conventional `DATABASE_URL` environment variable; takes
    /// precedence over `database.url` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Engagement database (PostgreSQL) configuration
    pub database: DatabaseConfig,
    /// Production user directory configuration
    pub directory: DirectoryConfig,
    /// Phone-verification identity provider configuration
    pub identity: IdentityConfig,
    /// Email configuration for invitation and reminder sends
    pub email: EmailConfig,
    /// Token lifecycle windows (activation, form, OAuth, OTP freshness)
    pub windows: WindowsConfig,
    /// Scheduled sweep configuration
    pub sweeps: SweepsConfig,
    /// Leader election for sweep scheduling in multi-replica deployments
    pub leader_election: LeaderElectionConfig,
    /// Default country code applied when normalizing national-format phone numbers
    pub phone_country_code: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3400,
            portal_url: "http://localhost:3400".to_string(),
            database_url: None,
            database: DatabaseConfig::default(),
            directory: DirectoryConfig::default(),
            identity: IdentityConfig::default(),
            email: EmailConfig::default(),
            windows: WindowsConfig::default(),
            sweeps: SweepsConfig::default(),
            leader_election: LeaderElectionConfig::default(),
            phone_country_code: "91".to_string(),
        }
    }
}

/// Connection pool settings for the engagement database.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Timeout for acquiring a connection from the pool
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL for the engagement store
    pub url: String,
    /// Pool settings
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/badal".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

/// Production user directory configuration.
///
/// The directory either lives in the same database as the engagement store
/// (`colocated` - submission writes join the engagement transaction) or in a
/// separate database (`remote` - writes use the compensation path). The mode
/// is the explicit transaction-capability probe: nothing at runtime sniffs
/// error messages to detect capability.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DirectoryConfig {
    /// Directory tables live in the engagement database
    Colocated,
    /// Directory lives in a separate database
    Remote {
        /// PostgreSQL connection URL for the directory store
        url: String,
        /// Pool settings for the directory connection
        #[serde(default)]
        pool: PoolSettings,
    },
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig::Colocated
    }
}

/// Identity provider used to verify phone OTPs.
///
/// `disabled` fails closed: every verification attempt is rejected. There is
/// no runtime probing for the provider's presence - the adapter is selected
/// here, at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum IdentityConfig {
    /// Google Identity Toolkit (Firebase) token verification
    Firebase {
        /// Web API key for the Firebase project
        api_key: String,
        /// Identity Toolkit base URL (override for testing)
        #[serde(default = "default_identity_base_url")]
        base_url: String,
        /// Bounded timeout for verification calls
        #[serde(default = "default_external_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// No provider configured; all verification attempts fail
    Disabled,
}

fn default_identity_base_url() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}

fn default_external_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig::Disabled
    }
}

/// Email transport configuration: SMTP for production, file for development/testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    File {
        path: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    /// From address on outbound mail
    pub from_email: String,
    /// Display name on outbound mail
    pub from_name: String,
    /// Transport selection
    pub transport: EmailTransportConfig,
    /// Bounded timeout for a single send; a timeout counts as a failed send
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_email: "onboarding@badal.dev".to_string(),
            from_name: "Badal Onboarding".to_string(),
            transport: EmailTransportConfig::File {
                path: "./emails".to_string(),
            },
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Token lifecycle windows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowsConfig {
    /// How long an unopened link stays activatable, measured from send time
    #[serde(with = "humantime_serde")]
    pub activation: Duration,
    /// How long an activated form stays open
    #[serde(with = "humantime_serde")]
    pub form: Duration,
    /// Form window when a Discord OAuth round-trip is in flight
    #[serde(with = "humantime_serde")]
    pub oauth_form: Duration,
    /// Maximum age of a phone verification at submission time
    #[serde(with = "humantime_serde")]
    pub otp_ttl: Duration,
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            activation: Duration::from_secs(24 * 60 * 60),
            form: Duration::from_secs(10 * 60),
            oauth_form: Duration::from_secs(30 * 60),
            otp_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Scheduled sweep cadences and retention policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepsConfig {
    /// Master switch for the sweep scheduler
    pub enabled: bool,
    /// Cadence of the stale-activation sweep
    #[serde(with = "humantime_serde")]
    pub stale_activation_interval: Duration,
    /// Cadence of the never-opened expiry sweep
    #[serde(with = "humantime_serde")]
    pub never_opened_interval: Duration,
    /// Cadence of the deferred-resend sweep
    #[serde(with = "humantime_serde")]
    pub resend_interval: Duration,
    /// Cadence of the retention cleanup sweep
    #[serde(with = "humantime_serde")]
    pub retention_interval: Duration,
    /// Minimum age of terminal tokens and drafts before retention deletes them
    #[serde(with = "humantime_serde")]
    pub retention_age: Duration,
}

impl Default for SweepsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_activation_interval: Duration::from_secs(30 * 60),
            never_opened_interval: Duration::from_secs(24 * 60 * 60),
            resend_interval: Duration::from_secs(48 * 60 * 60),
            retention_interval: Duration::from_secs(24 * 60 * 60),
            retention_age: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaderElectionConfig {
    /// When disabled, this replica always runs the sweeps
    pub enabled: bool,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Config {
    /// Load configuration from the YAML file and environment.
    pub fn load(args: &Args) -> Result<Self, Error> {
        let figment = Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("BADAL_").split("__"))
            // The conventional DATABASE_URL pattern used by deploy tooling
            .merge(Env::raw().only(&["DATABASE_URL"]));

        let config: Config = figment.extract().map_err(|e| Error::BadRequest {
            message: format!("Configuration error: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Engagement database URL, honoring the `DATABASE_URL` override.
    pub fn effective_database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.portal_url.is_empty() {
            return Err(Error::BadRequest {
                message: "portal_url must not be empty".to_string(),
            });
        }
        if self.windows.form > self.windows.oauth_form {
            return Err(Error::BadRequest {
                message: "windows.form must not exceed windows.oauth_form".to_string(),
            });
        }
        if let EmailTransportConfig::Smtp { host, .. } = &self.email.transport {
            if host.is_empty() {
                return Err(Error::BadRequest {
                    message: "email.transport.host must not be empty".to_string(),
                });
            }
        }
        if let IdentityConfig::Firebase { api_key, .. } = &self.identity {
            if api_key.is_empty() {
                return Err(Error::BadRequest {
                    message: "identity.api_key must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
