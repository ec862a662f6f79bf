use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::ratelimit::UsagePolicy;
use crate::upload::UploadPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Require JWT authentication
    #[arg(long, env = "JWT_REQUIRED")]
    pub jwt_required: Option<bool>,

    /// Enable per-user rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub limits: LimitsConfig,
    pub upload: UploadConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    pub jwt_required: bool,
    pub jwt_secret: String,
}

/// Per-user rolling-window budgets.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub rate_limit_enabled: bool,
    pub max_analysis_calls: u32,
    pub call_window_secs: u64,
    pub max_upload_mib: u64,
    pub volume_window_secs: u64,
}

impl LimitsConfig {
    /// Materialize the limiter policy.
    #[must_use]
    pub fn policy(&self) -> UsagePolicy {
        UsagePolicy {
            max_calls: self.max_analysis_calls,
            call_window: Duration::from_secs(self.call_window_secs),
            max_upload_bytes: self.max_upload_mib * 1024 * 1024,
            volume_window: Duration::from_secs(self.volume_window_secs),
        }
    }
}

/// Chunked upload session policy.
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_chunk_size: usize,
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl UploadConfig {
    /// Materialize the store policy.
    #[must_use]
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_chunk_size: self.max_chunk_size,
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("security.jwt_required", true)?
            .set_default("security.jwt_secret", "change-me")?
            .set_default("limits.rate_limit_enabled", true)?
            .set_default("limits.max_analysis_calls", 10)?
            .set_default("limits.call_window_secs", 60 * 60)?
            .set_default("limits.max_upload_mib", 100)?
            .set_default("limits.volume_window_secs", 24 * 60 * 60)?
            .set_default("upload.max_chunk_size", 1024 * 1024)?
            .set_default("upload.session_ttl_secs", 10 * 60)?
            .set_default("upload.sweep_interval_secs", 60)?
            .set_default("resilience.timeout_disabled", false)?;

        // Config file (CLI flag or CONFIG_FILE env), when present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else if let Ok(path) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&path));
        }

        // Environment variables (prefixed with HIVE_), e.g. HIVE_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("HIVE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI overrides win over every other source
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(jwt) = cli.jwt_required {
            builder = builder.set_override("security.jwt_required", jwt)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("limits.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}
