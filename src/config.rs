//! Configuration management for the switchboard service.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use switchboard_cache::{CacheConfig, ExecutionMode};
use switchboard_retry::{BackoffStrategy, ClientConfig, RetryPolicy, SchedulerConfig};

const CONFIG_FILE: &str = "switchboard.toml";

/// Service configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`switchboard.toml`)
/// 3. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Cache
    /// TTL for cache writes without an explicit TTL, in seconds.
    ///
    /// Environment variable: `CACHE_DEFAULT_TTL_SECONDS`
    #[serde(default = "default_cache_ttl", alias = "CACHE_DEFAULT_TTL_SECONDS")]
    pub cache_default_ttl_seconds: u64,
    /// TTL for cached instance settings, in seconds.
    ///
    /// Environment variable: `INSTANCE_SETTINGS_TTL_SECONDS`
    #[serde(default = "default_instance_settings_ttl", alias = "INSTANCE_SETTINGS_TTL_SECONDS")]
    pub instance_settings_ttl_seconds: u64,
    /// TTL for the cached quick-message list, in seconds.
    ///
    /// Environment variable: `QUICK_MESSAGES_TTL_SECONDS`
    #[serde(default = "default_quick_messages_ttl", alias = "QUICK_MESSAGES_TTL_SECONDS")]
    pub quick_messages_ttl_seconds: u64,
    /// TTL for cached contact lists, in seconds.
    ///
    /// Environment variable: `CONTACTS_TTL_SECONDS`
    #[serde(default = "default_contacts_ttl", alias = "CONTACTS_TTL_SECONDS")]
    pub contacts_ttl_seconds: u64,
    /// Pause between background cache sweeps, in seconds.
    ///
    /// Environment variable: `CACHE_SWEEP_INTERVAL_SECONDS`
    #[serde(default = "default_sweep_interval", alias = "CACHE_SWEEP_INTERVAL_SECONDS")]
    pub cache_sweep_interval_seconds: u64,
    /// `long_lived` or `request_scoped`; background tasks only run in the
    /// former.
    ///
    /// Environment variable: `EXECUTION_MODE`
    #[serde(default, alias = "EXECUTION_MODE")]
    pub execution_mode: ExecutionMode,

    // Retry
    /// Failed attempts after which a message is given up on.
    ///
    /// Environment variable: `MAX_RETRY_ATTEMPTS`
    #[serde(default = "default_retry_attempts", alias = "MAX_RETRY_ATTEMPTS")]
    pub max_retry_attempts: u32,
    /// Time since the first failure during which retries continue, in
    /// seconds. Zero disables the window.
    ///
    /// Environment variable: `RETRY_WINDOW_SECONDS`
    #[serde(default = "default_retry_window", alias = "RETRY_WINDOW_SECONDS")]
    pub retry_window_seconds: u64,
    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms", alias = "RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between automatic retries in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor", alias = "RETRY_JITTER_FACTOR")]
    pub retry_jitter_factor: f64,
    /// Whether due messages are retried in the background.
    ///
    /// Environment variable: `AUTO_RETRY_ENABLED`
    #[serde(default, alias = "AUTO_RETRY_ENABLED")]
    pub auto_retry_enabled: bool,
    /// Pause between automatic retry passes, in seconds.
    ///
    /// Environment variable: `AUTO_RETRY_INTERVAL_SECONDS`
    #[serde(default = "default_auto_retry_interval", alias = "AUTO_RETRY_INTERVAL_SECONDS")]
    pub auto_retry_interval_seconds: u64,

    // Gateway
    /// Messaging gateway base URL.
    ///
    /// Environment variable: `GATEWAY_URL`
    #[serde(default = "default_gateway_url", alias = "GATEWAY_URL")]
    pub gateway_url: String,
    /// Gateway API key.
    ///
    /// Environment variable: `GATEWAY_API_KEY`
    #[serde(default, alias = "GATEWAY_API_KEY")]
    pub gateway_api_key: Option<String>,
    /// Timeout for one gateway send, in seconds.
    ///
    /// Environment variable: `GATEWAY_TIMEOUT_SECONDS`
    #[serde(default = "default_gateway_timeout", alias = "GATEWAY_TIMEOUT_SECONDS")]
    pub gateway_timeout_seconds: u64,

    // Lifecycle
    /// Time allowed for background tasks to stop, in seconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout", alias = "SHUTDOWN_TIMEOUT_SECONDS")]
    pub shutdown_timeout_seconds: u64,

    // Logging
    /// Log filter used when `RUST_LOG` is not a valid directive.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to cache configuration.
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_secs(self.cache_default_ttl_seconds),
            instance_settings_ttl: Duration::from_secs(self.instance_settings_ttl_seconds),
            quick_messages_ttl: Duration::from_secs(self.quick_messages_ttl_seconds),
            contacts_ttl: Duration::from_secs(self.contacts_ttl_seconds),
            sweep_interval: Duration::from_secs(self.cache_sweep_interval_seconds),
            execution_mode: self.execution_mode,
        }
    }

    /// Convert to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            max_retry_window: (self.retry_window_seconds > 0)
                .then(|| Duration::from_secs(self.retry_window_seconds)),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter_factor: self.retry_jitter_factor,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }

    /// Convert to gateway client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.gateway_url.clone(),
            api_key: self.gateway_api_key.clone(),
            timeout: Duration::from_secs(self.gateway_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Convert to scheduler configuration.
    ///
    /// The scheduler is a background task, so it stays disabled in
    /// request-scoped execution even when auto-retry is requested.
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            enabled: self.auto_retry_enabled && self.execution_mode == ExecutionMode::LongLived,
            poll_interval: Duration::from_secs(self.auto_retry_interval_seconds),
        }
    }

    /// Time allowed for background tasks to stop.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        let ttls = [
            ("cache_default_ttl_seconds", self.cache_default_ttl_seconds),
            ("instance_settings_ttl_seconds", self.instance_settings_ttl_seconds),
            ("quick_messages_ttl_seconds", self.quick_messages_ttl_seconds),
            ("contacts_ttl_seconds", self.contacts_ttl_seconds),
            ("cache_sweep_interval_seconds", self.cache_sweep_interval_seconds),
            ("auto_retry_interval_seconds", self.auto_retry_interval_seconds),
            ("gateway_timeout_seconds", self.gateway_timeout_seconds),
        ];
        for (name, value) in ttls {
            if value == 0 {
                anyhow::bail!("{name} must be greater than 0");
            }
        }

        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms cannot exceed retry_max_delay_ms");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.gateway_url.is_empty() {
            anyhow::bail!("gateway_url must not be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_default_ttl_seconds: default_cache_ttl(),
            instance_settings_ttl_seconds: default_instance_settings_ttl(),
            quick_messages_ttl_seconds: default_quick_messages_ttl(),
            contacts_ttl_seconds: default_contacts_ttl(),
            cache_sweep_interval_seconds: default_sweep_interval(),
            execution_mode: ExecutionMode::default(),
            max_retry_attempts: default_retry_attempts(),
            retry_window_seconds: default_retry_window(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: default_jitter_factor(),
            auto_retry_enabled: false,
            auto_retry_interval_seconds: default_auto_retry_interval(),
            gateway_url: default_gateway_url(),
            gateway_api_key: None,
            gateway_timeout_seconds: default_gateway_timeout(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_instance_settings_ttl() -> u64 {
    600
}

fn default_quick_messages_ttl() -> u64 {
    900
}

fn default_contacts_ttl() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_window() -> u64 {
    24 * 60 * 60
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_auto_retry_interval() -> u64 {
    30
}

fn default_gateway_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info,switchboard=debug".to_string()
}
