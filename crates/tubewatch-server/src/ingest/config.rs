//! Ingestion configuration
//!
//! Everything the fetch/ingest pipeline needs, read from the environment.

use std::time::Duration;

use tubewatch_common::env;

use super::credentials::ExhaustionPolicy;
use super::fetcher::FetcherSettings;
use super::scheduler::parse_schedule;
use super::youtube::DEFAULT_YOUTUBE_API_BASE_URL;
use crate::queue::amqp::{
    AmqpSettings, DEFAULT_AMQP_URL, DEFAULT_QUEUE_NAME, DEFAULT_RECONNECT_DELAY_SECS,
};

/// Every five minutes, on the minute.
pub const DEFAULT_FETCH_SCHEDULE: &str = "0 */5 * * * *";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_LOOKBACK_MINUTES: u64 = 120;
/// One year
pub const MAX_LOOKBACK_MINUTES: u64 = 365 * 24 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Which broker carries video batches between fetcher and ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Amqp,
    /// In-process queue; batches do not survive a restart.
    Memory,
}

impl std::str::FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amqp" | "rabbitmq" => Ok(Self::Amqp),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown queue backend {other:?} (expected amqp or memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub url: String,
    pub queue_name: String,
    pub reconnect_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Amqp,
            url: DEFAULT_AMQP_URL.to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            backend: env::parse_or("QUEUE_BACKEND", QueueBackend::Amqp)?,
            url: env::string_or("AMQP_URL", DEFAULT_AMQP_URL),
            queue_name: env::string_or("AMQP_QUEUE_NAME", DEFAULT_QUEUE_NAME),
            reconnect_delay_secs: env::parse_or(
                "AMQP_RECONNECT_DELAY_SECS",
                DEFAULT_RECONNECT_DELAY_SECS,
            )?,
        })
    }

    pub fn amqp_settings(&self) -> AmqpSettings {
        AmqpSettings {
            url: self.url.clone(),
            queue_name: self.queue_name.clone(),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        }
    }
}

#[derive(Clone)]
pub struct IngestConfig {
    pub enabled: bool,
    pub cron_schedule: String,
    pub keyword: String,
    pub api_keys: Vec<String>,
    pub api_base_url: String,
    pub page_size: u32,
    pub lookback_minutes: u64,
    pub request_timeout_secs: u64,
    pub exhaustion_policy: ExhaustionPolicy,
    /// Defaults to three passes over the key pool
    pub max_rotations: Option<usize>,
    pub prevent_overlap: bool,
    pub queue: QueueConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_schedule: DEFAULT_FETCH_SCHEDULE.to_string(),
            keyword: String::new(),
            api_keys: Vec::new(),
            api_base_url: DEFAULT_YOUTUBE_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            lookback_minutes: DEFAULT_LOOKBACK_MINUTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            exhaustion_policy: ExhaustionPolicy::FailFast,
            max_rotations: None,
            prevent_overlap: true,
            queue: QueueConfig::default(),
        }
    }
}

impl std::fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestConfig")
            .field("enabled", &self.enabled)
            .field("cron_schedule", &self.cron_schedule)
            .field("keyword", &self.keyword)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("api_base_url", &self.api_base_url)
            .field("page_size", &self.page_size)
            .field("lookback_minutes", &self.lookback_minutes)
            .field("exhaustion_policy", &self.exhaustion_policy)
            .field("max_rotations", &self.max_rotations)
            .field("prevent_overlap", &self.prevent_overlap)
            .field("queue", &self.queue)
            .finish()
    }
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            enabled: env::parse_or("INGEST_ENABLED", true)?,
            cron_schedule: env::string_or("CRON_TO_FETCH_VIDEOS", DEFAULT_FETCH_SCHEDULE),
            keyword: env::optional("KEYWORD_TO_FETCH_VIDEOS").unwrap_or_default(),
            api_keys: env::list("GOOGLE_API_KEYS"),
            api_base_url: env::string_or("YOUTUBE_API_BASE_URL", DEFAULT_YOUTUBE_API_BASE_URL),
            page_size: env::parse_or("YOUTUBE_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            lookback_minutes: env::parse_or("YOUTUBE_LOOKBACK_MINUTES", DEFAULT_LOOKBACK_MINUTES)?,
            request_timeout_secs: env::parse_or(
                "YOUTUBE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            exhaustion_policy: env::parse_or(
                "YOUTUBE_KEY_EXHAUSTION_POLICY",
                ExhaustionPolicy::FailFast,
            )?,
            max_rotations: env::optional("YOUTUBE_MAX_ROTATIONS")
                .map(|raw| {
                    raw.parse::<usize>().map_err(|e| {
                        anyhow::anyhow!("YOUTUBE_MAX_ROTATIONS={raw:?} is invalid: {e}")
                    })
                })
                .transpose()?,
            prevent_overlap: env::parse_or("INGEST_PREVENT_OVERLAP", true)?,
            queue: QueueConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Disabled ingestion is always valid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.keyword.trim().is_empty() {
            anyhow::bail!("KEYWORD_TO_FETCH_VIDEOS must be set when ingestion is enabled");
        }
        if self.api_keys.is_empty() {
            anyhow::bail!("GOOGLE_API_KEYS must list at least one key when ingestion is enabled");
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            anyhow::bail!(
                "YOUTUBE_PAGE_SIZE must be between 1 and {} (got {})",
                MAX_PAGE_SIZE,
                self.page_size
            );
        }
        if !(1..=MAX_LOOKBACK_MINUTES).contains(&self.lookback_minutes) {
            anyhow::bail!(
                "YOUTUBE_LOOKBACK_MINUTES must be between 1 and {} (got {})",
                MAX_LOOKBACK_MINUTES,
                self.lookback_minutes
            );
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("YOUTUBE_REQUEST_TIMEOUT_SECS must be greater than 0");
        }
        if self.max_rotations == Some(0) {
            anyhow::bail!("YOUTUBE_MAX_ROTATIONS must be greater than 0");
        }
        url::Url::parse(&self.api_base_url)
            .map_err(|e| anyhow::anyhow!("YOUTUBE_API_BASE_URL is invalid: {e}"))?;

        parse_schedule(&self.cron_schedule)?;

        if self.queue.backend == QueueBackend::Amqp {
            self.queue.amqp_settings().validate()?;
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Rotation cap for one fetch cycle.
    pub fn effective_max_rotations(&self) -> usize {
        self.max_rotations
            .unwrap_or_else(|| 3 * self.api_keys.len().max(1))
    }

    pub fn fetcher_settings(&self) -> FetcherSettings {
        FetcherSettings {
            keyword: self.keyword.clone(),
            page_size: self.page_size,
            lookback: lookback_duration(self.lookback_minutes),
            max_rotations: self.effective_max_rotations(),
        }
    }
}

/// Lookback window, clamped to [`MAX_LOOKBACK_MINUTES`].
fn lookback_duration(minutes: u64) -> chrono::Duration {
    chrono::Duration::minutes(minutes.min(MAX_LOOKBACK_MINUTES) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "INGEST_ENABLED",
        "CRON_TO_FETCH_VIDEOS",
        "KEYWORD_TO_FETCH_VIDEOS",
        "GOOGLE_API_KEYS",
        "YOUTUBE_PAGE_SIZE",
        "YOUTUBE_KEY_EXHAUSTION_POLICY",
        "YOUTUBE_MAX_ROTATIONS",
        "QUEUE_BACKEND",
        "AMQP_QUEUE_NAME",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    fn enabled() -> IngestConfig {
        IngestConfig {
            keyword: "rust".to_string(),
            api_keys: vec!["k1".to_string(), "k2".to_string()],
            ..IngestConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(enabled().validate().is_ok());
    }

    #[test]
    fn test_disabled_config_skips_validation() {
        let config = IngestConfig {
            enabled: false,
            ..IngestConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_requires_keyword_and_keys() {
        let mut config = enabled();
        config.keyword = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = enabled();
        config.api_keys.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = enabled();
        config.page_size = 0;
        assert!(config.validate().is_err());
        config.page_size = 51;
        assert!(config.validate().is_err());
        config.page_size = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lookback_bounds() {
        let mut config = enabled();
        config.lookback_minutes = 0;
        assert!(config.validate().is_err());
        config.lookback_minutes = MAX_LOOKBACK_MINUTES + 1;
        assert!(config.validate().is_err());
        config.lookback_minutes = u64::MAX;
        assert!(config.validate().is_err());
        config.lookback_minutes = MAX_LOOKBACK_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_lookback_is_clamped_in_settings() {
        let config = IngestConfig {
            lookback_minutes: u64::MAX,
            ..enabled()
        };
        assert_eq!(config.fetcher_settings().lookback, chrono::Duration::days(365));
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let mut config = enabled();
        config.cron_schedule = "every five minutes".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_backend_skips_amqp_validation() {
        let mut config = enabled();
        config.queue.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.queue.backend = QueueBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_rotation_cap_is_three_passes() {
        let config = enabled();
        assert_eq!(config.effective_max_rotations(), 6);

        let config = IngestConfig {
            max_rotations: Some(4),
            ..enabled()
        };
        assert_eq!(config.effective_max_rotations(), 4);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let debug = format!("{:?}", enabled());
        assert!(!debug.contains("k1"));
        assert!(debug.contains("2 redacted"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("KEYWORD_TO_FETCH_VIDEOS", "cricket");
        std::env::set_var("GOOGLE_API_KEYS", "key-a,key-b,key-c");
        std::env::set_var("CRON_TO_FETCH_VIDEOS", "*/10 * * * *");
        std::env::set_var("YOUTUBE_KEY_EXHAUSTION_POLICY", "wrap_around");
        std::env::set_var("QUEUE_BACKEND", "memory");

        let config = IngestConfig::from_env().unwrap();
        assert!(config.enabled);
        assert_eq!(config.keyword, "cricket");
        assert_eq!(config.api_keys.len(), 3);
        assert_eq!(config.exhaustion_policy, ExhaustionPolicy::WrapAround);
        assert_eq!(config.queue.backend, QueueBackend::Memory);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.effective_max_rotations(), 9);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_numbers() {
        clear_env();
        std::env::set_var("KEYWORD_TO_FETCH_VIDEOS", "cricket");
        std::env::set_var("GOOGLE_API_KEYS", "key-a");
        std::env::set_var("YOUTUBE_MAX_ROTATIONS", "lots");

        assert!(IngestConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_disabled_without_keys() {
        clear_env();
        std::env::set_var("INGEST_ENABLED", "false");

        let config = IngestConfig::from_env().unwrap();
        assert!(!config.enabled);

        clear_env();
    }
}
