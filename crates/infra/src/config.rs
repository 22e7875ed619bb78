//! Environment-driven bridge configuration.
//!
//! Read once at startup; immutable afterwards.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use courier_observability::LogFormat;
use courier_pipeline::{DeadLetterRouter, RetryPolicy};

pub const ENV_BROKERS: &str = "COURIER_BROKERS";
pub const ENV_GROUP_ID: &str = "COURIER_GROUP_ID";
pub const ENV_SOURCE_TOPIC: &str = "COURIER_SOURCE_TOPIC";
pub const ENV_DEAD_LETTER_TOPIC: &str = "COURIER_DEAD_LETTER_TOPIC";
pub const ENV_DEAD_LETTER_PARTITIONS: &str = "COURIER_DEAD_LETTER_PARTITIONS";
pub const ENV_RETRY_INITIAL_INTERVAL_MS: &str = "COURIER_RETRY_INITIAL_INTERVAL_MS";
pub const ENV_RETRY_MULTIPLIER: &str = "COURIER_RETRY_MULTIPLIER";
pub const ENV_RETRY_MAX_RETRIES: &str = "COURIER_RETRY_MAX_RETRIES";
pub const ENV_RETRY_MAX_INTERVAL_MS: &str = "COURIER_RETRY_MAX_INTERVAL_MS";
pub const ENV_MAX_REQUEUES: &str = "COURIER_MAX_REQUEUES";
pub const ENV_HTTP_ADDR: &str = "COURIER_HTTP_ADDR";
pub const ENV_LOG_FORMAT: &str = "COURIER_LOG_FORMAT";
pub const ENV_PUBLISH_TIMEOUT_MS: &str = "COURIER_PUBLISH_TIMEOUT_MS";

const DEFAULT_BROKERS: &str = "localhost:9092";
const DEFAULT_GROUP_ID: &str = "courier-group";
const DEFAULT_SOURCE_TOPIC: &str = "messages";
const DEFAULT_DEAD_LETTER_TOPIC: &str = "messages.DLT";
const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must not be empty")]
    Empty { var: &'static str },

    #[error("invalid value `{value}` for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub brokers: String,
    pub group_id: String,
    pub source_topic: String,
    /// `None` disables dead-lettering (terminal failures are discarded).
    pub dead_letter_topic: Option<String>,
    pub dead_letter_partitions: Option<i32>,
    pub retry: RetryPolicy,
    pub max_requeues: Option<u32>,
    pub http_addr: SocketAddr,
    pub log_format: LogFormat,
    pub publish_timeout: Duration,
}

impl BridgeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through `lookup` (variable name -> value).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let dead_letter_topic = match env.raw(ENV_DEAD_LETTER_TOPIC) {
            Some(topic) if topic.trim().is_empty() => None,
            Some(topic) => Some(topic.trim().to_string()),
            None => Some(DEFAULT_DEAD_LETTER_TOPIC.to_string()),
        };

        let dead_letter_partitions = env.parse_opt::<i32>(ENV_DEAD_LETTER_PARTITIONS)?;
        if let Some(p) = dead_letter_partitions {
            if p < 1 {
                return Err(ConfigError::invalid(
                    ENV_DEAD_LETTER_PARTITIONS,
                    &p.to_string(),
                    "must be at least 1",
                ));
            }
        }

        let multiplier = env.parse_or(ENV_RETRY_MULTIPLIER, 3.0_f64)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::invalid(
                ENV_RETRY_MULTIPLIER,
                &multiplier.to_string(),
                "must be a finite number >= 1",
            ));
        }

        let mut retry = RetryPolicy::new(
            Duration::from_millis(env.parse_or(ENV_RETRY_INITIAL_INTERVAL_MS, 10_000_u64)?),
            multiplier,
            env.parse_or(ENV_RETRY_MAX_RETRIES, 2_u32)?,
        );
        if let Some(ms) = env.parse_opt::<u64>(ENV_RETRY_MAX_INTERVAL_MS)? {
            retry = retry.with_max_interval(Duration::from_millis(ms));
        }

        let log_format = match env.raw(ENV_LOG_FORMAT) {
            Some(raw) => LogFormat::from_str(&raw)
                .map_err(|e| ConfigError::invalid(ENV_LOG_FORMAT, &raw, e.to_string()))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            brokers: env.non_empty(ENV_BROKERS, DEFAULT_BROKERS)?,
            group_id: env.non_empty(ENV_GROUP_ID, DEFAULT_GROUP_ID)?,
            source_topic: env.non_empty(ENV_SOURCE_TOPIC, DEFAULT_SOURCE_TOPIC)?,
            dead_letter_topic,
            dead_letter_partitions,
            retry,
            max_requeues: env.parse_opt(ENV_MAX_REQUEUES)?,
            http_addr: env.parse_or(ENV_HTTP_ADDR, default_http_addr())?,
            log_format,
            publish_timeout: Duration::from_millis(
                env.parse_or(ENV_PUBLISH_TIMEOUT_MS, DEFAULT_PUBLISH_TIMEOUT_MS)?,
            ),
        })
    }

    /// Router for terminal failures, built from the dead-letter settings.
    pub fn dead_letter_router(&self) -> DeadLetterRouter {
        let mut router = match &self.dead_letter_topic {
            Some(topic) => DeadLetterRouter::new(topic.clone()),
            None => DeadLetterRouter::discarding(),
        };
        if let Some(partitions) = self.dead_letter_partitions {
            router = router.with_dead_letter_partitions(partitions);
        }
        if let Some(max) = self.max_requeues {
            router = router.with_max_requeues(max);
        }
        router
    }

    pub fn source_topics(&self) -> Vec<String> {
        vec![self.source_topic.clone()]
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
    }

    fn non_empty(&self, var: &'static str, default: &str) -> Result<String, ConfigError> {
        match self.raw(var) {
            Some(value) if value.trim().is_empty() => Err(ConfigError::Empty { var }),
            Some(value) => Ok(value.trim().to_string()),
            None => Ok(default.to_string()),
        }
    }

    fn parse_opt<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(var) {
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::invalid(var, &raw, e.to_string())),
            None => Ok(None),
        }
    }

    fn parse_or<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_opt(var)?.unwrap_or(default))
    }
}
