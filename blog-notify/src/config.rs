use std::str::FromStr;
use std::time::Duration;

use blog_queue::{QueueConfig, RetryPolicy};

use crate::error::ConfigError;
use crate::mailer::MailerDefaults;

/// Log output format, from `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Runtime settings for the notification service
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub queue: QueueConfig,
    pub mailer: MailerDefaults,
    pub log_format: LogFormat,
}

impl NotifyConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; absent keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let queue_defaults = QueueConfig::default();
        let retry_defaults = RetryPolicy::default();
        let mail_defaults = MailerDefaults::default();

        let retry_policy = RetryPolicy::new(
            parse_or(&lookup, "RETRY_BASE_DELAY_SECS", retry_defaults.base_delay_secs())?,
            parse_or(&lookup, "RETRY_MULTIPLIER", retry_defaults.multiplier())?,
            parse_or(&lookup, "RETRY_MAX_RETRIES", retry_defaults.max_retries())?,
        );

        let queue = QueueConfig {
            workers: parse_or(&lookup, "QUEUE_WORKERS", queue_defaults.workers)?,
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "QUEUE_POLL_INTERVAL_MS",
                queue_defaults.poll_interval.as_millis() as u64,
            )?),
            lease_duration: Duration::from_secs(parse_or(
                &lookup,
                "QUEUE_LEASE_DURATION_SECS",
                queue_defaults.lease_duration.as_secs(),
            )?),
            reaper_interval: Duration::from_secs(parse_or(
                &lookup,
                "QUEUE_REAPER_INTERVAL_SECS",
                queue_defaults.reaper_interval.as_secs(),
            )?),
            heartbeat_interval: Duration::from_secs(parse_or(
                &lookup,
                "QUEUE_HEARTBEAT_INTERVAL_SECS",
                queue_defaults.heartbeat_interval.as_secs(),
            )?),
            succeeded_retention: Duration::from_secs(parse_or(
                &lookup,
                "QUEUE_SUCCEEDED_RETENTION_SECS",
                queue_defaults.succeeded_retention.as_secs(),
            )?),
            retry_policy,
        };

        let mailer = MailerDefaults {
            from: lookup("MAIL_FROM").unwrap_or(mail_defaults.from),
            site_name: lookup("SITE_NAME").unwrap_or(mail_defaults.site_name),
            site_url: lookup("SITE_URL").unwrap_or(mail_defaults.site_url),
            support_email: lookup("SUPPORT_EMAIL").unwrap_or(mail_defaults.support_email),
        };

        Ok(Self {
            queue,
            mailer,
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::default())?,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = NotifyConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.queue.workers, 4);
        assert_eq!(config.queue.poll_interval, Duration::from_millis(250));
        assert_eq!(config.queue.lease_duration, Duration::from_secs(300));
        assert_eq!(config.queue.reaper_interval, Duration::from_secs(30));
        assert_eq!(config.queue.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.queue.succeeded_retention, Duration::from_secs(3600));
        assert_eq!(config.queue.retry_policy, RetryPolicy::default());
        assert_eq!(config.mailer, MailerDefaults::default());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = NotifyConfig::from_lookup(lookup(&[
            ("QUEUE_WORKERS", " 8 "),
            ("QUEUE_POLL_INTERVAL_MS", "50"),
            ("QUEUE_HEARTBEAT_INTERVAL_SECS", "10"),
            ("RETRY_BASE_DELAY_SECS", "10"),
            ("RETRY_MULTIPLIER", "2"),
            ("RETRY_MAX_RETRIES", "5"),
            ("SITE_NAME", "Dog Blog"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.queue.workers, 8);
        assert_eq!(config.queue.poll_interval, Duration::from_millis(50));
        assert_eq!(config.queue.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.queue.retry_policy.max_retries(), 5);
        assert_eq!(config.queue.retry_policy.retry_delay(2), Duration::from_secs(20));
        assert_eq!(config.mailer.site_name, "Dog Blog");
        assert_eq!(config.mailer.from, "notifications@example.com");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = NotifyConfig::from_lookup(lookup(&[("QUEUE_WORKERS", "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "QUEUE_WORKERS".into(),
                value: "many".into()
            }
        );

        let err = NotifyConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).unwrap_err();
        assert!(err.to_string().contains("LOG_FORMAT"));
    }
}
