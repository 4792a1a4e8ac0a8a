//! Environment-driven configuration, read once at start-up.

use {
    crate::domain::error::PipelineError,
    crate::domain::order::StatusLabels,
    crate::services::lock_manager::{LockSettings, MAX_ACQUIRE_TIMEOUT},
    crate::services::reconciliation::SweepSettings,
    crate::services::signature::DEFAULT_TOLERANCE,
    std::{collections::HashSet, env, str::FromStr, time::Duration},
};

/// Per-store enablement. Stores are enabled unless listed as disabled.
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    disabled: HashSet<i32>,
}

impl StoreSettings {
    pub fn with_disabled(stores: impl IntoIterator<Item = i32>) -> Self {
        Self {
            disabled: stores.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self, store_id: i32) -> bool {
        !self.disabled.contains(&store_id)
    }

    /// Disabled store ids, sorted.
    pub fn disabled(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.disabled.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub monei_api_key: String,
    pub monei_api_url: String,
    pub http_timeout: Duration,
    /// Accepted drift of a webhook signature's `t=` timestamp.
    pub signature_tolerance: Duration,
    pub labels: StatusLabels,
    pub stores: StoreSettings,
    pub locks: LockSettings,
    pub sweep: SweepSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any key/value source. `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let defaults = LockSettings::default();
        let ms = |name: &str, default: Duration| -> Result<Duration, PipelineError> {
            parse_or(&lookup, name, default.as_millis() as u64).map(Duration::from_millis)
        };
        let locks = LockSettings {
            acquire_timeout: ms("LOCK_ACQUIRE_TIMEOUT_MS", defaults.acquire_timeout)?
                .min(MAX_ACQUIRE_TIMEOUT),
            ttl: Duration::from_secs(parse_or(&lookup, "LOCK_TTL_SECS", defaults.ttl.as_secs())?),
            wait_timeout: ms("LOCK_WAIT_TIMEOUT_MS", defaults.wait_timeout)?,
            poll_interval: ms("LOCK_POLL_INTERVAL_MS", defaults.poll_interval)?,
            retry_interval: defaults.retry_interval,
        };
        if locks.ttl <= locks.acquire_timeout {
            return Err(PipelineError::Config(
                "LOCK_TTL_SECS must exceed the acquire timeout".into(),
            ));
        }

        let sweep_defaults = SweepSettings::default();
        let sweep = SweepSettings {
            interval: Duration::from_secs(parse_or(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                sweep_defaults.interval.as_secs(),
            )?),
            abandon_after: chrono::Duration::days(parse_or(
                &lookup,
                "SWEEP_ABANDON_AFTER_DAYS",
                sweep_defaults.abandon_after.num_days(),
            )?),
            batch_size: parse_or(&lookup, "SWEEP_BATCH_SIZE", sweep_defaults.batch_size)?,
        };
        if sweep.batch_size <= 0 {
            return Err(PipelineError::Config("SWEEP_BATCH_SIZE must be positive".into()));
        }

        let label_defaults = StatusLabels::default();
        let labels = StatusLabels {
            confirmed: parse_or(&lookup, "MONEI_CONFIRMED_STATUS", label_defaults.confirmed)?,
            pre_authorized: parse_or(
                &lookup,
                "MONEI_PREAUTHORIZED_STATUS",
                label_defaults.pre_authorized,
            )?,
        };
        labels.validate()?;

        let disabled = lookup("MONEI_DISABLED_STORES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i32>()
                    .map_err(|_| PipelineError::Config(format!("MONEI_DISABLED_STORES: bad store id {s}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", "0.0.0.0:3000".to_string())?,
            monei_api_key: required(&lookup, "MONEI_API_KEY")?,
            monei_api_url: parse_or(
                &lookup,
                "MONEI_API_URL",
                "https://api.monei.com/v1".to_string(),
            )?,
            http_timeout: Duration::from_secs(parse_or(&lookup, "MONEI_HTTP_TIMEOUT_SECS", 30)?),
            signature_tolerance: Duration::from_secs(parse_or(
                &lookup,
                "MONEI_SIGNATURE_TOLERANCE_SECS",
                DEFAULT_TOLERANCE.as_secs(),
            )?),
            labels,
            stores: StoreSettings::with_disabled(disabled),
            locks,
            sweep,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<String, PipelineError> {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PipelineError::Config(format!("{name} must be set")))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, PipelineError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::Config(format!("{name}: invalid value {raw:?}"))),
        None => Ok(default),
    }
}
