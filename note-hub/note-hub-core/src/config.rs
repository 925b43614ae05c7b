use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_TAGS: usize = 20;
/// Longest lease the service will hand out: one day.
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(86_400);

const LOCK_TTL_ENV: &str = "NOTE_HUB_LOCK_TTL_SECS";
const MAX_TAGS_ENV: &str = "NOTE_HUB_MAX_TAGS";

/// Tunables shared by the note and block services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// How long an acquired or renewed block lease stays active.
    pub lock_ttl: Duration,
    /// Tags beyond this count are dropped on note writes.
    pub max_tags: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            lock_ttl: DEFAULT_LOCK_TTL,
            max_tags: DEFAULT_MAX_TAGS,
        }
    }
}

impl HubConfig {
    /// Load overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(LOCK_TTL_ENV) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{LOCK_TTL_ENV} must be a number of seconds, got {raw:?}"))?;
            let ttl = Duration::from_secs(secs);
            anyhow::ensure!(secs > 0, "{LOCK_TTL_ENV} must be positive");
            anyhow::ensure!(
                ttl <= MAX_LOCK_TTL,
                "{LOCK_TTL_ENV} must be at most {} seconds, got {secs}",
                MAX_LOCK_TTL.as_secs()
            );
            config.lock_ttl = ttl;
        }
        if let Some(raw) = lookup(MAX_TAGS_ENV) {
            config.max_tags = raw
                .trim()
                .parse()
                .with_context(|| format!("{MAX_TAGS_ENV} must be an integer, got {raw:?}"))?;
        }
        Ok(config)
    }

    pub(crate) fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lock_ttl).unwrap_or(chrono::Duration::MAX)
    }
}
