use tiercache_core::CacheError;
use tiercache_stats::StatisticsError;

/// Invalid cache configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid cache configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache name must not be empty")]
    EmptyName,

    #[error("unknown eviction policy `{0}` (expected lru, lfu, fifo or random)")]
    UnknownPolicy(String),

    #[error("sample_period_ms must be positive when statistics are enabled")]
    ZeroSamplePeriod,

    #[error("an eternal cache cannot also set time_to_live_secs or time_to_idle_secs")]
    ConflictingExpiry,
}

/// Everything a [`Cache`](crate::Cache) can fail with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Statistics(#[from] StatisticsError),

    #[error("failed to start statistics sampler: {0}")]
    Sampler(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
