use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tiercache_core::PolicyKind;

use crate::ConfigError;

/// Settings for one [`Cache`](crate::Cache).
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes:
///
/// ```
/// use tiercache::CacheConfig;
///
/// let config = CacheConfig::from_json(r#"{ "name": "users", "max_entries_in_memory": 2 }"#).unwrap();
/// assert_eq!(config.name, "users");
/// assert_eq!(config.memory_eviction_policy, "lru");
/// assert!(!config.overflow_to_disk);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub name: String,
    /// 0 means unbounded.
    pub max_entries_in_memory: usize,
    pub memory_eviction_policy: String,
    /// Spill heap evictions into a disk tier.
    pub overflow_to_disk: bool,
    /// Directory for the disk tier's data file. Defaults to the system temp
    /// directory.
    pub disk_path: Option<PathBuf>,
    /// 0 means unbounded.
    pub max_entries_on_disk: usize,
    /// Applied to elements that carry no time-to-live of their own; 0 means
    /// no limit.
    pub time_to_live_secs: u64,
    pub time_to_idle_secs: u64,
    pub eternal: bool,
    /// Bind and sample extended statistics for this cache.
    pub statistics: bool,
    pub sample_period_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_entries_in_memory: 10_000,
            memory_eviction_policy: "lru".to_string(),
            overflow_to_disk: false,
            disk_path: None,
            max_entries_on_disk: 0,
            time_to_live_secs: 0,
            time_to_idle_secs: 0,
            eternal: false,
            statistics: true,
            sample_period_ms: 1000,
        }
    }
}

impl CacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn max_entries_in_memory(mut self, max: usize) -> Self {
        self.max_entries_in_memory = max;
        self
    }

    pub fn memory_eviction_policy(mut self, policy: impl Into<String>) -> Self {
        self.memory_eviction_policy = policy.into();
        self
    }

    pub fn overflow_to_disk(mut self, overflow: bool) -> Self {
        self.overflow_to_disk = overflow;
        self
    }

    pub fn disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = Some(path.into());
        self
    }

    pub fn max_entries_on_disk(mut self, max: usize) -> Self {
        self.max_entries_on_disk = max;
        self
    }

    pub fn time_to_live_secs(mut self, secs: u64) -> Self {
        self.time_to_live_secs = secs;
        self
    }

    pub fn time_to_idle_secs(mut self, secs: u64) -> Self {
        self.time_to_idle_secs = secs;
        self
    }

    pub fn eternal(mut self, eternal: bool) -> Self {
        self.eternal = eternal;
        self
    }

    pub fn statistics(mut self, enabled: bool) -> Self {
        self.statistics = enabled;
        self
    }

    pub fn sample_period_ms(mut self, millis: u64) -> Self {
        self.sample_period_ms = millis;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        self.eviction_policy()?;
        if self.statistics && self.sample_period_ms == 0 {
            return Err(ConfigError::ZeroSamplePeriod);
        }
        if self.eternal && (self.time_to_live_secs > 0 || self.time_to_idle_secs > 0) {
            return Err(ConfigError::ConflictingExpiry);
        }
        Ok(())
    }

    /// The heap tier's eviction policy; unlike `PolicyKind::from`, unknown
    /// names are rejected.
    pub fn eviction_policy(&self) -> Result<PolicyKind, ConfigError> {
        PolicyKind::parse(&self.memory_eviction_policy)
            .ok_or_else(|| ConfigError::UnknownPolicy(self.memory_eviction_policy.clone()))
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// Where the disk tier keeps its data file.
    pub fn data_file(&self) -> PathBuf {
        let stem: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        match &self.disk_path {
            Some(dir) => dir.join(format!("{}.data", stem)),
            None => std::env::temp_dir().join(format!("tiercache-{}-{}.data", stem, std::process::id())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries_in_memory, 10_000);
        assert_eq!(config.sample_period(), Duration::from_secs(1));
        assert!(config.statistics);
        config.validate().unwrap();
    }

    #[test]
    fn test_json_round_trip_keeps_settings() {
        let config = CacheConfig::new("orders")
            .max_entries_in_memory(2)
            .overflow_to_disk(true)
            .disk_path("/var/cache/orders")
            .time_to_live_secs(30);
        let parsed = CacheConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            CacheConfig::new("  ").validate(),
            Err(ConfigError::EmptyName)
        ));
        assert!(matches!(
            CacheConfig::new("c").memory_eviction_policy("clock").validate(),
            Err(ConfigError::UnknownPolicy(name)) if name == "clock"
        ));
        assert!(matches!(
            CacheConfig::new("c").sample_period_ms(0).validate(),
            Err(ConfigError::ZeroSamplePeriod)
        ));
        CacheConfig::new("c").sample_period_ms(0).statistics(false).validate().unwrap();
        assert!(matches!(
            CacheConfig::new("c").eternal(true).time_to_idle_secs(5).validate(),
            Err(ConfigError::ConflictingExpiry)
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            CacheConfig::from_json("{ \"name\": 7 }"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_data_file_sanitizes_name() {
        let config = CacheConfig::new("users/eu west").disk_path("/data");
        assert_eq!(config.data_file(), PathBuf::from("/data/users_eu_west.data"));
    }
}
