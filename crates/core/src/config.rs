use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables
/// with the prefix `NURTURE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Minimum match score a template must reach to be returned.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_include_fallbacks")]
    pub include_fallbacks: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_template_ttl_secs")]
    pub template_ttl_secs: u64,
    #[serde(default = "default_insights_ttl_secs")]
    pub insights_ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_min_score() -> f64 {
    0.0
}

fn default_max_results() -> usize {
    5
}

fn default_include_fallbacks() -> bool {
    true
}

fn default_template_ttl_secs() -> u64 {
    300
}

fn default_insights_ttl_secs() -> u64 {
    60
}

fn default_max_entries() -> usize {
    10_000
}

fn default_snapshot_interval_secs() -> u64 {
    300
}

fn default_retention_days() -> i64 {
    30
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_results: default_max_results(),
            include_fallbacks: default_include_fallbacks(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            template_ttl_secs: default_template_ttl_secs(),
            insights_ttl_secs: default_insights_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            cache: CacheConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("NURTURE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.selection.min_score, 0.0);
        assert_eq!(cfg.selection.max_results, 5);
        assert!(cfg.selection.include_fallbacks);
        assert_eq!(cfg.cache.template_ttl_secs, 300);
        assert_eq!(cfg.tracking.snapshot_interval_secs, 300);
        assert_eq!(cfg.tracking.retention_days, 30);
    }
}
