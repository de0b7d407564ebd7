use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `OMNIJOURNEY__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub journey: JourneyConfig,
}

/// Cooperative scheduler tick intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_step_tick_ms")]
    pub step_tick_ms: u64,
    #[serde(default = "default_personalization_refresh_ms")]
    pub personalization_refresh_ms: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Send history older than this is pruned on the cleanup tick.
    #[serde(default = "default_history_retention_hours")]
    pub history_retention_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JourneyConfig {
    #[serde(default = "default_max_active_journeys")]
    pub max_active_journeys: usize,
    /// Retry delay when a step is deferred by frequency capping.
    #[serde(default = "default_defer_retry_secs")]
    pub defer_retry_secs: u64,
}

fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_step_tick_ms() -> u64 {
    100
}
fn default_personalization_refresh_ms() -> u64 {
    500
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_history_retention_hours() -> i64 {
    168
}
fn default_max_active_journeys() -> usize {
    100_000
}
fn default_defer_retry_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            step_tick_ms: default_step_tick_ms(),
            personalization_refresh_ms: default_personalization_refresh_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            history_retention_hours: default_history_retention_hours(),
        }
    }
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            max_active_journeys: default_max_active_journeys(),
            defer_retry_secs: default_defer_retry_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            scheduler: SchedulerConfig::default(),
            journey: JourneyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("OMNIJOURNEY")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
