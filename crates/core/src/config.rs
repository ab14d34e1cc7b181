use serde::Deserialize;

/// Root console configuration. Loaded from environment variables with the
/// prefix `CONSOLE__` and an optional `console.toml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_module")]
    pub default_module: String,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Reconciliation engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub module_probe_timeout_ms: u64,
    #[serde(default = "default_report_history")]
    pub report_history: usize,
}

/// Audit buffering settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

/// Stats fan-out settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
}

fn default_module() -> String {
    "dashboard".to_string()
}
fn default_sync_interval_secs() -> u64 {
    30
}
fn default_probe_timeout_ms() -> u64 {
    2000
}
fn default_report_history() -> usize {
    16
}
fn default_buffer_capacity() -> usize {
    1024
}
fn default_retry_interval_secs() -> u64 {
    5
}
fn default_source_timeout_ms() -> u64 {
    1500
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            default_module: default_module(),
            sync: SyncConfig::default(),
            audit: AuditConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            module_probe_timeout_ms: default_probe_timeout_ms(),
            report_history: default_report_history(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: default_source_timeout_ms(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from environment variables and an optional
    /// `console.toml` in the working directory.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("console").required(false))
            .add_source(
                config::Environment::with_prefix("CONSOLE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
