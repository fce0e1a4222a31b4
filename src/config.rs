//! Configuration management with validation and defaults

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Top-level service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PontoonConfig {
    pub rules: RulesConfig,
    pub guard: GuardConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
}

impl Default for PontoonConfig {
    fn default() -> Self {
        Self {
            rules: RulesConfig::default(),
            guard: GuardConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Table rules and chip economy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Balance a brand-new player profile starts with
    pub starting_balance: u64,
    /// Smallest accepted bet, in chips
    pub minimum_bet: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            starting_balance: 500,
            minimum_bet: 10,
        }
    }
}

/// What happens to a live game the owner walked away from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AbandonmentPolicy {
    /// Force-complete the game as a forfeit on the next access
    Forfeit,
    /// Hand the live game back to the client unchanged
    Resume,
}

impl fmt::Display for AbandonmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonmentPolicy::Forfeit => write!(f, "forfeit"),
            AbandonmentPolicy::Resume => write!(f, "resume"),
        }
    }
}

/// Concurrency and recovery guard settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardConfig {
    pub abandonment_policy: AbandonmentPolicy,
    /// A live game idle for longer than this is forfeited on next access
    pub inactivity_window_seconds: u64,
    /// Attempts for a conflicted read-mutate-commit sequence
    pub conflict_retry_limit: u32,
    pub conflict_retry_delay_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            abandonment_policy: AbandonmentPolicy::Resume,
            inactivity_window_seconds: 3600,
            conflict_retry_limit: 3,
            conflict_retry_delay_ms: 25,
        }
    }
}

/// Storage configuration with optimization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub target_file_size_mb: usize,
    pub compression_type: CompressionType,
    /// Whether to clear the database on startup (testing only!)
    pub clear_on_start: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/pontoon_data".to_string(),
            write_buffer_size_mb: 128,
            max_write_buffer_number: 4,
            target_file_size_mb: 128,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

/// In-process cache tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_seconds: 3600,
            cleanup_interval_seconds: 60,
        }
    }
}

/// Configuration validation and factory methods
impl PontoonConfig {
    /// Configuration for tests: throwaway storage and tight timings
    pub fn testing() -> Self {
        Self {
            guard: GuardConfig {
                inactivity_window_seconds: 2,
                conflict_retry_delay_ms: 1,
                ..Default::default()
            },
            storage: StorageConfig {
                clear_on_start: true,
                ..Default::default()
            },
            cache: CacheConfig {
                capacity: 100,
                ttl_seconds: 60,
                cleanup_interval_seconds: 1,
            },
            ..Default::default()
        }
    }

    /// Configuration for production deployment with persistence
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                write_buffer_size_mb: 256,
                max_write_buffer_number: 6,
                target_file_size_mb: 256,
                clear_on_start: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &str) -> Result<Self, ConfigValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigValidationError::LoadFailed(format!("Failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigValidationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.rules.minimum_bet == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "minimum_bet must be > 0".to_string(),
            ));
        }

        if self.rules.starting_balance < self.rules.minimum_bet {
            return Err(ConfigValidationError::LogicalInconsistency(
                "starting_balance cannot cover the minimum bet".to_string(),
            ));
        }

        if self.guard.inactivity_window_seconds == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "inactivity_window_seconds must be > 0".to_string(),
            ));
        }

        if self.guard.conflict_retry_limit == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "conflict_retry_limit must be > 0".to_string(),
            ));
        }

        if self.storage.data_directory.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        if self.cache.capacity == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "cache.capacity must be > 0".to_string(),
            ));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "cache.ttl_seconds must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Convert to duration types for internal use
    pub fn inactivity_window(&self) -> Duration {
        Duration::from_secs(self.guard.inactivity_window_seconds)
    }

    pub fn conflict_retry_delay(&self) -> Duration {
        Duration::from_millis(self.guard.conflict_retry_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval_seconds)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidValue(String),
    LogicalInconsistency(String),
    MissingRequired(String),
    LoadFailed(String),
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValidationError::InvalidValue(msg) => {
                write!(f, "Invalid configuration value: {}", msg)
            }
            ConfigValidationError::LogicalInconsistency(msg) => {
                write!(f, "Configuration logical inconsistency: {}", msg)
            }
            ConfigValidationError::MissingRequired(msg) => {
                write!(f, "Missing required configuration: {}", msg)
            }
            ConfigValidationError::LoadFailed(msg) => {
                write!(f, "Failed to load configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}
