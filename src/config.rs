use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TrendRsError;
use crate::grouping::{GroupingOptions, MIN_BUCKET_SIZE};
use crate::logging::LogConfig;
use crate::models::{Dimension, Units};
use crate::prediction::{PredictionConfig, MAX_WEEKS_AHEAD};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Per-dimension grouping overrides
    pub grouping: GroupingSettings,

    /// Trend and prediction parameters
    pub prediction: PredictionConfig,

    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Units used for grouping and reports
    pub units: Units,

    /// Dimension used when a command does not name one
    pub default_dimension: Dimension,

    /// Prediction horizon in weeks
    pub weeks_ahead: u32,
}

/// Grouping overrides for one dimension; unset values use the dimension defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionGrouping {
    pub tolerance: Option<Decimal>,
    pub bucket_size: Option<Decimal>,
    /// Tolerance grouping; false selects fixed unit buckets
    pub enabled: bool,
}

impl Default for DimensionGrouping {
    fn default() -> Self {
        Self {
            tolerance: None,
            bucket_size: None,
            enabled: true,
        }
    }
}

impl From<DimensionGrouping> for GroupingOptions {
    fn from(settings: DimensionGrouping) -> Self {
        GroupingOptions {
            tolerance: settings.tolerance,
            bucket_size: settings.bucket_size,
            enabled: settings.enabled,
        }
    }
}

/// Grouping settings for every dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupingSettings {
    pub distance: DimensionGrouping,
    pub pace: DimensionGrouping,
    pub duration: DimensionGrouping,
    pub elevation: DimensionGrouping,
}

impl GroupingSettings {
    pub fn for_dimension(&self, dimension: Dimension) -> &DimensionGrouping {
        match dimension {
            Dimension::Distance => &self.distance,
            Dimension::Pace => &self.pace,
            Dimension::Duration => &self.duration,
            Dimension::Elevation => &self.elevation,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();
        AppConfig {
            metadata: ConfigMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            grouping: GroupingSettings::default(),
            prediction: PredictionConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            units: Units::Metric,
            default_dimension: Dimension::Distance,
            weeks_ahead: 4,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = self.to_toml()?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trendrs")
            .join("config.toml")
    }

    /// Load the default configuration file, falling back to defaults when it is
    /// missing or unreadable
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();
        if !config_path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Ignoring invalid config file {}: {:#}",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Load an explicit config file, or the default location when none is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::load_or_default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to serialize configuration to TOML")
    }

    /// Grouping options for a dimension
    pub fn grouping_options(&self, dimension: Dimension) -> GroupingOptions {
        (*self.grouping.for_dimension(dimension)).into()
    }

    /// Look up a value by dotted key, e.g. `settings.weeks_ahead`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let root = toml::Value::try_from(self).ok()?;
        let value = key
            .split('.')
            .try_fold(&root, |value, part| value.get(part))?;

        Some(match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Reject settings the engines cannot work with
    pub fn validate(&self) -> Result<(), TrendRsError> {
        let weeks_ahead = self.settings.weeks_ahead;
        if weeks_ahead == 0 || weeks_ahead > MAX_WEEKS_AHEAD {
            return Err(TrendRsError::Configuration(format!(
                "settings.weeks_ahead must be between 1 and {}, got {}",
                MAX_WEEKS_AHEAD, weeks_ahead
            )));
        }

        let cap = self.prediction.max_improvement;
        if cap <= Decimal::ZERO || cap >= Decimal::ONE {
            return Err(TrendRsError::Configuration(format!(
                "prediction.max_improvement must be between 0 and 1, got {}",
                cap
            )));
        }

        if self.prediction.elite_benchmarks.is_empty() {
            return Err(TrendRsError::Configuration(
                "prediction.elite_benchmarks must not be empty".to_string(),
            ));
        }

        for dimension in Dimension::ALL {
            let grouping = self.grouping.for_dimension(dimension);
            if grouping.bucket_size.map_or(false, |size| size < MIN_BUCKET_SIZE) {
                return Err(TrendRsError::Configuration(format!(
                    "grouping.{}.bucket_size must be at least {}",
                    dimension, MIN_BUCKET_SIZE
                )));
            }
            if grouping.tolerance.map_or(false, |tol| tol < Decimal::ZERO) {
                return Err(TrendRsError::Configuration(format!(
                    "grouping.{}.tolerance must not be negative",
                    dimension
                )));
            }
        }

        Ok(())
    }
}
