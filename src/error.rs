//! Unified error hierarchy for TrendRS
//!
//! The grouping, statistics and prediction engines recover from malformed input
//! locally and only log; these types cover the surfaces that can genuinely fail:
//! unit arithmetic, record ingestion, configuration and caller misuse.

use std::path::PathBuf;
use thiserror::Error;

pub use crate::quantity::QuantityError;

/// Top-level error type for all TrendRS operations
#[derive(Debug, Error)]
pub enum TrendRsError {
    /// Unit arithmetic errors
    #[error("Quantity error: {0}")]
    Quantity(#[from] QuantityError),

    /// Workout source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Analysis errors
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors raised while reading and normalizing raw workout records
#[derive(Debug, Error)]
pub enum SourceError {
    /// File not found at specified path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Unsupported input format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Format-specific parsing error
    #[error("Parse error in {format}: {reason}")]
    Parse { format: String, reason: String },

    /// A single record could not be normalized
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },
}

/// Errors raised by analysis callers
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Unknown grouping dimension name
    #[error("Unknown dimension: {name}")]
    UnknownDimension { name: String },

    /// Invalid parameter
    #[error("Invalid parameter {parameter}={value}")]
    InvalidParameter { parameter: String, value: String },
}

/// Result type alias for TrendRS operations
pub type Result<T> = std::result::Result<T, TrendRsError>;

impl TrendRsError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TrendRsError::Source(err) => err.severity(),
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            TrendRsError::Source(err) => err.user_message(),
            TrendRsError::Analysis(err) => err.user_message(),
            _ => self.to_string(),
        }
    }
}

impl SourceError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SourceError::InvalidRecord { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            SourceError::FileNotFound { path } => {
                format!("Could not find workout file: {}", path.display())
            }
            SourceError::UnsupportedFormat { format } => {
                format!(
                    "Workout files in '{}' format are not supported. Use JSON or CSV.",
                    format
                )
            }
            _ => self.to_string(),
        }
    }
}

impl AnalysisError {
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::UnknownDimension { name } => {
                format!(
                    "'{}' is not a grouping dimension. Choose distance, pace, duration or elevation.",
                    name
                )
            }
            AnalysisError::InvalidParameter { parameter, value } => {
                format!("{} cannot be {}.", parameter.replace('_', " "), value)
            }
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents operation
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

/// Severity and user-facing message for the first TrendRS error in a failure chain.
///
/// Outer context is kept as a prefix so the user still sees which file or step failed.
pub fn describe_failure(err: &anyhow::Error) -> (ErrorSeverity, String) {
    for (depth, cause) in err.chain().enumerate() {
        let described = if let Some(e) = cause.downcast_ref::<TrendRsError>() {
            Some((e.severity(), e.user_message()))
        } else if let Some(e) = cause.downcast_ref::<SourceError>() {
            Some((e.severity(), e.user_message()))
        } else if let Some(e) = cause.downcast_ref::<AnalysisError>() {
            Some((ErrorSeverity::Error, e.user_message()))
        } else if let Some(e) = cause.downcast_ref::<QuantityError>() {
            Some((ErrorSeverity::Error, e.to_string()))
        } else {
            None
        };

        if let Some((severity, message)) = described {
            if depth == 0 {
                return (severity, message);
            }
            return (severity, format!("{}: {}", err, message));
        }
    }
    (ErrorSeverity::Error, format!("{:#}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::Unit;
    use anyhow::Context;

    #[test]
    fn test_error_severity() {
        let err = TrendRsError::Source(SourceError::InvalidRecord {
            id: "run_1".to_string(),
            reason: "end before start".to_string(),
        });
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = TrendRsError::Configuration("settings.weeks_ahead".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_quantity_error_conversion() {
        let err: TrendRsError = QuantityError::IncompatibleUnits {
            from: Unit::Seconds,
            to: Unit::Meters,
        }
        .into();
        assert!(err.to_string().contains("Incompatible units"));
    }

    #[test]
    fn test_user_messages() {
        let err = TrendRsError::Source(SourceError::FileNotFound {
            path: PathBuf::from("workouts.json"),
        });
        assert!(err.user_message().contains("Could not find"));

        let err = TrendRsError::Analysis(AnalysisError::UnknownDimension {
            name: "cadence".to_string(),
        });
        assert!(err.user_message().contains("cadence"));

        let err = AnalysisError::InvalidParameter {
            parameter: "weeks_ahead".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(err.user_message(), "weeks ahead cannot be 0.");
    }

    #[test]
    fn test_describe_failure_finds_wrapped_errors() {
        let err = anyhow::Error::new(SourceError::UnsupportedFormat {
            format: "gpx".to_string(),
        });
        let (severity, message) = describe_failure(&err);
        assert_eq!(severity, ErrorSeverity::Error);
        assert!(message.starts_with("Workout files in 'gpx' format"));

        let wrapped: anyhow::Result<()> = Err(SourceError::FileNotFound {
            path: PathBuf::from("missing.csv"),
        })
        .context("Failed to load workouts");
        let (_, message) = describe_failure(&wrapped.unwrap_err());
        assert_eq!(
            message,
            "Failed to load workouts: Could not find workout file: missing.csv"
        );

        let plain = anyhow::anyhow!("disk full");
        assert_eq!(describe_failure(&plain), (ErrorSeverity::Error, "disk full".to_string()));
    }
}
