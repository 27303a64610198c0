// Library interface for TrendRS modules
// Integration tests and benches use the engines through this crate root

pub mod achievements;
pub mod analysis;
pub mod config;
pub mod error;
pub mod grouping;
pub mod logging;
pub mod models;
pub mod prediction;
pub mod quantity;
pub mod report;
pub mod source;
pub mod stats;
pub mod weekly;

// Re-export commonly used types for convenience
pub use models::*;
pub use quantity::{Quantity, Unit};
pub use grouping::{Group, GroupKey, GroupingEngine, GroupingOptions, GroupingOutcome};
pub use stats::{compute_stats, ConsistencyMetrics, Metric};
pub use prediction::{ConfidenceLevel, Momentum, Prediction, PredictionConfig, PredictionEngine};
pub use weekly::{WeeklyAggregator, WeeklyTrendStats};
pub use analysis::{AnalysisCache, AnalysisRequest, GroupAnalysis, RecordSetVersion, WorkoutAnalyzer};
pub use source::{source_for_path, RawWorkout, WorkoutSource};
pub use config::AppConfig;
pub use error::{TrendRsError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat};
