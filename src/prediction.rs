//! Trend fitting and pace prediction for workout groups
//!
//! A group's pace history is fitted with an ordinary least-squares line over days
//! since its first workout. The weekly improvement rate is dampened by how close the
//! athlete already is to elite pace, scaled by a confidence score, and capped so a
//! prediction never promises more than a fixed share of improvement.

use chrono::{DateTime, Duration, FixedOffset};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::grouping::Group;
use crate::models::{Units, WorkoutRecord};
use crate::quantity::{Quantity, Unit};

/// Longest prediction horizon accepted from callers, in weeks
pub const MAX_WEEKS_AHEAD: u32 = 520;

/// Check a prediction horizon before running an analysis
pub fn validate_weeks_ahead(weeks_ahead: u32) -> Result<u32, AnalysisError> {
    if weeks_ahead == 0 || weeks_ahead > MAX_WEEKS_AHEAD {
        return Err(AnalysisError::InvalidParameter {
            parameter: "weeks_ahead".to_string(),
            value: weeks_ahead.to_string(),
        });
    }
    Ok(weeks_ahead)
}

/// How much to trust a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 40.0 {
            ConfidenceLevel::Low
        } else if score < 70.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::Low => f.write_str("low"),
            ConfidenceLevel::Medium => f.write_str("medium"),
            ConfidenceLevel::High => f.write_str("high"),
        }
    }
}

/// Direction of the most recent workouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Momentum {
    Improving,
    Plateauing,
    Declining,
}

impl fmt::Display for Momentum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Momentum::Improving => f.write_str("improving"),
            Momentum::Plateauing => f.write_str("plateauing"),
            Momentum::Declining => f.write_str("declining"),
        }
    }
}

/// Least-squares fit of pace against days elapsed
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Regression {
    /// Pace change per day; negative means getting faster
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Shape of a group's pace history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub regression: Regression,
    /// Weekly pace change as a percentage of the first pace
    pub improvement_rate: f64,
    /// Goodness of fit, 0-1
    pub consistency: f64,
    pub momentum: Momentum,
    /// Pace standard deviation as a percentage of mean pace
    pub volatility: f64,
    pub data_points: usize,
    pub time_span_days: f64,
}

impl TrendAnalysis {
    /// Trend reported when the history cannot support a fit
    pub fn neutral(data_points: usize) -> Self {
        Self {
            regression: Regression::default(),
            improvement_rate: 0.0,
            consistency: 0.0,
            momentum: Momentum::Plateauing,
            volatility: 0.0,
            data_points,
            time_span_days: 0.0,
        }
    }
}

/// World-class pace at a standard race distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliteBenchmark {
    pub name: String,
    pub distance_meters: Decimal,
    /// Minutes per kilometer
    pub pace: Decimal,
}

impl EliteBenchmark {
    pub fn new(name: &str, distance_meters: Decimal, pace: Decimal) -> Self {
        Self {
            name: name.to_string(),
            distance_meters,
            pace,
        }
    }
}

/// Point weights of the additive confidence model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub points_per_record: f64,
    pub max_volume_points: f64,
    pub consistency_points: f64,
    /// One point per week spanned, up to this cap
    pub max_span_points: f64,
    pub improving_points: f64,
    pub plateauing_points: f64,
    pub max_volatility_penalty: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            points_per_record: 3.0,
            max_volume_points: 30.0,
            consistency_points: 25.0,
            max_span_points: 20.0,
            improving_points: 15.0,
            plateauing_points: 8.0,
            max_volatility_penalty: 10.0,
        }
    }
}

/// Prediction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Largest share of the current best pace a prediction may remove (0.15 = 15%)
    pub max_improvement: Decimal,

    /// Share of the most recent records used for momentum
    pub momentum_window: f64,

    /// Endpoint slope, in pace units per day, separating plateau from trend
    pub momentum_threshold: f64,

    pub confidence: ConfidenceWeights,

    pub elite_benchmarks: Vec<EliteBenchmark>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_improvement: dec!(0.15),
            momentum_window: 0.3,
            momentum_threshold: 0.01,
            confidence: ConfidenceWeights::default(),
            elite_benchmarks: vec![
                EliteBenchmark::new("1 Mile", dec!(1609.344), dec!(2.31)),
                EliteBenchmark::new("5K", dec!(5000), dec!(2.52)),
                EliteBenchmark::new("5 Mile", dec!(8046.72), dec!(2.60)),
                EliteBenchmark::new("10K", dec!(10000), dec!(2.62)),
                EliteBenchmark::new("Half Marathon", dec!(21097.5), dec!(2.73)),
                EliteBenchmark::new("Marathon", dec!(42195), dec!(2.86)),
            ],
        }
    }
}

/// What a prediction was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionBasis {
    pub data_points: usize,
    pub time_span_days: f64,
    /// R² of the pace trend
    pub trend_strength: f64,
    /// 0-100
    pub consistency_score: f64,
}

/// Projected performance for a group some weeks ahead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub target_date: DateTime<FixedOffset>,
    pub predicted_pace: Quantity,
    pub predicted_duration: Quantity,
    pub predicted_distance: Quantity,
    pub current_best_pace: Quantity,
    /// 0-100
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    /// Applied improvement over the current best pace, in percent
    pub improvement_percentage: Decimal,
    pub momentum: Momentum,
    pub realism_factor: f64,
    pub benchmark: String,
    pub basis: PredictionBasis,
}

/// Fits trends and projects pace for workout groups
#[derive(Debug, Clone, Default)]
pub struct PredictionEngine {
    config: PredictionConfig,
}

impl PredictionEngine {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Analyze the pace history of `records` (any order).
    ///
    /// Records without a pace are ignored. Fewer than two paced records give a
    /// neutral trend.
    pub fn analyze_trend(&self, records: &[WorkoutRecord], units: Units) -> TrendAnalysis {
        let mut ordered: Vec<&WorkoutRecord> = records.iter().collect();
        ordered.sort_by_key(|record| record.start);

        let Some(first_start) = ordered.first().map(|record| record.start) else {
            return TrendAnalysis::neutral(0);
        };

        let points: Vec<(f64, f64)> = ordered
            .iter()
            .filter_map(|record| {
                let pace = record.pace_in(units)?.to_f64()?;
                Some((days_between(first_start, record.start), pace))
            })
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();

        if points.len() < 2 {
            debug!(points = points.len(), "Not enough paced records for a trend");
            return TrendAnalysis::neutral(points.len());
        }

        let regression = linear_regression(&points);
        let first_pace = points[0].1;
        let improvement_rate = if first_pace > 0.0 {
            finite_or_zero((regression.slope * 7.0).abs() / first_pace * 100.0)
        } else {
            0.0
        };

        let paces: Vec<f64> = points.iter().map(|(_, pace)| *pace).collect();
        let mean_pace = paces.iter().mean();
        let volatility = if mean_pace > 0.0 {
            finite_or_zero(paces.iter().population_std_dev() / mean_pace * 100.0)
        } else {
            0.0
        };

        let time_span_days = points.last().map_or(0.0, |(x, _)| *x);

        TrendAnalysis {
            regression,
            improvement_rate,
            consistency: regression.r_squared.clamp(0.0, 1.0),
            momentum: self.momentum(&points),
            volatility,
            data_points: points.len(),
            time_span_days,
        }
    }

    /// Classify the endpoint slope of the most recent share of points
    fn momentum(&self, points: &[(f64, f64)]) -> Momentum {
        let n = points.len();
        if n < 2 {
            return Momentum::Plateauing;
        }

        let window = ((n as f64 * self.config.momentum_window).ceil() as usize).clamp(2, n);
        let recent = &points[n - window..];
        let (first_day, first_pace) = recent[0];
        let (last_day, last_pace) = recent[recent.len() - 1];

        let elapsed = last_day - first_day;
        let slope = if elapsed > f64::EPSILON {
            finite_or_zero((last_pace - first_pace) / elapsed)
        } else {
            0.0
        };

        if slope < -self.config.momentum_threshold {
            Momentum::Improving
        } else if slope > self.config.momentum_threshold {
            Momentum::Declining
        } else {
            Momentum::Plateauing
        }
    }

    /// Benchmark whose distance is nearest to `distance_meters`
    pub fn nearest_benchmark(&self, distance_meters: Decimal) -> Option<&EliteBenchmark> {
        self.config
            .elite_benchmarks
            .iter()
            .min_by_key(|benchmark| (benchmark.distance_meters - distance_meters).abs())
    }

    /// Additive 0-100 confidence score for a trend
    pub fn confidence_score(&self, trend: &TrendAnalysis) -> f64 {
        let weights = &self.config.confidence;

        let volume = (weights.points_per_record * trend.data_points as f64)
            .min(weights.max_volume_points);
        let consistency = trend.consistency.clamp(0.0, 1.0) * weights.consistency_points;
        let span = (trend.time_span_days / 7.0).min(weights.max_span_points).max(0.0);
        let momentum = match trend.momentum {
            Momentum::Improving => weights.improving_points,
            Momentum::Plateauing => weights.plateauing_points,
            Momentum::Declining => 0.0,
        };
        let penalty = (trend.volatility / 2.0).min(weights.max_volatility_penalty).max(0.0);

        finite_or_zero(volume + consistency + span + momentum - penalty).clamp(0.0, 100.0)
    }

    /// Project the group's best pace `weeks_ahead` weeks forward.
    ///
    /// Returns `None` for groups with fewer than two members or no paced member.
    pub fn predict(&self, group: &Group, weeks_ahead: u32, units: Units) -> Option<Prediction> {
        if group.member_count() < 2 {
            warn!(
                group = %group.key,
                members = group.member_count(),
                "Prediction needs at least two workouts, skipping"
            );
            return None;
        }

        let Some(best) = group
            .runs
            .iter()
            .filter_map(|record| record.pace)
            .min_by_key(|pace| pace.value)
        else {
            warn!(group = %group.key, "No workout in group has a pace, skipping prediction");
            return None;
        };

        let trend = self.analyze_trend(&group.runs, units);
        let confidence_score = self.confidence_score(&trend);

        let representative = mean_distance(&group.runs);
        let benchmark = self.nearest_benchmark(representative.value);
        let realism = benchmark.map_or(1.0, |benchmark| {
            realism_factor((best.value - benchmark.pace).to_f64().unwrap_or(f64::MAX))
        });

        let pace_unit = units.pace_unit();
        let best_pace = best.value_in(pace_unit).ok()?;

        let total_improvement = finite_or_zero(
            trend.improvement_rate * realism * f64::from(weeks_ahead) * (confidence_score / 100.0),
        );
        let total_improvement = Decimal::from_f64(total_improvement).unwrap_or(Decimal::ZERO);

        let floor = best_pace * (Decimal::ONE - self.config.max_improvement);
        let projected = (best_pace * (Decimal::ONE - total_improvement / dec!(100))).round_dp(4);
        let predicted_pace = projected.max(floor).min(best_pace);

        let improvement_percentage = if best_pace.is_zero() {
            Decimal::ZERO
        } else {
            (best_pace - predicted_pace) / best_pace * dec!(100)
        };

        let distance_value = representative.value_in(units.distance_unit()).ok()?;
        let predicted_duration = predicted_pace
            .checked_mul(distance_value)?
            .checked_mul(dec!(60))?;

        let latest_start = group.runs.iter().map(|record| record.start).max()?;
        let Some(target_date) = Duration::try_weeks(i64::from(weeks_ahead))
            .and_then(|horizon| latest_start.checked_add_signed(horizon))
        else {
            warn!(
                group = %group.key,
                weeks_ahead,
                "Prediction horizon is beyond the calendar, skipping"
            );
            return None;
        };

        debug!(
            group = %group.key,
            rate = trend.improvement_rate,
            realism,
            confidence = confidence_score,
            "Prediction computed"
        );

        Some(Prediction {
            target_date,
            predicted_pace: Quantity::new(predicted_pace, pace_unit),
            predicted_duration: Quantity::seconds(predicted_duration.round_dp(2)),
            predicted_distance: Quantity::new(distance_value, units.distance_unit()),
            current_best_pace: Quantity::new(best_pace, pace_unit),
            confidence_score,
            confidence_level: ConfidenceLevel::from_score(confidence_score),
            improvement_percentage,
            momentum: trend.momentum,
            realism_factor: realism,
            benchmark: benchmark.map(|b| b.name.clone()).unwrap_or_default(),
            basis: PredictionBasis {
                data_points: trend.data_points,
                time_span_days: trend.time_span_days,
                trend_strength: trend.regression.r_squared,
                consistency_score: trend.consistency * 100.0,
            },
        })
    }
}

/// Ordinary least squares over `(x, y)` points.
///
/// Zero variance in x (or in y) yields a flat line with R² of zero.
pub fn linear_regression(points: &[(f64, f64)]) -> Regression {
    if points.len() < 2 {
        return Regression {
            slope: 0.0,
            intercept: points.first().map_or(0.0, |(_, y)| *y),
            r_squared: 0.0,
        };
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });

    if sxx.abs() < 1e-12 || !sxx.is_finite() {
        return Regression {
            slope: 0.0,
            intercept: finite_or_zero(mean_y),
            r_squared: 0.0,
        };
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let (ss_tot, ss_res) = points.iter().fold((0.0, 0.0), |(tot, res), (x, y)| {
        let fitted = intercept + slope * x;
        (tot + (y - mean_y).powi(2), res + (y - fitted).powi(2))
    });
    let r_squared = if ss_tot.abs() < 1e-12 {
        0.0
    } else {
        finite_or_zero(1.0 - ss_res / ss_tot)
    };

    Regression {
        slope: finite_or_zero(slope),
        intercept: finite_or_zero(intercept),
        r_squared,
    }
}

/// Dampening applied to projected improvement given the gap, in minutes per
/// kilometer, between the current best pace and elite pace.
pub fn realism_factor(gap: f64) -> f64 {
    if gap < 1.0 {
        0.2
    } else if gap < 2.0 {
        0.5
    } else if gap < 3.0 {
        0.8
    } else {
        1.0
    }
}

fn days_between(from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}

fn mean_distance(records: &[WorkoutRecord]) -> Quantity {
    if records.is_empty() {
        return Quantity::zero(Unit::Meters);
    }
    let total = Quantity::sum(records.iter().map(|record| &record.distance), Unit::Meters)
        .unwrap_or_else(|_| Quantity::zero(Unit::Meters));
    total
        .divided_by(records.len())
        .unwrap_or_else(|_| Quantity::zero(Unit::Meters))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
