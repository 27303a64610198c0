//! Per-group statistics
//!
//! Every dimension shares one base routine (averages, share of workouts, extremal
//! records, spread values) and overrides which metric defines the best and worst
//! performance and which metric describes the spread.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, warn};

use crate::grouping::Group;
use crate::models::{Dimension, Units, WorkoutRecord};
use crate::quantity::{Quantity, Unit};

/// A per-workout measurement used for ranking and spread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Pace,
    Distance,
    Duration,
}

impl Metric {
    pub fn value(&self, record: &WorkoutRecord, units: Units) -> Option<Decimal> {
        match self {
            Metric::Pace => record.pace_in(units),
            Metric::Distance => Some(record.distance_in(units)),
            Metric::Duration => Some(record.duration_seconds()),
        }
    }

    pub fn unit(&self, units: Units) -> Unit {
        match self {
            Metric::Pace => units.pace_unit(),
            Metric::Distance => units.distance_unit(),
            Metric::Duration => Unit::Seconds,
        }
    }

    pub fn quantity(&self, record: &WorkoutRecord, units: Units) -> Option<Quantity> {
        self.value(record, units)
            .map(|value| Quantity::new(value, self.unit(units)))
    }
}

/// Descriptive spread of one per-member value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsistencyMetrics {
    pub metric: Option<Metric>,
    pub sample_size: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    /// 0-100, higher means more uniform
    pub score: f64,
}

/// Mean, median, population standard deviation and a CV-based score.
/// Empty input yields all zeros.
pub fn consistency_metrics(values: &[f64]) -> ConsistencyMetrics {
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return ConsistencyMetrics::default();
    }

    let mean = values.iter().mean();
    let std_dev = if values.len() > 1 {
        values.iter().population_std_dev()
    } else {
        0.0
    };
    let median = median(&values);

    let coefficient_of_variation = if mean.abs() > f64::EPSILON {
        std_dev / mean.abs()
    } else {
        0.0
    };
    let score = if mean.abs() > f64::EPSILON {
        (1.0 - coefficient_of_variation).clamp(0.0, 1.0) * 100.0
    } else {
        0.0
    };

    ConsistencyMetrics {
        metric: None,
        sample_size: values.len(),
        mean,
        median,
        std_dev,
        coefficient_of_variation,
        score,
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Best and worst records by `metric`. On equal values the earlier record is kept.
pub fn select_extremes<'a>(
    records: &'a [WorkoutRecord],
    metric: Metric,
    lower_is_better: bool,
    units: Units,
) -> Option<(&'a WorkoutRecord, &'a WorkoutRecord)> {
    let mut best: Option<(&WorkoutRecord, Decimal)> = None;
    let mut worst: Option<(&WorkoutRecord, Decimal)> = None;

    for record in records {
        let Some(value) = metric.value(record, units) else {
            debug!(record = %record.id, ?metric, "Record has no value for metric, not ranked");
            continue;
        };

        let beats_best = best.map_or(true, |(_, current)| {
            if lower_is_better {
                value < current
            } else {
                value > current
            }
        });
        if beats_best {
            best = Some((record, value));
        }

        let beats_worst = worst.map_or(true, |(_, current)| {
            if lower_is_better {
                value > current
            } else {
                value < current
            }
        });
        if beats_worst {
            worst = Some((record, value));
        }
    }

    match (best, worst) {
        (Some((best, _)), Some((worst, _))) => Some((best, worst)),
        _ => None,
    }
}

/// Statistics strategy for one grouping dimension
pub trait GroupStatsStrategy {
    /// Metric that decides highlight (best) and worst
    fn ranking_metric(&self) -> Metric;

    /// Whether a lower ranking value is better (true for pace)
    fn lower_is_better(&self) -> bool;

    /// Metric plotted per member in the variation distribution
    fn variation_metric(&self) -> Metric;

    /// Metric compared between worst and highlight for total variation
    fn spread_metric(&self) -> Metric {
        self.variation_metric()
    }

    /// Metric summarized by the consistency metrics
    fn consistency_metric(&self) -> Metric {
        self.variation_metric()
    }

    /// Annotate `group` with its statistics.
    ///
    /// `all_filtered` is the full set of records that passed the dimension filter and
    /// is only used for the group's share of workouts.
    fn compute(&self, group: &mut Group, all_filtered: &[WorkoutRecord], units: Units) {
        let count = group.member_count();
        if count == 0 {
            warn!(anchor = %group.key, "Computing statistics for an empty group");
            group.average_pace = None;
            group.average_duration = None;
            group.average_humidity = None;
            group.percentage_of_total_workouts = Decimal::ZERO;
            group.highlight = None;
            group.worst = None;
            group.most_recent = None;
            group.oldest = None;
            group.greatest_elevation = None;
            group.lowest_elevation = None;
            group.variant_distribution.clear();
            group.total_variation = None;
            group.consistency = Some(ConsistencyMetrics::default());
            return;
        }

        group.average_pace = Quantity::pace_from(
            &group.total_duration,
            &group.total_distance,
            units.pace_unit(),
        )
        .unwrap_or_else(|e| {
            warn!(anchor = %group.key, error = %e, "Could not derive average pace");
            None
        });
        group.average_duration = group.total_duration.divided_by(count).ok();
        group.average_humidity = average_humidity(&group.runs);

        group.percentage_of_total_workouts = if all_filtered.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from(count) / Decimal::from(all_filtered.len()) * dec!(100)
        };

        let variation_metric = self.variation_metric();
        group.variant_distribution = group
            .runs
            .iter()
            .filter_map(|record| variation_metric.value(record, units))
            .filter_map(|value| value.to_f64())
            .collect();

        match select_extremes(&group.runs, self.ranking_metric(), self.lower_is_better(), units) {
            Some((best, worst)) => {
                let spread = self.spread_metric();
                group.total_variation = match (spread.quantity(worst, units), spread.quantity(best, units)) {
                    (Some(w), Some(b)) => w.abs_diff(&b).ok(),
                    _ => None,
                };
                group.highlight = Some(best.clone());
                group.worst = Some(worst.clone());
            }
            None => {
                debug!(anchor = %group.key, "No member has a ranking value");
                group.highlight = None;
                group.worst = None;
                group.total_variation = None;
            }
        }

        annotate_temporal_extremes(group);
        annotate_elevation_extremes(group, units);

        let consistency_metric = self.consistency_metric();
        let values: Vec<f64> = group
            .runs
            .iter()
            .filter_map(|record| consistency_metric.value(record, units))
            .filter_map(|value| value.to_f64())
            .collect();
        let mut consistency = consistency_metrics(&values);
        consistency.metric = Some(consistency_metric);
        group.consistency = Some(consistency);
    }
}

/// Distance groups: fastest pace is the highlight, spread is in duration
pub struct DistanceStats;

impl GroupStatsStrategy for DistanceStats {
    fn ranking_metric(&self) -> Metric {
        Metric::Pace
    }

    fn lower_is_better(&self) -> bool {
        true
    }

    fn variation_metric(&self) -> Metric {
        Metric::Duration
    }
}

/// Pace groups: longest distance is the highlight
pub struct PaceStats;

impl GroupStatsStrategy for PaceStats {
    fn ranking_metric(&self) -> Metric {
        Metric::Distance
    }

    fn lower_is_better(&self) -> bool {
        false
    }

    fn variation_metric(&self) -> Metric {
        Metric::Duration
    }

    fn spread_metric(&self) -> Metric {
        Metric::Distance
    }

    fn consistency_metric(&self) -> Metric {
        Metric::Distance
    }
}

/// Duration groups: the furthest distance covered in the same time is the highlight
pub struct DurationStats;

impl GroupStatsStrategy for DurationStats {
    fn ranking_metric(&self) -> Metric {
        Metric::Distance
    }

    fn lower_is_better(&self) -> bool {
        false
    }

    fn variation_metric(&self) -> Metric {
        Metric::Distance
    }
}

/// Elevation groups: fastest pace over similar climbing is the highlight
pub struct ElevationStats;

impl GroupStatsStrategy for ElevationStats {
    fn ranking_metric(&self) -> Metric {
        Metric::Pace
    }

    fn lower_is_better(&self) -> bool {
        true
    }

    fn variation_metric(&self) -> Metric {
        Metric::Duration
    }
}

pub fn strategy_for(dimension: Dimension) -> &'static dyn GroupStatsStrategy {
    match dimension {
        Dimension::Distance => &DistanceStats,
        Dimension::Pace => &PaceStats,
        Dimension::Duration => &DurationStats,
        Dimension::Elevation => &ElevationStats,
    }
}

/// Compute statistics for a group using its dimension's strategy
pub fn compute_stats(group: &mut Group, all_filtered: &[WorkoutRecord], units: Units) {
    strategy_for(group.dimension).compute(group, all_filtered, units);
}

fn average_humidity(records: &[WorkoutRecord]) -> Option<Quantity> {
    let readings: Vec<Decimal> = records.iter().filter_map(|r| r.humidity_percent()).collect();
    if readings.is_empty() {
        return None;
    }
    let total: Decimal = readings.iter().sum();
    Some(Quantity::new(total / Decimal::from(readings.len()), Unit::Percent))
}

fn annotate_temporal_extremes(group: &mut Group) {
    let mut oldest: Option<&WorkoutRecord> = None;
    let mut newest: Option<&WorkoutRecord> = None;

    for record in &group.runs {
        if oldest.map_or(true, |current| record.start < current.start) {
            oldest = Some(record);
        }
        if newest.map_or(true, |current| record.start > current.start) {
            newest = Some(record);
        }
    }

    let oldest = oldest.cloned();
    let newest = newest.cloned();
    group.oldest = oldest;
    group.most_recent = newest;
}

fn annotate_elevation_extremes(group: &mut Group, units: Units) {
    let mut greatest: Option<(&WorkoutRecord, Decimal)> = None;
    let mut lowest: Option<(&WorkoutRecord, Decimal)> = None;

    for record in &group.runs {
        let Some(elevation) = record.elevation_in(units) else {
            continue;
        };
        if greatest.map_or(true, |(_, current)| elevation > current) {
            greatest = Some((record, elevation));
        }
        if lowest.map_or(true, |(_, current)| elevation < current) {
            lowest = Some((record, elevation));
        }
    }

    let greatest = greatest.map(|(record, _)| record.clone());
    let lowest = lowest.map(|(record, _)| record.clone());
    group.greatest_elevation = greatest;
    group.lowest_elevation = lowest;
}
