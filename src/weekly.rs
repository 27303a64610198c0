//! Day-of-week aggregation
//!
//! Buckets workouts into the seven weekdays of their local start time and picks the
//! best day for pace, duration, elevation and distance by per-day averages.

use chrono::Datelike;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Units, WorkoutRecord};

pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Running sum and number of valid samples for one metric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricAccumulator {
    pub sum: Decimal,
    pub count: usize,
}

impl MetricAccumulator {
    fn add(&mut self, value: Decimal) {
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> Option<Decimal> {
        (self.count > 0).then(|| self.sum / Decimal::from(self.count))
    }
}

/// Aggregates for one weekday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    /// 0 = Sunday
    pub day_index: usize,
    pub day_name: String,
    pub count: usize,
    pub pace: MetricAccumulator,
    /// Seconds
    pub duration: MetricAccumulator,
    pub elevation: MetricAccumulator,
    pub distance: MetricAccumulator,
}

impl DayStats {
    fn new(day_index: usize) -> Self {
        Self {
            day_index,
            day_name: DAY_NAMES[day_index].to_string(),
            count: 0,
            pace: MetricAccumulator::default(),
            duration: MetricAccumulator::default(),
            elevation: MetricAccumulator::default(),
            distance: MetricAccumulator::default(),
        }
    }

    pub fn average_pace(&self) -> Option<Decimal> {
        self.pace.average()
    }

    pub fn average_duration(&self) -> Option<Decimal> {
        self.duration.average()
    }

    pub fn average_elevation(&self) -> Option<Decimal> {
        self.elevation.average()
    }

    pub fn average_distance(&self) -> Option<Decimal> {
        self.distance.average()
    }
}

/// The winning weekday for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestDay {
    pub day: String,
    /// 0 = Sunday, -1 when no day had data
    pub day_index: i32,
    /// Valid samples behind the average
    pub count: usize,
    pub average: Decimal,
}

impl BestDay {
    pub fn no_data() -> Self {
        Self {
            day: "No data".to_string(),
            day_index: -1,
            count: 0,
            average: Decimal::ZERO,
        }
    }

    pub fn has_data(&self) -> bool {
        self.day_index >= 0
    }
}

/// Share of workouts falling on one weekday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayShare {
    pub day_index: usize,
    pub day: String,
    pub count: usize,
    pub percentage: f64,
}

/// Weekday aggregates plus the best day for each metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrendStats {
    pub units: Units,
    pub total_records: usize,
    /// Always seven entries, Sunday first
    pub days: Vec<DayStats>,
    pub fastest_pace: BestDay,
    pub longest_duration: BestDay,
    pub shortest_duration: BestDay,
    pub highest_elevation: BestDay,
    pub furthest_distance: BestDay,
    /// Always seven entries, Sunday first
    pub distribution: Vec<DayShare>,
}

impl WeeklyTrendStats {
    /// Day with the most workouts; the earlier day wins ties
    pub fn busiest_day(&self) -> Option<&DayShare> {
        self.distribution
            .iter()
            .filter(|share| share.count > 0)
            .fold(None, |best: Option<&DayShare>, share| match best {
                Some(current) if current.count >= share.count => Some(current),
                _ => Some(share),
            })
    }
}

/// Groups a workout history by day of week
#[derive(Debug, Clone, Copy, Default)]
pub struct WeeklyAggregator {
    units: Units,
}

impl WeeklyAggregator {
    pub fn new(units: Units) -> Self {
        Self { units }
    }

    pub fn aggregate_by_weekday(&self, records: &[WorkoutRecord]) -> WeeklyTrendStats {
        let mut days: Vec<DayStats> = (0..7).map(DayStats::new).collect();

        for record in records {
            let index = record.start.weekday().num_days_from_sunday() as usize;
            let day = &mut days[index];
            day.count += 1;

            if let Some(pace) = record.pace_in(self.units) {
                day.pace.add(pace);
            }
            let seconds = record.duration_seconds();
            if seconds > Decimal::ZERO {
                day.duration.add(seconds);
            }
            let distance = record.distance_in(self.units);
            if distance > Decimal::ZERO {
                day.distance.add(distance);
            }
            if let Some(elevation) = record.elevation_in(self.units) {
                day.elevation.add(elevation);
            }
        }

        let total = records.len();
        let distribution = days
            .iter()
            .map(|day| DayShare {
                day_index: day.day_index,
                day: day.day_name.clone(),
                count: day.count,
                percentage: if total == 0 {
                    0.0
                } else {
                    day.count as f64 / total as f64 * 100.0
                },
            })
            .collect();

        let stats = WeeklyTrendStats {
            units: self.units,
            total_records: total,
            fastest_pace: best_day(&days, |d| &d.pace, Extreme::Lowest),
            longest_duration: best_day(&days, |d| &d.duration, Extreme::Highest),
            shortest_duration: best_day(&days, |d| &d.duration, Extreme::Lowest),
            highest_elevation: best_day(&days, |d| &d.elevation, Extreme::Highest),
            furthest_distance: best_day(&days, |d| &d.distance, Extreme::Highest),
            days,
            distribution,
        };

        debug!(
            records = total,
            fastest = %stats.fastest_pace.day,
            furthest = %stats.furthest_distance.day,
            "Weekly aggregation complete"
        );

        stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Lowest,
    Highest,
}

fn best_day<F>(days: &[DayStats], metric: F, extreme: Extreme) -> BestDay
where
    F: Fn(&DayStats) -> &MetricAccumulator,
{
    let mut best: Option<(&DayStats, Decimal)> = None;

    for day in days {
        let Some(average) = metric(day).average() else {
            continue;
        };
        let replaces = best.map_or(true, |(_, current)| match extreme {
            Extreme::Lowest => average < current,
            Extreme::Highest => average > current,
        });
        if replaces {
            best = Some((day, average));
        }
    }

    match best {
        Some((day, average)) => BestDay {
            day: day.day_name.clone(),
            day_index: day.day_index as i32,
            count: metric(day).count,
            average,
        },
        None => BestDay::no_data(),
    }
}
