use chrono::{DateTime, Duration, FixedOffset};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;
use crate::quantity::{Quantity, Unit};

/// Unit preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// Unit used when grouping and reporting distances
    pub fn distance_unit(&self) -> Unit {
        match self {
            Units::Metric => Unit::Kilometers,
            Units::Imperial => Unit::Miles,
        }
    }

    pub fn pace_unit(&self) -> Unit {
        match self {
            Units::Metric => Unit::MinutesPerKilometer,
            Units::Imperial => Unit::MinutesPerMile,
        }
    }

    pub fn elevation_unit(&self) -> Unit {
        match self {
            Units::Metric => Unit::Meters,
            Units::Imperial => Unit::Feet,
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metric" | "km" => Ok(Units::Metric),
            "imperial" | "mi" | "miles" => Ok(Units::Imperial),
            _ => Err(format!("Invalid units: {}", s)),
        }
    }
}

/// Where a workout took place. Indoor and outdoor sessions are never grouped together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Indoor,
    Outdoor,
}

impl Environment {
    pub fn from_indoor_flag(indoor: bool) -> Self {
        if indoor {
            Environment::Indoor
        } else {
            Environment::Outdoor
        }
    }

    pub fn is_indoor(&self) -> bool {
        matches!(self, Environment::Indoor)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Indoor => f.write_str("indoor"),
            Environment::Outdoor => f.write_str("outdoor"),
        }
    }
}

/// Dimension used to group workouts into similarity buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Distance,
    Pace,
    Duration,
    Elevation,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Distance,
        Dimension::Pace,
        Dimension::Duration,
        Dimension::Elevation,
    ];

    /// Unit the grouping value is expressed in
    pub fn value_unit(&self, units: Units) -> Unit {
        match self {
            Dimension::Distance => units.distance_unit(),
            Dimension::Pace => units.pace_unit(),
            Dimension::Duration => Unit::Seconds,
            Dimension::Elevation => units.elevation_unit(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Distance => "distance",
            Dimension::Pace => "pace",
            Dimension::Duration => "duration",
            Dimension::Elevation => "elevation",
        };
        f.write_str(name)
    }
}

impl FromStr for Dimension {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "distance" => Ok(Dimension::Distance),
            "pace" => Ok(Dimension::Pace),
            "duration" | "time" => Ok(Dimension::Duration),
            "elevation" | "elevation_gain" | "climb" => Ok(Dimension::Elevation),
            _ => Err(AnalysisError::UnknownDimension {
                name: s.to_string(),
            }),
        }
    }
}

/// All-time bests a workout holds within the fetched record set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Achievements {
    pub all_time_fastest: bool,
    pub all_time_longest: bool,
    pub all_time_furthest: bool,
    pub highest_elevation: bool,
    pub personal_best_pace: bool,
}

impl Achievements {
    pub fn any(&self) -> bool {
        self.all_time_fastest
            || self.all_time_longest
            || self.all_time_furthest
            || self.highest_elevation
            || self.personal_best_pace
    }

    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.all_time_fastest {
            labels.push("Fastest");
        }
        if self.all_time_longest {
            labels.push("Longest");
        }
        if self.all_time_furthest {
            labels.push("Furthest");
        }
        if self.highest_elevation {
            labels.push("Highest Elevation");
        }
        if self.personal_best_pace {
            labels.push("Personal Best Pace");
        }
        labels
    }
}

/// Snapshot of one completed workout.
///
/// Distances and elevations are stored in meters, durations in seconds and pace in
/// minutes per kilometer. Callers read them in their preferred units through the
/// `*_in` accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    /// Unique identifier for the workout
    pub id: String,

    /// Start time, in the offset the workout was recorded in
    pub start: DateTime<FixedOffset>,

    pub end: DateTime<FixedOffset>,

    pub distance: Quantity,

    pub duration: Quantity,

    /// Average pace; absent when no distance was covered
    pub pace: Option<Quantity>,

    pub elevation_gain: Option<Quantity>,

    /// Relative humidity during the workout
    pub humidity: Option<Quantity>,

    pub environment: Environment,

    pub achievements: Achievements,
}

/// End of a workout, or `None` when the duration does not fit the calendar
pub fn end_time(start: DateTime<FixedOffset>, duration_seconds: Decimal) -> Option<DateTime<FixedOffset>> {
    let whole_seconds = duration_seconds.trunc().to_i64()?;
    start.checked_add_signed(Duration::try_seconds(whole_seconds)?)
}

impl WorkoutRecord {
    /// Create a record from a start time, a duration in seconds and a distance in meters
    pub fn new(
        id: impl Into<String>,
        start: DateTime<FixedOffset>,
        duration_seconds: Decimal,
        distance_meters: Decimal,
    ) -> Self {
        let duration = Quantity::seconds(duration_seconds);
        let distance = Quantity::meters(distance_meters);
        let pace = Quantity::pace_from(&duration, &distance, Unit::MinutesPerKilometer)
            .ok()
            .flatten();

        Self {
            id: id.into(),
            start,
            end: end_time(start, duration_seconds).unwrap_or(start),
            distance,
            duration,
            pace,
            elevation_gain: None,
            humidity: None,
            environment: Environment::Outdoor,
            achievements: Achievements::default(),
        }
    }

    pub fn with_elevation(mut self, meters: Decimal) -> Self {
        self.elevation_gain = Some(Quantity::meters(meters));
        self
    }

    pub fn with_humidity(mut self, percent: Decimal) -> Self {
        self.humidity = Some(Quantity::new(percent, Unit::Percent));
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn is_indoor(&self) -> bool {
        self.environment.is_indoor()
    }

    pub fn distance_in(&self, units: Units) -> Decimal {
        self.distance
            .value_in(units.distance_unit())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn duration_seconds(&self) -> Decimal {
        self.duration.value_in(Unit::Seconds).unwrap_or(Decimal::ZERO)
    }

    pub fn pace_in(&self, units: Units) -> Option<Decimal> {
        self.pace.and_then(|p| p.value_in(units.pace_unit()).ok())
    }

    pub fn elevation_in(&self, units: Units) -> Option<Decimal> {
        self.elevation_gain
            .and_then(|e| e.value_in(units.elevation_unit()).ok())
    }

    pub fn humidity_percent(&self) -> Option<Decimal> {
        self.humidity.and_then(|h| h.value_in(Unit::Percent).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 9, 23, 7, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_record_derives_pace_and_end() {
        let record = WorkoutRecord::new("run_1", start(), dec!(1500), dec!(5000));

        assert_eq!(record.pace_in(Units::Metric), Some(dec!(5)));
        assert_eq!(record.end - record.start, Duration::seconds(1500));
        assert_eq!(record.distance_in(Units::Metric), dec!(5));
        assert_eq!(record.environment, Environment::Outdoor);
    }

    #[test]
    fn test_end_time_out_of_calendar_range() {
        assert_eq!(end_time(start(), dec!(60)), Some(start() + Duration::seconds(60)));
        assert_eq!(end_time(start(), dec!(10000000000000)), None);
        assert_eq!(end_time(start(), Decimal::MAX), None);

        let record = WorkoutRecord::new("huge", start(), dec!(10000000000000), dec!(5000));
        assert_eq!(record.end, record.start);
    }

    #[test]
    fn test_record_without_distance_has_no_pace() {
        let record = WorkoutRecord::new("treadmill", start(), dec!(1800), Decimal::ZERO)
            .with_environment(Environment::Indoor);

        assert!(record.pace.is_none());
        assert!(record.is_indoor());
    }

    #[test]
    fn test_imperial_accessors() {
        let record = WorkoutRecord::new("run_2", start(), dec!(1800), dec!(1609.344))
            .with_elevation(dec!(30.48));

        assert_eq!(record.distance_in(Units::Imperial), dec!(1));
        assert_eq!(record.pace_in(Units::Imperial).unwrap().round_dp(6), dec!(30));
        assert_eq!(record.elevation_in(Units::Imperial), Some(dec!(100)));
    }

    #[test]
    fn test_dimension_parsing() {
        assert_eq!("pace".parse::<Dimension>().unwrap(), Dimension::Pace);
        assert_eq!("Elevation".parse::<Dimension>().unwrap(), Dimension::Elevation);
        assert!("cadence".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_dimension_serialization() {
        let json = serde_json::to_string(&Dimension::Duration).unwrap();
        assert_eq!(json, "\"duration\"");
    }

    #[test]
    fn test_achievement_labels() {
        let achievements = Achievements {
            all_time_fastest: true,
            personal_best_pace: true,
            ..Achievements::default()
        };

        assert!(achievements.any());
        assert_eq!(achievements.labels(), vec!["Fastest", "Personal Best Pace"]);
        assert!(!Achievements::default().any());
    }

    #[test]
    fn test_units_default() {
        assert_eq!(Units::default(), Units::Metric);
        assert_eq!("imperial".parse::<Units>().unwrap(), Units::Imperial);
    }
}
