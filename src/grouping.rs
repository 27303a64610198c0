//! Similarity grouping of workouts
//!
//! Buckets a workout history by distance, pace, duration or elevation. Each bucket
//! is anchored on a round multiple of the bucket size; a workout joins the bucket
//! of its nearest anchor when it lies within the tolerance of it, and is counted as
//! skipped otherwise. Indoor and outdoor sessions never share a bucket.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::models::{Dimension, Environment, Units, WorkoutRecord};
use crate::prediction::Prediction;
use crate::quantity::{Quantity, QuantityError, Unit};
use crate::stats::ConsistencyMetrics;

/// Smallest bucket size accepted as an override
pub const MIN_BUCKET_SIZE: Decimal = dec!(0.0001);

/// Reads the grouping value of a record, in the dimension's unit
pub type ValueExtractor = fn(&WorkoutRecord, Units) -> Option<Decimal>;

/// Decides whether a record takes part in grouping at all
pub type RecordFilter = fn(&WorkoutRecord, Units) -> bool;

/// How to group along one dimension
#[derive(Debug, Clone, Copy)]
pub struct DimensionConfig {
    pub dimension: Dimension,
    pub units: Units,
    pub extract: ValueExtractor,
    /// Default tolerance, in the dimension's unit
    pub default_tolerance: Decimal,
    /// Default bucket size, in the dimension's unit
    pub default_bucket_size: Decimal,
    /// Fixed bucket size used when tolerance grouping is disabled
    pub unit_bucket_size: Decimal,
    pub filter: Option<RecordFilter>,
}

fn extract_distance(record: &WorkoutRecord, units: Units) -> Option<Decimal> {
    let distance = record.distance_in(units);
    (distance > Decimal::ZERO).then_some(distance)
}

fn extract_pace(record: &WorkoutRecord, units: Units) -> Option<Decimal> {
    record.pace_in(units)
}

fn extract_duration(record: &WorkoutRecord, _units: Units) -> Option<Decimal> {
    let seconds = record.duration_seconds();
    (seconds > Decimal::ZERO).then_some(seconds)
}

fn extract_elevation(record: &WorkoutRecord, units: Units) -> Option<Decimal> {
    record.elevation_in(units)
}

fn has_elevation(record: &WorkoutRecord, units: Units) -> bool {
    record
        .elevation_in(units)
        .map_or(false, |elevation| elevation > Decimal::ZERO)
}

impl DimensionConfig {
    pub fn for_dimension(dimension: Dimension, units: Units) -> Self {
        match dimension {
            Dimension::Distance => Self::distance(units),
            Dimension::Pace => Self::pace(units),
            Dimension::Duration => Self::duration(units),
            Dimension::Elevation => Self::elevation(units),
        }
    }

    pub fn distance(units: Units) -> Self {
        Self {
            dimension: Dimension::Distance,
            units,
            extract: extract_distance,
            default_tolerance: dec!(0.25),
            default_bucket_size: dec!(1),
            unit_bucket_size: dec!(1),
            filter: None,
        }
    }

    pub fn pace(units: Units) -> Self {
        Self {
            dimension: Dimension::Pace,
            units,
            extract: extract_pace,
            default_tolerance: dec!(0.15),
            default_bucket_size: dec!(0.5),
            unit_bucket_size: dec!(0.5),
            filter: None,
        }
    }

    pub fn duration(units: Units) -> Self {
        Self {
            dimension: Dimension::Duration,
            units,
            extract: extract_duration,
            default_tolerance: dec!(120),
            default_bucket_size: dec!(600),
            unit_bucket_size: dec!(600),
            filter: None,
        }
    }

    /// Elevation grouping ignores workouts without any recorded climb
    pub fn elevation(units: Units) -> Self {
        Self {
            dimension: Dimension::Elevation,
            units,
            extract: extract_elevation,
            default_tolerance: dec!(50),
            default_bucket_size: dec!(100),
            unit_bucket_size: dec!(100),
            filter: Some(has_elevation),
        }
    }

    pub fn value_unit(&self) -> Unit {
        self.dimension.value_unit(self.units)
    }

    /// Whether a record passes this dimension's filter
    pub fn accepts(&self, record: &WorkoutRecord) -> bool {
        self.filter.map_or(true, |filter| filter(record, self.units))
    }

    pub fn value_of(&self, record: &WorkoutRecord) -> Option<Decimal> {
        (self.extract)(record, self.units)
    }
}

/// Caller overrides for a grouping pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingOptions {
    pub tolerance: Option<Decimal>,
    pub bucket_size: Option<Decimal>,
    /// When false, records are floor-bucketed by a fixed unit size with no rejection
    pub enabled: bool,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            tolerance: None,
            bucket_size: None,
            enabled: true,
        }
    }
}

impl GroupingOptions {
    pub fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: Decimal) -> Self {
        self.bucket_size = Some(bucket_size);
        self
    }

    pub fn unit_buckets() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Reject overrides the engine would otherwise replace with defaults
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if let Some(tolerance) = self.tolerance {
            if tolerance < Decimal::ZERO {
                return Err(AnalysisError::InvalidParameter {
                    parameter: "tolerance".to_string(),
                    value: tolerance.to_string(),
                });
            }
        }
        if let Some(bucket_size) = self.bucket_size {
            if bucket_size < MIN_BUCKET_SIZE {
                return Err(AnalysisError::InvalidParameter {
                    parameter: "bucket_size".to_string(),
                    value: bucket_size.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Identity of a bucket: its anchor value plus the indoor/outdoor partition.
///
/// Ordering is by ascending anchor, then indoor before outdoor. Serialized as its
/// display form (`"5-outdoor"`) so group maps stay valid JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub anchor: Decimal,
    pub environment: Environment,
}

impl GroupKey {
    pub fn new(anchor: Decimal, environment: Environment) -> Self {
        Self {
            anchor: anchor.normalize(),
            environment,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.anchor, self.environment)
    }
}

impl FromStr for GroupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (anchor, environment) = s
            .rsplit_once('-')
            .ok_or_else(|| format!("Invalid group key: {}", s))?;
        let anchor = Decimal::from_str(anchor).map_err(|e| format!("Invalid anchor in {}: {}", s, e))?;
        let environment = match environment {
            "indoor" => Environment::Indoor,
            "outdoor" => Environment::Outdoor,
            other => return Err(format!("Invalid environment in group key: {}", other)),
        };
        Ok(GroupKey::new(anchor, environment))
    }
}

impl Serialize for GroupKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Workouts whose dimension value sits near a common anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub dimension: Dimension,
    pub key: GroupKey,
    /// Unit of the anchor value
    pub unit: Unit,
    /// Accepted members, in encounter order
    pub runs: Vec<WorkoutRecord>,
    /// Records that mapped to this anchor but fell outside the tolerance
    pub skipped: usize,

    pub total_distance: Quantity,
    pub total_duration: Quantity,
    pub total_elevation: Quantity,

    pub average_pace: Option<Quantity>,
    pub average_duration: Option<Quantity>,
    pub average_humidity: Option<Quantity>,
    pub percentage_of_total_workouts: Decimal,

    /// Best performance in the group
    pub highlight: Option<WorkoutRecord>,
    /// Weakest performance in the group
    pub worst: Option<WorkoutRecord>,
    pub most_recent: Option<WorkoutRecord>,
    pub oldest: Option<WorkoutRecord>,
    pub greatest_elevation: Option<WorkoutRecord>,
    pub lowest_elevation: Option<WorkoutRecord>,

    /// One value per member, used for spread charts
    pub variant_distribution: Vec<f64>,
    /// Difference between worst and highlight
    pub total_variation: Option<Quantity>,
    pub consistency: Option<ConsistencyMetrics>,

    /// 1 = most populous group
    pub rank: usize,
    pub rank_label: String,

    pub prediction: Option<Prediction>,
}

impl Group {
    pub fn new(dimension: Dimension, key: GroupKey, unit: Unit) -> Self {
        Self {
            dimension,
            key,
            unit,
            runs: Vec::new(),
            skipped: 0,
            total_distance: Quantity::zero(Unit::Meters),
            total_duration: Quantity::zero(Unit::Seconds),
            total_elevation: Quantity::zero(Unit::Meters),
            average_pace: None,
            average_duration: None,
            average_humidity: None,
            percentage_of_total_workouts: Decimal::ZERO,
            highlight: None,
            worst: None,
            most_recent: None,
            oldest: None,
            greatest_elevation: None,
            lowest_elevation: None,
            variant_distribution: Vec::new(),
            total_variation: None,
            consistency: None,
            rank: 0,
            rank_label: String::new(),
            prediction: None,
        }
    }

    pub fn member_count(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn anchor_quantity(&self) -> Quantity {
        Quantity::new(self.key.anchor, self.unit)
    }

    /// Add an accepted record and fold it into the running totals
    pub fn absorb(&mut self, record: &WorkoutRecord) -> Result<(), QuantityError> {
        let total_distance = self.total_distance.checked_add(&record.distance)?;
        let total_duration = self.total_duration.checked_add(&record.duration)?;
        let total_elevation = match &record.elevation_gain {
            Some(elevation) => self.total_elevation.checked_add(elevation)?,
            None => self.total_elevation,
        };

        self.total_distance = total_distance;
        self.total_duration = total_duration;
        self.total_elevation = total_elevation;

        let is_newer = self
            .most_recent
            .as_ref()
            .map_or(true, |current| record.start > current.start);
        if is_newer {
            self.most_recent = Some(record.clone());
        }

        self.runs.push(record.clone());
        Ok(())
    }
}

/// Result of one grouping pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingOutcome {
    pub dimension: Dimension,
    /// Non-empty groups ordered by ascending anchor
    pub groups: BTreeMap<GroupKey, Group>,
    /// Records that passed the filter and had a value for the dimension
    pub eligible: usize,
    /// Records without a value for the dimension, or with one too large to anchor
    pub missing_values: usize,
    /// Skips that belonged to buckets removed for having no members
    pub orphaned_skips: usize,
    pub tolerance: Decimal,
    pub bucket_size: Decimal,
}

impl GroupingOutcome {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_members(&self) -> usize {
        self.groups.values().map(Group::member_count).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.groups.values().map(|g| g.skipped).sum::<usize>() + self.orphaned_skips
    }

    pub fn get(&self, anchor: Decimal, environment: Environment) -> Option<&Group> {
        self.groups.get(&GroupKey::new(anchor, environment))
    }

    /// Groups ordered by rank (most populous first)
    pub fn by_rank(&self) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self.groups.values().collect();
        groups.sort_by_key(|g| g.rank);
        groups
    }
}

/// Partitions workouts into similarity buckets for one dimension
pub struct GroupingEngine {
    config: DimensionConfig,
}

impl GroupingEngine {
    pub fn new(config: DimensionConfig) -> Self {
        Self { config }
    }

    pub fn for_dimension(dimension: Dimension, units: Units) -> Self {
        Self::new(DimensionConfig::for_dimension(dimension, units))
    }

    pub fn config(&self) -> &DimensionConfig {
        &self.config
    }

    /// Resolve tolerance and bucket size, falling back to defaults for
    /// negative tolerances and bucket sizes below [`MIN_BUCKET_SIZE`].
    fn effective_parameters(&self, options: &GroupingOptions) -> (Decimal, Decimal) {
        if !options.enabled {
            return (Decimal::ZERO, self.config.unit_bucket_size);
        }

        let bucket_size = match options.bucket_size {
            Some(size) if size >= MIN_BUCKET_SIZE => size,
            Some(size) => {
                warn!(
                    dimension = %self.config.dimension,
                    bucket_size = %size,
                    "Ignoring bucket size below minimum, using default"
                );
                self.config.default_bucket_size
            }
            None => self.config.default_bucket_size,
        };

        let tolerance = match options.tolerance {
            Some(tolerance) if tolerance >= Decimal::ZERO => tolerance,
            Some(tolerance) => {
                warn!(
                    dimension = %self.config.dimension,
                    tolerance = %tolerance,
                    "Ignoring negative tolerance, using default"
                );
                self.config.default_tolerance
            }
            None => self.config.default_tolerance,
        };

        (tolerance, bucket_size)
    }

    /// Anchor for a value and whether the value is close enough to it.
    /// `None` when the anchor is not representable.
    fn place(
        value: Decimal,
        bucket_size: Decimal,
        tolerance: Decimal,
        enabled: bool,
    ) -> Option<(Decimal, bool)> {
        let buckets = value.checked_div(bucket_size)?;
        if !enabled {
            return Some((buckets.floor().checked_mul(bucket_size)?, true));
        }

        let anchor = buckets
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(bucket_size)?;
        let accepted = value.checked_sub(anchor)?.abs() <= tolerance;
        Some((anchor, accepted))
    }

    /// Group records into buckets keyed by anchor and environment
    pub fn group(&self, records: &[WorkoutRecord], options: &GroupingOptions) -> GroupingOutcome {
        let dimension = self.config.dimension;
        let unit = self.config.value_unit();
        let (tolerance, bucket_size) = self.effective_parameters(options);

        let mut buckets: Vec<Group> = Vec::new();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut eligible = 0;
        let mut missing_values = 0;

        for record in records {
            if !self.config.accepts(record) {
                debug!(record = %record.id, %dimension, "Record excluded by dimension filter");
                continue;
            }

            let Some(value) = self.config.value_of(record) else {
                warn!(record = %record.id, %dimension, "Record has no value for dimension, skipping");
                missing_values += 1;
                continue;
            };

            let Some((anchor, accepted)) =
                Self::place(value, bucket_size, tolerance, options.enabled)
            else {
                warn!(
                    record = %record.id,
                    %value,
                    %bucket_size,
                    "Value cannot be anchored at this bucket size, skipping"
                );
                missing_values += 1;
                continue;
            };
            eligible += 1;

            let key = GroupKey::new(anchor, record.environment);
            let slot = *index.entry(key).or_insert_with(|| {
                buckets.push(Group::new(dimension, key, unit));
                buckets.len() - 1
            });
            let bucket = &mut buckets[slot];

            if !accepted {
                debug!(
                    record = %record.id,
                    %value,
                    anchor = %key,
                    %tolerance,
                    "Record outside tolerance window, counted as skipped"
                );
                bucket.skipped += 1;
                continue;
            }

            if let Err(e) = bucket.absorb(record) {
                warn!(record = %record.id, error = %e, "Could not accumulate record totals");
                bucket.skipped += 1;
            }
        }

        let mut orphaned_skips = 0;
        buckets.retain(|bucket| {
            if bucket.is_empty() {
                debug!(anchor = %bucket.key, skipped = bucket.skipped, "Dropping bucket with no members");
                orphaned_skips += bucket.skipped;
                false
            } else {
                true
            }
        });

        assign_ranks(&mut buckets);

        let groups: BTreeMap<GroupKey, Group> =
            buckets.into_iter().map(|group| (group.key, group)).collect();

        info!(
            %dimension,
            groups = groups.len(),
            eligible,
            missing_values,
            %tolerance,
            %bucket_size,
            "Grouping pass complete"
        );

        GroupingOutcome {
            dimension,
            groups,
            eligible,
            missing_values,
            orphaned_skips,
            tolerance,
            bucket_size,
        }
    }
}

/// Rank buckets by member count, largest first. Ties keep encounter order.
fn assign_ranks(buckets: &mut [Group]) {
    let mut order: Vec<usize> = (0..buckets.len()).collect();
    order.sort_by(|&a, &b| buckets[b].member_count().cmp(&buckets[a].member_count()));

    let total = order.len();
    for (position, &slot) in order.iter().enumerate() {
        let rank = position + 1;
        buckets[slot].rank = rank;
        buckets[slot].rank_label = rank_label(rank, total);
    }
}

/// Human label for a rank: "Most Common", "2nd Most Common", ..., "Least Common"
pub fn rank_label(rank: usize, total: usize) -> String {
    if rank <= 1 {
        "Most Common".to_string()
    } else if rank == total {
        "Least Common".to_string()
    } else {
        format!("{} Most Common", ordinal(rank))
    }
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};

    fn day(offset: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 7, 0, 0)
            .unwrap()
            + Duration::days(offset)
    }

    fn run(id: &str, offset: i64, km: Decimal, minutes: Decimal) -> WorkoutRecord {
        WorkoutRecord::new(id, day(offset), minutes * dec!(60), km * dec!(1000))
    }

    fn distance_engine() -> GroupingEngine {
        GroupingEngine::for_dimension(Dimension::Distance, Units::Metric)
    }

    #[test]
    fn test_tolerance_boundary() {
        let records = vec![
            run("exact", 0, dec!(3.25), dec!(18)),
            run("over", 1, dec!(3.26), dec!(18)),
        ];
        let options = GroupingOptions::default()
            .with_bucket_size(dec!(1.0))
            .with_tolerance(dec!(0.25));

        let outcome = distance_engine().group(&records, &options);

        let group = outcome.get(dec!(3), Environment::Outdoor).unwrap();
        assert_eq!(group.member_count(), 1);
        assert_eq!(group.runs[0].id, "exact");
        assert_eq!(group.skipped, 1);
    }

    #[test]
    fn test_indoor_outdoor_partition() {
        let records = vec![
            run("outside", 0, dec!(5), dec!(25)),
            run("treadmill", 1, dec!(5), dec!(26)).with_environment(Environment::Indoor),
        ];

        let outcome = distance_engine().group(&records, &GroupingOptions::default());

        assert_eq!(outcome.len(), 2);
        let indoor = outcome.get(dec!(5), Environment::Indoor).unwrap();
        let outdoor = outcome.get(dec!(5), Environment::Outdoor).unwrap();
        assert_eq!(indoor.runs[0].id, "treadmill");
        assert_eq!(outdoor.runs[0].id, "outside");
        assert_eq!(indoor.key.to_string(), "5-indoor");
        assert_eq!(outdoor.key.to_string(), "5-outdoor");
    }

    #[test]
    fn test_rank_ordering() {
        let mut records = Vec::new();
        let mut offset = 0;
        for (km, count) in [(dec!(3), 5), (dec!(5), 2), (dec!(10), 8)] {
            for _ in 0..count {
                records.push(run(&format!("run_{}", offset), offset, km, km * dec!(5)));
                offset += 1;
            }
        }

        let outcome = distance_engine().group(&records, &GroupingOptions::default());

        let ranks: Vec<usize> = outcome.groups.values().map(|g| g.rank).collect();
        assert_eq!(ranks, vec![2, 3, 1]);

        let labels: Vec<&str> = outcome.by_rank().iter().map(|g| g.rank_label.as_str()).collect();
        assert_eq!(labels, vec!["Most Common", "2nd Most Common", "Least Common"]);
    }

    #[test]
    fn test_rank_ties_keep_encounter_order() {
        let records = vec![
            run("a", 0, dec!(10), dec!(50)),
            run("b", 1, dec!(5), dec!(25)),
            run("c", 2, dec!(10), dec!(51)),
            run("d", 3, dec!(5), dec!(26)),
        ];

        let outcome = distance_engine().group(&records, &GroupingOptions::default());

        assert_eq!(outcome.get(dec!(10), Environment::Outdoor).unwrap().rank, 1);
        assert_eq!(outcome.get(dec!(5), Environment::Outdoor).unwrap().rank, 2);
    }

    #[test]
    fn test_elevation_scenario() {
        let records = vec![
            run("a", 0, dec!(8), dec!(45)).with_elevation(dec!(95)),
            run("b", 1, dec!(8), dec!(45)).with_elevation(dec!(105)),
            run("c", 2, dec!(8), dec!(45)).with_elevation(dec!(195)),
            run("d", 3, dec!(8), dec!(45)).with_elevation(dec!(205)),
        ];
        let options = GroupingOptions::default()
            .with_bucket_size(dec!(100))
            .with_tolerance(dec!(50));

        let engine = GroupingEngine::for_dimension(Dimension::Elevation, Units::Metric);
        let outcome = engine.group(&records, &options);

        let anchors: Vec<String> = outcome.groups.keys().map(|k| k.anchor.to_string()).collect();
        assert_eq!(anchors, vec!["100", "200"]);
        assert!(outcome.groups.values().all(|g| g.member_count() == 2));
        assert_eq!(outcome.total_skipped(), 0);
    }

    #[test]
    fn test_elevation_filter_excludes_flat_runs() {
        let records = vec![
            run("flat", 0, dec!(5), dec!(25)).with_elevation(Decimal::ZERO),
            run("unknown", 1, dec!(5), dec!(25)),
            run("hilly", 2, dec!(5), dec!(28)).with_elevation(dec!(120)),
        ];

        let engine = GroupingEngine::for_dimension(Dimension::Elevation, Units::Metric);
        let outcome = engine.group(&records, &GroupingOptions::default());

        assert_eq!(outcome.eligible, 1);
        assert_eq!(outcome.total_members(), 1);
    }

    #[test]
    fn test_missing_values_are_skipped_not_fatal() {
        let records = vec![
            run("no_distance", 0, Decimal::ZERO, dec!(30)),
            run("ok", 1, dec!(5), dec!(25)),
        ];

        let engine = GroupingEngine::for_dimension(Dimension::Pace, Units::Metric);
        let outcome = engine.group(&records, &GroupingOptions::default());

        assert_eq!(outcome.missing_values, 1);
        assert_eq!(outcome.eligible, 1);
        assert_eq!(outcome.total_members(), 1);
    }

    #[test]
    fn test_pure_skip_buckets_removed() {
        // 4.5 km rounds to the 5 km anchor but sits 0.5 km away
        let records = vec![run("between", 0, dec!(4.5), dec!(24))];

        let outcome = distance_engine().group(&records, &GroupingOptions::default());

        assert!(outcome.is_empty());
        assert_eq!(outcome.orphaned_skips, 1);
        assert_eq!(outcome.total_members() + outcome.total_skipped(), outcome.eligible);
    }

    #[test]
    fn test_unit_bucket_mode_floors_without_rejection() {
        let records = vec![
            run("a", 0, dec!(4.1), dec!(22)),
            run("b", 1, dec!(4.5), dec!(24)),
            run("c", 2, dec!(4.99), dec!(26)),
        ];

        let outcome = distance_engine().group(&records, &GroupingOptions::unit_buckets());

        assert_eq!(outcome.len(), 1);
        let group = outcome.get(dec!(4), Environment::Outdoor).unwrap();
        assert_eq!(group.member_count(), 3);
        assert_eq!(group.skipped, 0);
    }

    #[test]
    fn test_totals_and_most_recent() {
        let records = vec![
            run("older", 0, dec!(5), dec!(25)).with_elevation(dec!(40)),
            run("newer", 5, dec!(5.1), dec!(26)),
            run("middle", 2, dec!(4.9), dec!(24)).with_elevation(dec!(10)),
        ];

        let outcome = distance_engine().group(&records, &GroupingOptions::default());
        let group = outcome.get(dec!(5), Environment::Outdoor).unwrap();

        assert_eq!(group.total_distance, Quantity::meters(dec!(15000)));
        assert_eq!(group.total_duration, Quantity::seconds(dec!(4500)));
        assert_eq!(group.total_elevation, Quantity::meters(dec!(50)));
        assert_eq!(group.most_recent.as_ref().unwrap().id, "newer");
    }

    #[test]
    fn test_empty_input_yields_empty_map() {
        let outcome = distance_engine().group(&[], &GroupingOptions::default());
        assert!(outcome.is_empty());
        assert_eq!(outcome.eligible, 0);
    }

    #[test]
    fn test_invalid_overrides_fall_back_to_defaults() {
        let engine = distance_engine();
        let options = GroupingOptions::default()
            .with_bucket_size(Decimal::ZERO)
            .with_tolerance(dec!(-1));

        let (tolerance, bucket_size) = engine.effective_parameters(&options);
        assert_eq!(tolerance, dec!(0.25));
        assert_eq!(bucket_size, dec!(1));
    }

    #[test]
    fn test_tiny_bucket_size_falls_back_to_default() {
        let records = vec![run("long", 0, dec!(10), dec!(50))];
        let options = GroupingOptions::default()
            .with_bucket_size(dec!(0.0000000000000000000000000001));

        let outcome = distance_engine().group(&records, &options);
        assert_eq!(outcome.bucket_size, dec!(1));
        assert!(outcome.get(dec!(10), Environment::Outdoor).is_some());
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_anchor_counts_as_missing() {
        assert!(GroupingEngine::place(Decimal::MAX, MIN_BUCKET_SIZE, dec!(1), true).is_none());
        assert!(GroupingEngine::place(Decimal::MAX, MIN_BUCKET_SIZE, dec!(1), false).is_none());

        let records = vec![
            run("normal", 0, dec!(5), dec!(25)),
            WorkoutRecord::new("absurd", day(1), dec!(1800), Decimal::MAX),
        ];
        let options = GroupingOptions::default().with_bucket_size(MIN_BUCKET_SIZE);
        let outcome = distance_engine().group(&records, &options);

        assert_eq!(outcome.eligible, 1);
        assert_eq!(outcome.missing_values, 1);
        assert_eq!(outcome.total_members() + outcome.total_skipped(), outcome.eligible);
    }

    #[test]
    fn test_options_validation() {
        assert!(GroupingOptions::default().validate().is_ok());
        assert!(GroupingOptions::default().with_tolerance(Decimal::ZERO).validate().is_ok());
        assert!(GroupingOptions::default().with_bucket_size(MIN_BUCKET_SIZE).validate().is_ok());

        let err = GroupingOptions::default()
            .with_tolerance(dec!(-0.5))
            .validate()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidParameter { ref parameter, .. } if parameter == "tolerance"));
    }

    #[test]
    fn test_group_key_round_trip_through_json() {
        let key = GroupKey::new(dec!(2.50), Environment::Indoor);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2.5-indoor\"");

        let parsed: GroupKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(rank_label(1, 1), "Most Common");
        assert_eq!(rank_label(4, 6), "4th Most Common");
    }
}
