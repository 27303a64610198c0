//! Analysis pipeline and caller-side result cache
//!
//! [`WorkoutAnalyzer`] chains grouping, per-group statistics and prediction for one
//! dimension. The engines are pure; [`AnalysisCache`] lets callers reuse a result
//! while the record set is unchanged.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::grouping::{Group, GroupingEngine, GroupingOptions, GroupingOutcome};
use crate::models::{Dimension, Units, WorkoutRecord};
use crate::prediction::{Prediction, PredictionEngine};
use crate::quantity::Quantity;
use crate::stats::compute_stats;
use crate::weekly::{WeeklyAggregator, WeeklyTrendStats};

/// What to analyze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub dimension: Dimension,
    pub options: GroupingOptions,
    pub weeks_ahead: u32,
}

impl AnalysisRequest {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            options: GroupingOptions::default(),
            weeks_ahead: 4,
        }
    }

    pub fn with_options(mut self, options: GroupingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_weeks_ahead(mut self, weeks: u32) -> Self {
        self.weeks_ahead = weeks;
        self
    }
}

/// Fully annotated grouping of a record set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAnalysis {
    pub request: AnalysisRequest,
    pub units: Units,
    pub outcome: GroupingOutcome,
    /// Records that passed the dimension filter
    pub filtered_records: usize,
}

impl GroupAnalysis {
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.outcome.groups.values()
    }

    pub fn predictions(&self) -> impl Iterator<Item = (&Group, &Prediction)> {
        self.groups()
            .filter_map(|group| group.prediction.as_ref().map(|prediction| (group, prediction)))
    }
}

/// Runs grouping, statistics and prediction over a record set
#[derive(Debug, Clone, Default)]
pub struct WorkoutAnalyzer {
    units: Units,
    predictions: PredictionEngine,
}

impl WorkoutAnalyzer {
    pub fn new(units: Units, predictions: PredictionEngine) -> Self {
        Self { units, predictions }
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Group `records` along `dimension`, annotate every group with statistics and
    /// predict groups with at least two members.
    pub fn analyze(
        &self,
        records: &[WorkoutRecord],
        dimension: Dimension,
        options: &GroupingOptions,
        weeks_ahead: u32,
    ) -> GroupAnalysis {
        let engine = GroupingEngine::for_dimension(dimension, self.units);
        let mut outcome = engine.group(records, options);

        let filtered: Vec<WorkoutRecord> = records
            .iter()
            .filter(|record| engine.config().accepts(record))
            .cloned()
            .collect();

        let mut predicted = 0;
        for group in outcome.groups.values_mut() {
            compute_stats(group, &filtered, self.units);

            if group.member_count() >= 2 {
                group.prediction = self.predictions.predict(group, weeks_ahead, self.units);
                if group.prediction.is_some() {
                    predicted += 1;
                }
            } else {
                debug!(group = %group.key, "Single-workout group, no prediction");
            }
        }

        info!(
            %dimension,
            groups = outcome.len(),
            predicted,
            records = records.len(),
            "Analysis complete"
        );

        GroupAnalysis {
            request: AnalysisRequest {
                dimension,
                options: *options,
                weeks_ahead,
            },
            units: self.units,
            outcome,
            filtered_records: filtered.len(),
        }
    }

    pub fn run(&self, records: &[WorkoutRecord], request: &AnalysisRequest) -> GroupAnalysis {
        self.analyze(records, request.dimension, &request.options, request.weeks_ahead)
    }

    pub fn weekly(&self, records: &[WorkoutRecord]) -> WeeklyTrendStats {
        WeeklyAggregator::new(self.units).aggregate_by_weekday(records)
    }
}

/// SHA-256 fingerprint of a record set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordSetVersion(String);

impl RecordSetVersion {
    /// Fingerprint every field the engines read, record by record, in order.
    /// Each field is length-prefixed so adjacent values cannot run together.
    pub fn of(records: &[WorkoutRecord]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((records.len() as u64).to_le_bytes());
        for record in records {
            let fields = [
                record.id.clone(),
                record.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                record.end.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                quantity_field(Some(&record.distance)),
                quantity_field(Some(&record.duration)),
                quantity_field(record.elevation_gain.as_ref()),
                quantity_field(record.humidity.as_ref()),
                record.environment.to_string(),
                record.achievements.labels().join(","),
            ];
            for field in &fields {
                hasher.update((field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn quantity_field(quantity: Option<&Quantity>) -> String {
    quantity.map_or_else(String::new, |q| format!("{}{}", q.value.normalize(), q.unit.symbol()))
}

impl fmt::Display for RecordSetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Cache identity of one analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub request: AnalysisRequest,
    pub units: Units,
    pub version: RecordSetVersion,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    /// Hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / self.total_lookups as f64) * 100.0
    }
}

struct CachedAnalysis {
    analysis: GroupAnalysis,
    last_used: u64,
}

/// In-memory LRU cache of analyses keyed by request and record set version
pub struct AnalysisCache {
    entries: HashMap<AnalysisKey, CachedAnalysis>,
    max_entries: usize,
    clock: u64,
    metrics: CacheMetrics,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(32)
    }
}

impl AnalysisCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            clock: 0,
            metrics: CacheMetrics::default(),
        }
    }

    /// Return the cached analysis for this record set and request, computing it on a miss
    pub fn get_or_compute(
        &mut self,
        analyzer: &WorkoutAnalyzer,
        records: &[WorkoutRecord],
        request: &AnalysisRequest,
    ) -> GroupAnalysis {
        let key = AnalysisKey {
            request: *request,
            units: analyzer.units(),
            version: RecordSetVersion::of(records),
        };

        self.clock += 1;
        self.metrics.total_lookups += 1;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = self.clock;
            self.metrics.cache_hits += 1;
            debug!(version = %key.version, dimension = %request.dimension, "Analysis cache hit");
            return entry.analysis.clone();
        }

        self.metrics.cache_misses += 1;
        debug!(version = %key.version, dimension = %request.dimension, "Analysis cache miss");

        let analysis = analyzer.run(records, request);
        if self.entries.len() >= self.max_entries {
            self.evict_least_recent();
        }
        self.entries.insert(
            key,
            CachedAnalysis {
                analysis: analysis.clone(),
                last_used: self.clock,
            },
        );
        analysis
    }

    /// Drop every entry computed from `version`
    pub fn invalidate(&mut self, version: &RecordSetVersion) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| &key.version != version);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(%version, removed, "Invalidated cached analyses");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.metrics.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Environment;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(offset: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 2, 5, 6, 0, 0)
            .unwrap()
            + Duration::days(offset)
    }

    fn run(id: &str, offset: i64, km: Decimal, minutes: Decimal) -> WorkoutRecord {
        WorkoutRecord::new(id, day(offset), minutes * dec!(60), km * dec!(1000))
    }

    fn history() -> Vec<WorkoutRecord> {
        vec![
            run("a", 0, dec!(5), dec!(28)),
            run("b", 7, dec!(5), dec!(27)),
            run("c", 14, dec!(5), dec!(26)),
            run("d", 3, dec!(10), dec!(55)),
        ]
    }

    #[test]
    fn test_analyze_annotates_and_predicts() {
        let analysis = WorkoutAnalyzer::default().analyze(
            &history(),
            Dimension::Distance,
            &GroupingOptions::default(),
            4,
        );

        assert_eq!(analysis.filtered_records, 4);
        let five_k = analysis.outcome.get(dec!(5), Environment::Outdoor).unwrap();
        assert!(five_k.highlight.is_some());
        assert!(five_k.prediction.is_some());

        let ten_k = analysis.outcome.get(dec!(10), Environment::Outdoor).unwrap();
        assert_eq!(ten_k.percentage_of_total_workouts, dec!(25));
        assert!(ten_k.prediction.is_none());

        assert_eq!(analysis.predictions().count(), 1);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let analyzer = WorkoutAnalyzer::default();
        let request = AnalysisRequest::new(Dimension::Pace).with_weeks_ahead(6);

        let first = analyzer.run(&history(), &request);
        let second = analyzer.run(&history(), &request);
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_set_version() {
        let records = history();
        assert_eq!(RecordSetVersion::of(&records), RecordSetVersion::of(&records));

        let mut changed = records.clone();
        changed.push(run("e", 21, dec!(5), dec!(25)));
        assert_ne!(RecordSetVersion::of(&records), RecordSetVersion::of(&changed));
        assert_eq!(RecordSetVersion::of(&records).as_str().len(), 64);
    }

    #[test]
    fn test_record_set_version_tracks_grouping_inputs() {
        let base = vec![run("hill", 0, dec!(8), dec!(45)).with_elevation(dec!(100))];
        let version = RecordSetVersion::of(&base);

        let higher = vec![run("hill", 0, dec!(8), dec!(45)).with_elevation(dec!(400))];
        assert_ne!(version, RecordSetVersion::of(&higher));

        let indoor = vec![run("hill", 0, dec!(8), dec!(45))
            .with_elevation(dec!(100))
            .with_environment(Environment::Indoor)];
        assert_ne!(version, RecordSetVersion::of(&indoor));

        let humid = vec![run("hill", 0, dec!(8), dec!(45))
            .with_elevation(dec!(100))
            .with_humidity(dec!(80))];
        assert_ne!(version, RecordSetVersion::of(&humid));

        // "ab" + "c" must not collide with "a" + "bc"
        let split_a = vec![run("ab", 0, dec!(5), dec!(25)), run("c", 1, dec!(5), dec!(25))];
        let split_b = vec![run("a", 0, dec!(5), dec!(25)), run("bc", 1, dec!(5), dec!(25))];
        assert_ne!(RecordSetVersion::of(&split_a), RecordSetVersion::of(&split_b));
    }

    #[test]
    fn test_cache_misses_after_elevation_and_environment_change() {
        let analyzer = WorkoutAnalyzer::default();
        let mut cache = AnalysisCache::default();
        let request = AnalysisRequest::new(Dimension::Elevation);

        let outdoor = vec![run("hill", 0, dec!(8), dec!(45)).with_elevation(dec!(100))];
        let first = cache.get_or_compute(&analyzer, &outdoor, &request);
        assert!(first.outcome.get(dec!(100), Environment::Outdoor).is_some());

        let indoor = vec![run("hill", 0, dec!(8), dec!(45))
            .with_elevation(dec!(400))
            .with_environment(Environment::Indoor)];
        let second = cache.get_or_compute(&analyzer, &indoor, &request);
        assert!(second.outcome.get(dec!(400), Environment::Indoor).is_some());
        assert_eq!(cache.metrics().cache_misses, 2);
    }

    #[test]
    fn test_cache_hits_and_misses() {
        let analyzer = WorkoutAnalyzer::default();
        let mut cache = AnalysisCache::default();
        let records = history();
        let request = AnalysisRequest::new(Dimension::Distance);

        let first = cache.get_or_compute(&analyzer, &records, &request);
        let second = cache.get_or_compute(&analyzer, &records, &request);
        assert_eq!(first, second);

        let other = request.with_options(GroupingOptions::default().with_tolerance(dec!(0.1)));
        cache.get_or_compute(&analyzer, &records, &other);

        let metrics = cache.metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_invalidation() {
        let analyzer = WorkoutAnalyzer::default();
        let mut cache = AnalysisCache::default();
        let records = history();
        let request = AnalysisRequest::new(Dimension::Duration);

        cache.get_or_compute(&analyzer, &records, &request);
        assert_eq!(cache.invalidate(&RecordSetVersion::of(&records)), 1);
        assert!(cache.is_empty());

        cache.get_or_compute(&analyzer, &records, &request);
        assert_eq!(cache.metrics().cache_misses, 2);
    }

    #[test]
    fn test_cache_evicts_least_recent() {
        let analyzer = WorkoutAnalyzer::default();
        let mut cache = AnalysisCache::new(2);
        let records = history();

        let distance = AnalysisRequest::new(Dimension::Distance);
        let pace = AnalysisRequest::new(Dimension::Pace);
        let duration = AnalysisRequest::new(Dimension::Duration);

        cache.get_or_compute(&analyzer, &records, &distance);
        cache.get_or_compute(&analyzer, &records, &pace);
        cache.get_or_compute(&analyzer, &records, &distance);
        cache.get_or_compute(&analyzer, &records, &duration);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.metrics().evictions, 1);

        // Distance was used more recently than pace, so it survived
        cache.get_or_compute(&analyzer, &records, &distance);
        assert_eq!(cache.metrics().cache_hits, 2);
    }
}
