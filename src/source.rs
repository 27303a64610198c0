//! Workout record sources
//!
//! Sources turn loosely typed rows (JSON objects, CSV lines) into normalized
//! [`WorkoutRecord`]s. Rows that cannot be normalized are skipped with a warning;
//! only unreadable files fail a fetch.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::achievements;
use crate::error::SourceError;
use crate::models::{end_time, Environment, WorkoutRecord};
use crate::quantity::Quantity;

/// Anything that can supply a workout history
pub trait WorkoutSource {
    /// Fetch and normalize all records
    fn fetch_records(&self) -> Result<Vec<WorkoutRecord>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// One workout as delivered by a data source, before normalization
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawWorkout {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(alias = "start_time", alias = "start_date")]
    pub start: Option<DateTime<FixedOffset>>,

    #[serde(default, alias = "end_time", alias = "end_date")]
    pub end: Option<DateTime<FixedOffset>>,

    #[serde(default, alias = "distance")]
    pub distance_meters: Option<Decimal>,

    /// Derived from `end - start` when absent
    #[serde(default, alias = "duration")]
    pub duration_seconds: Option<Decimal>,

    #[serde(default, alias = "elevation_gain", alias = "elevation")]
    pub elevation_gain_meters: Option<Decimal>,

    #[serde(default, alias = "humidity")]
    pub humidity_percent: Option<Decimal>,

    #[serde(default)]
    pub indoor: bool,
}

impl WorkoutRecord {
    /// Normalize a raw row. A missing id is replaced by a generated one.
    pub fn from_raw(raw: RawWorkout) -> Result<WorkoutRecord, SourceError> {
        let id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let invalid = |reason: &str| SourceError::InvalidRecord {
            id: id.clone(),
            reason: reason.to_string(),
        };

        let start = raw.start.ok_or_else(|| invalid("missing start time"))?;
        if let Some(end) = raw.end {
            if end < start {
                return Err(invalid("end time precedes start time"));
            }
        }

        let duration_seconds = match (raw.duration_seconds, raw.end) {
            (Some(seconds), _) => seconds,
            (None, Some(end)) => Decimal::from((end - start).num_seconds()),
            (None, None) => return Err(invalid("no duration and no end time")),
        };
        if duration_seconds < Decimal::ZERO {
            return Err(invalid("negative duration"));
        }
        if end_time(start, duration_seconds).is_none() {
            return Err(invalid("duration out of range"));
        }

        let distance_meters = raw.distance_meters.unwrap_or(Decimal::ZERO);
        if distance_meters < Decimal::ZERO {
            return Err(invalid("negative distance"));
        }

        let mut record = WorkoutRecord::new(id.clone(), start, duration_seconds, distance_meters)
            .with_environment(Environment::from_indoor_flag(raw.indoor));
        if let Some(end) = raw.end {
            record.end = end;
        }
        if let Some(elevation) = raw.elevation_gain_meters {
            if elevation < Decimal::ZERO {
                return Err(invalid("negative elevation gain"));
            }
            record.elevation_gain = Some(Quantity::meters(elevation));
        }
        if let Some(humidity) = raw.humidity_percent {
            record = record.with_humidity(humidity);
        }

        Ok(record)
    }
}

/// Normalize raw rows, skipping invalid ones, and compute achievement flags
pub fn normalize_records(raws: Vec<RawWorkout>) -> Vec<WorkoutRecord> {
    let total = raws.len();
    let mut records: Vec<WorkoutRecord> = raws
        .into_iter()
        .filter_map(|raw| match WorkoutRecord::from_raw(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping workout that could not be normalized");
                None
            }
        })
        .collect();

    achievements::annotate(&mut records);

    if records.len() < total {
        info!(
            kept = records.len(),
            skipped = total - records.len(),
            "Normalized workout records"
        );
    }
    records
}

/// JSON array of raw workouts
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse raw workouts from a JSON string
    pub fn parse(content: &str) -> Result<Vec<RawWorkout>> {
        serde_json::from_str(content).map_err(|e| {
            SourceError::Parse {
                format: "json".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl WorkoutSource for JsonFileSource {
    fn fetch_records(&self) -> Result<Vec<WorkoutRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read workout file: {}", self.path.display()))?;
        let raws = Self::parse(&content)
            .with_context(|| format!("Invalid workout file: {}", self.path.display()))?;
        Ok(normalize_records(raws))
    }

    fn name(&self) -> &'static str {
        "JSON"
    }
}

/// CSV file with one workout per row and flexible column names
pub struct CsvFileSource {
    path: PathBuf,
    column_mapping: HashMap<String, String>,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut column_mapping = HashMap::new();

        Self::add_mapping(&mut column_mapping, "id", &["id", "workout_id", "uuid"]);
        Self::add_mapping(
            &mut column_mapping,
            "start",
            &["start", "start_time", "start_date", "started_at", "date"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "end",
            &["end", "end_time", "end_date", "ended_at"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "distance_meters",
            &["distance_meters", "distance", "distance_m", "total_distance"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "duration_seconds",
            &["duration_seconds", "duration", "duration_s", "elapsed", "elapsed_time"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "elevation_gain_meters",
            &["elevation_gain_meters", "elevation_gain", "elevation", "ascent", "climb"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "humidity_percent",
            &["humidity_percent", "humidity", "relative_humidity"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "indoor",
            &["indoor", "is_indoor", "treadmill"],
        );

        Self {
            path: path.into(),
            column_mapping,
        }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    /// Parse raw workouts from CSV text with a header row
    pub fn parse(&self, content: &str) -> Result<Vec<RawWorkout>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context("CSV file has no header row")?
            .iter()
            .map(|h| self.normalize_column_name(h))
            .collect();

        if !headers.iter().any(|h| h == "start") {
            return Err(SourceError::Parse {
                format: "csv".to_string(),
                reason: "missing start time column".to_string(),
            }
            .into());
        }

        let mut raws = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(line = line + 2, error = %e, "Skipping unreadable CSV row");
                    continue;
                }
            };

            let fields: HashMap<&str, &str> = headers
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .filter(|(_, value)| !value.is_empty())
                .collect();

            match Self::raw_from_fields(&fields) {
                Ok(raw) => raws.push(raw),
                Err(e) => warn!(line = line + 2, error = %e, "Skipping malformed CSV row"),
            }
        }

        Ok(raws)
    }

    fn raw_from_fields(fields: &HashMap<&str, &str>) -> Result<RawWorkout> {
        let decimal = |key: &str| -> Result<Option<Decimal>> {
            fields
                .get(key)
                .map(|value| {
                    Decimal::from_str(value)
                        .with_context(|| format!("Invalid number for {}: {}", key, value))
                })
                .transpose()
        };
        let timestamp = |key: &str| -> Result<Option<DateTime<FixedOffset>>> {
            fields.get(key).map(|value| parse_datetime(value)).transpose()
        };

        Ok(RawWorkout {
            id: fields.get("id").map(|id| id.to_string()),
            start: timestamp("start")?,
            end: timestamp("end")?,
            distance_meters: decimal("distance_meters")?,
            duration_seconds: decimal("duration_seconds")?,
            elevation_gain_meters: decimal("elevation_gain_meters")?,
            humidity_percent: decimal("humidity_percent")?,
            indoor: fields.get("indoor").map_or(false, |value| parse_flag(value)),
        })
    }
}

impl WorkoutSource for CsvFileSource {
    fn fetch_records(&self) -> Result<Vec<WorkoutRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read workout file: {}", self.path.display()))?;
        let raws = self.parse(&content)?;
        Ok(normalize_records(raws))
    }

    fn name(&self) -> &'static str {
        "CSV"
    }
}

/// Records already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<WorkoutRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<WorkoutRecord>) -> Self {
        Self { records }
    }

    pub fn from_raw(raws: Vec<RawWorkout>) -> Self {
        Self::new(normalize_records(raws))
    }
}

impl WorkoutSource for InMemorySource {
    fn fetch_records(&self) -> Result<Vec<WorkoutRecord>> {
        Ok(self.records.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Pick a file source by extension
pub fn source_for_path(path: &Path) -> Result<Box<dyn WorkoutSource>> {
    if !path.exists() {
        return Err(SourceError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "json" => Ok(Box::new(JsonFileSource::new(path))),
        "csv" => Ok(Box::new(CsvFileSource::new(path))),
        other => Err(SourceError::UnsupportedFormat {
            format: other.to_string(),
        }
        .into()),
    }
}

/// RFC 3339 first, then common naive layouts read as UTC, then epoch seconds
fn parse_datetime(value: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }

    if let Ok(timestamp) = value.parse::<i64>() {
        if let Some(parsed) = DateTime::from_timestamp(timestamp, 0) {
            return Ok(parsed.fixed_offset());
        }
    }

    anyhow::bail!("Unable to parse datetime: {}", value);
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "indoor"
    )
}
