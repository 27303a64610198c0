//! Terminal tables and file exports for analysis results

use anyhow::{Context, Result};
use colored::*;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::info;

use crate::analysis::{GroupAnalysis, RecordSetVersion};
use crate::grouping::Group;
use crate::models::Dimension;
use crate::quantity::{Quantity, Unit};
use crate::weekly::{BestDay, WeeklyTrendStats};

/// File formats supported by `export`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(format!("Unsupported export format: {}", s)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Pace as `m:ss /km`
pub fn format_pace(pace: &Quantity) -> String {
    let minutes = pace.value.max(Decimal::ZERO);
    let total_seconds = (minutes * dec!(60))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);
    let suffix = match pace.unit {
        Unit::MinutesPerMile => "/mi",
        _ => "/km",
    };
    format!("{}:{:02} {}", total_seconds / 60, total_seconds % 60, suffix)
}

/// Duration in seconds as `h:mm:ss`, or `m:ss` under an hour
pub fn format_duration(seconds: Decimal) -> String {
    let total = seconds
        .max(Decimal::ZERO)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn format_quantity(quantity: &Quantity) -> String {
    match quantity.unit {
        Unit::Seconds => format_duration(quantity.value),
        Unit::MinutesPerKilometer | Unit::MinutesPerMile => format_pace(quantity),
        _ => quantity.to_string(),
    }
}

fn optional<T, F>(value: Option<T>, format: F) -> String
where
    F: FnOnce(T) -> String,
{
    value.map_or_else(|| "-".to_string(), format)
}

/// Label for a group anchor, e.g. `5 km (outdoor)`
pub fn group_label(group: &Group) -> String {
    let anchor = match group.dimension {
        Dimension::Duration => format_duration(group.key.anchor),
        Dimension::Pace => format_pace(&group.anchor_quantity()),
        Dimension::Distance | Dimension::Elevation => {
            format!("{} {}", group.key.anchor, group.unit)
        }
    };
    format!("{} ({})", anchor, group.key.environment)
}

/// One line per group
#[derive(Debug, Clone, PartialEq, Tabled, Serialize)]
pub struct GroupRow {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Frequency")]
    pub frequency: String,
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Runs")]
    pub runs: usize,
    #[tabled(rename = "Skipped")]
    pub skipped: usize,
    #[tabled(rename = "Share %")]
    pub share: String,
    #[tabled(rename = "Avg Pace")]
    pub average_pace: String,
    #[tabled(rename = "Avg Duration")]
    pub average_duration: String,
    #[tabled(rename = "Best")]
    pub highlight: String,
    #[tabled(rename = "Variation")]
    pub variation: String,
    #[tabled(rename = "Consistency")]
    pub consistency: String,
}

impl GroupRow {
    pub fn from_group(group: &Group) -> Self {
        Self {
            rank: group.rank,
            frequency: group.rank_label.clone(),
            group: group_label(group),
            runs: group.member_count(),
            skipped: group.skipped,
            share: group.percentage_of_total_workouts.round_dp(1).to_string(),
            average_pace: optional(group.average_pace.as_ref(), format_pace),
            average_duration: optional(group.average_duration, |d| format_duration(d.value)),
            highlight: optional(group.highlight.as_ref(), |record| record.id.clone()),
            variation: optional(group.total_variation.as_ref(), format_quantity),
            consistency: optional(group.consistency.as_ref(), |c| format!("{:.0}", c.score)),
        }
    }
}

/// One line per predicted group
#[derive(Debug, Clone, PartialEq, Tabled, Serialize)]
pub struct PredictionRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Best Pace")]
    pub current_best: String,
    #[tabled(rename = "Predicted Pace")]
    pub predicted_pace: String,
    #[tabled(rename = "Predicted Time")]
    pub predicted_duration: String,
    #[tabled(rename = "Improvement %")]
    pub improvement: String,
    #[tabled(rename = "Confidence")]
    pub confidence: String,
    #[tabled(rename = "Momentum")]
    pub momentum: String,
    #[tabled(rename = "Target Date")]
    pub target_date: String,
}

impl PredictionRow {
    pub fn from_group(group: &Group) -> Option<Self> {
        let prediction = group.prediction.as_ref()?;
        Some(Self {
            group: group_label(group),
            current_best: format_pace(&prediction.current_best_pace),
            predicted_pace: format_pace(&prediction.predicted_pace),
            predicted_duration: format_duration(prediction.predicted_duration.value),
            improvement: prediction.improvement_percentage.round_dp(1).to_string(),
            confidence: format!(
                "{:.0} ({})",
                prediction.confidence_score, prediction.confidence_level
            ),
            momentum: prediction.momentum.to_string(),
            target_date: prediction.target_date.format("%Y-%m-%d").to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Tabled)]
struct WeekdayRow {
    #[tabled(rename = "Day")]
    day: String,
    #[tabled(rename = "Workouts")]
    count: usize,
    #[tabled(rename = "Share %")]
    share: String,
    #[tabled(rename = "Avg Pace")]
    average_pace: String,
    #[tabled(rename = "Avg Duration")]
    average_duration: String,
    #[tabled(rename = "Avg Distance")]
    average_distance: String,
}

#[derive(Debug, Clone, PartialEq, Tabled)]
struct BestDayRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Day")]
    day: String,
    #[tabled(rename = "Average")]
    average: String,
    #[tabled(rename = "Samples")]
    count: usize,
}

pub fn render_groups(analysis: &GroupAnalysis) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        format!("Workout groups by {}", analysis.request.dimension)
            .cyan()
            .bold()
    ));

    if analysis.outcome.is_empty() {
        out.push_str(&format!("{}\n", "No groups found".yellow()));
        return out;
    }

    let rows: Vec<GroupRow> = analysis
        .outcome
        .by_rank()
        .into_iter()
        .map(GroupRow::from_group)
        .collect();
    out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    out.push('\n');
    out.push_str(&format!(
        "{} eligible, {} grouped, {} skipped ({} missing a value)\n",
        analysis.outcome.eligible,
        analysis.outcome.total_members(),
        analysis.outcome.total_skipped(),
        analysis.outcome.missing_values
    ));
    out
}

pub fn render_predictions(analysis: &GroupAnalysis) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        format!("Predictions {} weeks ahead", analysis.request.weeks_ahead)
            .magenta()
            .bold()
    ));

    let rows: Vec<PredictionRow> = analysis
        .outcome
        .by_rank()
        .into_iter()
        .filter_map(PredictionRow::from_group)
        .collect();
    if rows.is_empty() {
        out.push_str(&format!(
            "{}\n",
            "No group has enough workouts for a prediction".yellow()
        ));
        return out;
    }

    out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    out.push('\n');
    out
}

pub fn render_weekly(stats: &WeeklyTrendStats) -> String {
    let pace_unit = stats.units.pace_unit();
    let distance_unit = stats.units.distance_unit();

    let rows: Vec<WeekdayRow> = stats
        .days
        .iter()
        .zip(&stats.distribution)
        .map(|(day, share)| WeekdayRow {
            day: day.day_name.clone(),
            count: day.count,
            share: format!("{:.1}", share.percentage),
            average_pace: optional(day.average_pace(), |p| {
                format_pace(&Quantity::new(p, pace_unit))
            }),
            average_duration: optional(day.average_duration(), format_duration),
            average_distance: optional(day.average_distance(), |d| {
                Quantity::new(d, distance_unit).to_string()
            }),
        })
        .collect();

    let best = |metric: &'static str, day: &BestDay, unit: Option<Unit>| BestDayRow {
        metric,
        day: day.day.clone(),
        average: if day.has_data() {
            match unit {
                Some(unit) => format_quantity(&Quantity::new(day.average, unit)),
                None => format_duration(day.average),
            }
        } else {
            "-".to_string()
        },
        count: day.count,
    };
    let best_rows = vec![
        best("Fastest pace", &stats.fastest_pace, Some(pace_unit)),
        best("Longest duration", &stats.longest_duration, None),
        best("Shortest duration", &stats.shortest_duration, None),
        best(
            "Highest elevation",
            &stats.highest_elevation,
            Some(stats.units.elevation_unit()),
        ),
        best("Furthest distance", &stats.furthest_distance, Some(distance_unit)),
    ];

    let mut out = String::new();
    out.push_str(&format!("{}\n", "Workouts by weekday".blue().bold()));
    out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    out.push('\n');
    out.push_str(&format!("{}\n", "Best days".blue().bold()));
    out.push_str(&Table::new(best_rows).with(Style::rounded()).to_string());
    out.push('\n');
    out
}

/// Everything written by a JSON export
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisExport<'a> {
    pub version: &'a RecordSetVersion,
    pub analysis: &'a GroupAnalysis,
    pub weekly: &'a WeeklyTrendStats,
}

pub fn export_json<P: AsRef<Path>>(export: &AnalysisExport<'_>, output_path: P) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, export)
        .with_context(|| format!("Failed to write JSON export: {}", path.display()))?;
    info!(path = %path.display(), "Exported analysis as JSON");
    Ok(())
}

/// Write one CSV row per group, in rank order
pub fn write_groups_csv<W: Write>(analysis: &GroupAnalysis, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for group in analysis.outcome.by_rank() {
        writer.serialize(GroupRow::from_group(group))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv<P: AsRef<Path>>(analysis: &GroupAnalysis, output_path: P) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    write_groups_csv(analysis, file)?;
    info!(path = %path.display(), "Exported groups as CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WorkoutAnalyzer;
    use crate::grouping::GroupingOptions;
    use crate::models::{Units, WorkoutRecord};
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};

    fn day(offset: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 4, 1, 6, 0, 0)
            .unwrap()
            + Duration::days(offset)
    }

    fn records() -> Vec<WorkoutRecord> {
        vec![
            WorkoutRecord::new("a", day(0), dec!(1500), dec!(5000)),
            WorkoutRecord::new("b", day(7), dec!(1470), dec!(5000)),
            WorkoutRecord::new("c", day(9), dec!(3300), dec!(10000)),
        ]
    }

    #[test]
    fn test_format_pace_and_duration() {
        let pace = Quantity::new(dec!(4.925), Unit::MinutesPerKilometer);
        assert_eq!(format_pace(&pace), "4:56 /km");
        assert_eq!(format_duration(dec!(1500)), "25:00");
        assert_eq!(format_duration(dec!(3723)), "1:02:03");
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_render_groups_lists_every_group() {
        let analysis = WorkoutAnalyzer::default().analyze(
            &records(),
            Dimension::Distance,
            &GroupingOptions::default(),
            4,
        );

        let rendered = render_groups(&analysis);
        assert!(rendered.contains("5 km (outdoor)"));
        assert!(rendered.contains("10 km (outdoor)"));
        assert!(rendered.contains("Most Common"));

        let predictions = render_predictions(&analysis);
        assert!(predictions.contains("5 km (outdoor)"));
        assert!(!predictions.contains("10 km (outdoor)"));
    }

    #[test]
    fn test_render_weekly() {
        let stats = WorkoutAnalyzer::new(Units::Metric, Default::default()).weekly(&records());
        let rendered = render_weekly(&stats);
        assert!(rendered.contains("Monday"));
        assert!(rendered.contains("Fastest pace"));
    }

    #[test]
    fn test_csv_rows() {
        let analysis = WorkoutAnalyzer::default().analyze(
            &records(),
            Dimension::Distance,
            &GroupingOptions::default(),
            4,
        );

        let mut buffer = Vec::new();
        write_groups_csv(&analysis, &mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();

        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("rank,frequency,group"));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_json_export() {
        let records = records();
        let analyzer = WorkoutAnalyzer::default();
        let analysis = analyzer.analyze(&records, Dimension::Pace, &GroupingOptions::default(), 4);
        let weekly = analyzer.weekly(&records);
        let version = RecordSetVersion::of(&records);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        export_json(
            &AnalysisExport {
                version: &version,
                analysis: &analysis,
                weekly: &weekly,
            },
            &path,
        )
        .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["version"], version.as_str());
        assert!(value["analysis"]["outcome"]["groups"].is_object());
        assert_eq!(value["weekly"]["distribution"].as_array().unwrap().len(), 7);
    }
}
