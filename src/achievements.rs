//! All-time bests across a fetched workout history
//!
//! Flags are recomputed from scratch for the whole set on every fetch. When several
//! workouts share a best value, the one that appears first keeps the flag.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{Achievements, WorkoutRecord};
use crate::quantity::Unit;

/// Index of the first record with the extremal key, if any record has one
fn first_extreme<F>(records: &[WorkoutRecord], key: F, lower_is_better: bool) -> Option<usize>
where
    F: Fn(&WorkoutRecord) -> Option<Decimal>,
{
    let mut best: Option<(usize, Decimal)> = None;
    for (index, record) in records.iter().enumerate() {
        let Some(value) = key(record) else {
            continue;
        };
        let replaces = best.map_or(true, |(_, current)| {
            if lower_is_better {
                value < current
            } else {
                value > current
            }
        });
        if replaces {
            best = Some((index, value));
        }
    }
    best.map(|(index, _)| index)
}

/// Whole-kilometer distance class of a record
fn distance_class(record: &WorkoutRecord) -> i64 {
    record
        .distance
        .value_in(Unit::Kilometers)
        .ok()
        .and_then(|km| km.floor().to_i64())
        .unwrap_or(0)
}

/// Recompute achievement flags for every record in place
pub fn annotate(records: &mut [WorkoutRecord]) {
    for record in records.iter_mut() {
        record.achievements = Achievements::default();
    }

    let pace = |r: &WorkoutRecord| r.pace.map(|p| p.value);
    let duration = |r: &WorkoutRecord| {
        let seconds = r.duration_seconds();
        (seconds > Decimal::ZERO).then_some(seconds)
    };
    let distance = |r: &WorkoutRecord| (r.distance.value > Decimal::ZERO).then_some(r.distance.value);
    let elevation = |r: &WorkoutRecord| {
        r.elevation_gain
            .map(|e| e.value)
            .filter(|value| *value > Decimal::ZERO)
    };

    if let Some(index) = first_extreme(records, pace, true) {
        records[index].achievements.all_time_fastest = true;
    }
    if let Some(index) = first_extreme(records, duration, false) {
        records[index].achievements.all_time_longest = true;
    }
    if let Some(index) = first_extreme(records, distance, false) {
        records[index].achievements.all_time_furthest = true;
    }
    if let Some(index) = first_extreme(records, elevation, false) {
        records[index].achievements.highest_elevation = true;
    }

    // Personal best pace per whole-kilometer class
    let mut class_bests: BTreeMap<i64, (usize, Decimal)> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let Some(value) = pace(record) else {
            continue;
        };
        class_bests
            .entry(distance_class(record))
            .and_modify(|best| {
                if value < best.1 {
                    *best = (index, value);
                }
            })
            .or_insert((index, value));
    }
    for (class, (index, _)) in &class_bests {
        debug!(class_km = class, record = %records[*index].id, "Personal best pace");
        records[*index].achievements.personal_best_pace = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};
    use rust_decimal_macros::dec;

    fn day(offset: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 6, 0, 0)
            .unwrap()
            + Duration::days(offset)
    }

    fn run(id: &str, offset: i64, km: Decimal, minutes: Decimal) -> WorkoutRecord {
        WorkoutRecord::new(id, day(offset), minutes * dec!(60), km * dec!(1000))
    }

    fn find<'a>(records: &'a [WorkoutRecord], id: &str) -> &'a Achievements {
        &records.iter().find(|r| r.id == id).unwrap().achievements
    }

    #[test]
    fn test_all_time_flags() {
        let mut records = vec![
            run("easy", 0, dec!(5), dec!(30)),
            run("tempo", 1, dec!(5), dec!(22)),
            run("long", 2, dec!(21), dec!(120)).with_elevation(dec!(250)),
            run("hills", 3, dec!(8), dec!(48)).with_elevation(dec!(400)),
        ];

        annotate(&mut records);

        assert!(find(&records, "tempo").all_time_fastest);
        assert!(find(&records, "long").all_time_longest);
        assert!(find(&records, "long").all_time_furthest);
        assert!(find(&records, "hills").highest_elevation);
        assert!(!find(&records, "easy").any());
    }

    #[test]
    fn test_personal_best_per_distance_class() {
        let mut records = vec![
            run("5k_slow", 0, dec!(5.0), dec!(30)),
            run("5k_fast", 1, dec!(5.4), dec!(26)),
            run("10k", 2, dec!(10), dec!(55)),
        ];

        annotate(&mut records);

        assert!(find(&records, "5k_fast").personal_best_pace);
        assert!(!find(&records, "5k_slow").personal_best_pace);
        assert!(find(&records, "10k").personal_best_pace);
    }

    #[test]
    fn test_ties_keep_first_record() {
        let mut records = vec![
            run("first", 0, dec!(5), dec!(25)),
            run("second", 1, dec!(5), dec!(25)),
        ];

        annotate(&mut records);

        assert!(find(&records, "first").all_time_fastest);
        assert!(!find(&records, "second").all_time_fastest);
        assert!(!find(&records, "second").personal_best_pace);
    }

    #[test]
    fn test_annotate_resets_stale_flags() {
        let mut records = vec![run("a", 0, dec!(5), dec!(25)), run("b", 1, dec!(5), dec!(20))];
        records[0].achievements.all_time_fastest = true;

        annotate(&mut records);

        assert!(!records[0].achievements.all_time_fastest);
        assert!(records[1].achievements.all_time_fastest);
    }
}
