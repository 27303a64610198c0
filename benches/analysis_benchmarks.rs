use chrono::{Duration, FixedOffset, TimeZone};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trendrs::analysis::{AnalysisCache, AnalysisRequest, WorkoutAnalyzer};
use trendrs::grouping::{GroupingEngine, GroupingOptions};
use trendrs::models::{Dimension, Environment, Units, WorkoutRecord};
use trendrs::weekly::WeeklyAggregator;

/// Benchmarks for the grouping and prediction pipeline
///
/// Dataset sizes cover a casual runner's year up to several years of daily training.

fn create_workout_history(count: usize) -> Vec<WorkoutRecord> {
    let first = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2022, 1, 1, 7, 0, 0)
        .unwrap();
    let distances = [dec!(5000), dec!(8000), dec!(10000), dec!(21097), dec!(5200)];

    (0..count)
        .map(|i| {
            let distance = distances[i % distances.len()];
            let seconds_per_km = Decimal::from(300 - (i % 60) as i64);
            WorkoutRecord::new(
                format!("bench-{}", i),
                first + Duration::hours(i as i64 * 30),
                seconds_per_km * distance / dec!(1000),
                distance,
            )
            .with_elevation(Decimal::from((i % 7) as i64 * 40 + 10))
            .with_environment(if i % 9 == 0 {
                Environment::Indoor
            } else {
                Environment::Outdoor
            })
        })
        .collect()
}

fn bench_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("Grouping");

    for &size in &[100, 1000, 10_000] {
        let records = create_workout_history(size);
        group.throughput(Throughput::Elements(size as u64));

        for dimension in Dimension::ALL {
            let engine = GroupingEngine::for_dimension(dimension, Units::Metric);
            group.bench_with_input(
                BenchmarkId::new(dimension.to_string(), size),
                &records,
                |b, records| {
                    b.iter(|| engine.group(black_box(records), &GroupingOptions::default()));
                },
            );
        }
    }

    group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("Analysis");
    let analyzer = WorkoutAnalyzer::default();

    for &size in &[100, 1000, 5000] {
        let records = create_workout_history(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("analyze_distance", size), &records, |b, records| {
            b.iter(|| {
                analyzer.analyze(
                    black_box(records),
                    Dimension::Distance,
                    &GroupingOptions::default(),
                    4,
                )
            });
        });
    }

    let records = create_workout_history(1000);
    let request = AnalysisRequest::new(Dimension::Distance);
    let mut cache = AnalysisCache::default();
    cache.get_or_compute(&analyzer, &records, &request);
    group.bench_function("cached_analyze_distance_1000", |b| {
        b.iter(|| cache.get_or_compute(&analyzer, black_box(&records), &request));
    });

    group.finish();
}

fn bench_weekly_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Weekly Aggregation");
    let aggregator = WeeklyAggregator::new(Units::Metric);

    for &size in &[100, 1000, 10_000] {
        let records = create_workout_history(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("aggregate_by_weekday", size), &records, |b, records| {
            b.iter(|| aggregator.aggregate_by_weekday(black_box(records)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_grouping,
    bench_full_analysis,
    bench_weekly_aggregation
);
criterion_main!(benches);
