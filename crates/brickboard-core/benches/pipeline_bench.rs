//! Performance benchmarks for the analytics pipeline
//!
//! Stages are benchmarked separately and chained, over growing unit counts.

use brickboard_core::analytics::{
    aggregate, classify, project, ClassifyParams, ProjectionParams, SalesParams,
};
use brickboard_core::models::add_months;
use brickboard_core::{DashboardConfig, DashboardReport, SalesRecord, UsageRecord};
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// `units` mini-bricks, 20 suggestions each, 24 months of sales
fn generate_datasets(units: usize) -> (Vec<UsageRecord>, Vec<SalesRecord>) {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();

    let usage = (0..units)
        .flat_map(|u| {
            (0..20).map(move |i| UsageRecord {
                brick: format!("B{}", u / 4),
                mini_brick_code: format!("M{}", u),
                business_unit: "AZ_RESPI_INH".to_string(),
                content_type: Some(if i % 2 == 0 { "VAE" } else { "iDetail" }.to_string()),
                usage_count: u32::from(i < u % 21),
                month: add_months(start, (i % 12) as u32).unwrap(),
            })
        })
        .collect();

    let sales = (0..units)
        .flat_map(|u| {
            (0..24u32).map(move |m| SalesRecord {
                brick: format!("B{}", u / 4),
                mini_brick: format!("M{}", u),
                business_unit: "AZ_RESPI_INH".to_string(),
                product_name: "TRIXEO + IMP.".to_string(),
                month: add_months(start, m).unwrap(),
                sales: 100.0 + (u % 21) as f64 * m as f64,
            })
        })
        .collect();

    (usage, sales)
}

/// Benchmark 1: classify with varying unit counts
fn classify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let config = DashboardConfig::default();

    for units in [100, 1000, 5000] {
        let (usage, _) = generate_datasets(units);
        group.bench_with_input(BenchmarkId::new("units", units), &usage, |b, usage| {
            b.iter(|| {
                black_box(classify(usage, &ClassifyParams::from_config(&config)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark 2: aggregate + project on a fixed classification
fn sales_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_project");
    let config = DashboardConfig::default();

    for units in [100, 1000] {
        let (usage, sales) = generate_datasets(units);
        let classification = classify(&usage, &ClassifyParams::from_config(&config)).unwrap();
        group.bench_with_input(BenchmarkId::new("units", units), &sales, |b, sales| {
            b.iter(|| {
                let aggregation =
                    aggregate(&classification, sales, &SalesParams::from_config(&config)).unwrap();
                black_box(project(
                    &aggregation.low,
                    &aggregation.high,
                    &ProjectionParams::from_config(&config),
                ))
            });
        });
    }

    group.finish();
}

/// Benchmark 3: Full pipeline (DashboardReport::compute)
fn full_pipeline_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    let config = DashboardConfig::default();

    for units in [100, 1000] {
        let data = generate_datasets(units);
        group.bench_with_input(BenchmarkId::new("units", units), &data, |b, (usage, sales)| {
            b.iter(|| {
                black_box(DashboardReport::compute(&config, usage, sales).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    classify_benchmark,
    sales_benchmark,
    full_pipeline_benchmark
);
criterion_main!(benches);
