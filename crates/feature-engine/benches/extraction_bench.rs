//! Benchmarks for impedance feature extraction.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use num_complex::Complex64;
use std::f64::consts::PI;

use feature_engine::{FeatureConfig, FeatureExtractor, ResistanceInductance};

fn spectrum(bins: usize, resistance: f64, inductance: f64) -> (Vec<f64>, Vec<Complex64>) {
    let frequency: Vec<f64> = (1..=bins).map(|i| i as f64 * 2e3).collect();
    let impedance = frequency
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let r = resistance + (i as f64 * 0.1).sin();
            Complex64::new(r, inductance * 2.0 * PI * f)
        })
        .collect();
    (frequency, impedance)
}

fn benchmark_resistance_inductance(c: &mut Criterion) {
    let (frequency, impedance) = spectrum(100, 12.0, 3e-3);

    c.bench_function("resistance_inductance_100_bins", |b| {
        b.iter(|| ResistanceInductance::from_impedance(black_box(&frequency), black_box(&impedance)))
    });
}

fn benchmark_extract(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();

    let (frequency, target) = spectrum(100, 15.0, 3e-3);
    let (_, reference) = spectrum(100, 10.0, 2e-3);
    let target = ResistanceInductance::from_impedance(&frequency, &target).unwrap();
    let reference = ResistanceInductance::from_impedance(&frequency, &reference).unwrap();

    c.bench_function("extract_default_lists", |b| {
        b.iter(|| extractor.extract(black_box(&target), black_box(&reference)))
    });
}

criterion_group!(benches, benchmark_resistance_inductance, benchmark_extract);
criterion_main!(benches);
