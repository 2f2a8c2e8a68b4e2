use chrono::Duration;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lum_core::{
    AnalysisRequest, AnchorDate, BodyPair, CancellationToken, ClusterConfig, ClusterEngine, CycleProjector,
    DateRange, DetectorConfig, HarmonicDetector, HarmonicEvent, MeanElementsProvider, ProjectionSpec,
    ProjectorConfig, ReferenceFrame, Step, analyze, parse_instant,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn pairs() -> Vec<BodyPair> {
    ["sun-moon", "sun-mars", "venus-jupiter", "jupiter-saturn"]
        .iter()
        .map(|p| p.parse().unwrap())
        .collect()
}

fn bench_projection(c: &mut Criterion) {
    let provider = MeanElementsProvider::new();
    let anchor = AnchorDate::new(parse_instant("2024-01-01").unwrap(), "BENCH");
    let pairs = pairs();
    let spec = ProjectionSpec {
        anchor: &anchor,
        range: DateRange::around(anchor.instant, 180, 180).unwrap(),
        step: Step::daily(),
        pairs: &pairs,
        frame: ReferenceFrame::Geocentric,
    };
    let token = CancellationToken::new();

    let mut group = c.benchmark_group("project_year");
    for workers in [1usize, 4] {
        let projector = CycleProjector::new(ProjectorConfig { concurrency: workers });
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| projector.project(black_box(&spec), &provider, &token).unwrap())
        });
    }
    group.finish();
}

fn bench_detection(c: &mut Criterion) {
    let provider = MeanElementsProvider::new();
    let anchor = AnchorDate::new(parse_instant("2024-01-01").unwrap(), "BENCH");
    let pairs = pairs();
    let spec = ProjectionSpec {
        anchor: &anchor,
        range: DateRange::around(anchor.instant, 0, 365).unwrap(),
        step: Step::hours(1).unwrap(),
        pairs: &pairs,
        frame: ReferenceFrame::Geocentric,
    };
    let projection = CycleProjector::default()
        .project(&spec, &provider, &CancellationToken::new())
        .unwrap();
    let detector = HarmonicDetector::new(DetectorConfig::default());

    c.bench_function("detect_hourly_year", |b| {
        b.iter(|| detector.detect_all(black_box(&projection)))
    });
}

fn synthetic_events(n: usize) -> Vec<HarmonicEvent> {
    let mut rng = SmallRng::seed_from_u64(42);
    let start = parse_instant("2024-01-01").unwrap();
    let pairs = pairs();
    (0..n)
        .map(|_| {
            let target = 45.0 * rng.random_range(0..5) as f64;
            let miss: f64 = rng.random_range(0.0..1.0);
            HarmonicEvent {
                pair: pairs[rng.random_range(0..pairs.len())],
                harmonic_n: rng.random_range(2..=12),
                instant: start + Duration::minutes(rng.random_range(0..60 * 24 * 365)),
                target_angle: target,
                exact_angle: (target + miss).min(180.0),
                orb_delta: miss,
                days_from_anchor: 0.0,
            }
        })
        .collect()
}

fn bench_clustering(c: &mut Criterion) {
    let engine = ClusterEngine::new(ClusterConfig::default());
    let mut group = c.benchmark_group("cluster");
    for n in [1_000usize, 10_000] {
        let events = synthetic_events(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &events, |b, events| {
            b.iter(|| engine.cluster(black_box(events)))
        });
    }
    group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
    let provider = MeanElementsProvider::new();
    let anchor = AnchorDate::new(parse_instant("2024-01-01").unwrap(), "BENCH");
    let request = AnalysisRequest::new(anchor.clone(), DateRange::around(anchor.instant, 90, 90).unwrap(), pairs());
    let token = CancellationToken::new();

    c.bench_function("analyze_half_year", |b| {
        b.iter(|| analyze(black_box(&request), &provider, &token).unwrap())
    });
}

criterion_group!(
    benches,
    bench_projection,
    bench_detection,
    bench_clustering,
    bench_full_analysis
);
criterion_main!(benches);
