use std::{fmt::Write as _, path::Path};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use distsim::{
    apss::VectorCursor,
    codec::SourceBuilder,
    vector::EventsVectorSource,
    AllPairs, MeasureKind, ProductionFilter, Scorer, Strategy,
};

/// Entries with a Zipf-like spread of features, so that most pairs share
/// at least one common feature and a few share many.
fn write_events(path: &Path, entries: u32, features_per_entry: u32) {
    let mut text = String::new();
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    for entry in 0..entries {
        let mut feats: Vec<u32> = (0..features_per_entry)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let r = (state % 10_000) as f64 / 10_000.0;
                (r * r * 2_000.0) as u32
            })
            .collect();
        feats.sort_unstable();
        feats.dedup();
        for f in feats {
            let _ = writeln!(text, "{}\t{}\t{}", entry, f, 1 + f % 5);
        }
    }
    std::fs::write(path, text).expect("write events");
}

fn apss_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("events");
    write_events(&path, 400, 30);
    let opener = || -> distsim::Result<VectorCursor> { Ok(EventsVectorSource::new(SourceBuilder::new(&path).build()?)) };

    let mut group = c.benchmark_group("allpairs");
    group.sample_size(10);
    for strategy in [Strategy::Naive, Strategy::Inverted] {
        for threads in [1, 4] {
            let job = AllPairs::new(
                Scorer::new(MeasureKind::Cosine.build(), ProductionFilter::new(0.1, f64::INFINITY, false)),
                strategy,
            )
            .chunk_size(100)
            .threads(threads);
            group.bench_with_input(BenchmarkId::new(strategy.to_string(), threads), &threads, |b, _| {
                b.iter(|| job.run(&opener, &opener, Vec::new()).expect("allpairs"))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, apss_benchmark);
criterion_main!(benches);
