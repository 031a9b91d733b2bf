//! # curator Performance Benchmarks
//!
//! ## Benchmark Categories
//!
//! - **Alignment**: every strategy over albums of increasing size
//! - **Selection parsing**: short and long selection expressions
//! - **Catalog**: track fetches from an imported SQLite catalog
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench alignment
//! cargo bench selection
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::path::PathBuf;

use curator::align::{align, title_similarity, AlignStrategy};
use curator::catalog::SqliteCatalog;
use curator::model::{LocalTrack, RemoteTrack, TagSnapshot};
use curator::provider::Provider;
use curator::range::parse_selection;

/// An album of `count` tracks: files named after titles, durations shuffled
/// slightly so duration matching has real work to do.
fn create_album(count: usize) -> (Vec<LocalTrack>, Vec<RemoteTrack>) {
    let local = (1..=count)
        .map(|i| {
            let tags = TagSnapshot {
                track_number: (i % 4 != 0).then_some(i as u32),
                ..Default::default()
            };
            LocalTrack::from_snapshot(
                PathBuf::from(format!("/music/album/{i:02} - Song Number {i}.flac")),
                tags,
                180_000 + (i as u64 * 7_919) % 60_000,
            )
        })
        .collect();
    let remote = (1..=count)
        .map(|i| RemoteTrack {
            id: format!("t{i}"),
            ordinal: i,
            disc_number: None,
            track_number: Some(i as u32),
            title: format!("Song Number {i}"),
            duration_ms: 180_000 + (i as u64 * 7_919) % 60_000 + 500,
        })
        .collect();
    (local, remote)
}

fn benchmark_alignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("alignment");

    for size in [10, 30, 100] {
        let album = create_album(size);
        for strategy in AlignStrategy::ALL {
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), size),
                &album,
                |b, (local, remote)| b.iter(|| align(black_box(local), black_box(remote), strategy, false)),
            );
        }
    }

    group.bench_function("title_similarity", |b| {
        b.iter(|| title_similarity(black_box("03 - Halleluhwah (Live)"), black_box("Halleluhwah")))
    });

    group.finish();
}

fn benchmark_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    group.bench_function("short", |b| b.iter(|| parse_selection(black_box("1..3,5"), black_box(10))));

    let long = (1..=200).map(|i| format!("{}-{}", i * 3, i * 3 + 2)).collect::<Vec<_>>().join(",");
    group.bench_function("long", |b| b.iter(|| parse_selection(black_box(&long), black_box(1_000))));

    group.finish();
}

fn benchmark_catalog(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");

    let tracks = (1..=40)
        .map(|i| format!(r#"{{"title": "Track {i}", "duration_ms": {}, "number": {i}}}"#, i * 1000))
        .collect::<Vec<_>>()
        .join(",");
    let document = format!(
        r#"{{"artists": [{{"id": "a1", "name": "Artist", "releases": [{{"id": "r1", "title": "Album", "year": 2000, "tracks": [{tracks}]}}]}}]}}"#
    );
    let mut catalog = SqliteCatalog::open_in_memory().expect("Failed to open catalog");
    catalog.import_json(&document).expect("Failed to import catalog");

    group.bench_function("tracks_40", |b| b.iter(|| catalog.tracks(black_box("r1"))));

    group.finish();
}

criterion_group!(benches, benchmark_alignment, benchmark_selection, benchmark_catalog);
criterion_main!(benches);
