//! Decoding benchmarks for provider responses.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use awery_bridge::extensions::codec::decode_list;
use awery_bridge::extensions::{FromGuest, GuestValue};
use awery_bridge::models::{CatalogEpisode, CatalogMedia, SearchResults};

fn media_page(count: usize) -> GuestValue {
    let items: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "id": i.to_string(),
                "titles": [format!("Title {i}"), format!("Alt {i}")],
                "poster": { "large": format!("https://img.example/{i}.jpg") },
                "status": "ongoing",
                "type": "tv",
                "genres": ["Action", "Fantasy"],
                "tags": [{ "name": "Magic", "isSpoiler": false }],
                "averageScore": 8.2,
                "episodesCount": 24,
                "releaseDate": 1_700_000_000_000_i64,
            })
        })
        .collect();
    GuestValue::from(json!({ "items": items, "hasNextPage": true }))
}

fn episode_list(count: usize) -> GuestValue {
    let items: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "title": format!("Episode {i}"),
                "url": format!("https://video.example/{i}"),
                "number": i
            })
        })
        .collect();
    GuestValue::from(json!(items))
}

/// Benchmark search response decoding at several page sizes.
fn bench_search_results(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_search_results");

    for size in [10, 50, 200] {
        let page = media_page(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &page, |b, page| {
            b.iter(|| black_box(SearchResults::<CatalogMedia>::from_guest(black_box(page))))
        });
    }

    group.finish();
}

/// Benchmark episode list decoding.
fn bench_episodes(c: &mut Criterion) {
    let list = episode_list(500);

    c.bench_function("decode_episodes_500", |b| {
        b.iter(|| black_box(decode_list::<CatalogEpisode>(black_box(&list), "episode")))
    });
}

criterion_group!(benches, bench_search_results, bench_episodes);
criterion_main!(benches);
