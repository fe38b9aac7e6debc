// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths of an analysis pass:
//   1. Pattern extraction over the recent window
//   2. Local insight generation and merging
//   3. Suggestion ranking
//   4. State snapshot serialization (runs on every record)

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nexus_echo::echo::event_log::EventLog;
use nexus_echo::echo::insights::{local_insights, merge_insights};
use nexus_echo::echo::patterns::extract_patterns;
use nexus_echo::echo::publisher::PersistedState;
use nexus_echo::echo::suggestions::rank_suggestions;
use nexus_echo::echo::types::{EchoState, NewInteraction};

// ─── Helpers ────────────────────────────────────────────────────────────────

const MODULES: [&str; 6] = ["studio", "library", "export", "billing", "team", "agents"];

/// A log of `n` interactions that navigates between modules every few steps.
fn build_log(n: usize) -> EventLog {
    let mut log = EventLog::new();
    for i in 0..n {
        let module = MODULES[(i / 3 + i % 2) % MODULES.len()];
        let action = match i % 4 {
            0 => "navigate",
            1 => "edit",
            2 => "open",
            _ => "export",
        };
        log.append(NewInteraction::new(module, action).context("step", i as u64));
    }
    log
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_patterns(c: &mut Criterion) {
    let mut group = c.benchmark_group("patterns");
    let small = build_log(100);
    let large = build_log(1000);

    group.bench_function("extract_window_100", |b| {
        b.iter(|| extract_patterns(black_box(small.entries()), 100, 10))
    });

    group.bench_function("extract_window_100_of_1000", |b| {
        b.iter(|| extract_patterns(black_box(large.entries()), 100, 10))
    });

    group.finish();
}

fn bench_insights(c: &mut Criterion) {
    let mut group = c.benchmark_group("insights");
    let log = build_log(1000);
    let patterns = extract_patterns(log.entries(), 100, 10);

    group.bench_function("local_insights_1000", |b| {
        b.iter(|| local_insights(black_box(&patterns), black_box(&log), Utc::now()))
    });

    group.bench_function("merge_into_full_list", |b| {
        let mut existing = Vec::new();
        for _ in 0..25 {
            merge_insights(&mut existing, local_insights(&patterns, &log, Utc::now()), 50);
        }
        b.iter(|| {
            let mut list = existing.clone();
            merge_insights(&mut list, local_insights(&patterns, &log, Utc::now()), 50);
            list
        })
    });

    group.finish();
}

fn bench_suggestions(c: &mut Criterion) {
    let log = build_log(1000);
    let patterns = extract_patterns(log.entries(), 100, 10);
    let insights = local_insights(&patterns, &log, Utc::now());

    c.bench_function("rank_suggestions", |b| {
        b.iter(|| rank_suggestions(black_box("studio"), &[], &patterns, &insights, 5))
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let log = build_log(1000);
    let state = EchoState {
        total_interactions: 1000,
        patterns: extract_patterns(log.entries(), 100, 10),
        ..EchoState::default()
    };

    c.bench_function("persist_snapshot_1000", |b| {
        b.iter(|| {
            PersistedState::capture(black_box(&state), log.entries(), 1000)
                .to_blob()
                .map(|blob| blob.len())
        })
    });
}

criterion_group!(
    benches,
    bench_patterns,
    bench_insights,
    bench_suggestions,
    bench_snapshot
);
criterion_main!(benches);
