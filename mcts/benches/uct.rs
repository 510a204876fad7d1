//! UCT searcher benchmarks.
//!
//! Run with: `cargo bench -p mcts`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use games_tictactoe::TicTacToe;
use mcts::{UctConfig, UctSearcher};

fn bench_playout_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("uct_playouts");
    for playouts in [200u64, 500, 1_000, 2_000] {
        group.throughput(Throughput::Elements(playouts));
        group.bench_with_input(
            BenchmarkId::new("inline", playouts),
            &playouts,
            |b, &playouts| {
                let config = UctConfig::default()
                    .with_threads(0)
                    .with_time_budget(60.0)
                    .with_playouts(playouts, playouts)
                    .with_seed(42);
                let searcher = UctSearcher::new(config);
                b.iter(|| {
                    let mut game = TicTacToe::new();
                    black_box(searcher.search(&mut game).unwrap())
                });
            },
        );
    }
    group.finish();
}

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("uct_threads");
    for threads in [1usize, 2, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &threads| {
                let config = UctConfig::default()
                    .with_threads(threads)
                    .with_time_budget(60.0)
                    .with_playouts(0, 5_000)
                    .with_seed(42);
                let searcher = UctSearcher::new(config);
                b.iter(|| {
                    let mut game = TicTacToe::new();
                    black_box(searcher.search(&mut game).unwrap())
                });
            },
        );
    }
    group.finish();
}

fn bench_blitz_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("uct_blitz");
    for blitz in [false, true] {
        let name = if blitz { "clone" } else { "unwind" };
        group.bench_function(name, |b| {
            let config = UctConfig::default()
                .with_threads(0)
                .with_time_budget(60.0)
                .with_playouts(1_000, 1_000)
                .with_seed(42)
                .with_blitz(blitz);
            let searcher = UctSearcher::new(config);
            b.iter(|| {
                let mut game = TicTacToe::new();
                black_box(searcher.search(&mut game).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_playout_counts,
    bench_thread_scaling,
    bench_blitz_mode
);
criterion_main!(benches);
