//! Search benchmarks.
//!
//! Run with: `cargo bench -p omok-mcts`
//!
//! Measures playout throughput with the uniform evaluator, the pattern
//! scanner on a mid-game board, and root expansion cost.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use omok_board::{Color, GameState};
use omok_mcts::{patterns, PassFlags, SearchConfig, UctSearch, UniformEvaluator};

/// A quiet mid-game position: stones scattered without runs.
fn midgame_state() -> GameState {
    let mut state = GameState::new(19, 6.5).unwrap();
    let stones = [
        (3, 3),
        (15, 15),
        (3, 15),
        (15, 3),
        (9, 3),
        (9, 15),
        (3, 9),
        (15, 9),
        (7, 7),
        (11, 11),
    ];
    for &(x, y) in &stones {
        let v = state.board().get_vertex(x, y);
        state.play_move(v).unwrap();
    }
    state
}

fn bench_playouts(c: &mut Criterion) {
    let mut group = c.benchmark_group("playouts");

    for playouts in [100u32, 400] {
        group.throughput(Throughput::Elements(playouts as u64));
        group.bench_with_input(
            BenchmarkId::new("uniform", playouts),
            &playouts,
            |b, &playouts| {
                b.iter(|| {
                    let mut config = SearchConfig::default()
                        .with_playouts(playouts)
                        .with_threads(1)
                        .with_seed(42);
                    config.quiet = true;
                    let mut search = UctSearch::new(
                        midgame_state(),
                        Arc::new(UniformEvaluator::new()),
                        config,
                    );
                    black_box(search.think(Color::Black, PassFlags::NONE).unwrap())
                });
            },
        );
    }

    group.finish();
}

fn bench_pattern_scan(c: &mut Criterion) {
    let state = midgame_state();
    let board = state.board();
    let vertex = board.get_vertex(9, 9);

    c.bench_function("pattern_scan", |b| {
        b.iter(|| {
            black_box(patterns::scan(
                black_box(board),
                black_box(vertex),
                Color::Black,
            ))
        });
    });
}

fn bench_full_board_scan(c: &mut Criterion) {
    let state = midgame_state();
    let board = state.board();

    c.bench_function("full_board_scan", |b| {
        b.iter(|| {
            let mut forcing = 0u32;
            for y in 0..19 {
                for x in 0..19 {
                    let v = board.get_vertex(x, y);
                    if patterns::scan(board, v, Color::Black).is_forcing() {
                        forcing += 1;
                    }
                }
            }
            black_box(forcing)
        });
    });
}

criterion_group!(benches, bench_playouts, bench_pattern_scan, bench_full_board_scan);
criterion_main!(benches);
