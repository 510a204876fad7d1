//! End-to-end Monte-Carlo searches over tic-tac-toe.

use std::time::Instant;

use engine_core::{GameAdapter, SearchError};
use games_tictactoe::{TicTacToe, NOUGHT};
use mcts::{UctConfig, UctSearcher};

#[test]
fn immediate_win_is_decided_without_exhausting_the_budget() {
    // crosses win at square 2; the first visit to that child proves it
    let mut game = TicTacToe::from_marks("XX. OO. ...").unwrap();
    let searcher = UctSearcher::new(UctConfig::for_testing());
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 2);
    assert!(outcome.decided);
    assert!(
        outcome.playouts < 2_000,
        "a proven win should stop the search early, ran {}",
        outcome.playouts
    );
}

#[test]
fn blocks_the_immediate_threat() {
    // noughts to move; every move except blocking square 2 loses on
    // the spot
    let mut game = TicTacToe::from_marks("XX. O.X .O.").unwrap();
    assert_eq!(game.current_player(), NOUGHT);
    let searcher = UctSearcher::new(UctConfig::for_testing());
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 2);
}

#[test]
fn single_threaded_searches_are_deterministic() {
    let mut game = TicTacToe::from_marks("X.. .O. ...").unwrap();
    let searcher = UctSearcher::new(UctConfig::for_testing());
    let first = searcher.search(&mut game).unwrap();
    let second = searcher.search(&mut game).unwrap();
    assert_eq!(first.best, second.best);
    assert_eq!(first.playouts, second.playouts);
    let visits_a: Vec<i64> = first.moves.iter().map(|m| m.visits).collect();
    let visits_b: Vec<i64> = second.moves.iter().map(|m| m.visits).collect();
    assert_eq!(visits_a, visits_b);
}

#[test]
fn playouts_are_conserved_across_the_root() {
    let mut game = TicTacToe::new();
    let mut config = UctConfig::for_testing();
    config.only_child_optimization = false;
    config.dead_child_optimization = false;
    let searcher = UctSearcher::new(config);
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.playouts, 2_000);
    // every counted playout passes through exactly one root child
    let child_sum: i64 = outcome.moves.iter().map(|m| m.visits.abs()).sum();
    assert_eq!(child_sum as u64, outcome.playouts);
}

#[test]
fn threaded_search_finds_the_proven_win() {
    let mut game = TicTacToe::from_marks("XX. OO. ...").unwrap();
    let config = UctConfig::default()
        .with_threads(2)
        .with_time_budget(5.0)
        .with_playouts(0, 50_000)
        .with_seed(7);
    let searcher = UctSearcher::new(config);
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 2);
    assert!(outcome.decided);
}

#[test]
fn unmet_playout_floor_still_respects_the_hard_time_bound() {
    let mut game = TicTacToe::new();
    let config = UctConfig::default()
        .with_threads(0)
        .with_time_budget(0.2)
        .with_playouts(u64::MAX / 2, 0)
        .with_seed(1);
    let searcher = UctSearcher::new(config);
    let start = Instant::now();
    let outcome = searcher.search(&mut game).unwrap();
    let elapsed = start.elapsed().as_secs_f64();
    assert!(elapsed < 1.0, "search overran the hard bound: {elapsed}s");
    assert!(outcome.playouts > 0);
}

#[test]
fn single_legal_move_skips_the_search() {
    let mut game = TicTacToe::from_marks("XOX OXO OX.").unwrap();
    let searcher = UctSearcher::new(UctConfig::for_testing());
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 8);
    assert_eq!(outcome.playouts, 0);
    assert!(!outcome.decided);
}

#[test]
fn finished_game_is_an_error() {
    let mut game = TicTacToe::from_marks("XXX OO. ...").unwrap();
    let searcher = UctSearcher::new(UctConfig::for_testing());
    assert!(matches!(
        searcher.search(&mut game),
        Err(SearchError::NoLegalMoves)
    ));
}

#[test]
fn position_is_unchanged_after_the_search() {
    let mut game = TicTacToe::from_marks("X.O .O. ..X").unwrap();
    let before = game.clone();
    let searcher = UctSearcher::new(UctConfig::for_testing());
    searcher.search(&mut game).unwrap();
    assert_eq!(game, before);
}

#[test]
fn blitz_mode_agrees_on_the_obvious_move() {
    let mut game = TicTacToe::from_marks("XX. O.X .O.").unwrap();
    let searcher = UctSearcher::new(UctConfig::for_testing().with_blitz(true));
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 2);
}

#[test]
fn sorted_expansion_still_picks_the_win() {
    let mut game = TicTacToe::from_marks("XX. OO. ...").unwrap();
    let searcher = UctSearcher::new(
        UctConfig::for_testing().with_sorted_children(2, 4.0),
    );
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 2);
    assert!(outcome.decided);
}

/// Two-ply game with a single forced reply to each opening: the reply
/// to move 0 loses for the replier, the reply to move 1 wins for the
/// replier (both win when `hopeless`). Scores are only defined once
/// the game has ended, so any engine that scores a live position
/// trips the adapter contract.
#[derive(Clone, Debug, PartialEq)]
struct ForcedReply {
    played: Vec<u8>,
    hopeless: bool,
}

impl ForcedReply {
    fn new() -> Self {
        ForcedReply {
            played: Vec::new(),
            hopeless: false,
        }
    }

    fn lost() -> Self {
        ForcedReply {
            played: Vec::new(),
            hopeless: true,
        }
    }
}

impl GameAdapter for ForcedReply {
    type Move = u8;

    fn current_player(&self) -> u8 {
        (self.played.len() % 2) as u8 + 1
    }

    fn list_legal_moves(&mut self) -> Vec<u8> {
        match self.played.len() {
            0 => vec![0, 1],
            1 => vec![0],
            _ => Vec::new(),
        }
    }

    fn apply_move(&mut self, mv: &u8) {
        self.played.push(*mv);
    }

    fn revert_move(&mut self, _mv: &u8) {
        self.played.pop();
    }

    fn is_game_over(&mut self) -> bool {
        self.played.len() >= 2
    }

    fn normalized_score(&mut self, player: u8) -> f64 {
        if self.played.len() < 2 {
            return f64::NAN;
        }
        let second_wins = self.hopeless || self.played[0] == 1;
        if (player == 2) == second_wins {
            1.0
        } else {
            -1.0
        }
    }

    fn static_evaluate(&mut self, _player: u8) -> f64 {
        0.0
    }

    fn content_hash(&mut self) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for &mv in &self.played {
            hash ^= u64::from(mv) + 1;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

#[test]
fn propagated_win_is_scored_from_its_record() {
    // move 0's win is proven one level up, never at a finished
    // position, so its value must come from the stored record
    let mut game = ForcedReply::new();
    let searcher = UctSearcher::new(
        UctConfig::for_testing().with_sorted_children(2, 0.0),
    );
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 0);
    assert!(outcome.decided);
    assert_eq!(game, ForcedReply::new());
}

#[test]
fn propagated_loss_is_released_from_the_tree() {
    let mut game = ForcedReply::new();
    let mut config = UctConfig::for_testing().with_sorted_children(2, 0.0);
    config.only_child_optimization = false;
    let searcher = UctSearcher::new(config);
    let outcome = searcher.search(&mut game).unwrap();
    assert_eq!(outcome.best, 0);
    let losing = outcome
        .moves
        .iter()
        .find(|m| m.payload == 1)
        .expect("losing move is still reported");
    assert!(losing.game_over);
    assert!(losing.evaluation <= -0.999);
    assert!(!losing.alive);
}

#[test]
fn fully_lost_root_still_returns_a_move() {
    let mut game = ForcedReply::lost();
    let searcher = UctSearcher::new(
        UctConfig::for_testing().with_sorted_children(2, 0.0),
    );
    let outcome = searcher.search(&mut game).unwrap();
    assert!(outcome.best == 0 || outcome.best == 1);
    assert!(!outcome.decided);
    assert!(outcome
        .moves
        .iter()
        .all(|m| m.game_over && m.evaluation <= -0.999 && !m.alive));
}
