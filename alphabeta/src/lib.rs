//! Iterative-deepening alpha-beta search.
//!
//! # Overview
//!
//! A depth-limited minimax searcher with alpha-beta pruning over any
//! [`engine_core::GameAdapter`]. The search state lives in an explicit
//! frame stack rather than the call stack, so a controlling thread can
//! watch progress, abort at a deadline, and fall back to the last
//! fully completed progressive level.
//!
//! Features, all configurable through [`AlphaBetaConfig`]:
//! - progressive deepening under a time budget, with projected-overrun
//!   aborts and fallback to the previous level
//! - killer heuristics: cousin evaluations reused for move ordering
//! - null-move refutations promoted into sibling move ordering
//! - randomized selection among the top N near-equal root moves
//! - content-hash verification of every apply/revert pair
//!
//! # Usage
//!
//! ```ignore
//! use alphabeta::{AlphaBetaConfig, AlphaBetaSearch};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//!
//! let mut searcher = AlphaBetaSearch::new(AlphaBetaConfig::default().with_max_depth(6));
//! let mut rng = ChaCha20Rng::seed_from_u64(42);
//! let outcome = searcher.find_best_move(&mut game, &mut rng)?;
//! println!("best: {:?} = {}", outcome.best.payload, outcome.best.evaluation);
//! ```

pub mod config;
mod frame;
pub mod search;

pub use config::AlphaBetaConfig;
pub use search::{AlphaBetaSearch, SearchOutcome, SearchStats};
