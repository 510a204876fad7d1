//! Multi-threaded Monte-Carlo tree search.
//!
//! # Overview
//!
//! A UCT searcher over any [`engine_core::GameAdapter`]. Worker
//! threads share one tree of lock-free visit and win counters, each
//! descending by upper confidence bound, expanding leaves once their
//! visit counts earn it, and scoring random playouts back up the path.
//! A coordinating thread watches progress and stops the search at the
//! time budget, the playout ceiling, a proven win at the root, or a
//! stall.
//!
//! Notable behaviors, all configurable through [`UctConfig`]:
//! - expansion throttling: deep leaves only expand after enough visits,
//!   keeping the tree's memory proportional to where playouts go
//! - hopeless branches are pruned mid-search when they can no longer
//!   catch the leader in the playouts that remain
//! - a proven winning move collapses its parent to an only child, and
//!   at the root ends the search immediately
//! - `threads: 0` runs playouts inline on the caller, deterministic
//!   for a fixed seed
//!
//! # Usage
//!
//! ```ignore
//! use mcts::{UctConfig, UctSearcher};
//!
//! let searcher = UctSearcher::new(UctConfig::default().with_time_budget(1.0));
//! let outcome = searcher.search(&mut game)?;
//! println!("best: {:?} ({:.3} over {} visits)",
//!     outcome.best, outcome.win_rate, outcome.visits);
//! ```

pub mod config;
pub mod node;
pub mod search;
mod worker;

pub use config::UctConfig;
pub use node::ChildStat;
pub use search::{UctOutcome, UctSearcher};
