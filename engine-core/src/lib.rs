//! Core contracts shared by the search engines.
//!
//! # Overview
//!
//! This crate defines the boundary between a game and the engines that
//! search it. A game plugs in by implementing [`GameAdapter`]; the
//! `alphabeta` and `mcts` crates drive that adapter without knowing
//! anything about the rules behind it.
//!
//! ```text
//! ┌────────────┐     GameAdapter      ┌───────────────┐
//! │ alphabeta  │ ──────────────────►  │               │
//! └────────────┘   list_legal_moves   │  your game    │
//! ┌────────────┐   apply/revert_move  │  (board +     │
//! │    mcts    │ ──────────────────►  │   rules)      │
//! └────────────┘   static_evaluate    └───────────────┘
//! ```
//!
//! Besides the adapter trait, the crate provides [`MoveRecord`], the
//! per-move annotation both engines attach to candidate moves, and
//! [`SearchError`], the shared error taxonomy.

pub mod adapter;
pub mod error;
pub mod record;

pub use adapter::GameAdapter;
pub use error::SearchError;
pub use record::{EvalStatus, MoveRecord};
