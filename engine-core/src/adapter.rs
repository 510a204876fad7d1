//! The adapter contract a game implements to be searched.

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use std::fmt::Debug;

use crate::record::{EvalStatus, MoveRecord};

/// The contract between a game and the search engines.
///
/// An adapter owns a mutable game position. Engines walk the game tree
/// by applying and reverting moves in place; `apply_move` followed by
/// `revert_move` with the same move must restore the position exactly,
/// including [`content_hash`](GameAdapter::content_hash). Engines
/// verify this when hash checking is enabled and treat a mismatch as a
/// fatal contract violation.
///
/// Clones must be fully independent positions: the Monte-Carlo engine
/// hands each worker thread its own clone.
pub trait GameAdapter: Clone + Send {
    /// The game's move representation. Equality is used to recognize
    /// the same move across sibling subtrees (killers, presorting).
    type Move: Clone + Debug + PartialEq + Send;

    /// The player to move, as a small opaque id.
    fn current_player(&self) -> u8;

    /// All legal moves for the player to move. Empty only when
    /// [`is_game_over`](GameAdapter::is_game_over) is true; an empty
    /// list in a live position is a fatal contract violation.
    fn list_legal_moves(&mut self) -> Vec<Self::Move>;

    fn apply_move(&mut self, mv: &Self::Move);

    /// Exact inverse of [`apply_move`](GameAdapter::apply_move).
    fn revert_move(&mut self, mv: &Self::Move);

    fn is_game_over(&mut self) -> bool;

    /// True when the finished game is drawn. Only meaningful when
    /// [`is_game_over`](GameAdapter::is_game_over) is true.
    fn is_draw(&mut self) -> bool {
        false
    }

    /// Final score for `player`, in [-1, 1]: 1 a win, -1 a loss, 0 a
    /// draw. Only meaningful in terminal positions; values outside the
    /// range are a fatal contract violation.
    fn normalized_score(&mut self, player: u8) -> f64;

    /// Heuristic value of the current position for `player`, higher is
    /// better. Won positions must dominate every quiet evaluation so
    /// move ordering puts proven wins first.
    fn static_evaluate(&mut self, player: u8) -> f64;

    /// A digest of the live position. Used purely as a consistency
    /// check around apply/revert pairs, never as a transposition key,
    /// so collisions only weaken error detection.
    fn content_hash(&mut self) -> u64;

    /// A pass-like move handing the turn to the opponent, for engines
    /// configured with null-move pruning. `None` (the default) means
    /// the game cannot express one.
    fn null_move(&mut self) -> Option<Self::Move> {
        None
    }

    /// One move of a random playout. The default draws uniformly from
    /// the legal moves; games can bias this toward plausible moves.
    fn random_playout_move(&mut self, rng: &mut ChaCha20Rng) -> Option<Self::Move> {
        let moves = self.list_legal_moves();
        if moves.is_empty() {
            None
        } else {
            let idx = rng.gen_range(0..moves.len());
            Some(moves[idx].clone())
        }
    }

    /// Translate an evaluated record into `for_player`'s perspective.
    /// The default negates across a player change, which is correct
    /// for two-player zero-sum games.
    fn rescore(&mut self, record: &MoveRecord<Self::Move>, for_player: u8) -> f64 {
        if record.player == for_player {
            record.evaluation
        } else {
            -record.evaluation
        }
    }

    /// Classify a just-evaluated, non-terminal move at `depth` plies
    /// into the search. The default stops at `max_depth`; adapters can
    /// return [`EvalStatus::EvaluatedContinue`] to extend forcing
    /// sequences past it.
    fn evaluation_status(&mut self, depth: usize, max_depth: usize) -> EvalStatus {
        if depth >= max_depth {
            EvalStatus::DepthLimited
        } else {
            EvalStatus::Evaluated
        }
    }

    /// Optionally prune a sorted candidate list before it is searched.
    /// Called with the list best-first; the default keeps everything.
    fn width_limit_moves(
        &mut self,
        _depth: usize,
        _max_depth: usize,
        _moves: &mut Vec<MoveRecord<Self::Move>>,
    ) {
    }

    /// Cap on random playout length before the playout is scored as
    /// neutral. Guards against games that can shuffle forever.
    fn playout_depth_limit(&self) -> usize {
        1000
    }
}
