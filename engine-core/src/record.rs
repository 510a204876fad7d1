//! Per-move annotations shared by the engines.
//!
//! A [`MoveRecord`] wraps a game move with the bookkeeping a search
//! attaches to it: evaluations, terminal flags, and the best
//! continuation found below it, which chains records into a principal
//! variation.

use std::cmp::Ordering;

/// How far a move's evaluation can be trusted, and whether the search
/// should look below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStatus {
    /// Not yet statically evaluated.
    NotEvaluated,
    /// Statically evaluated; deeper search is allowed.
    Evaluated,
    /// Evaluated, and the adapter asks for deeper search even past the
    /// nominal depth limit (forcing sequences).
    EvaluatedContinue,
    /// Evaluated and the position is a proven draw.
    EvaluatedDrawn,
    /// The depth limit was reached; the evaluation is a leaf estimate.
    DepthLimited,
    /// Depth limited, but flagged by the adapter as still unstable.
    DepthLimitedContinue,
}

impl EvalStatus {
    /// True when the search may expand below a move with this status.
    pub fn search_deeper(self) -> bool {
        matches!(
            self,
            EvalStatus::NotEvaluated | EvalStatus::Evaluated | EvalStatus::EvaluatedContinue
        )
    }
}

/// A candidate move plus everything a search learned about it.
#[derive(Debug, Clone)]
pub struct MoveRecord<M> {
    /// The game move itself.
    pub payload: M,
    /// The player making the move.
    pub player: u8,
    /// Evaluation used for ordering and selection. NaN until set.
    /// May be borrowed from a cousin node by the killer heuristic.
    pub evaluation: f64,
    /// The move's own static evaluation. NaN until set, and reset to
    /// NaN to flag an evaluation borrowed from elsewhere.
    pub local_evaluation: f64,
    pub status: EvalStatus,
    /// The move ends the game.
    pub game_over: bool,
    /// A pass-like move injected for null-move pruning.
    pub is_null: bool,
    /// Best reply found below this move; chains into the PV.
    pub best_continuation: Option<Box<MoveRecord<M>>>,
}

impl<M> MoveRecord<M> {
    pub fn new(payload: M, player: u8) -> Self {
        MoveRecord {
            payload,
            player,
            evaluation: f64::NAN,
            local_evaluation: f64::NAN,
            status: EvalStatus::NotEvaluated,
            game_over: false,
            is_null: false,
            best_continuation: None,
        }
    }

    pub fn null(payload: M, player: u8) -> Self {
        let mut m = MoveRecord::new(payload, player);
        m.is_null = true;
        m.status = EvalStatus::Evaluated;
        m
    }

    #[inline]
    pub fn search_deeper(&self) -> bool {
        self.status.search_deeper()
    }

    #[inline]
    pub fn is_drawn(&self) -> bool {
        self.status == EvalStatus::EvaluatedDrawn
    }

    /// Evaluation and terminal flags in one assignment.
    pub fn set_evaluations(&mut self, value: f64, status: EvalStatus, game_over: bool) {
        self.evaluation = value;
        self.local_evaluation = value;
        self.status = status;
        self.game_over = game_over;
    }

    /// The moves of the principal variation, this move included.
    pub fn principal_variation(&self) -> Vec<&M> {
        let mut pv = Vec::new();
        let mut cur = Some(self);
        while let Some(m) = cur {
            pv.push(&m.payload);
            cur = m.best_continuation.as_deref();
        }
        pv
    }

    /// Ordering used when presenting evaluated moves: proven endings
    /// first, then by evaluation, best first.
    pub fn cmp_by_strength(&self, other: &Self) -> Ordering {
        other
            .game_over
            .cmp(&self.game_over)
            .then(total_cmp_desc(self.evaluation, other.evaluation))
    }

    /// Ordering used while searching: leaves (terminal or depth
    /// limited) first so they are folded in cheaply, then by
    /// evaluation.
    pub fn cmp_for_search(&self, other: &Self) -> Ordering {
        let self_leaf = self.game_over || !self.search_deeper();
        let other_leaf = other.game_over || !other.search_deeper();
        other_leaf
            .cmp(&self_leaf)
            .then(total_cmp_desc(self.evaluation, other.evaluation))
    }
}

// Descending, NaN last. `f64::total_cmp` would put NaN before +inf on
// the reversed order, which is not what move sorting wants.
fn total_cmp_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_search_deeper() {
        assert!(EvalStatus::NotEvaluated.search_deeper());
        assert!(EvalStatus::Evaluated.search_deeper());
        assert!(EvalStatus::EvaluatedContinue.search_deeper());
        assert!(!EvalStatus::EvaluatedDrawn.search_deeper());
        assert!(!EvalStatus::DepthLimited.search_deeper());
        assert!(!EvalStatus::DepthLimitedContinue.search_deeper());
    }

    #[test]
    fn new_record_is_unevaluated() {
        let r = MoveRecord::new(3u8, 1);
        assert!(r.evaluation.is_nan());
        assert!(r.local_evaluation.is_nan());
        assert_eq!(r.status, EvalStatus::NotEvaluated);
        assert!(!r.game_over);
        assert!(!r.is_null);
    }

    #[test]
    fn pv_chains_through_continuations() {
        let mut a = MoveRecord::new(1u8, 1);
        let mut b = MoveRecord::new(2u8, 2);
        let c = MoveRecord::new(3u8, 1);
        b.best_continuation = Some(Box::new(c));
        a.best_continuation = Some(Box::new(b));
        let pv: Vec<u8> = a.principal_variation().into_iter().copied().collect();
        assert_eq!(pv, vec![1, 2, 3]);
    }

    #[test]
    fn strength_order_puts_endings_first() {
        let mut win = MoveRecord::new(0u8, 1);
        win.set_evaluations(1.0, EvalStatus::Evaluated, true);
        let mut quiet = MoveRecord::new(1u8, 1);
        quiet.set_evaluations(5.0, EvalStatus::Evaluated, false);
        assert_eq!(win.cmp_by_strength(&quiet), Ordering::Less);
    }

    #[test]
    fn search_order_puts_leaves_first_and_nan_last() {
        let mut leaf = MoveRecord::new(0u8, 1);
        leaf.set_evaluations(-2.0, EvalStatus::DepthLimited, false);
        let mut deep = MoveRecord::new(1u8, 1);
        deep.set_evaluations(4.0, EvalStatus::Evaluated, false);
        let unevaluated = MoveRecord::new(2u8, 1);
        assert_eq!(leaf.cmp_for_search(&deep), Ordering::Less);
        assert_eq!(deep.cmp_for_search(&unevaluated), Ordering::Less);
    }
}
