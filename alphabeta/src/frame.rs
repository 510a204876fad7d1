//! Search frames: the explicit stack replacing recursion.
//!
//! The driver keeps all search state in a `Vec<SearchFrame>` instead of
//! the call stack. It is slightly less efficient than recursing, but
//! the controlling code can inspect progress, abort cleanly mid-search,
//! and fall back to an earlier completed level at any point.

use engine_core::MoveRecord;

/// Why a frame stopped considering further candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DontStop,
    /// The opponent already has a better line elsewhere.
    AlphaCutoff,
    /// The best value crossed the configured good-enough threshold.
    GoodEnough,
}

/// One ply of the search.
///
/// `moves` is held in search order, best candidate first. `i_can_get`
/// and `he_can_get` are the alpha-beta window from the mover's
/// perspective: the value this frame's mover is already guaranteed, and
/// the value the player above is guaranteed elsewhere.
#[derive(Debug)]
pub(crate) struct SearchFrame<M> {
    pub moves: Vec<MoveRecord<M>>,
    /// Next candidate to try.
    pub next_index: usize,
    /// Move currently applied on the board, awaiting its subtree.
    pub current_index: Option<usize>,
    pub best_index: Option<usize>,
    pub best_value: f64,
    pub i_can_get: f64,
    pub he_can_get: f64,
    /// Every move is a proven ending or depth-limit leaf; the sorted
    /// first move is already the answer.
    pub all_terminals: bool,
    pub some_terminals: bool,
    /// `moves[0]` is an injected null move.
    pub has_null: bool,
    pub stop: StopReason,
    pub mover: u8,
    /// The frame lies on the previous level's principal variation.
    pub on_pv: bool,
}

impl<M> SearchFrame<M> {
    pub fn new(moves: Vec<MoveRecord<M>>, mover: u8, window: (f64, f64), on_pv: bool) -> Self {
        SearchFrame {
            moves,
            next_index: 0,
            current_index: None,
            best_index: None,
            best_value: f64::NEG_INFINITY,
            i_can_get: window.0,
            he_can_get: window.1,
            all_terminals: false,
            some_terminals: false,
            has_null: false,
            stop: StopReason::DontStop,
            mover,
            on_pv,
        }
    }

    pub fn best(&self) -> Option<&MoveRecord<M>> {
        self.best_index.map(|i| &self.moves[i])
    }

    /// Fraction of this frame's candidates already resolved.
    pub fn fraction_done(&self) -> f64 {
        let total = self.moves.len().max(1);
        self.next_index.saturating_sub(1) as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frame_has_open_window() {
        let f: SearchFrame<u8> = SearchFrame::new(
            vec![],
            1,
            (f64::NEG_INFINITY, f64::NEG_INFINITY),
            false,
        );
        assert_eq!(f.stop, StopReason::DontStop);
        assert!(f.best_index.is_none());
        assert_eq!(f.i_can_get, f64::NEG_INFINITY);
    }

    #[test]
    fn fraction_done_tracks_cursor() {
        let moves = (0..4u8).map(|m| MoveRecord::new(m, 1)).collect();
        let mut f = SearchFrame::new(moves, 1, (f64::NEG_INFINITY, f64::NEG_INFINITY), false);
        assert_eq!(f.fraction_done(), 0.0);
        f.next_index = 3;
        assert_eq!(f.fraction_done(), 0.5);
    }
}
