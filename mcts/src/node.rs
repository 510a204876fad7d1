//! Tree nodes shared between worker threads.
//!
//! Visit and win counters are lock-free atomics so workers can
//! accumulate playout results without contending; the child list sits
//! behind a per-node mutex. Whenever two nodes must be locked together
//! the parent is locked before the child, which keeps the tree
//! deadlock-free.
//!
//! A node with negative visits is a tombstone: the branch was pruned
//! (hopeless, or a sibling became a proven win) and its subtree has
//! been released. The magnitude is preserved so visit accounting still
//! closes over dead branches.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use rand::Rng;
use rand_chacha::ChaCha20Rng;

use engine_core::{EvalStatus, MoveRecord};

/// Win rate at or above which a terminal move counts as a proven win.
pub(crate) const WIN_THRESHOLD: f64 = 0.999;

/// One edge out of a node: the move record plus the child node, which
/// is allocated lazily on the child's first visit.
pub struct UctChild<M> {
    pub record: MoveRecord<M>,
    pub node: Option<Arc<UctNode<M>>>,
    /// Tombstoned before a node was ever allocated.
    pub dead: bool,
}

impl<M: Clone> UctChild<M> {
    fn new(record: MoveRecord<M>) -> Self {
        UctChild {
            record,
            node: None,
            dead: false,
        }
    }

    pub fn visits(&self) -> i64 {
        self.node.as_ref().map_or(0, |n| n.raw_visits())
    }

    pub fn alive(&self) -> bool {
        !self.dead && self.node.as_ref().map_or(true, |n| n.raw_visits() >= 0)
    }

    pub fn win_rate(&self) -> f64 {
        self.node.as_ref().map_or(0.0, |n| n.win_rate())
    }
}

/// What selection found at a node.
pub(crate) enum Selection {
    /// No child list yet; the caller decides whether to expand.
    Unexpanded,
    /// An unvisited child picked uniformly at random.
    Unvisited(usize),
    /// The highest-UCT visited child.
    Visited(usize),
    /// A proven winning child for the player to move.
    Terminal(usize),
    /// Expanded to an empty list: the position is terminal.
    NoChildren,
    /// Every child is tombstoned.
    NoViableChildren,
}

pub struct UctNode<M> {
    /// Playouts through this node; negative marks a tombstone.
    visits: AtomicI64,
    /// Accumulated playout values, stored as f64 bits.
    wins: AtomicU64,
    /// Virtual visits and wins seeding the win rate before real
    /// playouts arrive.
    bias_visits: f64,
    bias_wins: f64,
    parent: Weak<UctNode<M>>,
    children: Mutex<Option<Vec<UctChild<M>>>>,
    /// A child has been promoted to only child; idempotence marker.
    only_child: AtomicBool,
}

impl<M: Clone> UctNode<M> {
    pub fn new_root() -> Arc<Self> {
        Arc::new(UctNode {
            // the root starts at one visit so child UCT terms are
            // well-defined from the first playout
            visits: AtomicI64::new(1),
            wins: AtomicU64::new(0f64.to_bits()),
            bias_visits: 0.0,
            bias_wins: 0.0,
            parent: Weak::new(),
            children: Mutex::new(None),
            only_child: AtomicBool::new(false),
        })
    }

    fn new_child(parent: &Arc<Self>, bias_visits: f64, bias_wins: f64) -> Arc<Self> {
        Arc::new(UctNode {
            visits: AtomicI64::new(0),
            wins: AtomicU64::new(0f64.to_bits()),
            bias_visits,
            bias_wins,
            parent: Arc::downgrade(parent),
            children: Mutex::new(None),
            only_child: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn raw_visits(&self) -> i64 {
        self.visits.load(Ordering::Acquire)
    }

    #[inline]
    pub fn active_visits(&self) -> i64 {
        self.raw_visits().max(0)
    }

    #[inline]
    pub fn wins(&self) -> f64 {
        f64::from_bits(self.wins.load(Ordering::Acquire))
    }

    /// Mean playout value in [-1, 1], folding in the virtual bias
    /// visits. Tombstones keep reporting the rate they died with.
    pub fn win_rate(&self) -> f64 {
        let denom = self.bias_visits + self.raw_visits().abs() as f64;
        if denom <= 0.0 {
            0.0
        } else {
            (self.wins() + self.bias_wins) / denom
        }
    }

    fn uct(&self, parent_visits: f64, alpha: f64) -> f64 {
        let v = self.active_visits() as f64;
        self.win_rate() / 2.0 + 0.5 + alpha * (parent_visits.ln().max(0.0) / (v + 1.0)).sqrt()
    }

    /// Record a playout result: `delta_wins` summed values for
    /// `delta_visits` playouts, from the perspective of the player who
    /// moved into this node. Commutative, so worker order does not
    /// matter. Re-establishes the most-visited-first invariant in the
    /// parent's child list.
    pub fn update(self: &Arc<Self>, delta_wins: f64, delta_visits: i64) {
        self.visits.fetch_add(delta_visits, Ordering::AcqRel);
        let mut cur = self.wins.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + delta_wins).to_bits();
            match self.wins.compare_exchange_weak(
                cur,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(seen) => cur = seen,
            }
        }
        if let Some(parent) = self.parent.upgrade() {
            parent.promote_most_visited(self);
        }
    }

    /// Keep the most visited child at index zero. Index zero is the
    /// presumptive answer and is exempt from hopeless pruning.
    fn promote_most_visited(&self, child: &Arc<Self>) {
        let Ok(mut guard) = self.children.lock() else {
            return;
        };
        let Some(children) = guard.as_mut() else {
            return;
        };
        let Some(idx) = children
            .iter()
            .position(|c| c.node.as_ref().is_some_and(|n| Arc::ptr_eq(n, child)))
        else {
            return;
        };
        if idx > 0 && children[idx].visits() > children[0].visits() {
            children.swap(0, idx);
        }
    }

    /// Attach a child list. Returns the number of children stored, or
    /// zero when another worker won the race.
    pub fn expand(&self, records: Vec<MoveRecord<M>>) -> usize {
        let Ok(mut guard) = self.children.lock() else {
            return 0;
        };
        if guard.is_some() {
            return 0;
        }
        let count = records.len();
        *guard = Some(records.into_iter().map(UctChild::new).collect());
        count
    }

    pub fn is_expanded(&self) -> bool {
        self.children
            .lock()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    pub(crate) fn select(
        &self,
        rng: &mut ChaCha20Rng,
        alpha: f64,
        terminal_optimization: bool,
    ) -> Selection {
        let Ok(guard) = self.children.lock() else {
            return Selection::NoViableChildren;
        };
        let Some(children) = guard.as_ref() else {
            return Selection::Unexpanded;
        };
        if children.is_empty() {
            return Selection::NoChildren;
        }
        if terminal_optimization {
            if let Some(idx) = children.iter().position(|c| {
                c.alive() && c.record.game_over && c.record.evaluation >= WIN_THRESHOLD
            }) {
                return Selection::Terminal(idx);
            }
        }
        let unvisited: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.alive() && c.visits() == 0)
            .map(|(i, _)| i)
            .collect();
        if !unvisited.is_empty() {
            let pick = unvisited[rng.gen_range(0..unvisited.len())];
            return Selection::Unvisited(pick);
        }
        let parent_visits = self.active_visits().max(1) as f64;
        let mut best: Option<(usize, f64)> = None;
        for (i, c) in children.iter().enumerate() {
            if !c.alive() {
                continue;
            }
            if let Some(node) = &c.node {
                let score = node.uct(parent_visits, alpha);
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((i, score));
                }
            }
        }
        match best {
            Some((i, _)) => Selection::Visited(i),
            None => Selection::NoViableChildren,
        }
    }

    /// Step into child `idx`, allocating its node on first visit.
    /// Returns the child node and a copy of its move record.
    pub fn descend(
        self: &Arc<Self>,
        idx: usize,
        bias_visits: f64,
    ) -> Option<(Arc<UctNode<M>>, MoveRecord<M>)> {
        let mut guard = self.children.lock().ok()?;
        let children = guard.as_mut()?;
        let child = children.get_mut(idx)?;
        if child.node.is_none() {
            let seed = if bias_visits > 0.0 && child.record.evaluation.is_finite() {
                child.record.evaluation * bias_visits
            } else {
                0.0
            };
            let bias = if bias_visits > 0.0 { bias_visits } else { 0.0 };
            child.node = Some(UctNode::new_child(self, bias, seed));
        }
        let node = child.node.clone()?;
        Some((node, child.record.clone()))
    }

    /// Mark `child`'s move as ending the game with `score` for its
    /// mover, and optionally collapse this node around it when the
    /// result is a proven win. The child is found by identity, not
    /// index, because the most-visited rotation may move it between a
    /// worker's selection and this call.
    pub fn record_terminal(&self, child: &Arc<UctNode<M>>, score: f64, drawn: bool, collapse: bool) {
        let Ok(mut guard) = self.children.lock() else {
            return;
        };
        let Some(children) = guard.as_mut() else {
            return;
        };
        let Some(idx) = children
            .iter()
            .position(|c| c.node.as_ref().is_some_and(|n| Arc::ptr_eq(n, child)))
        else {
            return;
        };
        let record = &mut children[idx].record;
        record.game_over = true;
        record.evaluation = score;
        record.status = if drawn {
            EvalStatus::EvaluatedDrawn
        } else {
            EvalStatus::Evaluated
        };
        if collapse
            && !drawn
            && score >= WIN_THRESHOLD
            && !self.only_child.swap(true, Ordering::AcqRel)
        {
            for (i, c) in children.iter_mut().enumerate() {
                if i == idx {
                    continue;
                }
                match &c.node {
                    Some(node) => node.uncount(),
                    None => c.dead = true,
                }
            }
        }
    }

    /// Mark the move at `idx` as ending the game with `score` for its
    /// mover.
    pub fn mark_game_over(&self, idx: usize, score: f64, drawn: bool) {
        let Ok(mut guard) = self.children.lock() else {
            return;
        };
        let Some(children) = guard.as_mut() else {
            return;
        };
        if let Some(child) = children.get_mut(idx) {
            child.record.game_over = true;
            child.record.evaluation = score;
            child.record.status = if drawn {
                EvalStatus::EvaluatedDrawn
            } else {
                EvalStatus::Evaluated
            };
        }
    }

    /// Tombstone this node and release its subtree.
    pub fn uncount(&self) {
        let v = self.raw_visits();
        self.visits.store(-(v.abs().max(1)), Ordering::Release);
        if let Ok(mut guard) = self.children.lock() {
            *guard = None;
        }
    }

    /// Collapse to the proven winning child at `idx`: every sibling is
    /// tombstoned, so selection has only one way forward. Safe to race;
    /// the first caller wins and the rest return immediately.
    pub fn make_only_child(&self, idx: usize) {
        if self.only_child.swap(true, Ordering::AcqRel) {
            return;
        }
        // parent (self) lock first, sibling nodes after
        let Ok(mut guard) = self.children.lock() else {
            return;
        };
        let Some(children) = guard.as_mut() else {
            return;
        };
        for (i, child) in children.iter_mut().enumerate() {
            if i == idx {
                continue;
            }
            match &child.node {
                Some(node) => node.uncount(),
                None => child.dead = true,
            }
        }
    }

    pub fn is_only_child_collapsed(&self) -> bool {
        self.only_child.load(Ordering::Acquire)
    }

    /// Prune children that can no longer catch the leader within the
    /// estimated `remaining` playouts. `children[0]` is never killed.
    /// Returns the number of branches tombstoned.
    pub fn kill_hopeless_children(
        &self,
        remaining: f64,
        by_visits: bool,
        share: f64,
        share_power: f64,
    ) -> usize {
        let Ok(mut guard) = self.children.lock() else {
            return 0;
        };
        let Some(children) = guard.as_mut() else {
            return 0;
        };
        let active: Vec<usize> = (0..children.len()).filter(|&i| children[i].alive()).collect();
        if active.len() <= 1 {
            return 0;
        }
        let best_visits = children[0].visits() as f64;
        let best_rate = children[0].win_rate().min(WIN_THRESHOLD);
        let fair_share = remaining / (active.len() as f64).powf(share_power);
        let mut killed = 0;
        for &i in &active {
            if i == 0 {
                continue;
            }
            let child = &children[i];
            let visits = child.visits() as f64;
            let hopeless = if by_visits {
                visits + fair_share < best_visits
            } else {
                let node = match &child.node {
                    Some(n) => n,
                    None => continue,
                };
                // playouts this branch would need, at a perfect score,
                // to reach the leader's win rate
                let needed = (best_rate * visits - (node.wins() + node.bias_wins))
                    / (1.0 - best_rate);
                needed > remaining * share
            };
            if hopeless {
                match &children[i].node {
                    Some(node) => node.uncount(),
                    None => children[i].dead = true,
                }
                killed += 1;
            }
        }
        killed
    }

    /// When every live reply is a proven ending, the position's exact
    /// value for its mover: the best reply's score. `None` while any
    /// reply is still open.
    pub fn proven_value(&self) -> Option<f64> {
        let guard = self.children.lock().ok()?;
        let children = guard.as_ref()?;
        let mut best: Option<f64> = None;
        for child in children.iter().filter(|c| c.alive()) {
            if !child.record.game_over {
                return None;
            }
            let value = child.record.evaluation;
            if best.map_or(true, |b| value > b) {
                best = Some(value);
            }
        }
        best
    }

    /// The winning move when this node has collapsed to a proven win.
    pub fn decided_move(&self) -> Option<MoveRecord<M>> {
        let guard = self.children.lock().ok()?;
        let children = guard.as_ref()?;
        children
            .iter()
            .find(|c| c.alive() && c.record.game_over && c.record.evaluation >= WIN_THRESHOLD)
            .map(|c| c.record.clone())
    }

    /// Snapshot of the child statistics, for result selection and
    /// reporting.
    pub fn child_stats(&self) -> Vec<ChildStat<M>> {
        let Ok(guard) = self.children.lock() else {
            return Vec::new();
        };
        let Some(children) = guard.as_ref() else {
            return Vec::new();
        };
        children
            .iter()
            .map(|c| ChildStat {
                payload: c.record.payload.clone(),
                visits: c.visits(),
                win_rate: c.win_rate(),
                game_over: c.record.game_over,
                evaluation: c.record.evaluation,
                alive: c.alive(),
            })
            .collect()
    }
}

/// Per-move statistics reported from the root after a search.
#[derive(Debug, Clone)]
pub struct ChildStat<M> {
    pub payload: M,
    pub visits: i64,
    pub win_rate: f64,
    pub game_over: bool,
    pub evaluation: f64,
    pub alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn records(n: u8) -> Vec<MoveRecord<u8>> {
        (0..n).map(|m| MoveRecord::new(m, 1)).collect()
    }

    #[test]
    fn root_starts_with_one_visit() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        assert_eq!(root.raw_visits(), 1);
        assert_eq!(root.wins(), 0.0);
    }

    #[test]
    fn update_accumulates_wins_and_visits() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.update(0.5, 1);
        root.update(-1.0, 2);
        assert_eq!(root.raw_visits(), 4);
        assert!((root.wins() - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn selection_prefers_unvisited_children() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        assert_eq!(root.expand(records(3)), 3);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        match root.select(&mut rng, 0.5, true) {
            Selection::Unvisited(i) => assert!(i < 3),
            _ => panic!("expected an unvisited child"),
        }
    }

    #[test]
    fn terminal_child_selected_outright() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.expand(records(3));
        root.mark_game_over(1, 1.0, false);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        match root.select(&mut rng, 0.5, true) {
            Selection::Terminal(i) => assert_eq!(i, 1),
            _ => panic!("expected the proven win"),
        }
    }

    #[test]
    fn most_visited_child_rotates_to_front() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.expand(records(3));
        let (a, _) = root.descend(1, 0.0).unwrap();
        let (b, _) = root.descend(2, 0.0).unwrap();
        a.update(0.0, 1);
        b.update(0.5, 5);
        let stats = root.child_stats();
        assert_eq!(stats[0].payload, 2);
        assert_eq!(stats[0].visits, 5);
    }

    #[test]
    fn only_child_tombstones_siblings() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.expand(records(3));
        let (loser, _) = root.descend(0, 0.0).unwrap();
        loser.update(-3.0, 3);
        root.mark_game_over(2, 1.0, false);
        root.make_only_child(2);
        assert!(root.is_only_child_collapsed());
        let stats = root.child_stats();
        assert!(!stats[0].alive);
        assert!(!stats[1].alive);
        assert!(stats[2].alive);
        // tombstone magnitude preserved for accounting
        assert_eq!(loser.raw_visits(), -3);
        let decided = root.decided_move().expect("decided move");
        assert_eq!(decided.payload, 2);
    }

    #[test]
    fn record_terminal_finds_the_child_by_identity() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.expand(records(3));
        let (a, _) = root.descend(0, 0.0).unwrap();
        let (b, _) = root.descend(1, 0.0).unwrap();
        // rotate b to the front so index 1 no longer points at it
        b.update(1.0, 5);
        a.update(0.0, 1);
        root.record_terminal(&b, 1.0, false, true);
        assert!(root.is_only_child_collapsed());
        let decided = root.decided_move().expect("decided move");
        assert_eq!(decided.payload, 1);
    }

    #[test]
    fn hopeless_children_are_pruned_by_visits() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.expand(records(3));
        let (leader, _) = root.descend(0, 0.0).unwrap();
        let (trailer, _) = root.descend(1, 0.0).unwrap();
        leader.update(50.0, 100);
        trailer.update(1.0, 2);
        // 10 playouts left: the trailer cannot catch 100 visits
        let killed = root.kill_hopeless_children(10.0, true, 0.5, 0.5);
        assert!(killed >= 1);
        let stats = root.child_stats();
        assert!(stats.iter().any(|s| s.visits == -2 && !s.alive));
        // the leader sits at index 0 and survives
        assert_eq!(stats[0].visits, 100);
        assert!(stats[0].alive);
    }

    #[test]
    fn proven_value_requires_every_reply_decided() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        assert!(root.proven_value().is_none());
        root.expand(records(2));
        root.mark_game_over(0, -1.0, false);
        assert!(root.proven_value().is_none());
        root.mark_game_over(1, -1.0, false);
        assert_eq!(root.proven_value(), Some(-1.0));
    }

    #[test]
    fn uncount_releases_the_subtree() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.expand(records(2));
        let (child, _) = root.descend(0, 0.0).unwrap();
        child.expand(records(2));
        child.update(1.0, 4);
        child.uncount();
        assert_eq!(child.raw_visits(), -4);
        assert!(!child.is_expanded());
    }

    #[test]
    fn win_rate_folds_in_bias() {
        let root: Arc<UctNode<u8>> = UctNode::new_root();
        root.expand(records(1));
        // seed: evaluation 0.5 weighted by 4 virtual visits
        {
            let mut guard = root.children.lock().unwrap();
            guard.as_mut().unwrap()[0].record.evaluation = 0.5;
        }
        let (node, _) = root.descend(0, 4.0).unwrap();
        assert!((node.win_rate() - 0.5).abs() < 1e-12);
        node.update(-1.0, 1);
        // (2.0 - 1.0) / (4 + 1)
        assert!((node.win_rate() - 0.2).abs() < 1e-12);
    }
}
