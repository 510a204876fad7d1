//! Playout workers.
//!
//! Each worker owns a clone of the game adapter and a ChaCha20 stream
//! split off the master RNG, and repeatedly runs one playout: descend
//! the shared tree by UCT, expand a leaf when its visit count earns
//! it, run random playouts from there, and push the per-player scores
//! back up the path.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand_chacha::ChaCha20Rng;
use tracing::trace;

use engine_core::{EvalStatus, GameAdapter, MoveRecord, SearchError};

use crate::config::UctConfig;
use crate::node::{Selection, UctNode, WIN_THRESHOLD};

/// State shared between the workers and the coordinating thread.
pub(crate) struct SharedState {
    stopped: AtomicBool,
    playouts: AtomicU64,
    /// Playout ceiling; zero means unbounded.
    pub(crate) playout_ceiling: u64,
    stored_children: AtomicUsize,
    finished: Vec<AtomicBool>,
    error: Mutex<Option<SearchError>>,
}

impl SharedState {
    pub(crate) fn new(workers: usize, playout_ceiling: u64) -> Self {
        SharedState {
            stopped: AtomicBool::new(false),
            playouts: AtomicU64::new(0),
            playout_ceiling,
            stored_children: AtomicUsize::new(0),
            finished: (0..workers).map(|_| AtomicBool::new(false)).collect(),
            error: Mutex::new(None),
        }
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn playouts(&self) -> u64 {
        self.playouts.load(Ordering::Acquire)
    }

    pub(crate) fn stored_children(&self) -> usize {
        self.stored_children.load(Ordering::Acquire)
    }

    pub(crate) fn worker_finished(&self, index: usize) -> bool {
        self.finished[index].load(Ordering::Acquire)
    }

    pub(crate) fn take_error(&self) -> Option<SearchError> {
        self.error.lock().ok().and_then(|mut g| g.take())
    }

    fn fail(&self, err: SearchError) {
        if let Ok(mut guard) = self.error.lock() {
            guard.get_or_insert(err);
        }
        self.stop();
    }

    pub(crate) fn add_stored_children(&self, count: usize) {
        if count > 0 {
            self.stored_children.fetch_add(count, Ordering::AcqRel);
        }
    }

    pub(crate) fn note_playouts(&self, playouts: u64) {
        if playouts > 0 {
            let total = self.playouts.fetch_add(playouts, Ordering::AcqRel) + playouts;
            if self.playout_ceiling > 0 && total >= self.playout_ceiling {
                self.stop();
            }
        }
    }
}

/// Marks the worker finished even when a playout panics, so the
/// coordinator's shutdown wait does not hang.
struct FinishedGuard<'a> {
    shared: &'a SharedState,
    index: usize,
}

impl Drop for FinishedGuard<'_> {
    fn drop(&mut self) {
        self.shared.finished[self.index].store(true, Ordering::Release);
    }
}

pub(crate) struct UctWorker<G: GameAdapter> {
    pub(crate) game: G,
    pub(crate) rng: ChaCha20Rng,
    pub(crate) root: Arc<UctNode<G::Move>>,
    pub(crate) config: Arc<UctConfig>,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) index: usize,
}

impl<G: GameAdapter> UctWorker<G> {
    /// Main loop for a spawned worker thread.
    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let _guard = FinishedGuard {
            shared: &shared,
            index: self.index,
        };
        while !shared.stopped() {
            match self.step() {
                Ok(playouts) => shared.note_playouts(playouts),
                Err(err) => {
                    trace!(worker = self.index, error = %err, "worker stopping on error");
                    shared.fail(err);
                    break;
                }
            }
        }
    }

    /// One playout batch. Returns the number of playouts counted.
    pub(crate) fn step(&mut self) -> Result<u64, SearchError> {
        let Self {
            game,
            rng,
            root,
            config,
            shared,
            ..
        } = self;
        if config.blitz {
            // descend and simulate on a throwaway copy, no unmake
            let mut scratch = game.clone();
            run_one(&mut scratch, rng, root, config, shared, false)
        } else {
            run_one(game, rng, root, config, shared, true)
        }
    }
}

/// Expand the root eagerly so the coordinator's pruning and decided
/// checks always have a child list. Returns the number of children
/// stored.
pub(crate) fn expand_root<G: GameAdapter>(
    game: &mut G,
    root: &UctNode<G::Move>,
    config: &UctConfig,
) -> Result<usize, SearchError> {
    let mut digests = Vec::new();
    expand_node(game, root, 0, config, config.verify_hashes, &mut digests)
}

enum PlayoutEnd {
    /// Stopped at an unexpanded or frozen leaf; simulate from here.
    Simulate,
    /// The position on the board is game over.
    Terminal,
    /// The position's value for the given mover is exact: a proven
    /// win was selected outright, or every reply is a proven ending.
    /// No simulation needed.
    Known(u8, f64),
    /// Every child on the way down was tombstoned.
    Dead,
}

/// Descend, expand, simulate, backpropagate. `unwind` reverts the
/// applied moves afterwards; blitz callers pass a scratch adapter and
/// skip it.
fn run_one<G: GameAdapter>(
    game: &mut G,
    rng: &mut ChaCha20Rng,
    root: &Arc<UctNode<G::Move>>,
    config: &UctConfig,
    shared: &SharedState,
    unwind: bool,
) -> Result<u64, SearchError> {
    let mut path: Vec<(Arc<UctNode<G::Move>>, MoveRecord<G::Move>)> = Vec::new();
    let mut digests: Vec<u64> = Vec::new();
    let mut node = Arc::clone(root);
    let mut depth = 0usize;
    // a proven winning child selected outright; its move is never
    // applied to the board, so it sits outside `path`
    let mut leaf: Option<(Arc<UctNode<G::Move>>, MoveRecord<G::Move>)> = None;
    // a proven losing branch, released after its final backpropagation
    let mut doomed: Option<Arc<UctNode<G::Move>>> = None;

    let end = loop {
        // a node whose every reply is decided needs no playout, and a
        // losing reply set proves the move into it one level up
        if let Some((_, last_record)) = path.last() {
            if let Some(value) = node.proven_value() {
                let mover = game.current_player();
                let score = if last_record.player == mover { value } else { -value };
                if score.abs() >= WIN_THRESHOLD {
                    let parent = match path.len() {
                        0 | 1 => Arc::clone(root),
                        n => Arc::clone(&path[n - 2].0),
                    };
                    if score >= WIN_THRESHOLD {
                        parent.record_terminal(&node, score, false, config.only_child_optimization);
                    } else {
                        // a proven loss is marked on the parent's
                        // record and its subtree released, so
                        // selection never walks into it again
                        parent.record_terminal(&node, score, false, false);
                        doomed = Some(Arc::clone(&node));
                    }
                }
                break PlayoutEnd::Known(mover, value);
            }
        }
        match node.select(rng, config.alpha, config.terminal_node_optimization) {
            Selection::Unexpanded => {
                let parent_visits = match path.last() {
                    Some((parent, _)) => parent.active_visits(),
                    None => node.active_visits(),
                };
                if !should_expand(&node, depth, parent_visits, config, shared) {
                    break PlayoutEnd::Simulate;
                }
                let stored = expand_node(game, &node, depth, config, unwind, &mut digests)?;
                shared.add_stored_children(stored);
                // re-select, whoever won the expansion race
            }
            Selection::NoChildren => {
                if !game.is_game_over() {
                    return Err(SearchError::contract(
                        "no legal moves in a live position",
                    ));
                }
                break PlayoutEnd::Terminal;
            }
            Selection::NoViableChildren => break PlayoutEnd::Dead,
            Selection::Terminal(idx) => {
                // selection only returns proven wins here; the record
                // already carries the exact value, and the position
                // past the move may be live (a propagated win), so the
                // move is not applied and the board is not scored
                let (child, record) = node
                    .descend(idx, 0.0)
                    .ok_or_else(|| SearchError::contract("selected child index out of range"))?;
                if config.only_child_optimization {
                    node.record_terminal(&child, record.evaluation, false, true);
                }
                let mover = record.player;
                let value = record.evaluation;
                leaf = Some((child, record));
                break PlayoutEnd::Known(mover, value);
            }
            Selection::Unvisited(idx) | Selection::Visited(idx) => {
                let bias = if config.sort_moves && depth < config.uct_sort_depth {
                    config.initial_win_rate_weight
                } else {
                    0.0
                };
                let (child, record) = descend(game, &node, idx, bias, config, &mut digests)?;
                depth += 1;
                if game.is_game_over() {
                    let score = checked_score(game, record.player)?;
                    let drawn = game.is_draw();
                    node.record_terminal(&child, score, drawn, config.only_child_optimization);
                    path.push((child, record));
                    break PlayoutEnd::Terminal;
                }
                path.push((Arc::clone(&child), record));
                node = child;
            }
        }
    };

    let mut players = path_players(&path, game);
    if let Some((_, record)) = &leaf {
        if !players.contains(&record.player) {
            players.push(record.player);
        }
    }
    let (counted, totals) = match end {
        PlayoutEnd::Terminal => {
            let scores = score_players(game, &players)?;
            (1u64, scores)
        }
        PlayoutEnd::Known(mover, value) => {
            // two-player zero-sum mapping, the same as the rescore
            // default
            let scores = players
                .iter()
                .map(|&p| (p, if p == mover { value } else { -value }))
                .collect();
            (1u64, scores)
        }
        PlayoutEnd::Simulate => {
            let sims = config.simulations_per_node.max(1) as u64;
            let mut totals: Vec<(u8, f64)> = players.iter().map(|&p| (p, 0.0)).collect();
            for _ in 0..sims {
                let scores = if unwind {
                    simulate(game, rng, config, &players, true)?
                } else {
                    let mut sim_game = game.clone();
                    simulate(&mut sim_game, rng, config, &players, false)?
                };
                for (total, (_, s)) in totals.iter_mut().zip(scores) {
                    total.1 += s;
                }
            }
            (sims, totals)
        }
        PlayoutEnd::Dead => {
            revert_path(game, &path, &mut digests, unwind)?;
            return Ok(0);
        }
    };

    // root carries the visit count its children's UCT terms divide by
    root.update(0.0, counted as i64);
    for (tree_node, record) in path.iter().chain(&leaf) {
        let value = totals
            .iter()
            .find(|(p, _)| *p == record.player)
            .map_or(0.0, |(_, s)| *s);
        tree_node.update(value, counted as i64);
    }
    if let Some(lost) = doomed {
        lost.uncount();
    }

    revert_path(game, &path, &mut digests, unwind)?;
    Ok(counted)
}

fn should_expand<M: Clone>(
    node: &UctNode<M>,
    depth: usize,
    parent_visits: i64,
    config: &UctConfig,
    shared: &SharedState,
) -> bool {
    if config.stored_child_limit > 0 && shared.stored_children() >= config.stored_child_limit {
        return false;
    }
    if depth < config.uct_tree_depth {
        return true;
    }
    let visits = node.active_visits() as f64;
    if config.node_expansion_rate > 0.0 {
        visits * config.node_expansion_rate > (parent_visits.max(1) as f64).ln()
    } else {
        visits >= 3.0
    }
}

/// List the legal moves at the current position and attach them as
/// children. With move sorting on, each move is statically evaluated
/// and the list is ordered strongest first before any `move_limit`
/// truncation.
fn expand_node<G: GameAdapter>(
    game: &mut G,
    node: &UctNode<G::Move>,
    depth: usize,
    config: &UctConfig,
    verify: bool,
    digests: &mut Vec<u64>,
) -> Result<usize, SearchError> {
    let mover = game.current_player();
    let moves = game.list_legal_moves();
    let sorting = config.sort_moves && depth < config.uct_sort_depth;
    let mut records: Vec<MoveRecord<G::Move>> = Vec::with_capacity(moves.len());
    for payload in moves {
        let mut record = MoveRecord::new(payload, mover);
        if sorting {
            push_digest(game, config, verify, digests);
            game.apply_move(&record.payload);
            if game.is_game_over() {
                record.game_over = true;
                record.evaluation = checked_score(game, mover)?;
                record.status = if game.is_draw() {
                    EvalStatus::EvaluatedDrawn
                } else {
                    EvalStatus::Evaluated
                };
            } else {
                record.evaluation = game.static_evaluate(mover).clamp(-1.0, 1.0);
            }
            game.revert_move(&record.payload);
            check_digest(game, config, verify, digests)?;
        }
        records.push(record);
    }
    if sorting {
        records.sort_by(MoveRecord::cmp_by_strength);
        if config.move_limit > 0 && records.len() > config.move_limit {
            records.truncate(config.move_limit);
        }
    }
    Ok(node.expand(records))
}

fn descend<G: GameAdapter>(
    game: &mut G,
    node: &Arc<UctNode<G::Move>>,
    idx: usize,
    bias: f64,
    config: &UctConfig,
    digests: &mut Vec<u64>,
) -> Result<(Arc<UctNode<G::Move>>, MoveRecord<G::Move>), SearchError> {
    let (child, record) = node
        .descend(idx, bias)
        .ok_or_else(|| SearchError::contract("selected child index out of range"))?;
    push_digest(game, config, config.verify_hashes, digests);
    game.apply_move(&record.payload);
    Ok((child, record))
}

/// Random playout from the current position to the end of the game or
/// the depth cap, scoring every listed player at the final position.
fn simulate<G: GameAdapter>(
    game: &mut G,
    rng: &mut ChaCha20Rng,
    config: &UctConfig,
    players: &[u8],
    unwind: bool,
) -> Result<Vec<(u8, f64)>, SearchError> {
    let limit = if config.max_random_playout_depth > 0 {
        config.max_random_playout_depth
    } else {
        game.playout_depth_limit()
    };
    let mut undo: Vec<G::Move> = Vec::new();
    let mut steps = 0usize;
    while steps < limit && !game.is_game_over() {
        let Some(payload) = game.random_playout_move(rng) else {
            break;
        };
        game.apply_move(&payload);
        if unwind {
            undo.push(payload);
        }
        steps += 1;
    }
    // an unfinished playout at the depth cap scores as neutral
    let scores = if game.is_game_over() {
        score_players(game, players)
    } else {
        Ok(players.iter().map(|&p| (p, 0.0)).collect())
    };
    if unwind {
        for payload in undo.iter().rev() {
            game.revert_move(payload);
        }
    }
    scores
}

fn revert_path<G: GameAdapter>(
    game: &mut G,
    path: &[(Arc<UctNode<G::Move>>, MoveRecord<G::Move>)],
    digests: &mut Vec<u64>,
    unwind: bool,
) -> Result<(), SearchError> {
    if !unwind {
        return Ok(());
    }
    for (_, record) in path.iter().rev() {
        game.revert_move(&record.payload);
        if let Some(expected) = digests.pop() {
            if expected != 0 && game.content_hash() != expected {
                return Err(SearchError::contract(
                    "content hash mismatch after playout unwind",
                ));
            }
        }
    }
    Ok(())
}

/// The distinct players that moved along the path, first-seen order.
fn path_players<G: GameAdapter>(
    path: &[(Arc<UctNode<G::Move>>, MoveRecord<G::Move>)],
    game: &G,
) -> Vec<u8> {
    let mut players: Vec<u8> = Vec::with_capacity(2);
    for (_, record) in path {
        if !players.contains(&record.player) {
            players.push(record.player);
        }
    }
    if players.is_empty() {
        players.push(game.current_player());
    }
    players
}

fn score_players<G: GameAdapter>(
    game: &mut G,
    players: &[u8],
) -> Result<Vec<(u8, f64)>, SearchError> {
    players
        .iter()
        .map(|&p| checked_score(game, p).map(|s| (p, s)))
        .collect()
}

fn checked_score<G: GameAdapter>(game: &mut G, player: u8) -> Result<f64, SearchError> {
    let score = game.normalized_score(player);
    if !score.is_finite() || !(-1.0..=1.0).contains(&score) {
        return Err(SearchError::contract(
            "normalized_score outside the [-1, 1] range",
        ));
    }
    Ok(score)
}

fn push_digest<G: GameAdapter>(
    game: &mut G,
    config: &UctConfig,
    verify: bool,
    digests: &mut Vec<u64>,
) {
    if verify && config.verify_hashes {
        digests.push(game.content_hash());
    } else {
        digests.push(0);
    }
}

fn check_digest<G: GameAdapter>(
    game: &mut G,
    config: &UctConfig,
    verify: bool,
    digests: &mut Vec<u64>,
) -> Result<(), SearchError> {
    let Some(expected) = digests.pop() else {
        return Ok(());
    };
    if verify && config.verify_hashes && expected != 0 && game.content_hash() != expected {
        return Err(SearchError::contract(
            "content hash mismatch after move revert",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_visit_expands_only_without_an_expansion_rate() {
        let shared = SharedState::new(0, 0);
        let node: Arc<UctNode<u8>> = UctNode::new_root();
        node.update(0.0, 2);
        let mut config = UctConfig::default();
        config.uct_tree_depth = 0;
        // three visits against a well-explored parent: the throttle
        // holds while a rate is set
        assert!(!should_expand(&node, 1, 10_000, &config, &shared));
        config.node_expansion_rate = 0.0;
        assert!(should_expand(&node, 1, 10_000, &config, &shared));
    }
}
