//! The iterative-deepening alpha-beta driver.

use std::time::{Duration, Instant};

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, trace};

use engine_core::{EvalStatus, GameAdapter, MoveRecord, SearchError};

use crate::config::AlphaBetaConfig;
use crate::frame::{SearchFrame, StopReason};

/// Counters kept across a whole `find_best_move` call, progressive
/// levels included.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    /// Search steps taken (frame extensions and returns).
    pub nodes: u64,
    /// Static evaluations performed.
    pub evaluations: u64,
    pub alpha_cutoffs: u64,
    /// Candidates already searched when cutoffs landed; low cost means
    /// move ordering is doing its job.
    pub alpha_cutoff_cost: u64,
    pub good_enough_cutoffs: u64,
    /// Moves ordered by a borrowed cousin evaluation.
    pub killers: u64,
    /// Moves promoted by a null-move refutation.
    pub null_promotions: u64,
    /// Evaluations skipped because a cutoff was already proven.
    pub skipped_evals: u64,
    /// Progressive levels completed.
    pub levels: u32,
    pub elapsed: Duration,
}

/// The result of a finished search.
#[derive(Debug, Clone)]
pub struct SearchOutcome<M> {
    /// The chosen move; its `best_continuation` chain is the PV.
    pub best: MoveRecord<M>,
    /// Depth of the level that produced the move.
    pub depth: usize,
    /// True when the final level was aborted on time and the result
    /// comes from the last fully completed level.
    pub fell_back: bool,
    pub stats: SearchStats,
}

#[derive(Debug, Clone)]
struct KillerEntry<M> {
    payload: M,
    evaluation: f64,
}

enum LevelEnd {
    Completed,
    Aborted,
}

/// Iterative-deepening alpha-beta searcher over a [`GameAdapter`].
///
/// A searcher is cheap to construct and is meant to be used for one
/// `find_best_move` call per position; it resets its own state at the
/// start of each call.
pub struct AlphaBetaSearch<G: GameAdapter> {
    config: AlphaBetaConfig,
    stack: Vec<SearchFrame<G::Move>>,
    /// Root frame of the most recently finished level.
    last_root: Option<SearchFrame<G::Move>>,
    /// Root frame of the last fully completed progressive level, kept
    /// as the fallback when a deeper level is aborted.
    completed_root: Option<SearchFrame<G::Move>>,
    completed_depth: usize,
    killers: Vec<Option<KillerEntry<G::Move>>>,
    best_killers: Vec<Option<KillerEntry<G::Move>>>,
    /// Previous level's PV, used to steer move ordering.
    pv_hint: Vec<G::Move>,
    /// Previous level's root moves in strength order.
    prev_root_order: Vec<G::Move>,
    digest_stack: Vec<u64>,
    allow_alpha_beta: bool,
    max_depth: usize,
    final_depth: usize,
    single_choice: bool,
    aborted: bool,
    // progress accounting for progressive deepening
    sum_search_depth: f64,
    sum_final_search_depth: f64,
    partial_search_depth: f64,
    start: Instant,
    level_start: Duration,
    stats: SearchStats,
}

impl<G: GameAdapter> AlphaBetaSearch<G> {
    pub fn new(config: AlphaBetaConfig) -> Self {
        AlphaBetaSearch {
            config,
            stack: Vec::new(),
            last_root: None,
            completed_root: None,
            completed_depth: 0,
            killers: Vec::new(),
            best_killers: Vec::new(),
            pv_hint: Vec::new(),
            prev_root_order: Vec::new(),
            digest_stack: Vec::new(),
            allow_alpha_beta: true,
            max_depth: 0,
            final_depth: 0,
            single_choice: false,
            aborted: false,
            sum_search_depth: 0.0,
            sum_final_search_depth: 1.0,
            partial_search_depth: 1.0,
            start: Instant::now(),
            level_start: Duration::ZERO,
            stats: SearchStats::default(),
        }
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Overall completion estimate in [0, 1], spanning all progressive
    /// levels. Only an estimate, but good enough to decide whether a
    /// deeper level is worth starting.
    pub fn percent_done(&self) -> f64 {
        let base = self.sum_search_depth / self.sum_final_search_depth;
        let slice = self.partial_search_depth / self.sum_final_search_depth;
        base + slice * self.level_percent()
    }

    fn level_percent(&self) -> f64 {
        let mut done = 0.0;
        let mut scale = 1.0;
        for frame in &self.stack {
            done += scale * frame.fraction_done();
            scale /= frame.moves.len().max(1) as f64;
        }
        done.min(1.0)
    }

    /// Search the adapter's current position and return the chosen
    /// move. The position is restored before returning, success or
    /// not excepted for fatal adapter-contract failures, after which
    /// the adapter must be considered corrupt.
    pub fn find_best_move(
        &mut self,
        adapter: &mut G,
        rng: &mut ChaCha20Rng,
    ) -> Result<SearchOutcome<G::Move>, SearchError> {
        self.reset();
        let progressive = self.config.time_limit > 0.0;
        self.final_depth = self.config.max_depth.max(1);
        self.max_depth = if progressive {
            first_progressive_depth(self.config.first_depth, self.final_depth)
        } else {
            self.final_depth
        };
        // randomized results need comparable values for every root
        // candidate; cutoff-contaminated branches only carry bounds
        self.allow_alpha_beta = self.config.allow_alpha_beta
            && !(self.config.random_top_n > 0 && self.config.randomization_threshold > 0.0);
        if progressive {
            self.sum_final_search_depth = progressive_depth_sum(self.max_depth, self.final_depth);
        }
        debug!(
            depth = self.max_depth,
            final_depth = self.final_depth,
            progressive,
            "starting search"
        );

        let (root, depth, fell_back) = loop {
            self.level_start = self.start.elapsed();
            match self.run_level(adapter)? {
                LevelEnd::Aborted => {
                    let Some(root) = self.completed_root.take() else {
                        return Err(SearchError::Aborted);
                    };
                    debug!(depth = self.completed_depth, "using completed shallower level");
                    break (root, self.completed_depth, true);
                }
                LevelEnd::Completed => {
                    self.stats.levels += 1;
                    let Some(root) = self.last_root.take() else {
                        return Err(SearchError::Aborted);
                    };
                    let depth = self.max_depth;
                    debug!(
                        depth,
                        value = root.best_value,
                        nodes = self.stats.nodes,
                        "level complete"
                    );
                    if self.single_choice || !progressive || depth >= self.final_depth {
                        break (root, depth, false);
                    }
                    if let Some(best) = root.best() {
                        if best.game_over && !best.is_drawn() {
                            debug!("best move ends the game, deeper searches skipped");
                            break (root, depth, false);
                        }
                    }
                    if self.start.elapsed().as_secs_f64() > self.config.time_limit * 0.75 {
                        debug!("used most of the budget, deeper searches skipped");
                        break (root, depth, false);
                    }
                    self.increment_level(root, depth);
                }
            }
        };

        self.stats.elapsed = self.start.elapsed();
        let best = self.select_result(&root, rng)?;
        info!(
            best = ?best.payload,
            value = best.evaluation,
            depth,
            fell_back,
            nodes = self.stats.nodes,
            evaluations = self.stats.evaluations,
            alpha_cutoffs = self.stats.alpha_cutoffs,
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            "search finished"
        );
        Ok(SearchOutcome {
            best,
            depth,
            fell_back,
            stats: self.stats.clone(),
        })
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.last_root = None;
        self.completed_root = None;
        self.completed_depth = 0;
        self.killers.clear();
        self.best_killers.clear();
        self.pv_hint.clear();
        self.prev_root_order.clear();
        self.digest_stack.clear();
        self.single_choice = false;
        self.aborted = false;
        self.sum_search_depth = 0.0;
        self.sum_final_search_depth = 1.0;
        self.partial_search_depth = 1.0;
        self.start = Instant::now();
        self.level_start = Duration::ZERO;
        self.stats = SearchStats::default();
    }

    // ------------------------------------------------------------------
    // one progressive level
    // ------------------------------------------------------------------

    fn run_level(&mut self, adapter: &mut G) -> Result<LevelEnd, SearchError> {
        self.stack.clear();
        self.aborted = false;
        let mut root = self.prepare_frame(adapter, None, true)?;
        if root.moves.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }
        if root.moves.len() == 1 {
            // single reply: take it on its static evaluation, no need
            // for an accurate value below the bottleneck
            root.best_index = Some(0);
            root.best_value = root.moves[0].local_evaluation;
            root.next_index = 1;
            self.single_choice = true;
            self.last_root = Some(root);
            return Ok(LevelEnd::Completed);
        }
        self.stack.push(root);
        while !self.stack.is_empty() {
            self.stats.nodes += 1;
            if self.stats.nodes % 1024 == 0 {
                self.check_abort();
            }
            if self.aborted {
                while !self.stack.is_empty() {
                    self.return_from_completed(adapter)?;
                }
                self.last_root = None;
                return Ok(LevelEnd::Aborted);
            }
            self.step(adapter)?;
        }
        Ok(LevelEnd::Completed)
    }

    fn step(&mut self, adapter: &mut G) -> Result<(), SearchError> {
        enum Action<M> {
            Return,
            Leaf(usize),
            Descend(M, bool),
        }
        let depth = self.stack.len();
        let action = {
            let Some(top) = self.stack.last_mut() else {
                return Ok(());
            };
            if top.stop != StopReason::DontStop
                || top.all_terminals
                || top.next_index >= top.moves.len()
            {
                Action::Return
            } else {
                let idx = top.next_index;
                top.next_index += 1;
                let record = &top.moves[idx];
                if record.game_over || !record.search_deeper() {
                    Action::Leaf(idx)
                } else {
                    top.current_index = Some(idx);
                    let pv_child = top.on_pv
                        && self
                            .pv_hint
                            .get(depth - 1)
                            .map_or(false, |m| *m == record.payload);
                    Action::Descend(record.payload.clone(), pv_child)
                }
            }
        };
        match action {
            Action::Return => self.return_from_completed(adapter),
            Action::Leaf(idx) => {
                // fold the leaf in without a make/unmake round trip
                self.accumulate_terminal(idx);
                Ok(())
            }
            Action::Descend(mv, pv_child) => {
                self.make_move(adapter, &mv)?;
                let frame = self.prepare_frame(adapter, Some(depth), pv_child)?;
                trace!(depth = depth + 1, mv = ?mv, moves = frame.moves.len(), "descend");
                self.stack.push(frame);
                Ok(())
            }
        }
    }

    /// Fold a leaf candidate of the top frame into its best value.
    fn accumulate_terminal(&mut self, idx: usize) {
        let mut run_cutoffs = false;
        {
            let Some(top) = self.stack.last_mut() else {
                return;
            };
            let value = top.moves[idx].local_evaluation;
            top.moves[idx].evaluation = value;
            top.moves[idx].best_continuation = None;
            let is_null = top.moves[idx].is_null;
            if (top.best_index.is_none() || value > top.best_value)
                && (!self.config.use_null_move || self.config.return_null_move || !is_null)
            {
                top.best_value = value;
                top.best_index = Some(idx);
                run_cutoffs = true;
            }
        }
        if run_cutoffs {
            self.do_search_cutoffs();
        }
    }

    /// Pop the finished top frame and fold its result into the parent:
    /// rescore to the parent mover's perspective, extend the PV, revert
    /// the parent's applied move, and update the parent's window.
    fn return_from_completed(&mut self, adapter: &mut G) -> Result<(), SearchError> {
        let depth = self.stack.len();
        let Some(mut sn) = self.stack.pop() else {
            return Ok(());
        };
        self.record_killers(depth, &sn);
        if self.stack.is_empty() {
            self.last_root = Some(sn);
            return Ok(());
        }
        let best_record = match sn.best_index {
            Some(bi) => Some(sn.moves.swap_remove(bi)),
            None => None,
        };

        let (mv, new_best) = {
            let Some(parent) = self.stack.last_mut() else {
                return Ok(());
            };
            let Some(ci) = parent.current_index.take() else {
                return Err(SearchError::contract(
                    "search frame completed without a current move",
                ));
            };
            let parent_mover = parent.mover;
            let value_to_parent = match best_record {
                None => {
                    // no reply survived below; fall back to the applied
                    // move's own static value
                    let pcm = &mut parent.moves[ci];
                    pcm.evaluation = pcm.local_evaluation;
                    pcm.best_continuation = None;
                    pcm.evaluation
                }
                Some(cm) => {
                    let value = adapter.rescore(&cm, parent_mover);
                    let pcm = &mut parent.moves[ci];
                    pcm.evaluation = value;
                    pcm.game_over = cm.game_over;
                    if cm.game_over && cm.is_drawn() {
                        pcm.status = EvalStatus::EvaluatedDrawn;
                    }
                    // always extend the PV, even for moves that may not
                    // become best: null-move refutations are harvested
                    // from here
                    pcm.best_continuation = Some(Box::new(cm));
                    value
                }
            };
            let mut new_best = false;
            if parent.best_index.is_none() || value_to_parent > parent.best_value {
                let is_null = parent.moves[ci].is_null;
                if !self.config.use_null_move || self.config.return_null_move || !is_null {
                    parent.best_value = value_to_parent;
                    parent.best_index = Some(ci);
                    new_best = true;
                }
            }
            (parent.moves[ci].payload.clone(), new_best)
        };

        adapter.revert_move(&mv);
        if self.config.verify_hashes {
            let dig = adapter.content_hash();
            match self.digest_stack.pop() {
                Some(expected) if expected == dig => {}
                Some(expected) => {
                    return Err(SearchError::contract(format!(
                        "content hash mismatch reverting {:?}: expected {:#x}, got {:#x}",
                        mv, expected, dig
                    )))
                }
                None => return Err(SearchError::contract("digest stack underflow")),
            }
        }
        if new_best {
            self.do_search_cutoffs();
        }
        Ok(())
    }

    fn do_search_cutoffs(&mut self) {
        let allow_ab = self.allow_alpha_beta;
        let good_enough = self.config.good_enough;
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        let best = top.best_value;
        if allow_ab {
            if best >= -top.he_can_get {
                top.stop = StopReason::AlphaCutoff;
                self.stats.alpha_cutoffs += 1;
                self.stats.alpha_cutoff_cost += top.next_index.saturating_sub(1) as u64;
            }
            if top.i_can_get < best {
                top.i_can_get = best;
            }
        }
        if good_enough < best {
            top.stop = StopReason::GoodEnough;
            self.stats.good_enough_cutoffs += 1;
        }
    }

    // ------------------------------------------------------------------
    // frame preparation: list, evaluate, order
    // ------------------------------------------------------------------

    fn prepare_frame(
        &mut self,
        adapter: &mut G,
        pred_depth: Option<usize>,
        on_pv: bool,
    ) -> Result<SearchFrame<G::Move>, SearchError> {
        let depth = self.stack.len() + 1;
        let mover = adapter.current_player();

        // capture what we need from the predecessor up front
        let pred = pred_depth.and_then(|_| self.stack.last());
        let (window, cutoff_limit, mut promoted, pred_mover) = match pred {
            None => ((f64::NEG_INFINITY, f64::NEG_INFINITY), None, None, None),
            Some(p) => {
                let window = if mover == p.mover {
                    (p.i_can_get, p.he_can_get)
                } else {
                    (p.he_can_get, p.i_can_get)
                };
                let cutoff = if self.allow_alpha_beta && p.best_index.is_some() {
                    Some(if mover == p.mover {
                        -p.he_can_get
                    } else {
                        -p.i_can_get
                    })
                } else {
                    None
                };
                // the predecessor's null-move refutation, if it is a
                // move of ours, goes to the front of our list
                let promoted = if self.config.use_null_move && p.has_null {
                    p.moves[0]
                        .best_continuation
                        .as_deref()
                        .filter(|r| r.player == mover)
                        .map(|r| r.payload.clone())
                } else {
                    None
                };
                (window, cutoff, promoted, Some(p.mover))
            }
        };

        let legal = adapter.list_legal_moves();
        if legal.is_empty() {
            if adapter.is_game_over() {
                return Ok(SearchFrame::new(Vec::new(), mover, window, on_pv));
            }
            return Err(SearchError::NoLegalMoves);
        }
        let mut moves: Vec<MoveRecord<G::Move>> = legal
            .into_iter()
            .map(|m| MoveRecord::new(m, mover))
            .collect();

        let mut has_null = false;
        if self.config.use_null_move && pred_mover.map_or(true, |p| p != mover) {
            if let Some(nm) = adapter.null_move() {
                moves.insert(0, MoveRecord::null(nm, mover));
                has_null = true;
            }
        }

        let mut extra = usize::from(has_null);
        if self.config.allow_best_killer {
            if let Some(k) = self.best_killers.get(depth).and_then(|k| k.as_ref()) {
                if let Some(pos) = moves[extra..].iter().position(|m| m.payload == k.payload) {
                    moves.swap(extra + pos, extra);
                    extra += 1;
                    self.stats.killers += 1;
                }
            }
        }

        let mut all_terminals = true;
        let mut some_terminals = false;
        let mut idx = usize::from(has_null);
        while idx < moves.len() {
            self.stats.evaluations += 1;
            self.static_evaluate_move(adapter, &mut moves, idx, depth)?;
            let (leaf, local) = {
                let record = &moves[idx];
                (
                    record.game_over || !record.search_deeper(),
                    record.local_evaluation,
                )
            };
            some_terminals |= leaf;
            all_terminals &= leaf;
            if cutoff_limit.map_or(false, |lim| leaf && local >= lim) {
                // this move's value is final and already proves a
                // cutoff above; nothing past it can matter
                self.stats.skipped_evals += (moves.len() - idx - 1) as u64;
                moves.truncate(idx + 1);
            } else {
                if self.config.allow_killer && !leaf {
                    if let Some(k) = self.killers.get(depth).and_then(|k| k.as_ref()) {
                        if k.payload == moves[idx].payload {
                            moves[idx].evaluation = k.evaluation;
                            // NaN here flags a borrowed evaluation
                            moves[idx].local_evaluation = f64::NAN;
                            self.stats.killers += 1;
                        }
                    }
                }
                if let Some(p) = &promoted {
                    if *p == moves[idx].payload {
                        moves.swap(idx, extra);
                        extra += 1;
                        promoted = None;
                        self.stats.null_promotions += 1;
                    }
                }
            }
            idx += 1;
        }

        if some_terminals {
            // endings on offer: drop the null move and ordering
            // exemptions so the terminals really come first
            if has_null {
                moves.remove(0);
                has_null = false;
            }
            extra = 0;
        }
        if all_terminals {
            moves[extra..].sort_by(|a, b| a.cmp_by_strength(b));
        } else {
            moves[extra..].sort_by(|a, b| a.cmp_for_search(b));
        }

        if depth == 1 && !self.prev_root_order.is_empty() {
            let order = self.prev_root_order.clone();
            presort(&mut moves, &order);
        } else if on_pv && !all_terminals {
            if let Some(hint) = self.pv_hint.get(depth - 1) {
                if let Some(pos) = moves[extra..].iter().position(|m| m.payload == *hint) {
                    moves[extra..=extra + pos].rotate_right(1);
                }
            }
        }

        if !all_terminals {
            adapter.width_limit_moves(depth, self.max_depth, &mut moves);
        }

        let mut frame = SearchFrame::new(moves, mover, window, on_pv);
        frame.has_null = has_null;
        frame.all_terminals = all_terminals;
        frame.some_terminals = some_terminals;
        if all_terminals {
            // every reply is resolved; the sorted first move is the
            // answer and the frame returns on its first step
            frame.best_index = Some(0);
            frame.best_value = frame.moves[0].local_evaluation;
        }
        Ok(frame)
    }

    fn static_evaluate_move(
        &mut self,
        adapter: &mut G,
        moves: &mut [MoveRecord<G::Move>],
        idx: usize,
        depth: usize,
    ) -> Result<(), SearchError> {
        let verify = self.config.verify_hashes;
        let before = verify.then(|| adapter.content_hash());
        let record = &mut moves[idx];
        adapter.apply_move(&record.payload);
        let game_over = adapter.is_game_over();
        let value = adapter.static_evaluate(record.player);
        let status = if game_over {
            if adapter.is_draw() {
                EvalStatus::EvaluatedDrawn
            } else {
                EvalStatus::Evaluated
            }
        } else {
            adapter.evaluation_status(depth, self.max_depth)
        };
        adapter.revert_move(&record.payload);
        if let Some(b) = before {
            let after = adapter.content_hash();
            if b != after {
                return Err(SearchError::contract(format!(
                    "content hash changed across evaluation of {:?}: {:#x} -> {:#x}",
                    record.payload, b, after
                )));
            }
        }
        record.set_evaluations(value, status, game_over);
        Ok(())
    }

    fn make_move(&mut self, adapter: &mut G, mv: &G::Move) -> Result<(), SearchError> {
        if self.config.verify_hashes {
            let before = adapter.content_hash();
            adapter.apply_move(mv);
            adapter.revert_move(mv);
            let replayed = adapter.content_hash();
            if before != replayed {
                return Err(SearchError::contract(format!(
                    "apply/revert of {:?} did not restore the position: {:#x} -> {:#x}",
                    mv, before, replayed
                )));
            }
            self.digest_stack.push(before);
        }
        adapter.apply_move(mv);
        Ok(())
    }

    fn record_killers(&mut self, depth: usize, sn: &SearchFrame<G::Move>) {
        if !self.config.allow_killer && !self.config.allow_best_killer {
            return;
        }
        let Some(best) = sn.best() else {
            return;
        };
        if best.is_null || best.game_over || !best.search_deeper() || !best.evaluation.is_finite() {
            return;
        }
        if self.killers.len() <= depth {
            self.killers.resize(depth + 1, None);
            self.best_killers.resize(depth + 1, None);
        }
        let entry = KillerEntry {
            payload: best.payload.clone(),
            evaluation: best.evaluation,
        };
        if self
            .best_killers[depth]
            .as_ref()
            .map_or(true, |k| entry.evaluation > k.evaluation)
        {
            self.best_killers[depth] = Some(entry.clone());
        }
        self.killers[depth] = Some(entry);
    }

    // ------------------------------------------------------------------
    // progressive deepening
    // ------------------------------------------------------------------

    fn increment_level(&mut self, root: SearchFrame<G::Move>, depth: usize) {
        self.sum_search_depth += self.partial_search_depth;
        self.partial_search_depth *= 2.0;
        self.max_depth += 1;
        if self.max_depth < self.final_depth {
            if self.start.elapsed().as_secs_f64() > self.config.time_limit * 0.2 {
                debug!("over a fifth of the budget used, deepening a single level");
            } else {
                self.max_depth += 1;
            }
        }

        // steer the next level with what this one learned
        self.prev_root_order = strength_order(&root);
        self.pv_hint = root
            .best()
            .map(|b| b.principal_variation().into_iter().cloned().collect())
            .unwrap_or_default();
        self.killers.clear();
        self.best_killers.clear();

        self.completed_root = Some(root);
        self.completed_depth = depth;
        debug!(depth = self.max_depth, "incrementing progressive level");
    }

    fn check_abort(&mut self) {
        if self.config.time_limit <= 0.0 || self.completed_root.is_none() {
            // nothing to fall back to yet; let the level finish
            return;
        }
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed > self.config.time_limit {
            debug!(elapsed, "aborting level at the time limit");
            self.aborted = true;
            return;
        }
        let pc = self.level_percent();
        if pc > 0.05 {
            let level_start = self.level_start.as_secs_f64();
            let projected_end = (elapsed - level_start) / pc + level_start;
            if projected_end > self.config.time_limit * 1.5 {
                debug!(projected_end, "aborting level on projected overrun");
                self.aborted = true;
            }
        }
    }

    // ------------------------------------------------------------------
    // result selection
    // ------------------------------------------------------------------

    fn select_result(
        &self,
        root: &SearchFrame<G::Move>,
        rng: &mut ChaCha20Rng,
    ) -> Result<MoveRecord<G::Move>, SearchError> {
        if self.config.random_top_n > 0 && root.moves.len() > 1 {
            let n = rng.gen_range(0..self.config.random_top_n);
            if let Some(pick) = self.nth_good_move(root, n, self.config.randomization_threshold) {
                return Ok(pick);
            }
        }
        root.best()
            .cloned()
            .ok_or(SearchError::Aborted)
    }

    /// Pick the `n`th best evaluated root move, stopping early once
    /// moves fall more than `dif` below the best. Used to keep play
    /// from being completely predictable.
    fn nth_good_move(
        &self,
        root: &SearchFrame<G::Move>,
        n: usize,
        dif: f64,
    ) -> Option<MoveRecord<G::Move>> {
        let evaluated = if root.all_terminals {
            root.moves.len()
        } else {
            root.next_index.min(root.moves.len())
        };
        if evaluated == 0 {
            return None;
        }
        let best_value = root.best()?.evaluation;
        let mut sorted: Vec<&MoveRecord<G::Move>> = root.moves[..evaluated].iter().collect();
        sorted.sort_by(|a, b| a.cmp_by_strength(b));
        let mut nmoves = sorted.len();
        if dif > 0.0 {
            while nmoves > 0 {
                let next = sorted[nmoves - 1];
                if self.config.use_null_move && next.is_null {
                    break;
                }
                if best_value - next.evaluation < dif {
                    break;
                }
                nmoves -= 1;
            }
        }
        if nmoves == 0 {
            return None;
        }
        let n = n % nmoves;
        let mut result = sorted[0];
        for candidate in sorted.iter().take(n + 1) {
            if !self.config.use_null_move || !candidate.is_null {
                result = candidate;
            }
        }
        Some((*result).clone())
    }
}

/// Starting depth of a progressive search.
fn first_progressive_depth(first_depth: usize, final_depth: usize) -> usize {
    if first_depth > 0 {
        first_depth.min(final_depth)
    } else if final_depth == 4 {
        3
    } else if final_depth < 4 {
        final_depth
    } else {
        final_depth - final_depth / 2
    }
}

/// Weighted level count for progress estimation: each level is assumed
/// to cost double the previous one.
fn progressive_depth_sum(first_depth: usize, final_depth: usize) -> f64 {
    let mut depth = first_depth;
    let mut step: f64 = 1.0;
    let mut sum: f64 = 0.0;
    while depth <= final_depth + 1 {
        sum += step;
        depth += 2;
        step += step;
    }
    sum.max(1.0)
}

/// Strength order of a completed root's evaluated moves.
fn strength_order<M: Clone>(root: &SearchFrame<M>) -> Vec<M> {
    let evaluated = if root.all_terminals {
        root.moves.len()
    } else {
        root.next_index.min(root.moves.len())
    };
    let mut sorted: Vec<&MoveRecord<M>> = root.moves[..evaluated]
        .iter()
        .filter(|m| !m.is_null)
        .collect();
    sorted.sort_by(|a, b| a.cmp_by_strength(b));
    sorted.into_iter().map(|m| m.payload.clone()).collect()
}

/// Reorder `moves` so payloads appearing in `order` come first, in that
/// order; the rest keep their relative positions.
fn presort<M: Clone + PartialEq>(moves: &mut [MoveRecord<M>], order: &[M]) {
    let mut front = 0;
    for wanted in order {
        if front >= moves.len() {
            break;
        }
        if let Some(pos) = moves[front..].iter().position(|m| m.payload == *wanted) {
            moves[front..=front + pos].rotate_right(1);
            front += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_depth_schedule_matches_defaults() {
        assert_eq!(first_progressive_depth(0, 4), 3);
        assert_eq!(first_progressive_depth(0, 3), 3);
        assert_eq!(first_progressive_depth(0, 2), 2);
        assert_eq!(first_progressive_depth(0, 8), 4);
        assert_eq!(first_progressive_depth(0, 9), 5);
        assert_eq!(first_progressive_depth(2, 8), 2);
        assert_eq!(first_progressive_depth(12, 8), 8);
    }

    #[test]
    fn depth_sum_doubles_per_level() {
        // levels at 4, 6, 8 weigh 1 + 2 + 4
        assert_eq!(progressive_depth_sum(4, 8), 7.0);
        // a lone level at the final depth carries unit weight
        assert_eq!(progressive_depth_sum(6, 6), 1.0);
    }

    #[test]
    fn presort_brings_known_moves_forward() {
        let mut moves: Vec<MoveRecord<u8>> =
            (0..5u8).map(|m| MoveRecord::new(m, 1)).collect();
        presort(&mut moves, &[3, 1]);
        let order: Vec<u8> = moves.iter().map(|m| m.payload).collect();
        assert_eq!(order, vec![3, 1, 0, 2, 4]);
    }
}
