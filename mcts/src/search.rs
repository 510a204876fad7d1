//! Search coordination: worker lifecycle, termination, and result
//! selection.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, trace};

use engine_core::{GameAdapter, SearchError};

use crate::config::UctConfig;
use crate::node::{ChildStat, UctNode};
use crate::worker::{self, SharedState, UctWorker};

/// Polls with no playout progress before the workers are declared
/// stuck.
const STALL_LIMIT: u32 = 100;

/// Seconds the playout rate may sit below a tenth of its peak before
/// the search gives up on further progress.
const RATE_STALL_SECS: f64 = 5.0;

/// Result of a Monte-Carlo search.
#[derive(Debug, Clone)]
pub struct UctOutcome<M> {
    /// The selected move.
    pub best: M,
    /// Mean playout value of the selected move, for its mover.
    pub win_rate: f64,
    /// Playouts through the selected move.
    pub visits: i64,
    /// Total playouts run.
    pub playouts: u64,
    /// Wall-clock seconds spent.
    pub elapsed: f64,
    /// The move is a proven win; the search stopped early.
    pub decided: bool,
    /// Per-move statistics at the root.
    pub moves: Vec<ChildStat<M>>,
}

/// Multi-threaded UCT searcher over a [`GameAdapter`].
pub struct UctSearcher<G: GameAdapter> {
    config: Arc<UctConfig>,
    _marker: std::marker::PhantomData<fn() -> G>,
}

impl<G> UctSearcher<G>
where
    G: GameAdapter + 'static,
    G::Move: 'static,
{
    pub fn new(config: UctConfig) -> Self {
        UctSearcher {
            config: Arc::new(config),
            _marker: std::marker::PhantomData,
        }
    }

    /// Search the current position and pick a move.
    ///
    /// Errors with [`SearchError::NoLegalMoves`] on a position with no
    /// moves; a position with exactly one legal move is returned
    /// without running any playouts.
    pub fn search(&self, game: &mut G) -> Result<UctOutcome<G::Move>, SearchError> {
        let start = Instant::now();
        let config = Arc::clone(&self.config);

        let moves = game.list_legal_moves();
        if moves.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }
        if moves.len() == 1 {
            let payload = moves.into_iter().next().ok_or_else(|| {
                SearchError::contract("legal move list changed length under us")
            })?;
            debug!("single legal move, skipping search");
            return Ok(UctOutcome {
                best: payload.clone(),
                win_rate: 0.0,
                visits: 0,
                playouts: 0,
                elapsed: start.elapsed().as_secs_f64(),
                decided: false,
                moves: vec![ChildStat {
                    payload,
                    visits: 0,
                    win_rate: 0.0,
                    game_over: false,
                    evaluation: f64::NAN,
                    alive: true,
                }],
            });
        }

        let seed = match config.seed {
            Some(seed) => seed,
            None => game.content_hash(),
        };
        let mut master = ChaCha20Rng::seed_from_u64(seed);
        trace!(seed, moves = moves.len(), "starting search");

        let root: Arc<UctNode<G::Move>> = UctNode::new_root();
        let ceiling = playout_ceiling(&config);
        let worker_count = config.threads.max(1);
        let shared = Arc::new(SharedState::new(worker_count, ceiling));

        // root children exist before any worker starts, so hopeless
        // pruning and the decided check always have a list to look at
        let stored = worker::expand_root(game, &root, &config)?;
        shared.add_stored_children(stored);

        if config.threads == 0 {
            self.run_inline(game, &root, &shared, &mut master, start)?;
        } else {
            self.run_threaded(game, &root, &shared, &mut master, start)?;
        }

        if let Some(err) = shared.take_error() {
            return Err(err);
        }

        let playouts = shared.playouts();
        let elapsed = start.elapsed().as_secs_f64();
        let outcome = self.select_result(&root, &mut master, playouts, elapsed)?;
        info!(
            best = ?outcome.best,
            win_rate = outcome.win_rate,
            visits = outcome.visits,
            playouts,
            elapsed,
            decided = outcome.decided,
            stored_children = shared.stored_children(),
            "search complete"
        );
        Ok(outcome)
    }

    /// Single-threaded mode: playouts run on the calling thread in
    /// batches, with the termination checks between batches. With a
    /// fixed seed this is fully deterministic.
    fn run_inline(
        &self,
        game: &mut G,
        root: &Arc<UctNode<G::Move>>,
        shared: &Arc<SharedState>,
        master: &mut ChaCha20Rng,
        start: Instant,
    ) -> Result<(), SearchError> {
        let config = &self.config;
        let mut worker = UctWorker {
            game: game.clone(),
            rng: ChaCha20Rng::seed_from_u64(master.gen()),
            root: Arc::clone(root),
            config: Arc::clone(config),
            shared: Arc::clone(shared),
            index: 0,
        };
        let mut stall_batches = 0u32;
        while !shared.stopped() {
            let before = shared.playouts();
            for _ in 0..64 {
                if shared.stopped() {
                    break;
                }
                let playouts = worker.step()?;
                shared.note_playouts(playouts);
            }
            // every branch dead: batches stop counting playouts
            if shared.playouts() == before {
                stall_batches += 1;
                if stall_batches >= STALL_LIMIT {
                    debug!("no playout progress, stopping");
                    shared.stop();
                }
            } else {
                stall_batches = 0;
            }
            if self.should_stop(root, shared, start) {
                shared.stop();
            }
        }
        Ok(())
    }

    fn run_threaded(
        &self,
        game: &mut G,
        root: &Arc<UctNode<G::Move>>,
        shared: &Arc<SharedState>,
        master: &mut ChaCha20Rng,
        start: Instant,
    ) -> Result<(), SearchError> {
        let config = &self.config;
        let mut handles = Vec::with_capacity(config.threads);
        for index in 0..config.threads {
            let worker = UctWorker {
                game: game.clone(),
                rng: ChaCha20Rng::seed_from_u64(master.gen()),
                root: Arc::clone(root),
                config: Arc::clone(config),
                shared: Arc::clone(shared),
                index,
            };
            let handle = thread::Builder::new()
                .name(format!("uct-worker-{index}"))
                .spawn(move || worker.run())
                .map_err(|e| {
                    shared.stop();
                    SearchError::WorkerSpawn(e.to_string())
                })?;
            handles.push(handle);
        }

        let poll = poll_interval(config);
        let mut last_playouts = 0u64;
        let mut stall_polls = 0u32;
        let mut peak_rate = 0.0f64;
        let mut rate_low_since: Option<Instant> = None;
        while !shared.stopped() {
            thread::sleep(poll);
            let playouts = shared.playouts();
            if self.should_stop(root, shared, start) {
                shared.stop();
                break;
            }

            if playouts == last_playouts {
                stall_polls += 1;
                if stall_polls >= STALL_LIMIT {
                    debug!(playouts, "no playout progress, stopping");
                    shared.stop();
                    break;
                }
            } else {
                stall_polls = 0;
                let rate = (playouts - last_playouts) as f64 / poll.as_secs_f64();
                peak_rate = peak_rate.max(rate);
                if rate < peak_rate * 0.1 {
                    let since = *rate_low_since.get_or_insert_with(Instant::now);
                    if since.elapsed().as_secs_f64() > RATE_STALL_SECS {
                        debug!(rate, peak_rate, "playout rate collapsed, stopping");
                        shared.stop();
                        break;
                    }
                } else {
                    rate_low_since = None;
                }
            }
            last_playouts = playouts;
        }
        shared.stop();

        // bounded shutdown: a worker stuck inside the adapter must not
        // hang the caller
        let deadline = Instant::now() + poll.max(Duration::from_millis(250)) * 8;
        loop {
            let stalled: Vec<usize> = (0..self.config.threads)
                .filter(|&i| !shared.worker_finished(i))
                .collect();
            if stalled.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                debug!(?stalled, "workers failed to stop");
                return Err(SearchError::ThreadDeadlock { stalled });
            }
            thread::sleep(Duration::from_millis(5));
        }
        for handle in handles {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Termination checks shared by both modes. Also drives hopeless
    /// pruning once the progress estimate has settled.
    fn should_stop(
        &self,
        root: &Arc<UctNode<G::Move>>,
        shared: &SharedState,
        start: Instant,
    ) -> bool {
        let config = &self.config;
        let playouts = shared.playouts();
        let elapsed = start.elapsed().as_secs_f64();
        let done = part_done(playouts, elapsed, config, shared.playout_ceiling);
        if done >= 1.0 {
            return true;
        }
        // absolute bound, even when the playout floor is unmet
        if config.time_budget > 0.0 && elapsed > config.time_budget * 1.5 {
            debug!(elapsed, "over hard time bound");
            return true;
        }
        if config.only_child_optimization && root.is_only_child_collapsed() {
            debug!("root decided, stopping");
            return true;
        }
        if config.stored_child_limit_stop
            && config.stored_child_limit > 0
            && shared.stored_children() >= config.stored_child_limit
        {
            debug!("stored child limit reached, stopping");
            return true;
        }
        if config.dead_child_optimization && done > 0.2 && done < 1.0 {
            let remaining = playouts as f64 * (1.0 - done) / done;
            let killed = root.kill_hopeless_children(
                remaining,
                config.kill_hopeless_by_visits,
                config.kill_hopeless_share,
                config.kill_share_power,
            );
            if killed > 0 {
                trace!(killed, remaining, "pruned hopeless branches");
            }
        }
        false
    }

    fn select_result(
        &self,
        root: &Arc<UctNode<G::Move>>,
        master: &mut ChaCha20Rng,
        playouts: u64,
        elapsed: f64,
    ) -> Result<UctOutcome<G::Move>, SearchError> {
        let stats = root.child_stats();
        let decided = root.decided_move();
        let pick = if let Some(record) = &decided {
            stats
                .iter()
                .position(|s| s.payload == record.payload)
                .ok_or_else(|| SearchError::contract("decided move missing from root"))?
        } else if self.config.win_randomization > 0.0 {
            // jitter win rates so near-equal moves vary between games
            let mut best: Option<(usize, f64)> = None;
            for (i, stat) in stats.iter().enumerate() {
                if !stat.alive || stat.visits == 0 {
                    continue;
                }
                let score = stat.win_rate + master.gen::<f64>() * self.config.win_randomization;
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((i, score));
                }
            }
            best.ok_or(SearchError::Aborted)?.0
        } else {
            // children[0] is kept most-visited, but scan anyway in
            // case the search stopped mid-rotation
            let mut best: Option<(usize, i64, f64)> = None;
            for (i, stat) in stats.iter().enumerate() {
                if !stat.alive {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((_, v, w)) => stat.visits > v || (stat.visits == v && stat.win_rate > w),
                };
                if better {
                    best = Some((i, stat.visits, stat.win_rate));
                }
            }
            match best {
                Some((i, _, _)) => i,
                // every branch is a proven loss; play the least bad
                // ending rather than resigning
                None => stats
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| {
                        let key = |s: &ChildStat<G::Move>| {
                            if s.evaluation.is_finite() {
                                s.evaluation
                            } else {
                                f64::NEG_INFINITY
                            }
                        };
                        key(a).total_cmp(&key(b))
                    })
                    .map(|(i, _)| i)
                    .ok_or(SearchError::Aborted)?,
            }
        };
        let stat = &stats[pick];
        Ok(UctOutcome {
            best: stat.payload.clone(),
            win_rate: if stat.game_over {
                stat.evaluation
            } else {
                stat.win_rate
            },
            visits: stat.visits,
            playouts,
            elapsed,
            decided: decided.is_some(),
            moves: stats,
        })
    }
}

/// Maximum playouts for this search: the explicit ceiling, or one
/// derived from the expected playout rate over the budget.
fn playout_ceiling(config: &UctConfig) -> u64 {
    if config.max_playouts > 0 {
        config.max_playouts
    } else if config.random_moves_per_second > 0.0 && config.time_budget > 0.0 {
        (config.random_moves_per_second * config.time_budget).ceil() as u64
    } else {
        0
    }
}

fn poll_interval(config: &UctConfig) -> Duration {
    let secs = if config.time_budget > 0.0 {
        (config.time_budget / 10.0).clamp(0.010, 0.250)
    } else {
        0.050
    };
    Duration::from_secs_f64(secs)
}

/// Fraction of the search considered complete: whichever of the
/// playout ceiling or the time budget is furthest along, except that
/// the time budget alone cannot finish the search while a playout
/// floor is unmet.
fn part_done(playouts: u64, elapsed: f64, config: &UctConfig, ceiling: u64) -> f64 {
    let time_frac = if config.time_budget > 0.0 {
        elapsed / config.time_budget
    } else {
        0.0
    };
    let floor_frac = if config.min_playouts > 0 {
        playouts as f64 / config.min_playouts as f64
    } else {
        f64::INFINITY
    };
    let ceiling_frac = if ceiling > 0 {
        playouts as f64 / ceiling as f64
    } else {
        0.0
    };
    ceiling_frac.max(time_frac.min(floor_frac))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_from_rate_and_budget() {
        let c = UctConfig::default().with_time_budget(2.0);
        assert_eq!(playout_ceiling(&c), 0);
        let mut c = c;
        c.random_moves_per_second = 1_000.0;
        assert_eq!(playout_ceiling(&c), 2_000);
        c.max_playouts = 500;
        assert_eq!(playout_ceiling(&c), 500);
    }

    #[test]
    fn part_done_honors_playout_floor() {
        let c = UctConfig::default().with_playouts(1_000, 0).with_time_budget(1.0);
        // budget elapsed but only a tenth of the floor run
        assert!(part_done(100, 1.0, &c, 0) < 1.0);
        assert!(part_done(1_000, 1.0, &c, 0) >= 1.0);
        // ceiling reached finishes regardless of time
        assert!(part_done(2_000, 0.1, &c, 2_000) >= 1.0);
    }

    #[test]
    fn poll_interval_tracks_budget() {
        let fast = UctConfig::default().with_time_budget(0.05);
        assert_eq!(poll_interval(&fast), Duration::from_millis(10));
        let slow = UctConfig::default().with_time_budget(60.0);
        assert_eq!(poll_interval(&slow), Duration::from_millis(250));
    }
}
