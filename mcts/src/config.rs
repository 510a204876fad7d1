//! Monte-Carlo searcher configuration.

use serde::Deserialize;

/// Tunables for the UCT searcher.
///
/// The defaults are a reasonable mid-strength setup: four worker
/// threads, five seconds per move, exploration at 0.5, a forced tree
/// depth of three, and hopeless-branch pruning on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UctConfig {
    /// Worker threads. Zero runs playouts on the calling thread,
    /// which also makes the search deterministic for a fixed seed.
    pub threads: usize,

    /// Copy the adapter for each playout instead of reverting moves.
    /// Faster for games with cheap state and expensive unmake.
    pub blitz: bool,

    /// Time budget in seconds.
    pub time_budget: f64,
    /// Keep searching until at least this many playouts, even past the
    /// nominal budget fraction. Zero disables the floor.
    pub min_playouts: u64,
    /// Stop once this many playouts have run. Zero disables the
    /// ceiling.
    pub max_playouts: u64,
    /// Expected playout rate. When set and `max_playouts` is zero, the
    /// ceiling is derived as `rate * time_budget`.
    pub random_moves_per_second: f64,

    /// Exploration weight in the UCT score.
    pub alpha: f64,
    /// Virtual visits seeding each new node's win rate from its static
    /// evaluation. Zero disables the bias.
    pub initial_win_rate_weight: f64,
    /// A leaf expands when `visits * rate` exceeds the log of its
    /// parent's visits, or on its third visit.
    pub node_expansion_rate: f64,
    /// Expansion is forced (no throttling) above this depth.
    pub uct_tree_depth: usize,

    /// Heavy playouts: order children of shallow nodes by static
    /// evaluation, normalized to [-1, 1] and used as the win-rate
    /// seed.
    pub sort_moves: bool,
    /// Depth below which `sort_moves` applies.
    pub uct_sort_depth: usize,
    /// Random playouts run per tree descent.
    pub simulations_per_node: u32,
    /// Cap on children kept per expansion, strongest first when
    /// sorted. Zero keeps all.
    pub move_limit: usize,

    /// Global budget of stored children across the tree.
    pub stored_child_limit: usize,
    /// Stop the search when the budget is exhausted instead of merely
    /// freezing expansion.
    pub stored_child_limit_stop: bool,

    /// Prune root branches that can no longer catch the leader.
    pub dead_child_optimization: bool,
    /// Fraction of the remaining playouts a trailing branch must be
    /// able to win to stay alive.
    pub kill_hopeless_share: f64,
    /// Prune by raw visit deficit rather than win-rate deficit.
    pub kill_hopeless_by_visits: bool,
    /// Exponent on the active-children divisor when computing a
    /// trailing branch's fair share of the remaining visits.
    pub kill_share_power: f64,

    /// Collapse a parent to a single child once that child is a proven
    /// win for the player to move.
    pub only_child_optimization: bool,
    /// Select proven winning children outright, skipping simulation.
    pub terminal_node_optimization: bool,

    /// Jitter added to root win rates before the final argmax, to vary
    /// play among near-equal moves. Zero picks the strict best.
    pub win_randomization: f64,

    /// Cap on random playout length. Zero defers to the adapter.
    pub max_random_playout_depth: usize,

    /// Verify content hashes around every apply/revert pair. Off by
    /// default on the playout hot path.
    pub verify_hashes: bool,

    /// Master RNG seed. `None` derives it from the root position's
    /// content hash, so repeated searches of one position explore the
    /// same way.
    pub seed: Option<u64>,
}

impl Default for UctConfig {
    fn default() -> Self {
        UctConfig {
            threads: 4,
            blitz: false,
            time_budget: 5.0,
            min_playouts: 0,
            max_playouts: 0,
            random_moves_per_second: 0.0,
            alpha: 0.5,
            initial_win_rate_weight: 0.0,
            node_expansion_rate: 1.0,
            uct_tree_depth: 3,
            sort_moves: false,
            uct_sort_depth: 0,
            simulations_per_node: 1,
            move_limit: 0,
            stored_child_limit: 100_000,
            stored_child_limit_stop: false,
            dead_child_optimization: true,
            kill_hopeless_share: 0.5,
            kill_hopeless_by_visits: true,
            kill_share_power: 0.5,
            only_child_optimization: true,
            terminal_node_optimization: true,
            win_randomization: 0.0,
            max_random_playout_depth: 0,
            verify_hashes: false,
            seed: None,
        }
    }
}

impl UctConfig {
    /// Deterministic single-threaded settings for tests: fixed seed,
    /// playout-count termination, hash verification on.
    pub fn for_testing() -> Self {
        UctConfig {
            threads: 0,
            time_budget: 10.0,
            min_playouts: 2_000,
            max_playouts: 2_000,
            verify_hashes: true,
            seed: Some(42),
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_time_budget(mut self, seconds: f64) -> Self {
        self.time_budget = seconds;
        self
    }

    pub fn with_playouts(mut self, min: u64, max: u64) -> Self {
        self.min_playouts = min;
        self.max_playouts = max;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_blitz(mut self, blitz: bool) -> Self {
        self.blitz = blitz;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sorted_children(mut self, depth: usize, weight: f64) -> Self {
        self.sort_moves = depth > 0;
        self.uct_sort_depth = depth;
        self.initial_win_rate_weight = weight;
        self
    }

    pub fn with_stored_child_limit(mut self, limit: usize, stop: bool) -> Self {
        self.stored_child_limit = limit;
        self.stored_child_limit_stop = stop;
        self
    }
}
