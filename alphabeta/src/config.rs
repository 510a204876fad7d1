//! Searcher configuration.

use serde::Deserialize;

/// Tunables for the iterative-deepening alpha-beta searcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlphaBetaConfig {
    /// Final search depth in plies.
    pub max_depth: usize,

    /// Time budget in seconds. Greater than zero enables progressive
    /// deepening with this as the per-move budget; zero runs a single
    /// fixed-depth search with no clock.
    pub time_limit: f64,

    /// Depth of the first progressive level. Zero derives it from
    /// `max_depth`: depth 4 starts at 3, shallower searches start at
    /// full depth, deeper ones at roughly half.
    pub first_depth: usize,

    /// Pick uniformly among the top `random_top_n` root moves whose
    /// evaluation is within `randomization_threshold` of the best.
    /// Zero always plays the best move.
    pub random_top_n: usize,
    pub randomization_threshold: f64,

    /// Alpha-beta window cutoffs. Disabled automatically when the
    /// result is randomized, because moves past a cutoff carry bounds
    /// rather than real values.
    pub allow_alpha_beta: bool,

    /// Stop a node early once its best value exceeds this. Useful as
    /// "any win will do"; infinity never triggers.
    pub good_enough: f64,

    /// Borrow cousin evaluations to order moves.
    pub allow_killer: bool,
    /// Promote only the single best cousin move to the front.
    pub allow_best_killer: bool,

    /// Search a null move first at each turn change and use its
    /// refutation to order the real moves. Requires the adapter to
    /// supply a null move.
    pub use_null_move: bool,
    /// Allow the null move itself to be reported as best. Off by
    /// default; a "best move" of pass usually means the search depth
    /// was too shallow to find an improvement.
    pub return_null_move: bool,

    /// Verify content hashes around every apply/revert pair.
    pub verify_hashes: bool,
}

impl Default for AlphaBetaConfig {
    fn default() -> Self {
        AlphaBetaConfig {
            max_depth: 6,
            time_limit: 0.0,
            first_depth: 0,
            random_top_n: 0,
            randomization_threshold: 0.0,
            allow_alpha_beta: true,
            good_enough: f64::INFINITY,
            allow_killer: false,
            allow_best_killer: false,
            use_null_move: false,
            return_null_move: false,
            verify_hashes: true,
        }
    }
}

impl AlphaBetaConfig {
    /// Small, deterministic settings for tests.
    pub fn for_testing() -> Self {
        AlphaBetaConfig {
            max_depth: 4,
            ..Default::default()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = seconds;
        self
    }

    pub fn with_first_depth(mut self, depth: usize) -> Self {
        self.first_depth = depth;
        self
    }

    pub fn with_randomization(mut self, top_n: usize, threshold: f64) -> Self {
        self.random_top_n = top_n;
        self.randomization_threshold = threshold;
        self
    }

    pub fn with_killers(mut self, killer: bool, best_killer: bool) -> Self {
        self.allow_killer = killer;
        self.allow_best_killer = best_killer;
        self
    }

    pub fn with_null_move(mut self, enabled: bool) -> Self {
        self.use_null_move = enabled;
        self
    }

    pub fn with_good_enough(mut self, threshold: f64) -> Self {
        self.good_enough = threshold;
        self
    }

    pub fn with_verify_hashes(mut self, enabled: bool) -> Self {
        self.verify_hashes = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_plain_alpha_beta() {
        let c = AlphaBetaConfig::default();
        assert!(c.allow_alpha_beta);
        assert_eq!(c.random_top_n, 0);
        assert_eq!(c.time_limit, 0.0);
        assert!(c.good_enough.is_infinite());
    }

    #[test]
    fn builders_compose() {
        let c = AlphaBetaConfig::for_testing()
            .with_max_depth(8)
            .with_time_limit(1.5)
            .with_randomization(3, 0.25)
            .with_killers(true, true);
        assert_eq!(c.max_depth, 8);
        assert_eq!(c.time_limit, 1.5);
        assert_eq!(c.random_top_n, 3);
        assert!(c.allow_best_killer);
    }
}
