//! Search configuration parameters.

use serde::{Deserialize, Serialize};

/// Configuration for the UCT search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Exploration constant in the PUCT child-selection formula.
    pub c_puct: f32,

    /// Whether to perturb root priors with Dirichlet noise (training-time
    /// exploration).
    pub noise: bool,

    /// Fraction of the root prior replaced by noise.
    pub noise_epsilon: f32,

    /// Concentration of the Dirichlet distribution.
    pub noise_alpha: f32,

    /// Below this move number the root move is randomized proportionally
    /// to visit counts. 0 disables randomization.
    pub random_move_count: u32,

    /// Completed-playout budget per search. 0 means unlimited.
    pub max_playouts: u32,

    /// Threads running simulations, main thread included.
    pub num_threads: usize,

    /// Node-allocation ceiling; past it, leaves are evaluated without
    /// being expanded.
    pub max_tree_size: usize,

    /// Virtual-loss units applied per pending descent through a node.
    pub virtual_loss_count: i32,

    /// Resign when the best winrate drops below this percentage.
    pub resign_percent: u32,

    /// When set, pass whenever the search says so without checking
    /// whether passing actually wins.
    pub dumb_pass: bool,

    /// Suppress analysis and statistics output.
    pub quiet: bool,

    /// Boost expansion priors of moves that complete a five for either
    /// side, so forcing lines dominate the prior mass.
    pub tactical_priors: bool,

    /// RNG seed for noise and early-game randomization. `None` seeds from
    /// the OS.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            c_puct: 0.85,
            noise: false,
            noise_epsilon: 0.25,
            noise_alpha: 0.03,
            random_move_count: 0,
            max_playouts: 0,
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_tree_size: 40_000_000,
            virtual_loss_count: 3,
            resign_percent: 10,
            dumb_pass: false,
            quiet: false,
            tactical_priors: true,
            seed: None,
        }
    }
}

impl SearchConfig {
    /// Small, single-threaded, deterministic configuration for tests.
    pub fn for_testing() -> Self {
        SearchConfig {
            max_playouts: 100,
            num_threads: 1,
            quiet: true,
            seed: Some(42),
            ..SearchConfig::default()
        }
    }

    pub fn with_playouts(mut self, playouts: u32) -> Self {
        self.max_playouts = playouts;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads.max(1);
        self
    }

    pub fn with_c_puct(mut self, c_puct: f32) -> Self {
        self.c_puct = c_puct;
        self
    }

    pub fn with_noise(mut self, epsilon: f32, alpha: f32) -> Self {
        self.noise = true;
        self.noise_epsilon = epsilon;
        self.noise_alpha = alpha;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Behavior flags passed to a root decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassFlags(u32);

impl PassFlags {
    pub const NONE: PassFlags = PassFlags(0);
    /// Never answer with a pass while a sane alternative exists.
    pub const NOPASS: PassFlags = PassFlags(1 << 0);
    /// Never resign.
    pub const NORESIGN: PassFlags = PassFlags(1 << 1);

    #[inline]
    pub fn contains(self, other: PassFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PassFlags {
    type Output = PassFlags;

    fn bitor(self, rhs: PassFlags) -> PassFlags {
        PassFlags(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SearchConfig::default();
        assert!((config.c_puct - 0.85).abs() < 1e-6);
        assert_eq!(config.virtual_loss_count, 3);
        assert!(config.num_threads >= 1);
        assert!(!config.noise);
    }

    #[test]
    fn builder_chain() {
        let config = SearchConfig::default()
            .with_playouts(400)
            .with_threads(0)
            .with_noise(0.25, 0.03);
        assert_eq!(config.max_playouts, 400);
        // Thread count clamps to at least one.
        assert_eq!(config.num_threads, 1);
        assert!(config.noise);
    }

    #[test]
    fn pass_flags_combine() {
        let flags = PassFlags::NOPASS | PassFlags::NORESIGN;
        assert!(flags.contains(PassFlags::NOPASS));
        assert!(flags.contains(PassFlags::NORESIGN));
        assert!(!PassFlags::NONE.contains(PassFlags::NOPASS));
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = SearchConfig::for_testing().with_c_puct(1.5);
        let json = serde_json::to_string(&config).unwrap();
        let back: SearchConfig = serde_json::from_str(&json).unwrap();
        assert!((back.c_puct - 1.5).abs() < 1e-6);
        assert_eq!(back.seed, Some(42));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: SearchConfig = serde_json::from_str(r#"{"c_puct": 2.0}"#).unwrap();
        assert!((config.c_puct - 2.0).abs() < 1e-6);
        assert_eq!(config.virtual_loss_count, 3);
    }
}
