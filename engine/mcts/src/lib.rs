//! Parallel Monte Carlo tree search for five-in-a-row, guided by a
//! policy/value network.
//!
//! The search walks a shared tree from multiple threads. Each simulation
//! runs the classic four phases:
//!
//! 1. **Selection**: descend by PUCT, with virtual loss steering
//!    concurrent workers apart
//! 2. **Expansion**: at a leaf, query the evaluator once and link one
//!    child per legal candidate move
//! 3. **Evaluation**: the same network call supplies the leaf value;
//!    double-pass terminals are scored by the board engine instead
//! 4. **Backpropagation**: the Black-perspective value updates every
//!    node on the unwind path
//!
//! On top of the tree sits a tactical layer specific to five-in-a-row:
//! [`patterns`] scans for forcing shapes (fives, double fours, open
//! threes), biasing priors at expansion time and overriding the final
//! root choice when a forcing move exists. The search alone cannot be
//! trusted to find short forcing sequences under small playout budgets.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use omok_board::{Color, GameState};
//! use omok_mcts::{PassFlags, SearchConfig, UctSearch, UniformEvaluator};
//!
//! let state = GameState::new(19, 6.5).unwrap();
//! let config = SearchConfig::default().with_playouts(1600);
//! let mut search = UctSearch::new(state, Arc::new(UniformEvaluator::new()), config);
//! let best = search.think(Color::Black, PassFlags::NONE).unwrap();
//! println!("best move: {best}");
//! ```
//!
//! The evaluator seam ([`Evaluator`]) is where a real network plugs in;
//! [`UniformEvaluator`] exists for tests and benchmarks. The
//! transposition-table seam ([`TransTable`]) defaults to a no-op.

pub mod config;
pub mod evaluator;
pub mod node;
pub mod patterns;
pub mod search;
pub mod ttable;

pub use config::{PassFlags, SearchConfig};
pub use evaluator::{Evaluation, Evaluator, EvaluatorError, UniformEvaluator};
pub use node::UctNode;
pub use patterns::{scan, PatternTally};
pub use search::{SearchError, SearchResult, UctSearch};
pub use ttable::{NullTable, TransTable};
