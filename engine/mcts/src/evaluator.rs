//! Evaluator trait for position evaluation.
//!
//! The evaluator is the neural-network seam: it returns a winrate for the
//! side to move and a prior over candidate moves. The search renormalizes
//! the priors itself after masking, so implementations do not have to
//! return a proper distribution.

use omok_board::{GameState, PASS};
use thiserror::Error;

/// Errors that can occur during evaluation.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("model error: {0}")]
    ModelError(String),
}

/// Result of evaluating a game state.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Winrate in `[0, 1]` from the side-to-move's perspective.
    pub value: f32,

    /// `(prior, vertex)` pairs over candidate moves. May include `PASS`
    /// and occupied vertices; the expander filters and renormalizes.
    pub policy: Vec<(f32, i32)>,
}

/// Trait for position evaluators.
///
/// Implementations are shared across search threads, hence `Send + Sync`.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, state: &GameState) -> Result<Evaluation, EvaluatorError>;
}

/// Evaluator assigning equal priors to all empty vertices and a neutral
/// winrate. Useful for tests and benchmarks.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, state: &GameState) -> Result<Evaluation, EvaluatorError> {
        let board = state.board();
        let empties = board.empty_vertices();

        let prior = 1.0 / (empties.len() + 1) as f32;
        let mut policy: Vec<(f32, i32)> = empties.into_iter().map(|v| (prior, v)).collect();
        policy.push((prior, PASS));

        Ok(Evaluation { value: 0.5, policy })
    }
}

/// Evaluator with fixed per-vertex priors, for scripting positions in
/// tests. Unlisted vertices share the leftover mass uniformly.
#[derive(Debug, Clone)]
pub struct TablePolicyEvaluator {
    pub value: f32,
    pub entries: Vec<(f32, i32)>,
}

impl TablePolicyEvaluator {
    pub fn new(value: f32, entries: Vec<(f32, i32)>) -> Self {
        Self { value, entries }
    }
}

impl Evaluator for TablePolicyEvaluator {
    fn evaluate(&self, state: &GameState) -> Result<Evaluation, EvaluatorError> {
        let board = state.board();
        let mut policy = self.entries.clone();
        let listed: f32 = policy.iter().map(|(p, _)| *p).sum();

        let mut rest = Vec::new();
        for vertex in board.empty_vertices() {
            if !policy.iter().any(|&(_, v)| v == vertex) {
                rest.push(vertex);
            }
        }
        if !rest.is_empty() {
            let leftover = ((1.0 - listed).max(0.0)) / rest.len() as f32;
            policy.extend(rest.into_iter().map(|v| (leftover, v)));
        }

        Ok(Evaluation {
            value: self.value,
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omok_board::GameState;

    #[test]
    fn uniform_covers_empty_vertices() {
        let state = GameState::new(9, 6.5).unwrap();
        let eval = UniformEvaluator::new().evaluate(&state).unwrap();
        // 81 empty points plus a pass entry.
        assert_eq!(eval.policy.len(), 82);
        let sum: f32 = eval.policy.iter().map(|(p, _)| *p).sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!((eval.value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn uniform_skips_occupied() {
        let mut state = GameState::new(9, 6.5).unwrap();
        let v = state.board().get_vertex(4, 4);
        state.play_move(v).unwrap();
        let eval = UniformEvaluator::new().evaluate(&state).unwrap();
        assert!(!eval.policy.iter().any(|&(_, mv)| mv == v));
        assert_eq!(eval.policy.len(), 81);
    }

    #[test]
    fn table_policy_prefers_listed_moves() {
        let state = GameState::new(9, 6.5).unwrap();
        let v = state.board().get_vertex(2, 2);
        let eval = TablePolicyEvaluator::new(0.7, vec![(0.9, v)])
            .evaluate(&state)
            .unwrap();
        let best = eval
            .policy
            .iter()
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
            .unwrap();
        assert_eq!(best.1, v);
    }
}
