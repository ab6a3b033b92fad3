//! Search-tree nodes.
//!
//! Statistics (visits, accumulated value, virtual loss, validity, the
//! has-children latch) are atomics so concurrent descents never block on
//! them; the per-node mutex guards only structure: the child list and the
//! expansion reservation. `has_children` is published with release
//! ordering after the child list is fully linked, so any thread that
//! acquires it sees a complete list.
//!
//! Values accumulate from Black's perspective throughout; `get_eval`
//! flips them for White. An unvisited node reports its parent's network
//! value (`init_value`) instead, which acts as first-play urgency.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma};

use omok_board::{Color, GameState, Square, PASS};

use crate::config::SearchConfig;
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::patterns;

/// Raw prior assigned to a move that completes our own five.
const FIVE_PRIOR_BOOST: f32 = 100.0;

/// Raw prior assigned to a move that blocks the opponent's five.
const BLOCK_FIVE_PRIOR_BOOST: f32 = 90.0;

/// `f64` accumulator on top of `AtomicU64` bit casting; std has no
/// AtomicF64.
struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    fn fetch_add(&self, value: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Structure guarded by the node mutex.
#[derive(Default)]
struct Links {
    children: Vec<Arc<UctNode>>,
    /// Set by the thread that won the expansion race; stops others from
    /// queueing the same oracle call.
    expanding: bool,
}

/// One node of the search tree.
pub struct UctNode {
    mv: i32,
    /// Normalized prior, stored as f32 bits so root noise can rewrite it
    /// through a shared reference.
    prior: AtomicU32,
    /// Parent's network value at creation time (Black's perspective);
    /// serves as this node's evaluation until it gets visits.
    init_value: f32,
    visits: AtomicU32,
    black_values: AtomicF64,
    virtual_loss: AtomicI32,
    valid: AtomicBool,
    has_children: AtomicBool,
    links: Mutex<Links>,
}

impl UctNode {
    pub fn new(mv: i32, prior: f32, init_value: f32) -> UctNode {
        UctNode {
            mv,
            prior: AtomicU32::new(prior.to_bits()),
            init_value,
            visits: AtomicU32::new(0),
            black_values: AtomicF64::new(0.0),
            virtual_loss: AtomicI32::new(0),
            valid: AtomicBool::new(true),
            has_children: AtomicBool::new(false),
            links: Mutex::new(Links::default()),
        }
    }

    #[inline]
    pub fn get_move(&self) -> i32 {
        self.mv
    }

    #[inline]
    pub fn get_prior(&self) -> f32 {
        f32::from_bits(self.prior.load(Ordering::Relaxed))
    }

    #[inline]
    fn set_prior(&self, prior: f32) {
        self.prior.store(prior.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn get_visits(&self) -> u32 {
        self.visits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn first_visit(&self) -> bool {
        self.get_visits() == 0
    }

    #[inline]
    pub fn get_black_values(&self) -> f64 {
        self.black_values.load()
    }

    #[inline]
    pub fn get_virtual_loss(&self) -> i32 {
        self.virtual_loss.load(Ordering::Relaxed)
    }

    /// Mark a pending descent through this node.
    #[inline]
    pub fn virtual_loss(&self, count: i32) {
        self.virtual_loss.fetch_add(count, Ordering::Relaxed);
    }

    /// Remove a pending-descent mark.
    #[inline]
    pub fn virtual_loss_undo(&self, count: i32) {
        self.virtual_loss.fetch_sub(count, Ordering::Relaxed);
    }

    /// Record one completed simulation through this node.
    pub fn update(&self, black_value: f32) {
        self.visits.fetch_add(1, Ordering::Relaxed);
        self.black_values.fetch_add(black_value as f64);
    }

    /// Mean value from `color`'s perspective. Unvisited nodes inherit the
    /// parent's network value (first-play urgency). Visit count is read
    /// once so a concurrent update cannot tear the divisor; pending
    /// virtual losses deliberately do not dilute the average.
    pub fn get_eval(&self, color: Color) -> f32 {
        let visits = self.get_visits();
        let black_eval = if visits > 0 {
            (self.get_black_values() / visits as f64) as f32
        } else {
            self.init_value
        };
        match color {
            Color::Black => black_eval,
            Color::White => 1.0 - black_eval,
        }
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.has_children.load(Ordering::Acquire)
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    /// Exclude this node from selection permanently.
    #[inline]
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Relaxed);
    }

    fn lock_links(&self) -> MutexGuard<'_, Links> {
        self.links.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Expand this node: query the evaluator and link one child per legal
    /// non-pass candidate. Returns the network value from Black's
    /// perspective when this call performed the expansion, `None` when the
    /// node was already expanded, is being expanded elsewhere, or is a
    /// double-pass terminal.
    ///
    /// The evaluator runs without holding the node lock.
    pub fn create_children(
        &self,
        node_count: &AtomicUsize,
        state: &GameState,
        evaluator: &dyn Evaluator,
        config: &SearchConfig,
    ) -> Result<Option<f32>, EvaluatorError> {
        // Cheap check before taking the lock.
        if self.has_children() {
            return Ok(None);
        }

        {
            let mut links = self.lock_links();
            if state.get_passes() >= 2 {
                return Ok(None);
            }
            if self.has_children() {
                return Ok(None);
            }
            if links.expanding {
                return Ok(None);
            }
            links.expanding = true;
        }

        let mut evaluation = match evaluator.evaluate(state) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                // Release the reservation so a later descent can retry.
                self.lock_links().expanding = false;
                return Err(e);
            }
        };

        // This engine never offers pass as a child.
        for entry in &mut evaluation.policy {
            if entry.1 == PASS {
                entry.0 = 0.0;
            }
        }

        if config.tactical_priors {
            boost_forcing_priors(&mut evaluation.policy, state);
        }

        // The evaluator scores for the side to move; the tree accumulates
        // from Black's perspective.
        let net_eval = match state.get_to_move() {
            Color::Black => evaluation.value,
            Color::White => 1.0 - evaluation.value,
        };

        let board = state.board();
        let mut candidates: Vec<(f32, i32)> = evaluation
            .policy
            .into_iter()
            .filter(|&(_, mv)| mv != PASS && board.get_square(mv) == Square::Empty)
            .collect();

        // Descending prior order; selection does not rely on it, but the
        // head of the list is the natural fallback move.
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut total: f32 = candidates.iter().map(|&(p, _)| p).sum();
        if total < f32::MIN_POSITIVE {
            total = 1.0;
        }

        if !candidates.is_empty() {
            let mut links = self.lock_links();
            for (prior, mv) in candidates {
                links
                    .children
                    .push(Arc::new(UctNode::new(mv, prior / total, net_eval)));
            }
            node_count.fetch_add(links.children.len(), Ordering::Relaxed);
            self.has_children.store(true, Ordering::Release);
        }

        Ok(Some(net_eval))
    }

    /// Evaluate a state without linking children; used once the tree hits
    /// its size cap. Returns Black's perspective.
    pub fn eval_state(
        state: &GameState,
        evaluator: &dyn Evaluator,
    ) -> Result<f32, EvaluatorError> {
        let evaluation = evaluator.evaluate(state)?;
        Ok(match state.get_to_move() {
            Color::Black => evaluation.value,
            Color::White => 1.0 - evaluation.value,
        })
    }

    /// PUCT child selection for the side `color` to move. Returns `None`
    /// when every child has been invalidated.
    pub fn select_child(&self, color: Color, c_puct: f32) -> Option<Arc<UctNode>> {
        let links = self.lock_links();

        let mut parent_visits = 0u64;
        for child in links.children.iter().filter(|c| c.valid()) {
            parent_visits += child.get_visits() as u64;
        }
        let numerator = (parent_visits as f64).sqrt() as f32;

        let mut best: Option<&Arc<UctNode>> = None;
        let mut best_value = f32::NEG_INFINITY;
        for child in links.children.iter().filter(|c| c.valid()) {
            let winrate = child.get_eval(color);
            // Pending descents widen the denominator so parallel workers
            // spread across siblings.
            let denom = 1.0 + child.get_visits() as f32 + child.get_virtual_loss().max(0) as f32;
            let puct = c_puct * child.get_prior() * (numerator / denom);
            let value = winrate + puct;
            if value > best_value {
                best_value = value;
                best = Some(child);
            }
        }

        best.cloned()
    }

    /// Mix Dirichlet noise into the children's priors: each prior becomes
    /// `(1 - epsilon) * prior + epsilon * eta`, with `eta` drawn from a
    /// symmetric Dirichlet via normalized Gamma samples. Skipped entirely
    /// when the sample mass is denormal.
    pub fn dirichlet_noise(&self, epsilon: f32, alpha: f32, rng: &mut ChaCha20Rng) {
        let links = self.lock_links();
        let count = links.children.len();
        if count == 0 {
            return;
        }

        let gamma = match Gamma::new(alpha, 1.0f32) {
            Ok(gamma) => gamma,
            Err(_) => return,
        };
        let samples: Vec<f32> = (0..count).map(|_| gamma.sample(rng)).collect();
        let sample_sum: f32 = samples.iter().sum();
        if sample_sum < f32::MIN_POSITIVE {
            return;
        }

        for (child, eta) in links.children.iter().zip(samples) {
            let mixed = child.get_prior() * (1.0 - epsilon) + epsilon * (eta / sample_sum);
            child.set_prior(mixed);
        }
    }

    /// Move a child to the head of the list with probability proportional
    /// to its visit count. Used for opening variety.
    pub fn randomize_first_proportionally(&self, rng: &mut ChaCha20Rng) {
        let mut links = self.lock_links();

        let mut accum = 0u64;
        let mut prefix = Vec::with_capacity(links.children.len());
        for child in &links.children {
            accum += child.get_visits() as u64;
            prefix.push(accum);
        }
        if accum == 0 {
            return;
        }

        let pick = rng.gen_range(0..accum);
        let index = prefix.iter().position(|&p| pick < p).unwrap_or(0);
        if index != 0 {
            links.children.swap(0, index);
        }
    }

    /// Order the children best-first for reporting and move extraction:
    /// visited before unvisited; visited children by visit count with
    /// winrate as the tie-break; unvisited children by prior. Stable.
    pub fn sort_root_children(&self, color: Color) {
        let mut links = self.lock_links();
        links.children.sort_by(|a, b| {
            root_order_key(b, color)
                .partial_cmp(&root_order_key(a, color))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Best child under the same ordering as [`sort_root_children`],
    /// without reordering the list.
    pub fn best_root_child(&self, color: Color) -> Option<Arc<UctNode>> {
        let links = self.lock_links();
        links
            .children
            .iter()
            .max_by(|a, b| {
                root_order_key(a, color)
                    .partial_cmp(&root_order_key(b, color))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }

    /// First child in list order.
    pub fn first_child(&self) -> Option<Arc<UctNode>> {
        self.lock_links().children.first().cloned()
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<Arc<UctNode>> {
        self.lock_links().children.clone()
    }

    /// First child that is neither a pass nor fills one of our own eyes.
    /// Used when the engine is forbidden from passing.
    pub fn get_nopass_child(&self, state: &GameState) -> Option<Arc<UctNode>> {
        let links = self.lock_links();
        let color = state.get_to_move();
        links
            .children
            .iter()
            .find(|child| {
                child.get_move() != PASS && !state.board().is_eye(color, child.get_move())
            })
            .cloned()
    }

    /// Unlink a child. The caller must guarantee no other thread still
    /// walks this subtree.
    pub fn delete_child(&self, target: &Arc<UctNode>) {
        let mut links = self.lock_links();
        let before = links.children.len();
        links.children.retain(|child| !Arc::ptr_eq(child, target));
        debug_assert_eq!(before, links.children.len() + 1, "child not found");
    }

    /// Remove children whose move immediately repeats a prior position.
    /// Only safe before the workers start.
    pub fn kill_superkos(&self, state: &GameState) {
        let mut links = self.lock_links();
        links.children.retain(|child| {
            let mv = child.get_move();
            if mv == PASS {
                return true;
            }
            let mut scratch = state.clone();
            match scratch.play_move(mv) {
                Ok(()) => !scratch.superko(),
                Err(_) => false,
            }
        });
    }
}

/// Sort key implementing the root ordering: greater is better.
fn root_order_key(node: &UctNode, color: Color) -> (u8, u64, f32) {
    let visits = node.get_visits();
    if visits > 0 {
        (1, visits as u64, node.get_eval(color))
    } else {
        (0, 0, node.get_prior())
    }
}

/// Raise the raw prior of any candidate that completes a five, so the
/// renormalized distribution is dominated by the forcing move. Our own
/// five outranks blocking the opponent's.
fn boost_forcing_priors(policy: &mut [(f32, i32)], state: &GameState) {
    let board = state.board();
    let to_move = state.get_to_move();

    for entry in policy.iter_mut() {
        let vertex = entry.1;
        if vertex == PASS || board.get_square(vertex) != Square::Empty {
            continue;
        }
        if patterns::scan(board, vertex, to_move).fives > 0 {
            entry.0 = FIVE_PRIOR_BOOST;
        } else if patterns::scan(board, vertex, to_move.opponent()).fives > 0 {
            entry.0 = BLOCK_FIVE_PRIOR_BOOST;
        }
    }
}
