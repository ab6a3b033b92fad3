//! Parallel UCT search: the simulation loop and the root driver.
//!
//! Every playout clones the root state and walks the shared tree:
//! select a child under PUCT, expand at the leaf, then back the value up
//! on unwind. Virtual loss marks nodes with pending descents so parallel
//! workers spread across siblings. All workers run the same loop; a
//! single `running` flag funnels time limits, playout budgets, and
//! external stop requests.
//!
//! The root decision applies a tactical override on top of the tree
//! statistics: a full-board scan for forcing five-in-a-row shapes that
//! outranks whatever the network-guided search preferred.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::{debug, info};

use omok_board::{Color, GameState, Square, PASS, RESIGN};

use crate::config::{PassFlags, SearchConfig};
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::node::UctNode;
use crate::patterns;
use crate::ttable::{NullTable, TransTable};

/// Interval between analysis dumps during a timed search.
const ANALYSIS_INTERVAL: Duration = Duration::from_millis(2500);

/// Minimum root visits before the resign check may fire.
const RESIGN_VISIT_FLOOR: u32 = 500;

/// Errors that abort a search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),
}

/// Outcome of one simulation: a Black-perspective value, or invalid when
/// the descent hit a dead end (superko, no valid child) and nothing may
/// be backed up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    eval: Option<f32>,
}

impl SearchResult {
    pub fn invalid() -> SearchResult {
        SearchResult { eval: None }
    }

    pub fn from_eval(eval: f32) -> SearchResult {
        SearchResult { eval: Some(eval) }
    }

    /// Map a final score (positive favors Black) onto a value: win 1,
    /// loss 0, tie 0.5.
    pub fn from_score(score: f32) -> SearchResult {
        let eval = if score > 0.0 {
            1.0
        } else if score < 0.0 {
            0.0
        } else {
            0.5
        };
        SearchResult { eval: Some(eval) }
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.eval.is_some()
    }

    /// Black-perspective value. Only meaningful when valid.
    #[inline]
    pub fn eval(&self) -> f32 {
        self.eval.unwrap_or(0.0)
    }
}

/// One root move decision: owns the root node, the worker loop, and the
/// move-selection policy.
pub struct UctSearch {
    root_state: GameState,
    root: Arc<UctNode>,
    config: SearchConfig,
    evaluator: Arc<dyn Evaluator>,
    ttable: Arc<dyn TransTable>,
    nodes: AtomicUsize,
    playouts: AtomicU32,
    running: AtomicBool,
    rng: Mutex<ChaCha20Rng>,
}

impl UctSearch {
    pub fn new(
        root_state: GameState,
        evaluator: Arc<dyn Evaluator>,
        config: SearchConfig,
    ) -> UctSearch {
        let rng = match config.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        UctSearch {
            root_state,
            root: Arc::new(UctNode::new(PASS, 1.0, 0.5)),
            config,
            evaluator,
            ttable: Arc::new(NullTable),
            nodes: AtomicUsize::new(0),
            playouts: AtomicU32::new(0),
            running: AtomicBool::new(false),
            rng: Mutex::new(rng),
        }
    }

    /// Attach a transposition table; the default is a no-op.
    pub fn with_ttable(mut self, ttable: Arc<dyn TransTable>) -> UctSearch {
        self.ttable = ttable;
        self
    }

    #[inline]
    pub fn root(&self) -> &Arc<UctNode> {
        &self.root
    }

    #[inline]
    pub fn root_state(&self) -> &GameState {
        &self.root_state
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn playout_count(&self) -> u32 {
        self.playouts.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Ask the workers to stop after their current descent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn increment_playouts(&self) {
        self.playouts.fetch_add(1, Ordering::Relaxed);
    }

    fn playout_limit_reached(&self) -> bool {
        self.config.max_playouts > 0 && self.playout_count() >= self.config.max_playouts
    }

    /// One complete simulation from `node`. The state must correspond to
    /// the position `node` represents and is consumed by the descent.
    pub fn play_simulation(
        &self,
        state: &mut GameState,
        node: &Arc<UctNode>,
    ) -> Result<SearchResult, SearchError> {
        let color = state.get_to_move();
        let hash = state.get_hash();
        let komi = state.get_komi();
        let vloss = self.config.virtual_loss_count;

        self.ttable.sync(hash, komi, node);
        node.virtual_loss(vloss);

        let descent = self.descend(state, node, color);

        if let Ok(result) = &descent {
            if result.valid() {
                node.update(result.eval());
            }
        }

        node.virtual_loss_undo(vloss);
        self.ttable.update(hash, komi, node);

        descent
    }

    fn descend(
        &self,
        state: &mut GameState,
        node: &Arc<UctNode>,
        color: Color,
    ) -> Result<SearchResult, SearchError> {
        let mut result = SearchResult::invalid();

        if !node.has_children() {
            if state.get_passes() >= 2 {
                result = SearchResult::from_score(state.final_score());
            } else if self.node_count() < self.config.max_tree_size {
                if let Some(eval) =
                    node.create_children(&self.nodes, state, &*self.evaluator, &self.config)?
                {
                    result = SearchResult::from_eval(eval);
                }
            } else {
                // Tree at capacity: evaluate the leaf without linking.
                result = SearchResult::from_eval(UctNode::eval_state(state, &*self.evaluator)?);
            }
        }

        if node.has_children() && !result.valid() {
            if let Some(next) = node.select_child(color, self.config.c_puct) {
                let mv = next.get_move();
                if mv != PASS {
                    if state.play_move(mv).is_ok() && !state.superko() {
                        result = self.play_simulation(state, &next)?;
                    } else {
                        next.invalidate();
                    }
                } else {
                    state.play_pass();
                    result = self.play_simulation(state, &next)?;
                }
            }
        }

        Ok(result)
    }

    /// Run a full timed search for `color` and pick a move.
    pub fn think(&mut self, color: Color, passflag: PassFlags) -> Result<i32, SearchError> {
        self.playouts.store(0, Ordering::Relaxed);
        self.root_state.start_clock(color);
        self.root_state.set_to_move(color);

        let start = Instant::now();
        let boardsize = self.root_state.board().get_boardsize();
        let time_for_move = self.root_state.get_time_control().max_time_for_move(
            boardsize,
            self.root_state.get_movenum(),
            color,
        );
        if !self.config.quiet {
            info!("thinking at most {:.1}s", time_for_move.as_secs_f32());
        }

        // Expand the root up front so a legal, decent move exists even in
        // deep time trouble.
        let root_eval = self
            .root
            .create_children(&self.nodes, &self.root_state, &*self.evaluator, &self.config)?
            .unwrap_or_else(|| self.root.get_eval(Color::Black));

        if self.config.noise {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.root
                .dirichlet_noise(self.config.noise_epsilon, self.config.noise_alpha, &mut rng);
        }

        if !self.config.quiet {
            let tomove_eval = match color {
                Color::Black => root_eval,
                Color::White => 1.0 - root_eval,
            };
            info!("network eval {:.4}", tomove_eval);
        }

        self.running.store(true, Ordering::Relaxed);
        let failure: Mutex<Option<SearchError>> = Mutex::new(None);

        let this = &*self;
        thread::scope(|scope| {
            for _ in 1..this.config.num_threads.max(1) {
                scope.spawn(|| this.run_worker(&failure));
            }

            let mut last_update = Duration::ZERO;
            loop {
                let mut state = this.root_state.clone();
                match this.play_simulation(&mut state, &this.root) {
                    Ok(result) => {
                        if result.valid() {
                            this.increment_playouts();
                        }
                    }
                    Err(e) => {
                        this.record_failure(&failure, e);
                        break;
                    }
                }

                let elapsed = start.elapsed();
                if elapsed - last_update > ANALYSIS_INTERVAL {
                    last_update = elapsed;
                    this.dump_analysis(this.playout_count());
                }

                if !this.is_running()
                    || elapsed >= time_for_move
                    || this.playout_limit_reached()
                {
                    break;
                }
            }
            this.stop();
        });

        self.root_state.stop_clock(color);
        if let Some(error) = failure.into_inner().unwrap_or_else(|e| e.into_inner()) {
            return Err(error);
        }

        if !self.root.has_children() {
            return Ok(PASS);
        }

        self.dump_stats();

        let elapsed = start.elapsed();
        if !self.config.quiet {
            info!(
                "{} visits, {} nodes, {} playouts, {:.0} pos/s",
                self.root.get_visits(),
                self.node_count(),
                self.playout_count(),
                self.playout_count() as f64 / elapsed.as_secs_f64().max(1e-9),
            );
        }

        Ok(self.get_best_move(passflag))
    }

    /// Search on the opponent's time: identical simulation loop, no clock
    /// and no move selection. Runs until `input_pending` reports true or
    /// [`UctSearch::stop`] is called.
    pub fn ponder<F>(&mut self, mut input_pending: F) -> Result<(), SearchError>
    where
        F: FnMut() -> bool,
    {
        self.playouts.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
        let failure: Mutex<Option<SearchError>> = Mutex::new(None);

        let this = &*self;
        thread::scope(|scope| {
            for _ in 1..this.config.num_threads.max(1) {
                scope.spawn(|| this.run_worker(&failure));
            }

            loop {
                let mut state = this.root_state.clone();
                match this.play_simulation(&mut state, &this.root) {
                    Ok(result) => {
                        if result.valid() {
                            this.increment_playouts();
                        }
                    }
                    Err(e) => {
                        this.record_failure(&failure, e);
                        break;
                    }
                }
                if input_pending() || !this.is_running() {
                    break;
                }
            }
            this.stop();
        });

        if let Some(error) = failure.into_inner().unwrap_or_else(|e| e.into_inner()) {
            return Err(error);
        }

        self.dump_stats();
        if !self.config.quiet {
            info!(
                "{} visits, {} nodes",
                self.root.get_visits(),
                self.node_count()
            );
        }
        Ok(())
    }

    fn run_worker(&self, failure: &Mutex<Option<SearchError>>) {
        while self.is_running() && !self.playout_limit_reached() {
            let mut state = self.root_state.clone();
            match self.play_simulation(&mut state, &self.root) {
                Ok(result) => {
                    if result.valid() {
                        self.increment_playouts();
                    }
                }
                Err(e) => {
                    self.record_failure(failure, e);
                    break;
                }
            }
        }
    }

    fn record_failure(&self, failure: &Mutex<Option<SearchError>>, error: SearchError) {
        let mut slot = failure.lock().unwrap_or_else(|e| e.into_inner());
        slot.get_or_insert(error);
        self.stop();
    }

    /// Pick the move to play from the root statistics, subject to the
    /// tactical override and the pass/resign policies.
    pub fn get_best_move(&self, passflag: PassFlags) -> i32 {
        if self.root.first_child().is_none() {
            return PASS;
        }
        let to_move = self.root_state.get_to_move();

        // Best-first for extraction and reporting.
        self.root.sort_root_children(to_move);

        if self.root_state.get_movenum() < self.config.random_move_count {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.root.randomize_first_proportionally(&mut rng);
        }

        let first = match self.root.first_child() {
            Some(first) => first,
            None => return PASS,
        };
        let mut bestmove = first.get_move();

        // Forcing five-in-a-row shapes outrank the network's choice.
        if let Some(forced) = self.tactical_override(to_move) {
            return forced;
        }

        // Without any statistics the prior order is all we have.
        if first.first_visit() {
            return bestmove;
        }
        let mut bestscore = first.get_eval(to_move);

        if passflag.contains(PassFlags::NOPASS) {
            if bestmove == PASS {
                match self.root.get_nopass_child(&self.root_state) {
                    Some(nopass) => {
                        info!("preferring not to pass");
                        bestmove = nopass.get_move();
                        bestscore = if nopass.first_visit() {
                            1.0
                        } else {
                            nopass.get_eval(to_move)
                        };
                    }
                    None => info!("pass is the only acceptable move"),
                }
            }
        } else if !self.config.dumb_pass {
            if bestmove == PASS {
                // Passing is on top; only go through with it if passing
                // does not lose outright.
                let score = self.root_state.final_score();
                if passing_loses(score, to_move) {
                    info!("passing loses, avoiding it");
                    if let Some(nopass) = self.root.get_nopass_child(&self.root_state) {
                        bestmove = nopass.get_move();
                        bestscore = if nopass.first_visit() {
                            1.0
                        } else {
                            nopass.get_eval(to_move)
                        };
                    }
                }
            } else if self.root_state.get_last_move() == Some(PASS) {
                // The opponent passed; end the game now if that wins.
                let score = self.root_state.final_score();
                if !passing_loses(score, to_move) {
                    info!("passing wins, passing out");
                    bestmove = PASS;
                }
            }
        }

        if bestmove != PASS && !passflag.contains(PassFlags::NORESIGN) {
            let boardsize = self.root_state.board().get_boardsize();
            let move_threshold = (boardsize * boardsize) as u32 / 4;
            if bestscore < self.config.resign_percent as f32 / 100.0
                && self.root.get_visits() > RESIGN_VISIT_FLOOR
                && self.root_state.get_movenum() > move_threshold
            {
                info!("score looks bad, resigning");
                bestmove = RESIGN;
            }
        }

        bestmove
    }

    /// Full-board scan for forcing shapes: completed fives, double fours,
    /// single fours, for both colors. Returns the move the override
    /// dictates, if any.
    fn tactical_override(&self, to_move: Color) -> Option<i32> {
        let board = self.root_state.board();
        let size = board.get_boardsize();

        // Current root ranking breaks ties between equal threats.
        let ranked: Vec<i32> = self
            .root
            .children()
            .iter()
            .map(|child| child.get_move())
            .collect();

        let mut best_mine: (f32, i32) = (0.0, PASS);
        let mut best_enemy: (f32, i32) = (0.0, PASS);

        for y in 0..size {
            for x in 0..size {
                let vertex = board.get_vertex(x, y);
                if board.get_square(vertex) != Square::Empty {
                    continue;
                }
                let rank = ranked
                    .iter()
                    .position(|&mv| mv == vertex)
                    .unwrap_or(ranked.len());
                let rank_bonus = (size * size - rank) as f32 / 1_000_000.0;

                for color in [Color::Black, Color::White] {
                    let tally = patterns::scan(board, vertex, color);
                    let winrate = match tally.override_winrate() {
                        Some(winrate) => winrate + rank_bonus,
                        None => continue,
                    };
                    let slot = if color == to_move {
                        &mut best_mine
                    } else {
                        &mut best_enemy
                    };
                    if winrate > slot.0 {
                        *slot = (winrate, vertex);
                    }
                }
            }
        }

        let forced = if best_mine.0 >= 1.0 {
            // We complete a five.
            Some(best_mine.1)
        } else if best_enemy.0 >= 1.0 {
            // Block the opponent's five.
            Some(best_enemy.1)
        } else if best_mine.0 >= 0.99 {
            // Our double four wins next move.
            Some(best_mine.1)
        } else if best_enemy.0 >= 0.99 && best_mine.0 < 0.98 {
            // Block their double four unless we hold a four ourselves.
            Some(best_enemy.1)
        } else {
            None
        };

        if let Some(mv) = forced {
            debug!(
                "tactical override: {} (mine {:.3}, enemy {:.3})",
                board.move_to_text(mv),
                best_mine.0,
                best_enemy.0
            );
        }
        forced
    }

    /// Principal variation from `node`, following best root children.
    fn pv_string(&self, state: &mut GameState, node: &UctNode) -> String {
        if !node.has_children() {
            return String::new();
        }
        let best = match node.best_root_child(state.get_to_move()) {
            Some(best) => best,
            None => return String::new(),
        };
        let mv = best.get_move();
        let mut text = state.board().move_to_text(mv);
        if state.play_move(mv).is_err() {
            return text;
        }
        let rest = self.pv_string(state, &best);
        if !rest.is_empty() {
            text.push(' ');
            text.push_str(&rest);
        }
        text
    }

    /// Log the top root children with visits, winrate, prior, and PV.
    pub fn dump_stats(&self) {
        if self.config.quiet || !self.root.has_children() {
            return;
        }
        let color = self.root_state.get_to_move();
        self.root.sort_root_children(color);

        let children = self.root.children();
        match children.first() {
            Some(first) if !first.first_visit() => {}
            _ => return,
        }

        for (index, child) in children.iter().enumerate() {
            if index >= 2 && child.first_visit() {
                break;
            }
            let text = self.root_state.board().move_to_text(child.get_move());
            let winrate = if child.first_visit() {
                0.0
            } else {
                child.get_eval(color) * 100.0
            };

            let mut pv_state = self.root_state.clone();
            let mut pv = text.clone();
            if pv_state.play_move(child.get_move()).is_ok() {
                let rest = self.pv_string(&mut pv_state, child);
                if !rest.is_empty() {
                    pv.push(' ');
                    pv.push_str(&rest);
                }
            }

            info!(
                "{:>4} -> {:7} (V: {:5.2}%) (N: {:5.2}%) PV: {}",
                text,
                child.get_visits(),
                winrate,
                child.get_prior() * 100.0,
                pv
            );
        }
    }

    /// One-line progress report during a running search.
    fn dump_analysis(&self, playouts: u32) {
        if self.config.quiet {
            return;
        }
        let mut state = self.root_state.clone();
        let color = state.get_to_move();
        let pv = self.pv_string(&mut state, &self.root);
        info!(
            "Playouts: {}, Win: {:5.2}%, PV: {}",
            playouts,
            self.root.get_eval(color) * 100.0,
            pv
        );
    }
}

/// Whether a final score means the side to move loses by ending the game.
fn passing_loses(score: f32, to_move: Color) -> bool {
    (score > 0.0 && to_move == Color::White) || (score < 0.0 && to_move == Color::Black)
}
