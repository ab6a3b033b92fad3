//! Full game state: board plus move history, hashing, and clocks.
//!
//! `GameState` is the unit the search clones for every playout, so it
//! keeps everything a descent needs: side to move, consecutive passes,
//! the positional-hash history for superko detection, and the winner flag
//! set as soon as a five-in-a-row appears.

use crate::board::{Board, BoardError, Color, PASS};
use crate::time_control::TimeControl;
use crate::zobrist::ZOBRIST;

/// Score magnitude reported for a completed five. Dominates any area
/// count on a legal board.
pub const WIN_SCORE: f32 = 1.0e7;

/// A playable game position.
#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    to_move: Color,
    passes: u32,
    movenum: u32,
    last_move: Option<i32>,
    komi: f32,
    /// Positional hash of the stones only (no side/pass information).
    ko_hash: u64,
    /// Every positional hash this game has visited, current included.
    history: Vec<u64>,
    winner: Option<Color>,
    time_control: TimeControl,
}

impl GameState {
    /// Start a new game. Black moves first.
    pub fn new(size: usize, komi: f32) -> Result<GameState, BoardError> {
        let board = Board::new(size)?;
        Ok(GameState {
            board,
            to_move: Color::Black,
            passes: 0,
            movenum: 0,
            last_move: None,
            komi,
            ko_hash: 0,
            history: vec![0],
            winner: None,
            time_control: TimeControl::default(),
        })
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mutable board access for position setup in tests and tools. Hash
    /// history is not maintained through this path.
    #[inline]
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    #[inline]
    pub fn get_to_move(&self) -> Color {
        self.to_move
    }

    /// Force the side to move.
    pub fn set_to_move(&mut self, color: Color) {
        self.to_move = color;
    }

    #[inline]
    pub fn get_passes(&self) -> u32 {
        self.passes
    }

    #[inline]
    pub fn get_movenum(&self) -> u32 {
        self.movenum
    }

    #[inline]
    pub fn get_last_move(&self) -> Option<i32> {
        self.last_move
    }

    #[inline]
    pub fn get_komi(&self) -> f32 {
        self.komi
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    #[inline]
    pub fn winner(&self) -> Option<Color> {
        self.winner
    }

    /// Positional hash of the stones on the board.
    #[inline]
    pub fn get_ko_hash(&self) -> u64 {
        self.ko_hash
    }

    /// Full state hash: stones, side to move, and pass count. This is the
    /// transposition-table key.
    pub fn get_hash(&self) -> u64 {
        let mut hash = self.ko_hash;
        if self.to_move == Color::White {
            hash ^= ZOBRIST.to_move;
        }
        hash ^= ZOBRIST.passes[self.passes.min(3) as usize];
        hash
    }

    /// Play a move for the side to move. `PASS` is accepted; illegal
    /// stone placements leave the state untouched.
    pub fn play_move(&mut self, mv: i32) -> Result<(), BoardError> {
        if mv == PASS {
            self.play_pass();
            return Ok(());
        }

        let color = self.to_move;
        let captured = self.board.play_stone(mv, color)?;

        self.ko_hash ^= ZOBRIST.stones[color.index()][mv as usize];
        let enemy = color.opponent();
        for &stone in &captured {
            self.ko_hash ^= ZOBRIST.stones[enemy.index()][stone as usize];
        }

        if self.winner.is_none() && self.board.five_from(mv) {
            self.winner = Some(color);
        }

        self.last_move = Some(mv);
        self.passes = 0;
        self.movenum += 1;
        self.to_move = enemy;
        self.history.push(self.ko_hash);
        Ok(())
    }

    /// Pass for the side to move.
    pub fn play_pass(&mut self) {
        self.last_move = Some(PASS);
        self.passes += 1;
        self.movenum += 1;
        self.to_move = self.to_move.opponent();
        self.history.push(self.ko_hash);
    }

    /// Whether the current position repeats any earlier whole-board
    /// position. Only meaningful right after a stone move; passes do not
    /// change the positional hash.
    pub fn superko(&self) -> bool {
        let (current, earlier) = match self.history.split_last() {
            Some(split) => split,
            None => return false,
        };
        earlier.contains(current)
    }

    /// Final score from Black's perspective. A completed five dominates;
    /// otherwise the go-style area count minus komi decides.
    pub fn final_score(&self) -> f32 {
        match self.winner {
            Some(Color::Black) => WIN_SCORE,
            Some(Color::White) => -WIN_SCORE,
            None => self.board.area_score(self.komi),
        }
    }

    #[inline]
    pub fn get_time_control(&self) -> &TimeControl {
        &self.time_control
    }

    pub fn set_time_control(&mut self, time_control: TimeControl) {
        self.time_control = time_control;
    }

    /// Start the clock for `color`.
    pub fn start_clock(&mut self, color: Color) {
        self.time_control.start(color);
    }

    /// Stop the clock for `color`, deducting the elapsed time.
    pub fn stop_clock(&mut self, color: Color) {
        self.time_control.stop(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;

    fn state() -> GameState {
        GameState::new(9, 6.5).unwrap()
    }

    #[test]
    fn alternation_and_counters() {
        let mut st = state();
        assert_eq!(st.get_to_move(), Color::Black);
        let v = st.board().get_vertex(4, 4);
        st.play_move(v).unwrap();
        assert_eq!(st.get_to_move(), Color::White);
        assert_eq!(st.get_movenum(), 1);
        assert_eq!(st.get_passes(), 0);
        assert_eq!(st.get_last_move(), Some(v));
    }

    #[test]
    fn passes_accumulate_and_reset() {
        let mut st = state();
        st.play_pass();
        assert_eq!(st.get_passes(), 1);
        st.play_pass();
        assert_eq!(st.get_passes(), 2);
        let v = st.board().get_vertex(0, 0);
        st.play_move(v).unwrap();
        assert_eq!(st.get_passes(), 0);
    }

    #[test]
    fn hash_changes_with_stones_but_not_passes() {
        let mut st = state();
        let before = st.get_ko_hash();
        st.play_pass();
        assert_eq!(st.get_ko_hash(), before);
        let v = st.board().get_vertex(2, 3);
        st.play_move(v).unwrap();
        assert_ne!(st.get_ko_hash(), before);
    }

    #[test]
    fn full_hash_sees_side_and_passes() {
        let mut a = state();
        let b = state();
        a.play_pass();
        // Same stones, different side and pass count.
        assert_eq!(a.get_ko_hash(), b.get_ko_hash());
        assert_ne!(a.get_hash(), b.get_hash());
    }

    #[test]
    fn capture_restores_positional_hash() {
        let mut st = state();
        let initial = st.get_ko_hash();

        // Black corner stone, White captures it; the board then holds the
        // two white stones only.
        st.play_move(st.board().get_vertex(0, 0)).unwrap();
        st.play_move(st.board().get_vertex(1, 0)).unwrap();
        st.play_pass();
        st.play_move(st.board().get_vertex(0, 1)).unwrap();

        assert_eq!(st.board().get_square_xy(0, 0), Square::Empty);
        let mut expected = initial;
        expected ^= ZOBRIST.stones[Color::White.index()]
            [st.board().get_vertex(1, 0) as usize];
        expected ^= ZOBRIST.stones[Color::White.index()]
            [st.board().get_vertex(0, 1) as usize];
        assert_eq!(st.get_ko_hash(), expected);
    }

    #[test]
    fn superko_detects_repetition() {
        let mut st = state();
        st.play_move(st.board().get_vertex(3, 3)).unwrap();
        assert!(!st.superko());

        // Re-seeding the history with the current hash marks the position
        // as a repetition.
        let current = st.get_ko_hash();
        let mut with_repeat = st.clone();
        with_repeat.history.insert(0, current);
        assert!(with_repeat.superko());
    }

    #[test]
    fn five_sets_winner_and_score() {
        let mut st = state();
        // Black builds a horizontal five; White answers far away.
        for i in 0..5 {
            st.play_move(st.board().get_vertex(2 + i, 4)).unwrap();
            if i < 4 {
                st.play_move(st.board().get_vertex(2 + i, 7)).unwrap();
            }
        }
        assert_eq!(st.winner(), Some(Color::Black));
        assert!(st.final_score() >= WIN_SCORE);
    }

    #[test]
    fn double_pass_scores_area() {
        let mut st = state();
        st.play_move(st.board().get_vertex(4, 4)).unwrap();
        st.play_pass();
        st.play_pass();
        // One black stone reaches everything: 81 - 6.5.
        assert!((st.final_score() - 74.5).abs() < 1e-6);
    }
}
