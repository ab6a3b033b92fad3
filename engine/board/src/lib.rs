//! Go-style board engine for the omok five-in-a-row engine.
//!
//! Five-in-a-row here is played on a go board: the full go mechanics
//! (captures, suicide, superko hashing, area scoring) stay in place and a
//! completed run of five ends the game. This crate owns the board
//! representation, game state, position hashing, and the game clocks; the
//! search core in `omok-mcts` consumes it through [`GameState`].

pub mod board;
pub mod state;
pub mod time_control;
pub mod zobrist;

pub use board::{
    Board, BoardError, Color, Square, MAX_BOARD_SIZE, MAX_SQ, PASS, RESIGN, WIN_LENGTH,
};
pub use state::{GameState, WIN_SCORE};
pub use time_control::TimeControl;
