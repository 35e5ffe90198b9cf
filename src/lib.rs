//! TicTacDuel - Tic-Tac-Toe duels, bot games and rematch chains
//!
//! The game logic in [`game`] is synchronous and knows nothing about time
//! sources or transport. [`arena`] runs each chain as a tokio task with its
//! timers, and [`console`] turns notices into text for a terminal.

pub mod arena;
pub mod config;
pub mod console;
pub mod error;
pub mod game;
pub mod usage;
