//! Error types for tictacduel

use std::path::PathBuf;

use thiserror::Error;

use crate::game::board::Symbol;
use crate::game::negotiation::ProposalStatus;

/// A rejected move. Never fatal to the game: the board is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("that cell is not on the board")]
    OutOfRange { index: usize },

    #[error("that cell is already taken")]
    Occupied { index: usize },

    #[error("not your turn, waiting for {waiting_for}")]
    NotYourTurn { waiting_for: Symbol },

    #[error("this is not your game")]
    NotAPlayer,

    #[error("game is already over")]
    GameOver,
}

/// A rejected response to a proposal. The proposal keeps its state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("this challenge is not for you")]
    NotForYou,

    #[error("this challenge was already answered ({status:?})")]
    AlreadyResolved { status: ProposalStatus },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("daily limit of {limit} games reached")]
    Reached { limit: u32 },
}

#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("presenter is gone, abandoning chain")]
    PresenterClosed,
}

/// A console line that could not be understood
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    NotANumber(String),
}
