//! Tic-Tac-Toe duels against people or the bot
//!
//! Pure, synchronous game logic. Timers and delivery live in
//! [`crate::arena`].

pub mod ai;
pub mod board;
pub mod chain;
pub mod negotiation;
pub mod session;

pub use board::{Board, Outcome, Symbol};
pub use chain::{Chain, ChainEnd, ChainEvent, ChainId, Notice, PromptOption, Stage, Tally, Timings};
pub use negotiation::{Choice, Proposal, ProposalKind, ProposalStatus};
pub use session::{ActorId, GameSession, Mode, Participant, Seats, SessionResult, SessionState};
