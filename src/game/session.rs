//! A single Tic-Tac-Toe game
//!
//! `GameSession` owns its board and the mapping from symbols to
//! participants. It is synchronous: timers and the bot's thinking delay
//! are driven from outside.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ai;
use super::board::{Board, Outcome, Symbol};
use crate::error::MoveError;

/// Opaque identity of a human actor, as given by the surrounding system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Someone seated at a game or party to a proposal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participant {
    Human(ActorId),
    Bot,
}

impl Participant {
    /// Whether `actor` is this participant. The bot is never an actor.
    pub fn is(&self, actor: &ActorId) -> bool {
        matches!(self, Participant::Human(id) if id == actor)
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Participant::Bot)
    }
}

impl From<ActorId> for Participant {
    fn from(id: ActorId) -> Self {
        Participant::Human(id)
    }
}

/// Symbol -> participant mapping for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seats {
    pub x: Participant,
    pub o: Participant,
}

impl Seats {
    pub fn get(&self, symbol: Symbol) -> &Participant {
        match symbol {
            Symbol::X => &self.x,
            Symbol::O => &self.o,
        }
    }

    /// Which symbol `actor` plays as, if seated
    pub fn symbol_of(&self, actor: &ActorId) -> Option<Symbol> {
        if self.x.is(actor) {
            Some(Symbol::X)
        } else if self.o.is(actor) {
            Some(Symbol::O)
        } else {
            None
        }
    }
}

/// Who the session is played against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Human vs human
    Versus,
    /// Human (X) vs bot (O)
    Bot { rematch: bool },
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionResult {
    Win(Symbol),
    Draw,
    Timeout,
}

impl From<Outcome> for SessionResult {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win(s) => SessionResult::Win(s),
            Outcome::Draw => SessionResult::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingMove(Symbol),
    /// Absorbing: no further moves are accepted
    Terminal(SessionResult),
}

/// A Tic-Tac-Toe game instance
#[derive(Debug, Clone)]
pub struct GameSession {
    board: Board,
    seats: Seats,
    mode: Mode,
    state: SessionState,
}

impl GameSession {
    /// Start a human-vs-human game. X moves first.
    pub fn versus(x: ActorId, o: ActorId) -> Self {
        Self {
            board: Board::new(),
            seats: Seats {
                x: Participant::Human(x),
                o: Participant::Human(o),
            },
            mode: Mode::Versus,
            state: SessionState::AwaitingMove(Symbol::X),
        }
    }

    /// Start a game against the bot.
    ///
    /// The human plays X. When `first` is O the bot's opening is placed
    /// before the session is returned, so the caller always receives a
    /// session awaiting the human.
    pub fn against_bot<R: Rng + ?Sized>(
        human: ActorId,
        rematch: bool,
        first: Symbol,
        rng: &mut R,
    ) -> Self {
        let mut board = Board::new();
        if first == Symbol::O {
            let opening = ai::opening_move(rng, rematch);
            board = board.apply_move(opening, Symbol::O).unwrap_or(board);
        }

        Self {
            board,
            seats: Seats {
                x: Participant::Human(human),
                o: Participant::Bot,
            },
            mode: Mode::Bot { rematch },
            state: SessionState::AwaitingMove(Symbol::X),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn seats(&self) -> &Seats {
        &self.seats
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Terminal(_))
    }

    pub fn is_rematch(&self) -> bool {
        matches!(self.mode, Mode::Bot { rematch: true })
    }

    /// Symbol on turn, `None` once terminal
    pub fn turn(&self) -> Option<Symbol> {
        match self.state {
            SessionState::AwaitingMove(s) => Some(s),
            SessionState::Terminal(_) => None,
        }
    }

    /// Apply a move on behalf of `actor`.
    ///
    /// Rejections leave the session untouched.
    pub fn play(&mut self, actor: &ActorId, index: usize) -> Result<SessionState, MoveError> {
        let turn = self.turn().ok_or(MoveError::GameOver)?;
        let symbol = self.seats.symbol_of(actor).ok_or(MoveError::NotAPlayer)?;
        if symbol != turn {
            return Err(MoveError::NotYourTurn { waiting_for: turn });
        }
        self.place(index, symbol)
    }

    /// Whether the bot holds the current turn
    pub fn bot_to_move(&self) -> bool {
        self.turn()
            .is_some_and(|s| self.seats.get(s).is_bot())
    }

    /// Compute and apply the bot's move. No-op unless the bot is on turn.
    pub fn play_bot(&mut self) -> SessionState {
        let Some(symbol) = self.turn().filter(|_| self.bot_to_move()) else {
            return self.state;
        };

        match ai::best_move(&self.board, symbol) {
            Some(index) => self.place(index, symbol).unwrap_or(self.state),
            None => self.state,
        }
    }

    /// Freeze the board after inactivity. No-op once terminal.
    pub fn time_out(&mut self) -> SessionState {
        if !self.is_terminal() {
            self.state = SessionState::Terminal(SessionResult::Timeout);
        }
        self.state
    }

    fn place(&mut self, index: usize, symbol: Symbol) -> Result<SessionState, MoveError> {
        self.board = self.board.apply_move(index, symbol)?;

        self.state = match self.board.evaluate() {
            Some(outcome) => SessionState::Terminal(outcome.into()),
            None => SessionState::AwaitingMove(symbol.other()),
        };
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::game::board::CORNERS;

    fn alice() -> ActorId {
        ActorId::new("alice")
    }

    fn bob() -> ActorId {
        ActorId::new("bob")
    }

    #[test]
    fn test_new_versus_game() {
        let game = GameSession::versus(alice(), bob());
        assert_eq!(game.state(), SessionState::AwaitingMove(Symbol::X));
        assert!(game.board().is_empty());
        assert_eq!(game.seats().symbol_of(&bob()), Some(Symbol::O));
    }

    #[test]
    fn test_make_move() {
        let mut game = GameSession::versus(alice(), bob());
        let state = game.play(&alice(), 4).unwrap();
        assert_eq!(state, SessionState::AwaitingMove(Symbol::O));
        assert_eq!(game.board().get(4), Some(Symbol::X));
    }

    #[test]
    fn test_wrong_turn() {
        let mut game = GameSession::versus(alice(), bob());
        assert_eq!(
            game.play(&bob(), 4),
            Err(MoveError::NotYourTurn { waiting_for: Symbol::X })
        );
        assert!(game.board().is_empty());
    }

    #[test]
    fn test_outsider_rejected() {
        let mut game = GameSession::versus(alice(), bob());
        assert_eq!(game.play(&ActorId::new("carol"), 0), Err(MoveError::NotAPlayer));
    }

    #[test]
    fn test_cell_already_taken() {
        let mut game = GameSession::versus(alice(), bob());
        game.play(&alice(), 4).unwrap();
        assert_eq!(game.play(&bob(), 4), Err(MoveError::Occupied { index: 4 }));
        assert_eq!(game.turn(), Some(Symbol::O));
    }

    #[test]
    fn test_win_detection_row() {
        let mut game = GameSession::versus(alice(), bob());
        game.play(&alice(), 0).unwrap();
        game.play(&bob(), 3).unwrap();
        game.play(&alice(), 1).unwrap();
        game.play(&bob(), 4).unwrap();
        let state = game.play(&alice(), 2).unwrap();
        assert_eq!(state, SessionState::Terminal(SessionResult::Win(Symbol::X)));
        assert_eq!(game.play(&bob(), 5), Err(MoveError::GameOver));
    }

    #[test]
    fn test_draw() {
        let mut game = GameSession::versus(alice(), bob());
        // X O X / X X O / O X O
        for (actor, index) in [
            (alice(), 0),
            (bob(), 1),
            (alice(), 2),
            (bob(), 5),
            (alice(), 3),
            (bob(), 6),
            (alice(), 4),
            (bob(), 8),
        ] {
            game.play(&actor, index).unwrap();
        }
        let state = game.play(&alice(), 7).unwrap();
        assert_eq!(state, SessionState::Terminal(SessionResult::Draw));
    }

    #[test]
    fn test_timeout_is_absorbing() {
        let mut game = GameSession::versus(alice(), bob());
        game.play(&alice(), 4).unwrap();
        assert_eq!(game.time_out(), SessionState::Terminal(SessionResult::Timeout));
        assert_eq!(game.play(&bob(), 0), Err(MoveError::GameOver));
        assert_eq!(game.board().empty_cells().count(), 8);
    }

    #[test]
    fn test_bot_opens_on_corner_in_rematch() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let game = GameSession::against_bot(alice(), true, Symbol::O, &mut rng);
            let opened: Vec<usize> = (0..9).filter(|&i| game.board().get(i).is_some()).collect();
            assert_eq!(opened.len(), 1);
            assert!(CORNERS.contains(&opened[0]));
            assert_eq!(game.board().get(opened[0]), Some(Symbol::O));
            assert_eq!(game.turn(), Some(Symbol::X));
        }
    }

    #[test]
    fn test_human_first_leaves_board_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        let game = GameSession::against_bot(alice(), false, Symbol::X, &mut rng);
        assert!(game.board().is_empty());
        assert!(!game.bot_to_move());
    }

    #[test]
    fn test_bot_answers_and_blocks() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut game = GameSession::against_bot(alice(), false, Symbol::X, &mut rng);
        game.play(&alice(), 0).unwrap();
        assert!(game.bot_to_move());
        assert_eq!(game.play(&alice(), 1), Err(MoveError::NotYourTurn { waiting_for: Symbol::O }));

        game.play_bot();
        assert_eq!(game.turn(), Some(Symbol::X));
        assert_eq!(game.board().count(Symbol::O), 1);
    }

    #[test]
    fn test_play_bot_is_noop_on_human_turn() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut game = GameSession::against_bot(alice(), false, Symbol::X, &mut rng);
        game.play_bot();
        assert!(game.board().is_empty());
    }
}
