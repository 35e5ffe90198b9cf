//! Challenge -> game -> rematch chains
//!
//! A chain starts with a duel proposal or a bot game and alternates between
//! negotiating and playing until someone declines, a prompt expires, or a
//! game ends without a follow-up. Each step replaces the current stage, so
//! an arbitrarily long rematch chain never grows the call stack.
//!
//! The chain is synchronous. The arena feeds it events and deadlines and
//! forwards the notices it returns to the presenter.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::board::{Board, Symbol};
use super::negotiation::{Choice, Proposal, ProposalKind, ProposalStatus};
use super::session::{ActorId, GameSession, Mode, Participant, Seats, SessionResult, SessionState};

/// Identity of one chain, unique within an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Timer lengths used by a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Inactivity allowed during a game
    pub move_timeout: Duration,
    /// Lifetime of every proposal
    pub challenge_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            move_timeout: Duration::from_secs(300),
            challenge_timeout: Duration::from_secs(60),
        }
    }
}

/// Input consumed by a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    CellChosen {
        actor: ActorId,
        handle: u32,
        index: usize,
    },
    ChoiceMade {
        actor: ActorId,
        handle: u32,
        choice: Choice,
    },
    DeadlineElapsed,
}

/// Why a chain stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ChainEnd {
    /// A proposal was declined (or, for challenge-back offers, given up)
    Declined { kind: ProposalKind, by: ActorId },
    /// A proposal was not answered in time
    Expired { kind: ProposalKind },
    /// A game ran out of time
    TimedOut,
    /// A human game ended level; no rematch is offered
    Drawn,
    /// The bot won a rematch it demanded or was challenged to
    BotWonRematch,
    /// The surrounding system gave up on the chain
    Abandoned,
}

/// Wins and draws across the games of one chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Wins per human participant
    pub wins: BTreeMap<String, u32>,
    pub bot_wins: u32,
    pub draws: u32,
    pub games: u32,
}

impl Tally {
    pub fn record(&mut self, seats: &Seats, result: SessionResult) {
        match result {
            SessionResult::Win(s) => match seats.get(s) {
                Participant::Human(id) => *self.wins.entry(id.0.clone()).or_default() += 1,
                Participant::Bot => self.bot_wins += 1,
            },
            SessionResult::Draw => self.draws += 1,
            SessionResult::Timeout => {}
        }
        self.games += 1;
    }
}

/// One labelled button on a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptOption {
    pub choice: Choice,
    pub label: String,
}

/// Output for the presenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// Show or refresh a board. Cells are clickable while `state` awaits a
    /// human move and the cell is empty.
    Board {
        chain: ChainId,
        handle: u32,
        board: Board,
        seats: Seats,
        state: SessionState,
        rematch: bool,
        tally: Tally,
    },
    /// The bot is on turn; every cell is disabled until the next `Board`
    BotThinking {
        chain: ChainId,
        handle: u32,
        board: Board,
        seats: Seats,
    },
    /// Ask `to` to answer a proposal
    Prompt {
        chain: ChainId,
        handle: u32,
        kind: ProposalKind,
        from: Participant,
        to: ActorId,
        options: Vec<PromptOption>,
        expires_in_secs: u64,
    },
    /// Addressed to `actor` only; nothing changed
    Rejected {
        chain: Option<ChainId>,
        actor: ActorId,
        reason: String,
    },
    Ended {
        chain: ChainId,
        end: ChainEnd,
        tally: Tally,
    },
}

/// Where a chain currently is
#[derive(Debug, Clone)]
pub enum Stage {
    Negotiating(Proposal),
    Playing {
        session: GameSession,
        deadline: Instant,
    },
    Closed(ChainEnd),
}

/// Next step after a game has ended: a proposal, or the end of the chain
pub fn follow_up(session: &GameSession, deadline: Instant) -> Result<Proposal, ChainEnd> {
    let SessionState::Terminal(result) = session.state() else {
        return Err(ChainEnd::Abandoned);
    };
    let seats = session.seats();

    match (session.mode(), result) {
        (_, SessionResult::Timeout) => Err(ChainEnd::TimedOut),
        (Mode::Versus, SessionResult::Draw) => Err(ChainEnd::Drawn),
        (Mode::Versus, SessionResult::Win(winner)) => match seats.get(winner.other()) {
            Participant::Human(loser) => Ok(Proposal::new(
                ProposalKind::ChallengeBack,
                seats.get(winner).clone(),
                loser.clone(),
                deadline,
            )),
            Participant::Bot => Err(ChainEnd::Abandoned),
        },
        (Mode::Bot { rematch: true }, SessionResult::Win(Symbol::O)) => Err(ChainEnd::BotWonRematch),
        (Mode::Bot { .. }, result) => {
            let Participant::Human(human) = &seats.x else {
                return Err(ChainEnd::Abandoned);
            };
            let kind = if result == SessionResult::Win(Symbol::O) {
                ProposalKind::BotChallengeBack
            } else {
                ProposalKind::BotRematch
            };
            Ok(Proposal::new(kind, Participant::Bot, human.clone(), deadline))
        }
    }
}

/// A single challenge/rematch chain
#[derive(Debug)]
pub struct Chain {
    id: ChainId,
    stage: Stage,
    handle: u32,
    timings: Timings,
    rng: StdRng,
    tally: Tally,
}

impl Chain {
    /// Open a chain with `proposer` challenging `target`
    pub fn duel(
        id: ChainId,
        proposer: ActorId,
        target: ActorId,
        timings: Timings,
        rng: StdRng,
        now: Instant,
    ) -> (Self, Vec<Notice>) {
        let mut chain = Self::blank(id, timings, rng);
        let proposal = Proposal::new(
            ProposalKind::Duel,
            Participant::Human(proposer),
            target,
            now + timings.challenge_timeout,
        );
        let notices = chain.enter_negotiation(proposal);
        (chain, notices)
    }

    /// Open a chain with `human` playing the bot straight away
    pub fn against_bot(
        id: ChainId,
        human: ActorId,
        timings: Timings,
        rng: StdRng,
        now: Instant,
    ) -> (Self, Vec<Notice>) {
        let mut chain = Self::blank(id, timings, rng);
        let notices = chain.start_bot_game(human, false, now);
        (chain, notices)
    }

    fn blank(id: ChainId, timings: Timings, rng: StdRng) -> Self {
        Self {
            id,
            stage: Stage::Closed(ChainEnd::Abandoned),
            handle: 0,
            timings,
            rng,
            tally: Tally::default(),
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Handle of the board or prompt currently presented
    pub fn current_handle(&self) -> u32 {
        self.handle
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.stage, Stage::Closed(_))
    }

    /// When the current stage times out, `None` once closed
    pub fn deadline(&self) -> Option<Instant> {
        match &self.stage {
            Stage::Negotiating(p) => Some(p.deadline()),
            Stage::Playing { deadline, .. } => Some(*deadline),
            Stage::Closed(_) => None,
        }
    }

    /// Whether the bot is on turn and the arena should schedule its move
    pub fn wants_bot_move(&self) -> bool {
        matches!(&self.stage, Stage::Playing { session, .. } if session.bot_to_move())
    }

    /// Feed one event to the chain
    pub fn apply(&mut self, event: ChainEvent, now: Instant) -> Vec<Notice> {
        match event {
            ChainEvent::CellChosen {
                actor,
                handle,
                index,
            } => self.on_cell(actor, handle, index, now),
            ChainEvent::ChoiceMade {
                actor,
                handle,
                choice,
            } => self.on_choice(actor, handle, choice, now),
            ChainEvent::DeadlineElapsed => self.on_deadline(now),
        }
    }

    /// Apply the bot's move. No-op unless the bot is on turn.
    pub fn play_bot(&mut self, now: Instant) -> Vec<Notice> {
        let Stage::Playing { session, deadline } = &mut self.stage else {
            return Vec::new();
        };
        if !session.bot_to_move() {
            return Vec::new();
        }

        session.play_bot();
        *deadline = now + self.timings.move_timeout;
        tracing::debug!("Chain {}: bot moved", self.id);
        self.after_move(now)
    }

    /// Stop the chain on behalf of the surrounding system
    pub fn abandon(&mut self) -> Vec<Notice> {
        if self.is_closed() {
            return Vec::new();
        }
        self.close(ChainEnd::Abandoned)
    }

    fn on_cell(&mut self, actor: ActorId, handle: u32, index: usize, now: Instant) -> Vec<Notice> {
        if handle != self.handle {
            return vec![self.reject(actor, "This board is no longer active.")];
        }
        let Stage::Playing { session, deadline } = &mut self.stage else {
            return vec![self.reject(actor, "There is no game to play here.")];
        };

        match session.play(&actor, index) {
            Ok(_) => {
                *deadline = now + self.timings.move_timeout;
                tracing::debug!("Chain {}: {} played cell {}", self.id, actor, index);
                self.after_move(now)
            }
            Err(e) => {
                tracing::debug!("Chain {}: rejected move by {}: {}", self.id, actor, e);
                vec![self.reject(actor, &e.to_string())]
            }
        }
    }

    fn on_choice(&mut self, actor: ActorId, handle: u32, choice: Choice, now: Instant) -> Vec<Notice> {
        if handle != self.handle {
            return vec![self.reject(actor, "This prompt is no longer active.")];
        }
        let Stage::Negotiating(proposal) = &mut self.stage else {
            return vec![self.reject(actor, "There is nothing to answer here.")];
        };

        match proposal.respond(&actor, choice, now) {
            Ok(ProposalStatus::Accepted) => {
                let proposal = proposal.clone();
                tracing::info!("Chain {}: {} accepted {:?}", self.id, actor, proposal.kind());
                self.on_accepted(proposal, now)
            }
            Ok(_) => {
                let kind = proposal.kind();
                tracing::info!("Chain {}: {} declined {:?}", self.id, actor, kind);
                self.close(ChainEnd::Declined { kind, by: actor })
            }
            Err(e) => {
                tracing::debug!("Chain {}: rejected answer by {}: {}", self.id, actor, e);
                if proposal.status() == ProposalStatus::Expired {
                    let kind = proposal.kind();
                    let mut notices = vec![self.reject(actor, &e.to_string())];
                    notices.extend(self.close(ChainEnd::Expired { kind }));
                    return notices;
                }
                vec![self.reject(actor, &e.to_string())]
            }
        }
    }

    fn on_deadline(&mut self, now: Instant) -> Vec<Notice> {
        match &mut self.stage {
            Stage::Negotiating(proposal) => {
                if !proposal.expire(now) {
                    return Vec::new();
                }
                let kind = proposal.kind();
                tracing::info!("Chain {}: {:?} expired unanswered", self.id, kind);
                self.close(ChainEnd::Expired { kind })
            }
            Stage::Playing { session, deadline } => {
                if now < *deadline {
                    return Vec::new();
                }
                session.time_out();
                tracing::info!("Chain {}: game timed out", self.id);
                self.after_move(now)
            }
            Stage::Closed(_) => Vec::new(),
        }
    }

    fn on_accepted(&mut self, proposal: Proposal, now: Instant) -> Vec<Notice> {
        match (proposal.kind(), proposal.from()) {
            (ProposalKind::Duel | ProposalKind::Rematch, Participant::Human(proposer)) => {
                let session = GameSession::versus(proposer.clone(), proposal.to().clone());
                self.enter_game(session, now)
            }
            (ProposalKind::ChallengeBack, Participant::Human(winner)) => {
                let rematch = Proposal::new(
                    ProposalKind::Rematch,
                    Participant::Human(proposal.to().clone()),
                    winner.clone(),
                    now + self.timings.challenge_timeout,
                );
                self.enter_negotiation(rematch)
            }
            (ProposalKind::BotRematch | ProposalKind::BotChallengeBack, _) => {
                self.start_bot_game(proposal.to().clone(), true, now)
            }
            (kind, from) => {
                tracing::warn!("Chain {}: {:?} from {:?} cannot start a game", self.id, kind, from);
                self.close(ChainEnd::Abandoned)
            }
        }
    }

    fn start_bot_game(&mut self, human: ActorId, rematch: bool, now: Instant) -> Vec<Notice> {
        let first = if self.rng.random_bool(0.5) {
            Symbol::X
        } else {
            Symbol::O
        };
        tracing::debug!("Chain {}: bot game (rematch: {}), {} opens", self.id, rematch, first);
        let session = GameSession::against_bot(human, rematch, first, &mut self.rng);
        self.enter_game(session, now)
    }

    /// Report the position after a move or timeout and advance the chain if
    /// the game is over
    fn after_move(&mut self, now: Instant) -> Vec<Notice> {
        let Stage::Playing { session, .. } = &self.stage else {
            return Vec::new();
        };

        if session.bot_to_move() {
            return vec![Notice::BotThinking {
                chain: self.id,
                handle: self.handle,
                board: *session.board(),
                seats: session.seats().clone(),
            }];
        }

        let SessionState::Terminal(result) = session.state() else {
            return vec![self.board_notice(session)];
        };

        let session = session.clone();
        self.tally.record(session.seats(), result);
        tracing::info!("Chain {}: game over ({:?})", self.id, result);

        let mut notices = vec![self.board_notice(&session)];
        match follow_up(&session, now + self.timings.challenge_timeout) {
            Ok(proposal) => notices.extend(self.enter_negotiation(proposal)),
            Err(end) => notices.extend(self.close(end)),
        }
        notices
    }

    fn enter_game(&mut self, session: GameSession, now: Instant) -> Vec<Notice> {
        self.handle += 1;
        let notice = self.board_notice(&session);
        self.stage = Stage::Playing {
            session,
            deadline: now + self.timings.move_timeout,
        };
        vec![notice]
    }

    fn enter_negotiation(&mut self, proposal: Proposal) -> Vec<Notice> {
        self.handle += 1;
        let notice = Notice::Prompt {
            chain: self.id,
            handle: self.handle,
            kind: proposal.kind(),
            from: proposal.from().clone(),
            to: proposal.to().clone(),
            options: proposal
                .kind()
                .options()
                .iter()
                .map(|(choice, label)| PromptOption {
                    choice: *choice,
                    label: label.to_string(),
                })
                .collect(),
            expires_in_secs: self.timings.challenge_timeout.as_secs(),
        };
        self.stage = Stage::Negotiating(proposal);
        vec![notice]
    }

    fn close(&mut self, end: ChainEnd) -> Vec<Notice> {
        tracing::info!("Chain {} closed: {:?}", self.id, end);
        self.stage = Stage::Closed(end.clone());
        vec![Notice::Ended {
            chain: self.id,
            end,
            tally: self.tally.clone(),
        }]
    }

    fn board_notice(&self, session: &GameSession) -> Notice {
        Notice::Board {
            chain: self.id,
            handle: self.handle,
            board: *session.board(),
            seats: session.seats().clone(),
            state: session.state(),
            rematch: session.is_rematch(),
            tally: self.tally.clone(),
        }
    }

    fn reject(&self, actor: ActorId, reason: &str) -> Notice {
        Notice::Rejected {
            chain: Some(self.id),
            actor,
            reason: reason.to_string(),
        }
    }
}
