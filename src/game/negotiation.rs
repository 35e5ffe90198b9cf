//! Challenge and rematch proposals
//!
//! A proposal is an offer to one specific human. It resolves exactly once:
//! the first valid answer wins, later answers are rejected, and an
//! unanswered proposal expires at its deadline.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::session::{ActorId, Participant};
use crate::error::NegotiationError;

/// What a proposal offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    /// First challenge of a chain, proposer against target
    Duel,
    /// A loser challenging the winner of a human game
    Rematch,
    /// Offer to the loser of a human game: challenge back or give up
    ChallengeBack,
    /// The bot demands a rematch after losing or drawing
    BotRematch,
    /// Offer to a human the bot has beaten: challenge again or give up
    BotChallengeBack,
}

/// Answer to a proposal. Labels vary per kind, see [`ProposalKind::options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl ProposalKind {
    /// Button labels, accept first
    pub fn options(self) -> [(Choice, &'static str); 2] {
        match self {
            ProposalKind::Duel | ProposalKind::Rematch => {
                [(Choice::Accept, "Accept"), (Choice::Decline, "Decline")]
            }
            ProposalKind::ChallengeBack => [
                (Choice::Accept, "Challenge Back"),
                (Choice::Decline, "Give Up"),
            ],
            ProposalKind::BotRematch => [
                (Choice::Accept, "Accept Rematch!"),
                (Choice::Decline, "Decline"),
            ],
            ProposalKind::BotChallengeBack => {
                [(Choice::Accept, "Challenge"), (Choice::Decline, "Give Up")]
            }
        }
    }

    /// Whether accepting starts a game right away (as opposed to
    /// producing another proposal)
    pub fn starts_game(self) -> bool {
        !matches!(self, ProposalKind::ChallengeBack)
    }
}

/// An offer awaiting a yes/no answer from `to`
#[derive(Debug, Clone)]
pub struct Proposal {
    kind: ProposalKind,
    from: Participant,
    to: ActorId,
    status: ProposalStatus,
    deadline: Instant,
}

impl Proposal {
    pub fn new(kind: ProposalKind, from: Participant, to: ActorId, deadline: Instant) -> Self {
        Self {
            kind,
            from,
            to,
            status: ProposalStatus::Pending,
            deadline,
        }
    }

    pub fn kind(&self) -> ProposalKind {
        self.kind
    }

    /// The proposing side
    pub fn from(&self) -> &Participant {
        &self.from
    }

    /// The only actor entitled to answer
    pub fn to(&self) -> &ActorId {
        &self.to
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    /// Answer the proposal.
    ///
    /// An answer at or past the deadline expires the proposal instead.
    /// Answers from anyone but the target, or to a resolved proposal, leave
    /// it unchanged.
    pub fn respond(
        &mut self,
        actor: &ActorId,
        choice: Choice,
        now: Instant,
    ) -> Result<ProposalStatus, NegotiationError> {
        self.expire(now);
        if !self.is_pending() {
            return Err(NegotiationError::AlreadyResolved { status: self.status });
        }
        if actor != &self.to {
            return Err(NegotiationError::NotForYou);
        }

        self.status = match choice {
            Choice::Accept => ProposalStatus::Accepted,
            Choice::Decline => ProposalStatus::Declined,
        };
        Ok(self.status)
    }

    /// Expire the proposal if it is still pending at `now`.
    /// Returns whether this call expired it.
    pub fn expire(&mut self, now: Instant) -> bool {
        if self.is_pending() && now >= self.deadline {
            self.status = ProposalStatus::Expired;
            return true;
        }
        false
    }
}
