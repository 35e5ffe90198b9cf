//! Line-oriented terminal front end
//!
//! Parses typed commands into [`ArenaCommand`]s and renders [`Notice`]s as
//! text (or as JSON lines with `--json`). Cells are typed as 1-9 like the
//! numbers printed on the board.

use std::collections::HashMap;

use crate::arena::ArenaCommand;
use crate::error::CommandError;
use crate::game::{
    ActorId, ChainEnd, ChainId, Choice, Notice, Participant, ProposalKind, Seats, SessionResult,
    SessionState, Symbol, Tally,
};

pub const HELP: &str = "\
Commands:
  duel <you> <opponent>        challenge someone
  bot <you>                    play against the bot
  move <you> <game> <1-9>      place your symbol
  accept <you> <game>          answer the open prompt with yes
  decline <you> <game>         answer the open prompt with no
  abandon <you> <game>         stop a game
  help                         show this text
  quit                         exit";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Duel { proposer: ActorId, target: ActorId },
    Bot { human: ActorId },
    Move { actor: ActorId, chain: ChainId, index: usize },
    Answer { actor: ActorId, chain: ChainId, choice: Choice },
    Abandon { actor: ActorId, chain: ChainId },
    Help,
    Quit,
}

/// Parse one line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let cmd = match (verb.to_lowercase().as_str(), args) {
        ("duel", [proposer, target]) => ConsoleCommand::Duel {
            proposer: ActorId::new(*proposer),
            target: ActorId::new(*target),
        },
        ("duel", _) => return Err(CommandError::Usage("duel <you> <opponent>")),
        ("bot", [human]) => ConsoleCommand::Bot {
            human: ActorId::new(*human),
        },
        ("bot", _) => return Err(CommandError::Usage("bot <you>")),
        ("move", [actor, chain, cell]) => {
            let position = parse_number(cell)?;
            if !(1..=9).contains(&position) {
                return Err(CommandError::Usage("move <you> <game> <1-9>"));
            }
            ConsoleCommand::Move {
                actor: ActorId::new(*actor),
                chain: parse_chain(chain)?,
                index: position as usize - 1,
            }
        }
        ("move", _) => return Err(CommandError::Usage("move <you> <game> <1-9>")),
        ("accept" | "decline", [actor, chain]) => ConsoleCommand::Answer {
            actor: ActorId::new(*actor),
            chain: parse_chain(chain)?,
            choice: if verb.eq_ignore_ascii_case("accept") {
                Choice::Accept
            } else {
                Choice::Decline
            },
        },
        ("accept", _) => return Err(CommandError::Usage("accept <you> <game>")),
        ("decline", _) => return Err(CommandError::Usage("decline <you> <game>")),
        ("abandon", [actor, chain]) => ConsoleCommand::Abandon {
            actor: ActorId::new(*actor),
            chain: parse_chain(chain)?,
        },
        ("abandon", _) => return Err(CommandError::Usage("abandon <you> <game>")),
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit", _) => ConsoleCommand::Quit,
        _ => return Err(CommandError::Unknown(verb.to_string())),
    };
    Ok(Some(cmd))
}

fn parse_number(word: &str) -> Result<u64, CommandError> {
    word.parse()
        .map_err(|_| CommandError::NotANumber(word.to_string()))
}

/// Game ids are printed as `#3`; accept both `#3` and `3`
fn parse_chain(word: &str) -> Result<ChainId, CommandError> {
    parse_number(word.trim_start_matches('#')).map(ChainId)
}

/// Last thing a chain asked for, used to pick the follow-up text
#[derive(Debug, Clone)]
struct Asked {
    kind: ProposalKind,
    to: ActorId,
}

/// Presenter state for the terminal
pub struct Console {
    bot_name: String,
    json: bool,
    /// Latest interaction handle per running chain
    handles: HashMap<ChainId, u32>,
    last_result: HashMap<ChainId, SessionResult>,
    asked: HashMap<ChainId, Asked>,
}

impl Console {
    pub fn new(bot_name: impl Into<String>, json: bool) -> Self {
        Self {
            bot_name: bot_name.into(),
            json,
            handles: HashMap::new(),
            last_result: HashMap::new(),
            asked: HashMap::new(),
        }
    }

    /// Translate a console command, attaching the chain's latest handle.
    ///
    /// Returns `None` for commands the console handles itself.
    pub fn to_arena(&self, cmd: ConsoleCommand) -> Option<ArenaCommand> {
        let handle_of = |chain: &ChainId| self.handles.get(chain).copied().unwrap_or(0);
        match cmd {
            ConsoleCommand::Duel { proposer, target } => Some(ArenaCommand::Duel { proposer, target }),
            ConsoleCommand::Bot { human } => Some(ArenaCommand::PlayBot { human }),
            ConsoleCommand::Move { actor, chain, index } => Some(ArenaCommand::CellChosen {
                handle: handle_of(&chain),
                chain,
                actor,
                index,
            }),
            ConsoleCommand::Answer { actor, chain, choice } => Some(ArenaCommand::ChoiceMade {
                handle: handle_of(&chain),
                chain,
                actor,
                choice,
            }),
            ConsoleCommand::Abandon { actor, chain } => Some(ArenaCommand::Abandon { chain, actor }),
            ConsoleCommand::Help | ConsoleCommand::Quit => None,
        }
    }

    /// Record what `notice` changes and render it as output lines
    pub fn present(&mut self, notice: &Notice) -> Vec<String> {
        self.observe(notice);
        if self.json {
            return match serde_json::to_string(notice) {
                Ok(line) => vec![line],
                Err(e) => {
                    tracing::warn!("Failed to encode notice: {}", e);
                    Vec::new()
                }
            };
        }
        self.render(notice)
    }

    fn observe(&mut self, notice: &Notice) {
        match notice {
            Notice::Board { chain, handle, .. }
            | Notice::BotThinking { chain, handle, .. }
            | Notice::Prompt { chain, handle, .. } => {
                self.handles.insert(*chain, *handle);
            }
            Notice::Rejected { .. } => {}
            Notice::Ended { chain, .. } => {
                self.handles.remove(chain);
            }
        }
    }

    fn render(&mut self, notice: &Notice) -> Vec<String> {
        match notice {
            Notice::Board {
                chain,
                board,
                seats,
                state,
                rematch,
                tally,
                ..
            } => {
                let mut lines = Vec::new();
                if let Some(asked) = self.asked.remove(chain) {
                    lines.push(self.accepted_text(asked));
                }
                let title = if *rematch { "REMATCH" } else { "TIC-TAC-TOE" };
                lines.push(format!("═══ {} {} ═══", title, chain));
                lines.push(format!(
                    "{} (X) vs {} (O)",
                    self.name(&seats.x),
                    self.name(&seats.o)
                ));
                lines.extend(board.render());
                match state {
                    SessionState::AwaitingMove(symbol) => {
                        lines.push(self.turn_text(*chain, seats, *symbol));
                    }
                    SessionState::Terminal(result) => {
                        self.last_result.insert(*chain, *result);
                        lines.push(self.result_text(seats, *result));
                        lines.push(self.score_text(tally));
                    }
                }
                lines
            }
            Notice::BotThinking { chain, board, .. } => {
                let mut lines = vec![format!("═══ TIC-TAC-TOE {} ═══", chain)];
                lines.extend(board.render());
                lines.push(format!("🤖 {} is thinking...", self.bot_name));
                lines
            }
            Notice::Prompt {
                chain,
                kind,
                from,
                to,
                options,
                expires_in_secs,
                ..
            } => {
                self.asked.insert(
                    *chain,
                    Asked {
                        kind: *kind,
                        to: to.clone(),
                    },
                );
                let buttons = options
                    .iter()
                    .map(|o| format!("[{}] {}", answer_verb(o.choice), o.label))
                    .collect::<Vec<_>>()
                    .join("   ");
                vec![
                    self.prompt_text(*chain, *kind, from, to),
                    format!("{}   (expires in {}s)", buttons, expires_in_secs),
                    format!("Answer with: accept {} {} / decline {} {}", to, chain.0, to, chain.0),
                ]
            }
            Notice::Rejected { chain, actor, reason } => match chain {
                Some(chain) => vec![format!("[{} only, {}] {}", actor, chain, reason)],
                None => vec![format!("[{} only] {}", actor, reason)],
            },
            Notice::Ended { chain, end, tally } => {
                let asked = self.asked.remove(chain);
                let result = self.last_result.remove(chain);
                let mut lines = vec![self.end_text(end, asked, result)];
                if tally.games > 0 {
                    lines.push(self.score_text(tally));
                }
                lines
            }
        }
    }

    fn name(&self, participant: &Participant) -> String {
        match participant {
            Participant::Human(id) => id.to_string(),
            Participant::Bot => self.bot_name.clone(),
        }
    }

    fn turn_text(&self, chain: ChainId, seats: &Seats, symbol: Symbol) -> String {
        let player = self.name(seats.get(symbol));
        format!(
            "Turn: {} ({}). Play with: move {} {} <1-9>",
            player, symbol, player, chain.0
        )
    }

    fn result_text(&self, seats: &Seats, result: SessionResult) -> String {
        match result {
            SessionResult::Win(symbol) => {
                format!("🏆 {} ({}) has won!", self.name(seats.get(symbol)), symbol)
            }
            SessionResult::Draw => "🤝 It's a draw! Well played by both sides.".to_string(),
            SessionResult::Timeout => "⌛ Game timed out! The board is frozen in time.".to_string(),
        }
    }

    fn score_text(&self, tally: &Tally) -> String {
        let mut parts: Vec<String> = tally
            .wins
            .iter()
            .map(|(who, wins)| format!("{} {}", who, wins))
            .collect();
        if tally.bot_wins > 0 {
            parts.push(format!("{} {}", self.bot_name, tally.bot_wins));
        }
        if tally.draws > 0 {
            parts.push(format!("draws {}", tally.draws));
        }
        if parts.is_empty() {
            format!("Games played: {}", tally.games)
        } else {
            format!("Games played: {} | {}", tally.games, parts.join(", "))
        }
    }

    fn prompt_text(&self, chain: ChainId, kind: ProposalKind, from: &Participant, to: &ActorId) -> String {
        let from = self.name(from);
        match kind {
            ProposalKind::Duel => {
                format!("⚔️ {} has challenged {} to a game of Tic-Tac-Toe!", from, to)
            }
            ProposalKind::Rematch => format!("⚔️ {} demands a rematch! Do you accept, {}?", from, to),
            ProposalKind::ChallengeBack => format!(
                "Hey {}, you have been defeated! Will you accept this fate or challenge {} again?",
                to, from
            ),
            ProposalKind::BotRematch => match self.last_result.get(&chain) {
                Some(SessionResult::Draw) => {
                    format!("A draw? {} knows it can win... Rematch, {}?", from, to)
                }
                _ => format!("You got lucky... {} demands a rematch!", from),
            },
            ProposalKind::BotChallengeBack => {
                "Imagine losing to a bot 💀. Do you want me to challenge you back?".to_string()
            }
        }
    }

    fn accepted_text(&self, asked: Asked) -> String {
        match asked.kind {
            ProposalKind::Duel => format!("{} accepted the challenge. A new battle begins!", asked.to),
            ProposalKind::Rematch | ProposalKind::ChallengeBack => {
                "Rematch accepted. A new battle begins!".to_string()
            }
            ProposalKind::BotRematch => {
                format!("You accepted the rematch. {} activated GOD mode..", self.bot_name)
            }
            ProposalKind::BotChallengeBack => "So you have chosen death... A new battle begins!".to_string(),
        }
    }

    fn end_text(&self, end: &ChainEnd, asked: Option<Asked>, result: Option<SessionResult>) -> String {
        match end {
            ChainEnd::Declined { kind, by } => match kind {
                ProposalKind::Duel => format!("{} has declined the duel.", by),
                ProposalKind::Rematch => format!("{} has declined the rematch. The duel is over.", by),
                ProposalKind::ChallengeBack => format!("🏳️ {} has admitted defeat.", by),
                ProposalKind::BotRematch => "Bro is scared already 💀".to_string(),
                ProposalKind::BotChallengeBack => "Better luck next time!".to_string(),
            },
            ChainEnd::Expired { kind } => match kind {
                ProposalKind::Duel => "The challenge was not answered in time.".to_string(),
                ProposalKind::Rematch => "The rematch challenge was not answered in time.".to_string(),
                ProposalKind::ChallengeBack => "The challenge for a rematch has expired.".to_string(),
                ProposalKind::BotRematch | ProposalKind::BotChallengeBack => {
                    "The challenge has expired.".to_string()
                }
            },
            ChainEnd::TimedOut => "Game over: nobody moved in time.".to_string(),
            ChainEnd::BotWonRematch => "See? I told you that you wouldn't win.".to_string(),
            ChainEnd::Drawn => match result {
                Some(SessionResult::Draw) => "Game over. Nobody wins this one.".to_string(),
                _ => "Game over.".to_string(),
            },
            ChainEnd::Abandoned => match asked {
                Some(asked) => format!("Game abandoned while waiting for {}.", asked.to),
                None => "Game abandoned.".to_string(),
            },
        }
    }
}

fn answer_verb(choice: Choice) -> &'static str {
    match choice {
        Choice::Accept => "accept",
        Choice::Decline => "decline",
    }
}
