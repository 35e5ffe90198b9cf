//! Arena: runs every chain
//!
//! The arena task owns the routing table from chain id to chain task and
//! creates chains on request. Each chain runs in its own task and handles
//! one event at a time, racing the next event against its deadline.
//! Chains share nothing; concurrent chains never see each other's events.
//!
//! Talk to the arena through the [`ArenaHandle`] returned by [`Arena::new`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::config::GameConfig;
use crate::error::ArenaError;
use crate::game::{ActorId, Chain, ChainEvent, ChainId, Choice, Notice, Timings};
use crate::usage::{Clock, DailyLimiter, UsageStore};

/// Capacity of each chain's event queue
const CHAIN_QUEUE: usize = 32;

/// Commands accepted by the arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaCommand {
    /// `proposer` challenges `target` to a duel
    Duel { proposer: ActorId, target: ActorId },
    /// `human` starts a game against the bot
    PlayBot { human: ActorId },
    /// A cell was clicked on a presented board
    CellChosen {
        chain: ChainId,
        handle: u32,
        actor: ActorId,
        index: usize,
    },
    /// A prompt button was clicked
    ChoiceMade {
        chain: ChainId,
        handle: u32,
        actor: ActorId,
        choice: Choice,
    },
    /// Stop a chain, e.g. because its message could not be shown
    Abandon { chain: ChainId, actor: ActorId },
    Shutdown,
}

/// Handle returned from `Arena::new()` for talking to the arena task
pub struct ArenaHandle {
    /// Send commands to the arena
    pub command_sender: mpsc::Sender<ArenaCommand>,
    /// Receive notices to present
    pub notice_receiver: mpsc::Receiver<Notice>,
}

/// Router for all running chains
pub struct Arena {
    timings: Timings,
    think_delay: Duration,
    limiter: Option<DailyLimiter>,
    /// Event queue of every live chain
    chains: HashMap<ChainId, mpsc::Sender<ChainEvent>>,
    next_id: u64,
    /// Seeds a fresh generator for every chain
    rng: StdRng,
    notice_sender: mpsc::Sender<Notice>,
    command_receiver: mpsc::Receiver<ArenaCommand>,
    finished_sender: mpsc::UnboundedSender<ChainId>,
    finished_receiver: mpsc::UnboundedReceiver<ChainId>,
}

impl Arena {
    /// Create an arena.
    ///
    /// `store` and `clock` back the daily limit; they are unused when the
    /// config sets no limit.
    pub fn new(
        config: &GameConfig,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
    ) -> (Self, ArenaHandle) {
        let (notice_sender, notice_receiver) = mpsc::channel(256);
        let (command_sender, command_receiver) = mpsc::channel(256);
        let (finished_sender, finished_receiver) = mpsc::unbounded_channel();

        let limiter = config.daily_game_limit.map(|limit| {
            DailyLimiter::new(
                store,
                clock,
                limit,
                config.limit_exempt.iter().map(ActorId::new),
            )
        });

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let arena = Self {
            timings: config.timings(),
            think_delay: config.bot_think_delay(),
            limiter,
            chains: HashMap::new(),
            next_id: 1,
            rng,
            notice_sender,
            command_receiver,
            finished_sender,
            finished_receiver,
        };

        let handle = ArenaHandle {
            command_sender,
            notice_receiver,
        };

        (arena, handle)
    }

    /// Number of chains still running
    pub fn live_chains(&self) -> usize {
        self.chains.len()
    }

    async fn handle_command(&mut self, cmd: ArenaCommand) -> Result<()> {
        match cmd {
            ArenaCommand::Duel { proposer, target } => {
                if proposer == target {
                    return self
                        .reject(None, proposer, "You cannot challenge yourself.")
                        .await;
                }
                if !self.within_limit(&proposer).await? {
                    return Ok(());
                }
                let id = self.allocate_id();
                let rng = StdRng::from_rng(&mut self.rng);
                let (chain, notices) =
                    Chain::duel(id, proposer, target, self.timings, rng, Instant::now());
                self.spawn_chain(chain, notices);
            }
            ArenaCommand::PlayBot { human } => {
                if !self.within_limit(&human).await? {
                    return Ok(());
                }
                let id = self.allocate_id();
                let rng = StdRng::from_rng(&mut self.rng);
                let (chain, notices) = Chain::against_bot(id, human, self.timings, rng, Instant::now());
                self.spawn_chain(chain, notices);
            }
            ArenaCommand::CellChosen {
                chain,
                handle,
                actor,
                index,
            } => {
                let event = ChainEvent::CellChosen {
                    actor: actor.clone(),
                    handle,
                    index,
                };
                self.route(chain, actor, event).await?;
            }
            ArenaCommand::ChoiceMade {
                chain,
                handle,
                actor,
                choice,
            } => {
                let event = ChainEvent::ChoiceMade {
                    actor: actor.clone(),
                    handle,
                    choice,
                };
                self.route(chain, actor, event).await?;
            }
            ArenaCommand::Abandon { chain, actor } => {
                // Dropping the queue makes the chain task close itself
                if self.chains.remove(&chain).is_some() {
                    tracing::info!("Chain {} abandoned by {}", chain, actor);
                } else {
                    self.reject(Some(chain), actor, "That game is no longer running.")
                        .await?;
                }
            }
            ArenaCommand::Shutdown => {}
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> ChainId {
        let id = ChainId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Consume one daily use for `actor`; rejects and returns false when
    /// the limit is spent
    async fn within_limit(&self, actor: &ActorId) -> Result<bool> {
        let Some(limiter) = &self.limiter else {
            return Ok(true);
        };
        match limiter.try_consume(actor) {
            Ok(_) => Ok(true),
            Err(e) => {
                let reason = format!("Enough for you today! {}.", e);
                self.reject(None, actor.clone(), &reason).await?;
                Ok(false)
            }
        }
    }

    /// Queue `event` on its chain without waiting; a full queue never
    /// holds up other chains
    async fn route(&mut self, chain: ChainId, actor: ActorId, event: ChainEvent) -> Result<()> {
        let Some(queue) = self.chains.get(&chain) else {
            tracing::debug!("Dropped event for unknown chain {}", chain);
            return self
                .reject(Some(chain), actor, "That game is no longer running.")
                .await;
        };
        match queue.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Chain {} is busy, dropped event from {}", chain, actor);
                self.reject(Some(chain), actor, "That game is busy, try again in a moment.")
                    .await
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Dropped event for finished chain {}", chain);
                self.reject(Some(chain), actor, "That game is no longer running.")
                    .await
            }
        }
    }

    async fn reject(&self, chain: Option<ChainId>, actor: ActorId, reason: &str) -> Result<()> {
        self.notice_sender
            .send(Notice::Rejected {
                chain,
                actor,
                reason: reason.to_string(),
            })
            .await
            .map_err(|_| ArenaError::PresenterClosed)?;
        Ok(())
    }

    fn spawn_chain(&mut self, chain: Chain, initial: Vec<Notice>) {
        let id = chain.id();
        let (event_sender, event_receiver) = mpsc::channel(CHAIN_QUEUE);
        self.chains.insert(id, event_sender);
        tracing::info!("Chain {} started", id);

        let notices = self.notice_sender.clone();
        let finished = self.finished_sender.clone();
        let think_delay = self.think_delay;
        tokio::spawn(async move {
            if let Err(e) = run_chain(chain, initial, event_receiver, notices, think_delay).await {
                tracing::warn!("Chain {} stopped: {}", id, e);
            }
            let _ = finished.send(id);
        });
    }
}

/// Drive one chain until it closes.
///
/// Waits for the next event or the chain's deadline, whichever comes first.
/// When the bot is on turn it moves after `think_delay` without waiting for
/// an event. A closed event queue abandons the chain.
pub async fn run_chain(
    mut chain: Chain,
    initial: Vec<Notice>,
    mut events: mpsc::Receiver<ChainEvent>,
    notices: mpsc::Sender<Notice>,
    think_delay: Duration,
) -> Result<(), ArenaError> {
    deliver(&notices, initial).await?;

    loop {
        if chain.wants_bot_move() {
            tokio::time::sleep(think_delay).await;
            deliver(&notices, chain.play_bot(Instant::now())).await?;
            continue;
        }

        let Some(deadline) = chain.deadline() else {
            break;
        };

        let out = tokio::select! {
            event = events.recv() => match event {
                Some(event) => chain.apply(event, Instant::now()),
                None => chain.abandon(),
            },
            _ = tokio::time::sleep_until(deadline) => {
                chain.apply(ChainEvent::DeadlineElapsed, Instant::now())
            }
        };
        deliver(&notices, out).await?;
    }

    tracing::debug!("Chain {} finished", chain.id());
    Ok(())
}

async fn deliver(notices: &mpsc::Sender<Notice>, batch: Vec<Notice>) -> Result<(), ArenaError> {
    for notice in batch {
        notices
            .send(notice)
            .await
            .map_err(|_| ArenaError::PresenterClosed)?;
    }
    Ok(())
}

/// Run the arena loop.
///
/// Pass ownership of `Arena` here; communicate via the `ArenaHandle`.
/// Returns when a `Shutdown` command arrives or every command sender is
/// dropped. Running chains are abandoned on exit.
pub async fn run_arena(mut arena: Arena) -> Result<()> {
    loop {
        tokio::select! {
            Some(id) = arena.finished_receiver.recv() => {
                arena.chains.remove(&id);
                tracing::debug!("Chain {} removed, {} still running", id, arena.live_chains());
            }

            cmd = arena.command_receiver.recv() => {
                match cmd {
                    Some(ArenaCommand::Shutdown) | None => {
                        tracing::info!("Arena shutting down with {} running chains", arena.live_chains());
                        break;
                    }
                    Some(cmd) => arena.handle_command(cmd).await?,
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ChainEnd, ProposalKind, SessionResult, SessionState, Symbol};
    use crate::usage::{MemoryUsageStore, SystemClock};

    fn start(config: GameConfig) -> ArenaHandle {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryUsageStore::new(clock.clone()));
        let (arena, handle) = Arena::new(&config, store, clock);
        tokio::spawn(run_arena(arena));
        handle
    }

    fn seeded() -> GameConfig {
        GameConfig {
            seed: Some(11),
            ..GameConfig::default()
        }
    }

    async fn send(handle: &ArenaHandle, cmd: ArenaCommand) {
        handle.command_sender.send(cmd).await.unwrap();
    }

    async fn next(handle: &mut ArenaHandle) -> Notice {
        handle.notice_receiver.recv().await.expect("arena alive")
    }

    fn actor(name: &str) -> ActorId {
        ActorId::new(name)
    }

    /// Open a duel between alice and bob and accept it; returns the chain
    /// and board handle
    async fn accepted_duel(handle: &mut ArenaHandle) -> (ChainId, u32) {
        send(handle, ArenaCommand::Duel { proposer: actor("alice"), target: actor("bob") }).await;
        let Notice::Prompt { chain, handle: h, .. } = next(handle).await else {
            panic!("expected duel prompt");
        };
        send(
            handle,
            ArenaCommand::ChoiceMade { chain, handle: h, actor: actor("bob"), choice: Choice::Accept },
        )
        .await;
        let Notice::Board { handle: h, .. } = next(handle).await else {
            panic!("expected board");
        };
        (chain, h)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_duel_expires_after_a_minute() {
        let mut handle = start(seeded());
        let started = Instant::now();
        send(&handle, ArenaCommand::Duel { proposer: actor("alice"), target: actor("bob") }).await;
        assert!(matches!(next(&mut handle).await, Notice::Prompt { kind: ProposalKind::Duel, .. }));

        let notice = next(&mut handle).await;
        assert!(matches!(
            notice,
            Notice::Ended { end: ChainEnd::Expired { kind: ProposalKind::Duel }, .. }
        ));
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_respondent_gets_notice_only() {
        let mut handle = start(seeded());
        send(&handle, ArenaCommand::Duel { proposer: actor("alice"), target: actor("bob") }).await;
        let Notice::Prompt { chain, handle: h, .. } = next(&mut handle).await else {
            panic!("expected prompt");
        };

        send(
            &handle,
            ArenaCommand::ChoiceMade { chain, handle: h, actor: actor("carol"), choice: Choice::Accept },
        )
        .await;
        assert!(matches!(
            next(&mut handle).await,
            Notice::Rejected { actor: a, .. } if a == actor("carol")
        ));

        // The real target can still answer
        send(
            &handle,
            ArenaCommand::ChoiceMade { chain, handle: h, actor: actor("bob"), choice: Choice::Decline },
        )
        .await;
        assert!(matches!(
            next(&mut handle).await,
            Notice::Ended { end: ChainEnd::Declined { kind: ProposalKind::Duel, .. }, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_times_out_after_inactivity() {
        let mut handle = start(seeded());
        let (chain, h) = accepted_duel(&mut handle).await;
        send(
            &handle,
            ArenaCommand::CellChosen { chain, handle: h, actor: actor("alice"), index: 4 },
        )
        .await;
        assert!(matches!(next(&mut handle).await, Notice::Board { .. }));

        let moved = Instant::now();
        assert!(matches!(
            next(&mut handle).await,
            Notice::Board { state: SessionState::Terminal(SessionResult::Timeout), .. }
        ));
        assert!(moved.elapsed() >= Duration::from_secs(300));
        assert!(matches!(next(&mut handle).await, Notice::Ended { end: ChainEnd::TimedOut, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_chains_stay_apart() {
        let mut handle = start(seeded());
        let (first, h1) = accepted_duel(&mut handle).await;

        send(&handle, ArenaCommand::Duel { proposer: actor("carol"), target: actor("dave") }).await;
        let Notice::Prompt { chain: second, handle: h2, .. } = next(&mut handle).await else {
            panic!("expected prompt");
        };
        assert_ne!(first, second);

        // carol's click aimed at the first chain does nothing there
        send(
            &handle,
            ArenaCommand::CellChosen { chain: first, handle: h1, actor: actor("carol"), index: 0 },
        )
        .await;
        assert!(matches!(
            next(&mut handle).await,
            Notice::Rejected { chain: Some(c), .. } if c == first
        ));

        // alice's move lands on the first chain only
        send(
            &handle,
            ArenaCommand::CellChosen { chain: first, handle: h1, actor: actor("alice"), index: 0 },
        )
        .await;
        let Notice::Board { chain, board, .. } = next(&mut handle).await else {
            panic!("expected board");
        };
        assert_eq!(chain, first);
        assert_eq!(board.get(0), Some(Symbol::X));

        send(
            &handle,
            ArenaCommand::ChoiceMade { chain: second, handle: h2, actor: actor("dave"), choice: Choice::Accept },
        )
        .await;
        let Notice::Board { chain, board, .. } = next(&mut handle).await else {
            panic!("expected board");
        };
        assert_eq!(chain, second);
        assert!(board.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_game_with_thinking_delay() {
        let mut handle = start(seeded());
        send(&handle, ArenaCommand::PlayBot { human: actor("alice") }).await;

        let mut thinking_since = None;
        loop {
            match next(&mut handle).await {
                Notice::Board { chain, handle: h, board, state: SessionState::AwaitingMove(Symbol::X), .. } => {
                    if let Some(since) = thinking_since.take() {
                        assert!(Instant::now() - since >= Duration::from_secs(1));
                    }
                    let index = board.empty_cells().next().unwrap();
                    send(
                        &handle,
                        ArenaCommand::CellChosen { chain, handle: h, actor: actor("alice"), index },
                    )
                    .await;
                }
                Notice::BotThinking { .. } => thinking_since = Some(Instant::now()),
                Notice::Board { state: SessionState::Terminal(_), .. } => {}
                Notice::Prompt { chain, handle: h, kind, to, .. } => {
                    assert!(matches!(kind, ProposalKind::BotChallengeBack | ProposalKind::BotRematch));
                    assert_eq!(to, actor("alice"));
                    send(
                        &handle,
                        ArenaCommand::ChoiceMade { chain, handle: h, actor: actor("alice"), choice: Choice::Decline },
                    )
                    .await;
                }
                Notice::Ended { end, tally, .. } => {
                    assert!(matches!(end, ChainEnd::Declined { .. }));
                    assert_eq!(tally.games, 1);
                    // The bot never loses
                    assert!(tally.wins.is_empty());
                    assert_eq!(tally.bot_wins + tally.draws, 1);
                    break;
                }
                other => panic!("unexpected notice {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flooded_chain_does_not_stall_others() {
        let config = GameConfig {
            bot_think_millis: 30_000,
            ..seeded()
        };
        let mut handle = start(config);
        send(&handle, ArenaCommand::PlayBot { human: actor("alice") }).await;
        let Notice::Board { chain, handle: h, board, .. } = next(&mut handle).await else {
            panic!("expected board");
        };
        let index = board.empty_cells().next().unwrap();
        send(&handle, ArenaCommand::CellChosen { chain, handle: h, actor: actor("alice"), index }).await;
        assert!(matches!(next(&mut handle).await, Notice::BotThinking { .. }));

        // The bot chain reads nothing while it thinks
        let started = Instant::now();
        for _ in 0..CHAIN_QUEUE + 8 {
            send(&handle, ArenaCommand::CellChosen { chain, handle: h, actor: actor("mallory"), index }).await;
        }
        send(&handle, ArenaCommand::Duel { proposer: actor("carol"), target: actor("dave") }).await;

        let mut busy = 0;
        loop {
            match next(&mut handle).await {
                Notice::Rejected { chain: Some(c), actor: a, .. } if c == chain && a == actor("mallory") => busy += 1,
                Notice::Prompt { kind: ProposalKind::Duel, to, .. } => {
                    assert_eq!(to, actor("dave"));
                    break;
                }
                other => panic!("unexpected notice {:?}", other),
            }
        }
        assert_eq!(busy, 8);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_challenge_rejected() {
        let mut handle = start(seeded());
        send(&handle, ArenaCommand::Duel { proposer: actor("alice"), target: actor("alice") }).await;
        assert!(matches!(next(&mut handle).await, Notice::Rejected { chain: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_limit() {
        let config = GameConfig {
            daily_game_limit: Some(1),
            limit_exempt: vec!["owner".to_string()],
            ..seeded()
        };
        let mut handle = start(config);

        send(&handle, ArenaCommand::Duel { proposer: actor("alice"), target: actor("bob") }).await;
        assert!(matches!(next(&mut handle).await, Notice::Prompt { .. }));
        send(&handle, ArenaCommand::Duel { proposer: actor("alice"), target: actor("bob") }).await;
        assert!(matches!(next(&mut handle).await, Notice::Rejected { chain: None, .. }));

        for _ in 0..2 {
            send(&handle, ArenaCommand::Duel { proposer: actor("owner"), target: actor("bob") }).await;
            assert!(matches!(next(&mut handle).await, Notice::Prompt { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_and_unknown_chain() {
        let mut handle = start(seeded());
        let (chain, h) = accepted_duel(&mut handle).await;

        send(&handle, ArenaCommand::Abandon { chain, actor: actor("alice") }).await;
        assert!(matches!(next(&mut handle).await, Notice::Ended { end: ChainEnd::Abandoned, .. }));

        // A second abandon finds nothing to stop
        send(&handle, ArenaCommand::Abandon { chain, actor: actor("alice") }).await;
        assert!(matches!(
            next(&mut handle).await,
            Notice::Rejected { chain: Some(c), actor: a, .. } if c == chain && a == actor("alice")
        ));

        send(
            &handle,
            ArenaCommand::CellChosen { chain, handle: h, actor: actor("alice"), index: 0 },
        )
        .await;
        assert!(matches!(next(&mut handle).await, Notice::Rejected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_presenter_gone_stops_chain() {
        let (_event_sender, event_receiver) = mpsc::channel(4);
        let (chain, initial) = Chain::duel(
            ChainId(1),
            actor("alice"),
            actor("bob"),
            Timings::default(),
            StdRng::seed_from_u64(1),
            Instant::now(),
        );
        let (notices, receiver) = mpsc::channel(4);
        drop(receiver);

        let result = run_chain(chain, initial, event_receiver, notices, Duration::ZERO).await;
        assert!(matches!(result, Err(ArenaError::PresenterClosed)));
    }
}
