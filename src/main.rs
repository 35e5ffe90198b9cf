//! TicTacDuel - Tic-Tac-Toe duels in the terminal
//!
//! Every participant is just a name typed on the command line, so one
//! terminal can play both sides of a duel or take on the bot. Notices go to
//! stdout, logs to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tictacduel::arena::{self, Arena, ArenaCommand};
use tictacduel::config::GameConfig;
use tictacduel::console::{self, Console, ConsoleCommand};
use tictacduel::usage::{Clock, MemoryUsageStore, SystemClock};

/// TicTacDuel - challenge friends or the bot to Tic-Tac-Toe
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (timeouts, daily limit, bot name)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print notices as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Seed for coin flips and bot openings
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays readable (and parseable with --json)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GameConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    tracing::info!(
        "Move timeout {}s, challenge timeout {}s, daily limit {:?}",
        config.move_timeout_secs,
        config.challenge_timeout_secs,
        config.daily_game_limit
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryUsageStore::new(clock.clone()));
    let (arena, mut handle) = Arena::new(&config, store, clock);

    let arena_task = tokio::spawn(async move {
        if let Err(e) = arena::run_arena(arena).await {
            tracing::error!("Arena error: {}", e);
        }
    });

    let mut console = Console::new(config.bot_name.clone(), args.json);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if !args.json {
        println!("{}", console::HELP);
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match console::parse(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(ConsoleCommand::Help)) => println!("{}", console::HELP),
                    Ok(Some(cmd)) => {
                        if let Some(cmd) = console.to_arena(cmd) {
                            handle.command_sender.send(cmd).await?;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
            }

            notice = handle.notice_receiver.recv() => {
                let Some(notice) = notice else {
                    tracing::warn!("Arena stopped");
                    break;
                };
                for line in console.present(&notice) {
                    println!("{}", line);
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Shutting down...");
    let _ = handle.command_sender.send(ArenaCommand::Shutdown).await;

    tokio::select! {
        _ = arena_task => {
            tracing::info!("Arena shut down cleanly.");
        }
        _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
            tracing::warn!("Arena shutdown timed out, forcing exit.");
        }
    }

    Ok(())
}
