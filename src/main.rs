//! Agent Arena - headless runner
//!
//! Opens the arena, connects a demo wallet, mints and funds a small squad,
//! sends it into the arena and reports the results after a number of rounds.

use std::path::PathBuf;
use std::time::Duration;

use agent_arena::agent::{Agent, AgentStatus};
use agent_arena::arena::ArenaRuntime;
use agent_arena::battle::TopEntry;
use agent_arena::core::types::{AgentId, Amount, ProviderKind};
use agent_arena::ledger::{parse_amount, WalletView};
use agent_arena::registry::{AgentSort, SquadSummary};
use agent_arena::{ArenaConfig, Game, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Run the agent arena headless and report the outcome
#[derive(Parser, Debug)]
#[command(name = "agent-arena")]
#[command(about = "Run arena rounds with a demo squad and print the results")]
struct Args {
    /// Number of rounds to play before stopping
    #[arg(long, default_value_t = 3)]
    rounds: u64,

    /// Random seed for deterministic runs (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Divide every phase duration by 100
    #[arg(long)]
    fast: bool,

    /// Agents to mint for the demo squad
    #[arg(long, default_value_t = 3)]
    squad: usize,

    /// Funds spread over the squad
    #[arg(long, default_value = "600", value_parser = parse_stake)]
    stake: Amount,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_stake(raw: &str) -> std::result::Result<Amount, String> {
    parse_amount(raw).map_err(|e| e.to_string())
}

#[derive(Serialize)]
struct RunReport {
    seed: u64,
    rounds: u64,
    wallet: WalletView,
    summary: SquadSummary,
    squad: Vec<Agent>,
    last_top3: Vec<TopEntry>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_arena=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ArenaConfig::load(path)?,
        None => ArenaConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.fast {
        config.timing = config.timing.scaled_down(100);
    }

    tracing::info!("Agent Arena starting (seed {})", config.seed);
    let rt = Runtime::new()?;
    let report = rt.block_on(run(config, &args))?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

async fn run(config: ArenaConfig, args: &Args) -> Result<RunReport> {
    let seed = config.seed;
    let poll = config.timing.tick().max(Duration::from_millis(5));
    let arena = ArenaRuntime::new(Game::new(config)?);
    let game = arena.game();

    arena.initialize();
    {
        let mut g = game.lock();
        g.connect_wallet("demo", ProviderKind::Wallet);
        if args.squad > 0 {
            let squad: Vec<AgentId> = g.mint_agents(args.squad)?.iter().map(|a| a.id).collect();
            g.allocate_batch(&squad, args.stake)?;
            g.update_agent_leverage(squad[0], 5)?;
            g.join_batch(&squad)?;
        }
    }

    let last = loop {
        tokio::time::sleep(poll).await;
        let snapshot = game.lock().arena();
        if snapshot.round_number >= args.rounds && !snapshot.phase.is_active() {
            break snapshot;
        }
    };
    // Halting clears the podium, so it is read first
    arena.shutdown();

    let g = game.lock();
    Ok(RunReport {
        seed,
        rounds: last.round_number,
        wallet: g.wallet(),
        summary: g.squad_summary()?,
        squad: g.my_agents_sorted(None, AgentSort::Balance)?,
        last_top3: last.top3,
    })
}

fn print_report(report: &RunReport) {
    println!("\n=== AGENT ARENA ===");
    println!("Seed {} | {} rounds played", report.seed, report.rounds);
    println!(
        "Wallet {}: {} spendable, {} locked, {} total",
        report.wallet.nickname,
        report.wallet.balance,
        report.wallet.locked_balance,
        report.wallet.total_assets()
    );
    println!();
    println!("Squad ({} agents, net profit {}):", report.summary.agent_count, report.summary.total_profit);
    for agent in &report.squad {
        let status = match agent.status {
            AgentStatus::Idle => "idle",
            AgentStatus::InArena => "in arena",
            AgentStatus::Fighting => "fighting",
            AgentStatus::Liquidated => "LIQUIDATED",
        };
        println!(
            "  {:<20} {:?} {:>3}x  bal {:>6}  pnl {:>+6} ({:>+6.1}%)  battles {:>2}  win {:>3}%  [{}]",
            agent.name,
            agent.rarity,
            agent.leverage,
            agent.balance,
            agent.net_profit,
            agent.pnl_percent(),
            agent.total_battles,
            agent.win_rate(),
            status
        );
    }
    println!();
    println!("Last round podium:");
    for (place, entry) in report.last_top3.iter().enumerate() {
        println!("  {}. {} (+{})", place + 1, entry.agent.name, entry.profit);
    }
}
