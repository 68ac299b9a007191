use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mines_core::CellCount;
use mines_host::HouseConfig;

mod play;
mod report;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// What log level to use
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity,

    /// House rules in TOML, defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the payout multiplier after each safe reveal
    Odds {
        #[arg(short, long)]
        bombs: CellCount,
        /// Grid size, the configured one by default
        #[arg(short, long)]
        grid: Option<CellCount>,
    },
    /// Play rounds interactively on stdin
    Play(play::PlayArgs),
    /// Estimate the return to player of a fixed strategy
    Simulate {
        #[arg(short, long)]
        bombs: CellCount,
        /// Safe reveals to attempt before cashing out
        #[arg(short, long)]
        reveals: CellCount,
        #[arg(long, default_value_t = 10_000)]
        rounds: u32,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Rebuild the layout of a provably fair round from its disclosed seeds
    Verify {
        #[arg(long)]
        server_seed: String,
        #[arg(long)]
        client_seed: String,
        #[arg(long)]
        nonce: u64,
        #[arg(short, long)]
        bombs: CellCount,
        #[arg(short, long)]
        grid: Option<CellCount>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => HouseConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HouseConfig::default(),
    };
    log::debug!("house config: {config:?}");

    match args.command {
        Command::Odds { bombs, grid } => {
            report::odds(grid.unwrap_or(config.grid_size), bombs, config.payout)
        }
        Command::Play(play_args) => play::run(config, play_args),
        Command::Simulate {
            bombs,
            reveals,
            rounds,
            seed,
        } => report::simulate(&config, bombs, reveals, rounds, seed),
        Command::Verify {
            server_seed,
            client_seed,
            nonce,
            bombs,
            grid,
        } => report::verify(
            server_seed,
            client_seed,
            nonce,
            grid.unwrap_or(config.grid_size),
            bombs,
        ),
    }
}
