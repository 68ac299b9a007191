use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Args;
use mines_core::{Cell, CellCount};
use mines_host::{HouseConfig, PlayerId, Table};
use mines_protocol::{RevealRequest, RevealResponse, RevealStatus, StartRequest};

#[derive(Args, Debug)]
pub(crate) struct PlayArgs {
    #[arg(short, long)]
    bombs: CellCount,
    /// Stake of every round, in minor units
    #[arg(long)]
    bet: u64,
    /// Opening balance
    #[arg(long, default_value_t = 1000)]
    deposit: u64,
    /// Client seed mixed into provably fair boards
    #[arg(long)]
    client_seed: Option<String>,
}

enum Command {
    Reveal(Cell),
    Cashout,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "c" | "cashout" => Some(Command::Cashout),
        "q" | "quit" => Some(Command::Quit),
        other => other.parse().ok().map(Command::Reveal),
    }
}

fn render_grid(grid_size: CellCount, revealed: &[Cell], bombs: &[Cell]) -> String {
    let width = (f64::from(grid_size).sqrt().ceil() as usize).max(1);
    let mut out = String::new();
    for cell in 1..=grid_size {
        let mark = if bombs.contains(&cell) {
            " *".to_owned()
        } else if revealed.contains(&cell) {
            " $".to_owned()
        } else {
            format!("{cell:>2}")
        };
        out.push_str(&mark);
        out.push(if usize::from(cell) % width == 0 { '\n' } else { ' ' });
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

pub(crate) fn run(config: HouseConfig, args: PlayArgs) -> anyhow::Result<()> {
    let grid_size = config.grid_size;
    let table = Table::new(config);
    let player = PlayerId::new("local");
    table.deposit(&player, args.deposit)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = io::stdout();

    loop {
        let started = table.start(
            &player,
            StartRequest {
                bet_amount: args.bet,
                bomb_count: args.bombs,
                client_seed: args.client_seed.clone(),
            },
        );
        let started = match started {
            Ok(started) => started,
            Err(err) => {
                println!("cannot start a round: {err}");
                return Ok(());
            }
        };
        println!(
            "round {} started, balance {}, house edge {:.2}%",
            started.game_id, started.balance, started.house_edge
        );
        if let Some(hash) = &started.server_seed_hash {
            println!("server seed hash: {hash}");
        }

        let mut revealed: Vec<Cell> = Vec::new();
        loop {
            print!("{}cell, c to cash out, q to quit> ", render_grid(grid_size, &revealed, &[]));
            stdout.flush().context("flushing stdout")?;

            let Some(line) = lines.next() else {
                return Ok(());
            };
            let line = line.context("reading stdin")?;

            match parse_command(&line) {
                None => println!("unrecognized input {line:?}"),
                Some(Command::Quit) => return Ok(()),
                Some(Command::Cashout) => match table.cashout(&player) {
                    Ok(response) => {
                        print!("{}", render_grid(grid_size, &revealed, &response.mines_positions));
                        println!(
                            "cashed out at {:.4}x: paid {}, balance {}",
                            response.multiplier, response.payout, response.balance
                        );
                        print_seed(response.server_seed.as_deref());
                        break;
                    }
                    Err(err) => println!("{err}"),
                },
                Some(Command::Reveal(cell)) => {
                    let response = table.reveal(
                        &player,
                        RevealRequest {
                            tile_number: cell,
                            sequence: None,
                        },
                    )?;
                    revealed.clone_from(&response.revealed_tiles);
                    if report_reveal(grid_size, &revealed, &response) {
                        break;
                    }
                }
            }
        }
    }
}

/// Prints the result of a reveal, returns whether the round is over.
fn report_reveal(grid_size: CellCount, revealed: &[Cell], response: &RevealResponse) -> bool {
    let bombs = response.mines_positions.as_deref().unwrap_or_default();
    match response.status {
        RevealStatus::Continue => {
            println!("safe, multiplier {:.4}x", response.current_multiplier);
            false
        }
        RevealStatus::Rejected => {
            println!(
                "move rejected: {}",
                response.reason.as_deref().unwrap_or("unknown")
            );
            false
        }
        RevealStatus::GameOver => {
            print!("{}", render_grid(grid_size, revealed, bombs));
            println!("boom, the stake is lost");
            print_seed(response.server_seed.as_deref());
            true
        }
        RevealStatus::Cleared => {
            print!("{}", render_grid(grid_size, revealed, bombs));
            println!(
                "board cleared at {:.4}x: paid {}, balance {}",
                response.current_multiplier,
                response.payout.unwrap_or_default(),
                response.balance.unwrap_or_default()
            );
            print_seed(response.server_seed.as_deref());
            true
        }
    }
}

fn print_seed(server_seed: Option<&str>) {
    if let Some(seed) = server_seed {
        println!("server seed: {seed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert!(matches!(parse_command(" 7\n"), Some(Command::Reveal(7))));
        assert!(matches!(parse_command("c"), Some(Command::Cashout)));
        assert!(matches!(parse_command("quit"), Some(Command::Quit)));
        assert!(parse_command("zero").is_none());
    }

    #[test]
    fn grid_marks_cells() {
        let grid = render_grid(4, &[1], &[4]);
        assert_eq!(grid, " $  2\n 3  *\n");
    }
}
