use anyhow::{Context, bail};
use mines_core::*;
use mines_host::HouseConfig;

pub(crate) fn odds(grid_size: CellCount, bombs: CellCount, policy: PayoutPolicy) -> anyhow::Result<()> {
    let config = GameConfig::new(grid_size, bombs)?;
    println!(
        "{} bombs on {} cells, house edge {:.2}%",
        config.bomb_count(),
        config.grid_size(),
        config.house_edge_percent()
    );

    let safe = f64::from(config.safe_cells());
    let total = f64::from(config.grid_size());
    let mut survival = 1.0;
    println!("{:>6} {:>14} {:>10}", "picks", "multiplier", "chance");
    for (picks, multiplier) in config.multiplier_table().into_iter().enumerate().skip(1) {
        let i = (picks - 1) as f64;
        survival *= (safe - i) / (total - i);
        // payout of a 10000 unit bet tells the effective multiplier under the policy
        let effective = policy.apply((10_000.0 * multiplier) as u64) as f64 / 10_000.0;
        println!(
            "{picks:>6} {effective:>13.4}x {:>9.4}%",
            survival * 100.0
        );
    }
    Ok(())
}

/// Plays `rounds` rounds revealing cells `1..=reveals` in order and cashing out afterwards.
pub(crate) fn simulate(
    house: &HouseConfig,
    bombs: CellCount,
    reveals: CellCount,
    rounds: u32,
    seed: u64,
) -> anyhow::Result<()> {
    const STAKE: u64 = 10_000;

    let config = GameConfig::new(house.grid_size, bombs)?;
    if reveals == 0 || reveals > config.safe_cells() {
        bail!(
            "reveals must be between 1 and {} for this configuration",
            config.safe_cells()
        );
    }

    let mut source = SeededCellSource::new(seed);
    let mut wagered: u128 = 0;
    let mut paid: u128 = 0;
    let mut wins: u32 = 0;

    for _ in 0..rounds {
        let mut round = Round::start(config, STAKE, &mut source)?;
        wagered += u128::from(STAKE);

        let mut settlement = None;
        for cell in 1..=reveals {
            match round.reveal(cell)? {
                RevealOutcome::Safe { .. } => continue,
                RevealOutcome::Cleared { settlement: s, .. } => settlement = Some(s),
                RevealOutcome::HitBomb { .. } => {}
                RevealOutcome::Rejected(reason) => bail!("simulated move rejected: {reason}"),
            }
            break;
        }
        if !round.is_finished() {
            settlement = round.cashout().settlement();
        }

        if let Some(settlement) = settlement {
            wins += 1;
            paid += u128::from(house.payout.apply(settlement.payout));
        }
    }

    let rtp = if wagered == 0 {
        0.0
    } else {
        paid as f64 / wagered as f64
    };
    log::debug!("wagered {wagered}, paid {paid}");
    println!(
        "{rounds} rounds, {bombs} bombs, {reveals} reveals: won {wins} ({:.2}%), return to player {:.4}",
        f64::from(wins) * 100.0 / f64::from(rounds.max(1)),
        rtp
    );
    Ok(())
}

pub(crate) fn verify(
    server_seed: String,
    client_seed: String,
    nonce: u64,
    grid_size: CellCount,
    bombs: CellCount,
) -> anyhow::Result<()> {
    let config = GameConfig::new(grid_size, bombs).context("invalid board parameters")?;
    let seeds = FairSeeds::new(server_seed, client_seed, nonce);
    let board = seeds.board(config);

    println!("server seed hash: {}", seeds.server_seed_hash());
    println!(
        "bombs: {}",
        board
            .bomb_cells()
            .map(|cell| cell.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
