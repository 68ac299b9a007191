use core::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::*;

type HmacSha256 = Hmac<Sha256>;

const BLOCK_LEN: usize = 32;

/// Seeds of a provably fair round.
///
/// The server seed stays secret until the round is over, only its hash is published up front.
/// Once disclosed, anyone can rebuild the layout with [`verify_board`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairSeeds {
    server_seed: String,
    client_seed: String,
    nonce: u64,
}

impl FairSeeds {
    pub fn new(server_seed: impl Into<String>, client_seed: impl Into<String>, nonce: u64) -> Self {
        Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
        }
    }

    pub fn server_seed(&self) -> &str {
        &self.server_seed
    }

    pub fn client_seed(&self) -> &str {
        &self.client_seed
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Hex SHA-256 of the server seed, the commitment shown before play.
    pub fn server_seed_hash(&self) -> String {
        hex::encode(Sha256::digest(self.server_seed.as_bytes()))
    }

    /// Builds the board these seeds commit to.
    pub fn board(&self, config: GameConfig) -> Board {
        generate_board(config, &mut FairCellSource::new(self.clone()))
    }
}

impl fmt::Debug for FairSeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FairSeeds")
            .field("server_seed_hash", &self.server_seed_hash())
            .field("client_seed", &self.client_seed)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Cell source backed by `HMAC-SHA256(server_seed, "{client_seed}:{nonce}:{block}")`.
///
/// Each draw consumes 4 bytes as a big-endian `u32`. Values from the incomplete top range are
/// skipped so that every cell is equally likely.
#[derive(Clone, Debug)]
pub struct FairCellSource {
    seeds: FairSeeds,
    block: [u8; BLOCK_LEN],
    offset: usize,
    next_block: u64,
}

impl FairCellSource {
    pub fn new(seeds: FairSeeds) -> Self {
        Self {
            seeds,
            block: [0; BLOCK_LEN],
            offset: BLOCK_LEN,
            next_block: 0,
        }
    }

    pub fn seeds(&self) -> &FairSeeds {
        &self.seeds
    }

    fn refill(&mut self) {
        let mut mac = HmacSha256::new_from_slice(self.seeds.server_seed.as_bytes())
            .expect("HMAC accepts keys of any length");
        let message = format!(
            "{}:{}:{}",
            self.seeds.client_seed, self.seeds.nonce, self.next_block
        );
        mac.update(message.as_bytes());
        self.block.copy_from_slice(&mac.finalize().into_bytes());
        self.offset = 0;
        self.next_block += 1;
    }

    fn next_u32(&mut self) -> u32 {
        if self.offset + 4 > BLOCK_LEN {
            self.refill();
        }
        let chunk = &self.block[self.offset..self.offset + 4];
        self.offset += 4;
        u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }
}

impl CellSource for FairCellSource {
    fn draw_cell(&mut self, grid_size: CellCount) -> Cell {
        let span = u64::from(grid_size.max(1));
        let space = 1u64 << 32;
        let limit = space - space % span;
        loop {
            let value = u64::from(self.next_u32());
            if value < limit {
                return (value % span + 1) as Cell;
            }
        }
    }
}

/// Checks that `bomb_cells` is exactly the layout committed to by `seeds`.
pub fn verify_board(seeds: &FairSeeds, config: GameConfig, bomb_cells: &[Cell]) -> bool {
    let mut claimed = bomb_cells.to_vec();
    claimed.sort_unstable();
    claimed.dedup();

    let expected: Vec<_> = seeds.board(config).bomb_cells().collect();
    claimed.len() == bomb_cells.len() && claimed == expected
}
