use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

/// Cell identifier, numbered from `1` up to the grid size.
pub type Cell = u16;

/// Count type used for grid sizes, bomb counts and reveal counts.
pub type CellCount = u16;

/// Grid size of the classic 5x5 board.
pub const DEFAULT_GRID_SIZE: CellCount = 25;

static LAST_GAME_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier attached to every generated board, never reused within a process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(u64);

impl GameId {
    /// Mints a new id derived from the wall clock in milliseconds, bumped when needed so that ids
    /// are strictly increasing.
    pub fn mint() -> Self {
        let now = unix_millis();
        let mut last = LAST_GAME_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last.saturating_add(1));
            match LAST_GAME_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Self(next),
                Err(actual) => last = actual,
            }
        }
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().try_into().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub fn utc_now() -> DateTime<Utc> {
    let millis = unix_millis().try_into().unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}
