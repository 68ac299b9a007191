use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mines_core::{
    Board, CashoutOutcome, Cell, FairSeeds, GameConfig, RevealOutcome, Round, SeededCellSource,
    generate_board,
};
use mines_protocol::*;

use crate::history::History;
use crate::*;

/// Server-side state of one player's latest round.
#[derive(Debug)]
struct Session {
    round: Round,
    seeds: Option<FairSeeds>,
    last_move: Option<LastMove>,
    /// Bookkeeping still owed by a round that already ended.
    pending: Option<Pending>,
}

/// Response of the last committed move, replayed when the same request arrives again.
#[derive(Clone, Debug)]
enum LastMove {
    Reveal { cell: Cell, response: RevealResponse },
    Cashout(CashoutResponse),
}

impl LastMove {
    fn set_balance(&mut self, balance: u64) {
        match self {
            Self::Reveal { response, .. } => response.balance = Some(balance),
            Self::Cashout(response) => response.balance = balance,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Pending {
    /// `None` for a lost round.
    payout: Option<u64>,
    credited: bool,
}

/// Runs rounds for many players at once.
///
/// Each round sits behind its own mutex, held for the whole of a reveal or cashout. The session
/// registry lock is only held to look a round up or to install a new one. Locks are always taken
/// in the order registry, session, wallet, history.
///
/// A round that ends records its response before paying out or archiving. If either of those
/// fails, the next request for that player finishes them first, and repeating the move returns
/// the recorded response.
#[derive(Debug)]
pub struct Table {
    config: HouseConfig,
    wallet: Wallet,
    sessions: Mutex<HashMap<PlayerId, Arc<Mutex<Session>>>>,
    history: Mutex<History>,
    nonce: AtomicU64,
}

impl Table {
    pub fn new(config: HouseConfig) -> Self {
        let history = History::new(config.archive_limit);
        Self {
            config,
            wallet: Wallet::new(),
            sessions: Mutex::new(HashMap::new()),
            history: Mutex::new(history),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HouseConfig {
        &self.config
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn deposit(&self, player: &PlayerId, amount: u64) -> Result<BalanceResponse> {
        let balance = self.wallet.deposit(player, amount)?;
        log::info!("{player} deposited {amount}, balance {balance}");
        Ok(BalanceResponse { balance })
    }

    pub fn balance(&self, player: &PlayerId) -> Result<u64> {
        self.wallet.balance(player)
    }

    /// Places a bet and starts a round on a freshly generated board.
    pub fn start(&self, player: &PlayerId, request: StartRequest) -> Result<StartResponse> {
        self.check_bet(request.bet_amount)?;
        let config = GameConfig::new(self.config.grid_size, request.bomb_count)?;

        let (board, seeds) = match self.config.fairness {
            Fairness::Provable => {
                let client_seed = match request.client_seed {
                    Some(seed) => seed,
                    None => random_hex(8)?,
                };
                let seeds = FairSeeds::new(random_hex(32)?, client_seed, self.next_nonce());
                (seeds.board(config), Some(seeds))
            }
            Fairness::Seeded => {
                let seed = match self.config.seed {
                    Some(seed) => seed ^ self.next_nonce(),
                    None => random_u64()?,
                };
                (generate_board(config, &mut SeededCellSource::new(seed)), None)
            }
        };

        self.start_with_board(player, request.bet_amount, board, seeds)
    }

    /// Starts a round on a board produced elsewhere, for hosts with their own randomness.
    pub fn start_with_board(
        &self,
        player: &PlayerId,
        bet_amount: u64,
        board: Board,
        seeds: Option<FairSeeds>,
    ) -> Result<StartResponse> {
        self.check_bet(bet_amount)?;
        let round = Round::new(board, bet_amount)?;

        let mut sessions = self.sessions.lock().map_err(|_| HostError::Poisoned)?;
        if let Some(existing) = sessions.get(player) {
            let mut existing = existing.lock().map_err(|_| HostError::Poisoned)?;
            if !existing.round.is_finished() {
                return Err(HostError::RoundInProgress);
            }
            self.settle_pending(player, &mut existing)?;
        }

        let balance = self.wallet.debit(player, bet_amount)?;
        if let Err(err) = self.record_start(bet_amount) {
            self.wallet.credit(player, bet_amount)?;
            return Err(err);
        }

        let config = round.config();
        let response = StartResponse {
            game_id: round.game_id(),
            balance,
            bomb_count: config.bomb_count(),
            house_edge: config.house_edge_percent(),
            server_seed_hash: seeds.as_ref().map(FairSeeds::server_seed_hash),
            created_at: round.created_at(),
        };
        log::info!(
            "{player} started round {} with {} bombs, bet {bet_amount}",
            response.game_id,
            config.bomb_count()
        );

        sessions.insert(
            player.clone(),
            Arc::new(Mutex::new(Session {
                round,
                seeds,
                last_move: None,
                pending: None,
            })),
        );
        Ok(response)
    }

    pub fn reveal(&self, player: &PlayerId, request: RevealRequest) -> Result<RevealResponse> {
        let session = self.session(player)?;
        let mut session = session.lock().map_err(|_| HostError::Poisoned)?;
        self.settle_pending(player, &mut session)?;
        let cell = request.tile_number;

        if let Some(sent) = request.sequence {
            let committed = session.round.sequence();
            if sent < committed {
                return match &session.last_move {
                    Some(LastMove::Reveal {
                        cell: last_cell,
                        response,
                    }) if sent + 1 == committed && *last_cell == cell => {
                        log::debug!("{player} replayed move {sent} on cell {cell}");
                        Ok(response.clone())
                    }
                    _ => Err(HostError::StaleSequence { sent, committed }),
                };
            }
            if sent > committed {
                return Err(HostError::SequenceGap { sent, committed });
            }
        }

        let game_id = session.round.game_id();
        let outcome = session.round.reveal(cell).inspect_err(|err| {
            log::error!("Round {game_id} broke an invariant: {err}");
        })?;
        let mut response = RevealResponse::from_outcome(&session.round, outcome);

        match outcome {
            RevealOutcome::Rejected(reason) => {
                log::warn!("{player} move on cell {cell} rejected: {reason}");
                return Ok(response);
            }
            RevealOutcome::Safe { multiplier, .. } => {
                log::debug!("{player} found a coin on cell {cell}, multiplier {multiplier:.4}");
            }
            RevealOutcome::HitBomb { .. } => {
                log::info!("{player} hit a bomb on cell {cell}");
                response.server_seed = session.seeds.as_ref().map(|s| s.server_seed().to_owned());
                session.pending = Some(Pending {
                    payout: None,
                    credited: false,
                });
            }
            RevealOutcome::Cleared { settlement, .. } => {
                let payout = self.config.payout.apply(settlement.payout);
                log::info!("{player} cleared the board, paid {payout}");
                response.payout = Some(payout);
                response.server_seed = session.seeds.as_ref().map(|s| s.server_seed().to_owned());
                session.pending = Some(Pending {
                    payout: Some(payout),
                    credited: false,
                });
            }
        }

        session.last_move = Some(LastMove::Reveal {
            cell,
            response: response.clone(),
        });
        if let Some(balance) = self.settle_pending(player, &mut session)? {
            response.balance = Some(balance);
        }
        Ok(response)
    }

    pub fn cashout(&self, player: &PlayerId) -> Result<CashoutResponse> {
        let session = self.session(player)?;
        let mut session = session.lock().map_err(|_| HostError::Poisoned)?;
        self.settle_pending(player, &mut session)?;

        let settlement = match session.round.cashout() {
            CashoutOutcome::Paid(settlement) => settlement,
            CashoutOutcome::Rejected(reason) => {
                return match &session.last_move {
                    Some(LastMove::Cashout(response)) => {
                        log::debug!("{player} replayed cashout");
                        Ok(response.clone())
                    }
                    _ => Err(HostError::Rejected(reason)),
                };
            }
        };

        let payout = self.config.payout.apply(settlement.payout);
        log::info!(
            "{player} cashed out at {:.4}x, paid {payout}",
            settlement.multiplier
        );

        // balance is filled in once the payout is credited
        let mut response = CashoutResponse::new(&session.round, settlement, payout, 0);
        response.server_seed = session.seeds.as_ref().map(|s| s.server_seed().to_owned());
        session.pending = Some(Pending {
            payout: Some(payout),
            credited: false,
        });
        session.last_move = Some(LastMove::Cashout(response.clone()));

        if let Some(balance) = self.settle_pending(player, &mut session)? {
            response.balance = balance;
        }
        Ok(response)
    }

    /// Balance plus the public view of the active round, if any.
    pub fn me(&self, player: &PlayerId) -> Result<MeResponse> {
        let active_game = match self.session(player) {
            Ok(session) => {
                let session = session.lock().map_err(|_| HostError::Poisoned)?;
                (!session.round.is_finished()).then(|| ActiveGame::from(&session.round))
            }
            Err(HostError::NoActiveRound) => None,
            Err(err) => return Err(err),
        };
        Ok(MeResponse {
            balance: self.wallet.balance(player)?,
            active_game,
        })
    }

    pub fn stats(&self) -> Result<GameStats> {
        Ok(self
            .history
            .lock()
            .map_err(|_| HostError::Poisoned)?
            .stats())
    }

    /// Finished rounds, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RoundSummary>> {
        Ok(self
            .history
            .lock()
            .map_err(|_| HostError::Poisoned)?
            .recent(limit))
    }

    /// Single entry point for a transport layer: failures become [`Response::Error`].
    pub fn handle(&self, player: &PlayerId, request: Request) -> Response {
        let result = match request {
            Request::Start(request) => self.start(player, request).map(Response::Started),
            Request::Reveal(request) => self.reveal(player, request).map(Response::Revealed),
            Request::Cashout => self.cashout(player).map(Response::CashedOut),
            Request::Deposit(request) => self
                .deposit(player, request.amount)
                .map(Response::Balance),
            Request::Me => self.me(player).map(Response::Me),
        };
        result.unwrap_or_else(|err| {
            log::debug!("{player} request failed: {err}");
            Response::Error(ErrorResponse::new(err))
        })
    }

    /// Same as [`Table::handle`] with JSON on both ends.
    pub fn handle_json(&self, player: &PlayerId, input: &str) -> String {
        let response = match Request::from_json(input) {
            Ok(request) => self.handle(player, request),
            Err(err) => Response::Error(ErrorResponse::new(format!("malformed request: {err}"))),
        };
        response.to_json().unwrap_or_else(|err| {
            log::error!("Could not encode response: {err}");
            r#"{"type":"error","error":"internal error"}"#.to_owned()
        })
    }

    fn session(&self, player: &PlayerId) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .lock()
            .map_err(|_| HostError::Poisoned)?
            .get(player)
            .cloned()
            .ok_or(HostError::NoActiveRound)
    }

    /// Credits and archives a finished round, returning the balance when it credited just now.
    ///
    /// Progress is kept in the session, so a call that fails halfway can simply be repeated.
    fn settle_pending(&self, player: &PlayerId, session: &mut Session) -> Result<Option<u64>> {
        let Some(mut pending) = session.pending else {
            return Ok(None);
        };

        let mut credited = None;
        if let (Some(payout), false) = (pending.payout, pending.credited) {
            let balance = self.wallet.credit(player, payout)?;
            if let Some(last_move) = &mut session.last_move {
                last_move.set_balance(balance);
            }
            credited = Some(balance);
            pending.credited = true;
            session.pending = Some(pending);
        }

        let summary = RoundSummary::new(
            player.clone(),
            &session.round,
            pending.payout.unwrap_or(0),
            session.seeds.clone(),
        );
        self.history
            .lock()
            .map_err(|_| HostError::Poisoned)?
            .record_finish(summary);
        session.pending = None;
        Ok(credited)
    }

    fn record_start(&self, bet_amount: u64) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| HostError::Poisoned)?
            .record_start(bet_amount);
        Ok(())
    }

    fn check_bet(&self, bet_amount: u64) -> Result<()> {
        if (self.config.min_bet..=self.config.max_bet).contains(&bet_amount) {
            Ok(())
        } else {
            Err(HostError::BetOutOfRange {
                min: self.config.min_bet,
                max: self.config.max_bet,
            })
        }
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::Relaxed)
    }
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0; N];
    getrandom::fill(&mut bytes).map_err(|err| HostError::Entropy(err.to_string()))?;
    Ok(bytes)
}

fn random_hex(len: usize) -> Result<String> {
    let bytes = random_bytes::<32>()?;
    Ok(hex::encode(&bytes[..len.min(32)]))
}

fn random_u64() -> Result<u64> {
    Ok(u64::from_be_bytes(random_bytes::<8>()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_table(player: &PlayerId, funds: u64) -> Table {
        let table = Table::new(HouseConfig {
            fairness: Fairness::Seeded,
            ..HouseConfig::default()
        });
        table.deposit(player, funds).unwrap();
        table
    }

    fn board(bombs: &[Cell]) -> Board {
        Board::from_bomb_cells(25, bombs).unwrap()
    }

    fn reveal(
        table: &Table,
        player: &PlayerId,
        cell: Cell,
        sequence: Option<u32>,
    ) -> Result<RevealResponse> {
        table.reveal(
            player,
            RevealRequest {
                tile_number: cell,
                sequence,
            },
        )
    }

    /// Leaves the history mutex poisoned, as a panicking writer would.
    fn poison_history(table: &Table) {
        std::thread::scope(|scope| {
            let crashed = scope
                .spawn(|| {
                    let _guard = table.history.lock().unwrap();
                    panic!("history writer crashed");
                })
                .join();
            assert!(crashed.is_err());
        });
        assert!(table.history.is_poisoned());
    }

    #[test]
    fn cashout_retry_after_history_failure_pays_once() {
        let alice = PlayerId::from("alice");
        let table = seeded_table(&alice, 100);
        table.start_with_board(&alice, 100, board(&[25]), None).unwrap();
        for cell in 1..=20 {
            reveal(&table, &alice, cell, None).unwrap();
        }
        poison_history(&table);

        assert_eq!(table.cashout(&alice), Err(HostError::Poisoned));
        assert_eq!(table.balance(&alice).unwrap(), 500);

        table.history.clear_poison();
        let retried = table.cashout(&alice).unwrap();
        assert_eq!(retried.payout, 500);
        assert_eq!(retried.balance, 500);
        assert_eq!(table.cashout(&alice).unwrap(), retried);
        assert_eq!(table.balance(&alice).unwrap(), 500);

        let stats = table.stats().unwrap();
        assert_eq!(stats.total_games, 1);
        assert_eq!(stats.total_paid_out, 500);
        assert_eq!(table.recent(10).unwrap().len(), 1);
    }

    #[test]
    fn cleared_reveal_replays_after_history_failure() {
        let bob = PlayerId::from("bob");
        let table = seeded_table(&bob, 10);
        let bombs: Vec<Cell> = (2..=25).collect();
        table.start_with_board(&bob, 10, board(&bombs), None).unwrap();
        poison_history(&table);

        assert_eq!(reveal(&table, &bob, 1, Some(0)), Err(HostError::Poisoned));
        assert_eq!(table.balance(&bob).unwrap(), 250);

        table.history.clear_poison();
        let replayed = reveal(&table, &bob, 1, Some(0)).unwrap();
        assert_eq!(replayed.status, RevealStatus::Cleared);
        assert_eq!(replayed.payout, Some(250));
        assert_eq!(replayed.balance, Some(250));
        assert_eq!(table.balance(&bob).unwrap(), 250);
        assert_eq!(table.stats().unwrap().total_paid_out, 250);
    }

    #[test]
    fn lost_round_is_archived_before_the_next_start() {
        let carol = PlayerId::from("carol");
        let table = seeded_table(&carol, 100);
        table.start_with_board(&carol, 50, board(&[1]), None).unwrap();
        poison_history(&table);

        assert_eq!(reveal(&table, &carol, 1, None), Err(HostError::Poisoned));

        table.history.clear_poison();
        table.start_with_board(&carol, 50, board(&[1]), None).unwrap();
        let stats = table.stats().unwrap();
        assert_eq!(stats.total_games, 2);
        assert_eq!(table.recent(10).unwrap().len(), 1);
        assert_eq!(table.balance(&carol).unwrap(), 0);
    }

    #[test]
    fn failed_start_refunds_the_bet() {
        let dave = PlayerId::from("dave");
        let table = seeded_table(&dave, 100);
        poison_history(&table);

        assert_eq!(
            table.start_with_board(&dave, 40, board(&[1]), None),
            Err(HostError::Poisoned)
        );
        assert_eq!(table.balance(&dave).unwrap(), 100);

        table.history.clear_poison();
        assert_eq!(
            table.start_with_board(&dave, 40, board(&[1]), None).unwrap().balance,
            60
        );
    }

    #[test]
    fn start_reports_board_creation_time() {
        let erin = PlayerId::from("erin");
        let table = seeded_table(&erin, 100);
        let board = board(&[1]);
        let created_at = board.created_at();

        let started = table.start_with_board(&erin, 10, board, None).unwrap();

        assert_eq!(started.created_at, created_at);
    }

    #[test]
    fn random_hex_has_requested_length() {
        assert_eq!(random_hex(8).unwrap().len(), 16);
        assert_eq!(random_hex(32).unwrap().len(), 64);
        assert_ne!(random_hex(32).unwrap(), random_hex(32).unwrap());
    }
}
