//! In-memory chain used by unit and integration tests.
use anyhow::{
    Result,
    anyhow,
};
use chrono::{
    DateTime,
    TimeDelta,
    Utc,
};
use fuels::types::{
    Address,
    Bytes32,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

use crate::{
    amount::{
        CENT,
        ONE_ETH,
    },
    bet::SubmitError,
    chain::{
        BetCommitted,
        BetRevealed,
        ChainWatcher,
        GameContract,
        GameLog,
        SessionGrant,
        SessionRegistry,
        SignedWager,
        WagerRelay,
    },
    session::SessionDescriptor,
    types::{
        BetLimits,
        GameConfig,
        GameResult,
        PrizePool,
        SessionStatus,
        Side,
        TxHash,
    },
};

const BASE_TIMESTAMP: i64 = 1_714_564_800;

pub fn address(n: u8) -> Address {
    Address::new([n; 32])
}

pub fn tx_hash(n: u8) -> TxHash {
    Bytes32::new([n; 32])
}

fn timestamp(offset: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_TIMESTAMP, 0).unwrap_or_default()
        + TimeDelta::seconds(offset as i64)
}

/// A revealed single-coin HEADS game by `address(1)`; the timestamp is unique per id.
pub fn game_result(id: u64, commit_tx: TxHash, won: bool) -> GameResult {
    let bet_amount = ONE_ETH / 10;
    GameResult {
        id,
        address: address(1),
        timestamp: timestamp(id),
        bet_amount,
        selected_side: Side::Heads,
        coin_count: 1,
        min_heads: 1,
        won,
        reward: if won { bet_amount * 2 } else { 0 },
        commit_tx,
        reveal_tx: Bytes32::new([0xee; 32]),
    }
}

pub fn commit_log(request_id: u64, player: Address, block: u64, tx: TxHash) -> GameLog {
    GameLog::Committed(BetCommitted {
        request_id,
        player,
        bet_amount: ONE_ETH / 10,
        selected_side: Side::Heads,
        coin_count: 1,
        min_heads: 1,
        block,
        tx_hash: tx,
    })
}

pub fn reveal_log(request_id: u64, did_win: bool, payout: u64, tx: TxHash) -> GameLog {
    GameLog::Revealed(BetRevealed {
        request_id,
        did_win,
        payout,
        block_timestamp: timestamp(request_id),
        tx_hash: tx,
    })
}

#[derive(Default)]
struct ChainState {
    games: Vec<GameConfig>,
    pools: HashMap<u32, PrizePool>,
    limits: HashMap<u32, BetLimits>,
    game_count_fails: bool,
    reported_game_count: Option<u32>,
    bet_limits_fail: bool,
    game_config_fails_from: Option<u32>,
    game_config_reads: usize,
    prize_pool_reads: usize,
    session_statuses: HashMap<Bytes32, SessionStatus>,
    status_reads_fail: bool,
    sessions_created: usize,
    wagers: Vec<(TxHash, SignedWager)>,
    next_wager_error: Option<SubmitError>,
    next_request_id: u64,
    block_height: u64,
    logs: Vec<(u64, GameLog)>,
    balances: HashMap<Address, u64>,
}

/// Game contract, session registry, relay and chain in one shared in-memory state.
#[derive(Clone, Default)]
pub struct FakeChain {
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_game(&self, config: GameConfig) {
        self.state.lock().unwrap().games.push(config);
    }

    pub fn add_prize_pool(&self, pool_id: u32, symbol: &str) {
        self.state.lock().unwrap().pools.insert(
            pool_id,
            PrizePool {
                pool_id,
                token_symbol: symbol.to_string(),
            },
        );
    }

    pub fn set_bet_limits(&self, game_number: u32, limits: BetLimits) {
        self.state
            .lock()
            .unwrap()
            .limits
            .insert(game_number, limits);
    }

    pub fn fail_bet_limits(&self, fail: bool) {
        self.state.lock().unwrap().bet_limits_fail = fail;
    }

    pub fn fail_game_count(&self, fail: bool) {
        self.state.lock().unwrap().game_count_fails = fail;
    }

    /// Makes `game_count` report `count` regardless of the games added.
    pub fn report_game_count(&self, count: u32) {
        self.state.lock().unwrap().reported_game_count = Some(count);
    }

    pub fn fail_game_config_from(&self, game_number: u32) {
        self.state.lock().unwrap().game_config_fails_from = Some(game_number);
    }

    pub fn game_config_reads(&self) -> usize {
        self.state.lock().unwrap().game_config_reads
    }

    pub fn prize_pool_reads(&self) -> usize {
        self.state.lock().unwrap().prize_pool_reads
    }

    pub fn set_session_status(&self, session_hash: Bytes32, status: SessionStatus) {
        self.state
            .lock()
            .unwrap()
            .session_statuses
            .insert(session_hash, status);
    }

    pub fn fail_status_reads(&self, fail: bool) {
        self.state.lock().unwrap().status_reads_fail = fail;
    }

    pub fn sessions_created(&self) -> usize {
        self.state.lock().unwrap().sessions_created
    }

    pub fn fail_next_wager(&self, error: SubmitError) {
        self.state.lock().unwrap().next_wager_error = Some(error);
    }

    pub fn submitted_wagers(&self) -> Vec<SignedWager> {
        self.state
            .lock()
            .unwrap()
            .wagers
            .iter()
            .map(|(_, wager)| wager.clone())
            .collect()
    }

    pub fn set_balance(&self, owner: Address, balance: u64) {
        self.state.lock().unwrap().balances.insert(owner, balance);
    }

    pub fn advance_blocks(&self, count: u64) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.block_height += count;
        state.block_height
    }

    /// Adds a log at the current block (commits keep their own block).
    pub fn push_log(&self, log: GameLog) {
        let mut state = self.state.lock().unwrap();
        let block = match &log {
            GameLog::Committed(commit) => commit.block,
            GameLog::Revealed(_) => state.block_height,
        };
        state.logs.push((block, log));
    }

    /// Emits the commit and reveal logs for a submitted wager and credits a win.
    pub fn reveal_wager(&self, tx: TxHash, did_win: bool, payout: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let wager = state
            .wagers
            .iter()
            .find(|(hash, _)| *hash == tx)
            .map(|(_, wager)| wager.clone())
            .ok_or_else(|| anyhow!("unknown wager"))?;
        let game = state
            .games
            .iter()
            .find(|g| g.game_number == wager.game_number)
            .cloned()
            .ok_or_else(|| anyhow!("unknown game"))?;

        state.next_request_id += 1;
        let request_id = state.next_request_id;
        state.block_height += 1;
        let block = state.block_height;
        let commit = GameLog::Committed(BetCommitted {
            request_id,
            player: wager.owner,
            bet_amount: wager.amount,
            selected_side: Side::Heads,
            coin_count: game.coin_count,
            min_heads: game.min_heads,
            block,
            tx_hash: tx,
        });
        let reveal = GameLog::Revealed(BetRevealed {
            request_id,
            did_win,
            payout,
            block_timestamp: timestamp(request_id),
            tx_hash: Bytes32::new([0xaa; 32]),
        });
        state.logs.push((block, commit));
        state.logs.push((block, reveal));
        if did_win {
            *state.balances.entry(wager.owner).or_default() += payout;
        }
        Ok(())
    }
}

impl GameContract for FakeChain {
    async fn game_count(&self) -> Result<u32> {
        let state = self.state.lock().unwrap();
        if state.game_count_fails {
            return Err(anyhow!("game count unavailable"));
        }
        Ok(state
            .reported_game_count
            .unwrap_or(state.games.len() as u32))
    }

    async fn game_config(&self, game_number: u32) -> Result<GameConfig> {
        let mut state = self.state.lock().unwrap();
        state.game_config_reads += 1;
        if state
            .game_config_fails_from
            .is_some_and(|from| game_number >= from)
        {
            return Err(anyhow!("game {game_number} unavailable"));
        }
        state
            .games
            .iter()
            .find(|g| g.game_number == game_number)
            .cloned()
            .ok_or_else(|| anyhow!("no game {game_number}"))
    }

    async fn prize_pool(&self, pool_id: u32) -> Result<PrizePool> {
        let mut state = self.state.lock().unwrap();
        state.prize_pool_reads += 1;
        state
            .pools
            .get(&pool_id)
            .cloned()
            .ok_or_else(|| anyhow!("no prize pool {pool_id}"))
    }

    async fn bet_limits(&self, game_number: u32) -> Result<BetLimits> {
        let state = self.state.lock().unwrap();
        if state.bet_limits_fail {
            return Err(anyhow!("limits for game {game_number} unavailable"));
        }
        Ok(state
            .limits
            .get(&game_number)
            .copied()
            .unwrap_or(BetLimits {
                min: CENT,
                max: ONE_ETH,
            }))
    }

    async fn payout_estimate(&self, game_number: u32, amount: u64) -> Result<u64> {
        let state = self.state.lock().unwrap();
        let game = state
            .games
            .iter()
            .find(|g| g.game_number == game_number)
            .ok_or_else(|| anyhow!("no game {game_number}"))?;
        if game.win_chance_ppm == 0 {
            return Ok(0);
        }
        Ok(amount * 1_000_000 / u64::from(game.win_chance_ppm))
    }
}

impl SessionRegistry for FakeChain {
    async fn session_status(
        &self,
        _owner: &Address,
        session_hash: &Bytes32,
    ) -> Result<SessionStatus> {
        let state = self.state.lock().unwrap();
        if state.status_reads_fail {
            return Err(anyhow!("registry unavailable"));
        }
        Ok(state
            .session_statuses
            .get(session_hash)
            .copied()
            .unwrap_or(SessionStatus::NotInitialized))
    }

    async fn create_session(&self, grant: &SessionGrant) -> Result<SessionDescriptor> {
        let mut state = self.state.lock().unwrap();
        state.sessions_created += 1;
        state
            .session_statuses
            .insert(grant.session_hash, SessionStatus::Active);
        Ok(grant.session.clone())
    }
}

impl WagerRelay for FakeChain {
    async fn submit_wager(&self, wager: &SignedWager) -> Result<TxHash, SubmitError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.next_wager_error.take() {
            return Err(error);
        }
        let mut bytes = [0x7au8; 32];
        bytes[24..].copy_from_slice(&(state.wagers.len() as u64).to_be_bytes());
        let tx = Bytes32::new(bytes);
        let balance = state.balances.entry(wager.owner).or_default();
        *balance = balance.saturating_sub(wager.amount);
        state.wagers.push((tx, wager.clone()));
        Ok(tx)
    }
}

impl ChainWatcher for FakeChain {
    async fn latest_block(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().block_height)
    }

    async fn game_logs(&self, from: u64, to: u64) -> Result<Vec<GameLog>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|(block, _)| (from..=to).contains(block))
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn balance(&self, owner: &Address) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(owner)
            .copied()
            .unwrap_or_default())
    }
}
