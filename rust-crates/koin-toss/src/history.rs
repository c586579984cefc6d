use anyhow::Result;
use fuels::types::Address;
use std::collections::{
    HashMap,
    VecDeque,
};
use tracing::{
    debug,
    trace,
};

use crate::{
    chain::{
        BetCommitted,
        BetRevealed,
        ChainWatcher,
        GameLog,
    },
    types::GameResult,
};

pub const GAME_HISTORY_DEPTH: usize = 10;
/// Blocks re-read behind the cursor on every poll.
pub const LOG_LOOKBACK_BLOCKS: u64 = 5;
/// How far back the first poll after start-up (or a wallet switch) reaches.
pub const BOOTSTRAP_BLOCKS: u64 = 1_000;

/// Revealed games, newest first, unique by timestamp.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameHistory {
    entries: VecDeque<GameResult>,
}

impl GameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a result with the same timestamp is already present.
    pub fn push(&mut self, result: GameResult) -> bool {
        if self.entries.iter().any(|r| r.timestamp == result.timestamp) {
            return false;
        }
        self.entries.push_front(result);
        self.entries.truncate(GAME_HISTORY_DEPTH);
        true
    }

    pub fn entries(&self) -> &VecDeque<GameResult> {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<GameResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Turns commit/reveal logs into [`GameResult`]s as blocks arrive.
#[derive(Debug, Default)]
pub struct LogWatcher {
    owner: Option<Address>,
    last_block: Option<u64>,
    pending_commits: HashMap<u64, BetCommitted>,
    all: GameHistory,
    mine: GameHistory,
}

impl LogWatcher {
    pub fn new(owner: Option<Address>) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    pub fn set_owner(&mut self, owner: Option<Address>) {
        if self.owner != owner {
            self.owner = owner;
            self.mine.clear();
            self.last_block = None;
        }
    }

    pub fn last_block(&self) -> Option<u64> {
        self.last_block
    }

    pub fn all(&self) -> &GameHistory {
        &self.all
    }

    pub fn mine(&self) -> &GameHistory {
        &self.mine
    }

    /// Block range to read for a new head at `latest`, if it is new.
    pub fn range_for(&self, latest: u64) -> Option<(u64, u64)> {
        match self.last_block {
            Some(last) if latest <= last => None,
            Some(last) if last > LOG_LOOKBACK_BLOCKS => {
                Some((last - LOG_LOOKBACK_BLOCKS, latest))
            }
            Some(last) => Some((last, latest)),
            None => Some((latest.saturating_sub(BOOTSTRAP_BLOCKS), latest)),
        }
    }

    /// Fetches and ingests the logs for a new head. Returns the games that were not known yet.
    pub async fn on_block<W: ChainWatcher>(
        &mut self,
        chain: &W,
        latest: u64,
    ) -> Result<Vec<GameResult>> {
        let Some((from, to)) = self.range_for(latest) else {
            return Ok(Vec::new());
        };
        let logs = chain.game_logs(from, to).await?;
        trace!(from, to, count = logs.len(), "fetched game logs");
        Ok(self.ingest(logs, to))
    }

    pub fn ingest(&mut self, logs: Vec<GameLog>, to: u64) -> Vec<GameResult> {
        let mut reveals = Vec::new();
        for log in logs {
            match log {
                GameLog::Committed(commit) => {
                    self.pending_commits.insert(commit.request_id, commit);
                }
                GameLog::Revealed(reveal) => reveals.push(reveal),
            }
        }

        let mut fresh = Vec::new();
        for reveal in reveals {
            let Some(commit) = self.pending_commits.remove(&reveal.request_id) else {
                trace!(request_id = reveal.request_id, "reveal without known commit");
                continue;
            };
            let result = pair(commit, reveal);
            if Some(result.address) == self.owner {
                self.mine.push(result.clone());
            }
            if self.all.push(result.clone()) {
                fresh.push(result);
            }
        }

        let horizon = to.saturating_sub(BOOTSTRAP_BLOCKS);
        self.pending_commits.retain(|_, commit| commit.block >= horizon);
        self.last_block = Some(to);
        if !fresh.is_empty() {
            debug!(count = fresh.len(), last_block = to, "new game results");
        }
        fresh
    }
}

fn pair(commit: BetCommitted, reveal: BetRevealed) -> GameResult {
    GameResult {
        id: reveal.request_id,
        address: commit.player,
        timestamp: reveal.block_timestamp,
        bet_amount: commit.bet_amount,
        selected_side: commit.selected_side,
        coin_count: commit.coin_count,
        min_heads: commit.min_heads,
        won: reveal.did_win,
        reward: reveal.payout,
        commit_tx: commit.tx_hash,
        reveal_tx: reveal.tx_hash,
    }
}
