//! Boundaries to the game contract, the session registry and the chain itself.
use anyhow::Result;
use chrono::{
    DateTime,
    Utc,
};
use fuels::types::{
    Address,
    Bytes32,
    ContractId,
};
use serde::Serialize;

use crate::{
    bet::SubmitError,
    encoding::hex32,
    session::credential::{
        FunctionSelector,
        SessionDescriptor,
    },
    types::{
        BetLimits,
        GameConfig,
        PrizePool,
        SessionStatus,
        Side,
        TxHash,
    },
};

/// Read side of the game contract.
pub trait GameContract {
    fn game_count(&self) -> impl Future<Output = Result<u32>>;

    fn game_config(&self, game_number: u32) -> impl Future<Output = Result<GameConfig>>;

    fn prize_pool(&self, pool_id: u32) -> impl Future<Output = Result<PrizePool>>;

    fn bet_limits(&self, game_number: u32) -> impl Future<Output = Result<BetLimits>>;

    /// Payout for a winning bet of `amount` on `game_number`.
    fn payout_estimate(
        &self,
        game_number: u32,
        amount: u64,
    ) -> impl Future<Output = Result<u64>>;
}

/// Session registry plus the wallet-side issuer that registers new sessions.
pub trait SessionRegistry {
    fn session_status(
        &self,
        owner: &Address,
        session_hash: &Bytes32,
    ) -> impl Future<Output = Result<SessionStatus>>;

    fn create_session(
        &self,
        grant: &SessionGrant,
    ) -> impl Future<Output = Result<SessionDescriptor>>;
}

/// Sponsored write path: the paymaster pays the fee of the wager transaction.
pub trait WagerRelay {
    fn submit_wager(
        &self,
        wager: &SignedWager,
    ) -> impl Future<Output = Result<TxHash, SubmitError>>;
}

pub trait ChainWatcher {
    fn latest_block(&self) -> impl Future<Output = Result<u64>>;

    /// Game contract logs emitted in the inclusive block range.
    fn game_logs(&self, from: u64, to: u64) -> impl Future<Output = Result<Vec<GameLog>>>;

    fn balance(&self, owner: &Address) -> impl Future<Output = Result<u64>>;
}

/// A session descriptor signed by the wallet owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionGrant {
    #[serde(with = "hex32")]
    pub owner: Address,
    pub session: SessionDescriptor,
    #[serde(with = "hex32")]
    pub session_hash: Bytes32,
    pub owner_signature: String,
}

/// A wager call signed by a session key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedWager {
    #[serde(with = "hex32")]
    pub owner: Address,
    #[serde(with = "hex32")]
    pub session_signer: Address,
    #[serde(with = "hex32")]
    pub session_hash: Bytes32,
    #[serde(with = "hex32")]
    pub contract: ContractId,
    pub selector: FunctionSelector,
    pub game_number: u32,
    pub amount: u64,
    #[serde(with = "hex32")]
    pub paymaster: ContractId,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameLog {
    Committed(BetCommitted),
    Revealed(BetRevealed),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetCommitted {
    pub request_id: u64,
    pub player: Address,
    pub bet_amount: u64,
    pub selected_side: Side,
    pub coin_count: u8,
    pub min_heads: u8,
    pub block: u64,
    pub tx_hash: TxHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetRevealed {
    pub request_id: u64,
    pub did_win: bool,
    pub payout: u64,
    pub block_timestamp: DateTime<Utc>,
    pub tx_hash: TxHash,
}
