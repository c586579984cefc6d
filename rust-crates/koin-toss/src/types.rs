use anyhow::anyhow;
use chrono::{
    DateTime,
    Utc,
};
use fuels::types::{
    Address,
    Bytes32,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// Hash of a submitted transaction.
pub type TxHash = Bytes32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Heads,
    Tails,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Heads => Side::Tails,
            Side::Tails => Side::Heads,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Heads => "HEADS",
            Side::Tails => "TAILS",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a session in the on-chain session registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    NotInitialized,
    Active,
    /// Revoked by the wallet owner.
    Closed,
    Expired,
}

impl TryFrom<u8> for SessionStatus {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SessionStatus::NotInitialized),
            1 => Ok(SessionStatus::Active),
            2 => Ok(SessionStatus::Closed),
            3 => Ok(SessionStatus::Expired),
            other => Err(anyhow!("unknown session status code {other}")),
        }
    }
}

impl From<SessionStatus> for u8 {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::NotInitialized => 0,
            SessionStatus::Active => 1,
            SessionStatus::Closed => 2,
            SessionStatus::Expired => 3,
        }
    }
}

/// A playable (coin count, minimum heads) configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOption {
    pub game_number: u32,
    pub coin_count: u8,
    pub min_heads: u8,
    pub prize_token_symbol: String,
}

/// Game configuration as stored by the contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameConfig {
    pub game_number: u32,
    pub coin_count: u8,
    pub min_heads: u8,
    /// Win chance in parts per million.
    pub win_chance_ppm: u32,
    pub active: bool,
    pub prize_pool_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrizePool {
    pub pool_id: u32,
    pub token_symbol: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BetLimits {
    pub min: u64,
    pub max: u64,
}

/// A revealed game, built from a commit log and its matching reveal log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameResult {
    pub id: u64,
    pub address: Address,
    pub timestamp: DateTime<Utc>,
    pub bet_amount: u64,
    pub selected_side: Side,
    pub coin_count: u8,
    pub min_heads: u8,
    pub won: bool,
    pub reward: u64,
    pub commit_tx: TxHash,
    pub reveal_tx: TxHash,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn session_status__decodes_known_codes_and_rejects_others() {
        for code in 0u8..=3 {
            let status = SessionStatus::try_from(code).unwrap();
            assert_eq!(u8::from(status), code);
        }
        assert!(SessionStatus::try_from(4).is_err());
    }

    #[test]
    fn side__serializes_as_uppercase_label() {
        let json = serde_json::to_string(&Side::Tails).unwrap();
        assert_eq!(json, "\"TAILS\"");
        assert_eq!(Side::Tails.opposite(), Side::Heads);
    }
}
