//! Matching a submitted wager against revealed game results.
use crate::types::{
    GameResult,
    Side,
    TxHash,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub won: bool,
    pub reward: u64,
    /// Face of every coin, in contract order.
    pub coins: Vec<Side>,
    /// How many coins landed on the selected side.
    pub matching: u8,
    pub result: GameResult,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    Pending,
    Resolved(Outcome),
}

impl Reconciliation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Reconciliation::Pending)
    }
}

/// Looks up the result whose commit transaction is `tx_hash`.
pub fn reconcile(history: &[GameResult], tx_hash: &TxHash, selected: Side) -> Reconciliation {
    let Some(result) = history.iter().find(|r| r.commit_tx == *tx_hash) else {
        return Reconciliation::Pending;
    };

    let coins = coin_faces(result.won, selected, result.coin_count, result.min_heads);
    let matching = coins.iter().filter(|face| **face == selected).count() as u8;
    Reconciliation::Resolved(Outcome {
        won: result.won,
        reward: result.reward,
        coins,
        matching,
        result: result.clone(),
    })
}

/// The first `min_heads` coins show `selected` on a win, one fewer on a loss;
/// the remaining coins show the other side.
pub fn coin_faces(won: bool, selected: Side, coin_count: u8, min_heads: u8) -> Vec<Side> {
    let matching = if won {
        min_heads
    } else {
        min_heads.saturating_sub(1)
    }
    .min(coin_count);
    (0..coin_count)
        .map(|i| {
            if i < matching {
                selected
            } else {
                selected.opposite()
            }
        })
        .collect()
}
