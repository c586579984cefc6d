//! What each coin on screen shows, independent of how it is drawn.
use std::time::Duration;

use crate::{
    amount::format_eth,
    reconcile::Outcome,
    types::Side,
};

pub const FLIP_TICK: Duration = Duration::from_millis(50);
const DEGREES_PER_TICK: u128 = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoinView {
    pub face: Side,
    /// Drawn in full colour; dimmed otherwise.
    pub highlighted: bool,
}

/// Coins before a flip: the first `min_heads` show the selected side as the target.
pub fn preview(selected: Option<Side>, coin_count: u8, min_heads: u8) -> Vec<CoinView> {
    let side = selected.unwrap_or(Side::Heads);
    (0..coin_count)
        .map(|i| {
            let target = i < min_heads;
            CoinView {
                face: if target { side } else { side.opposite() },
                highlighted: target,
            }
        })
        .collect()
}

/// Coins after a flip, coins on the selected side first.
pub fn landed(outcome: &Outcome, selected: Side) -> Vec<CoinView> {
    let mut faces = outcome.coins.clone();
    faces.sort_by_key(|face| *face != selected);
    faces
        .into_iter()
        .map(|face| CoinView {
            face,
            highlighted: face == selected,
        })
        .collect()
}

/// Face visible `elapsed` into the spin animation.
pub fn spinning_face(elapsed: Duration) -> Side {
    let ticks = elapsed.as_millis() / FLIP_TICK.as_millis();
    if (ticks * DEGREES_PER_TICK) % 360 < 180 {
        Side::Heads
    } else {
        Side::Tails
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Banner {
    Win { payout: u64 },
    Lose,
}

impl Banner {
    pub fn for_outcome(outcome: &Outcome) -> Self {
        if outcome.won {
            Banner::Win {
                payout: outcome.reward,
            }
        } else {
            Banner::Lose
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Banner::Win { .. } => "You Win!!",
            Banner::Lose => "You Lose",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            Banner::Win { payout } => Some(format!("+ {} ETH", format_eth(*payout))),
            Banner::Lose => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        amount::ONE_ETH,
        reconcile::{
            Reconciliation,
            reconcile,
        },
        test_helpers::{
            game_result,
            tx_hash,
        },
    };

    fn outcome(won: bool, coin_count: u8, min_heads: u8, side: Side) -> Outcome {
        let mut result = game_result(1, tx_hash(1), won);
        result.coin_count = coin_count;
        result.min_heads = min_heads;
        result.reward = if won { 2 * ONE_ETH } else { 0 };
        match reconcile(&[result], &tx_hash(1), side) {
            Reconciliation::Resolved(outcome) => outcome,
            Reconciliation::Pending => panic!("result is in history"),
        }
    }

    #[test]
    fn preview__highlights_the_min_heads_target() {
        let coins = preview(Some(Side::Tails), 4, 3);
        let highlighted: Vec<_> = coins.iter().map(|c| c.highlighted).collect();
        assert_eq!(highlighted, vec![true, true, true, false]);
        assert!(coins[..3].iter().all(|c| c.face == Side::Tails));
        assert_eq!(coins[3].face, Side::Heads);
    }

    #[test]
    fn landed__puts_matching_coins_first() {
        // given
        let mut outcome = outcome(true, 4, 2, Side::Heads);
        outcome.coins = vec![Side::Tails, Side::Heads, Side::Tails, Side::Heads];

        // when
        let coins = landed(&outcome, Side::Heads);

        // then
        let faces: Vec<_> = coins.iter().map(|c| c.face).collect();
        assert_eq!(faces, vec![Side::Heads, Side::Heads, Side::Tails, Side::Tails]);
        assert!(coins[0].highlighted && !coins[3].highlighted);
    }

    #[test]
    fn spinning_face__turns_over_every_half_rotation() {
        assert_eq!(spinning_face(Duration::ZERO), Side::Heads);
        assert_eq!(spinning_face(Duration::from_millis(350)), Side::Heads);
        assert_eq!(spinning_face(Duration::from_millis(400)), Side::Tails);
        assert_eq!(spinning_face(Duration::from_millis(750)), Side::Heads);
    }

    #[test]
    fn banner__reports_payout_on_win() {
        let win = Banner::for_outcome(&outcome(true, 1, 1, Side::Heads));
        assert_eq!(win.headline(), "You Win!!");
        assert_eq!(win.detail().as_deref(), Some("+ 2 ETH"));
        assert_eq!(Banner::for_outcome(&outcome(false, 1, 1, Side::Heads)), Banner::Lose);
    }
}
