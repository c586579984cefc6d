use anyhow::{
    Result,
    anyhow,
    bail,
};

use crate::types::BetLimits;

pub const DECIMALS: u32 = 9;
pub const ONE_ETH: u64 = 10u64.pow(DECIMALS);
/// Smallest step the bet input accepts (0.01).
pub const CENT: u64 = ONE_ETH / 100;

const INPUT_DECIMALS: usize = 2;

pub fn format_eth(amount: u64) -> String {
    let whole = amount / ONE_ETH;
    let fractional = amount % ONE_ETH;
    if fractional == 0 {
        format!("{}", whole)
    } else {
        format!(
            "{}.{}",
            whole,
            format!("{:09}", fractional).trim_end_matches('0')
        )
    }
}

/// Parses user input such as `0.25` or `3`. Digits past the second decimal are dropped.
pub fn parse_amount(text: &str) -> Result<u64> {
    let text = text.trim();
    if text.is_empty() {
        bail!("amount is empty");
    }
    let (whole, fractional) = text.split_once('.').unwrap_or((text, ""));
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fractional.chars().all(|c| c.is_ascii_digit())
        || (whole.is_empty() && fractional.is_empty())
    {
        bail!("invalid amount {text:?}");
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse()?
    };
    let cents: u64 = fractional
        .chars()
        .chain(std::iter::repeat('0'))
        .take(INPUT_DECIMALS)
        .collect::<String>()
        .parse()?;

    whole
        .checked_mul(ONE_ETH)
        .and_then(|base| base.checked_add(cents * CENT))
        .ok_or_else(|| anyhow!("amount {text:?} is too large"))
}

pub fn floor_cents(amount: u64) -> u64 {
    amount - amount % CENT
}

/// Bet amount the form should hold for `requested`, or `None` when the balance
/// cannot cover the minimum bet and betting is disabled.
pub fn clamp_bet(requested: u64, limits: BetLimits, balance: u64) -> Option<u64> {
    let min = floor_cents(limits.min);
    let max = floor_cents(limits.max);
    if balance < min {
        return None;
    }

    let mut amount = requested;
    if amount == 0 || amount < min {
        amount = min;
    }
    if balance < amount {
        amount = floor_cents(balance);
    }
    if max < requested {
        amount = max;
    }
    Some(amount)
}

pub fn halve(amount: u64) -> u64 {
    floor_cents(amount / 2)
}

pub fn double(amount: u64, max: u64) -> u64 {
    amount.saturating_mul(2).min(max)
}

/// Win chance in percent, floored to two decimals.
pub fn win_probability_percent(win_chance_ppm: u32) -> f64 {
    f64::from(win_chance_ppm / 100) / 100.0
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    const LIMITS: BetLimits = BetLimits {
        min: 10 * CENT,
        max: 5 * ONE_ETH,
    };

    #[test]
    fn format_eth__trims_trailing_zeros() {
        assert_eq!(format_eth(0), "0");
        assert_eq!(format_eth(2 * ONE_ETH), "2");
        assert_eq!(format_eth(ONE_ETH + 25 * CENT), "1.25");
        assert_eq!(format_eth(1), "0.000000001");
    }

    #[test]
    fn parse_amount__accepts_up_to_two_decimals() {
        assert_eq!(parse_amount("3").unwrap(), 3 * ONE_ETH);
        assert_eq!(parse_amount("0.5").unwrap(), 50 * CENT);
        assert_eq!(parse_amount(".25").unwrap(), 25 * CENT);
        assert_eq!(parse_amount("1.239").unwrap(), ONE_ETH + 23 * CENT);
    }

    #[test]
    fn parse_amount__rejects_garbage() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount(".").is_err());
        assert!(parse_amount("1.2.3").is_err());
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("99999999999999999999").is_err());
    }

    #[test]
    fn clamp_bet__disabled_when_balance_below_min() {
        assert_eq!(clamp_bet(ONE_ETH, LIMITS, 5 * CENT), None);
    }

    #[test]
    fn clamp_bet__raises_zero_and_small_bets_to_min() {
        assert_eq!(clamp_bet(0, LIMITS, ONE_ETH), Some(10 * CENT));
        assert_eq!(clamp_bet(CENT, LIMITS, ONE_ETH), Some(10 * CENT));
    }

    #[test]
    fn clamp_bet__caps_at_floored_balance() {
        // given
        let balance = ONE_ETH + 37 * CENT + 123;

        // when
        let clamped = clamp_bet(2 * ONE_ETH, LIMITS, balance);

        // then
        assert_eq!(clamped, Some(ONE_ETH + 37 * CENT));
    }

    #[test]
    fn clamp_bet__caps_at_max() {
        assert_eq!(clamp_bet(7 * ONE_ETH, LIMITS, 10 * ONE_ETH), Some(5 * ONE_ETH));
        assert_eq!(clamp_bet(2 * ONE_ETH, LIMITS, 10 * ONE_ETH), Some(2 * ONE_ETH));
    }

    #[test]
    fn halve_and_double__respect_cent_steps_and_max() {
        assert_eq!(halve(25 * CENT), 12 * CENT);
        assert_eq!(double(3 * ONE_ETH, 5 * ONE_ETH), 5 * ONE_ETH);
        assert_eq!(double(ONE_ETH, 5 * ONE_ETH), 2 * ONE_ETH);
    }

    #[test]
    fn win_probability_percent__floors_to_two_decimals() {
        assert_eq!(win_probability_percent(500_000), 50.0);
        assert_eq!(win_probability_percent(312_599), 31.25);
    }
}
