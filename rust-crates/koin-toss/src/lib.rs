use chrono::{
    DateTime,
    Utc,
};

pub mod amount;
pub mod autoflip;
pub mod bet;
pub mod chain;
pub mod coins;
pub mod config;
pub mod encoding;
pub mod flip;
pub mod game;
pub mod gateway;
pub mod history;
pub mod keys;
pub mod options;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use game::{
    Game,
    GameSettings,
    Selection,
};
pub use types::{
    BetLimits,
    GameConfig,
    GameOption,
    GameResult,
    PrizePool,
    SessionStatus,
    Side,
    TxHash,
};

const BUILD_TIME: &str = env!("KOIN_TOSS_BUILD_TIME");

/// Timestamp of the build this binary came from.
pub fn build_marker() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(BUILD_TIME)
        .map(|marker| marker.with_timezone(&Utc))
        .unwrap_or_default()
}
