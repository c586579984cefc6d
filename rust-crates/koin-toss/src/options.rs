//! Playable game configurations, read from the contract once per build and cached locally.
use anyhow::{
    Context,
    Result,
};
use chrono::{
    DateTime,
    Utc,
};
use std::collections::HashMap;
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    chain::GameContract,
    storage::KeyValueStore,
    types::{
        GameOption,
        PrizePool,
    },
};

pub const OPTIONS_KEY: &str = "allGameOptions";
pub const UPDATED_AT_KEY: &str = "allGameOptionsUpdatedAt";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadProgress {
    pub done: u32,
    pub total: u32,
}

impl LoadProgress {
    pub fn complete() -> Self {
        Self { done: 1, total: 1 }
    }

    /// Completion in percent, 0..=100.
    pub fn percent(&self) -> u16 {
        if self.total == 0 {
            return 0;
        }
        ((u64::from(self.done.min(self.total)) * 100) / u64::from(self.total)) as u16
    }
}

pub struct GameOptionsCache<S> {
    store: S,
    build_marker: DateTime<Utc>,
    reward_symbol: String,
    options: Vec<GameOption>,
}

impl<S: KeyValueStore> GameOptionsCache<S> {
    pub fn new(store: S, build_marker: DateTime<Utc>, reward_symbol: impl Into<String>) -> Self {
        Self {
            store,
            build_marker,
            reward_symbol: reward_symbol.into().to_uppercase(),
            options: Vec::new(),
        }
    }

    pub fn options(&self) -> &[GameOption] {
        &self.options
    }

    pub fn game_number(&self, coin_count: u8, min_heads: u8) -> Option<u32> {
        self.options
            .iter()
            .find(|o| o.coin_count == coin_count && o.min_heads == min_heads)
            .map(|o| o.game_number)
    }

    /// The cached list, unless it was written before the build marker. Outdated
    /// entries are removed.
    pub fn cached(&self) -> Result<Option<Vec<GameOption>>> {
        let Some(raw) = self.store.get(OPTIONS_KEY)? else {
            return Ok(None);
        };
        let updated_at = self
            .store
            .get(UPDATED_AT_KEY)?
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|text| DateTime::parse_from_rfc3339(&text).ok())
            .map(|at| at.with_timezone(&Utc));

        match updated_at {
            Some(at) if at >= self.build_marker => {
                let options = serde_json::from_slice(&raw).context("decode cached game options")?;
                Ok(Some(options))
            }
            _ => {
                debug!(?updated_at, build = %self.build_marker, "discarding outdated game options");
                self.store.remove(UPDATED_AT_KEY)?;
                self.store.remove(OPTIONS_KEY)?;
                Ok(None)
            }
        }
    }

    /// Returns the cached options when current, otherwise reads every game from the
    /// contract and caches the active ones paying out in the reward token.
    pub async fn load_options<C, F>(&mut self, contract: &C, mut on_progress: F) -> Vec<GameOption>
    where
        C: GameContract,
        F: FnMut(LoadProgress),
    {
        match self.cached() {
            Ok(Some(options)) => {
                debug!(count = options.len(), "using cached game options");
                self.options = options;
                on_progress(LoadProgress::complete());
                return self.options.clone();
            }
            Ok(None) => {}
            Err(err) => warn!(?err, "failed to read cached game options"),
        }

        let game_count = match contract.game_count().await {
            Ok(count) => count,
            Err(err) => {
                warn!(?err, "failed to read game count");
                on_progress(LoadProgress::complete());
                return Vec::new();
            }
        };
        // One step for the count itself.
        let total = game_count.saturating_add(1);
        on_progress(LoadProgress { done: 1, total });

        let mut options = Vec::new();
        let mut pools: HashMap<u32, PrizePool> = HashMap::new();
        for game_number in 0..game_count {
            match self.read_option(contract, game_number, &mut pools).await {
                Ok(Some(option)) => options.push(option),
                Ok(None) => {}
                Err(err) => {
                    warn!(?err, game_number, "failed to load game options");
                    break;
                }
            }
            on_progress(LoadProgress {
                done: game_number.saturating_add(2),
                total,
            });
        }
        on_progress(LoadProgress::complete());

        if let Err(err) = self.write_cache(&options) {
            warn!(?err, "failed to cache game options");
        }
        info!(count = options.len(), "loaded game options");
        self.options = options;
        self.options.clone()
    }

    async fn read_option<C: GameContract>(
        &self,
        contract: &C,
        game_number: u32,
        pools: &mut HashMap<u32, PrizePool>,
    ) -> Result<Option<GameOption>> {
        let config = contract.game_config(game_number).await?;
        let pool = match pools.get(&config.prize_pool_id) {
            Some(pool) => pool.clone(),
            None => {
                let pool = contract.prize_pool(config.prize_pool_id).await?;
                pools.insert(config.prize_pool_id, pool.clone());
                pool
            }
        };

        let symbol = pool.token_symbol.to_uppercase();
        if !config.active || symbol != self.reward_symbol {
            return Ok(None);
        }
        Ok(Some(GameOption {
            game_number: config.game_number,
            coin_count: config.coin_count,
            min_heads: config.min_heads,
            prize_token_symbol: symbol,
        }))
    }

    fn write_cache(&self, options: &[GameOption]) -> Result<()> {
        let encoded = serde_json::to_vec(options).context("encode game options")?;
        self.store.set(OPTIONS_KEY, &encoded)?;
        self.store
            .set(UPDATED_AT_KEY, Utc::now().to_rfc3339().as_bytes())?;
        Ok(())
    }
}
