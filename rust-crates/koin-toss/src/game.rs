use anyhow::Result;
use fuels::types::{
    Address,
    ContractId,
};
use tracing::{
    info,
    warn,
};

use crate::{
    amount::{
        clamp_bet,
        double,
        floor_cents,
        halve,
        win_probability_percent,
    },
    autoflip::AutoFlip,
    bet::{
        BetRequest,
        BetSubmitter,
        FlipError,
        WalletContext,
    },
    chain::{
        ChainWatcher,
        GameContract,
        SessionRegistry,
        WagerRelay,
    },
    config::NetworkConfig,
    flip::{
        FlipMachine,
        FlipPhase,
    },
    history::{
        GameHistory,
        LogWatcher,
    },
    options::{
        GameOptionsCache,
        LoadProgress,
    },
    reconcile::Outcome,
    session::{
        SessionManager,
        SessionVault,
    },
    storage::KeyValueStore,
    types::{
        BetLimits,
        GameOption,
        Side,
        TxHash,
    },
};

pub const MAX_COINS: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameSettings {
    pub game_contract: ContractId,
    pub paymaster: ContractId,
}

impl From<&NetworkConfig> for GameSettings {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            game_contract: config.game_contract,
            paymaster: config.paymaster,
        }
    }
}

/// What the player has picked on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub side: Option<Side>,
    pub coin_count: u8,
    pub min_heads: u8,
    pub amount: u64,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            side: None,
            coin_count: 1,
            min_heads: 1,
            amount: 0,
        }
    }
}

/// Contract-derived facts about the selected coin configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GameDetails {
    pub game_number: Option<u32>,
    pub limits: Option<BetLimits>,
    pub win_probability: f64,
    pub payout: u64,
    /// Set when the configuration is unsupported or the balance is below the minimum bet.
    pub betting_disabled: bool,
}

/// Ties options, sessions, wagers and history together for one connected wallet.
pub struct Game<C, V, S> {
    chain: C,
    sessions: SessionManager<V>,
    options: GameOptionsCache<S>,
    settings: GameSettings,
    watcher: LogWatcher,
    machine: FlipMachine,
    selection: Selection,
    details: GameDetails,
    balance: u64,
    last_outcome: Option<Outcome>,
    auto: AutoFlip,
}

impl<C, V, S> Game<C, V, S>
where
    C: GameContract + SessionRegistry + WagerRelay + ChainWatcher,
    V: SessionVault,
    S: KeyValueStore,
{
    pub fn new(
        chain: C,
        sessions: SessionManager<V>,
        options: GameOptionsCache<S>,
        settings: GameSettings,
    ) -> Self {
        let owner = sessions.owner();
        Self {
            chain,
            sessions,
            options,
            settings,
            watcher: LogWatcher::new(Some(owner)),
            machine: FlipMachine::new(),
            selection: Selection::default(),
            details: GameDetails {
                betting_disabled: true,
                ..GameDetails::default()
            },
            balance: 0,
            last_outcome: None,
            auto: AutoFlip::new(),
        }
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn owner(&self) -> Address {
        self.sessions.owner()
    }

    pub fn sessions(&self) -> &SessionManager<V> {
        &self.sessions
    }

    pub fn options(&self) -> &[GameOption] {
        self.options.options()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn details(&self) -> GameDetails {
        self.details
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn phase(&self) -> &FlipPhase {
        self.machine.phase()
    }

    pub fn is_flipping(&self) -> bool {
        self.machine.is_flipping()
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    pub fn all_history(&self) -> &GameHistory {
        self.watcher.all()
    }

    pub fn my_history(&self) -> &GameHistory {
        self.watcher.mine()
    }

    pub async fn load_options<F: FnMut(LoadProgress)>(&mut self, on_progress: F) -> usize {
        let count = self.options.load_options(&self.chain, on_progress).await.len();
        self.refresh_game_details().await;
        count
    }

    pub async fn refresh_balance(&mut self) -> Result<u64> {
        self.balance = self.chain.balance(&self.owner()).await?;
        self.apply_clamp();
        Ok(self.balance)
    }

    /// Re-reads limits, win chance and payout for the selected configuration.
    pub async fn refresh_game_details(&mut self) {
        let game_number = self
            .options
            .game_number(self.selection.coin_count, self.selection.min_heads);
        self.details = GameDetails {
            game_number,
            betting_disabled: true,
            ..GameDetails::default()
        };
        let Some(game_number) = game_number else {
            return;
        };

        match self.chain.bet_limits(game_number).await {
            Ok(limits) => self.details.limits = Some(limits),
            Err(err) => warn!(?err, game_number, "failed to read bet limits"),
        }
        match self.chain.game_config(game_number).await {
            Ok(config) => {
                self.details.win_probability = win_probability_percent(config.win_chance_ppm)
            }
            Err(err) => warn!(?err, game_number, "failed to read game config"),
        }
        self.apply_clamp();
        self.refresh_payout().await;
    }

    async fn refresh_payout(&mut self) {
        let (Some(game_number), amount) = (self.details.game_number, self.selection.amount)
        else {
            self.details.payout = 0;
            return;
        };
        if self.details.win_probability <= 0.0 {
            self.details.payout = 0;
            return;
        }
        match self.chain.payout_estimate(game_number, amount).await {
            Ok(payout) => self.details.payout = floor_cents(payout),
            Err(err) => warn!(?err, game_number, "failed to read payout"),
        }
    }

    fn apply_clamp(&mut self) {
        let Some(limits) = self.details.limits else {
            return;
        };
        match clamp_bet(self.selection.amount, limits, self.balance) {
            Some(amount) => {
                self.selection.amount = amount;
                self.details.betting_disabled = self.details.game_number.is_none();
            }
            None => self.details.betting_disabled = true,
        }
    }

    pub fn select_side(&mut self, side: Side) {
        if !self.is_flipping() {
            self.selection.side = Some(side);
        }
    }

    pub async fn set_coin_count(&mut self, coin_count: u8) {
        if self.is_flipping() {
            return;
        }
        let coin_count = coin_count.clamp(1, MAX_COINS);
        self.selection.coin_count = coin_count;
        self.selection.min_heads = self.selection.min_heads.min(coin_count);
        self.last_outcome = None;
        self.refresh_game_details().await;
    }

    pub async fn set_min_heads(&mut self, min_heads: u8) {
        if self.is_flipping() {
            return;
        }
        self.selection.min_heads = min_heads.clamp(1, self.selection.coin_count);
        self.last_outcome = None;
        self.refresh_game_details().await;
    }

    pub async fn set_amount(&mut self, amount: u64) {
        self.selection.amount = amount;
        self.apply_clamp();
        self.refresh_payout().await;
    }

    pub async fn halve_amount(&mut self) {
        self.set_amount(halve(self.selection.amount)).await;
    }

    pub async fn double_amount(&mut self) {
        let max = self.details.limits.map_or(u64::MAX, |limits| limits.max);
        self.set_amount(double(self.selection.amount, max)).await;
    }

    /// Submits a wager for the current selection.
    pub async fn flip(&mut self) -> Result<TxHash, FlipError> {
        let request = BetRequest {
            side: self.selection.side,
            amount: self.selection.amount,
            game_number: self.details.game_number,
        };
        let wallet = WalletContext {
            owner: Some(self.owner()),
            balance: self.balance,
        };
        let submitter = BetSubmitter::new(
            &self.chain,
            &self.sessions,
            self.settings.game_contract,
            self.settings.paymaster,
        );
        let result = submitter
            .submit_bet(&mut self.machine, &request, &wallet, self.options.options())
            .await;

        match &result {
            Ok(_) => {
                self.last_outcome = None;
                self.auto.submitted();
            }
            Err(err) => {
                self.auto.failed(err);
                if matches!(err, FlipError::Failed(_)) {
                    if let Err(err) = self.refresh_balance().await {
                        warn!(?err, "failed to refresh balance after failed flip");
                    }
                }
            }
        }
        result
    }

    /// Handles a new chain head: reads logs and resolves a pending flip.
    pub async fn on_block(&mut self, latest: u64) -> Result<Option<Outcome>> {
        self.watcher.on_block(&self.chain, latest).await?;
        let history = self.watcher.mine().to_vec();
        let Some(outcome) = self.machine.history_updated(&history) else {
            return Ok(None);
        };
        info!(won = outcome.won, reward = outcome.reward, "flip resolved");
        self.last_outcome = Some(outcome.clone());
        self.auto.resolved();
        if let Err(err) = self.refresh_balance().await {
            warn!(?err, "failed to refresh balance after reveal");
        }
        Ok(Some(outcome))
    }

    pub async fn poll(&mut self) -> Result<Option<Outcome>> {
        let latest = self.chain.latest_block().await?;
        self.on_block(latest).await
    }

    pub fn auto_flip(&self) -> AutoFlip {
        self.auto
    }

    pub fn toggle_auto_flip(&mut self) {
        self.auto.toggle();
    }

    pub fn set_auto_flip_count(&mut self, count: u32) {
        self.auto.set_count(count);
    }

    /// True once per queued auto flip; the caller submits it with [`Game::flip`].
    pub fn take_auto_flip_due(&mut self) -> bool {
        self.auto.take_due() && !self.is_flipping()
    }

    /// Drops any in-flight flip and resynchronises the balance.
    pub async fn recover(&mut self) {
        self.machine.recover();
        self.auto.stop();
        if let Err(err) = self.refresh_balance().await {
            warn!(?err, "failed to refresh balance while recovering");
        }
    }
}
