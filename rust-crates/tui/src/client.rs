use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use fuels::types::Address;
use koin_toss::{
    Game,
    GameResult,
    GameSettings,
    Selection,
    Side,
    amount::format_eth,
    autoflip::AutoFlip,
    bet::{
        FlipError,
        SubmitError,
    },
    build_marker,
    chain::{
        ChainWatcher,
        GameContract,
        SessionRegistry,
        WagerRelay,
    },
    coins::{
        self,
        Banner,
        CoinView,
    },
    config::{
        Network,
        NetworkConfig,
    },
    encoding::short_hex,
    game::GameDetails,
    gateway::GatewayClient,
    keys::SigningKey,
    options::{
        GameOptionsCache,
        LoadProgress,
    },
    session::{
        KeystoreVault,
        SessionManager,
        SessionStore,
        SessionTemplate,
        SessionVault,
    },
    storage::{
        KeyValueStore,
        SledStore,
    },
};
use std::{
    path::PathBuf,
    time::{
        Duration,
        Instant,
    },
};
use tokio::time::{
    self,
    MissedTickBehavior,
};
use tracing::{
    error,
    info,
    warn,
};

const BLOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_ERRORS: usize = 50;

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network: Network,
    pub owner: Address,
    pub balance: u64,
    pub reward_symbol: String,
    pub block_height: Option<u64>,
    pub selection: Selection,
    pub details: GameDetails,
    pub coins: Vec<CoinView>,
    pub flipping: bool,
    pub banner: Option<Banner>,
    pub my_history: Vec<GameResult>,
    pub all_history: Vec<GameResult>,
    pub animation: bool,
    pub auto_flip: AutoFlip,
    pub status: String,
    pub errors: Vec<String>,
    pub alert: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: Network,
    pub network_config: NetworkConfig,
    pub owner_key: SigningKey,
    /// Per-network directory holding `sessions/` and `cache/`.
    pub state_dir: PathBuf,
    pub animation: bool,
}

pub struct AppController<C, V, S> {
    game: Game<C, V, S>,
    network: Network,
    reward_symbol: String,
    animation: bool,
    block_height: Option<u64>,
    flip_started: Option<Instant>,
    flip_side: Option<Side>,
    poll_failing: bool,
    status: String,
    errors: Vec<String>,
    alert: Option<String>,
}

pub type LiveController = AppController<GatewayClient, KeystoreVault, SledStore>;

impl LiveController {
    pub fn new(config: AppConfig) -> Result<Self> {
        let AppConfig {
            network,
            network_config,
            owner_key,
            state_dir,
            animation,
        } = config;
        let gateway =
            GatewayClient::new(&network_config.gateway_url, network_config.session_validator)
                .map_err(|e| eyre!(e))?;
        let vault = KeystoreVault::open(state_dir.join("sessions")).map_err(|e| eyre!(e))?;
        let sessions = SessionManager::new(
            SessionStore::new(vault),
            owner_key,
            SessionTemplate::for_contract(network_config.game_contract),
            network,
        )
        .map_err(|e| eyre!(e))?;
        let cache = SledStore::open(state_dir.join("cache")).map_err(|e| eyre!(e))?;
        let options =
            GameOptionsCache::new(cache, build_marker(), &network_config.reward_symbol);
        let game = Game::new(
            gateway,
            sessions,
            options,
            GameSettings::from(&network_config),
        );
        info!(
            %network,
            gateway = network_config.gateway_url.as_str(),
            owner = %game.owner(),
            "controller ready"
        );
        Ok(AppController::from_game(
            game,
            network,
            network_config.reward_symbol,
            animation,
        ))
    }
}

impl<C, V, S> AppController<C, V, S>
where
    C: GameContract + SessionRegistry + WagerRelay + ChainWatcher,
    V: SessionVault,
    S: KeyValueStore,
{
    pub fn from_game(
        game: Game<C, V, S>,
        network: Network,
        reward_symbol: impl Into<String>,
        animation: bool,
    ) -> Self {
        Self {
            game,
            network,
            reward_symbol: reward_symbol.into(),
            animation,
            block_height: None,
            flip_started: None,
            flip_side: None,
            poll_failing: false,
            status: String::new(),
            errors: Vec::new(),
            alert: None,
        }
    }

    pub fn game(&self) -> &Game<C, V, S> {
        &self.game
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.errors.clear();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub async fn load_options<F: FnMut(LoadProgress)>(&mut self, on_progress: F) -> usize {
        let count = self.game.load_options(on_progress).await;
        if count == 0 {
            self.push_errors(vec!["No game options could be loaded".to_string()]);
        } else {
            self.set_status(format!("Loaded {count} game options"));
        }
        count
    }

    pub async fn refresh_balance(&mut self) {
        if let Err(err) = self.game.refresh_balance().await {
            self.push_errors(vec![format!("Balance refresh failed: {err:#}")]);
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation && self.game.is_flipping()
    }

    pub fn toggle_animation(&mut self) {
        self.animation = !self.animation;
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn select_side(&mut self, side: Side) {
        self.game.select_side(side);
    }

    pub fn toggle_side(&mut self) {
        let next = self
            .game
            .selection()
            .side
            .map_or(Side::Heads, Side::opposite);
        self.game.select_side(next);
    }

    pub async fn change_coin_count(&mut self, up: bool) {
        let current = self.game.selection().coin_count;
        let next = if up {
            current.saturating_add(1)
        } else {
            current.saturating_sub(1)
        };
        self.game.set_coin_count(next).await;
    }

    pub async fn change_min_heads(&mut self, up: bool) {
        let current = self.game.selection().min_heads;
        let next = if up {
            current.saturating_add(1)
        } else {
            current.saturating_sub(1)
        };
        self.game.set_min_heads(next).await;
    }

    pub async fn set_amount(&mut self, amount: u64) {
        self.game.set_amount(amount).await;
    }

    pub fn toggle_auto_flip(&mut self) {
        self.game.toggle_auto_flip();
    }

    pub fn change_auto_flip_count(&mut self, up: bool) {
        let current = self.game.auto_flip().count();
        let next = if up {
            current.saturating_add(1)
        } else {
            current.saturating_sub(1)
        };
        self.game.set_auto_flip_count(next);
    }

    /// Submits the next flip of an auto-flip run when one is queued.
    pub async fn continue_auto_flip(&mut self) -> Result<()> {
        if !self.game.take_auto_flip_due() {
            return Ok(());
        }
        let auto = self.game.auto_flip();
        info!(
            flip = auto.flips() + 1,
            count = auto.count(),
            retries = auto.retries(),
            "submitting auto flip"
        );
        self.flip().await
    }

    pub async fn halve_amount(&mut self) {
        self.game.halve_amount().await;
    }

    pub async fn double_amount(&mut self) {
        self.game.double_amount().await;
    }

    /// Player-facing failures become alerts; transport failures are returned.
    pub async fn flip(&mut self) -> Result<()> {
        let side = self.game.selection().side;
        match self.game.flip().await {
            Ok(tx) => {
                self.flip_started = Some(Instant::now());
                self.flip_side = side;
                self.set_status(format!(
                    "Flip submitted ({}), waiting for the reveal...",
                    short_hex(*tx)
                ));
                Ok(())
            }
            Err(FlipError::Failed(
                err @ (SubmitError::Transport(_) | SubmitError::Other(_)),
            )) => Err(eyre!(err)),
            Err(err) => {
                warn!(%err, "flip rejected");
                match err.alert() {
                    Some(alert) => self.alert = Some(alert),
                    None => self.set_status(format!("Flip not sent: {err}")),
                }
                Ok(())
            }
        }
    }

    /// Polls the chain head and resolves a pending flip.
    pub async fn on_block_tick(&mut self) {
        let latest = match self.game.chain().latest_block().await {
            Ok(latest) => latest,
            Err(err) => {
                self.poll_failed(format!("{err:#}"));
                return;
            }
        };
        if self.block_height == Some(latest) {
            return;
        }
        self.block_height = Some(latest);
        match self.game.on_block(latest).await {
            Ok(Some(outcome)) => {
                self.poll_failing = false;
                self.flip_started = None;
                let banner = Banner::for_outcome(&outcome);
                let mut status = banner.headline().to_string();
                if let Some(detail) = banner.detail() {
                    status.push(' ');
                    status.push_str(&detail);
                }
                self.set_status(status);
            }
            Ok(None) => self.poll_failing = false,
            Err(err) => self.poll_failed(format!("{err:#}")),
        }
    }

    fn poll_failed(&mut self, message: String) {
        warn!(error = message.as_str(), "block poll failed");
        if !self.poll_failing {
            self.poll_failing = true;
            self.push_errors(vec![format!("Chain poll failed: {message}")]);
        }
    }

    /// Drops the in-flight flip and resynchronises the balance.
    pub async fn recover(&mut self) {
        self.flip_started = None;
        self.game.recover().await;
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let selection = self.game.selection();
        let flipping = self.game.is_flipping();
        let last_outcome = self.game.last_outcome();
        let coins = match (flipping, last_outcome) {
            (true, _) => self.spinning_coins(selection),
            (false, Some(outcome)) => coins::landed(
                outcome,
                self.flip_side.unwrap_or(outcome.result.selected_side),
            ),
            (false, None) => {
                coins::preview(selection.side, selection.coin_count, selection.min_heads)
            }
        };
        AppSnapshot {
            network: self.network,
            owner: self.game.owner(),
            balance: self.game.balance(),
            reward_symbol: self.reward_symbol.clone(),
            block_height: self.block_height,
            selection,
            details: self.game.details(),
            coins,
            flipping,
            banner: last_outcome.map(Banner::for_outcome),
            my_history: self.game.my_history().to_vec(),
            all_history: self.game.all_history().to_vec(),
            animation: self.animation,
            auto_flip: self.game.auto_flip(),
            status: self.status.clone(),
            errors: self.errors.clone(),
            alert: self.alert.clone(),
        }
    }

    fn spinning_coins(&self, selection: Selection) -> Vec<CoinView> {
        match (self.animation, self.flip_started) {
            (true, Some(started)) => {
                let face = coins::spinning_face(started.elapsed());
                (0..selection.coin_count)
                    .map(|_| CoinView {
                        face,
                        highlighted: true,
                    })
                    .collect()
            }
            _ => coins::preview(selection.side, selection.coin_count, selection.min_heads)
                .into_iter()
                .map(|coin| CoinView {
                    highlighted: false,
                    ..coin
                })
                .collect(),
        }
    }
}

pub fn init_tracing(log_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let appender = tracing_appender::rolling::daily(log_dir, "koin-toss.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,koin_toss=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let controller = LiveController::new(config)?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

fn redraw<C, V, S>(
    controller: &AppController<C, V, S>,
    ui_state: &mut ui::UiState,
    context: &'static str,
) -> Result<()>
where
    C: GameContract + SessionRegistry + WagerRelay + ChainWatcher,
    V: SessionVault,
    S: KeyValueStore,
{
    let snapshot = controller.build_snapshot();
    ui::draw(ui_state, &snapshot).wrap_err(context)
}

fn sync_error<C, V, S>(
    controller: &mut AppController<C, V, S>,
    ui_state: &mut ui::UiState,
    error_msg: impl Into<String>,
) -> Result<()>
where
    C: GameContract + SessionRegistry + WagerRelay + ChainWatcher,
    V: SessionVault,
    S: KeyValueStore,
{
    controller.push_errors(vec![error_msg.into()]);
    redraw(controller, ui_state, "draw after error failed")
}

fn show_processing_status<C, V, S>(
    controller: &mut AppController<C, V, S>,
    ui_state: &mut ui::UiState,
    message: impl Into<String>,
    context: &'static str,
) -> Result<()>
where
    C: GameContract + SessionRegistry + WagerRelay + ChainWatcher,
    V: SessionVault,
    S: KeyValueStore,
{
    controller.set_status(message);
    redraw(controller, ui_state, context)
}

async fn run_loop<C, V, S>(
    mut controller: AppController<C, V, S>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()>
where
    C: GameContract + SessionRegistry + WagerRelay + ChainWatcher,
    V: SessionVault,
    S: KeyValueStore,
{
    info!("Running app loop");
    controller
        .load_options(|progress| {
            if let Err(err) = ui::draw_loading(ui_state, progress) {
                warn!(?err, "failed to draw loading gauge");
            }
        })
        .await;
    controller.refresh_balance().await;
    redraw(&controller, ui_state, "initial draw failed")?;

    let mut block_ticker = time::interval(BLOCK_POLL_INTERVAL);
    block_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut animation_ticker = time::interval(coins::FLIP_TICK);
    animation_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = block_ticker.tick() => {
                controller.on_block_tick().await;
                if let Err(err) = controller.continue_auto_flip().await {
                    error!(error = %err, "auto flip failed");
                    controller.recover().await;
                    sync_error(&mut controller, ui_state, format!("Auto flip failed: {err}"))?;
                    continue;
                }
                redraw(&controller, ui_state, "draw after block tick failed")?;
            }
            _ = animation_ticker.tick(), if controller.is_animating() => {
                redraw(&controller, ui_state, "draw during flip animation failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::DismissAlert => controller.dismiss_alert(),
                    ui::UserEvent::ToggleAnimation => controller.toggle_animation(),
                    ui::UserEvent::ToggleAutoFlip => controller.toggle_auto_flip(),
                    ui::UserEvent::MoreAutoFlips => controller.change_auto_flip_count(true),
                    ui::UserEvent::FewerAutoFlips => controller.change_auto_flip_count(false),
                    ui::UserEvent::SelectSide(side) => controller.select_side(side),
                    ui::UserEvent::ToggleSide => controller.toggle_side(),
                    ui::UserEvent::MoreCoins => controller.change_coin_count(true).await,
                    ui::UserEvent::FewerCoins => controller.change_coin_count(false).await,
                    ui::UserEvent::MoreMinHeads => controller.change_min_heads(true).await,
                    ui::UserEvent::FewerMinHeads => controller.change_min_heads(false).await,
                    ui::UserEvent::SetAmount(amount) => controller.set_amount(amount).await,
                    ui::UserEvent::HalveAmount => controller.halve_amount().await,
                    ui::UserEvent::DoubleAmount => controller.double_amount().await,
                    ui::UserEvent::Flip => {
                        let amount = controller.game.selection().amount;
                        show_processing_status(
                            &mut controller,
                            ui_state,
                            format!("Flipping {} ETH...", format_eth(amount)),
                            "draw while submitting flip failed",
                        )?;
                        if let Err(err) = controller.flip().await {
                            error!(error = %err, "flip failed");
                            controller.recover().await;
                            sync_error(&mut controller, ui_state, format!("Flip failed: {err}"))?;
                            continue;
                        }
                    }
                }
                redraw(&controller, ui_state, "draw after input failed")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use koin_toss::{
        GameConfig,
        amount::{
            CENT,
            ONE_ETH,
        },
        flip::FlipPhase,
        session::MemoryVault,
        storage::MemoryStore,
        test_helpers::FakeChain,
    };
    use fuels::types::ContractId;

    type TestController = AppController<FakeChain, MemoryVault, MemoryStore>;

    async fn controller(balance: u64) -> (FakeChain, TestController) {
        let chain = FakeChain::new();
        chain.add_prize_pool(0, "WETH");
        chain.add_game(GameConfig {
            game_number: 0,
            coin_count: 1,
            min_heads: 1,
            win_chance_ppm: 490_000,
            active: true,
            prize_pool_id: 0,
        });
        let game_contract = ContractId::new([0x11; 32]);
        let sessions = SessionManager::new(
            SessionStore::new(MemoryVault::new()),
            SigningKey::generate(&mut rand::thread_rng()),
            SessionTemplate::for_contract(game_contract),
            Network::Testnet,
        )
        .unwrap();
        let options = GameOptionsCache::new(MemoryStore::new(), build_marker(), "WETH");
        let game = Game::new(
            chain.clone(),
            sessions,
            options,
            GameSettings {
                game_contract,
                paymaster: ContractId::new([0x22; 32]),
            },
        );
        chain.set_balance(game.owner(), balance);
        let mut controller = AppController::from_game(game, Network::Testnet, "WETH", true);
        controller.load_options(|_| {}).await;
        controller.refresh_balance().await;
        (chain, controller)
    }

    #[tokio::test]
    async fn flip__without_side_raises_alert() {
        let (chain, mut controller) = controller(ONE_ETH).await;

        controller.flip().await.unwrap();

        let snapshot = controller.build_snapshot();
        assert_eq!(snapshot.alert.as_deref(), Some("Select HEADS or TAILS first."));
        assert!(chain.submitted_wagers().is_empty());
    }

    #[tokio::test]
    async fn flip__reward_limit_becomes_alert_not_error() {
        // given
        let (chain, mut controller) = controller(ONE_ETH).await;
        controller.select_side(Side::Heads);
        chain.fail_next_wager(SubmitError::RewardLimitExceeded);

        // when
        let result = controller.flip().await;

        // then
        assert!(result.is_ok());
        assert_eq!(
            controller.build_snapshot().alert.as_deref(),
            Some("Bet exceeds max reward limit!")
        );
    }

    #[tokio::test]
    async fn flip__transport_failure_is_returned_and_recovered() {
        // given
        let (chain, mut controller) = controller(ONE_ETH).await;
        controller.select_side(Side::Tails);
        chain.fail_next_wager(SubmitError::Transport("connection reset".to_string()));

        // when
        let result = controller.flip().await;
        controller.recover().await;

        // then
        assert!(result.is_err());
        assert_eq!(controller.game().phase(), &FlipPhase::Idle);
        assert!(!controller.is_animating());
    }

    #[tokio::test]
    async fn on_block_tick__resolves_flip_and_shows_banner() {
        // given
        let (chain, mut controller) = controller(ONE_ETH).await;
        controller.select_side(Side::Heads);
        controller.set_amount(50 * CENT).await;
        controller.flip().await.unwrap();
        assert!(controller.is_animating());
        let tx = controller
            .game()
            .phase()
            .clone();
        let FlipPhase::AwaitingReveal(pending) = tx else {
            panic!("flip not pending");
        };
        chain.reveal_wager(pending.tx_hash, true, ONE_ETH).unwrap();

        // when
        controller.on_block_tick().await;

        // then
        let snapshot = controller.build_snapshot();
        assert_eq!(snapshot.banner, Some(Banner::Win { payout: ONE_ETH }));
        assert!(snapshot.status.starts_with("You Win!!"));
        assert_eq!(snapshot.coins.len(), 1);
        assert_eq!(snapshot.coins[0].face, Side::Heads);
        assert_eq!(snapshot.my_history.len(), 1);
        assert!(!snapshot.flipping);
    }

    fn pending_tx(controller: &TestController) -> koin_toss::TxHash {
        match controller.game().phase() {
            FlipPhase::AwaitingReveal(pending) => pending.tx_hash,
            other => panic!("flip not pending: {other:?}"),
        }
    }

    #[tokio::test]
    async fn continue_auto_flip__resolves_two_queued_flips() {
        // given
        let (chain, mut controller) = controller(ONE_ETH).await;
        controller.select_side(Side::Tails);
        controller.toggle_auto_flip();
        controller.change_auto_flip_count(true);
        controller.flip().await.unwrap();
        chain.reveal_wager(pending_tx(&controller), true, 20 * CENT).unwrap();

        // when
        controller.on_block_tick().await;
        controller.continue_auto_flip().await.unwrap();
        let second = pending_tx(&controller);
        chain.reveal_wager(second, false, 0).unwrap();
        controller.on_block_tick().await;
        controller.continue_auto_flip().await.unwrap();

        // then
        let snapshot = controller.build_snapshot();
        assert_eq!(chain.submitted_wagers().len(), 2);
        assert_eq!(snapshot.my_history.len(), 2);
        assert_eq!(snapshot.banner, Some(Banner::Lose));
        assert!(!snapshot.flipping);
        assert!(!snapshot.auto_flip.is_running());
        assert_eq!(snapshot.auto_flip.flips(), 2);
    }

    #[tokio::test]
    async fn continue_auto_flip__stops_after_an_alert() {
        // given
        let (chain, mut controller) = controller(ONE_ETH).await;
        controller.select_side(Side::Heads);
        controller.toggle_auto_flip();
        controller.change_auto_flip_count(true);
        controller.flip().await.unwrap();
        chain.reveal_wager(pending_tx(&controller), false, 0).unwrap();
        controller.on_block_tick().await;
        chain.fail_next_wager(SubmitError::RewardLimitExceeded);

        // when
        controller.continue_auto_flip().await.unwrap();
        controller.continue_auto_flip().await.unwrap();

        // then
        let snapshot = controller.build_snapshot();
        assert_eq!(snapshot.alert.as_deref(), Some("Bet exceeds max reward limit!"));
        assert_eq!(chain.submitted_wagers().len(), 1);
        assert!(!snapshot.auto_flip.is_running());
    }

    #[tokio::test]
    async fn build_snapshot__dims_coins_while_flipping_without_animation() {
        // given
        let (_chain, mut controller) = controller(ONE_ETH).await;
        controller.toggle_animation();
        controller.select_side(Side::Heads);

        // when
        controller.flip().await.unwrap();

        // then
        let snapshot = controller.build_snapshot();
        assert!(snapshot.flipping);
        assert!(!controller.is_animating());
        assert!(snapshot.coins.iter().all(|coin| !coin.highlighted));
    }

    #[tokio::test]
    async fn toggle_side__starts_on_heads_then_alternates() {
        let (_chain, mut controller) = controller(ONE_ETH).await;

        controller.toggle_side();
        assert_eq!(controller.game().selection().side, Some(Side::Heads));
        controller.toggle_side();
        assert_eq!(controller.game().selection().side, Some(Side::Tails));
    }
}
