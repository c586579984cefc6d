#![allow(non_snake_case)]
use fuels::types::ContractId;
use koin_toss::{
    Game,
    GameConfig,
    GameSettings,
    SessionStatus,
    Side,
    amount::{
        CENT,
        ONE_ETH,
    },
    bet::{
        FlipError,
        SubmitError,
    },
    build_marker,
    config::Network,
    flip::FlipPhase,
    keys::SigningKey,
    options::GameOptionsCache,
    session::{
        KeystoreVault,
        SessionManager,
        SessionStore,
        SessionTemplate,
    },
    storage::SledStore,
    test_helpers::FakeChain,
};
use tempdir::TempDir;

const GAME: ContractId = ContractId::new([0x11; 32]);
const PAYMASTER: ContractId = ContractId::new([0x22; 32]);

struct Harness {
    _tmp: TempDir,
    chain: FakeChain,
    game: Game<FakeChain, KeystoreVault, SledStore>,
}

impl Harness {
    fn new(network: Network) -> Self {
        let tmp = TempDir::new("koin-toss-flow").unwrap();
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
        chain.add_game(GameConfig {
            game_number: 1,
            coin_count: 3,
            min_heads: 2,
            win_chance_ppm: 480_000,
            active: true,
            prize_pool_id: 0,
        });

        let vault = KeystoreVault::open(tmp.path().join("sessions")).unwrap();
        let sessions = SessionManager::new(
            SessionStore::new(vault),
            SigningKey::generate(&mut rand::thread_rng()),
            SessionTemplate::for_contract(GAME),
            network,
        )
        .unwrap();
        let cache = SledStore::open(tmp.path().join("cache")).unwrap();
        let options = GameOptionsCache::new(cache, build_marker(), "WETH");
        let game = Game::new(
            chain.clone(),
            sessions,
            options,
            GameSettings {
                game_contract: GAME,
                paymaster: PAYMASTER,
            },
        );
        Self {
            _tmp: tmp,
            chain,
            game,
        }
    }

    async fn ready(&mut self, balance: u64) {
        self.chain.set_balance(self.game.owner(), balance);
        self.game.load_options(|_| {}).await;
        self.game.refresh_balance().await.unwrap();
    }
}

#[tokio::test]
async fn flip__win_is_reconciled_and_credited() {
    let mut harness = Harness::new(Network::Testnet);
    harness.ready(ONE_ETH).await;

    // given
    harness.game.set_coin_count(3).await;
    harness.game.set_min_heads(2).await;
    harness.game.select_side(Side::Heads);
    harness.game.set_amount(25 * CENT).await;

    // when
    let tx = harness.game.flip().await.unwrap();
    harness.chain.reveal_wager(tx, true, 50 * CENT).unwrap();
    let outcome = harness.game.poll().await.unwrap().expect("revealed");

    // then
    assert!(outcome.won);
    assert_eq!(outcome.coins, vec![Side::Heads, Side::Heads, Side::Tails]);
    assert_eq!(harness.game.balance(), ONE_ETH + 25 * CENT);
    assert!(matches!(harness.game.phase(), FlipPhase::Resolved(_)));
}

#[tokio::test]
async fn flip__reuses_the_stored_session_while_active() {
    let mut harness = Harness::new(Network::Mainnet);
    harness.ready(ONE_ETH).await;
    harness.game.select_side(Side::Tails);

    // given
    let first = harness.game.flip().await.unwrap();
    harness.chain.reveal_wager(first, false, 0).unwrap();
    harness.game.poll().await.unwrap();

    // when
    harness.game.flip().await.unwrap();

    // then
    assert_eq!(harness.chain.sessions_created(), 1);
    let wagers = harness.chain.submitted_wagers();
    assert_eq!(wagers[0].session_hash, wagers[1].session_hash);
}

#[tokio::test]
async fn flip__closed_session_is_replaced_before_wagering() {
    let mut harness = Harness::new(Network::Mainnet);
    harness.ready(ONE_ETH).await;
    harness.game.select_side(Side::Heads);
    let first = harness.game.flip().await.unwrap();
    harness.chain.reveal_wager(first, false, 0).unwrap();
    harness.game.poll().await.unwrap();

    // given
    let old_hash = harness.chain.submitted_wagers()[0].session_hash;
    harness
        .chain
        .set_session_status(old_hash, SessionStatus::Closed);

    // when
    harness.game.flip().await.unwrap();

    // then
    assert_eq!(harness.chain.sessions_created(), 2);
    assert_ne!(harness.chain.submitted_wagers()[1].session_hash, old_hash);
}

#[tokio::test]
async fn flip__execution_failure_resets_state_and_session() {
    let mut harness = Harness::new(Network::Testnet);
    harness.ready(ONE_ETH).await;
    harness.game.select_side(Side::Heads);
    harness.chain.fail_next_wager(SubmitError::classify(
        "An unknown error occurred while executing the contract function",
    ));

    // when
    let err = harness.game.flip().await.unwrap_err();

    // then
    assert!(matches!(
        err,
        FlipError::Failed(SubmitError::ExecutionFailed(_))
    ));
    assert!(!harness.game.is_flipping());
    let owner = harness.game.owner();
    assert!(
        harness
            .game
            .sessions()
            .store()
            .get_stored_session(&owner)
            .unwrap()
            .is_none()
    );

    // and the next flip goes through with a new session
    harness.game.flip().await.unwrap();
    assert_eq!(harness.chain.sessions_created(), 2);
}

#[tokio::test]
async fn flip__without_side_is_rejected_before_any_network_call() {
    let mut harness = Harness::new(Network::Testnet);
    harness.ready(ONE_ETH).await;

    let err = harness.game.flip().await.unwrap_err();

    assert_eq!(err.alert().as_deref(), Some("Select HEADS or TAILS first."));
    assert_eq!(harness.chain.sessions_created(), 0);
    assert!(harness.chain.submitted_wagers().is_empty());
}
