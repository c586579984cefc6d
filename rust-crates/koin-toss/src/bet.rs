use fuels::types::{
    Address,
    Bytes32,
    ContractId,
};
use sha2::{
    Digest,
    Sha256,
};
use thiserror::Error;
use tracing::{
    info,
    warn,
};

use crate::{
    amount::format_eth,
    chain::{
        SessionRegistry,
        SignedWager,
        WagerRelay,
    },
    encoding::short_hex,
    flip::FlipMachine,
    keys::signature_hex,
    session::{
        SessionCredential,
        SessionManager,
        SessionVault,
        credential::{
            FunctionSelector,
            WAGER_FUNCTION,
        },
    },
    types::{
        GameOption,
        Side,
        TxHash,
    },
};

const REWARD_LIMIT_MESSAGE: &str = "Bet exceeds max reward limit";
const EXECUTION_FAILED_MESSAGE: &str =
    "An unknown error occurred while executing the contract function";
const SESSION_MESSAGES: [&str; 3] = ["session is not active", "invalid session", "session expired"];

/// What the player asked for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BetRequest {
    pub side: Option<Side>,
    pub amount: u64,
    pub game_number: Option<u32>,
}

/// A bet that passed every local precondition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidBet {
    pub side: Side,
    pub amount: u64,
    pub game_number: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalletContext {
    pub owner: Option<Address>,
    pub balance: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BetRejection {
    #[error("no wallet connected")]
    NoWallet,
    #[error("no side selected")]
    NoSideSelected,
    #[error("a flip is already in progress")]
    AlreadyFlipping,
    #[error("no active game for this coin configuration")]
    UnsupportedGame,
    #[error("bet of {amount} exceeds balance {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },
}

impl BetRejection {
    /// Text shown to the player, if the rejection warrants one.
    pub fn alert(&self) -> Option<String> {
        match self {
            BetRejection::InsufficientBalance { .. } => {
                Some("Betting amount was over the your balance!".to_string())
            }
            BetRejection::NoSideSelected => Some("Select HEADS or TAILS first.".to_string()),
            BetRejection::UnsupportedGame => {
                Some("This coin configuration is not available.".to_string())
            }
            BetRejection::NoWallet | BetRejection::AlreadyFlipping => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Remediation {
    AlertOnly,
    /// Drop the stored session so the next flip creates a new one.
    ClearSession,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("bet exceeds the max reward limit")]
    RewardLimitExceeded,
    #[error("contract execution failed: {0}")]
    ExecutionFailed(String),
    #[error("session rejected: {0}")]
    SessionRejected(String),
    #[error("bet of {amount} exceeds the session limit of {limit} per wager")]
    SessionLimit { amount: u64, limit: u64 },
    #[error("no usable session: {0}")]
    SessionUnavailable(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl SubmitError {
    /// Fallback classification of a plain error message.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if message.contains(REWARD_LIMIT_MESSAGE) {
            SubmitError::RewardLimitExceeded
        } else if message.contains(EXECUTION_FAILED_MESSAGE) {
            SubmitError::ExecutionFailed(message.to_string())
        } else if SESSION_MESSAGES.iter().any(|m| lowered.contains(m)) {
            SubmitError::SessionRejected(message.to_string())
        } else {
            SubmitError::Other(message.to_string())
        }
    }

    /// Maps a structured relay error code, falling back to the message text.
    pub fn from_relay(code: Option<&str>, message: &str) -> Self {
        match code {
            Some("REWARD_LIMIT_EXCEEDED") => SubmitError::RewardLimitExceeded,
            Some("EXECUTION_FAILED") => SubmitError::ExecutionFailed(message.to_string()),
            Some("SESSION_REJECTED") => SubmitError::SessionRejected(message.to_string()),
            _ => Self::classify(message),
        }
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            SubmitError::ExecutionFailed(_) | SubmitError::SessionRejected(_) => {
                Remediation::ClearSession
            }
            _ => Remediation::AlertOnly,
        }
    }

    pub fn alert(&self) -> String {
        match self {
            SubmitError::RewardLimitExceeded => "Bet exceeds max reward limit!".to_string(),
            SubmitError::ExecutionFailed(_) => "Contract function execution failed. The session will be cleared and retried. If the issue persists, please stop the game for safety reasons.".to_string(),
            SubmitError::SessionRejected(_) => {
                "The session was rejected. A new session will be created on the next flip."
                    .to_string()
            }
            SubmitError::SessionLimit { limit, .. } => format!(
                "Bets are limited to {} ETH per flip with this session.",
                format_eth(*limit)
            ),
            SubmitError::SessionUnavailable(_) => {
                "Could not create a session. Please try again.".to_string()
            }
            SubmitError::Transport(_) | SubmitError::Other(_) => {
                format!("Flip failed: {self}")
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlipError {
    #[error(transparent)]
    Rejected(#[from] BetRejection),
    #[error(transparent)]
    Failed(#[from] SubmitError),
}

impl FlipError {
    pub fn alert(&self) -> Option<String> {
        match self {
            FlipError::Rejected(rejection) => rejection.alert(),
            FlipError::Failed(error) => Some(error.alert()),
        }
    }
}

/// Checks everything that can be checked without the network.
pub fn check_preconditions(
    request: &BetRequest,
    wallet: &WalletContext,
    flipping: bool,
    options: &[GameOption],
) -> Result<ValidBet, BetRejection> {
    if wallet.owner.is_none() {
        return Err(BetRejection::NoWallet);
    }
    let Some(side) = request.side else {
        return Err(BetRejection::NoSideSelected);
    };
    if flipping {
        return Err(BetRejection::AlreadyFlipping);
    }
    let game_number = request
        .game_number
        .filter(|n| options.iter().any(|o| o.game_number == *n))
        .ok_or(BetRejection::UnsupportedGame)?;
    if request.amount > wallet.balance {
        return Err(BetRejection::InsufficientBalance {
            amount: request.amount,
            balance: wallet.balance,
        });
    }
    Ok(ValidBet {
        side,
        amount: request.amount,
        game_number,
    })
}

/// Digest the session key signs for a wager.
pub fn wager_digest(wager: &SignedWager) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(*wager.owner);
    hasher.update(*wager.session_signer);
    hasher.update(*wager.session_hash);
    hasher.update(*wager.contract);
    hasher.update(wager.selector.0);
    hasher.update(wager.game_number.to_be_bytes());
    hasher.update(wager.amount.to_be_bytes());
    hasher.update(*wager.paymaster);
    Bytes32::new(hasher.finalize().into())
}

/// Builds and signs the wager call, enforcing the session's per-use value limit.
pub fn build_wager(
    credential: &SessionCredential,
    owner: Address,
    contract: ContractId,
    paymaster: ContractId,
    bet: &ValidBet,
) -> Result<SignedWager, SubmitError> {
    let selector = FunctionSelector::of(WAGER_FUNCTION);
    let policy = credential
        .session
        .policy_for(&contract, &selector)
        .ok_or_else(|| {
            SubmitError::SessionRejected("session does not cover the game contract".to_string())
        })?;
    if bet.amount > policy.max_value_per_use {
        return Err(SubmitError::SessionLimit {
            amount: bet.amount,
            limit: policy.max_value_per_use,
        });
    }

    let mut wager = SignedWager {
        owner,
        session_signer: credential.signer_address(),
        session_hash: credential.session_hash(),
        contract,
        selector,
        game_number: bet.game_number,
        amount: bet.amount,
        paymaster,
        signature: String::new(),
    };
    let digest = wager_digest(&wager);
    let signature = credential
        .private_key
        .sign(&*digest)
        .map_err(|err| SubmitError::Other(format!("failed to sign wager: {err}")))?;
    wager.signature = signature_hex(&signature);
    Ok(wager)
}

/// Sends wagers for the connected wallet through the sponsored relay.
pub struct BetSubmitter<'a, C, V> {
    chain: &'a C,
    sessions: &'a SessionManager<V>,
    contract: ContractId,
    paymaster: ContractId,
}

impl<'a, C, V> BetSubmitter<'a, C, V>
where
    C: SessionRegistry + WagerRelay,
    V: SessionVault,
{
    pub fn new(
        chain: &'a C,
        sessions: &'a SessionManager<V>,
        contract: ContractId,
        paymaster: ContractId,
    ) -> Self {
        Self {
            chain,
            sessions,
            contract,
            paymaster,
        }
    }

    /// Validates the request, then drives `machine` through session and submission.
    /// On success the machine waits for the reveal of the returned transaction.
    pub async fn submit_bet(
        &self,
        machine: &mut FlipMachine,
        request: &BetRequest,
        wallet: &WalletContext,
        options: &[GameOption],
    ) -> Result<TxHash, FlipError> {
        let bet = check_preconditions(request, wallet, machine.is_flipping(), options)?;
        machine
            .begin(bet.clone())
            .map_err(|_| BetRejection::AlreadyFlipping)?;

        let credential = match self.sessions.obtain(self.chain).await {
            Ok(credential) => credential,
            Err(err) => {
                let error = SubmitError::SessionUnavailable(format!("{err:#}"));
                return Err(self.failed(machine, error));
            }
        };
        if let Err(err) = machine.session_ready() {
            return Err(self.failed(machine, SubmitError::Other(err.to_string())));
        }

        let wager = match build_wager(
            &credential,
            self.sessions.owner(),
            self.contract,
            self.paymaster,
            &bet,
        ) {
            Ok(wager) => wager,
            Err(error) => return Err(self.failed(machine, error)),
        };

        match self.chain.submit_wager(&wager).await {
            Ok(tx_hash) => {
                info!(
                    tx = %short_hex(*tx_hash),
                    game = bet.game_number,
                    amount = %format_eth(bet.amount),
                    side = %bet.side,
                    "wager submitted"
                );
                if let Err(err) = machine.submitted(tx_hash) {
                    warn!(?err, "flip state changed during submission");
                }
                Ok(tx_hash)
            }
            Err(error) => Err(self.failed(machine, error)),
        }
    }

    fn failed(&self, machine: &mut FlipMachine, error: SubmitError) -> FlipError {
        warn!(%error, "wager failed");
        if error.remediation() == Remediation::ClearSession {
            if let Err(err) = self.sessions.clear() {
                warn!(?err, "failed to clear session after rejected wager");
            }
        }
        if machine.fail(error.clone()).is_err() {
            machine.recover();
        }
        FlipError::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        amount::ONE_ETH,
        config::Network,
        flip::FlipPhase,
        keys::{
            SigningKey,
            verify,
        },
        session::{
            MemoryVault,
            SessionStore,
            SessionTemplate,
        },
        test_helpers::FakeChain,
    };

    const GAME: ContractId = ContractId::new([9u8; 32]);
    const PAYMASTER: ContractId = ContractId::new([8u8; 32]);

    fn sessions() -> SessionManager<MemoryVault> {
        SessionManager::new(
            SessionStore::new(MemoryVault::new()),
            SigningKey::generate(&mut rand::thread_rng()),
            SessionTemplate::for_contract(GAME),
            Network::Testnet,
        )
        .unwrap()
    }

    fn options() -> Vec<GameOption> {
        vec![GameOption {
            game_number: 3,
            coin_count: 2,
            min_heads: 1,
            prize_token_symbol: "WETH".to_string(),
        }]
    }

    fn request(amount: u64) -> BetRequest {
        BetRequest {
            side: Some(Side::Heads),
            amount,
            game_number: Some(3),
        }
    }

    fn wallet(sessions: &SessionManager<MemoryVault>, balance: u64) -> WalletContext {
        WalletContext {
            owner: Some(sessions.owner()),
            balance,
        }
    }

    #[tokio::test]
    async fn submit_bet__amount_over_balance_is_rejected_without_submission() {
        // given
        let chain = FakeChain::new();
        let sessions = sessions();
        let submitter = BetSubmitter::new(&chain, &sessions, GAME, PAYMASTER);
        let mut machine = FlipMachine::new();

        // when
        let result = submitter
            .submit_bet(
                &mut machine,
                &request(2 * ONE_ETH),
                &wallet(&sessions, ONE_ETH),
                &options(),
            )
            .await;

        // then
        let err = result.unwrap_err();
        assert_eq!(
            err.alert().as_deref(),
            Some("Betting amount was over the your balance!")
        );
        assert!(chain.submitted_wagers().is_empty());
        assert_eq!(chain.sessions_created(), 0);
        assert_eq!(machine.phase(), &FlipPhase::Idle);
    }

    #[test]
    fn check_preconditions__reports_first_violation() {
        let wallet = WalletContext {
            owner: Some(Address::new([1u8; 32])),
            balance: ONE_ETH,
        };
        let no_side = BetRequest {
            side: None,
            ..request(1)
        };
        let unknown_game = BetRequest {
            game_number: Some(99),
            ..request(1)
        };

        assert_eq!(
            check_preconditions(&request(1), &WalletContext::default(), false, &options()),
            Err(BetRejection::NoWallet)
        );
        assert_eq!(
            check_preconditions(&no_side, &wallet, false, &options()),
            Err(BetRejection::NoSideSelected)
        );
        assert_eq!(
            check_preconditions(&request(1), &wallet, true, &options()),
            Err(BetRejection::AlreadyFlipping)
        );
        assert_eq!(
            check_preconditions(&unknown_game, &wallet, false, &options()),
            Err(BetRejection::UnsupportedGame)
        );
    }

    #[tokio::test]
    async fn submit_bet__signs_with_session_key_and_awaits_reveal() {
        // given
        let chain = FakeChain::new();
        let sessions = sessions();
        let submitter = BetSubmitter::new(&chain, &sessions, GAME, PAYMASTER);
        let mut machine = FlipMachine::new();

        // when
        let tx_hash = submitter
            .submit_bet(
                &mut machine,
                &request(ONE_ETH / 2),
                &wallet(&sessions, ONE_ETH),
                &options(),
            )
            .await
            .unwrap();

        // then
        let wagers = chain.submitted_wagers();
        assert_eq!(wagers.len(), 1);
        let wager = &wagers[0];
        assert_eq!(wager.paymaster, PAYMASTER);
        assert_eq!(wager.game_number, 3);
        let credential = sessions
            .store()
            .get_stored_session(&sessions.owner())
            .unwrap()
            .unwrap();
        assert_eq!(wager.session_signer, credential.signer_address());
        let signature = crate::encoding::parse_signature(&wager.signature).unwrap();
        let session_public = credential.private_key.public_key().unwrap();
        assert!(verify(&session_public, &*wager_digest(wager), &signature));
        assert_eq!(machine.pending().unwrap().tx_hash, tx_hash);
    }

    #[tokio::test]
    async fn submit_bet__execution_failure_clears_session() {
        // given
        let chain = FakeChain::new();
        chain.fail_next_wager(SubmitError::classify(
            "An unknown error occurred while executing the contract function \"koin_toss\"",
        ));
        let sessions = sessions();
        let submitter = BetSubmitter::new(&chain, &sessions, GAME, PAYMASTER);
        let mut machine = FlipMachine::new();

        // when
        let result = submitter
            .submit_bet(
                &mut machine,
                &request(ONE_ETH / 2),
                &wallet(&sessions, ONE_ETH),
                &options(),
            )
            .await;

        // then
        assert!(matches!(
            result,
            Err(FlipError::Failed(SubmitError::ExecutionFailed(_)))
        ));
        assert_eq!(
            sessions.store().get_stored_session(&sessions.owner()).unwrap(),
            None
        );
        assert!(!machine.is_flipping());
    }

    #[tokio::test]
    async fn submit_bet__reward_limit_keeps_session() {
        // given
        let chain = FakeChain::new();
        chain.fail_next_wager(SubmitError::from_relay(Some("REWARD_LIMIT_EXCEEDED"), "limit"));
        let sessions = sessions();
        let submitter = BetSubmitter::new(&chain, &sessions, GAME, PAYMASTER);
        let mut machine = FlipMachine::new();

        // when
        let err = submitter
            .submit_bet(
                &mut machine,
                &request(ONE_ETH / 2),
                &wallet(&sessions, ONE_ETH),
                &options(),
            )
            .await
            .unwrap_err();

        // then
        assert_eq!(err.alert().as_deref(), Some("Bet exceeds max reward limit!"));
        assert!(
            sessions
                .store()
                .get_stored_session(&sessions.owner())
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn submit_bet__amount_above_session_limit_is_not_sent() {
        // given
        let chain = FakeChain::new();
        let sessions = sessions();
        let submitter = BetSubmitter::new(&chain, &sessions, GAME, PAYMASTER);
        let mut machine = FlipMachine::new();

        // when
        let err = submitter
            .submit_bet(
                &mut machine,
                &request(2 * ONE_ETH),
                &wallet(&sessions, 5 * ONE_ETH),
                &options(),
            )
            .await
            .unwrap_err();

        // then
        assert_eq!(
            err,
            FlipError::Failed(SubmitError::SessionLimit {
                amount: 2 * ONE_ETH,
                limit: ONE_ETH,
            })
        );
        assert!(chain.submitted_wagers().is_empty());
    }

    #[test]
    fn classify__maps_known_messages() {
        assert_eq!(
            SubmitError::classify("execution reverted: Bet exceeds max reward limit"),
            SubmitError::RewardLimitExceeded
        );
        assert_eq!(
            SubmitError::classify("Session is not active").remediation(),
            Remediation::ClearSession
        );
        assert_eq!(
            SubmitError::classify("boom"),
            SubmitError::Other("boom".to_string())
        );
    }
}
