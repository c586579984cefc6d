//! HTTP JSON gateway in front of the game contract, the session registry and the
//! sponsored wager relay.
use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::{
    DateTime,
    Utc,
};
use fuels::types::{
    Address,
    Bytes32,
    ContractId,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use tracing::{
    debug,
    trace,
};

use crate::{
    bet::SubmitError,
    chain::{
        BetCommitted,
        BetRevealed,
        ChainWatcher,
        GameContract,
        GameLog,
        SessionGrant,
        SessionRegistry,
        SignedWager,
        WagerRelay,
    },
    encoding::{
        address_hex,
        hex32,
        parse_bytes32,
        to_hex,
    },
    session::SessionDescriptor,
    types::{
        BetLimits,
        GameConfig,
        PrizePool,
        SessionStatus,
        Side,
        TxHash,
    },
};

#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    session_validator: ContractId,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, session_validator: ContractId) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client for gateway")?;
        Ok(Self {
            base_url,
            session_validator,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        trace!(%url, "gateway GET");
        let res = self
            .http
            .get(&url)
            .send()
            .await
            .context("gateway request failed")?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .context("failed to read gateway response body")?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(anyhow!("gateway responded with {status} for {path}: {body}"));
        }
        serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid gateway payload for {path}"))
    }
}

impl GameContract for GatewayClient {
    async fn game_count(&self) -> Result<u32> {
        let dto: GameCountDto = self.get_json("/games/count").await?;
        Ok(dto.count)
    }

    async fn game_config(&self, game_number: u32) -> Result<GameConfig> {
        let dto: GameConfigDto = self.get_json(&format!("/games/{game_number}")).await?;
        Ok(dto.into())
    }

    async fn prize_pool(&self, pool_id: u32) -> Result<PrizePool> {
        let dto: PrizePoolDto = self.get_json(&format!("/prize-pools/{pool_id}")).await?;
        Ok(dto.into())
    }

    async fn bet_limits(&self, game_number: u32) -> Result<BetLimits> {
        let dto: BetLimitsDto = self
            .get_json(&format!("/games/{game_number}/limits"))
            .await?;
        Ok(BetLimits {
            min: dto.min,
            max: dto.max,
        })
    }

    async fn payout_estimate(&self, game_number: u32, amount: u64) -> Result<u64> {
        let dto: PayoutDto = self
            .get_json(&format!("/games/{game_number}/payout?amount={amount}"))
            .await?;
        Ok(dto.payout)
    }
}

impl SessionRegistry for GatewayClient {
    async fn session_status(
        &self,
        owner: &Address,
        session_hash: &Bytes32,
    ) -> Result<SessionStatus> {
        let path = format!(
            "/sessions/{}/{}/status",
            address_hex(owner),
            to_hex(**session_hash)
        );
        let dto: SessionStatusDto = self.get_json(&path).await?;
        SessionStatus::try_from(dto.status)
    }

    async fn create_session(&self, grant: &SessionGrant) -> Result<SessionDescriptor> {
        let url = format!("{}/sessions", self.base_url);
        let body = CreateSessionRequest {
            validator: self.session_validator,
            grant,
        };
        let res = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .context("gateway request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(anyhow!(
                "gateway responded with {status} when creating a session: {body}"
            ));
        }
        res.json()
            .await
            .context("invalid gateway session payload")
    }
}

impl WagerRelay for GatewayClient {
    async fn submit_wager(&self, wager: &SignedWager) -> Result<TxHash, SubmitError> {
        let url = format!("{}/wagers", self.base_url);
        let res = self
            .http
            .post(url)
            .json(wager)
            .send()
            .await
            .map_err(|err| SubmitError::Transport(err.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|err| SubmitError::Transport(err.to_string()))?;
        decode_wager_response(status, &bytes)
    }
}

impl ChainWatcher for GatewayClient {
    async fn latest_block(&self) -> Result<u64> {
        let dto: LatestBlockDto = self.get_json("/blocks/latest").await?;
        Ok(dto.height)
    }

    async fn game_logs(&self, from: u64, to: u64) -> Result<Vec<GameLog>> {
        let dtos: Vec<GameLogDto> = self
            .get_json(&format!("/logs?from={from}&to={to}"))
            .await?;
        debug!(from, to, count = dtos.len(), "gateway logs");
        Ok(dtos.into_iter().map(Into::into).collect())
    }

    async fn balance(&self, owner: &Address) -> Result<u64> {
        let dto: BalanceDto = self
            .get_json(&format!("/accounts/{}/balance", address_hex(owner)))
            .await?;
        Ok(dto.balance)
    }
}

fn decode_wager_response(status: StatusCode, bytes: &[u8]) -> Result<TxHash, SubmitError> {
    if status.is_success() {
        let dto: WagerResponseDto = serde_json::from_slice(bytes)
            .map_err(|err| SubmitError::Other(format!("invalid wager response: {err}")))?;
        return parse_bytes32(&dto.tx_hash)
            .map_err(|err| SubmitError::Other(format!("invalid wager tx hash: {err}")));
    }
    match serde_json::from_slice::<RelayErrorDto>(bytes) {
        Ok(err) => Err(SubmitError::from_relay(err.code.as_deref(), &err.message)),
        Err(_) => {
            let body = String::from_utf8_lossy(bytes);
            if status.is_server_error() && body.trim().is_empty() {
                Err(SubmitError::Transport(format!("relay responded with {status}")))
            } else {
                Err(SubmitError::classify(&body))
            }
        }
    }
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    #[serde(with = "hex32")]
    validator: ContractId,
    #[serde(flatten)]
    grant: &'a SessionGrant,
}

#[derive(Deserialize)]
struct GameCountDto {
    count: u32,
}

#[derive(Deserialize)]
struct GameConfigDto {
    game_number: u32,
    coin_count: u8,
    min_heads: u8,
    win_chance_ppm: u32,
    active: bool,
    prize_pool_id: u32,
}

impl From<GameConfigDto> for GameConfig {
    fn from(dto: GameConfigDto) -> Self {
        GameConfig {
            game_number: dto.game_number,
            coin_count: dto.coin_count,
            min_heads: dto.min_heads,
            win_chance_ppm: dto.win_chance_ppm,
            active: dto.active,
            prize_pool_id: dto.prize_pool_id,
        }
    }
}

#[derive(Deserialize)]
struct PrizePoolDto {
    pool_id: u32,
    token_symbol: String,
}

impl From<PrizePoolDto> for PrizePool {
    fn from(dto: PrizePoolDto) -> Self {
        PrizePool {
            pool_id: dto.pool_id,
            token_symbol: dto.token_symbol,
        }
    }
}

#[derive(Deserialize)]
struct BetLimitsDto {
    min: u64,
    max: u64,
}

#[derive(Deserialize)]
struct PayoutDto {
    payout: u64,
}

#[derive(Deserialize)]
struct BalanceDto {
    balance: u64,
}

#[derive(Deserialize)]
struct SessionStatusDto {
    status: u8,
}

#[derive(Deserialize)]
struct LatestBlockDto {
    height: u64,
}

#[derive(Deserialize)]
struct WagerResponseDto {
    tx_hash: String,
}

#[derive(Deserialize)]
struct RelayErrorDto {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Deserialize)]
#[serde(tag = "event")]
enum GameLogDto {
    BetCommitted {
        request_id: u64,
        #[serde(with = "hex32")]
        player: Address,
        bet_amount: u64,
        selected_side: Side,
        coin_count: u8,
        min_heads: u8,
        block: u64,
        #[serde(with = "hex32")]
        tx_hash: Bytes32,
    },
    BetRevealed {
        request_id: u64,
        did_win: bool,
        payout: u64,
        block_timestamp: DateTime<Utc>,
        #[serde(with = "hex32")]
        tx_hash: Bytes32,
    },
}

impl From<GameLogDto> for GameLog {
    fn from(dto: GameLogDto) -> Self {
        match dto {
            GameLogDto::BetCommitted {
                request_id,
                player,
                bet_amount,
                selected_side,
                coin_count,
                min_heads,
                block,
                tx_hash,
            } => GameLog::Committed(BetCommitted {
                request_id,
                player,
                bet_amount,
                selected_side,
                coin_count,
                min_heads,
                block,
                tx_hash,
            }),
            GameLogDto::BetRevealed {
                request_id,
                did_win,
                payout,
                block_timestamp,
                tx_hash,
            } => GameLog::Revealed(BetRevealed {
                request_id,
                did_win,
                payout,
                block_timestamp,
                tx_hash,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn decode_wager_response__returns_tx_hash_on_success() {
        let body = format!(r#"{{"tx_hash":"{}"}}"#, to_hex([4u8; 32]));
        let tx = decode_wager_response(StatusCode::OK, body.as_bytes()).unwrap();
        assert_eq!(tx, Bytes32::new([4u8; 32]));
    }

    #[test]
    fn decode_wager_response__maps_structured_relay_errors() {
        let body = br#"{"code":"EXECUTION_FAILED","message":"reverted"}"#;
        let err = decode_wager_response(StatusCode::UNPROCESSABLE_ENTITY, body).unwrap_err();
        assert_eq!(err, SubmitError::ExecutionFailed("reverted".to_string()));
    }

    #[test]
    fn decode_wager_response__classifies_plain_text_errors() {
        let body = b"execution reverted: Bet exceeds max reward limit";
        let err = decode_wager_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert_eq!(err, SubmitError::RewardLimitExceeded);

        let err = decode_wager_response(StatusCode::BAD_GATEWAY, b"").unwrap_err();
        assert!(matches!(err, SubmitError::Transport(_)));
    }

    #[test]
    fn game_log_dto__decodes_tagged_events() {
        // given
        let json = format!(
            r#"[
                {{"event":"BetCommitted","request_id":9,"player":"{player}","bet_amount":100,
                  "selected_side":"TAILS","coin_count":3,"min_heads":2,"block":77,"tx_hash":"{commit}"}},
                {{"event":"BetRevealed","request_id":9,"did_win":true,"payout":250,
                  "block_timestamp":"2024-05-01T12:00:00Z","tx_hash":"{reveal}"}}
            ]"#,
            player = to_hex([1u8; 32]),
            commit = to_hex([2u8; 32]),
            reveal = to_hex([3u8; 32]),
        );

        // when
        let dtos: Vec<GameLogDto> = serde_json::from_str(&json).unwrap();
        let logs: Vec<GameLog> = dtos.into_iter().map(Into::into).collect();

        // then
        let GameLog::Committed(commit) = &logs[0] else {
            panic!("expected commit first");
        };
        assert_eq!(commit.selected_side, Side::Tails);
        assert_eq!(commit.player, Address::new([1u8; 32]));
        let GameLog::Revealed(reveal) = &logs[1] else {
            panic!("expected reveal second");
        };
        assert!(reveal.did_win);
        assert_eq!(reveal.tx_hash, Bytes32::new([3u8; 32]));
    }

    #[test]
    fn create_session_request__flattens_grant_fields() {
        // given
        let grant = SessionGrant {
            owner: Address::new([1u8; 32]),
            session: crate::session::SessionTemplate::for_contract(ContractId::new([2u8; 32]))
                .descriptor(Address::new([3u8; 32]), Utc::now()),
            session_hash: Bytes32::new([4u8; 32]),
            owner_signature: "0xsig".to_string(),
        };
        let request = CreateSessionRequest {
            validator: ContractId::new([5u8; 32]),
            grant: &grant,
        };

        // when
        let json = serde_json::to_value(&request).unwrap();

        // then
        assert_eq!(json["validator"], to_hex([5u8; 32]));
        assert_eq!(json["owner"], to_hex([1u8; 32]));
        assert_eq!(json["owner_signature"], "0xsig");
    }
}
