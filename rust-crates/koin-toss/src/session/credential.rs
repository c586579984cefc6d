use anyhow::Result;
use chrono::{
    DateTime,
    TimeDelta,
    Utc,
};
use fuels::types::{
    Address,
    Bytes32,
    ContractId,
};
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};

use crate::{
    amount::ONE_ETH,
    encoding::hex32,
    keys::SigningKey,
};

/// Contract function the session key is allowed to call.
pub const WAGER_FUNCTION: &str = "koin_toss(u64)";

const SESSION_TTL_HOURS: i64 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Unlimited,
    Lifetime,
    Allowance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimit {
    pub limit_type: LimitType,
    pub limit: u64,
    pub period_secs: u64,
}

impl UsageLimit {
    pub fn lifetime(limit: u64) -> Self {
        Self {
            limit_type: LimitType::Lifetime,
            limit,
            period_secs: 0,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            limit_type: LimitType::Unlimited,
            limit: 0,
            period_secs: 0,
        }
    }

    fn hash_into(&self, hasher: &mut Sha256) {
        let tag: u8 = match self.limit_type {
            LimitType::Unlimited => 0,
            LimitType::Lifetime => 1,
            LimitType::Allowance => 2,
        };
        hasher.update([tag]);
        hasher.update(self.limit.to_be_bytes());
        hasher.update(self.period_secs.to_be_bytes());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionSelector(pub [u8; 4]);

impl FunctionSelector {
    pub fn of(signature: &str) -> Self {
        let digest = Sha256::digest(signature.as_bytes());
        Self([digest[0], digest[1], digest[2], digest[3]])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPolicy {
    #[serde(with = "hex32")]
    pub target: ContractId,
    pub selector: FunctionSelector,
    pub value_limit: UsageLimit,
    pub max_value_per_use: u64,
}

/// Public half of a session: what the wallet owner authorizes and the registry stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    #[serde(with = "hex32")]
    pub signer: Address,
    /// Unix seconds.
    pub expires_at: i64,
    pub fee_limit: UsageLimit,
    pub call_policies: Vec<CallPolicy>,
}

impl SessionDescriptor {
    /// SHA-256 over a fixed field-by-field encoding; the registry indexes sessions by it.
    pub fn session_hash(&self) -> Bytes32 {
        let mut hasher = Sha256::new();
        hasher.update(*self.signer);
        hasher.update(self.expires_at.to_be_bytes());
        self.fee_limit.hash_into(&mut hasher);
        hasher.update((self.call_policies.len() as u64).to_be_bytes());
        for policy in &self.call_policies {
            hasher.update(*policy.target);
            hasher.update(policy.selector.0);
            policy.value_limit.hash_into(&mut hasher);
            hasher.update(policy.max_value_per_use.to_be_bytes());
        }
        Bytes32::new(hasher.finalize().into())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }

    pub fn policy_for(
        &self,
        target: &ContractId,
        selector: &FunctionSelector,
    ) -> Option<&CallPolicy> {
        self.call_policies
            .iter()
            .find(|policy| policy.target == *target && policy.selector == *selector)
    }
}

/// Session descriptor plus the session private key, as persisted per wallet address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub session: SessionDescriptor,
    pub private_key: SigningKey,
}

impl SessionCredential {
    pub fn new(session: SessionDescriptor, private_key: SigningKey) -> Self {
        Self {
            session,
            private_key,
        }
    }

    pub fn signer_address(&self) -> Address {
        self.session.signer
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.session.expires_at, 0)
    }

    pub fn session_hash(&self) -> Bytes32 {
        self.session.session_hash()
    }

    pub fn spend_limits(&self) -> (UsageLimit, &[CallPolicy]) {
        (self.session.fee_limit, &self.session.call_policies)
    }
}

/// Parameters applied to every session this client creates.
#[derive(Clone, Debug)]
pub struct SessionTemplate {
    pub game_contract: ContractId,
    pub ttl: TimeDelta,
    pub fee_limit: u64,
    pub max_value_per_use: u64,
}

impl SessionTemplate {
    pub fn for_contract(game_contract: ContractId) -> Self {
        Self {
            game_contract,
            ttl: TimeDelta::hours(SESSION_TTL_HOURS),
            fee_limit: ONE_ETH,
            max_value_per_use: ONE_ETH,
        }
    }

    pub fn descriptor(&self, signer: Address, now: DateTime<Utc>) -> SessionDescriptor {
        SessionDescriptor {
            signer,
            expires_at: (now + self.ttl).timestamp(),
            fee_limit: UsageLimit::lifetime(self.fee_limit),
            call_policies: vec![CallPolicy {
                target: self.game_contract,
                selector: FunctionSelector::of(WAGER_FUNCTION),
                value_limit: UsageLimit::unlimited(),
                max_value_per_use: self.max_value_per_use,
            }],
        }
    }
}

pub fn generate_credential_key() -> Result<(SigningKey, Address)> {
    let key = SigningKey::generate(&mut rand::thread_rng());
    let signer = key.address()?;
    Ok((key, signer))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn template() -> SessionTemplate {
        SessionTemplate::for_contract(ContractId::new([9u8; 32]))
    }

    #[test]
    fn descriptor__expires_one_ttl_after_creation() {
        // given
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        // when
        let descriptor = template().descriptor(Address::new([1u8; 32]), now);

        // then
        assert_eq!(descriptor.expires_at, 1_700_000_000 + 24 * 60 * 60);
        assert!(!descriptor.is_expired_at(now));
        assert!(descriptor.is_expired_at(now + TimeDelta::hours(24)));
    }

    #[test]
    fn descriptor__scopes_single_wager_selector_on_game_contract() {
        let now = Utc::now();
        let descriptor = template().descriptor(Address::new([1u8; 32]), now);

        let policy = descriptor
            .policy_for(
                &ContractId::new([9u8; 32]),
                &FunctionSelector::of(WAGER_FUNCTION),
            )
            .expect("wager policy present");
        assert_eq!(policy.max_value_per_use, ONE_ETH);
        assert!(
            descriptor
                .policy_for(&ContractId::new([8u8; 32]), &policy.selector)
                .is_none()
        );
    }

    #[test]
    fn session_hash__changes_with_descriptor_contents() {
        let now = Utc::now();
        let a = template().descriptor(Address::new([1u8; 32]), now);
        let b = template().descriptor(Address::new([2u8; 32]), now);

        assert_eq!(a.session_hash(), a.clone().session_hash());
        assert_ne!(a.session_hash(), b.session_hash());
    }

    #[test]
    fn session_hash__covers_call_policy_limits() {
        // given
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let original = template().descriptor(Address::new([1u8; 32]), now);
        let mut raised = original.clone();
        raised.call_policies[0].max_value_per_use += 1;

        // when
        let original_hash = original.session_hash();
        let raised_hash = raised.session_hash();

        // then
        assert_ne!(original_hash, raised_hash);
    }
}
