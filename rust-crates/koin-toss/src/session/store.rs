use anyhow::{
    Context,
    Result,
};
use chrono::{
    DateTime,
    Utc,
};
use fuels::types::Address;
use tracing::{
    debug,
    warn,
};

use crate::{
    encoding::short_hex,
    session::{
        credential::SessionCredential,
        vault::SessionVault,
    },
};

/// Session credentials per wallet address, JSON-encoded on top of a [`SessionVault`].
#[derive(Clone, Debug)]
pub struct SessionStore<V> {
    vault: V,
}

impl<V: SessionVault> SessionStore<V> {
    pub fn new(vault: V) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// Stored credential for `owner`, or `None` when absent, unreadable, or expired.
    pub fn get_stored_session(&self, owner: &Address) -> Result<Option<SessionCredential>> {
        self.get_stored_session_at(owner, Utc::now())
    }

    pub fn get_stored_session_at(
        &self,
        owner: &Address,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionCredential>> {
        let credential = match self.vault.load(owner).and_then(|bytes| {
            bytes.map(|bytes| decode(&bytes)).transpose()
        }) {
            Ok(Some(credential)) => credential,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!(?err, owner = %short_hex(**owner), "discarding unreadable session");
                self.vault.remove(owner)?;
                return Ok(None);
            }
        };
        if credential.session.is_expired_at(now) {
            debug!(owner = %short_hex(**owner), "stored session expired");
            self.vault.remove(owner)?;
            return Ok(None);
        }
        Ok(Some(credential))
    }

    pub fn store_session(&self, owner: &Address, credential: &SessionCredential) -> Result<()> {
        let bytes = encode(credential)?;
        self.vault.save(owner, &bytes)
    }

    pub fn clear_session(&self, owner: &Address) -> Result<()> {
        debug!(owner = %short_hex(**owner), "clearing stored session");
        self.vault.remove(owner)
    }
}

pub fn encode(credential: &SessionCredential) -> Result<Vec<u8>> {
    serde_json::to_vec(credential).context("serialize session credential")
}

pub fn decode(bytes: &[u8]) -> Result<SessionCredential> {
    serde_json::from_slice(bytes).context("deserialize session credential")
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        keys::SigningKey,
        session::{
            credential::SessionTemplate,
            vault::{
                KeystoreVault,
                MemoryVault,
                storage_key,
            },
        },
    };
    use chrono::TimeDelta;
    use fuels::types::ContractId;
    use proptest::prelude::*;
    use tempdir::TempDir;

    fn credential_at(now: DateTime<Utc>) -> SessionCredential {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let template = SessionTemplate::for_contract(ContractId::new([5u8; 32]));
        let descriptor = template.descriptor(key.address().unwrap(), now);
        SessionCredential::new(descriptor, key)
    }

    proptest! {
        #[test]
        fn store_then_get__returns_the_stored_credential(owner_bytes in any::<[u8; 32]>()) {
            // given
            let store = SessionStore::new(MemoryVault::new());
            let owner = Address::new(owner_bytes);
            let credential = credential_at(Utc::now());

            // when
            store.store_session(&owner, &credential).unwrap();
            let loaded = store.get_stored_session(&owner).unwrap();

            // then
            prop_assert_eq!(loaded, Some(credential));
        }

        #[test]
        fn clear_then_get__returns_none(owner_bytes in any::<[u8; 32]>()) {
            // given
            let store = SessionStore::new(MemoryVault::new());
            let owner = Address::new(owner_bytes);
            store.store_session(&owner, &credential_at(Utc::now())).unwrap();

            // when
            store.clear_session(&owner).unwrap();

            // then
            prop_assert_eq!(store.get_stored_session(&owner).unwrap(), None);
        }
    }

    #[test]
    fn get_stored_session__drops_expired_credentials() {
        // given
        let vault = MemoryVault::new();
        let store = SessionStore::new(vault.clone());
        let owner = Address::new([4u8; 32]);
        let created = Utc::now() - TimeDelta::hours(25);
        store.store_session(&owner, &credential_at(created)).unwrap();

        // when
        let loaded = store.get_stored_session(&owner).unwrap();

        // then
        assert_eq!(loaded, None);
        assert!(vault.slots().lock().unwrap().is_empty());
    }

    #[test]
    fn get_stored_session__discards_corrupt_slot() {
        // given
        let vault = MemoryVault::new();
        let owner = Address::new([6u8; 32]);
        vault.save(&owner, b"not json").unwrap();
        let store = SessionStore::new(vault.clone());

        // when
        let loaded = store.get_stored_session(&owner).unwrap();

        // then
        assert_eq!(loaded, None);
        assert!(vault.load(&owner).unwrap().is_none());
    }

    #[test]
    fn get_stored_session__discards_undecryptable_keystore_slot() {
        // given
        let tmp = TempDir::new("koin-toss-store").unwrap();
        let vault = KeystoreVault::open(tmp.path()).unwrap();
        let owner = Address::new([7u8; 32]);
        let slot = vault.dir().join(storage_key(&owner));
        std::fs::write(&slot, b"garbage").unwrap();
        let store = SessionStore::new(vault);

        // when
        let loaded = store.get_stored_session(&owner).unwrap();

        // then
        assert_eq!(loaded, None);
        assert!(!slot.exists());
    }

    #[test]
    fn clear_session__leaves_other_addresses_untouched() {
        // given
        let store = SessionStore::new(MemoryVault::new());
        let alice = Address::new([1u8; 32]);
        let bob = Address::new([2u8; 32]);
        let bobs = credential_at(Utc::now());
        store.store_session(&alice, &credential_at(Utc::now())).unwrap();
        store.store_session(&bob, &bobs).unwrap();

        // when
        store.clear_session(&alice).unwrap();

        // then
        assert_eq!(store.get_stored_session(&alice).unwrap(), None);
        assert_eq!(store.get_stored_session(&bob).unwrap(), Some(bobs));
    }
}
