use anyhow::{
    Context,
    Result,
    anyhow,
    bail,
};
use chrono::Utc;
use fuels::types::{
    Address,
    Bytes32,
};
use tracing::{
    error,
    info,
    warn,
};

use crate::{
    chain::{
        SessionGrant,
        SessionRegistry,
    },
    config::Network,
    encoding::short_hex,
    keys::{
        SigningKey,
        signature_hex,
    },
    session::{
        credential::{
            SessionCredential,
            SessionTemplate,
            generate_credential_key,
        },
        store::SessionStore,
        vault::SessionVault,
    },
    types::SessionStatus,
};

/// Session lifecycle for the connected wallet: create, validate, renew.
pub struct SessionManager<V> {
    store: SessionStore<V>,
    owner_key: SigningKey,
    owner: Address,
    template: SessionTemplate,
    network: Network,
}

impl<V: SessionVault> SessionManager<V> {
    pub fn new(
        store: SessionStore<V>,
        owner_key: SigningKey,
        template: SessionTemplate,
        network: Network,
    ) -> Result<Self> {
        let owner = owner_key.address()?;
        Ok(Self {
            store,
            owner_key,
            owner,
            template,
            network,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn store(&self) -> &SessionStore<V> {
        &self.store
    }

    /// Whether `status` allows the session to keep signing on this network.
    pub fn accepts(&self, status: SessionStatus) -> bool {
        status == SessionStatus::Active
            || (self.network.is_test_network() && status == SessionStatus::NotInitialized)
    }

    /// Checks the on-chain status of `session_hash`. An inactive session is cleared and
    /// replaced right away; read failures are logged and reported as invalid.
    pub async fn validate<R: SessionRegistry>(
        &self,
        registry: &R,
        owner: &Address,
        session_hash: &Bytes32,
    ) -> bool {
        match self.check_status(registry, owner, session_hash).await {
            Ok(valid) => valid,
            Err(err) => {
                warn!(?err, owner = %short_hex(**owner), "failed to validate session");
                false
            }
        }
    }

    /// `Ok(false)` means the session was inactive and a renewal was attempted;
    /// `Err` means the status could not be read and nothing changed.
    async fn check_status<R: SessionRegistry>(
        &self,
        registry: &R,
        owner: &Address,
        session_hash: &Bytes32,
    ) -> Result<bool> {
        let status = registry
            .session_status(owner, session_hash)
            .await
            .context("Failed to read session status")?;

        let valid = self.accepts(status);
        if !valid {
            info!(?status, owner = %short_hex(**owner), "session no longer usable; renewing");
            if let Err(err) = self.store.clear_session(owner) {
                warn!(?err, "failed to clear invalid session");
            }
            if *owner == self.owner {
                if let Err(err) = self.create_and_store(registry).await {
                    error!(?err, "failed to create replacement session");
                }
            } else {
                warn!(
                    owner = %short_hex(**owner),
                    "cannot renew a session for a wallet that is not connected"
                );
            }
        }
        Ok(valid)
    }

    /// Generates a session key, has the owner wallet authorize it, and stores it.
    pub async fn create_and_store<R: SessionRegistry>(
        &self,
        registry: &R,
    ) -> Result<SessionCredential> {
        info!(owner = %short_hex(*self.owner), "creating session");
        let (key, signer) = generate_credential_key()?;
        let descriptor = self.template.descriptor(signer, Utc::now());
        let session_hash = descriptor.session_hash();
        let owner_signature = self.owner_key.sign(&*session_hash)?;
        let grant = SessionGrant {
            owner: self.owner,
            session: descriptor,
            session_hash,
            owner_signature: signature_hex(&owner_signature),
        };

        let registered = registry
            .create_session(&grant)
            .await
            .context("Session creation failed")?;
        if registered.signer != signer {
            bail!(
                "registry returned a session for signer {} instead of {}",
                short_hex(*registered.signer),
                short_hex(*signer)
            );
        }

        let credential = SessionCredential::new(registered, key);
        self.store.store_session(&self.owner, &credential)?;
        Ok(credential)
    }

    /// A credential usable for the next wager: the stored one if it validates,
    /// otherwise a freshly created one. Fails when the status cannot be read.
    pub async fn obtain<R: SessionRegistry>(
        &self,
        registry: &R,
    ) -> Result<SessionCredential> {
        let owner = self.owner;
        let Some(stored) = self.store.get_stored_session(&owner)? else {
            return self.create_and_store(registry).await;
        };
        if self
            .check_status(registry, &owner, &stored.session_hash())
            .await?
        {
            return Ok(stored);
        }
        self.store
            .get_stored_session(&owner)?
            .ok_or_else(|| anyhow!("session could not be renewed"))
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear_session(&self.owner)
    }
}
