// Encrypt/decrypt boundary for persisted session credentials.
use anyhow::{
    Context,
    Result,
    anyhow,
};
use eth_keystore::{
    decrypt_key,
    encrypt_key,
};
use fuels::types::Address;
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::HashMap,
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
    },
};

use crate::encoding::address_hex;

const STORAGE_KEY_DOMAIN: &str = "koin-toss/session-slot/";
const PASSWORD_DOMAIN: &str = "koin-toss/session-key/";

/// Persists sealed session bytes, one slot per wallet address.
pub trait SessionVault {
    /// Returns the decrypted bytes stored for `owner`, if any.
    fn load(&self, owner: &Address) -> Result<Option<Vec<u8>>>;

    /// Encrypts and writes `plaintext`, replacing whatever the slot held.
    fn save(&self, owner: &Address, plaintext: &[u8]) -> Result<()>;

    fn remove(&self, owner: &Address) -> Result<()>;
}

/// Name of the storage slot for `owner`; does not reveal the address.
pub fn storage_key(owner: &Address) -> String {
    let mut hasher = Sha256::new();
    hasher.update(STORAGE_KEY_DOMAIN);
    hasher.update(address_hex(owner));
    format!("{:x}", hasher.finalize())
}

fn encryption_password(owner: &Address) -> String {
    let mut hasher = Sha256::new();
    hasher.update(PASSWORD_DOMAIN);
    hasher.update(address_hex(owner));
    format!("{:x}", hasher.finalize())
}

/// Keeps each session as an Ethereum keystore file in a directory.
#[derive(Clone, Debug)]
pub struct KeystoreVault {
    dir: PathBuf,
}

impl KeystoreVault {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).with_context(|| {
                format!("Failed to create session directory {}", dir.display())
            })?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, owner: &Address) -> PathBuf {
        self.dir.join(storage_key(owner))
    }
}

impl SessionVault for KeystoreVault {
    fn load(&self, owner: &Address) -> Result<Option<Vec<u8>>> {
        let path = self.slot_path(owner);
        if !path.exists() {
            return Ok(None);
        }
        let plaintext = decrypt_key(&path, encryption_password(owner)).map_err(|err| {
            anyhow!("Failed to decrypt session slot {}: {err}", path.display())
        })?;
        Ok(Some(plaintext))
    }

    fn save(&self, owner: &Address, plaintext: &[u8]) -> Result<()> {
        let name = storage_key(owner);
        encrypt_key(
            &self.dir,
            &mut rand::thread_rng(),
            plaintext,
            encryption_password(owner),
            Some(&name),
        )
        .map_err(|err| anyhow!("Failed to encrypt session slot {name}: {err}"))?;
        Ok(())
    }

    fn remove(&self, owner: &Address) -> Result<()> {
        let path = self.slot_path(owner);
        if path.exists() {
            fs::remove_file(&path).with_context(|| {
                format!("Failed to remove session slot {}", path.display())
            })?;
        }
        Ok(())
    }
}

/// Unencrypted in-memory slots.
#[derive(Clone, Default)]
pub struct MemoryVault {
    slots: Arc<Mutex<HashMap<Address, Vec<u8>>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> Arc<Mutex<HashMap<Address, Vec<u8>>>> {
        self.slots.clone()
    }
}

impl SessionVault for MemoryVault {
    fn load(&self, owner: &Address) -> Result<Option<Vec<u8>>> {
        let guard = self.slots.lock().map_err(|_| anyhow!("vault lock poisoned"))?;
        Ok(guard.get(owner).cloned())
    }

    fn save(&self, owner: &Address, plaintext: &[u8]) -> Result<()> {
        let mut guard = self.slots.lock().map_err(|_| anyhow!("vault lock poisoned"))?;
        guard.insert(*owner, plaintext.to_vec());
        Ok(())
    }

    fn remove(&self, owner: &Address) -> Result<()> {
        let mut guard = self.slots.lock().map_err(|_| anyhow!("vault lock poisoned"))?;
        guard.remove(owner);
        Ok(())
    }
}
