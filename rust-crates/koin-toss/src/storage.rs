// Byte-oriented key-value storage for locally cached data.
use anyhow::{
    Context,
    Result,
    anyhow,
};
use sled::{
    Config,
    Db,
    Tree,
};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        Mutex,
    },
};

const CACHE_TREE: &str = "local_storage";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SledStore {
    tree: Tree,
}

impl SledStore {
    pub fn new(db: &Db) -> Result<Self> {
        let tree = db
            .open_tree(CACHE_TREE)
            .context("open local_storage tree")?;
        Ok(Self { tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::default().path(path);
        let db = config.open().context("open sled database")?;
        Self::new(&db)
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .tree
            .get(key)
            .with_context(|| format!("read {key}"))?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.tree
            .insert(key, value)
            .with_context(|| format!("write {key}"))?;
        self.tree.flush().with_context(|| format!("flush {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.tree
            .remove(key)
            .with_context(|| format!("remove {key}"))?;
        self.tree.flush().with_context(|| format!("flush {key}"))?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Arc<Mutex<HashMap<String, Vec<u8>>>> {
        self.entries.clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.entries.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        guard.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }
}
