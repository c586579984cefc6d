use anyhow::{
    Context,
    Result,
    anyhow,
};
use fuels::types::ContractId;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};

use crate::encoding::hex32;

pub const CONFIG_ROOT: &str = ".koin-toss";
const NETWORK_FILE: &str = "network.json";
pub const DEFAULT_REWARD_SYMBOL: &str = "WETH";

pub const DEFAULT_MAINNET_GATEWAY_URL: &str = "https://gateway.koin-toss.xyz";
pub const DEFAULT_TESTNET_GATEWAY_URL: &str = "https://testnet.gateway.koin-toss.xyz";
pub const DEFAULT_LOCAL_GATEWAY_URL: &str = "http://127.0.0.1:8545";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Local,
}

impl Network {
    pub fn dir_name(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Local => "local",
        }
    }

    /// Networks on which a session the registry has not seen yet may still sign.
    pub fn is_test_network(self) -> bool {
        matches!(self, Network::Testnet | Network::Local)
    }

    pub fn default_gateway_url(self) -> &'static str {
        match self {
            Network::Mainnet => DEFAULT_MAINNET_GATEWAY_URL,
            Network::Testnet => DEFAULT_TESTNET_GATEWAY_URL,
            Network::Local => DEFAULT_LOCAL_GATEWAY_URL,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "Mainnet",
            Network::Testnet => "Testnet",
            Network::Local => "Local",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "local" => Ok(Network::Local),
            other => Err(anyhow!("unknown network '{other}'")),
        }
    }
}

/// Addresses the client needs for one network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub gateway_url: String,
    #[serde(with = "hex32")]
    pub game_contract: ContractId,
    #[serde(with = "hex32")]
    pub session_validator: ContractId,
    #[serde(with = "hex32")]
    pub paymaster: ContractId,
    #[serde(default = "default_reward_symbol")]
    pub reward_symbol: String,
}

fn default_reward_symbol() -> String {
    DEFAULT_REWARD_SYMBOL.to_string()
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store for `<root>/.koin-toss/<network>/network.json`; creates the directory.
    pub fn new(root: impl AsRef<Path>, network: Network) -> Result<Self> {
        let dir = root.as_ref().join(CONFIG_ROOT).join(network.dir_name());
        if !dir.exists() {
            fs::create_dir_all(&dir).with_context(|| {
                format!("Failed to create {CONFIG_ROOT}/{} directory", network.dir_name())
            })?;
        }
        Ok(Self {
            path: dir.join(NETWORK_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<NetworkConfig>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).context("Failed to read network config")?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let config = serde_json::from_slice(&data).with_context(|| {
            format!("Failed to parse network config {}", self.path.display())
        })?;
        Ok(Some(config))
    }

    pub fn save(&self, config: &NetworkConfig) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(config).context("Failed to serialize network config")?;
        fs::write(&self.path, json).context("Failed to write network config")?;
        Ok(())
    }
}
