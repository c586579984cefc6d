use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use koin_toss::{
    config::{
        CONFIG_ROOT,
        ConfigStore,
        DEFAULT_REWARD_SYMBOL,
        Network,
        NetworkConfig,
    },
    encoding::parse_contract_id,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
};
use tracing_appender::non_blocking::WorkerGuard;

mod client;
mod ui;
mod wallets;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(version, about = "Koin Toss terminal client", long_about = None)]
struct Args {
    /// mainnet, testnet or local
    #[arg(long, default_value = "testnet")]
    network: Network,

    /// Override the gateway URL stored for the network
    #[arg(long)]
    gateway_url: Option<String>,

    /// forc-wallet profile to play with
    #[arg(long)]
    wallet: String,

    /// Override forc-wallet directory (defaults to ~/.fuel/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Root for .koin-toss state (defaults to $HOME)
    #[arg(long)]
    data_dir: Option<String>,

    #[arg(long)]
    log_dir: Option<String>,

    #[arg(long)]
    game_contract: Option<String>,

    #[arg(long)]
    session_validator: Option<String>,

    #[arg(long)]
    paymaster: Option<String>,

    /// Show a static coin row while a flip is pending
    #[arg(long, default_value = "false")]
    no_animation: bool,
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Stored config, with any contract ids or gateway URL from the command line saved over it.
fn resolve_network_config(store: &ConfigStore, args: &Args) -> Result<NetworkConfig> {
    let stored = store.load().map_err(|e| eyre!(e))?;
    let contracts = match (
        &args.game_contract,
        &args.session_validator,
        &args.paymaster,
    ) {
        (Some(game), Some(validator), Some(paymaster)) => Some((
            parse_contract_id(game)
                .map_err(|e| eyre!(e))
                .wrap_err("parsing --game-contract")?,
            parse_contract_id(validator)
                .map_err(|e| eyre!(e))
                .wrap_err("parsing --session-validator")?,
            parse_contract_id(paymaster)
                .map_err(|e| eyre!(e))
                .wrap_err("parsing --paymaster")?,
        )),
        (None, None, None) => None,
        _ => {
            return Err(eyre!(
                "Pass all of --game-contract, --session-validator and --paymaster together"
            ));
        }
    };

    let config = match (contracts, stored) {
        (Some((game_contract, session_validator, paymaster)), stored) => NetworkConfig {
            gateway_url: args
                .gateway_url
                .clone()
                .or_else(|| stored.as_ref().map(|c| c.gateway_url.clone()))
                .unwrap_or_else(|| args.network.default_gateway_url().to_string()),
            game_contract,
            session_validator,
            paymaster,
            reward_symbol: stored
                .map(|c| c.reward_symbol)
                .unwrap_or_else(|| DEFAULT_REWARD_SYMBOL.to_string()),
        },
        (None, Some(mut stored)) => match &args.gateway_url {
            Some(url) if *url != stored.gateway_url => {
                stored.gateway_url = url.clone();
                stored
            }
            _ => return Ok(stored),
        },
        (None, None) => {
            return Err(eyre!(
                "No network config at {}; pass --game-contract, --session-validator and --paymaster",
                store.path().display()
            ));
        }
    };
    store.save(&config).map_err(|e| eyre!(e))?;
    tracing::info!(path = %store.path().display(), "saved network config");
    Ok(config)
}

fn state_dir(store: &ConfigStore) -> Result<PathBuf> {
    store
        .path()
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| eyre!("network config has no parent directory"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    color_eyre::install()?;

    let root = match &args.data_dir {
        Some(raw) => expand(raw),
        None => expand("~"),
    };
    let log_dir = match &args.log_dir {
        Some(raw) => expand(raw),
        None => root.join(CONFIG_ROOT).join("logs"),
    };
    fs::create_dir_all(&log_dir).wrap_err("Failed to create log directory")?;
    let _ = LOG_GUARD.set(client::init_tracing(&log_dir));
    tracing::info!(network = %args.network, "starting koin-toss client");

    let store = ConfigStore::new(&root, args.network).map_err(|e| eyre!(e))?;
    let network_config = resolve_network_config(&store, &args)?;

    let wallet_dir = wallets::resolve_wallet_dir(args.wallet_dir.as_deref())?;
    let descriptor = wallets::find_wallet(&wallet_dir, &args.wallet)?;
    let owner_key = wallets::unlock_wallet(&descriptor)?;

    let config = client::AppConfig {
        network: args.network,
        network_config,
        owner_key,
        state_dir: state_dir(&store)?,
        animation: !args.no_animation,
    };
    client::run_app(config).await
}
