mod config;

pub use config::{DEFAULT_ADDRESS, StoreConfig};

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::retry::update_with;
use crate::storage::StateStore;
use crate::storage::redis_store::RedisStateStore;

#[derive(Parser, Debug)]
#[command(name = "flowstate", version, about = "Inspect and edit per-request workflow state in Redis")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    pub dotenv: Option<PathBuf>,

    /// Path to a config file (default: auto-detect flowstate.yaml in cwd)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Redis address, overrides config and FLOWSTATE_ADDRESS
    #[arg(long, global = true)]
    pub address: Option<String>,

    /// Key prefix, overrides config and FLOWSTATE_PREFIX
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flow name and request id selecting one namespace.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Flow name
    pub flow: String,
    /// Request id
    pub request: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the backend answers
    Ping,

    /// Print a value
    Get {
        #[command(flatten)]
        target: RequestArgs,
        key: String,

        /// Output format (plain, json)
        #[arg(long, default_value = "plain")]
        format: String,
    },

    /// Create or overwrite a value
    Set {
        #[command(flatten)]
        target: RequestArgs,
        key: String,
        value: String,
    },

    /// Replace a value only if it still equals OLD
    Update {
        #[command(flatten)]
        target: RequestArgs,
        key: String,
        old: String,
        new: String,
    },

    /// Append a suffix using a compare-and-swap retry loop
    Append {
        #[command(flatten)]
        target: RequestArgs,
        key: String,
        suffix: String,
    },

    /// Add to an integer value
    Incr {
        #[command(flatten)]
        target: RequestArgs,
        key: String,

        /// Amount to add (may be negative)
        #[arg(long, default_value = "1", allow_hyphen_values = true)]
        by: i64,
    },

    /// Delete all state of a request
    Cleanup {
        #[command(flatten)]
        target: RequestArgs,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv(cli.dotenv.as_deref());

    let config = resolve_config(&cli)?;
    let store = RedisStateStore::connect(&config.address)
        .await?
        .with_prefix(&config.prefix);

    match cli.command {
        Commands::Ping => {
            println!("PONG from {}", config.address);
            Ok(())
        }
        Commands::Get {
            target,
            key,
            format,
        } => cmd_get(scoped(store, &target), &key, &format).await,
        Commands::Set { target, key, value } => {
            let store = scoped(store, &target);
            store.set(&key, &value).await?;
            println!("OK");
            Ok(())
        }
        Commands::Update {
            target,
            key,
            old,
            new,
        } => cmd_update(scoped(store, &target), &key, &old, &new).await,
        Commands::Append {
            target,
            key,
            suffix,
        } => {
            let store = scoped(store, &target);
            let written = update_with(&store, &key, &config.retry, |current| {
                format!("{}{}", current, suffix)
            })
            .await?;
            println!("{}", written);
            Ok(())
        }
        Commands::Incr { target, key, by } => {
            let store = scoped(store, &target);
            let value = store.incr(&key, by).await?;
            println!("{}", value);
            Ok(())
        }
        Commands::Cleanup { target } => {
            let store = scoped(store, &target);
            store.cleanup().await?;
            println!("Removed state for {}", store.namespace().unwrap_or_default());
            Ok(())
        }
    }
}

/// Merge config file, environment and CLI flags, in increasing precedence.
pub fn resolve_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = StoreConfig::load(cli.config.as_deref())?;
    config.apply_env()?;
    if let Some(ref address) = cli.address {
        config.address = address.clone();
    }
    if let Some(ref prefix) = cli.prefix {
        config.prefix = prefix.clone();
    }
    Ok(config)
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (warn if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&std::path::Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => match dotenvy::dotenv() {
            Ok(path) => info!("Loaded env from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => {
                eprintln!("Warning: Failed to parse .env file: {}", e);
            }
        },
    }
}

fn scoped(mut store: RedisStateStore, target: &RequestArgs) -> RedisStateStore {
    store.configure(&target.flow, &target.request);
    store
}

async fn cmd_get(store: RedisStateStore, key: &str, format: &str) -> Result<()> {
    let value = store
        .get(key)
        .await
        .with_context(|| format!("Failed to read '{}'", key))?;

    match format {
        "json" => {
            let out = serde_json::json!({
                "namespace": store.namespace(),
                "key": key,
                "value": value,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "plain" => println!("{}", value),
        other => anyhow::bail!("Invalid format: {}", other),
    }
    Ok(())
}

async fn cmd_update(store: RedisStateStore, key: &str, old: &str, new: &str) -> Result<()> {
    match store.update(key, old, new).await {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(err) if err.is_conflict() => {
            let current = match store.get(key).await {
                Ok(v) => v,
                Err(e) if e.is_not_found() => String::from("(absent)"),
                Err(e) => return Err(e.into()),
            };
            anyhow::bail!("Conflict: '{}' is currently {}", key, current)
        }
        Err(err) => Err(err.into()),
    }
}
