//! teleport: watch teleport transactions and inspect resume tokens.

use alloy::primitives::B256;
use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use tokio_util::sync::CancellationToken;

use teleport_adapters::{JsonRpcDomainQuery, StaticChainIdentity, TeleportAdapterConfig};
use teleport_core::{
    ChainIdentityPort, Confirmation, ConfirmationWatcher, ResumeToken, TxTarget,
};

#[derive(Parser)]
#[command(name = "teleport")]
#[command(about = "Watch teleport transactions and inspect resume tokens", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a transaction receipt on one domain
    Watch {
        /// JSON-RPC endpoint of the domain
        rpc_url: String,
        tx_hash: B256,
    },
    /// Decode a resume query and resolve its route
    Token {
        /// e.g. `txHash=0x..&chainId=420&taskId=..`
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Watch { rpc_url, tx_hash } => watch(&rpc_url, tx_hash).await,
        Commands::Token { query } => token(&query),
    }
}

async fn watch(rpc_url: &str, tx_hash: B256) -> Result<()> {
    let config = TeleportAdapterConfig::from_env()?;
    let query = JsonRpcDomainQuery::new(rpc_url, config.rpc_timeout())?;
    let watcher = ConfirmationWatcher::new(config.orchestrator_config().watch_config());

    tracing::info!(%tx_hash, url = %query.base_url(), "watching transaction");
    let outcome = watcher
        .await_confirmation(
            &query,
            TxTarget::Hash(tx_hash),
            &CancellationToken::new(),
            |_| {},
        )
        .await?;

    match outcome {
        Confirmation::Confirmed(receipt) => {
            println!("confirmed in block {}", block_label(receipt.block_number));
            Ok(())
        }
        Confirmation::Reverted(receipt) => {
            eyre::bail!("reverted in block {}", block_label(receipt.block_number))
        }
    }
}

fn token(query: &str) -> Result<()> {
    let token = ResumeToken::from_query(query).wrap_err("invalid resume query")?;
    let identity = StaticChainIdentity::known()?;
    let source = identity.domain_for_chain(token.source_chain_id);
    let destination = source.and_then(|s| identity.destination_for(s.domain));

    let out = serde_json::json!({
        "token": token,
        "query": token.to_query(),
        "sourceDomain": source.map(|d| d.domain.name()),
        "destinationDomain": destination.map(|d| d.domain.name()),
        "destinationChainId": destination.map(|d| d.chain_id),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn block_label(block: Option<u64>) -> String {
    block.map_or_else(|| "unknown".to_owned(), |n| n.to_string())
}
