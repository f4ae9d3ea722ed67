//! lettersync CLI — run the chain letter synchronizer and inspect its state.
//!
//! Usage:
//! ```bash
//! # Backfill, then follow the chain tip (configured through the environment)
//! lettersync run
//!
//! # Summarise the persisted event log
//! lettersync status --file ./events.json
//! ```

mod config;
mod logging;

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use lettersync_core::{EventLogStore, JsonFileStore};
use lettersync_evm::{ChainClient, RpcChainClient, SynchronizerBuilder, WsLiveFeed};
use lettersync_metadata::FsMetadataPublisher;
use lettersync_rpc::{HttpConfig, HttpTransport, WsConfig, WsTransport};

use crate::config::CliConfig;
use crate::logging::LogConfig;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    dotenv::dotenv().ok();

    let result = match args[1].as_str() {
        "run" => cmd_run().await,
        "status" => cmd_status(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("lettersync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("lettersync {}", env!("CARGO_PKG_VERSION"));
    println!("Reorg-safe event synchronizer for the ENS chain letter\n");
    println!("USAGE:");
    println!("    lettersync <COMMAND>\n");
    println!("COMMANDS:");
    println!("    run      Backfill, then follow the chain tip until stopped");
    println!("    status   Summarise the persisted event log");
    println!("    version  Print version");
    println!("    help     Print this help\n");
    println!("STATUS FLAGS:");
    println!("    --file <PATH>  State file  [default: $EVENTS_FILE_PATH]");
    println!("    --json         Print the full state as JSON\n");
    println!("ENVIRONMENT (run):");
    println!("    EVENTS_FILE_PATH, RPC_URL, CONTRACT_ADDRESS, DEPLOY_BLOCK,");
    println!("    METADATA_DIR, ORIGIN_SUBJECT                            [required]");
    println!("    HTTP_RPC_URL, EVENT_SIGNATURE, PAGE_SIZE, REORG_SAFETY_MARGIN,");
    println!("    METADATA_BASE_URL, LOG_LEVEL, LOG_JSON, RUST_LOG        [optional]");
}

async fn cmd_run() -> Result<()> {
    let config = CliConfig::from_env()?;
    logging::init_tracing(&config.log);

    let ws = Arc::new(
        WsTransport::connect(config.rpc_url.as_str(), WsConfig::default())
            .await
            .with_context(|| format!("connecting to {}", config.rpc_url))?,
    );
    let client: Arc<dyn ChainClient> = match &config.http_rpc_url {
        Some(url) => {
            let http = HttpTransport::new(url.as_str(), HttpConfig::default())
                .with_context(|| format!("building HTTP client for {url}"))?;
            Arc::new(RpcChainClient::new(Arc::new(http)))
        }
        None => Arc::new(RpcChainClient::new(ws.clone())),
    };

    let publisher = FsMetadataPublisher::new(
        config.metadata_dir.clone(),
        config.metadata_base_url.clone(),
        config.origin_subject.clone(),
    );

    let mut builder = SynchronizerBuilder::new()
        .contract_address(config.contract_address.clone())
        .event_signature(&config.event_signature)
        .deploy_block(config.deploy_block)
        .client(client)
        .live_feed(Arc::new(WsLiveFeed::new(ws)))
        .store(Arc::new(JsonFileStore::new(config.events_file_path.clone())))
        .publisher(Arc::new(publisher));
    if let Some(pages) = config.page_size {
        builder = builder.page_size(pages);
    }
    if let Some(margin) = config.reorg_safety_margin {
        builder = builder.reorg_safety_margin(margin);
    }
    let sync = builder.build()?;

    tracing::info!(
        contract = %sync.config().contract_address,
        deploy_block = sync.config().deploy_block,
        events_file = %config.events_file_path.display(),
        metadata_dir = %config.metadata_dir.display(),
        "lettersync starting"
    );

    let state = sync.run_until(shutdown_signal()).await?;
    tracing::info!(
        events = state.events.len(),
        synced_until = ?state.synced_until.get(),
        "lettersync stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c; running until a fatal error");
        std::future::pending::<()>().await;
    }
}

async fn cmd_status(args: &[String]) -> Result<()> {
    logging::init_tracing(&LogConfig::from_lookup(|key| env::var(key).ok()));

    let path: PathBuf = parse_flag(args, "--file")
        .or_else(|| env::var("EVENTS_FILE_PATH").ok())
        .ok_or_else(|| anyhow!("--file or EVENTS_FILE_PATH is required"))?
        .into();

    let store = JsonFileStore::new(path.clone());
    let Some(state) = store.load().await? else {
        println!("No state at {} (a first run starts from the deploy block)", path.display());
        return Ok(());
    };

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("State file:    {}", path.display());
    println!("Events:        {}", state.events.len());
    match state.synced_until.get() {
        Some(block) => println!("Synced until:  {block}"),
        None => println!("Synced until:  (not yet checkpointed)"),
    }
    if let Some(last) = state.events.last() {
        println!(
            "Last event:    block {} log {} token {} subject {}",
            last.block_number, last.log_index, last.token_index, last.subject_id
        );
    }
    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
