//! Environment configuration.
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file in the working directory.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use lettersync_evm::LETTER_TRANSFER_SIGNATURE;

use crate::logging::LogConfig;

pub const DEFAULT_METADATA_BASE_URL: &str = "https://ens-chain-letter.xyz/nft";

#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    pub events_file_path: PathBuf,
    /// WebSocket endpoint for subscriptions (and queries, without `http_rpc_url`).
    pub rpc_url: String,
    /// Optional HTTP endpoint for head and `eth_getLogs` queries.
    pub http_rpc_url: Option<String>,
    pub contract_address: String,
    pub event_signature: String,
    pub deploy_block: u64,
    pub page_size: Option<u64>,
    pub reorg_safety_margin: Option<u64>,
    pub metadata_dir: PathBuf,
    pub metadata_base_url: String,
    pub origin_subject: String,
    pub log: LogConfig,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} is not set"));
        let number = |key: &str| -> Result<Option<u64>> {
            get(key)
                .map(|v| v.trim().parse::<u64>().with_context(|| format!("{key}={v} is not a block count")))
                .transpose()
        };

        let rpc_url = required("RPC_URL")?;
        if !(rpc_url.starts_with("ws://") || rpc_url.starts_with("wss://")) {
            bail!("RPC_URL must be a ws:// or wss:// endpoint, got {rpc_url}");
        }

        Ok(Self {
            events_file_path: required("EVENTS_FILE_PATH")?.into(),
            rpc_url,
            http_rpc_url: get("HTTP_RPC_URL"),
            contract_address: required("CONTRACT_ADDRESS")?,
            event_signature: get("EVENT_SIGNATURE")
                .unwrap_or_else(|| LETTER_TRANSFER_SIGNATURE.to_string()),
            deploy_block: number("DEPLOY_BLOCK")?.ok_or_else(|| anyhow!("DEPLOY_BLOCK is not set"))?,
            page_size: number("PAGE_SIZE")?,
            reorg_safety_margin: number("REORG_SAFETY_MARGIN")?,
            metadata_dir: required("METADATA_DIR")?.into(),
            metadata_base_url: get("METADATA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_METADATA_BASE_URL.to_string()),
            origin_subject: required("ORIGIN_SUBJECT")?,
            log: LogConfig::from_lookup(&lookup),
        })
    }
}
