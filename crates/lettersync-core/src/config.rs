//! Synchronizer configuration.

use serde::{Deserialize, Serialize};

/// Configuration for one synchronizer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Address of the contract emitting the tracked event.
    pub contract_address: String,
    /// `topic[0]` of the tracked event (keccak-256 of its signature).
    pub event_topic: String,
    /// Block the contract was deployed in. Historic sync never starts earlier.
    pub deploy_block: u64,
    /// Blocks per `eth_getLogs` page during backfill.
    pub page_size: u64,
    /// Blocks to lag behind the chain head before checkpointing.
    pub reorg_safety_margin: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            contract_address: String::new(),
            event_topic: String::new(),
            deploy_block: 0,
            page_size: 1000,
            reorg_safety_margin: 10,
        }
    }
}
