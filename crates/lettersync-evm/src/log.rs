//! Raw EVM logs and `LetterTransfer` decoding.
//!
//! ```text
//! event LetterTransfer(uint256 indexed tokenIndex, address indexed to, bytes32 indexed subjectID)
//!   topics[0] = keccak256("LetterTransfer(uint256,address,bytes32)")
//!   topics[1] = tokenIndex
//!   topics[2] = to
//!   topics[3] = subjectID
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tiny_keccak::{Hasher, Keccak};

use lettersync_core::{Event, SyncError};

/// Default signature of the tracked event.
pub const LETTER_TRANSFER_SIGNATURE: &str = "LetterTransfer(uint256,address,bytes32)";

/// A log as returned by `eth_getLogs` and the `logs` subscription.
///
/// Position fields are optional because pending logs omit them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub block_hash: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    /// Decode into an [`Event`]. Fails on pending logs and malformed topics.
    pub fn decode(&self) -> Result<Event, SyncError> {
        let tx_hash = self.transaction_hash.clone().unwrap_or_default();
        let fail = |reason: String| SyncError::Decode {
            tx_hash: tx_hash.clone(),
            reason,
        };

        let block_number = self
            .block_number
            .as_deref()
            .and_then(parse_hex_u64)
            .ok_or_else(|| fail("missing or invalid blockNumber".into()))?;
        let log_index = self
            .log_index
            .as_deref()
            .and_then(parse_hex_u64)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| fail("missing or invalid logIndex".into()))?;
        let block_hash = self
            .block_hash
            .clone()
            .ok_or_else(|| fail("missing blockHash".into()))?;
        let transaction_hash = self
            .transaction_hash
            .clone()
            .ok_or_else(|| fail("missing transactionHash".into()))?;

        if self.topics.len() < 4 {
            return Err(fail(format!("expected 4 topics, got {}", self.topics.len())));
        }
        let token_index = decode_word_u64(&self.topics[1]).map_err(|r| fail(format!("tokenIndex: {r}")))?;
        let subject = decode_word(&self.topics[3]).map_err(|r| fail(format!("subjectID: {r}")))?;

        Ok(Event {
            block_number,
            block_hash,
            transaction_hash,
            log_index,
            token_index,
            subject_id: format!("0x{}", hex::encode(subject)),
            removed: self.removed,
        })
    }
}

/// Address + `topic[0]` filter for the tracked event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: String,
    pub topic0: String,
}

impl LogFilter {
    pub fn new(address: impl Into<String>, topic0: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            topic0: topic0.into(),
        }
    }

    /// `eth_getLogs` parameter for the inclusive range `[from, to]`.
    pub fn range_params(&self, from: u64, to: u64) -> Value {
        json!({
            "address": self.address,
            "topics": [self.topic0],
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        })
    }

    /// `eth_subscribe("logs", …)` parameter.
    pub fn subscription_params(&self) -> Value {
        json!({
            "address": self.address,
            "topics": [self.topic0],
        })
    }
}

/// `topic[0]` for an event signature: `0x` + keccak-256 of the signature.
pub fn event_topic(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    hasher.update(signature.as_bytes());
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    format!("0x{}", hex::encode(out))
}

/// Parse a quantity (`0x`-prefixed or bare hex).
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

fn decode_word(topic: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(topic.strip_prefix("0x").unwrap_or(topic)).map_err(|e| e.to_string())?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

fn decode_word_u64(topic: &str) -> Result<u64, String> {
    let word = decode_word(topic)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err("value does not fit in u64".into());
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(low))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBJECT: &str = "0x5a384227b65fa093dec03ec34e111db80a040615ba3d0e6ddad3cf0f0f0a1bba";

    fn word(n: u64) -> String {
        format!("0x{n:064x}")
    }

    fn sample() -> RawLog {
        RawLog {
            address: "0xabc".into(),
            topics: vec![
                event_topic(LETTER_TRANSFER_SIGNATURE),
                word(7),
                "0x000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa96045".into(),
                SUBJECT.into(),
            ],
            data: "0x".into(),
            block_number: Some("0x3e9".into()),
            block_hash: Some("0xblock".into()),
            transaction_hash: Some("0xtx".into()),
            log_index: Some("0x2".into()),
            removed: false,
        }
    }

    #[test]
    fn topic_of_known_signature() {
        assert_eq!(
            event_topic("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("1234"), Some(0x1234));
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn decodes_letter_transfer() {
        let event = sample().decode().unwrap();
        assert_eq!(event.block_number, 1001);
        assert_eq!(event.log_index, 2);
        assert_eq!(event.token_index, 7);
        assert_eq!(event.subject_id, SUBJECT);
        assert_eq!(event.block_hash, "0xblock");
        assert!(!event.removed);
    }

    #[test]
    fn removal_flag_survives_decoding() {
        let mut log = sample();
        log.removed = true;
        assert!(log.decode().unwrap().removed);
    }

    #[test]
    fn pending_log_is_rejected() {
        let mut log = sample();
        log.block_number = None;
        assert!(matches!(log.decode(), Err(SyncError::Decode { .. })));
    }

    #[test]
    fn short_topics_are_rejected() {
        let mut log = sample();
        log.topics.truncate(2);
        assert!(matches!(log.decode(), Err(SyncError::Decode { .. })));
    }

    #[test]
    fn oversized_token_index_is_rejected() {
        let mut log = sample();
        log.topics[1] = format!("0x01{}", "0".repeat(62));
        assert!(log.decode().is_err());
    }

    #[test]
    fn deserializes_rpc_payload() {
        let payload = serde_json::json!({
            "address": "0xabc",
            "topics": sample().topics,
            "data": "0x",
            "blockNumber": "0x3e9",
            "blockHash": "0xblock",
            "transactionHash": "0xtx",
            "transactionIndex": "0x0",
            "logIndex": "0x2",
            "removed": true
        });
        let log: RawLog = serde_json::from_value(payload).unwrap();
        assert!(log.removed);
        assert_eq!(log.decode().unwrap().log_index, 2);
    }

    #[test]
    fn filter_params_are_hex_ranges() {
        let f = LogFilter::new("0xabc", "0xtopic");
        let p = f.range_params(1000, 1999);
        assert_eq!(p["fromBlock"], "0x3e8");
        assert_eq!(p["toBlock"], "0x7cf");
        assert_eq!(p["topics"][0], "0xtopic");
        assert!(f.subscription_params().get("fromBlock").is_none());
    }
}
