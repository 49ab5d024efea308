use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// An ordered batch of transactions sealed by proof of work
///
/// A block is mutable while it is being mined (`mine` adjusts `nonce` and
/// `hash` in place) and treated as immutable once appended to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position of the block in the chain, genesis is 0
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions included in this block, in insertion order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block, "0" for genesis
    pub previous_hash: String,

    /// Proof-of-work counter, starts at 0
    pub nonce: u64,

    /// Hash of the block's content at its current nonce
    pub hash: String,
}

impl Block {
    /// Creates a new block with `nonce = 0` and its hash computed
    ///
    /// # Arguments
    ///
    /// * `index` - The position of the block in the chain
    /// * `timestamp` - The block's creation time
    /// * `transactions` - The transactions to seal into the block
    /// * `previous_hash` - The hash of the predecessor block
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };

        block.hash = block.compute_hash();
        block
    }

    /// Computes the hex digest of the block's content
    ///
    /// The payload is the canonical JSON object over `(index, previousHash,
    /// timestamp, transactions, nonce)`, with each transaction in its full
    /// wire projection, i.e. the block's own wire form minus `hash`.
    /// serde_json renders object keys in sorted order, so the payload is
    /// reproducible byte-for-byte from the same field values.
    pub fn compute_hash(&self) -> String {
        let payload = serde_json::json!({
            "index": self.index,
            "previousHash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "nonce": self.nonce,
        });

        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Searches for a nonce whose hash meets the difficulty target
    ///
    /// Increments `nonce` and recomputes `hash` until the digest starts with
    /// `difficulty` leading zero hex digits. CPU-bound and unbounded in the
    /// worst case; the nonce search is the consensus mechanism, so there is
    /// no timeout.
    pub fn mine(&mut self, difficulty: usize) {
        let target = "0".repeat(difficulty);

        while !self.hash.starts_with(&target) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }

        info!("Block mined: {}", self.hash);
    }

    /// Checks that every contained transaction is authentic
    pub fn has_valid_transactions(&self) -> bool {
        self.transactions.iter().all(Transaction::is_valid)
    }

    /// Checks the block's own integrity
    ///
    /// Fails closed when the hash or previous hash is missing, or when the
    /// stored hash no longer matches the recomputed content hash (which
    /// detects tampering with any hashed field).
    pub fn is_valid(&self) -> bool {
        if self.hash.is_empty() {
            warn!("Block {} has no hash", self.index);
            return false;
        }

        if self.previous_hash.is_empty() {
            warn!("Block {} has no previous hash", self.index);
            return false;
        }

        if self.compute_hash() != self.hash {
            warn!("Block {} hash does not match its content", self.index);
            return false;
        }

        true
    }
}
