use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;

use std::sync::{Arc, Mutex};

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

/// Difficulty of the reference configuration: leading zero hex digits
/// required of a mined block hash
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Mining reward of the reference configuration
pub const DEFAULT_MINING_REWARD: f64 = 100.0;

/// Previous-hash marker of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction must include a sender and a recipient")]
    MissingSender,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Cannot add invalid transaction to the pending pool")]
    InvalidTransaction,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Chain is empty")]
    EmptyChain,
}

/// Chain and pending pool, guarded together so every reader sees a
/// consistent snapshot
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

/// The authoritative single-node ledger
///
/// An append-only chain of mined blocks plus a pool of admitted but not yet
/// mined transactions. Balances are derived by folding the full chain on
/// every query; there is no cached account state.
///
/// Cloning a `Ledger` yields another handle onto the same shared state. All
/// mutating sequences (admission's balance-check-then-push, mining's
/// snapshot-search-append) run under one writer gate, so they never
/// interleave; the state lock itself is held only for short critical
/// sections, which keeps reads live while a nonce search runs.
#[derive(Debug, Clone)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,
    writer: Arc<Mutex<()>>,
    difficulty: usize,
    mining_reward: f64,
}

/// Builds the canonical genesis block
///
/// The genesis timestamp is pinned to the Unix epoch so the block is
/// reproducible: `is_valid` compares the stored genesis against this exact
/// value.
fn canonical_genesis() -> Block {
    Block::new(
        0,
        DateTime::<Utc>::UNIX_EPOCH,
        Vec::new(),
        GENESIS_PREVIOUS_HASH.to_string(),
    )
}

/// Folds every transaction in chain order into a balance for `address`
fn balance_in_chain(chain: &[Block], address: &Address) -> f64 {
    let mut balance = 0.0;

    for block in chain {
        for transaction in &block.transactions {
            if transaction.sender.as_ref() == Some(address) {
                balance -= transaction.amount;
            }

            if transaction.recipient == *address {
                balance += transaction.amount;
            }
        }
    }

    balance
}

impl Ledger {
    /// Creates a ledger with the reference configuration
    /// (difficulty 4, reward 100)
    pub fn new() -> Self {
        Self::with_config(DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD)
    }

    /// Creates a ledger with an explicit difficulty and mining reward
    ///
    /// Both values are fixed for the lifetime of the ledger.
    pub fn with_config(difficulty: usize, mining_reward: f64) -> Self {
        let state = LedgerState {
            chain: vec![canonical_genesis()],
            pending_transactions: Vec::new(),
        };

        Ledger {
            state: Arc::new(Mutex::new(state)),
            writer: Arc::new(Mutex::new(())),
            difficulty,
            mining_reward,
        }
    }

    /// Gets the configured difficulty
    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Gets the configured mining reward
    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    /// Gets the last block in the chain
    ///
    /// # Returns
    ///
    /// Result with the latest block; `EmptyChain` signals a broken internal
    /// invariant, since the genesis block guarantees a non-empty chain
    pub fn latest_block(&self) -> Result<Block, LedgerError> {
        let state = self.state.lock().unwrap();
        state.chain.last().cloned().ok_or(LedgerError::EmptyChain)
    }

    /// Admits a transaction into the pending pool
    ///
    /// Rejects transactions without a real sender, with a negative amount,
    /// with a bad signature, or whose amount exceeds the sender's committed
    /// balance. The balance check reads committed chain state only; several
    /// pending transactions may collectively overdraw one sender before the
    /// next block is mined.
    ///
    /// # Returns
    ///
    /// Result with the index of the block that will include this transaction
    pub fn add_transaction(&self, transaction: Transaction) -> Result<u64, LedgerError> {
        let _gate = self.writer.lock().unwrap();
        let mut state = self.state.lock().unwrap();

        let sender = match &transaction.sender {
            Some(sender) => sender.clone(),
            None => return Err(LedgerError::MissingSender),
        };

        if transaction.amount < 0.0 {
            return Err(LedgerError::InvalidAmount(transaction.amount));
        }

        if !transaction.is_valid() {
            return Err(LedgerError::InvalidTransaction);
        }

        let available = balance_in_chain(&state.chain, &sender);
        if available < transaction.amount {
            return Err(LedgerError::InsufficientFunds {
                required: transaction.amount,
                available,
            });
        }

        state.pending_transactions.push(transaction);
        info!("Transaction admitted to the pending pool");

        Ok(state.chain.len() as u64)
    }

    /// Mines the pending pool into a new block
    ///
    /// Appends a reward transaction for `reward_address` to the batch, mines
    /// a block over it at the configured difficulty, appends the block to
    /// the chain, and clears the pool. The nonce search runs with the state
    /// lock released, so balance queries and validation stay live while
    /// mining; the writer gate keeps the whole cycle atomic with respect to
    /// admissions and other mining calls.
    ///
    /// # Returns
    ///
    /// Result with the newly mined block
    pub fn mine_pending_transactions(
        &self,
        reward_address: &Address,
    ) -> Result<Block, LedgerError> {
        let _gate = self.writer.lock().unwrap();

        let (index, previous_hash, transactions) = {
            let state = self.state.lock().unwrap();
            let latest = state.chain.last().ok_or(LedgerError::EmptyChain)?;

            let mut transactions = state.pending_transactions.clone();
            transactions.push(Transaction::reward(
                reward_address.clone(),
                self.mining_reward,
            ));

            (state.chain.len() as u64, latest.hash.clone(), transactions)
        };

        let mut block = Block::new(index, Utc::now(), transactions, previous_hash);
        block.mine(self.difficulty);

        let mut state = self.state.lock().unwrap();
        state.chain.push(block.clone());
        state.pending_transactions.clear();

        info!("Block {} appended, pending pool cleared", block.index);

        Ok(block)
    }

    /// Derives the balance of an address from the full chain history
    ///
    /// Subtracts amounts sent, adds amounts received, in chain order. No
    /// memoization: the fold is recomputed on every call.
    pub fn balance_of(&self, address: &Address) -> f64 {
        let state = self.state.lock().unwrap();
        balance_in_chain(&state.chain, address)
    }

    /// Collects every mined transaction involving an address, in chain order
    pub fn transactions_for(&self, address: &Address) -> Vec<Transaction> {
        let state = self.state.lock().unwrap();
        let mut transactions = Vec::new();

        for block in &state.chain {
            for transaction in &block.transactions {
                if transaction.sender.as_ref() == Some(address)
                    || transaction.recipient == *address
                {
                    transactions.push(transaction.clone());
                }
            }
        }

        transactions
    }

    /// Validates the whole chain
    ///
    /// The first block must equal the canonical genesis for this
    /// configuration; every later block must carry valid transactions, hash
    /// to its stored hash, and link to its predecessor. Fails closed: any
    /// violation returns false rather than erroring.
    pub fn is_valid(&self) -> bool {
        let state = self.state.lock().unwrap();

        let first = match state.chain.first() {
            Some(first) => first,
            None => {
                warn!("Chain is empty");
                return false;
            }
        };

        match (
            serde_json::to_value(first),
            serde_json::to_value(canonical_genesis()),
        ) {
            (Ok(actual), Ok(expected)) if actual == expected => {}
            _ => {
                warn!("Genesis block does not match the canonical genesis");
                return false;
            }
        }

        for i in 1..state.chain.len() {
            let current = &state.chain[i];
            let previous = &state.chain[i - 1];

            if !current.has_valid_transactions() {
                warn!("Block {} contains an invalid transaction", current.index);
                return false;
            }

            if current.hash != current.compute_hash() {
                warn!("Block {} hash does not match its content", current.index);
                return false;
            }

            if current.previous_hash != previous.hash {
                warn!("Block {} does not link to its predecessor", current.index);
                return false;
            }
        }

        true
    }

    /// Gets a snapshot of the chain
    pub fn chain(&self) -> Vec<Block> {
        self.state.lock().unwrap().chain.clone()
    }

    /// Gets a snapshot of the pending pool
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().pending_transactions.clone()
    }

    /// Gets the number of blocks in the chain
    pub fn chain_length(&self) -> usize {
        self.state.lock().unwrap().chain.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::crypto::Wallet;

    /// Low-difficulty ledger so nonce searches stay fast
    fn test_ledger() -> Ledger {
        Ledger::with_config(2, DEFAULT_MINING_REWARD)
    }

    /// Mines a reward block so `wallet` has a committed balance
    fn fund(ledger: &Ledger, wallet: &Wallet) {
        ledger.mine_pending_transactions(wallet.address()).unwrap();
    }

    #[test]
    fn test_new_ledger_has_genesis() {
        let ledger = Ledger::new();
        let chain = ledger.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 0);
        assert_eq!(chain[0].previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(chain[0].transactions.is_empty());
        assert_eq!(ledger.latest_block().unwrap().hash, chain[0].hash);
    }

    #[test]
    fn test_genesis_only_balances_are_zero() {
        let ledger = Ledger::new();
        let wallet = Wallet::generate().unwrap();

        assert_eq!(ledger.balance_of(wallet.address()), 0.0);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_add_transaction_insufficient_funds() {
        let ledger = test_ledger();
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            10.0,
        );
        transaction.sign(&sender).unwrap();

        let result = ledger.add_transaction(transaction);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_add_transaction_rejects_unsigned() {
        let ledger = test_ledger();
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();
        fund(&ledger, &sender);

        let transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            10.0,
        );

        let result = ledger.add_transaction(transaction);
        assert!(matches!(result, Err(LedgerError::InvalidTransaction)));
    }

    #[test]
    fn test_add_transaction_rejects_reward_sentinel() {
        let ledger = test_ledger();
        let recipient = Wallet::generate().unwrap();

        let transaction = Transaction::reward(recipient.address().clone(), 100.0);

        let result = ledger.add_transaction(transaction);
        assert!(matches!(result, Err(LedgerError::MissingSender)));
    }

    #[test]
    fn test_add_transaction_rejects_negative_amount() {
        let ledger = test_ledger();
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();
        fund(&ledger, &sender);

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            -5.0,
        );
        transaction.sign(&sender).unwrap();

        let result = ledger.add_transaction(transaction);
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_mining_pays_the_reward() {
        let ledger = test_ledger();
        let miner = Wallet::generate().unwrap();

        let block = ledger.mine_pending_transactions(miner.address()).unwrap();

        assert_eq!(block.index, 1);
        assert!(block.hash.starts_with("00"));
        assert_eq!(block.transactions.len(), 1);
        assert!(block.transactions[0].is_reward());

        assert_eq!(ledger.balance_of(miner.address()), DEFAULT_MINING_REWARD);
        assert!(ledger.pending_transactions().is_empty());
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_transfer_scenario() {
        let ledger = test_ledger();
        let alice = Wallet::generate().unwrap();
        let bob = Wallet::generate().unwrap();
        let miner = Wallet::generate().unwrap();

        // Alice starts with nothing
        let early = alice.create_transaction(bob.address().clone(), 10.0, &ledger);
        assert!(early.is_err());

        // A mined reward block funds her
        fund(&ledger, &alice);
        assert_eq!(ledger.balance_of(alice.address()), DEFAULT_MINING_REWARD);

        // Now the same transfer goes through
        let transaction = alice
            .create_transaction(bob.address().clone(), 10.0, &ledger)
            .unwrap();
        ledger.add_transaction(transaction).unwrap();
        ledger.mine_pending_transactions(miner.address()).unwrap();

        assert_eq!(
            ledger.balance_of(alice.address()),
            DEFAULT_MINING_REWARD - 10.0
        );
        assert_eq!(ledger.balance_of(bob.address()), 10.0);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_self_transfer_is_accepted() {
        let ledger = test_ledger();
        let alice = Wallet::generate().unwrap();
        fund(&ledger, &alice);

        // No self-transfer prohibition; the fold nets it out to zero
        let transaction = alice
            .create_transaction(alice.address().clone(), 10.0, &ledger)
            .unwrap();
        ledger.add_transaction(transaction).unwrap();
        ledger.mine_pending_transactions(alice.address()).unwrap();

        assert_eq!(
            ledger.balance_of(alice.address()),
            2.0 * DEFAULT_MINING_REWARD
        );
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_pending_pool_may_overdraw() {
        let ledger = test_ledger();
        let alice = Wallet::generate().unwrap();
        let bob = Wallet::generate().unwrap();
        fund(&ledger, &alice);

        // Admission checks committed balance only, so two transfers of 60
        // against a balance of 100 are both accepted
        for _ in 0..2 {
            let transaction = alice
                .create_transaction(bob.address().clone(), 60.0, &ledger)
                .unwrap();
            ledger.add_transaction(transaction).unwrap();
        }

        assert_eq!(ledger.pending_transactions().len(), 2);
    }

    #[test]
    fn test_balance_is_idempotent() {
        let ledger = test_ledger();
        let miner = Wallet::generate().unwrap();
        fund(&ledger, &miner);

        let first = ledger.balance_of(miner.address());
        let second = ledger.balance_of(miner.address());
        assert_eq!(first, second);
    }

    #[test]
    fn test_transactions_for_address() {
        let ledger = test_ledger();
        let alice = Wallet::generate().unwrap();
        let bob = Wallet::generate().unwrap();
        let miner = Wallet::generate().unwrap();
        fund(&ledger, &alice);

        let transaction = alice
            .create_transaction(bob.address().clone(), 25.0, &ledger)
            .unwrap();
        ledger.add_transaction(transaction).unwrap();
        ledger.mine_pending_transactions(miner.address()).unwrap();

        let alice_history = ledger.transactions_for(alice.address());
        assert_eq!(alice_history.len(), 2); // reward in, transfer out

        let bob_history = ledger.transactions_for(bob.address());
        assert_eq!(bob_history.len(), 1);
        assert_eq!(bob_history[0].amount, 25.0);

        let stranger = Wallet::generate().unwrap();
        assert!(ledger.transactions_for(stranger.address()).is_empty());
    }

    #[test]
    fn test_tampered_block_invalidates_chain() {
        let ledger = test_ledger();
        let alice = Wallet::generate().unwrap();
        let bob = Wallet::generate().unwrap();
        fund(&ledger, &alice);

        let transaction = alice
            .create_transaction(bob.address().clone(), 10.0, &ledger)
            .unwrap();
        ledger.add_transaction(transaction).unwrap();
        ledger.mine_pending_transactions(alice.address()).unwrap();
        assert!(ledger.is_valid());

        // Rewrite an amount inside a mined block
        ledger.state.lock().unwrap().chain[2].transactions[0].amount = 9999.0;
        assert!(!ledger.is_valid());
    }

    #[test]
    fn test_tampered_genesis_invalidates_chain() {
        let ledger = test_ledger();
        assert!(ledger.is_valid());

        ledger.state.lock().unwrap().chain[0].nonce = 42;
        assert!(!ledger.is_valid());
    }
}
