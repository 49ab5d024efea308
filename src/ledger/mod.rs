// Ledger engine module
//
// This module contains the core ledger implementation including:
// - Transaction structure and signature checks
// - Block structure and proof of work
// - The Ledger (chain + pending pool + balance derivation)
// - Cryptography utilities and the wallet

pub mod block;
pub mod chain;
pub mod crypto;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Ledger, LedgerError};
pub use crypto::{Address, DigitalSignature, Wallet, WalletError};
pub use transaction::Transaction;
