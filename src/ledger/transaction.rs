use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Cannot sign transactions for another wallet")]
    SignerMismatch,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// A signed value transfer
///
/// A `sender` of `None` marks a system-issued mining reward, which is valid
/// without a signature. Once a transaction is embedded in a mined block it is
/// never mutated; tampering with any hashed field invalidates the chain.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sender's address, or `None` for a mining reward
    pub sender: Option<Address>,

    /// Recipient's address
    pub recipient: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub created_at: DateTime<Utc>,

    /// Signature over the transaction's content hash, `None` until signed
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transfer from `sender` to `recipient`
    pub fn new(sender: Address, recipient: Address, amount: f64) -> Self {
        Transaction {
            sender: Some(sender),
            recipient,
            amount,
            created_at: Utc::now(),
            signature: None,
        }
    }

    /// Creates a system-issued mining reward transaction
    pub fn reward(recipient: Address, amount: f64) -> Self {
        Transaction {
            sender: None,
            recipient,
            amount,
            created_at: Utc::now(),
            signature: None,
        }
    }

    /// Checks whether this is a mining reward transaction
    pub fn is_reward(&self) -> bool {
        self.sender.is_none()
    }

    /// Computes the hex digest of the transaction's signable content
    ///
    /// The payload is the canonical JSON object over `(sender, recipient,
    /// amount, createdAt)`, which is the wire projection minus `signature`.
    /// serde_json renders object keys in sorted order, so the payload bytes
    /// are fixed for a given field state. Stable across repeated calls on an
    /// unmutated transaction; used for both signing and verification.
    pub fn content_hash(&self) -> String {
        let payload = serde_json::json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "amount": self.amount,
            "createdAt": self.created_at,
        });

        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Signs the transaction with a wallet
    ///
    /// # Arguments
    ///
    /// * `wallet` - The wallet to sign with; its address must equal `sender`
    ///
    /// # Returns
    ///
    /// Result indicating success or failure
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        // Reward transactions have no sender and cannot be signed for
        let authorized = match &self.sender {
            Some(sender) => wallet.address() == sender,
            None => false,
        };

        if !authorized {
            return Err(TransactionError::SignerMismatch);
        }

        let content_hash = self.content_hash();
        let signature = wallet.sign(content_hash.as_bytes())?;
        self.signature = Some(signature);

        Ok(())
    }

    /// Checks whether the transaction is authentic
    ///
    /// This is a predicate: it never errors out. A reward transaction is
    /// always valid; anything else fails closed when the signature is
    /// missing, the sender key does not parse, or verification fails.
    pub fn is_valid(&self) -> bool {
        let sender = match &self.sender {
            // Mining reward
            None => return true,
            Some(sender) => sender,
        };

        let signature = match &self.signature {
            Some(signature) => signature,
            None => {
                warn!("Transaction from {} has no signature", sender);
                return false;
            }
        };

        let public_key = match sender.to_public_key() {
            Ok(key) => key,
            Err(err) => {
                warn!("Cannot parse public key from sender {}: {}", sender, err);
                return false;
            }
        };

        match verify_signature(self.content_hash().as_bytes(), signature, &public_key) {
            Ok(valid) => {
                if !valid {
                    warn!("Signature verification failed for sender {}", sender);
                }
                valid
            }
            Err(err) => {
                warn!("Cannot decode signature from sender {}: {}", sender, err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            10.5,
        );

        assert_eq!(transaction.sender.as_ref(), Some(sender.address()));
        assert_eq!(transaction.recipient, *recipient.address());
        assert_eq!(transaction.amount, 10.5);
        assert!(transaction.signature.is_none());
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_sign_and_validate() {
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            10.5,
        );

        transaction.sign(&sender).unwrap();

        assert!(transaction.signature.is_some());
        assert!(transaction.is_valid());
    }

    #[test]
    fn test_unsigned_transaction_is_invalid() {
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            10.5,
        );

        transaction.sign(&sender).unwrap();
        assert!(transaction.is_valid());

        // Clearing the signature must fail closed, not error
        transaction.signature = None;
        assert!(!transaction.is_valid());
    }

    #[test]
    fn test_sign_with_wrong_wallet() {
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();
        let intruder = Wallet::generate().unwrap();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            10.5,
        );

        let result = transaction.sign(&intruder);
        assert!(matches!(result, Err(TransactionError::SignerMismatch)));
        assert!(transaction.signature.is_none());
    }

    #[test]
    fn test_reward_transaction_is_always_valid() {
        let miner = Wallet::generate().unwrap();

        let transaction = Transaction::reward(miner.address().clone(), 100.0);

        assert!(transaction.is_reward());
        assert!(transaction.signature.is_none());
        assert!(transaction.is_valid());
    }

    #[test]
    fn test_content_hash_is_stable() {
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            42.0,
        );

        assert_eq!(transaction.content_hash(), transaction.content_hash());
    }

    #[test]
    fn test_tampered_amount_invalidates_signature() {
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            10.0,
        );

        transaction.sign(&sender).unwrap();
        assert!(transaction.is_valid());

        transaction.amount = 1000.0;
        assert!(!transaction.is_valid());
    }

    #[test]
    fn test_serde_round_trip_preserves_content_hash() {
        let sender = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let mut transaction = Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            7.25,
        );
        transaction.sign(&sender).unwrap();

        let json = serde_json::to_string(&transaction).unwrap();
        let restored: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.content_hash(), transaction.content_hash());
        assert!(restored.is_valid());
    }
}
