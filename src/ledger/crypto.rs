use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

use super::chain::Ledger;
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to generate keypair: {0}")]
    KeypairGeneration(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    Decoding(String),
}

/// Errors that can occur during wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// A ledger address (ed25519 public key in base58 format)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let encoded = bs58::encode(public_key.as_bytes()).into_string();
        Address(encoded)
    }

    /// Converts the address back to a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::Decoding(e.to_string()))?;

        VerifyingKey::from_bytes(&bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Validate that the string is a valid base58 encoding
        bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::Decoding(e.to_string()))?;

        Ok(Address(s.to_string()))
    }
}

/// A digital signature over a transaction's content hash (base58 encoded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a raw signature
    pub fn from_signature(signature: &Signature) -> Self {
        let encoded = bs58::encode(signature.to_bytes()).into_string();
        DigitalSignature(encoded)
    }

    /// Converts the digital signature back to a raw signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::Decoding(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// A wallet holding an ed25519 keypair
///
/// The wallet's address is the identifier used as sender/recipient in
/// transactions; the ledger itself never holds a wallet reference.
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl Wallet {
    /// Generates a new wallet with a random keypair
    pub fn generate() -> Result<Self, CryptoError> {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = Address::from_public_key(&verifying_key);

        Ok(Wallet {
            signing_key,
            verifying_key,
            address,
        })
    }

    /// Reconstructs a wallet from existing secret key material
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        let signing_key = SigningKey::from_bytes(&bytes_array);
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = Address::from_public_key(&verifying_key);

        Ok(Wallet {
            signing_key,
            verifying_key,
            address,
        })
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the wallet's public key
    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Signs a message with the wallet's private key
    pub fn sign(&self, message: &[u8]) -> Result<DigitalSignature, CryptoError> {
        let signature = self.signing_key.sign(message);
        Ok(DigitalSignature::from_signature(&signature))
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Creates and signs a transfer to `recipient`, checked against the
    /// ledger's committed balance for this wallet at call time
    ///
    /// # Arguments
    ///
    /// * `recipient` - The address receiving the funds
    /// * `amount` - The amount to transfer
    /// * `ledger` - The ledger whose balance view authorizes the transfer
    ///
    /// # Returns
    ///
    /// Result with the signed transaction
    pub fn create_transaction(
        &self,
        recipient: Address,
        amount: f64,
        ledger: &Ledger,
    ) -> Result<Transaction, WalletError> {
        let available = ledger.balance_of(&self.address);
        if amount > available {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        let mut transaction = Transaction::new(self.address.clone(), recipient, amount);
        transaction.sign(self)?;

        Ok(transaction)
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    match public_key.verify(message, &signature) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}
