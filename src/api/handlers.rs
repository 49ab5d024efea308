use actix_web::{web, HttpResponse, Responder};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::{Address, Block, Ledger, Transaction, Wallet};

/// Shared application state: the ledger plus the in-memory wallet registry
pub struct AppState {
    pub ledger: Ledger,
    pub wallets: DashMap<String, Wallet>,
}

pub type LedgerData = web::Data<AppState>;

/// Response for the chain info endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfoResponse {
    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Transactions awaiting inclusion in a block
    pub pending_transactions: Vec<Transaction>,

    /// The number of blocks in the chain
    pub length: usize,

    /// Leading zero hex digits required of a mined hash
    pub difficulty: usize,

    /// Reward paid per mined block
    pub mining_reward: f64,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// The sender's address
    pub sender: String,

    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,

    /// The sender's private key (hex encoded, for signing)
    pub private_key: String,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The signed transaction as admitted to the pool
    pub transaction: Transaction,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MineRequest {
    /// The miner's address (receives the reward)
    pub miner_address: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,

    /// The miner's balance after the reward
    pub balance: f64,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's private key (hex encoded)
    pub private_key: String,
}

/// Request for the import wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportWalletRequest {
    /// The private key to import (hex encoded)
    pub private_key: String,
}

/// Response for the import wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportWalletResponse {
    /// The imported wallet's address
    pub address: String,

    /// The wallet's current balance
    pub balance: f64,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    /// The queried address
    pub address: String,

    /// The address's balance
    pub balance: f64,
}

/// Response for the transaction history endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    /// The queried address
    pub address: String,

    /// Every mined transaction involving the address, in chain order
    pub transactions: Vec<Transaction>,
}

/// Get the chain info
///
/// Returns the chain, the pending pool, and the ledger configuration
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain info retrieved successfully", body = ChainInfoResponse)
    )
)]
pub async fn get_chain_info(state: LedgerData) -> impl Responder {
    let chain = state.ledger.chain();

    let response = ChainInfoResponse {
        length: chain.len(),
        chain,
        pending_transactions: state.ledger.pending_transactions(),
        difficulty: state.ledger.difficulty(),
        mining_reward: state.ledger.mining_reward(),
    };

    HttpResponse::Ok().json(response)
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(state: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.pending_transactions())
}

/// Create a new transaction
///
/// Signs a transfer with the sender's key and admits it to the pending pool
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction admitted to the pending pool", body = TransactionResponse),
        (status = 400, description = "Invalid transaction data"),
        (status = 404, description = "Unknown sender wallet"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn new_transaction(
    state: LedgerData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    // The sender must have been created or imported through this node
    if !state.wallets.contains_key(&transaction_req.sender) {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "Wallet not found"
        }));
    }

    let private_key_bytes = match hex::decode(&transaction_req.private_key) {
        Ok(bytes) => bytes,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid private key format. Must be a hex string."
            }));
        }
    };

    let wallet = match Wallet::from_secret_key(&private_key_bytes) {
        Ok(wallet) => wallet,
        Err(err) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid private key: {}", err)
            }));
        }
    };

    // The signing key must belong to the claimed sender
    if wallet.address().0 != transaction_req.sender {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Private key does not match sender address"
        }));
    }

    let recipient = Address(transaction_req.recipient.clone());
    let amount = transaction_req.amount;

    // Admission may wait on an in-flight mining cycle, so it runs off the
    // async executor
    let ledger = state.ledger.clone();
    let result = web::block(move || {
        let transaction = wallet
            .create_transaction(recipient, amount, &ledger)
            .map_err(|err| err.to_string())?;

        let block_index = ledger
            .add_transaction(transaction.clone())
            .map_err(|err| err.to_string())?;

        Ok::<_, String>((transaction, block_index))
    })
    .await;

    match result {
        Ok(Ok((transaction, block_index))) => {
            let response = TransactionResponse {
                message: "Transaction will be added to Block".to_string(),
                transaction,
                block_index,
            };

            HttpResponse::Created().json(response)
        }
        Ok(Err(err)) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to add transaction: {}", err)
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to add transaction: {}", err)
        })),
    }
}

/// Mine a new block
///
/// Mines the pending pool (plus the reward transaction) into a new block
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Invalid mining request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(state: LedgerData, mine_req: web::Json<MineRequest>) -> impl Responder {
    let miner_address = Address(mine_req.miner_address.clone());

    // The nonce search is CPU-bound, so it runs off the async executor
    let ledger = state.ledger.clone();
    let result = web::block(move || {
        let block = ledger.mine_pending_transactions(&miner_address)?;
        let balance = ledger.balance_of(&miner_address);
        Ok::<_, crate::ledger::LedgerError>((block, balance))
    })
    .await;

    match result {
        Ok(Ok((block, balance))) => {
            let response = MineResponse {
                message: "Block mined successfully".to_string(),
                block,
                balance,
            };

            HttpResponse::Ok().json(response)
        }
        Ok(Err(err)) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err)
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err)
        })),
    }
}

/// Check if the chain is valid
///
/// Validates the entire chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(state: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.is_valid())
}

/// Create a new wallet
///
/// Creates a new wallet with a random keypair and registers it
///
/// The private key must be stored by your own
#[utoipa::path(
    post,
    path = "/api/v1/wallet/new",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_wallet(state: LedgerData) -> impl Responder {
    match Wallet::generate() {
        Ok(wallet) => {
            let address = wallet.address().0.clone();
            let private_key = hex::encode(wallet.export_secret_key());

            state.wallets.insert(address.clone(), wallet);

            let response = WalletResponse {
                address,
                private_key,
            };

            HttpResponse::Created().json(response)
        }
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to create wallet: {}", err)
        })),
    }
}

/// Import a wallet
///
/// Reconstructs a wallet from private key material and registers it
#[utoipa::path(
    post,
    path = "/api/v1/wallet/import",
    request_body = ImportWalletRequest,
    responses(
        (status = 200, description = "Wallet imported successfully", body = ImportWalletResponse),
        (status = 400, description = "Malformed private key")
    )
)]
pub async fn import_wallet(
    state: LedgerData,
    import_req: web::Json<ImportWalletRequest>,
) -> impl Responder {
    let private_key_bytes = match hex::decode(&import_req.private_key) {
        Ok(bytes) => bytes,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid private key format. Must be a hex string."
            }));
        }
    };

    match Wallet::from_secret_key(&private_key_bytes) {
        Ok(wallet) => {
            let address = wallet.address().clone();
            state.wallets.insert(address.0.clone(), wallet);

            let response = ImportWalletResponse {
                balance: state.ledger.balance_of(&address),
                address: address.0,
            };

            HttpResponse::Ok().json(response)
        }
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to import wallet: {}", err)
        })),
    }
}

/// Get wallet balance
///
/// Returns the balance of an address, derived from the full chain history
#[utoipa::path(
    get,
    path = "/api/v1/wallet/balance/{address}",
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_wallet_balance(state: LedgerData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());

    let response = BalanceResponse {
        balance: state.ledger.balance_of(&address),
        address: address.0,
    };

    HttpResponse::Ok().json(response)
}

/// Get transaction history
///
/// Returns every mined transaction involving an address, in chain order
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{address}",
    responses(
        (status = 200, description = "Transaction history retrieved successfully", body = HistoryResponse)
    )
)]
pub async fn get_transaction_history(
    state: LedgerData,
    address: web::Path<String>,
) -> impl Responder {
    let address = Address(address.into_inner());

    let response = HistoryResponse {
        transactions: state.ledger.transactions_for(&address),
        address: address.0,
    };

    HttpResponse::Ok().json(response)
}
