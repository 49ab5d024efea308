use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// Fixed `/transactions/...` segments are registered before the
/// `{address}` capture so they are matched first.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain_info))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/transactions/new", web::post().to(handlers::new_transaction))
            .route("/transactions/{address}", web::get().to(handlers::get_transaction_history))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/wallet/new", web::post().to(handlers::create_wallet))
            .route("/wallet/import", web::post().to(handlers::import_wallet))
            .route("/wallet/balance/{address}", web::get().to(handlers::get_wallet_balance)),
    );
}
