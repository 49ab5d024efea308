use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dashmap::DashMap;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod ledger;

use api::AppState;
use ledger::Ledger;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain_info,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::validate_chain,
        api::handlers::create_wallet,
        api::handlers::import_wallet,
        api::handlers::get_wallet_balance,
        api::handlers::get_transaction_history
    ),
    components(
        schemas(
            ledger::Block,
            ledger::Transaction,
            ledger::crypto::Address,
            ledger::crypto::DigitalSignature,
            api::handlers::ChainInfoResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::WalletResponse,
            api::handlers::ImportWalletRequest,
            api::handlers::ImportWalletResponse,
            api::handlers::BalanceResponse,
            api::handlers::HistoryResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "Coinledger API",
        version = "1.0.0",
        description = "A minimal proof-of-work ledger API",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // One authoritative in-memory ledger for the process lifetime
    let ledger = Ledger::new();
    info!(
        "Ledger initialized (difficulty {}, mining reward {})",
        ledger.difficulty(),
        ledger.mining_reward()
    );

    let state = web::Data::new(AppState {
        ledger,
        wallets: DashMap::new(),
    });

    info!("Starting HTTP server at http://localhost:8000");

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind(("127.0.0.1", 8000))?
    .run()
    .await
}
