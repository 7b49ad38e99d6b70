//! Land registry server

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use land_registry::{
    auth::Role,
    config::{Args, Backend},
    db::MongoStore,
    ledger::{InMemoryLedger, LedgerStore},
    server::{self, AppState},
    services::{spawn_logging_listener, EventBus, Services},
    store::{InMemoryStore, RegistryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("land_registry={},info", args.log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Land Registry");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Backend: {:?}", args.backend);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Search limit: {}", args.search_limit);
    info!("======================================");

    let jwt = args.jwt_validator()?;
    let store = open_store(&args).await?;

    let events = Arc::new(EventBus::with_capacity(args.event_bus_capacity));
    spawn_logging_listener(Arc::clone(&events));

    let services = Services::new(store, events, args.search_limit);
    let state = Arc::new(AppState::new(args, services, jwt));

    server::run(state).await?;
    info!("Land registry stopped");
    Ok(())
}

async fn open_store(args: &Args) -> anyhow::Result<Arc<dyn RegistryStore>> {
    match args.backend {
        Backend::Memory => {
            if !args.dev_mode {
                warn!("In-memory backend selected - registry state is lost on restart");
            }
            Ok(Arc::new(InMemoryStore::new()))
        }
        Backend::Mongo => {
            info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
            let store = MongoStore::connect(&args.mongodb_uri, &args.mongodb_db).await?;
            info!("MongoDB connected successfully");
            Ok(Arc::new(store))
        }
        Backend::Ledger => {
            let chain = Arc::new(InMemoryLedger::new(&args.ledger_admin));
            let store = LedgerStore::new(
                chain,
                args.ledger_confirmations,
                args.ledger_receipt_timeout(),
            );
            for official in args.ledger_official_accounts() {
                store
                    .grant_role(&args.ledger_admin, official, Role::Official)
                    .await?;
            }
            info!(
                "Ledger genesis: admin {}, {} official(s), {} confirmation(s)",
                args.ledger_admin,
                args.ledger_official_accounts().count(),
                args.ledger_confirmations
            );
            Ok(Arc::new(store))
        }
    }
}
