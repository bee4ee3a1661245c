//! bank-rest application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Open the account and revocation store (memory or Redis)
//! 3. Wire the signing keys, credential verifier and session authority
//! 4. Create the bootstrap admin account if configured
//! 5. Build router with the request gate, CORS and security headers
//! 6. Start Axum server
//!
//! Also supports a `keygen` subcommand for generating a signing secret.

use bank_rest::{
    auth::{
        clock::{Clock, SystemClock},
        keys::generate_secret_base64,
        middleware::AppState,
        verify::{validate_password, validate_username},
    },
    cleanup,
    config::{Config, StoreBackend},
    models::Role,
    routes,
    storage::{memory::MemoryStore, AccountStore, RedisStore, RevocationStore},
};
use std::sync::Arc;
use std::time::Duration;

fn print_keygen_usage() {
    eprintln!("Usage: bank-rest keygen");
    eprintln!();
    eprintln!("Generate a random 256-bit signing secret for JWT_SECRET.");
    eprintln!();
    eprintln!("Then set in .env:");
    eprintln!("  JWT_SECRET=<output>");
}

#[tokio::main]
async fn main() {
    // Check for keygen subcommand
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && args[1] == "keygen" {
        if args.len() != 2 {
            print_keygen_usage();
            std::process::exit(1);
        }
        println!("{}", generate_secret_base64());
        return;
    }
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting bank-rest on {}", config.bind_addr);
    tracing::debug!(?config, "Loaded configuration");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Open the store
    let (accounts, revocations): (Arc<dyn AccountStore>, Arc<dyn RevocationStore>) =
        match &config.store_backend {
            StoreBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                tokio::spawn(cleanup::run_prune_loop(
                    store.clone(),
                    clock.clone(),
                    Duration::from_secs(config.revocation_prune_interval_secs.max(1)),
                ));
                tracing::warn!("Using in-memory store; accounts are lost on restart");
                let accounts: Arc<dyn AccountStore> = store.clone();
                let revocations: Arc<dyn RevocationStore> = store;
                (accounts, revocations)
            }
            StoreBackend::Redis { url } => {
                let store = Arc::new(
                    RedisStore::connect(url)
                        .await
                        .expect("Failed to connect to Redis"),
                );
                tracing::info!("Connected to Redis");
                let accounts: Arc<dyn AccountStore> = store.clone();
                let revocations: Arc<dyn RevocationStore> = store;
                (accounts, revocations)
            }
        };

    let bootstrap_admin = config.admin_username.clone().zip(config.admin_password.clone());
    let bind_addr = config.bind_addr;

    // Build shared state
    let state = AppState::build(config, accounts, revocations, clock)
        .expect("Failed to initialise auth components");

    // Create the bootstrap admin account (no-op if the username exists)
    if let Some((username, password)) = bootstrap_admin {
        validate_username(&username).expect("Invalid ADMIN_USERNAME");
        validate_password(&password).expect("Invalid ADMIN_PASSWORD");
        let created = state
            .authority
            .ensure_account(&username, password, Role::Admin)
            .await
            .expect("Failed to create admin user");
        if created {
            tracing::info!(action = "admin_bootstrapped", username = %username, "Admin user created");
        } else {
            tracing::info!("Admin user '{}' already exists", username);
        }
    }

    let app = routes::app(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
