//! Genia Gateway - Entry Point

use genia_gateway::{
    AppState, Config, GatewayServer, HttpUserAuth, RecordStore, StripeCheckout, StubResponder,
    TwilioDispatcher,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let json_logs = std::env::var("GENIA_LOG_JSON")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Genia Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let store = Arc::new(RecordStore::open(&config.db_path)?);
    let dispatcher = Arc::new(TwilioDispatcher::new(config.twilio.clone()));

    let mut state = AppState::new(config.clone(), store, dispatcher, Arc::new(StubResponder));
    if let Some(auth_url) = &config.auth_url {
        state = state.with_auth(Arc::new(HttpUserAuth::new(auth_url)));
    }
    if let Some(secret) = &config.stripe_secret_key {
        state = state.with_checkout(Arc::new(StripeCheckout::new(secret)));
    }

    GatewayServer::new(Arc::new(state)).run().await
}
