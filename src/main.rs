//! Lightshop Storefront - local cart service

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightshop_storefront::api::{router, AppState};
use lightshop_storefront::{CartStore, FileStore, SharedStore, ShopClient, StorefrontConfig, ViewScope};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StorefrontConfig::from_env();
    let storage: SharedStore = Arc::new(
        FileStore::open(&config.storage_dir).with_context(|| format!("opening cart storage at {}", config.storage_dir.display()))?,
    );
    let store = CartStore::open(storage, config.cart.clone());
    let client = ShopClient::new(&config.shop_api_url, &config.fee_table_path)?;
    let scope = ViewScope::new();
    let app = router(AppState::new(store, client, scope.clone(), config.low_stock_threshold));

    info!("🚀 Lightshop Storefront listening on 0.0.0.0:{} (shop API {})", config.port, config.shop_api_url);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(scope)).await?;

    info!("Storefront shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and closes the scope so in-flight shop
/// responses no longer touch the cart.
async fn shutdown_signal(scope: ViewScope) {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    scope.close();
}
