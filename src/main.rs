use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use insightdb::config::Settings;
use insightdb::construct::Database;
use insightdb::interface::InsightFacade;
use insightdb::server::router;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database = Database::new(settings.persistence_mode())?;
    let facade = Arc::new(InsightFacade::new(Arc::new(database)));
    let datasets = facade.list_datasets()?;
    info!(persisted = datasets.len(), "database opened");

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!(address = %settings.bind_address, "listening");
    axum::serve(listener, router(facade))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
