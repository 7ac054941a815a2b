use smoke_tracker::{
    clock::SystemClock, router, AppState, Config, FileStore, MirroredStore, StorageProvider,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let primary: Arc<dyn StorageProvider> = Arc::new(FileStore::new(&config.data_path));
    let storage: Arc<dyn StorageProvider> = match &config.mirror_path {
        Some(mirror) => {
            info!(mirror = %mirror.display(), "mirroring writes");
            Arc::new(MirroredStore::new(primary, Arc::new(FileStore::new(mirror))))
        }
        None => primary,
    };

    info!(path = %config.data_path.display(), "using data file");
    let state = AppState::load(storage, Arc::new(SystemClock)).await;
    let app = router(state.clone());

    let addr = config.addr();
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.flush().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
