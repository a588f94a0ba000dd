use disksentry::config::ServerConfig;
use disksentry::server::{router, AppState};
use disksentry::store::{retention_task, ReportStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    disksentry::init_tracing();

    match dotenvy::dotenv() {
        Ok(path) => tracing::info!("Loaded env file from {path:?}"),
        Err(_) => tracing::debug!("No env file found, using the process environment"),
    }

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid server configuration: {e}");
            return;
        }
    };

    tracing::info!("Initializing the database connection...");
    let store = match ReportStore::connect(&config.database_url) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create database connection pool: {e}");
            return;
        }
    };

    tracing::info!("Initializing the database schema...");
    if let Err(e) = store.init_schema().await {
        tracing::error!("Failed to initialize database schema: {e}");
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let retention_handle = config.retention_max_age.map(|max_age| {
        tracing::info!("Starting the retention task...");
        tokio::task::spawn(retention_task(
            store.clone(),
            max_age,
            config.retention_sweep_interval,
            shutdown_rx.clone(),
        ))
    });

    let app = router(AppState {
        store,
        api_key: config.api_key.clone(),
    });

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(lstnr) => lstnr,
        Err(e) => {
            tracing::error!("Failed to make listener: {e}");
            return;
        }
    };

    match axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
    {
        Ok(()) => (),
        Err(e) => {
            tracing::error!("An error occurred: {e}");
            return;
        }
    }

    if let Some(handle) = retention_handle {
        tracing::info!("Joining retention task...");
        match handle.await {
            Ok(()) => tracing::info!("Retention task gracefully shutdown."),
            Err(e) => tracing::error!("Retention task failed to join: {e}"),
        }
    }
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c_sig = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to handle ctrl-c")
    };

    #[cfg(unix)]
    let terminate_sig = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Could not hook to terminate signal.")
            .recv()
            .await
    };

    #[cfg(not(unix))]
    let terminate_sig = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c_sig => {
            tracing::info!("Shutting down due to ctrl-c...");
        }
        _ = terminate_sig => {
            tracing::info!("Shutting down due to terminate...");
        }
    }
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Background tasks were already gone");
    }
}
