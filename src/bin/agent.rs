use disksentry::alert::{JsonFileStateStore, LogAlertSender};
use disksentry::config::AgentConfig;
use disksentry::disk::SystemDisks;
use disksentry::reporting::run_reporting_loop;
use disksentry::transmit::{HttpTransport, ReportTransmitter};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    disksentry::init_tracing();

    match dotenvy::dotenv() {
        Ok(path) => tracing::info!("Loaded env file from {path:?}"),
        Err(_) => tracing::debug!("No env file found, using the process environment"),
    }

    let config = match AgentConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid agent configuration: {e}");
            return;
        }
    };

    tracing::info!("Starting the reporting loop...");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::task::spawn(async move {
        let transport = HttpTransport::new(config.report_endpoint(), config.api_key.clone());
        let transmitter = ReportTransmitter::new(transport, config.retry_delays.clone());
        let senders = [LogAlertSender];
        let state_store = JsonFileStateStore::new(config.state_path.clone());
        run_reporting_loop(
            &config,
            &SystemDisks,
            &transmitter,
            &senders,
            &state_store,
            shutdown_rx,
        )
        .await
    });

    shutdown_signal(shutdown_tx).await;

    tracing::info!("Joining reporting task...");
    match handle.await {
        Ok(()) => tracing::info!("Agent gracefully shutdown."),
        Err(e) => tracing::error!("Reporting task failed to join: {e}"),
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
        tracing::warn!("Reporting loop was already gone");
    }
}
