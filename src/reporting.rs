use chrono::Utc;
use tokio::sync::watch;

use crate::alert::{changed_alerts, AlertSender, AlertStateStore};
use crate::config::{AgentConfig, MonitorConfig};
use crate::disk::DiskStatusProvider;
use crate::report::build_report;
use crate::transmit::{ReportTransmitter, ReportTransport};

/// Agent-side reporting loop: one build + alert fan-out + transmit cycle
/// per interval. A failed cycle is logged and never stops the loop; the
/// next tick starts only once this tick (including transmit retries) has
/// fully resolved. Shutdown is observed between ticks and inside waits.
pub async fn run_reporting_loop<P, T, S, ST>(
    config: &AgentConfig,
    provider: &P,
    transmitter: &ReportTransmitter<T>,
    senders: &[S],
    state_store: &ST,
    mut shutdown: watch::Receiver<bool>,
) where
    P: DiskStatusProvider,
    T: ReportTransport,
    S: AlertSender,
    ST: AlertStateStore,
{
    for sender in senders {
        if sender.requires_network_check() && !sender.health_check().await {
            tracing::warn!("Alert sender {} failed its health check", sender.name());
        }
    }

    let mut alert_state = match state_store.load() {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("Could not load alert state, starting empty: {e}");
            Default::default()
        }
    };

    tracing::info!(
        "Reporting loop started for {} (every {:?})",
        config.agent_id,
        config.interval
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let monitor: MonitorConfig = match config.monitor.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let report = build_report(provider, &monitor, &config.agent_id, Utc::now());
        tracing::debug!(
            "Built report with {} drives and {} alerts",
            report.drives.len(),
            report.alerts.len()
        );

        let (to_deliver, next_state) = changed_alerts(&alert_state, &report.alerts);
        for entry in &to_deliver {
            for sender in senders {
                if let Err(e) = sender.send_alert(entry, &shutdown).await {
                    tracing::warn!("Sender {} could not deliver alert: {e}", sender.name());
                }
            }
        }
        if next_state != alert_state {
            if let Err(e) = state_store.save(&next_state) {
                tracing::warn!("Could not persist alert state: {e}");
            }
            alert_state = next_state;
        }

        if transmitter.send_report(&report, &mut shutdown).await {
            tracing::info!("Report cycle completed");
        } else {
            tracing::warn!("Report cycle failed; next tick will try again");
        }

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }

    tracing::info!("Reporting loop stopped");
}
