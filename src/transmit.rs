use std::time::Duration;

use tokio::sync::watch;

use crate::models::AgentReport;

/// Transport-level failure (refused connection, timeout, DNS). Always
/// retryable, unlike an HTTP 4xx answer.
#[derive(Debug)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transport failure: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Seam between the retry policy and the actual HTTP stack. Returns the
/// response status code, or a `TransportError` when no response arrived.
pub trait ReportTransport {
    fn post_report(
        &self,
        report: &AgentReport,
    ) -> impl std::future::Future<Output = Result<u16, TransportError>> + Send;
}

/// Production transport: POSTs the report as JSON to the configured
/// endpoint, attaching `X-API-Key` when a key is set.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

impl ReportTransport for HttpTransport {
    async fn post_report(&self, report: &AgentReport) -> Result<u16, TransportError> {
        let mut request = self.client.post(&self.endpoint).json(report);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Sends a report with a bounded, caller-supplied retry schedule.
///
/// One attempt is made per delay slot plus the initial try. 5xx answers and
/// transport failures are retried; 4xx answers are client defects and abort
/// immediately. The result is always a boolean, never an error.
pub struct ReportTransmitter<T: ReportTransport> {
    transport: T,
    retry_delays: Vec<Duration>,
}

impl<T: ReportTransport> ReportTransmitter<T> {
    pub fn new(transport: T, retry_delays: Vec<Duration>) -> Self {
        Self {
            transport,
            retry_delays,
        }
    }

    /// Returns true once the server accepted the report. Observes the
    /// shutdown signal during attempts and between-attempt waits.
    pub async fn send_report(
        &self,
        report: &AgentReport,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let attempts = self.retry_delays.len() + 1;
        for attempt in 1..=attempts {
            if *shutdown.borrow() {
                tracing::info!("Transmit cancelled before attempt {attempt}");
                return false;
            }

            let outcome = tokio::select! {
                res = self.transport.post_report(report) => res,
                _ = cancelled(shutdown) => {
                    tracing::info!("Transmit cancelled during attempt {attempt}");
                    return false;
                }
            };

            match outcome {
                Ok(status) if (200..300).contains(&status) => {
                    tracing::debug!(
                        "Report for {} accepted on attempt {attempt}",
                        report.agent_id
                    );
                    return true;
                }
                Ok(status) if (400..500).contains(&status) => {
                    tracing::error!(
                        "Server rejected report with status {status}; not retrying"
                    );
                    return false;
                }
                Ok(status) => {
                    tracing::warn!("Server answered {status} on attempt {attempt}/{attempts}");
                }
                Err(e) => {
                    tracing::warn!("Attempt {attempt}/{attempts} failed: {e}");
                }
            }

            if attempt < attempts {
                let delay = self.retry_delays[attempt - 1];
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancelled(shutdown) => {
                        tracing::info!("Transmit cancelled while waiting to retry");
                        return false;
                    }
                }
            }
        }

        tracing::error!(
            "Giving up on report for {} after {attempts} attempts",
            report.agent_id
        );
        false
    }
}

/// Resolves once the shutdown flag flips true, or the sender side is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
