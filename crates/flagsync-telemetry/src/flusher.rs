//! The Telemetry Flusher: periodically drains the Supervisor's salvage
//! buffer and ships it to the remote log sink.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use flagsync_bridge::Supervisor;
use flagsync_transport::TransportClient;

use crate::config::TelemetryFlusherConfig;
use crate::error::Result;

/// `Content-Type` the remote log sink expects for a flush body.
pub const LOG_CONTENT_TYPE: &str = "application/x-protobuf";

pub struct TelemetryFlusher {
    client: TransportClient,
    supervisor: Arc<Supervisor>,
    config: TelemetryFlusherConfig,
}

impl TelemetryFlusher {
    pub fn new(
        client: TransportClient,
        supervisor: Arc<Supervisor>,
        config: TelemetryFlusherConfig,
    ) -> Self {
        Self {
            client,
            supervisor,
            config,
        }
    }

    fn url(&self) -> String {
        format!("https://{}/v1/flagLogs:write", self.config.sink_host)
    }

    /// Run the periodic loop until `shutdown` fires, then attempt one
    /// final best-effort flush within the configured budget.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.flush_interval) => {
                    self.flush_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("telemetry flusher shutting down");
                        break;
                    }
                }
            }
        }

        let budget = self.config.shutdown_flush_timeout;
        match tokio::time::timeout(budget, self.flush_once()).await {
            Ok(()) => debug!("final shutdown flush completed"),
            Err(_) => warn!("final shutdown flush abandoned after {:?}", budget),
        }
    }

    /// Drain the Supervisor's buffered logs and ship them. Skips the HTTP
    /// call entirely if there is nothing to send. Failures are logged,
    /// never propagated — the bytes are already out of the salvage
    /// buffer and are not re-buffered on failure.
    #[instrument(skip(self))]
    pub async fn flush_once(&self) {
        match self.try_flush().await {
            Ok(true) => debug!("flushed evaluation logs"),
            Ok(false) => debug!("no evaluation logs to flush"),
            Err(err) => error!(error = %err, "log flush failed"),
        }
    }

    async fn try_flush(&self) -> Result<bool> {
        let bytes = self.supervisor.flush_logs().await?;
        if bytes.is_empty() {
            return Ok(false);
        }
        self.client
            .post_bytes(&self.url(), LOG_CONTENT_TYPE, bytes)
            .await?;
        Ok(true)
    }
}
