use serde::Deserialize;
use std::time::Duration;

/// Configuration for the [`crate::TelemetryFlusher`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryFlusherConfig {
    /// Host serving `POST /v1/flagLogs:write`. The value below is a
    /// placeholder; real deployments override it.
    pub sink_host: String,
    /// Seconds between flushes once running.
    pub flush_interval: Duration,
    /// Per-request timeout for a log flush POST.
    pub flush_timeout: Duration,
    /// Budget for the final, best-effort flush attempted at shutdown.
    pub shutdown_flush_timeout: Duration,
}

impl Default for TelemetryFlusherConfig {
    fn default() -> Self {
        Self {
            sink_host: "logs.flagsync.example".to_string(),
            flush_interval: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(5),
            shutdown_flush_timeout: Duration::from_secs(3),
        }
    }
}

impl TelemetryFlusherConfig {
    pub fn builder() -> TelemetryFlusherConfigBuilder {
        TelemetryFlusherConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct TelemetryFlusherConfigBuilder {
    config: TelemetryFlusherConfig,
}

impl TelemetryFlusherConfigBuilder {
    pub fn with_sink_host(mut self, host: impl Into<String>) -> Self {
        self.config.sink_host = host.into();
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout = timeout;
        self
    }

    pub fn with_shutdown_flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_flush_timeout = timeout;
        self
    }

    pub fn build(self) -> TelemetryFlusherConfig {
        self.config
    }
}
