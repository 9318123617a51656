use serde::Deserialize;
use std::time::Duration;

/// Configuration for the [`crate::StateRefresher`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateRefresherConfig {
    /// Host serving `GET /<client-secret>` with state payloads and ETags.
    /// The value below is a placeholder; real deployments override it.
    pub cdn_host: String,
    /// Seconds between refreshes once running.
    pub fetch_interval: Duration,
    /// Seconds to wait for the synchronous startup fetch before failing.
    pub initialize_timeout: Duration,
}

impl Default for StateRefresherConfig {
    fn default() -> Self {
        Self {
            cdn_host: "state.flagsync.example".to_string(),
            fetch_interval: Duration::from_secs(30),
            initialize_timeout: Duration::from_secs(30),
        }
    }
}

impl StateRefresherConfig {
    pub fn builder() -> StateRefresherConfigBuilder {
        StateRefresherConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct StateRefresherConfigBuilder {
    config: StateRefresherConfig,
}

impl StateRefresherConfigBuilder {
    pub fn with_cdn_host(mut self, host: impl Into<String>) -> Self {
        self.config.cdn_host = host.into();
        self
    }

    pub fn with_fetch_interval(mut self, interval: Duration) -> Self {
        self.config.fetch_interval = interval;
        self
    }

    pub fn with_initialize_timeout(mut self, timeout: Duration) -> Self {
        self.config.initialize_timeout = timeout;
        self
    }

    pub fn build(self) -> StateRefresherConfig {
        self.config
    }
}
