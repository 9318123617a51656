use std::path::PathBuf;

use serde::Deserialize;

use flagsync_state::StateRefresherConfig;
use flagsync_telemetry::TelemetryFlusherConfig;
use flagsync_transport::ClientConfig;

/// Top-level configuration for a [`crate::Provider`], aggregating the
/// per-component configs of the state refresher, telemetry flusher, and
/// HTTP transport.
///
/// `transport`, `state`, and `telemetry` fall back to their own defaults
/// when absent from a deserialized config file or environment layer;
/// `wasm_module_path` and `client_secret` are always required.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub wasm_module_path: PathBuf,
    pub client_secret: String,
    #[serde(default)]
    pub transport: ClientConfig,
    #[serde(default)]
    pub state: StateRefresherConfig,
    #[serde(default)]
    pub telemetry: TelemetryFlusherConfig,
}

impl ProviderConfig {
    pub fn builder(wasm_module_path: impl Into<PathBuf>, client_secret: impl Into<String>) -> ProviderConfigBuilder {
        ProviderConfigBuilder {
            config: ProviderConfig {
                wasm_module_path: wasm_module_path.into(),
                client_secret: client_secret.into(),
                transport: ClientConfig::default(),
                state: StateRefresherConfig::default(),
                telemetry: TelemetryFlusherConfig::default(),
            },
        }
    }
}

#[derive(Debug)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    pub fn with_transport(mut self, transport: ClientConfig) -> Self {
        self.config.transport = transport;
        self
    }

    pub fn with_state(mut self, state: StateRefresherConfig) -> Self {
        self.config.state = state;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryFlusherConfig) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    pub fn build(self) -> ProviderConfig {
        self.config
    }
}
