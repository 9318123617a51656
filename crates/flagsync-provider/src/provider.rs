//! The Provider Façade: typed flag-value accessors over the sandboxed
//! resolver host, tying together the Supervisor, State Refresher, and
//! Telemetry Flusher into one lifecycle.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use wasmtime::Module;

use flagsync_abi::{
    EvaluationContext, ResolveRequest, ResolveWithStickyRequest, ResolveWithStickyResponse,
};
use flagsync_bridge::{create_engine, Supervisor};
use flagsync_state::StateRefresher;
use flagsync_telemetry::TelemetryFlusher;
use flagsync_transport::{ClientConfig, TransportClient};

use crate::config::ProviderConfig;
use crate::error::{FacadeError, Result};
use crate::resolution::ResolutionDetails;

/// A connected resolver host: a live guest instance plus its two
/// background pipelines. Construct with [`Provider::connect`]; always call
/// [`Provider::shutdown`] before dropping so the final log flush runs.
pub struct Provider {
    client_secret: String,
    supervisor: Arc<Supervisor>,
    shutdown_tx: watch::Sender<bool>,
    state_task: JoinHandle<()>,
    flush_task: JoinHandle<()>,
}

impl Provider {
    /// Compile the guest module, run the synchronous bounded initial state
    /// fetch, and spawn the refresher and flusher background tasks.
    ///
    /// Mirrors `ConfidenceServerProviderLocal.initialize`: a timeout or
    /// failure during the initial fetch fails the whole connect call, the
    /// provider never reaches a running state.
    #[instrument(skip(config))]
    pub async fn connect(config: ProviderConfig) -> Result<Self> {
        let engine = create_engine().map_err(|e| FacadeError::StartupFailed(e.to_string()))?;
        let module = Module::from_file(&engine, &config.wasm_module_path)
            .map_err(|e| FacadeError::StartupFailed(e.to_string()))?;
        let supervisor = Arc::new(Supervisor::new(engine, module)?);

        let transport = TransportClient::new(config.transport.clone())
            .map_err(|e| FacadeError::StartupFailed(e.to_string()))?;

        let refresher = Arc::new(StateRefresher::new(
            transport,
            Arc::clone(&supervisor),
            config.client_secret.clone(),
            config.state.clone(),
        ));
        refresher.initial_fetch().await?;

        // The flusher gets its own client: log flushes are logged-not-retried
        // on failure (the next scheduled flush carries the backlog forward),
        // so it must not inherit the refresher's synchronous retry policy.
        // Its per-request timeout is also distinct from the fetch timeout.
        let flush_transport_config = ClientConfig {
            retry: None,
            timeout: config.telemetry.flush_timeout,
            ..config.transport.clone()
        };
        let flush_transport = TransportClient::new(flush_transport_config)
            .map_err(|e| FacadeError::StartupFailed(e.to_string()))?;

        let flusher = Arc::new(TelemetryFlusher::new(
            flush_transport,
            Arc::clone(&supervisor),
            config.telemetry.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state_task = tokio::spawn({
            let refresher = Arc::clone(&refresher);
            let shutdown_rx = shutdown_rx.clone();
            async move { refresher.run(shutdown_rx).await }
        });
        let flush_task = tokio::spawn({
            let flusher = Arc::clone(&flusher);
            async move { flusher.run(shutdown_rx).await }
        });

        info!("provider connected and ready");

        Ok(Self {
            client_secret: config.client_secret,
            supervisor,
            shutdown_tx,
            state_task,
            flush_task,
        })
    }

    /// Signal both background tasks to stop, wait for them, and attempt
    /// one final best-effort flush (already covered by the flusher's own
    /// shutdown-budgeted flush as its loop exits).
    pub async fn shutdown(self) {
        info!("shutting down provider");
        let _ = self.shutdown_tx.send(true);

        if let Err(err) = self.state_task.await {
            warn!(error = %err, "state refresher task panicked");
        }
        if let Err(err) = self.flush_task.await {
            warn!(error = %err, "telemetry flusher task panicked");
        }
    }

    pub async fn resolve_bool(
        &self,
        flag_key: &str,
        default_value: bool,
        context: Option<EvaluationContext>,
    ) -> Result<ResolutionDetails<bool>> {
        let resolved = self.resolve_value(flag_key, context).await?;
        match resolved.value.as_bool() {
            Some(value) => Ok(ResolutionDetails {
                value,
                reason: resolved.reason,
                variant: resolved.variant,
            }),
            None => {
                let _ = default_value;
                Err(type_mismatch(flag_key, "bool", &resolved.value))
            }
        }
    }

    pub async fn resolve_string(
        &self,
        flag_key: &str,
        default_value: String,
        context: Option<EvaluationContext>,
    ) -> Result<ResolutionDetails<String>> {
        let resolved = self.resolve_value(flag_key, context).await?;
        match resolved.value.as_str() {
            Some(value) => Ok(ResolutionDetails {
                value: value.to_string(),
                reason: resolved.reason,
                variant: resolved.variant,
            }),
            None => {
                let _ = default_value;
                Err(type_mismatch(flag_key, "string", &resolved.value))
            }
        }
    }

    pub async fn resolve_int(
        &self,
        flag_key: &str,
        default_value: i64,
        context: Option<EvaluationContext>,
    ) -> Result<ResolutionDetails<i64>> {
        let resolved = self.resolve_value(flag_key, context).await?;
        match resolved.value.as_f64() {
            Some(n) if n.fract() == 0.0 => Ok(ResolutionDetails {
                value: n as i64,
                reason: resolved.reason,
                variant: resolved.variant,
            }),
            _ => {
                let _ = default_value;
                Err(type_mismatch(flag_key, "integer", &resolved.value))
            }
        }
    }

    pub async fn resolve_float(
        &self,
        flag_key: &str,
        default_value: f64,
        context: Option<EvaluationContext>,
    ) -> Result<ResolutionDetails<f64>> {
        let resolved = self.resolve_value(flag_key, context).await?;
        match resolved.value.as_f64() {
            Some(value) => Ok(ResolutionDetails {
                value,
                reason: resolved.reason,
                variant: resolved.variant,
            }),
            None => {
                let _ = default_value;
                Err(type_mismatch(flag_key, "float", &resolved.value))
            }
        }
    }

    /// Resolve an object/list flag without a type assertion: any resolved
    /// value is returned as-is, matching the leniency of the source
    /// provider's `resolve_object_details`.
    pub async fn resolve_object(
        &self,
        flag_key: &str,
        context: Option<EvaluationContext>,
    ) -> Result<ResolutionDetails<flagsync_abi::Value>> {
        self.resolve_value(flag_key, context).await
    }

    #[instrument(skip(self, context))]
    async fn resolve_value(
        &self,
        flag_key: &str,
        context: Option<EvaluationContext>,
    ) -> Result<ResolutionDetails<flagsync_abi::Value>> {
        let mut parts = flag_key.split('.');
        let flag_name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FacadeError::FlagNotFound {
                flag_key: flag_key.to_string(),
            })?
            .to_string();
        let path: Vec<String> = parts.map(str::to_string).collect();

        let request = ResolveWithStickyRequest {
            resolve: ResolveRequest {
                flags: vec![flag_name.clone()],
                client_secret: self.client_secret.clone(),
                apply: true,
                context: context.unwrap_or_default(),
            },
            fail_fast_on_sticky: true,
        };

        let payload = serde_json::to_vec(&request)?;
        let response_bytes = self.supervisor.resolve(&payload).await?;
        let response: ResolveWithStickyResponse = serde_json::from_slice(&response_bytes)?;

        let success = match response {
            ResolveWithStickyResponse::Success(success) => success,
            ResolveWithStickyResponse::MissingMaterializations => {
                return Err(FacadeError::RequiresRemoteFallback { flag_key: flag_name });
            }
        };

        let resolved_flag = success
            .resolved_flags
            .into_iter()
            .find(|f| f.flag == flag_name)
            .ok_or_else(|| FacadeError::FlagNotFound {
                flag_key: flag_name.clone(),
            })?;

        let value = if path.is_empty() {
            resolved_flag.value
        } else {
            resolved_flag
                .value
                .navigate(&path)
                .cloned()
                .ok_or_else(|| FacadeError::PathNotFound {
                    flag_key: flag_name.clone(),
                    path: path.join("."),
                })?
        };

        Ok(ResolutionDetails {
            value,
            reason: resolved_flag.reason,
            variant: resolved_flag.variant,
        })
    }
}

fn type_mismatch(flag_key: &str, expected: &'static str, actual: &flagsync_abi::Value) -> FacadeError {
    FacadeError::TypeMismatch {
        flag_key: flag_key.to_string(),
        expected,
        actual: value_kind(actual),
    }
}

fn value_kind(value: &flagsync_abi::Value) -> &'static str {
    match value {
        flagsync_abi::Value::Null => "null",
        flagsync_abi::Value::Bool(_) => "bool",
        flagsync_abi::Value::Number(_) => "number",
        flagsync_abi::Value::String(_) => "string",
        flagsync_abi::Value::List(_) => "list",
        flagsync_abi::Value::Map(_) => "map",
    }
}
