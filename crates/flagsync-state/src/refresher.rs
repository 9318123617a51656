//! The State Refresher: keeps the Supervisor's current state fresh via a
//! periodic, ETag-conditional fetch from the state CDN.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument, warn};

use flagsync_bridge::Supervisor;
use flagsync_transport::{ConditionalGetOutcome, TransportClient};

use crate::config::StateRefresherConfig;
use crate::error::{RefreshError, Result};

struct CacheEntry {
    etag: Option<String>,
    payload: Vec<u8>,
    /// Whether `payload` has already been pushed to the Supervisor as its
    /// current state. Cleared whenever a fresh payload is cached, set once
    /// the push for it succeeds — lets a 304 skip a redundant push.
    pushed: bool,
}

/// Long-lived task that fetches rule state and pushes it into the
/// Supervisor, using an ETag-conditional GET so an unchanged CDN response
/// never re-triggers a guest state reload.
pub struct StateRefresher {
    client: TransportClient,
    supervisor: Arc<Supervisor>,
    client_secret: String,
    config: StateRefresherConfig,
    cache: Mutex<Option<CacheEntry>>,
}

impl StateRefresher {
    pub fn new(
        client: TransportClient,
        supervisor: Arc<Supervisor>,
        client_secret: impl Into<String>,
        config: StateRefresherConfig,
    ) -> Self {
        Self {
            client,
            supervisor,
            client_secret: client_secret.into(),
            config,
            cache: Mutex::new(None),
        }
    }

    fn url(&self) -> String {
        format!(
            "https://{}/{}",
            self.config.cdn_host, self.client_secret
        )
    }

    /// Run the synchronous, bounded-timeout startup fetch. Failure here
    /// means startup fails and the provider never reaches a running state.
    #[instrument(skip(self))]
    pub async fn initial_fetch(&self) -> Result<()> {
        tokio::time::timeout(self.config.initialize_timeout, self.run_cycle())
            .await
            .map_err(|_| RefreshError::StartupTimeout)?
    }

    /// Run the periodic loop until `shutdown` fires. Failures are logged,
    /// never propagated — the loop keeps running.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.fetch_interval) => {
                    if let Err(err) = self.run_cycle().await {
                        error!(error = %err, "state refresh cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("state refresher shutting down");
                        return;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn run_cycle(&self) -> Result<()> {
        let prior_etag = {
            let guard = self.cache.lock().await;
            guard.as_ref().and_then(|c| c.etag.clone())
        };

        match self.fetch(prior_etag.as_deref()).await? {
            ConditionalGetOutcome::Fresh { etag, body } => self.cache_and_push(etag, body).await,
            ConditionalGetOutcome::NotModified => {
                let pending_push = {
                    let guard = self.cache.lock().await;
                    guard.as_ref().map(|c| (c.pushed, c.payload.clone()))
                };
                match pending_push {
                    Some((true, _)) => Ok(()),
                    Some((false, payload)) => {
                        self.supervisor.set_state(payload).await?;
                        let mut guard = self.cache.lock().await;
                        if let Some(entry) = guard.as_mut() {
                            entry.pushed = true;
                        }
                        Ok(())
                    }
                    None => {
                        warn!("304 with no prior cache; retrying without If-None-Match");
                        match self.fetch(None).await? {
                            ConditionalGetOutcome::Fresh { etag, body } => {
                                self.cache_and_push(etag, body).await
                            }
                            ConditionalGetOutcome::NotModified => {
                                Err(RefreshError::NotModifiedWithoutCache)
                            }
                        }
                    }
                }
            }
        }
    }

    /// Cache a freshly fetched payload, push it to the Supervisor, and mark
    /// it pushed only once that push succeeds.
    async fn cache_and_push(&self, etag: Option<String>, body: Vec<u8>) -> Result<()> {
        {
            let mut guard = self.cache.lock().await;
            *guard = Some(CacheEntry {
                etag,
                payload: body.clone(),
                pushed: false,
            });
        }
        self.supervisor.set_state(body).await?;
        let mut guard = self.cache.lock().await;
        if let Some(entry) = guard.as_mut() {
            entry.pushed = true;
        }
        Ok(())
    }

    async fn fetch(&self, if_none_match: Option<&str>) -> Result<ConditionalGetOutcome> {
        match self.client.get_conditional(&self.url(), if_none_match).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Availability preserved: fall back to the cached payload
                // on transport failure, if one exists.
                let cached_payload = {
                    let guard = self.cache.lock().await;
                    guard.as_ref().map(|c| c.payload.clone())
                };
                match cached_payload {
                    Some(payload) => Ok(ConditionalGetOutcome::Fresh {
                        etag: None,
                        body: payload,
                    }),
                    None => Err(err.into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagsync_bridge::{create_engine, Supervisor};
    use flagsync_transport::ClientConfig;
    use wasmtime::Module;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn minimal_wat() -> &'static str {
        r#"
        (module
          (memory (export "memory") 2)
          (global $bump (mut i32) (i32.const 1024))
          (func $alloc (export "alloc") (param $n i32) (result i32)
            (local $block i32) (local $ptr i32)
            (local.set $block (i32.add (local.get $n) (i32.const 4)))
            (local.set $ptr (i32.add (global.get $bump) (i32.const 4)))
            (i32.store (i32.sub (local.get $ptr) (i32.const 4)) (local.get $block))
            (global.set $bump (i32.add (local.get $ptr) (local.get $n)))
            (local.get $ptr))
          (func (export "free") (param $p i32))
          (data (i32.const 64) "\01\00\00\00\00")
          (func $canned (result i32)
            (local $ptr i32)
            (local.set $ptr (call $alloc (i32.const 5)))
            (memory.copy (local.get $ptr) (i32.const 64) (i32.const 5))
            (local.get $ptr))
          (func (export "set_resolver_state") (param $req i32) (result i32) (call $canned))
          (func (export "resolve_with_sticky") (param $req i32) (result i32) (call $canned))
          (func (export "flush_logs") (param $req i32) (result i32) (call $canned))
        )
        "#
    }

    fn test_supervisor() -> Arc<Supervisor> {
        let engine = create_engine().unwrap();
        let module = Module::new(&engine, minimal_wat()).unwrap();
        Arc::new(Supervisor::new(engine, module).unwrap())
    }

    /// A guest whose `set_resolver_state` traps on its second call, so any
    /// test driving it can tell a redundant push apart from a skipped one.
    fn traps_on_second_set_state_wat() -> &'static str {
        r#"
        (module
          (memory (export "memory") 2)
          (global $bump (mut i32) (i32.const 1024))
          (global $calls (mut i32) (i32.const 0))
          (func $alloc (export "alloc") (param $n i32) (result i32)
            (local $block i32) (local $ptr i32)
            (local.set $block (i32.add (local.get $n) (i32.const 4)))
            (local.set $ptr (i32.add (global.get $bump) (i32.const 4)))
            (i32.store (i32.sub (local.get $ptr) (i32.const 4)) (local.get $block))
            (global.set $bump (i32.add (local.get $ptr) (local.get $n)))
            (local.get $ptr))
          (func (export "free") (param $p i32))
          (data (i32.const 64) "\01\00\00\00\00")
          (func $canned (result i32)
            (local $ptr i32)
            (local.set $ptr (call $alloc (i32.const 5)))
            (memory.copy (local.get $ptr) (i32.const 64) (i32.const 5))
            (local.get $ptr))
          (func (export "set_resolver_state") (param $req i32) (result i32)
            (global.set $calls (i32.add (global.get $calls) (i32.const 1)))
            (if (i32.gt_s (global.get $calls) (i32.const 1)) (then (unreachable)))
            (call $canned))
          (func (export "resolve_with_sticky") (param $req i32) (result i32) (call $canned))
          (func (export "flush_logs") (param $req i32) (result i32) (call $canned))
        )
        "#
    }

    #[tokio::test]
    async fn fresh_fetch_caches_and_pushes_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_bytes(b"rules-v1".to_vec()),
            )
            .mount(&server)
            .await;

        let client = TransportClient::new(ClientConfig::default()).unwrap();
        let supervisor = test_supervisor();
        let config = StateRefresherConfig::builder()
            .with_cdn_host(server.uri().trim_start_matches("http://"))
            .build();
        let refresher = StateRefresher::new(client, supervisor, "secret", config);

        refresher.run_cycle().await.unwrap();

        let cached = refresher.cache.lock().await;
        assert_eq!(cached.as_ref().unwrap().payload, b"rules-v1".to_vec());
        assert_eq!(cached.as_ref().unwrap().etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn not_modified_reuses_cached_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_bytes(b"rules-v1".to_vec()),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = TransportClient::new(ClientConfig::default()).unwrap();
        let supervisor = test_supervisor();
        let config = StateRefresherConfig::builder()
            .with_cdn_host(server.uri().trim_start_matches("http://"))
            .build();
        let refresher = StateRefresher::new(client, supervisor, "secret", config);

        refresher.run_cycle().await.unwrap();
        refresher.run_cycle().await.unwrap();

        let cached = refresher.cache.lock().await;
        assert_eq!(cached.as_ref().unwrap().payload, b"rules-v1".to_vec());
    }

    #[tokio::test]
    async fn not_modified_does_not_repush_already_current_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_bytes(b"rules-v1".to_vec()),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = TransportClient::new(ClientConfig::default()).unwrap();
        let engine = create_engine().unwrap();
        let module = Module::new(&engine, traps_on_second_set_state_wat()).unwrap();
        let supervisor = Arc::new(Supervisor::new(engine, module).unwrap());
        let config = StateRefresherConfig::builder()
            .with_cdn_host(server.uri().trim_start_matches("http://"))
            .build();
        let refresher = StateRefresher::new(client, supervisor, "secret", config);

        // First cycle: 200, one push (the guest's only allowed call).
        refresher.run_cycle().await.unwrap();
        // Second cycle: 304. If this repushed, the guest would trap and
        // this would return Err instead of Ok.
        refresher.run_cycle().await.unwrap();

        let cached = refresher.cache.lock().await;
        assert!(cached.as_ref().unwrap().pushed);
    }
}
