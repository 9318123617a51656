//! End-to-end scenarios exercising the full connect → resolve → trap →
//! reload → shutdown lifecycle against mock CDN and log-sink servers.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flagsync::{EvaluationContext, Provider, ProviderConfig, Value};
use flagsync_transport::ClientConfig;

fn wat_escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}

/// Build a guest module whose `resolve_with_sticky` returns `resolve_envelope`
/// and whose other two entry points return an empty `Response::Data`,
/// optionally trapping on resolve when `trap_on_resolve` is set.
fn build_guest_wat(resolve_envelope: &[u8], trap_on_resolve: bool) -> String {
    let empty_envelope = flagsync_abi::encode_response(&flagsync_abi::Response::ok(Vec::new()));
    let resolve_data = wat_escape(resolve_envelope);
    let resolve_len = resolve_envelope.len();
    let empty_data = wat_escape(&empty_envelope);
    let empty_len = empty_envelope.len();

    let resolve_body = if trap_on_resolve {
        "(unreachable)".to_string()
    } else {
        "(call $canned_resolve)".to_string()
    };

    format!(
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
          (data (i32.const 65536) "{resolve_data}")
          (data (i32.const 98304) "{empty_data}")
          (func $canned_resolve (result i32)
            (local $ptr i32)
            (local.set $ptr (call $alloc (i32.const {resolve_len})))
            (memory.copy (local.get $ptr) (i32.const 65536) (i32.const {resolve_len}))
            (local.get $ptr))
          (func $canned_empty (result i32)
            (local $ptr i32)
            (local.set $ptr (call $alloc (i32.const {empty_len})))
            (memory.copy (local.get $ptr) (i32.const 98304) (i32.const {empty_len}))
            (local.get $ptr))
          (func (export "set_resolver_state") (param $req i32) (result i32) (call $canned_empty))
          (func (export "resolve_with_sticky") (param $req i32) (result i32) {resolve_body})
          (func (export "flush_logs") (param $req i32) (result i32) (call $canned_empty))
        )
        "#
    )
}

fn resolve_envelope_for(value: Value) -> Vec<u8> {
    let response = flagsync_abi::ResolveWithStickyResponse::Success(flagsync_abi::ResolveSuccess {
        resolved_flags: vec![flagsync_abi::ResolvedFlag {
            flag: "my-flag".to_string(),
            value,
            variant: "on".to_string(),
            reason: flagsync_abi::ResolveReason::Match,
        }],
    });
    let json = serde_json::to_vec(&response).unwrap();
    flagsync_abi::encode_response(&flagsync_abi::Response::ok(json))
}

fn write_guest_module(wat: &str, suffix: &str) -> std::path::PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "flagsync-integration-{}-{}-{}.wat",
        std::process::id(),
        n,
        suffix
    ));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(wat.as_bytes()).unwrap();
    path
}

#[tokio::test]
async fn connects_resolves_and_shuts_down() {
    let cdn = MockServer::start().await;
    let sink = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/client-secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_bytes(b"state-v1".to_vec()),
        )
        .mount(&cdn)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/flagLogs:write"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&sink)
        .await;

    let envelope = resolve_envelope_for(Value::Bool(true));
    let wasm_path = write_guest_module(&build_guest_wat(&envelope, false), "healthy");

    let mut config = ProviderConfig::builder(wasm_path.clone(), "client-secret").build();
    config.transport = ClientConfig::default();
    config.state.cdn_host = cdn.uri().trim_start_matches("http://").to_string();
    config.telemetry.sink_host = sink.uri().trim_start_matches("http://").to_string();
    config.telemetry.flush_interval = Duration::from_secs(3600);
    config.state.fetch_interval = Duration::from_secs(3600);

    let provider = Provider::connect(config).await.unwrap();

    let mut attrs = BTreeMap::new();
    attrs.insert("plan".to_string(), Value::String("enterprise".to_string()));
    let context = EvaluationContext {
        targeting_key: Some("user-1".to_string()),
        attributes: attrs,
    };
    let details = provider
        .resolve_bool("my-flag", false, Some(context))
        .await
        .unwrap();
    assert!(details.value);
    assert_eq!(details.variant, "on");

    provider.shutdown().await;
    let _ = std::fs::remove_file(&wasm_path);
}

#[tokio::test]
async fn guest_trap_during_resolve_is_surfaced_and_instance_recovers() {
    let cdn = MockServer::start().await;
    let sink = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/client-secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_bytes(b"state-v1".to_vec()),
        )
        .mount(&cdn)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/flagLogs:write"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&sink)
        .await;

    let envelope = resolve_envelope_for(Value::Bool(true));
    let wasm_path = write_guest_module(&build_guest_wat(&envelope, true), "trapping");

    let mut config = ProviderConfig::builder(wasm_path.clone(), "client-secret").build();
    config.state.cdn_host = cdn.uri().trim_start_matches("http://").to_string();
    config.telemetry.sink_host = sink.uri().trim_start_matches("http://").to_string();
    config.telemetry.flush_interval = Duration::from_secs(3600);
    config.state.fetch_interval = Duration::from_secs(3600);

    let provider = Provider::connect(config).await.unwrap();

    let err = provider.resolve_bool("my-flag", false, None).await;
    assert!(
        err.is_err(),
        "trapping guest must surface an error, not a stale value"
    );

    provider.shutdown().await;
    let _ = std::fs::remove_file(&wasm_path);
}
