//! Firebase and PostgREST adapters against wiremock servers.
//!
//! The adapters are blocking (ureq), so every call runs under
//! `spawn_blocking` while the mock server lives on the tokio runtime.

use std::time::Duration;

use geoferry_core::{normalize_entry, CanonicalRecord, DeviceId, SinkConfig, SourceConfig, SourceKey};
use geoferry_sync::{FirebaseSource, SinkError, SinkStore, SourceError, SourceStore, SupabaseSink};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Helpers
// =============================================================================

fn firebase(server: &MockServer, auth: Option<&str>) -> FirebaseSource {
    FirebaseSource::new(
        &SourceConfig {
            url: server.uri(),
            root: "/".to_string(),
            auth: auth.map(str::to_string),
        },
        Duration::from_secs(5),
    )
}

fn supabase(server: &MockServer) -> SupabaseSink {
    SupabaseSink::new(
        &SinkConfig {
            url: server.uri(),
            api_key: "anon-key".to_string(),
            ..SinkConfig::default()
        },
        Duration::from_secs(5),
    )
}

fn record() -> CanonicalRecord {
    normalize_entry(&json!({
        "childID": "dev1", "lat": 12.5, "long": 77.4, "speed": 3.2,
        "timestamp": "2025-10-06 01:18:13",
    }))
    .expect("valid record")
}

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

// =============================================================================
// Source
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn fetch_all_returns_every_entry_and_sends_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.json"))
        .and(query_param("auth", "db-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "-Nk1": {"childID": "dev1", "lat": 1, "long": 2, "timestamp": "2025-01-01 00:00:00"},
            "-Nk2": {"childID": "dev2"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = firebase(&server, Some("db-secret"));
    let snapshot = blocking(move || source.fetch_all()).await.expect("fetch");
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.contains_key(&SourceKey::from("-Nk1")));
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_all_null_body_is_empty_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let source = firebase(&server, None);
    let snapshot = blocking(move || source.fetch_all()).await.expect("fetch");
    assert!(snapshot.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_all_non_success_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.json"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let source = firebase(&server, None);
    let err = blocking(move || source.fetch_all()).await.unwrap_err();
    match err {
        SourceError::Status { code, body } => {
            assert_eq!(code, 401);
            assert!(body.contains("Permission denied"));
        }
        other => panic!("expected status error, got {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_all_garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let source = firebase(&server, None);
    let err = blocking(move || source.fetch_all()).await.unwrap_err();
    assert!(matches!(err, SourceError::Malformed(_)), "got: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_all_unreachable_host_is_transport_error() {
    // Mock servers are pooled and keep listening after drop; use a closed port.
    let source = FirebaseSource::new(
        &SourceConfig {
            url: "http://127.0.0.1:9".to_string(),
            root: "/".to_string(),
            auth: None,
        },
        Duration::from_secs(2),
    );
    let err = blocking(move || source.fetch_all()).await.unwrap_err();
    assert!(matches!(err, SourceError::Transport(_)), "got: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_deletes_single_key() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/-Nk1.json"))
        .and(query_param("auth", "db-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&server)
        .await;

    let source = firebase(&server, Some("db-secret"));
    blocking(move || source.remove(&SourceKey::from("-Nk1")))
        .await
        .expect("remove");
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_keeps_reserved_characters_inside_the_key_segment() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/trip%3F1%2Fx.json"))
        .and(query_param("auth", "db-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;

    let source = firebase(&server, Some("db-secret"));
    blocking(move || source.remove(&SourceKey::from("trip?1/x")))
        .await
        .expect("remove");
}

// =============================================================================
// Sink
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn device_exists_queries_devices_table_with_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .and(query_param("device_id", "eq.dev1"))
        .and(header("apikey", "anon-key"))
        .and(header("Authorization", "Bearer anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"device_id": "dev1"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .and(query_param("device_id", "eq.ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let sink = supabase(&server);
    let (known, ghost) = blocking(move || {
        (
            sink.device_exists(&DeviceId::from("dev1")),
            sink.device_exists(&DeviceId::from("ghost")),
        )
    })
    .await;
    assert!(known.expect("known lookup"));
    assert!(!ghost.expect("ghost lookup"));
}

#[tokio::test(flavor = "multi_thread")]
async fn location_exists_filters_on_the_four_tuple() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/location_history"))
        .and(query_param("device_id", "eq.dev1"))
        .and(query_param("latitude", "eq.12.5"))
        .and(query_param("longitude", "eq.77.4"))
        .and(query_param("timestamp", "eq.2025-10-06T01:18:13"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 9}])))
        .expect(1)
        .mount(&server)
        .await;

    let sink = supabase(&server);
    let rec = record();
    let exists = blocking(move || sink.location_exists(&rec)).await;
    assert!(exists.expect("lookup"));
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_posts_canonical_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/location_history"))
        .and(header("Prefer", "return=minimal"))
        .and(body_json(json!({
            "device_id": "dev1",
            "latitude": 12.5,
            "longitude": 77.4,
            "speed": 3.2,
            "timestamp": "2025-10-06T01:18:13",
            "source": "firebase",
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sink = supabase(&server);
    let rec = record();
    blocking(move || sink.insert_location(&rec))
        .await
        .expect("insert");
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_server_error_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/location_history"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
        .mount(&server)
        .await;

    let sink = supabase(&server);
    let rec = record();
    let err = blocking(move || sink.insert_location(&rec)).await.unwrap_err();
    assert!(matches!(err, SinkError::Status { code: 500, .. }), "got: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_with_non_array_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "?"})))
        .mount(&server)
        .await;

    let sink = supabase(&server);
    let err = blocking(move || sink.ping()).await.unwrap_err();
    assert!(matches!(err, SinkError::Malformed(_)), "got: {err}");
}
