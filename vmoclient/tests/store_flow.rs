//! Integration tests for the dashboard store: caching, invalidation and
//! cross-stream aggregation against a mock backend

use serde_json::json;
use vmoclient::{
    DashboardStore, Error, EventFilter, MonitorClient, NewStream, StoreConfig, StreamKind,
    SystemHealth, RECENT_EVENTS_CAP,
};
use vmoquery::{FetchStatus, QueryError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Create a mock stream row as the backend serializes it
fn stream_json(id: i64, name: &str) -> serde_json::Value {
    json!({
        "stream_id": id,
        "stream_name": name,
        "stream_url": format!("rtsp://cam/{id}"),
        "stream_type": "rtsp",
        "is_active": true,
        "created_at": "2024-01-15T10:30:00",
        "updated_at": "2024-01-15T10:30:00"
    })
}

/// Create a mock event; the minute of the timestamp tracks the id so the
/// expected newest-first order is easy to read off
fn event_json(event_id: i64, stream_id: i64) -> serde_json::Value {
    json!({
        "event_id": event_id,
        "stream_id": stream_id,
        "event_time": format!("2024-01-15T10:{event_id:02}:00"),
        "event_type": "motion_detected",
        "frame_path": format!("frames/{stream_id}/{event_id}.jpg")
    })
}

fn status_json() -> serde_json::Value {
    json!({
        "system_status": "running",
        "timestamp": "2024-01-15T10:30:00",
        "stream_manager": {
            "active_streams": 2,
            "running_streams": 1,
            "streams": {
                "1": {"name": "Front Door", "url": "rtsp://cam/1", "running": true},
                "2": {"name": "Garage", "url": "rtsp://cam/2", "running": false}
            }
        }
    })
}

fn summary_json() -> serde_json::Value {
    json!({
        "total_streams": 2,
        "active_streams": 2,
        "recent_events_24h": 5,
        "recent_analytics_1h": 60,
        "timestamp": "2024-01-15T10:30:00"
    })
}

/// Create a mock metric sample; the hour of the timestamp orders them
fn metric_json(hour: u32, cpu: f64) -> serde_json::Value {
    json!({
        "timestamp": format!("2024-01-15T{hour:02}:00:00"),
        "cpu_usage": cpu,
        "memory_usage": 40.0,
        "disk_usage": 55.0,
        "active_streams": 2
    })
}

async fn store_for(server: &MockServer) -> DashboardStore {
    let client = MonitorClient::builder()
        .base_url(server.uri())
        .build()
        .unwrap();
    DashboardStore::with_client(client, StoreConfig::default())
}

#[tokio::test]
async fn test_streams_read_is_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/streams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            stream_json(1, "Front Door"),
            stream_json(2, "Garage"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/system/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;

    let first = store.streams().await.unwrap();
    assert!(first[0].is_running, "running state overlaid from status");
    assert!(!first[1].is_running);

    // Second read is served from the cache, no extra requests
    let second = store.streams().await.unwrap();
    assert_eq!(second.len(), 2);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_system_metrics_come_back_oldest_first() {
    let mock_server = MockServer::start().await;

    // The backend serves samples newest-first; charts and health reads
    // want them chronological, newest last
    Mock::given(method("GET"))
        .and(path("/system/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            metric_json(12, 71.0),
            metric_json(11, 64.0),
            metric_json(10, 58.0),
        ])))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let metrics = store.system_metrics(3).await.unwrap();

    let cpus: Vec<f64> = metrics.iter().map(|m| m.cpu_usage).collect();
    assert_eq!(cpus, vec![58.0, 64.0, 71.0]);

    let newest = metrics.last().unwrap();
    assert_eq!(newest.cpu_usage, 71.0, "newest sample is last");
    assert_eq!(SystemHealth::from_latest(newest), SystemHealth::Warning);
}

#[tokio::test]
async fn test_create_refetches_streams_and_summary() {
    let mock_server = MockServer::start().await;
    let payload = NewStream::new("Back Door", "rtsp://cam/3", StreamKind::Rtsp);

    Mock::given(method("GET"))
        .and(path("/streams"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([stream_json(1, "Front Door")])),
        )
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/system/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_json()))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/streams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stream_json(3, "Back Door")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;

    store.streams().await.unwrap();
    store.dashboard_summary().await.unwrap();

    let created = store.create_stream(&payload).await.unwrap();
    assert_eq!(created.stream_id, 3);

    // Both invalidated caches refetch; system status stays cached
    store.streams().await.unwrap();
    store.dashboard_summary().await.unwrap();
    mock_server.verify().await;
}

#[tokio::test]
async fn test_start_stream_invalidates_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/system/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json()))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/streams/1/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Stream 1 started successfully"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;

    store.system_status().await.unwrap();
    let ack = store.start_stream(1).await.unwrap();
    assert_eq!(ack.message, "Stream 1 started successfully");
    store.system_status().await.unwrap();
    mock_server.verify().await;
}

#[tokio::test]
async fn test_validation_short_circuits_before_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/streams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stream_json(9, "never")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let payload = NewStream::new("", "ftp://cam/1", StreamKind::Rtsp);

    let err = store.create_stream(&payload).await.unwrap_err();
    match err {
        Error::Validation(errors) => {
            assert!(errors.name.is_some());
            assert!(errors.url.is_some());
        }
        other => panic!("expected Validation, got {other:?}"),
    }

    // Rejected payloads touch neither the network nor the caches
    assert_eq!(store.peek_streams().status, FetchStatus::Idle);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_recent_events_skips_failed_branch_and_caps() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/streams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            stream_json(1, "Front Door"),
            stream_json(2, "Garage"),
        ])))
        .mount(&mock_server)
        .await;
    // Backend returns oldest-first here; the aggregation re-sorts anyway
    let events: Vec<serde_json::Value> = (1..=12).map(|id| event_json(id, 1)).collect();
    Mock::given(method("GET"))
        .and(path("/streams/1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Array(events)))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/streams/2/events"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "backend fell over"})),
        )
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let recent = store.recent_events().await.unwrap();

    assert_eq!(recent.len(), RECENT_EVENTS_CAP);
    assert_eq!(recent[0].record.event_id, 12, "newest first");
    assert_eq!(recent[9].record.event_id, 3);
    assert!(recent.iter().all(|e| e.stream_name == "Front Door"));

    // The cache keeps the whole merged pass; the cap applies on read
    let snapshot = store.peek_events(&EventFilter::default());
    assert_eq!(snapshot.status, FetchStatus::Success);
    assert_eq!(snapshot.value.unwrap().len(), 12);
}

#[tokio::test]
async fn test_events_require_stream_list() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/streams"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "db down"})))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server).await;
    let err = store.recent_events().await.unwrap_err();

    match err {
        Error::Query(QueryError::Fetch(message)) => {
            assert!(message.contains("db down"), "got: {message}");
        }
        other => panic!("expected Query error, got {other:?}"),
    }
}
