/// End-to-end: beacons posted to the HTTP API are fanned out to every
/// destination and mirrored to the side channel.
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use drain::event::Event;
use drain::forward::{ForwardError, ForwardPool, Forwarder};
use drain::pipeline::{create_channel, route, BatchConfig, BatchWriter, DatabaseWriter};
use drain::storage::naming;
use drain::storage::{BatchFormat, DuckDbStorage, JsonFormat, ParquetFormat};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Default)]
struct Recorder {
    names: Mutex<Vec<String>>,
}

#[async_trait]
impl Forwarder for Recorder {
    async fn forward(&self, event: &Event) -> Result<(), ForwardError> {
        self.names.lock().unwrap().push(event.name.clone());
        Ok(())
    }
}

fn sealed(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| naming::is_sealed_candidate(&p.file_name().unwrap().to_string_lossy(), extension))
        .collect();
    found.sort();
    found
}

fn beacon(name: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/event")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.23")
        .body(Body::from(format!(
            r#"{{"name":"{}","version":"v8.2.0","clients":1,"isSwarmMode":true}}"#,
            name
        )))
        .unwrap()
}

#[tokio::test]
async fn test_events_reach_every_destination_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let parquet_dir = temp_dir.path().join("parquet");
    let json_dir = temp_dir.path().join("json");

    let recorder = Arc::new(Recorder::default());
    let pool = ForwardPool::start(recorder.clone(), 1, 16);

    let parquet: Arc<dyn BatchFormat> = Arc::new(ParquetFormat::default());
    let json: Arc<dyn BatchFormat> = Arc::new(JsonFormat);
    let storage = Arc::new(DuckDbStorage::in_memory().unwrap());
    storage.init_schema().await.unwrap();

    let intakes = vec![
        BatchWriter::new(&parquet_dir, parquet.clone(), BatchConfig::default())
            .with_forwarder(pool.handle())
            .start(),
        BatchWriter::new(&json_dir, json.clone(), BatchConfig::default()).start(),
        DatabaseWriter::new(storage.clone(), 100, Duration::from_secs(60)).start("duckdb"),
    ];

    let (inbound_tx, inbound_rx) = create_channel(8);
    let router = tokio::spawn(route(inbound_rx, intakes));
    let app = drain::web::router(inbound_tx);

    for name in ["E1", "E2"] {
        let response = app.clone().oneshot(beacon(name)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        // Distinct millisecond timestamps keep the database order stable
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    drop(app);

    let summary = router.await.unwrap().unwrap();
    assert_eq!(summary.events_routed, 2);
    assert_eq!(summary.destinations.len(), 3);

    for (dir, format) in [(&parquet_dir, &parquet), (&json_dir, &json)] {
        let files = sealed(dir, format.extension());
        assert_eq!(files.len(), 1);
        let events = format.read_events(&files[0]).unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["E1", "E2"]);
        assert!(events.iter().all(|e| e.remote_ip() == Some("198.51.100.23")));
    }

    let rows = storage.load_events().await.unwrap();
    let names: Vec<&str> = rows.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["E1", "E2"]);

    let stats = pool.shutdown(Duration::from_secs(5)).await;
    assert_eq!(stats.forwarded(), 2);
    let mut forwarded = recorder.names.lock().unwrap().clone();
    forwarded.sort();
    assert_eq!(forwarded, vec!["E1", "E2"]);
}

#[tokio::test]
async fn test_writer_failure_closes_ingest() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("file-not-dir");
    std::fs::write(&blocker, b"").unwrap();
    let healthy_dir = temp_dir.path().join("healthy");

    let json: Arc<dyn BatchFormat> = Arc::new(JsonFormat);
    let intakes = vec![
        BatchWriter::new(&healthy_dir, json.clone(), BatchConfig::default()).start(),
        BatchWriter::new(&blocker, json.clone(), BatchConfig::default()).start(),
    ];

    let (inbound_tx, inbound_rx) = create_channel(1);
    let router = tokio::spawn(route(inbound_rx, intakes));
    let app = drain::web::router(inbound_tx);

    // Let the broken writer fail on startup
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut statuses = Vec::new();
    for name in ["E1", "E2", "E3"] {
        statuses.push(app.clone().oneshot(beacon(name)).await.unwrap().status());
    }
    assert_eq!(statuses.last(), Some(&StatusCode::SERVICE_UNAVAILABLE));

    drop(app);
    assert!(router.await.unwrap().is_err());

    // The healthy destination still sealed what it had accepted
    assert!(std::fs::read_dir(&healthy_dir)
        .unwrap()
        .all(|e| !e.unwrap().file_name().to_string_lossy().ends_with(".temp")));
}

#[tokio::test]
async fn test_writer_failure_without_traffic_stops_router() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("file-not-dir");
    std::fs::write(&blocker, b"").unwrap();

    let json: Arc<dyn BatchFormat> = Arc::new(JsonFormat);
    let intakes = vec![
        BatchWriter::new(temp_dir.path().join("healthy"), json.clone(), BatchConfig::default()).start(),
        BatchWriter::new(&blocker, json, BatchConfig::default()).start(),
    ];

    // The sender stays open and nothing is posted
    let (inbound_tx, inbound_rx) = create_channel(1);
    let result = tokio::time::timeout(Duration::from_secs(2), route(inbound_rx, intakes))
        .await
        .expect("router should stop once a writer dies");
    assert!(result.is_err());
    assert!(inbound_tx.is_closed());
}
