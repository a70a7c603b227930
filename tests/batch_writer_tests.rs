/// Batch writer behaviour observed from the outside: what ends up in the
/// data directory for a given sequence of events and timings.
use chrono::Utc;
use drain::event::Event;
use drain::pipeline::{BatchConfig, BatchWriter};
use drain::storage::naming;
use drain::storage::{BatchFormat, JsonFormat, ParquetFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn sealed(dir: &Path, extension: &str) -> Vec<PathBuf> {
    files(dir)
        .into_iter()
        .filter(|name| naming::is_sealed_candidate(name, extension))
        .map(|name| dir.join(name))
        .collect()
}

async fn wait_for_sealed(dir: &Path, extension: &str, count: usize) -> Vec<PathBuf> {
    for _ in 0..200 {
        let found = sealed(dir, extension);
        if found.len() >= count {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sealed(dir, extension)
}

#[tokio::test]
async fn test_every_event_lands_in_exactly_one_batch() {
    let temp_dir = TempDir::new().unwrap();
    let format: Arc<dyn BatchFormat> = Arc::new(ParquetFormat::default());
    let config = BatchConfig {
        max_rows: 7,
        max_idle: Duration::from_secs(60),
        max_wait: Duration::from_secs(60),
    };

    let intake = BatchWriter::new(temp_dir.path(), format.clone(), config).start();
    for i in 0..50 {
        intake
            .submit(Event::new(format!("event-{}", i), Utc::now()).into_shared())
            .await
            .unwrap();
    }
    let stats = intake.stop().await.unwrap();
    assert_eq!(stats.rows, 50);

    let mut seen = Vec::new();
    for path in sealed(temp_dir.path(), "parquet") {
        let events = format.read_events(&path).unwrap();
        // Sealed after the row count first exceeds the ceiling
        assert!(events.len() <= 8);
        seen.extend(events.into_iter().map(|e| e.name));
    }
    seen.sort();
    let mut expected: Vec<String> = (0..50).map(|i| format!("event-{}", i)).collect();
    expected.sort();
    assert_eq!(seen, expected);

    assert!(files(temp_dir.path()).iter().all(|f| !f.ends_with(".temp")));
}

#[tokio::test]
async fn test_idle_batch_is_sealed_once() {
    let temp_dir = TempDir::new().unwrap();
    let format: Arc<dyn BatchFormat> = Arc::new(JsonFormat);
    let config = BatchConfig {
        max_rows: 1000,
        max_idle: Duration::from_millis(100),
        max_wait: Duration::from_secs(60),
    };

    let intake = BatchWriter::new(temp_dir.path(), format.clone(), config).start();
    intake.submit(Event::new("lonely", Utc::now()).into_shared()).await.unwrap();
    let submitted = Instant::now();

    let found = wait_for_sealed(temp_dir.path(), "json.gz", 1).await;
    assert_eq!(found.len(), 1);
    let elapsed = submitted.elapsed();
    assert!(
        elapsed >= Duration::from_millis(90) && elapsed < Duration::from_millis(300),
        "idle batch sealed after {:?}",
        elapsed
    );
    assert_eq!(format.read_events(&found[0]).unwrap().len(), 1);

    // Silence must not produce more files
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(sealed(temp_dir.path(), "json.gz").len(), 1);

    let stats = intake.stop().await.unwrap();
    assert_eq!(stats.batches, 1);
    assert_eq!(files(temp_dir.path()).len(), 1);
}

#[tokio::test]
async fn test_zero_row_batches_leave_nothing_behind() {
    let temp_dir = TempDir::new().unwrap();
    let config = BatchConfig {
        max_rows: 10,
        max_idle: Duration::from_millis(20),
        max_wait: Duration::from_millis(50),
    };

    let intake = BatchWriter::new(temp_dir.path(), Arc::new(JsonFormat), config).start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let stats = intake.stop().await.unwrap();

    assert_eq!(stats.batches, 0);
    assert_eq!(stats.rows, 0);
    assert!(files(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn test_seals_within_one_second_get_distinct_names() {
    let temp_dir = TempDir::new().unwrap();
    let format: Arc<dyn BatchFormat> = Arc::new(JsonFormat);
    let config = BatchConfig {
        max_rows: 1,
        max_idle: Duration::from_secs(60),
        max_wait: Duration::from_secs(60),
    };

    let intake = BatchWriter::new(temp_dir.path(), format.clone(), config).start();
    for i in 0..6 {
        intake.submit(Event::new(format!("e{}", i), Utc::now()).into_shared()).await.unwrap();
    }
    let stats = intake.stop().await.unwrap();
    assert_eq!(stats.rows, 6);
    assert_eq!(stats.batches, 3);

    let found = sealed(temp_dir.path(), "json.gz");
    assert_eq!(found.len(), 3);
    let total: usize = found.iter().map(|p| format.read_events(p).unwrap().len()).sum();
    assert_eq!(total, 6);
}

#[tokio::test]
async fn test_orphaned_temp_files_are_left_alone() {
    let temp_dir = TempDir::new().unwrap();
    let orphan = temp_dir.path().join("data-1700000000-deadbeef.json.gz.temp");
    std::fs::write(&orphan, b"partial").unwrap();

    let intake = BatchWriter::new(temp_dir.path(), Arc::new(JsonFormat), BatchConfig::default()).start();
    intake.submit(Event::new("fresh", Utc::now()).into_shared()).await.unwrap();
    intake.stop().await.unwrap();

    assert!(orphan.exists());
    assert_eq!(sealed(temp_dir.path(), "json.gz").len(), 1);
}

#[tokio::test]
async fn test_submit_fails_after_writer_error() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("occupied");
    std::fs::write(&blocker, b"").unwrap();

    let intake = BatchWriter::new(&blocker, Arc::new(JsonFormat), BatchConfig::default()).start();
    for _ in 0..100 {
        if intake.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(intake.submit(Event::new("x", Utc::now()).into_shared()).await.is_err());
    assert!(intake.stop().await.is_err());
}
