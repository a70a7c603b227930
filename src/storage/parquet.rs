//! Columnar batch files.
//!
//! Events are buffered into Arrow record batches and written with
//! `ArrowWriter`. Merging copies record batches straight across without
//! decoding rows back into events.

use super::traits::{BatchFormat, RowWriter, StorageError};
use crate::event::{AttributeValue, Event};
use arrow::array::{Array, ArrayRef, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use chrono::DateTime;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rows buffered in memory before a record batch is handed to the writer
const ROWS_PER_RECORD_BATCH: usize = 1024;

/// Parquet compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Snappy,
    Lz4,
    #[default]
    Zstd,
}

impl Compression {
    pub fn to_parquet(self) -> parquet::basic::Compression {
        match self {
            Self::None => parquet::basic::Compression::UNCOMPRESSED,
            Self::Snappy => parquet::basic::Compression::SNAPPY,
            Self::Lz4 => parquet::basic::Compression::LZ4,
            Self::Zstd => parquet::basic::Compression::ZSTD(Default::default()),
        }
    }
}

pub fn event_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(
            "created_at",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("name", DataType::Utf8, false),
        Field::new("attributes", DataType::Utf8, false),
    ]))
}

fn events_to_record_batch(events: &[Event], schema: SchemaRef) -> Result<RecordBatch, StorageError> {
    let created_at = TimestampMillisecondArray::from(
        events
            .iter()
            .map(|e| e.created_at.timestamp_millis())
            .collect::<Vec<_>>(),
    )
    .with_timezone("UTC");

    let names = StringArray::from(events.iter().map(|e| e.name.as_str()).collect::<Vec<_>>());

    let attributes = events
        .iter()
        .map(|e| serde_json::to_string(&e.attributes))
        .collect::<Result<Vec<_>, _>>()?;
    let attributes = StringArray::from(attributes);

    let columns: Vec<ArrayRef> = vec![Arc::new(created_at), Arc::new(names), Arc::new(attributes)];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn record_batch_to_events(batch: &RecordBatch, path: &Path) -> Result<Vec<Event>, StorageError> {
    let invalid = |message: String| StorageError::InvalidData {
        path: path.to_path_buf(),
        message,
    };

    let created_at = batch
        .column_by_name("created_at")
        .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
        .ok_or_else(|| invalid("column 'created_at' missing or not a millisecond timestamp".into()))?;
    let names = batch
        .column_by_name("name")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| invalid("column 'name' missing or not a string".into()))?;
    let attributes = batch
        .column_by_name("attributes")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| invalid("column 'attributes' missing or not a string".into()))?;

    let mut events = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let millis = created_at.value(row);
        let created_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| invalid(format!("timestamp {} out of range", millis)))?;
        let attributes: BTreeMap<String, AttributeValue> = if attributes.is_null(row) {
            BTreeMap::new()
        } else {
            serde_json::from_str(attributes.value(row))?
        };

        events.push(Event {
            created_at,
            name: names.value(row).to_string(),
            attributes,
        });
    }

    Ok(events)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetFormat {
    compression: Compression,
}

impl ParquetFormat {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression.to_parquet())
            .build()
    }

    fn open_reader(path: &Path) -> Result<ParquetRecordBatchReader, StorageError> {
        let file = File::open(path).map_err(|e| StorageError::file(path, e))?;
        Ok(ParquetRecordBatchReaderBuilder::try_new(file)?.build()?)
    }
}

impl BatchFormat for ParquetFormat {
    fn extension(&self) -> &'static str {
        "parquet"
    }

    fn create(&self, path: &Path) -> Result<Box<dyn RowWriter>, StorageError> {
        let file = File::create(path).map_err(|e| StorageError::file(path, e))?;
        let schema = event_schema();
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(self.properties()))?;

        Ok(Box::new(ParquetRowWriter {
            writer,
            schema,
            pending: Vec::with_capacity(ROWS_PER_RECORD_BATCH),
        }))
    }

    fn merge(&self, sources: &[PathBuf], dest: &Path) -> Result<u64, StorageError> {
        let readers = sources
            .iter()
            .map(|path| Self::open_reader(path))
            .collect::<Result<Vec<_>, _>>()?;

        let schema = readers
            .first()
            .map(|r| r.schema())
            .unwrap_or_else(event_schema);

        let file = File::create(dest).map_err(|e| StorageError::file(dest, e))?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(self.properties()))?;

        let mut rows = 0u64;
        for reader in readers {
            for batch in reader {
                let batch = batch?;
                rows += batch.num_rows() as u64;
                writer.write(&batch)?;
            }
        }

        let file = writer.into_inner()?;
        file.sync_all().map_err(|e| StorageError::file(dest, e))?;

        Ok(rows)
    }

    fn read_events(&self, path: &Path) -> Result<Vec<Event>, StorageError> {
        let mut events = Vec::new();
        for batch in Self::open_reader(path)? {
            events.extend(record_batch_to_events(&batch?, path)?);
        }
        Ok(events)
    }
}

struct ParquetRowWriter {
    writer: ArrowWriter<File>,
    schema: SchemaRef,
    pending: Vec<Event>,
}

impl ParquetRowWriter {
    fn flush_pending(&mut self) -> Result<(), StorageError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = events_to_record_batch(&self.pending, Arc::clone(&self.schema))?;
        self.writer.write(&batch)?;
        self.pending.clear();
        Ok(())
    }
}

impl RowWriter for ParquetRowWriter {
    fn write(&mut self, event: &Event) -> Result<(), StorageError> {
        self.pending.push(event.clone());
        if self.pending.len() >= ROWS_PER_RECORD_BATCH {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), StorageError> {
        self.flush_pending()?;
        let file = self.writer.into_inner()?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample(name: &str, hour: u32) -> Event {
        Event::new(name, Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap())
            .with_attribute("version", "v1.2.3")
            .with_attribute("running_containers", 7i64)
            .with_attribute("has_hostname", false)
    }

    #[test]
    fn test_write_then_read_preserves_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch.parquet");
        let format = ParquetFormat::default();

        let mut writer = format.create(&path).unwrap();
        writer.write(&sample("a", 10)).unwrap();
        writer.write(&sample("", 11)).unwrap();
        writer.finish().unwrap();

        let events = format.read_events(&path).unwrap();
        assert_eq!(events, vec![sample("a", 10), sample("", 11)]);
    }

    #[test]
    fn test_record_batches_split_at_buffer_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.parquet");
        let format = ParquetFormat::new(Compression::Snappy);

        let mut writer = format.create(&path).unwrap();
        for _ in 0..(ROWS_PER_RECORD_BATCH * 2 + 5) {
            writer.write(&sample("bulk", 12)).unwrap();
        }
        writer.finish().unwrap();

        let events = format.read_events(&path).unwrap();
        assert_eq!(events.len(), ROWS_PER_RECORD_BATCH * 2 + 5);
    }

    #[test]
    fn test_merge_concatenates_sources() {
        let dir = tempdir().unwrap();
        let format = ParquetFormat::default();
        let first = dir.path().join("one.parquet");
        let second = dir.path().join("two.parquet");

        for (path, name) in [(&first, "A"), (&second, "B")] {
            let mut writer = format.create(path).unwrap();
            writer.write(&sample(name, 10)).unwrap();
            writer.finish().unwrap();
        }

        let dest = dir.path().join("merged.parquet");
        let rows = format.merge(&[first, second], &dest).unwrap();
        assert_eq!(rows, 2);

        let names: Vec<_> = format
            .read_events(&dest)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_merge_fails_before_creating_dest_when_source_missing() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("merged.parquet");
        let result = ParquetFormat::default().merge(&[dir.path().join("missing.parquet")], &dest);
        assert!(matches!(result, Err(StorageError::File { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn test_compression_to_parquet() {
        assert!(matches!(
            Compression::None.to_parquet(),
            parquet::basic::Compression::UNCOMPRESSED
        ));
        assert!(matches!(
            Compression::Zstd.to_parquet(),
            parquet::basic::Compression::ZSTD(_)
        ));
    }
}
