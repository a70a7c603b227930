use super::traits::{BatchFormat, RowWriter, StorageError};
use crate::event::Event;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Gzip-compressed newline-delimited JSON, one event per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl JsonFormat {
    fn open_lines(path: &Path) -> Result<std::io::Lines<BufReader<MultiGzDecoder<File>>>, StorageError> {
        let file = File::open(path).map_err(|e| StorageError::file(path, e))?;
        Ok(BufReader::new(MultiGzDecoder::new(file)).lines())
    }

    fn encoder(path: &Path) -> Result<GzEncoder<BufWriter<File>>, StorageError> {
        let file = File::create(path).map_err(|e| StorageError::file(path, e))?;
        Ok(GzEncoder::new(BufWriter::new(file), flate2::Compression::default()))
    }

    fn finish_encoder(encoder: GzEncoder<BufWriter<File>>) -> Result<(), StorageError> {
        let buffered = encoder.finish()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

impl BatchFormat for JsonFormat {
    fn extension(&self) -> &'static str {
        "json.gz"
    }

    fn create(&self, path: &Path) -> Result<Box<dyn RowWriter>, StorageError> {
        Ok(Box::new(JsonRowWriter {
            encoder: Self::encoder(path)?,
        }))
    }

    fn merge(&self, sources: &[PathBuf], dest: &Path) -> Result<u64, StorageError> {
        let readers = sources
            .iter()
            .map(|path| Self::open_lines(path).map(|lines| (path, lines)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut encoder = Self::encoder(dest)?;
        let mut rows = 0u64;
        for (path, lines) in readers {
            for line in lines {
                let line = line.map_err(|e| StorageError::file(path, e))?;
                if line.is_empty() {
                    continue;
                }
                encoder.write_all(line.as_bytes())?;
                encoder.write_all(b"\n")?;
                rows += 1;
            }
        }

        Self::finish_encoder(encoder)?;
        Ok(rows)
    }

    fn read_events(&self, path: &Path) -> Result<Vec<Event>, StorageError> {
        let mut events = Vec::new();
        for line in Self::open_lines(path)? {
            let line = line.map_err(|e| StorageError::file(path, e))?;
            if line.is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

struct JsonRowWriter {
    encoder: GzEncoder<BufWriter<File>>,
}

impl RowWriter for JsonRowWriter {
    fn write(&mut self, event: &Event) -> Result<(), StorageError> {
        serde_json::to_writer(&mut self.encoder, event)?;
        self.encoder.write_all(b"\n")?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), StorageError> {
        JsonFormat::finish_encoder(self.encoder)
    }
}
