pub mod duckdb;
pub mod json;
pub mod naming;
pub mod parquet;
pub mod traits;

pub use self::duckdb::DuckDbStorage;
pub use self::json::JsonFormat;
pub use self::parquet::{Compression, ParquetFormat};
pub use traits::{BatchFormat, RowWriter, StorageError};
