//! Core data model: values, batches, schema catalog, pipeline traits.

pub mod catalog;
pub mod traits;
pub mod value;

pub use catalog::{ColumnSchema, SchemaCatalog, TableSchema};
pub use traits::{ReadOptions, SourceReader, TargetStore};
pub use value::{Batch, KeyValue, RowKey, SqlValue};
