//! Tabular data: cell values, labels, columns and file ingestion.

pub mod dataset;
pub mod source;
pub mod value;

pub use dataset::{Column, Dataset};
pub use source::{DataFormat, detect_format, load_dataset, parse_dataset};
pub use value::{ColumnKind, FloatKey, Label, Value};
