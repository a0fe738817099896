//! Dataset ingestion from delimited text, spreadsheets and columnar files.

use crate::config::DataConfig;
use crate::data::dataset::Dataset;
use crate::data::value::Value;
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const PARQUET_MAGIC: &[u8] = b"PAR1";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// The tabular encodings accepted on ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataFormat {
    Delimited { delimiter: u8 },
    Spreadsheet,
    Columnar,
}

impl DataFormat {
    pub fn name(&self) -> &'static str {
        match self {
            DataFormat::Delimited { .. } => "delimited",
            DataFormat::Spreadsheet => "spreadsheet",
            DataFormat::Columnar => "columnar",
        }
    }
}

/// Pick the encoding from magic bytes, falling back to the file extension.
pub fn detect_format(path: &Path, bytes: &[u8], delimiter: u8) -> Result<DataFormat> {
    if bytes.starts_with(PARQUET_MAGIC) {
        return Ok(DataFormat::Columnar);
    }
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        return Ok(DataFormat::Spreadsheet);
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv" | "txt") => Ok(DataFormat::Delimited { delimiter }),
        Some("tsv" | "tab") => Ok(DataFormat::Delimited { delimiter: b'\t' }),
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Ok(DataFormat::Spreadsheet),
        Some("parquet" | "pq") => Ok(DataFormat::Columnar),
        Some(other) => Err(AuditError::unsupported_format(format!(
            "Unsupported dataset extension '.{other}' ({})",
            path.display()
        ))),
        None => Err(AuditError::unsupported_format(format!(
            "Cannot determine dataset format of {}",
            path.display()
        ))),
    }
}

/// Read a dataset file from disk.
pub async fn load_dataset(path: &Path, config: &DataConfig) -> Result<Dataset> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AuditError::dataset(format!("Failed to read {}: {e}", path.display()))
    })?;
    let delimiter = config.delimiter_byte()?;
    let format = detect_format(path, &bytes, delimiter)?;
    debug!(path = %path.display(), format = format.name(), bytes = bytes.len(), "Parsing dataset");

    let dataset = parse_dataset(&bytes, format, config.max_rows)?;
    if dataset.is_empty() {
        return Err(AuditError::dataset(format!(
            "Dataset {} contains no rows",
            path.display()
        )));
    }
    info!(
        path = %path.display(),
        format = format.name(),
        rows = dataset.n_rows(),
        columns = dataset.n_cols(),
        "Loaded dataset"
    );
    Ok(dataset)
}

/// Parse raw bytes in the given encoding, keeping at most `limit` rows.
pub fn parse_dataset(bytes: &[u8], format: DataFormat, limit: Option<usize>) -> Result<Dataset> {
    match format {
        DataFormat::Delimited { delimiter } => parse_delimited(bytes, delimiter, limit),
        DataFormat::Spreadsheet => parse_spreadsheet(bytes, limit),
        DataFormat::Columnar => parse_columnar(bytes, limit),
    }
}

fn parse_delimited(bytes: &[u8], delimiter: u8, limit: Option<usize>) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AuditError::dataset(format!("Invalid header row: {e}")))?
        .iter()
        .enumerate()
        .map(|(i, h)| header_name(h, i))
        .collect();
    if headers.is_empty() {
        return Err(AuditError::dataset("Empty delimited file"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        if limit.is_some_and(|max| rows.len() >= max) {
            break;
        }
        let record = record.map_err(|e| AuditError::dataset(format!("Malformed record: {e}")))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(Value::parse_cell).collect());
    }
    Dataset::from_rows(headers, rows)
}

fn parse_spreadsheet(bytes: &[u8], limit: Option<usize>) -> Result<Dataset> {
    use calamine::{Data, Reader, open_workbook_auto_from_rs};

    let mut workbook = open_workbook_auto_from_rs(std::io::Cursor::new(bytes.to_vec()))
        .map_err(|e| AuditError::unsupported_format(format!("Unreadable spreadsheet: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AuditError::dataset("Workbook has no sheets"))?
        .map_err(|e| AuditError::dataset(format!("Failed to read first sheet: {e}")))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| AuditError::dataset("First sheet is empty"))?
        .iter()
        .enumerate()
        .map(|(i, cell)| header_name(&cell.to_string(), i))
        .collect();

    let to_value = |cell: &Data| match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    };

    let rows: Vec<Vec<Value>> = rows_iter
        .take(limit.unwrap_or(usize::MAX))
        .map(|row| row.iter().map(to_value).collect())
        .collect();
    Dataset::from_rows(headers, rows)
}

#[cfg(feature = "columnar")]
fn parse_columnar(bytes: &[u8], limit: Option<usize>) -> Result<Dataset> {
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use parquet::record::Field;

    let reader = SerializedFileReader::new(bytes::Bytes::copy_from_slice(bytes))
        .map_err(|e| AuditError::unsupported_format(format!("Unreadable parquet file: {e}")))?;
    let headers: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();

    let to_value = |field: &Field| match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(v) => Value::Number(f64::from(*v)),
        Field::Short(v) => Value::Number(f64::from(*v)),
        Field::Int(v) => Value::Number(f64::from(*v)),
        Field::Long(v) => Value::Number(*v as f64),
        Field::UByte(v) => Value::Number(f64::from(*v)),
        Field::UShort(v) => Value::Number(f64::from(*v)),
        Field::UInt(v) => Value::Number(f64::from(*v)),
        Field::ULong(v) => Value::Number(*v as f64),
        Field::Float(v) => Value::Number(f64::from(*v)),
        Field::Double(v) => Value::Number(*v),
        Field::Str(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    };

    let mut rows = Vec::new();
    let iter = reader
        .get_row_iter(None)
        .map_err(|e| AuditError::dataset(format!("Failed to iterate parquet rows: {e}")))?;
    for row in iter.take(limit.unwrap_or(usize::MAX)) {
        let row = row.map_err(|e| AuditError::dataset(format!("Corrupt parquet row: {e}")))?;
        rows.push(row.get_column_iter().map(|(_, field)| to_value(field)).collect());
    }
    Dataset::from_rows(headers, rows)
}

#[cfg(not(feature = "columnar"))]
fn parse_columnar(_bytes: &[u8], _limit: Option<usize>) -> Result<Dataset> {
    Err(AuditError::unsupported_format(
        "Columnar datasets require the `columnar` feature",
    ))
}

fn header_name(raw: &str, index: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        format!("Unnamed: {index}")
    } else {
        trimmed.to_string()
    }
}
