//! Input readers.
//!
//! Both readers produce a forward-only stream of [`RawRecord`]s; a stream is
//! consumed exactly once and cannot be restarted. CSV input may arrive in
//! UTF-8 (with or without BOM), UTF-16 or Latin-1; the decoder normalizes
//! everything to UTF-8 before parsing.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{InputConfig, InvalidChars};
use crate::error::{ImportError, ImportResult};
use crate::record::RawRecord;

/// A row the reader could not turn into a record, with its input line of
/// origin for error reporting.
#[derive(Debug, Error)]
#[error("line {line}: {source}")]
pub struct RowError {
    pub line: usize,
    #[source]
    pub source: ImportError,
}

/// A forward-only record stream handed to the pipeline.
pub type RecordStream = Box<dyn Iterator<Item = Result<RawRecord, RowError>> + Send>;

const DELIMITER_CANDIDATES: &[char] = &[';', ',', '\t', '|'];

/// Decode raw input bytes to a UTF-8 string.
///
/// Recognizes UTF-8, UTF-16LE and UTF-16BE byte order marks; BOM-less input
/// is treated as UTF-8 when valid and Latin-1 otherwise.
fn decode_input(bytes: &[u8]) -> ImportResult<String> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(rest.to_vec())
            .map_err(|e| ImportError::configuration(format!("invalid UTF-8 after BOM: {e}")));
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        // Latin-1 maps bytes 1:1 onto the first 256 code points
        Err(_) => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> ImportResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(ImportError::configuration(
            "UTF-16 input has an odd number of bytes",
        ));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| from_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|e| ImportError::configuration(format!("invalid UTF-16 input: {e}")))
}

/// Pick the delimiter that splits the header line into the most columns.
fn sniff_delimiter(header_line: &str) -> char {
    DELIMITER_CANDIDATES
        .iter()
        .copied()
        .max_by_key(|&d| header_line.matches(d).count())
        .unwrap_or(';')
}

/// Substitute configured invalid characters inside a cell value.
fn sanitize(value: &str, invalid: &InvalidChars) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if invalid.chars.contains(ch) {
            out.push_str(&invalid.replacement);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Streaming CSV reader with encoding and delimiter detection.
pub struct CsvReader {
    records: csv::StringRecordsIntoIter<Cursor<String>>,
    headers: Vec<String>,
    invalid_chars: Option<InvalidChars>,
    multi_value_delimiter: String,
    /// Input line of the next data row.
    next_line: usize,
}

impl CsvReader {
    /// Open a CSV file with the given input options.
    pub fn open(path: impl AsRef<Path>, config: &InputConfig) -> ImportResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            ImportError::configuration(format!("cannot read input {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes, config)
    }

    /// Build a reader over in-memory input bytes.
    pub fn from_bytes(bytes: &[u8], config: &InputConfig) -> ImportResult<Self> {
        let text = decode_input(bytes)?;

        // Drop leading comment/preamble lines before the header row
        let mut remainder = text.as_str();
        for _ in 0..config.skip_lines {
            remainder = match remainder.split_once('\n') {
                Some((_, rest)) => rest,
                None => "",
            };
        }

        let header_line = remainder.lines().next().unwrap_or("");
        let delimiter = config.delimiter.unwrap_or_else(|| {
            let d = sniff_delimiter(header_line);
            debug!(delimiter = %d.escape_debug(), "detected csv delimiter");
            d
        });
        if !delimiter.is_ascii() {
            return Err(ImportError::configuration(format!(
                "csv delimiter '{delimiter}' must be an ASCII character"
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(Cursor::new(remainder.to_string()));
        let headers = reader
            .headers()?
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        Ok(Self {
            records: reader.into_records(),
            headers,
            invalid_chars: config.invalid_chars.clone(),
            multi_value_delimiter: config.multi_value_delimiter.clone(),
            next_line: config.skip_lines + 2,
        })
    }

    /// Column names from the header row, in input order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Convert into the pipeline's stream type.
    #[must_use]
    pub fn into_stream(self) -> RecordStream {
        Box::new(self)
    }
}

impl Iterator for CsvReader {
    type Item = Result<RawRecord, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.next_line;
        self.next_line += 1;
        let row = match self.records.next()? {
            Ok(row) => row,
            Err(e) => {
                return Some(Err(RowError {
                    line,
                    source: ImportError::Csv(e),
                }))
            }
        };

        let mut record = RawRecord::new(line);
        for (index, name) in self.headers.iter().enumerate() {
            let mut value = row.get(index).unwrap_or("").to_string();
            // Cell sanitization only applies to multi-valued cells, so
            // ordinary values keep characters like inner semicolons intact
            if let Some(invalid) = &self.invalid_chars {
                if value.contains(&self.multi_value_delimiter) {
                    value = value
                        .split(&self.multi_value_delimiter)
                        .map(|part| sanitize(part, invalid))
                        .collect::<Vec<_>>()
                        .join(&self.multi_value_delimiter);
                }
            }
            record.push(name.clone(), value);
        }
        Some(Ok(record))
    }
}

/// Reader over a JSON document holding an array of flat record objects.
pub struct JsonReader {
    records: std::vec::IntoIter<RawRecord>,
}

impl JsonReader {
    /// Open a JSON file with the given input options.
    pub fn open(path: impl AsRef<Path>, config: &InputConfig) -> ImportResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            ImportError::configuration(format!("cannot read input {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes, config)
    }

    /// Build a reader over in-memory JSON bytes.
    pub fn from_bytes(bytes: &[u8], config: &InputConfig) -> ImportResult<Self> {
        let document: Value = serde_json::from_slice(bytes)?;

        let mut root = &document;
        if let Some(record_path) = &config.record_path {
            for segment in record_path.split('.').filter(|s| !s.is_empty()) {
                root = root.get(segment).ok_or_else(|| {
                    ImportError::configuration(format!(
                        "record path segment '{segment}' not found in JSON input"
                    ))
                })?;
            }
        }
        let items = root.as_array().ok_or_else(|| {
            ImportError::configuration("JSON input records must be an array of objects")
        })?;

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let line = index + 1;
            let Some(object) = item.as_object() else {
                warn!(index, "skipping non-object JSON record");
                continue;
            };
            let mut record = RawRecord::new(line);
            for (name, value) in object {
                match flatten_value(value, &config.multi_value_delimiter) {
                    Some(text) => record.push(name.clone(), text),
                    None => warn!(index, field = %name, "skipping nested JSON field"),
                }
            }
            records.push(record);
        }
        Ok(Self {
            records: records.into_iter(),
        })
    }

    /// Convert into the pipeline's stream type.
    #[must_use]
    pub fn into_stream(self) -> RecordStream {
        Box::new(self)
    }
}

/// Render a scalar or scalar-array JSON value as a field string.
fn flatten_value(value: &Value, multi_value_delimiter: &str) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|v| match v {
                    Value::Array(_) | Value::Object(_) => None,
                    other => flatten_value(other, multi_value_delimiter),
                })
                .collect();
            Some(parts.join(multi_value_delimiter))
        }
        Value::Object(_) => None,
    }
}

impl Iterator for JsonReader {
    type Item = Result<RawRecord, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(Ok)
    }
}
