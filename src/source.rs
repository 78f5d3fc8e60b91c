// Source Reader - tabular catalog input
// Each call to rows() re-opens the source, so a load can take two passes.

use crate::error::SourceError;
use crate::record::required_columns;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// SOURCE
// ============================================================================

#[derive(Debug, Clone)]
enum Origin {
    File(PathBuf),
    Text(String),
}

/// A restartable CSV source.
#[derive(Debug, Clone)]
pub struct SourceReader {
    origin: Origin,
}

impl SourceReader {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        SourceReader {
            origin: Origin::File(path.as_ref().to_path_buf()),
        }
    }

    /// In-memory source, mostly for tests and piped input.
    pub fn from_text(text: impl Into<String>) -> Self {
        SourceReader {
            origin: Origin::Text(text.into()),
        }
    }

    /// Human-readable origin for logs and the load-run audit row
    pub fn describe(&self) -> String {
        match &self.origin {
            Origin::File(path) => path.display().to_string(),
            Origin::Text(_) => "<inline>".to_string(),
        }
    }

    fn open(&self) -> Result<Box<dyn Read>, SourceError> {
        match &self.origin {
            Origin::File(path) => {
                let file = File::open(path).map_err(|source| SourceError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Box::new(file))
            }
            Origin::Text(text) => Ok(Box::new(io::Cursor::new(text.clone().into_bytes()))),
        }
    }

    /// SHA-256 over the raw source bytes, hex encoded.
    pub fn fingerprint(&self) -> Result<String, SourceError> {
        let mut reader = self.open()?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).map_err(|source| SourceError::Io {
                path: PathBuf::from(self.describe()),
                source,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Start a fresh pass over the source.
    ///
    /// Fails up front when any required column is absent from the header,
    /// listing every missing column rather than the first one.
    pub fn rows(&self) -> Result<SourceRows, SourceError> {
        // Ragged rows are accepted here; width is checked per row
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(self.open()?);

        let names: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let header = Header::new(names);

        let missing: Vec<String> = required_columns()
            .into_iter()
            .filter(|alternatives| !alternatives.iter().any(|name| header.contains(name)))
            .map(|alternatives| alternatives.join("|"))
            .collect();
        if !missing.is_empty() {
            return Err(SourceError::MissingColumns(missing));
        }

        Ok(SourceRows {
            records: reader.into_records(),
            header: Arc::new(header),
            ordinal: 0,
        })
    }
}

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug)]
struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Header { names, index }
    }

    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

/// Lazy iterator over source rows, in file order.
pub struct SourceRows {
    records: csv::StringRecordsIntoIter<Box<dyn Read>>,
    header: Arc<Header>,
    ordinal: u64,
}

impl Iterator for SourceRows {
    type Item = Result<SourceRow, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(err.into())),
        };
        self.ordinal += 1;

        // header occupies line 1
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(self.ordinal + 1);

        Some(Ok(SourceRow {
            line,
            header: Arc::clone(&self.header),
            values: record.iter().map(normalize_cell).collect(),
        }))
    }
}

/// One source row as a column → value mapping. Absent values are `None`.
#[derive(Debug, Clone)]
pub struct SourceRow {
    line: u64,
    header: Arc<Header>,
    values: Vec<Option<String>>,
}

impl SourceRow {
    /// Line of the row in the source file
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Fields read for this row, when there are more than header columns.
    /// A short row is fine: its trailing columns read as null.
    pub fn overflow(&self) -> Option<(usize, usize)> {
        let expected = self.header.names.len();
        (self.values.len() > expected).then_some((expected, self.values.len()))
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let i = *self.header.index.get(column)?;
        self.values.get(i)?.as_deref()
    }

    /// First non-null value among alternative spellings of a column
    pub fn get_any(&self, columns: &[&str]) -> Option<&str> {
        columns.iter().find_map(|c| self.get(c))
    }

    /// Every column in header order, nulls included.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.header
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), self.values.get(i).and_then(|v| v.as_deref())))
    }
}

/// Spellings dataframe exports use for a missing value.
static NULL_MARKERS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Blank cells and null markers become `None`; everything else is trimmed.
fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if NULL_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}
