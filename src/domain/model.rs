use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of a table. An empty string and an absent column mean the same
/// thing: no value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-empty value of `column`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.data
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn get_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.data.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// How a delimited file is read.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions<'a> {
    pub delimiter: u8,
    pub quoting: bool,
    /// Keep only these columns; all must be present.
    pub columns: Option<&'a [&'a str]>,
}

impl ReadOptions<'_> {
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            quoting: true,
            columns: None,
        }
    }

    /// Tab separated dumps are unquoted: names like `"Bob" the cat` appear raw.
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            quoting: false,
            columns: None,
        }
    }
}

impl<'a> ReadOptions<'a> {
    pub fn select(mut self, columns: &'a [&'a str]) -> Self {
        self.columns = Some(columns);
        self
    }
}

/// Ordered columns plus rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    pub fn require_columns(&self, file: &str, columns: &[&str]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(EtlError::MissingColumn {
                file: file.to_string(),
                column: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Parses a delimited file, keeping only rows accepted by `keep`. Rejected
    /// rows are dropped as they are parsed and never become records.
    pub fn read_filtered<F>(file: &str, data: &[u8], options: ReadOptions<'_>, mut keep: F) -> Result<Self>
    where
        F: FnMut(&Record) -> bool,
    {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .quoting(options.quoting)
            .flexible(true)
            .from_reader(data);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let wanted: Vec<(usize, String)> = match options.columns {
            Some(columns) => columns
                .iter()
                .map(|column| {
                    headers
                        .iter()
                        .position(|h| h == column)
                        .map(|idx| (idx, column.to_string()))
                        .ok_or_else(|| EtlError::MissingColumn {
                            file: file.to_string(),
                            column: column.to_string(),
                        })
                })
                .collect::<Result<_>>()?,
            None => headers.iter().cloned().enumerate().collect(),
        };

        let mut table = Table::new(wanted.iter().map(|(_, name)| name.clone()));
        for row in reader.records() {
            let row = row?;
            let record: Record = wanted
                .iter()
                .map(|(idx, name)| (name.clone(), row.get(*idx).unwrap_or("").trim().to_string()))
                .collect();
            if keep(&record) {
                table.push(record);
            }
        }

        tracing::debug!("Read {} rows from {}", table.len(), file);
        Ok(table)
    }

    pub fn read(file: &str, data: &[u8], options: ReadOptions<'_>) -> Result<Self> {
        Self::read_filtered(file, data, options, |_| true)
    }

    /// First record per non-empty key.
    pub fn index_by(&self, key: &str) -> HashMap<&str, &Record> {
        let mut index = HashMap::with_capacity(self.records.len());
        for record in &self.records {
            if let Some(value) = record.get(key) {
                index.entry(value).or_insert(record);
            }
        }
        index
    }

    pub fn retain<F: FnMut(&Record) -> bool>(&mut self, keep: F) {
        self.records.retain(keep);
    }

    /// Keeps the first record per key; records without a key are kept.
    pub fn dedup_by_key(&mut self, key: &str) -> usize {
        let before = self.records.len();
        let mut seen = std::collections::HashSet::new();
        self.records.retain(|r| match r.get(key) {
            Some(value) => seen.insert(value.to_string()),
            None => true,
        });
        before - self.records.len()
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: &mut csv::Writer<W>, with_header: bool) -> Result<()> {
        if with_header {
            writer.write_record(&self.columns)?;
        }
        for record in &self.records {
            writer.write_record(self.columns.iter().map(|c| record.get_or_empty(c)))?;
        }
        Ok(())
    }

    /// Comma separated text with a header row.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_csv(&mut writer, true)?;
        into_string(writer)
    }
}

pub(crate) fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| EtlError::ProcessingError {
        message: format!("output is not valid UTF-8: {}", e),
    })
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub table: Table,
    /// File contents written by the load step.
    pub rendered: String,
}

impl TransformResult {
    pub fn csv(table: Table) -> Result<Self> {
        let rendered = table.to_csv()?;
        Ok(Self { table, rendered })
    }
}
