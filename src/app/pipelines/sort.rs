use crate::app::pipelines::write_output;
use crate::config::DeckConfig;
use crate::domain::model::{into_string, Record, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;

const TAGS_HEADER: &str = "#tags column:";

/// An Anki notes export split into its `#` header and note rows.
pub struct SortInput {
    pub header: Vec<String>,
    /// 0-based, from `#tags column:N`.
    pub tags_column: Option<usize>,
    pub rows: Vec<Vec<String>>,
}

/// Restores deck order in a notes export, genus cards first.
pub struct SortPipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
    input: Option<String>,
}

impl<S: Storage> SortPipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self {
            storage,
            config,
            input: None,
        }
    }

    /// Sorts `path` instead of the configured export.
    pub fn with_input(mut self, path: impl Into<String>) -> Self {
        self.input = Some(path.into());
        self
    }

    pub fn input_path(&self) -> String {
        self.input
            .clone()
            .unwrap_or_else(|| self.config.export_path())
    }

    pub fn output_path(&self) -> String {
        match &self.input {
            Some(input) => sorted_path(input),
            None => self.config.sorted_export_path(),
        }
    }
}

fn sorted_path(export: &str) -> String {
    let stem = export.strip_suffix(".txt").unwrap_or(export);
    format!("{} sorted.txt", stem)
}

/// `genus` sorts before `species`, anything else last.
pub fn rank_of(tags: &str) -> u8 {
    let words: Vec<&str> = tags.split_whitespace().collect();
    if words.contains(&"genus") {
        0
    } else if words.contains(&"species") {
        1
    } else {
        2
    }
}

fn field(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Splits the leading `#` lines off an export.
pub fn parse_export(path: &str, data: &[u8]) -> Result<SortInput> {
    let text = std::str::from_utf8(data).map_err(|e| EtlError::ProcessingError {
        message: format!("{} is not valid UTF-8: {}", path, e),
    })?;

    let mut header = Vec::new();
    let mut body = text;
    while body.starts_with('#') {
        let (line, rest) = body.split_once('\n').unwrap_or((body, ""));
        header.push(line.trim_end_matches('\r').to_string());
        body = rest;
    }

    let tags_column = header
        .iter()
        .find_map(|line| line.strip_prefix(TAGS_HEADER))
        .map(|n| {
            n.trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(|n| n - 1)
                .ok_or_else(|| EtlError::ProcessingError {
                    message: format!("{}: invalid tags column '{}'", path, n.trim()),
                })
        })
        .transpose()?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut rows = Vec::new();
    for row in reader.records() {
        rows.push(row?.iter().map(str::to_string).collect());
    }

    Ok(SortInput {
        header,
        tags_column,
        rows,
    })
}

#[async_trait]
impl<S: Storage> Pipeline for SortPipeline<S> {
    type Input = SortInput;

    fn name(&self) -> &str {
        "sort"
    }

    async fn extract(&self) -> Result<SortInput> {
        let path = self.input_path();
        let data = self.storage.read_file(&path).await?;
        let input = parse_export(&path, &data)?;
        if input.tags_column.is_none() {
            tracing::warn!("⚠️ {} has no '{}' line, rows are sorted by key only", path, TAGS_HEADER);
        }
        tracing::info!("📑 {} notes in {}", input.rows.len(), path);
        Ok(input)
    }

    async fn transform(&self, input: SortInput) -> Result<TransformResult> {
        let key = self.config.sort_prefix_columns() + self.config.sort_key_field();
        let numeric = self.config.sort_numeric();
        let mut keyed = Vec::with_capacity(input.rows.len());
        for row in input.rows {
            let rank = input.tags_column.map_or(2, |column| rank_of(field(&row, column)));
            let number = if numeric {
                let value = field(&row, key).trim();
                Some(value.parse::<i64>().map_err(|_| EtlError::ProcessingError {
                    message: format!("sort key '{}' in column {} is not a number", value, key + 1),
                })?)
            } else {
                None
            };
            keyed.push((rank, number, row));
        }

        // Stable, so equal keys keep their export order.
        keyed.sort_by(|(rank_a, number_a, row_a), (rank_b, number_b, row_b)| {
            rank_a.cmp(rank_b).then_with(|| match (number_a, number_b) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => field(row_a, key).cmp(field(row_b, key)),
            })
        });

        let width = keyed.iter().map(|(_, _, row)| row.len()).max().unwrap_or(0);
        let columns: Vec<String> = (1..=width).map(|i| i.to_string()).collect();
        let mut table = Table::new(columns.iter().cloned());
        for (_, _, row) in keyed {
            table.push(
                columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.clone(), value))
                    .collect::<Record>(),
            );
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        table.write_csv(&mut writer, false)?;
        let mut rendered = String::new();
        for line in &input.header {
            rendered.push_str(line);
            rendered.push('\n');
        }
        rendered.push_str(&into_string(writer)?);

        Ok(TransformResult { table, rendered })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        write_output(&self.storage, &self.output_path(), &result.rendered).await
    }
}
