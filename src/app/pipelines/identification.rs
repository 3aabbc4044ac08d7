use crate::app::pipelines::{read_species, write_output, IDENTIFICATION_STEM};
use crate::config::toml_config::{IdentificationSource, SourceFormat};
use crate::config::DeckConfig;
use crate::domain::model::{ReadOptions, Record, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use crate::utils::html::{extract_section, extract_text_section};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// A source with its contents keyed by the source's own id.
pub struct LoadedSource {
    pub source: IdentificationSource,
    pub contents: HashMap<String, String>,
}

pub struct IdentificationInput {
    pub species: Table,
    pub sources: Vec<LoadedSource>,
}

/// Description text from encyclopedia dumps, first usable source wins.
pub struct IdentificationPipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
}

impl<S: Storage> IdentificationPipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self { storage, config }
    }

    async fn load_source(&self, species: &Table, source: IdentificationSource) -> Result<Option<LoadedSource>> {
        if !species.has_column(&source.key_column) {
            tracing::warn!(
                "⚠️ Source {}: species have no '{}' column, skipping",
                source.name,
                source.key_column
            );
            return Ok(None);
        }

        let path = self.config.input_path(&source.file);
        if !self.storage.exists(&path).await {
            tracing::warn!("⚠️ Source {}: {} not found, skipping", source.name, path);
            return Ok(None);
        }

        let keys: HashSet<&str> = species
            .records
            .iter()
            .filter_map(|r| r.get(&source.key_column))
            .collect();

        let mut columns = vec![source.id_column(), source.content_column()];
        if let Some((filter_column, _)) = source.filter() {
            columns.push(filter_column);
        }
        let options = if path.ends_with(".csv") {
            ReadOptions::csv()
        } else {
            ReadOptions::tsv()
        };

        let data = self.storage.read_file(&path).await?;
        let table = Table::read_filtered(&path, &data, options.select(&columns), |record| {
            source
                .filter()
                .map_or(true, |(column, value)| record.get_or_empty(column) == value)
                && record.get(source.id_column()).is_some_and(|id| keys.contains(id))
        })?;

        let mut contents = HashMap::new();
        for record in &table.records {
            if let (Some(id), Some(content)) = (
                record.get(source.id_column()),
                record.get(source.content_column()),
            ) {
                contents
                    .entry(id.to_string())
                    .or_insert_with(|| content.to_string());
            }
        }
        tracing::info!("📖 Source {}: {} entries", source.name, contents.len());

        Ok(Some(LoadedSource { source, contents }))
    }
}

fn section_from(source: &IdentificationSource, content: &str, max_length: usize) -> Option<String> {
    match source.format() {
        SourceFormat::Html => extract_section(content, max_length),
        SourceFormat::Text => extract_text_section(content, max_length),
    }
}

#[async_trait]
impl<S: Storage> Pipeline for IdentificationPipeline<S> {
    type Input = IdentificationInput;

    fn name(&self) -> &str {
        "identification"
    }

    async fn extract(&self) -> Result<IdentificationInput> {
        let species = read_species(&self.storage, &self.config, &[]).await?;

        let mut sources = Vec::new();
        for source in self.config.identification_sources() {
            if let Some(loaded) = self.load_source(&species, source).await? {
                sources.push(loaded);
            }
        }

        Ok(IdentificationInput { species, sources })
    }

    async fn transform(&self, input: IdentificationInput) -> Result<TransformResult> {
        let max_length = self.config.identification_max_length();
        let mut table = Table::new(["eolID", "identification", "identification_source"]);
        let mut per_source: HashMap<&str, usize> = HashMap::new();

        for record in &input.species.records {
            let found = input.sources.iter().find_map(|loaded| {
                let key = record.get(&loaded.source.key_column)?;
                let content = loaded.contents.get(key)?;
                let section = section_from(&loaded.source, content, max_length)?;
                Some((loaded.source.name.as_str(), section))
            });

            let mut row = Record::new().with("eolID", record.get_or_empty("eolID"));
            if let Some((name, section)) = found {
                *per_source.entry(name).or_default() += 1;
                row.set("identification", section);
                row.set("identification_source", name);
            }
            table.push(row);
        }

        for (name, count) in &per_source {
            tracing::info!("📖 {}: {} descriptions", name, count);
        }
        TransformResult::csv(table)
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let path = self.config.processed_path(IDENTIFICATION_STEM);
        write_output(&self.storage, &path, &result.rendered).await
    }
}
