use crate::app::pipelines::{write_output, SPECIES_STEM};
use crate::config::DeckConfig;
use crate::domain::model::{ReadOptions, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

const TAXON_COLUMNS: [&str; 4] = ["eolID", "canonicalName", "higherClassification", "taxonRank"];
const PROVIDER_COLUMNS: [&str; 3] = ["resource_pk", "resource_id", "page_id"];

pub struct SpeciesInput {
    pub taxa: Table,
    pub provider_ids: Table,
}

/// Selects the deck's taxa from `taxon.tab` and attaches catalog ids.
pub struct SpeciesPipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
}

impl<S: Storage> SpeciesPipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self { storage, config }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for SpeciesPipeline<S> {
    type Input = SpeciesInput;

    fn name(&self) -> &str {
        "species"
    }

    async fn extract(&self) -> Result<SpeciesInput> {
        let profile = self.config.profile();

        let taxon_path = self.config.taxon_file();
        tracing::debug!("Reading taxa from {}", taxon_path);
        let data = self.storage.read_file(&taxon_path).await?;
        let taxa = Table::read_filtered(
            &taxon_path,
            &data,
            ReadOptions::tsv().select(&TAXON_COLUMNS),
            |record| {
                record
                    .get("higherClassification")
                    .is_some_and(|c| profile.contains_classification(c))
                    && record
                        .get("taxonRank")
                        .is_some_and(|rank| profile.accepts_rank(rank))
            },
        )?;
        tracing::info!("🧬 {} taxa match {}", taxa.len(), profile.name);

        let resource_ids: Vec<String> = self
            .config
            .providers()
            .iter()
            .map(|p| p.resource_id.to_string())
            .collect();
        let ids_path = self.config.provider_ids_file();
        let data = self.storage.read_file(&ids_path).await?;
        let provider_ids = Table::read_filtered(
            &ids_path,
            &data,
            ReadOptions::csv().select(&PROVIDER_COLUMNS),
            |record| resource_ids.iter().any(|id| record.get_or_empty("resource_id") == id.as_str()),
        )?;

        Ok(SpeciesInput { taxa, provider_ids })
    }

    async fn transform(&self, input: SpeciesInput) -> Result<TransformResult> {
        let SpeciesInput {
            mut taxa,
            provider_ids,
        } = input;

        let duplicates = taxa.dedup_by_key("eolID");
        if duplicates > 0 {
            tracing::debug!("Dropped {} duplicate eolID rows", duplicates);
        }

        for provider in self.config.providers() {
            let resource_id = provider.resource_id.to_string();
            let mut ids: HashMap<&str, &str> = HashMap::new();
            for record in &provider_ids.records {
                if record.get_or_empty("resource_id") != resource_id {
                    continue;
                }
                if let (Some(page), Some(pk)) = (record.get("page_id"), record.get("resource_pk")) {
                    ids.entry(page).or_insert(pk);
                }
            }

            taxa.add_column(provider.column.as_str());
            for record in &mut taxa.records {
                let id = record
                    .get("eolID")
                    .and_then(|eol| ids.get(eol))
                    .copied()
                    .unwrap_or("");
                record.set(provider.column.as_str(), id);
            }

            if provider.required.unwrap_or(false) {
                let before = taxa.len();
                taxa.retain(|record| record.get(&provider.column).is_some());
                tracing::info!(
                    "🔗 {}: kept {} of {} taxa",
                    provider.column,
                    taxa.len(),
                    before
                );
            } else {
                let matched = taxa
                    .records
                    .iter()
                    .filter(|r| r.get(&provider.column).is_some())
                    .count();
                tracing::info!("🔗 {}: {} of {} taxa have an id", provider.column, matched, taxa.len());
            }
        }

        TransformResult::csv(taxa)
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let path = self.config.processed_path(SPECIES_STEM);
        write_output(&self.storage, &path, &result.rendered).await
    }
}
