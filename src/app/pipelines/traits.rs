use crate::app::pipelines::{read_species, write_output, TRAITS_STEM};
use crate::config::DeckConfig;
use crate::domain::model::{ReadOptions, Record, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use crate::utils::text::capitalize;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

pub struct TraitsInput {
    pub species: Table,
    pub terms: Table,
    pub traits: Table,
    /// `(term name, predicate uri)` for every wanted term.
    pub wanted: Vec<(String, String)>,
}

/// Trait bank values such as conservation status.
pub struct TraitsPipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
}

impl<S: Storage> TraitsPipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self { storage, config }
    }
}

/// Resolves each wanted term name to its predicate uri.
fn resolve_terms(terms: &Table, wanted: &[String]) -> Result<Vec<(String, String)>> {
    wanted
        .iter()
        .map(|term| {
            terms
                .records
                .iter()
                .find(|r| r.get_or_empty("name") == term.as_str())
                .and_then(|r| r.get("uri"))
                .map(|uri| (term.clone(), uri.to_string()))
                .ok_or_else(|| EtlError::InvalidConfigValueError {
                    field: "traits.wanted_terms".to_string(),
                    value: term.clone(),
                    reason: "Term not found in the trait bank's terms file".to_string(),
                })
        })
        .collect()
}

#[async_trait]
impl<S: Storage> Pipeline for TraitsPipeline<S> {
    type Input = TraitsInput;

    fn name(&self) -> &str {
        "traits"
    }

    async fn extract(&self) -> Result<TraitsInput> {
        let species = read_species(&self.storage, &self.config, &["eolID"]).await?;

        let terms_path = self.config.terms_file();
        let data = self.storage.read_file(&terms_path).await?;
        let terms = Table::read(&terms_path, &data, ReadOptions::csv().select(&["name", "uri"]))?;
        let wanted = resolve_terms(&terms, &self.config.wanted_terms())?;

        let pages: HashSet<&str> = species.records.iter().filter_map(|r| r.get("eolID")).collect();
        let predicates: HashSet<&str> = wanted.iter().map(|(_, uri)| uri.as_str()).collect();

        let traits_path = self.config.traits_file();
        let data = self.storage.read_file(&traits_path).await?;
        let traits = Table::read_filtered(
            &traits_path,
            &data,
            ReadOptions::csv().select(&["page_id", "predicate", "value_uri"]),
            |record| {
                record.get("predicate").is_some_and(|p| predicates.contains(p))
                    && record.get("page_id").is_some_and(|p| pages.contains(p))
            },
        )?;
        tracing::info!("🏷️ {} trait rows for {} term(s)", traits.len(), wanted.len());

        Ok(TraitsInput {
            species,
            terms,
            traits,
            wanted,
        })
    }

    async fn transform(&self, input: TraitsInput) -> Result<TransformResult> {
        let value_names: HashMap<&str, String> = input
            .terms
            .records
            .iter()
            .filter_map(|r| Some((r.get("uri")?, capitalize(r.get("name")?))))
            .collect();

        let mut values: HashMap<(&str, &str), &str> = HashMap::new();
        for record in &input.traits.records {
            if let (Some(page), Some(predicate), Some(value)) = (
                record.get("page_id"),
                record.get("predicate"),
                record.get("value_uri"),
            ) {
                values.insert((page, predicate), value);
            }
        }

        let mut table = Table::new(
            std::iter::once("eolID".to_string()).chain(input.wanted.iter().map(|(name, _)| name.clone())),
        );
        for record in &input.species.records {
            let eol_id = record.get_or_empty("eolID");
            let mut row = Record::new().with("eolID", eol_id);
            for (name, predicate) in &input.wanted {
                let value = values
                    .get(&(eol_id, predicate.as_str()))
                    .and_then(|uri| value_names.get(uri))
                    .cloned()
                    .unwrap_or_default();
                row.set(name.as_str(), value);
            }
            table.push(row);
        }

        TransformResult::csv(table)
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let path = self.config.processed_path(TRAITS_STEM);
        write_output(&self.storage, &path, &result.rendered).await
    }
}
