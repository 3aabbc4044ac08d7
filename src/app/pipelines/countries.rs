use crate::app::pipelines::{read_species, write_output, COUNTRIES_STEM};
use crate::config::DeckConfig;
use crate::domain::countries::{country_tag, UNKNOWN_COUNTRY};
use crate::domain::model::{ReadOptions, Record, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

const OBSERVATION_COLUMNS: [&str; 3] = ["taxonkey", "countrycode", "observation_count"];

pub struct CountriesInput {
    pub species: Table,
    pub observations: Table,
}

/// Countries a species is regularly observed in, as `OBS::` tags.
pub struct CountriesPipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
}

impl<S: Storage> CountriesPipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self { storage, config }
    }
}

/// Country tags kept for one taxon, in input order. A country stays when
/// it has at least `min_observations`, or when the whole taxon is rare.
fn country_tags(rows: &[(&str, u64)], min_observations: u64, rare_threshold: u64) -> String {
    let total: u64 = rows.iter().map(|(_, count)| count).sum();
    rows.iter()
        .filter(|(_, count)| *count >= min_observations || total <= rare_threshold)
        .filter_map(|(code, _)| {
            let tag = country_tag(code);
            if tag.is_none() {
                tracing::debug!("Skipping unknown country code {}", code);
            }
            tag
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl<S: Storage> Pipeline for CountriesPipeline<S> {
    type Input = CountriesInput;

    fn name(&self) -> &str {
        "countries"
    }

    async fn extract(&self) -> Result<CountriesInput> {
        let species = read_species(&self.storage, &self.config, &["eolID", "gbifID"]).await?;
        let taxon_keys: HashSet<&str> = species.records.iter().filter_map(|r| r.get("gbifID")).collect();

        let path = self.config.countries_file();
        let data = self.storage.read_file(&path).await?;
        let observations = Table::read_filtered(
            &path,
            &data,
            ReadOptions::tsv().select(&OBSERVATION_COLUMNS),
            |record| {
                record.get_or_empty("countrycode") != UNKNOWN_COUNTRY
                    && record.get("taxonkey").is_some_and(|key| taxon_keys.contains(key))
            },
        )?;
        tracing::info!("🗺️ {} country observation rows", observations.len());

        Ok(CountriesInput {
            species,
            observations,
        })
    }

    async fn transform(&self, input: CountriesInput) -> Result<TransformResult> {
        let mut per_taxon: HashMap<&str, Vec<(&str, u64)>> = HashMap::new();
        for record in &input.observations.records {
            let (Some(taxon), Some(code)) = (record.get("taxonkey"), record.get("countrycode")) else {
                continue;
            };
            let count = record.get_or_empty("observation_count").parse::<u64>().unwrap_or_else(|_| {
                tracing::debug!(
                    "Invalid observation_count '{}' for taxon {}",
                    record.get_or_empty("observation_count"),
                    taxon
                );
                0
            });
            per_taxon.entry(taxon).or_default().push((code, count));
        }

        let min_observations = self.config.min_observations();
        let rare_threshold = self.config.rare_threshold();
        let mut table = Table::new(["eolID", "countries"]);
        for record in &input.species.records {
            let countries = record
                .get("gbifID")
                .and_then(|key| per_taxon.get(key))
                .map(|rows| country_tags(rows, min_observations, rare_threshold))
                .unwrap_or_default();
            table.push(
                Record::new()
                    .with("eolID", record.get_or_empty("eolID"))
                    .with("countries", countries),
            );
        }

        TransformResult::csv(table)
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let path = self.config.processed_path(COUNTRIES_STEM);
        write_output(&self.storage, &path, &result.rendered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStorage;

    const SPECIES: &str = "eolID,canonicalName,higherClassification,taxonRank,inaturalistID,gbifID\n\
328598,Canis lupus,Life|Metazoa,species,42048,5219173\n\
1037,Rare frog,Life|Metazoa,species,1,777\n\
4242,Unobserved,Life|Metazoa,species,2,888\n";

    const GBIF_OUTPUT: &str = "taxonkey\tcountrycode\tobservation_count\n\
5219173\tUS\t900\n\
5219173\tZZ\t5000\n\
5219173\tCA\t4\n\
5219173\tXK\t5\n\
5219173\tQQ\t50\n\
777\tBR\t2\n\
777\tCI\t1\n\
999\tFR\t10\n";

    #[test]
    fn test_country_thresholds() {
        let common = [("US", 900), ("CA", 4), ("MX", 5)];
        assert_eq!(
            country_tags(&common, 5, 300),
            "OBS::United-States-of-America OBS::Mexico"
        );

        let rare = [("BR", 2), ("CI", 1)];
        assert_eq!(country_tags(&rare, 5, 300), "OBS::Brazil OBS::Ivory-Coast");
        assert_eq!(country_tags(&[], 5, 300), "");
    }

    #[tokio::test]
    async fn test_countries_per_species() {
        let storage = MemoryStorage::new();
        storage.insert("processed/Animal species.csv", SPECIES).await;
        storage.insert("input/GBIF_output.csv", GBIF_OUTPUT).await;
        let pipeline = CountriesPipeline::new(storage.clone(), DeckConfig::default());

        let input = pipeline.extract().await.unwrap();
        // ZZ and unrelated taxa are dropped while reading.
        assert_eq!(input.observations.len(), 6);

        let result = pipeline.transform(input).await.unwrap();
        let path = pipeline.load(result).await.unwrap();
        let written = storage.get_string(&path).await.unwrap();
        assert_eq!(
            written,
            "eolID,countries\n\
328598,OBS::United-States-of-America OBS::Kosovo\n\
1037,OBS::Brazil OBS::Ivory-Coast\n\
4242,\n"
        );
    }
}
