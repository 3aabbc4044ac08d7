use crate::app::pipelines::{read_species, write_output, SPECIES_STEM, TRANSLATIONS_STEM};
use crate::config::DeckConfig;
use crate::domain::languages::language_for_code;
use crate::domain::model::{ReadOptions, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use crate::utils::text::{capwords, spelling_key};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

const VERNACULAR_COLUMNS: [&str; 5] = [
    "page_id",
    "vernacular_string",
    "language_code",
    "is_preferred_by_resource",
    "is_preferred_by_eol",
];

pub struct TranslationsInput {
    pub species: Table,
    pub vernacular: Table,
}

/// Common names per language, one column per deck language.
pub struct TranslationsPipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
}

impl<S: Storage> TranslationsPipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self { storage, config }
    }
}

struct Name {
    text: String,
    by_resource: bool,
    by_eol: String,
}

/// Names of one page in one language, in file order.
#[derive(Default)]
struct NameGroup {
    names: Vec<Name>,
}

impl NameGroup {
    /// Keeps the first name per `is_preferred_by_eol` value, then the
    /// preferred-by-resource ones among those when there are any;
    /// capitalized, with near-identical spellings collapsed.
    fn merged(&self) -> String {
        let mut eol_values = HashSet::new();
        let firsts: Vec<&Name> = self
            .names
            .iter()
            .filter(|name| eol_values.insert(name.by_eol.as_str()))
            .collect();

        let any_preferred = firsts.iter().any(|name| name.by_resource);
        let mut seen = HashSet::new();
        firsts
            .into_iter()
            .filter(|name| !any_preferred || name.by_resource)
            .map(|name| capwords(&name.text))
            .filter(|name| !name.is_empty() && seen.insert(spelling_key(name)))
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

#[async_trait]
impl<S: Storage> Pipeline for TranslationsPipeline<S> {
    type Input = TranslationsInput;

    fn name(&self) -> &str {
        "translations"
    }

    async fn extract(&self) -> Result<TranslationsInput> {
        let species = read_species(&self.storage, &self.config, &[]).await?;
        species.require_columns(&self.config.processed_path(SPECIES_STEM), &["eolID"])?;

        let pages: HashSet<String> = species
            .records
            .iter()
            .filter_map(|r| r.get("eolID"))
            .map(str::to_string)
            .collect();
        let languages = self.config.languages();

        let path = self.config.vernacular_file();
        let data = self.storage.read_file(&path).await?;
        let vernacular = Table::read_filtered(
            &path,
            &data,
            ReadOptions::csv().select(&VERNACULAR_COLUMNS),
            |record| {
                record.get("is_preferred_by_eol").is_some()
                    && record.get("page_id").is_some_and(|page| pages.contains(page))
                    && record
                        .get("language_code")
                        .and_then(language_for_code)
                        .is_some_and(|language| languages.iter().any(|(name, _)| *name == language))
            },
        )?;
        tracing::info!("🌍 {} vernacular names for {} species", vernacular.len(), species.len());

        Ok(TranslationsInput {
            species,
            vernacular,
        })
    }

    async fn transform(&self, input: TranslationsInput) -> Result<TransformResult> {
        let TranslationsInput {
            mut species,
            vernacular,
        } = input;

        let mut groups: HashMap<(String, &'static str), NameGroup> = HashMap::new();
        for record in &vernacular.records {
            let (Some(page), Some(language)) = (
                record.get("page_id"),
                record.get("language_code").and_then(language_for_code),
            ) else {
                continue;
            };
            groups
                .entry((page.to_string(), language))
                .or_default()
                .names
                .push(Name {
                    text: record.get_or_empty("vernacular_string").to_string(),
                    by_resource: record.get_or_empty("is_preferred_by_resource") == "preferred",
                    by_eol: record.get_or_empty("is_preferred_by_eol").to_string(),
                });
        }

        let merged: HashMap<(String, &'static str), String> = groups
            .into_iter()
            .map(|(key, group)| (key, group.merged()))
            .collect();

        for (language, _) in self.config.languages() {
            species.add_column(language);
            let mut filled = 0;
            for record in &mut species.records {
                let value = record
                    .get("eolID")
                    .and_then(|page| merged.get(&(page.to_string(), language)))
                    .cloned()
                    .unwrap_or_default();
                if !value.is_empty() {
                    filled += 1;
                }
                record.set(language, value);
            }
            tracing::debug!("{}: {} species named", language, filled);
        }

        TransformResult::csv(species)
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let path = self.config.processed_path(TRANSLATIONS_STEM);
        write_output(&self.storage, &path, &result.rendered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStorage;

    const SPECIES: &str = "eolID,canonicalName,higherClassification,taxonRank,inaturalistID,gbifID\n\
328598,Canis lupus,Life|Metazoa,species,42048,5219173\n\
1049343,Corvus corax,Life|Metazoa,species,8010,2482513\n";

    const VERNACULAR: &str = "page_id,canonical_form,vernacular_string,language_code,resource_name,is_preferred_by_resource,is_preferred_by_eol\n\
328598,Canis lupus,gray wolf,eng,ITIS,preferred,preferred\n\
328598,Canis lupus,Grey Wolf,eng,Wikipedia,,preferred\n\
328598,Canis lupus,GRAY-WOLF,eng,Other,preferred,preferred\n\
328598,Canis lupus,timber wolf,eng,Other,,\n\
328598,Canis lupus,狼,zh-cn,Wikipedia,,preferred\n\
328598,Canis lupus,灰狼,chi,Other,,preferred\n\
328598,Canis lupus,Ulv,nob,Other,,preferred\n\
1049343,Corvus corax,common raven,eng,ITIS,,preferred\n\
1049343,Corvus corax,Raven,eng,Other,,preferred\n\
1049343,Corvus corax,grand corbeau,fre,Other,,preferred\n\
1049343,Corvus corax,Kolkrabe,klingon,Other,,preferred\n\
999,Ghost,ghost,eng,Other,preferred,preferred\n";

    async fn run(config: DeckConfig) -> Table {
        let storage = MemoryStorage::new();
        storage.insert("processed/Animal species.csv", SPECIES).await;
        storage.insert("input/vernacularnames.csv", VERNACULAR).await;
        let pipeline = TranslationsPipeline::new(storage.clone(), config);

        let input = pipeline.extract().await.unwrap();
        let result = pipeline.transform(input).await.unwrap();
        let path = pipeline.load(result.clone()).await.unwrap();
        assert_eq!(path, "processed/Animal species with translations.csv");
        assert!(storage.get_string(&path).await.is_some());
        result.table
    }

    #[tokio::test]
    async fn test_preferred_names_win_and_spellings_collapse() {
        let table = run(DeckConfig::default()).await;
        let wolf = &table.records[0];
        // Only the first EOL-preferred name of a language survives.
        assert_eq!(wolf.get("English"), Some("Gray Wolf"));
        assert_eq!(wolf.get("Chinese"), Some("狼"));
        assert_eq!(wolf.get("Norwegian"), Some("Ulv"));
        assert_eq!(wolf.get("French"), None);
    }

    #[tokio::test]
    async fn test_first_eol_preferred_name_is_kept() {
        let table = run(DeckConfig::default()).await;
        let raven = &table.records[1];
        assert_eq!(raven.get("English"), Some("Common Raven"));
        assert_eq!(raven.get("French"), Some("Grand Corbeau"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns.len(), 6 + 54);
    }

    #[tokio::test]
    async fn test_language_subset() {
        let mut config = DeckConfig::default();
        config.translations.languages = Some(vec!["French".to_string()]);
        let table = run(config).await;
        assert!(!table.has_column("English"));
        assert_eq!(table.records[1].get("French"), Some("Grand Corbeau"));
    }

    fn name(text: &str, by_resource: bool, by_eol: &str) -> Name {
        Name {
            text: text.to_string(),
            by_resource,
            by_eol: by_eol.to_string(),
        }
    }

    #[test]
    fn test_name_group_without_preferred_keeps_all() {
        let group = NameGroup {
            names: vec![
                name("lobo", false, "preferred"),
                name("Lobo Gris", false, "trusted"),
                name("LOBO", false, "other"),
                name("lobo ibérico", false, "preferred"),
            ],
        };
        assert_eq!(group.merged(), "Lobo / Lobo Gris");
    }

    #[test]
    fn test_name_group_first_per_eol_value_then_resource_preference() {
        let group = NameGroup {
            names: vec![
                name("lobo", false, "preferred"),
                name("lobo gris", true, "preferred"),
                name("lobo común", true, "trusted"),
            ],
        };
        // "lobo gris" repeats an EOL value, so only "lobo común" is resource-preferred.
        assert_eq!(group.merged(), "Lobo Común");
    }

    #[test]
    fn test_name_group_drops_common_prefix_variant() {
        let group = NameGroup {
            names: vec![name("common raven", false, "preferred"), name("Raven", false, "trusted")],
        };
        assert_eq!(group.merged(), "Common Raven");
    }
}
