use crate::adapters::inaturalist::DEFAULT_ENDPOINT;
use crate::adapters::storage::join_path;
use crate::core::sequence::StageKind;
use crate::domain::languages::LANGUAGES;
use crate::domain::taxa::{Deck, DeckProfile};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

const INPUT_EXTENSIONS: [&str; 4] = ["csv", "tsv", "tab", "txt"];

/// Config file looked up when none is named; it alone may be absent.
pub const DEFAULT_CONFIG_FILE: &str = "deck.toml";

/// Note fields before the per-language names (ids, scientific name, tags).
const LEADING_NOTE_FIELDS: usize = 5;
/// Note fields between the languages and the traits.
const DETAIL_NOTE_FIELDS: usize = 7;

/// Resource ids of the catalogs in EOL's `full_provider_ids.csv`.
pub const INATURALIST_RESOURCE_ID: u64 = 1177;
pub const GBIF_RESOURCE_ID: u64 = 1178;

pub const WIKIPEDIA_DESCRIPTION_TERM: &str = "http://rs.tdwg.org/ontology/voc/SPMInfoItems#Description";

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckConfig {
    #[serde(default)]
    pub deck: DeckSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub translations: TranslationsConfig,
    #[serde(default)]
    pub countries: CountriesConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub identification: IdentificationConfig,
    #[serde(default)]
    pub traits: TraitsConfig,
    #[serde(default)]
    pub combine: CombineConfig,
    #[serde(default)]
    pub sort: SortConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckSection {
    #[serde(default)]
    pub kind: Deck,
    pub name: Option<String>,
    pub notetype: Option<String>,
    /// Overrides the group's `higherClassification` prefix.
    pub taxa: Option<String>,
    pub ranks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Stages run by default, in order.
    pub stages: Option<Vec<StageKind>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: Option<String>,
    pub input_dir: Option<String>,
    pub processed_dir: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub taxon_file: Option<String>,
    pub provider_ids_file: Option<String>,
    pub providers: Option<Vec<ProviderConfig>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Column added to the species table.
    pub column: String,
    pub resource_id: u64,
    /// Species without an id from this provider are dropped.
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationsConfig {
    pub file: Option<String>,
    /// Subset of language columns to fill; all when absent.
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountriesConfig {
    pub file: Option<String>,
    pub min_observations: Option<u64>,
    pub rare_threshold: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    #[default]
    Inaturalist,
    MediaManifest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesConfig {
    pub source: Option<ImageSource>,
    pub endpoint: Option<String>,
    pub batch_size: Option<usize>,
    pub requests_per_minute: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub manifest_dir: Option<String>,
    pub max_images: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Html,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationSource {
    pub name: String,
    pub file: String,
    /// Column of the species table holding this source's id.
    pub key_column: String,
    pub id_column: Option<String>,
    pub content_column: Option<String>,
    pub filter_column: Option<String>,
    pub filter_value: Option<String>,
    pub format: Option<SourceFormat>,
}

impl IdentificationSource {
    pub fn id_column(&self) -> &str {
        self.id_column.as_deref().unwrap_or("taxonID")
    }

    pub fn content_column(&self) -> &str {
        self.content_column.as_deref().unwrap_or("description")
    }

    pub fn format(&self) -> SourceFormat {
        self.format.unwrap_or_default()
    }

    pub fn filter(&self) -> Option<(&str, &str)> {
        Some((self.filter_column.as_deref()?, self.filter_value.as_deref()?))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentificationConfig {
    pub max_length: Option<usize>,
    pub sources: Option<Vec<IdentificationSource>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraitsConfig {
    pub traits_file: Option<String>,
    pub terms_file: Option<String>,
    pub wanted_terms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombineConfig {
    /// Classification components never turned into tags, on top of the deck prefix.
    pub strip_components: Option<Vec<String>>,
    pub require_images: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortConfig {
    /// Anki export to re-sort, relative to the output directory.
    pub export_file: Option<String>,
    /// Note field holding the taxonomic sort key (0-based).
    pub key_field: Option<usize>,
    /// Columns Anki puts before the note fields (guid, notetype, deck).
    pub prefix_columns: Option<usize>,
    pub numeric: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl DeckConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Loads `path`, falling back to defaults only when the default config
    /// file is missing.
    pub fn load(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else if path == DEFAULT_CONFIG_FILE {
            tracing::warn!("⚠️ {} not found, using built-in defaults", DEFAULT_CONFIG_FILE);
            Ok(Self::default())
        } else {
            Err(EtlError::MissingConfigError {
                field: format!("config file {}", path),
            })
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn for_deck(deck: Deck) -> Self {
        let mut config = Self::default();
        config.deck.kind = deck;
        config
    }

    pub fn apply_overrides(&mut self, deck: Option<Deck>, data_dir: Option<String>) {
        if let Some(deck) = deck {
            if deck != self.deck.kind {
                tracing::info!("🔧 Deck overridden to: {}", deck);
            }
            self.deck.kind = deck;
        }
        if let Some(data_dir) = data_dir {
            tracing::info!("🔧 Data directory overridden to: {}", data_dir);
            self.paths.data_dir = Some(data_dir);
        }
    }

    pub fn profile(&self) -> DeckProfile {
        let mut profile = DeckProfile::new(self.deck.kind);
        if let Some(name) = &self.deck.name {
            profile.name = name.clone();
        }
        if let Some(notetype) = &self.deck.notetype {
            profile.notetype = notetype.clone();
        }
        if let Some(taxa) = &self.deck.taxa {
            profile.taxa = taxa.trim_end_matches('|').to_string();
        }
        if let Some(ranks) = &self.deck.ranks {
            profile.ranks = ranks.clone();
        }
        profile
    }

    pub fn stages(&self) -> Vec<StageKind> {
        self.pipeline
            .stages
            .clone()
            .unwrap_or_else(|| StageKind::DEFAULT_ORDER.to_vec())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().is_some_and(|m| m.enabled)
    }

    // Paths. All are relative to the data directory.

    pub fn data_dir(&self) -> &str {
        self.paths.data_dir.as_deref().unwrap_or("data")
    }

    pub fn input_path(&self, file: &str) -> String {
        join_path(&[self.paths.input_dir.as_deref().unwrap_or("input"), file])
    }

    /// `processed/{Type} {stem}.csv`, e.g. `processed/Animal species with countries.csv`.
    pub fn processed_path(&self, stem: &str) -> String {
        join_path(&[
            self.paths.processed_dir.as_deref().unwrap_or("processed"),
            &format!("{} {}.csv", self.deck.kind.type_name(), stem),
        ])
    }

    pub fn output_path(&self, file: &str) -> String {
        join_path(&[self.paths.output_dir.as_deref().unwrap_or("output"), file])
    }

    pub fn deck_output_path(&self) -> String {
        self.output_path(&format!("{}.csv", self.profile().name))
    }

    // Stage settings.

    pub fn taxon_file(&self) -> String {
        self.input_path(self.taxonomy.taxon_file.as_deref().unwrap_or("taxon.tab"))
    }

    pub fn provider_ids_file(&self) -> String {
        self.input_path(
            self.taxonomy
                .provider_ids_file
                .as_deref()
                .unwrap_or("full_provider_ids.csv"),
        )
    }

    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.taxonomy.providers.clone().unwrap_or_else(|| {
            vec![
                ProviderConfig {
                    column: "inaturalistID".to_string(),
                    resource_id: INATURALIST_RESOURCE_ID,
                    required: Some(true),
                },
                ProviderConfig {
                    column: "gbifID".to_string(),
                    resource_id: GBIF_RESOURCE_ID,
                    required: Some(true),
                },
            ]
        })
    }

    pub fn vernacular_file(&self) -> String {
        self.input_path(self.translations.file.as_deref().unwrap_or("vernacularnames.csv"))
    }

    /// Language columns in deck order, filtered by `translations.languages`.
    pub fn languages(&self) -> Vec<(&'static str, &'static [&'static str])> {
        LANGUAGES
            .iter()
            .filter(|(name, _)| match &self.translations.languages {
                Some(wanted) => wanted.iter().any(|w| w.eq_ignore_ascii_case(name)),
                None => true,
            })
            .copied()
            .collect()
    }

    pub fn countries_file(&self) -> String {
        self.input_path(self.countries.file.as_deref().unwrap_or("GBIF_output.csv"))
    }

    pub fn min_observations(&self) -> u64 {
        self.countries.min_observations.unwrap_or(5)
    }

    pub fn rare_threshold(&self) -> u64 {
        self.countries.rare_threshold.unwrap_or(300)
    }

    pub fn image_source(&self) -> ImageSource {
        self.images.source.unwrap_or_default()
    }

    pub fn api_endpoint(&self) -> &str {
        self.images.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn batch_size(&self) -> usize {
        self.images.batch_size.unwrap_or(30)
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.images.requests_per_minute.unwrap_or(60)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.images.timeout_seconds.unwrap_or(30))
    }

    pub fn manifest_dir(&self) -> String {
        self.input_path(self.images.manifest_dir.as_deref().unwrap_or("media_manifest"))
    }

    pub fn max_images(&self) -> usize {
        self.images.max_images.unwrap_or(10)
    }

    pub fn identification_max_length(&self) -> usize {
        self.identification.max_length.unwrap_or(2200)
    }

    pub fn identification_sources(&self) -> Vec<IdentificationSource> {
        self.identification.sources.clone().unwrap_or_else(|| {
            vec![IdentificationSource {
                name: "Wikipedia".to_string(),
                file: "wikipedia_text/media_resource.tab".to_string(),
                key_column: "wikipediaID".to_string(),
                id_column: None,
                content_column: None,
                filter_column: Some("CVterm".to_string()),
                filter_value: Some(WIKIPEDIA_DESCRIPTION_TERM.to_string()),
                format: Some(SourceFormat::Html),
            }]
        })
    }

    pub fn traits_file(&self) -> String {
        self.input_path(
            self.traits
                .traits_file
                .as_deref()
                .unwrap_or("trait_bank/traits.csv"),
        )
    }

    pub fn terms_file(&self) -> String {
        self.input_path(
            self.traits
                .terms_file
                .as_deref()
                .unwrap_or("trait_bank/terms.csv"),
        )
    }

    pub fn wanted_terms(&self) -> Vec<String> {
        self.traits
            .wanted_terms
            .clone()
            .unwrap_or_else(|| vec!["conservation status".to_string()])
    }

    pub fn strip_components(&self) -> Vec<String> {
        self.combine.strip_components.clone().unwrap_or_default()
    }

    pub fn require_images(&self) -> bool {
        self.combine.require_images.unwrap_or(false)
    }

    pub fn export_path(&self) -> String {
        match &self.sort.export_file {
            Some(file) => self.output_path(file),
            None => self.output_path(&format!("{}.txt", self.profile().name)),
        }
    }

    pub fn sorted_export_path(&self) -> String {
        let export = self.export_path();
        let stem = export.strip_suffix(".txt").unwrap_or(&export);
        format!("{} sorted.txt", stem)
    }

    /// 0-based note field holding the taxonomic position.
    pub fn taxonomic_sort_field(&self) -> usize {
        LEADING_NOTE_FIELDS + LANGUAGES.len() + DETAIL_NOTE_FIELDS + self.wanted_terms().len()
    }

    pub fn sort_key_field(&self) -> usize {
        self.sort.key_field.unwrap_or_else(|| self.taxonomic_sort_field())
    }

    pub fn sort_prefix_columns(&self) -> usize {
        self.sort.prefix_columns.unwrap_or(3)
    }

    pub fn sort_numeric(&self) -> bool {
        self.sort.numeric.unwrap_or(false)
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_path("paths.data_dir", self.data_dir())?;

        let profile = self.profile();
        validate_non_empty_string("deck.name", &profile.name)?;
        validate_non_empty_string("deck.notetype", &profile.notetype)?;
        validate_non_empty_string("deck.taxa", &profile.taxa)?;
        if profile.ranks.is_empty() {
            return Err(EtlError::InvalidConfigValueError {
                field: "deck.ranks".to_string(),
                value: "[]".to_string(),
                reason: "At least one taxon rank is required".to_string(),
            });
        }

        for (field, file) in [
            ("taxonomy.taxon_file", self.taxon_file()),
            ("taxonomy.provider_ids_file", self.provider_ids_file()),
            ("translations.file", self.vernacular_file()),
            ("countries.file", self.countries_file()),
            ("traits.traits_file", self.traits_file()),
            ("traits.terms_file", self.terms_file()),
        ] {
            validate_file_extension(field, &file, &INPUT_EXTENSIONS)?;
        }

        for provider in self.providers() {
            validate_non_empty_string("taxonomy.providers.column", &provider.column)?;
        }

        if let Some(wanted) = &self.translations.languages {
            for language in wanted {
                if !LANGUAGES.iter().any(|(name, _)| name.eq_ignore_ascii_case(language)) {
                    return Err(EtlError::InvalidConfigValueError {
                        field: "translations.languages".to_string(),
                        value: language.clone(),
                        reason: "Unknown language column".to_string(),
                    });
                }
            }
        }

        validate_positive_number("countries.rare_threshold", self.rare_threshold() as usize, 1)?;

        if self.image_source() == ImageSource::Inaturalist {
            validate_url("images.endpoint", self.api_endpoint())?;
            validate_range("images.batch_size", self.batch_size(), 1, 200)?;
        }
        validate_positive_number("images.max_images", self.max_images(), 1)?;

        validate_positive_number(
            "identification.max_length",
            self.identification_max_length(),
            1,
        )?;
        for source in self.identification_sources() {
            validate_non_empty_string("identification.sources.name", &source.name)?;
            validate_non_empty_string("identification.sources.key_column", &source.key_column)?;
            validate_file_extension(
                "identification.sources.file",
                &source.file,
                &INPUT_EXTENSIONS,
            )?;
        }

        for term in self.wanted_terms() {
            validate_non_empty_string("traits.wanted_terms", &term)?;
        }

        Ok(())
    }
}

impl Validate for DeckConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_animal_defaults() {
        let config = DeckConfig::from_toml_str("").unwrap();
        assert_eq!(config.deck.kind, Deck::Animals);
        assert_eq!(config.profile().name, "The Animal Deck");
        assert_eq!(config.taxon_file(), "input/taxon.tab");
        assert_eq!(config.processed_path("species"), "processed/Animal species.csv");
        assert_eq!(config.deck_output_path(), "output/The Animal Deck.csv");
        assert_eq!(config.batch_size(), 30);
        assert_eq!(config.languages().len(), 54);
        assert_eq!(config.stages(), StageKind::DEFAULT_ORDER.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[deck]
kind = "plants"
name = "Flora"
ranks = ["species"]

[pipeline]
stages = ["species", "translations", "combine"]

[paths]
data_dir = "/srv/decks"

[[taxonomy.providers]]
column = "inaturalistID"
resource_id = 1177
required = true

[[taxonomy.providers]]
column = "wikipediaID"
resource_id = 468

[translations]
languages = ["English", "german"]

[countries]
min_observations = 10

[images]
source = "media_manifest"
max_images = 4

[[identification.sources]]
name = "Animal Diversity Web"
file = "adw/descriptions.tsv"
key_column = "eolID"
format = "text"
"#;

        let config = DeckConfig::from_toml_str(toml_content).unwrap();
        let profile = config.profile();
        assert_eq!(profile.name, "Flora");
        assert_eq!(profile.ranks, vec!["species"]);
        assert_eq!(config.data_dir(), "/srv/decks");
        assert_eq!(config.processed_path("species"), "processed/Plant species.csv");
        assert_eq!(config.providers().len(), 2);
        assert_eq!(config.providers()[1].required, None);
        assert_eq!(config.languages().len(), 2);
        assert_eq!(config.min_observations(), 10);
        assert_eq!(config.rare_threshold(), 300);
        assert_eq!(config.image_source(), ImageSource::MediaManifest);
        let sources = config.identification_sources();
        assert_eq!(sources[0].format(), SourceFormat::Text);
        assert_eq!(sources[0].content_column(), "description");
        assert_eq!(
            config.stages(),
            vec![StageKind::Species, StageKind::Translations, StageKind::Combine]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SPECIES_DECK_TEST_DATA", "/tmp/deck-data");

        let config = DeckConfig::from_toml_str(
            r#"
[paths]
data_dir = "${SPECIES_DECK_TEST_DATA}"
output_dir = "${SPECIES_DECK_UNSET_VAR}"
"#,
        )
        .unwrap();
        assert_eq!(config.data_dir(), "/tmp/deck-data");
        assert_eq!(config.output_path("x.csv"), "${SPECIES_DECK_UNSET_VAR}/x.csv");

        std::env::remove_var("SPECIES_DECK_TEST_DATA");
    }

    #[test]
    fn test_config_validation() {
        let bad_endpoint = DeckConfig::from_toml_str("[images]\nendpoint = \"not a url\"").unwrap();
        assert!(bad_endpoint.validate().is_err());

        let bad_language =
            DeckConfig::from_toml_str("[translations]\nlanguages = [\"Klingon\"]").unwrap();
        assert!(bad_language.validate().is_err());

        let bad_file = DeckConfig::from_toml_str("[taxonomy]\ntaxon_file = \"taxon.json\"").unwrap();
        assert!(bad_file.validate().is_err());

        assert!(DeckConfig::from_toml_str("[deck]\nkind = \"bacteria\"").is_err());
    }

    #[test]
    fn test_overrides_and_sort_paths() {
        let mut config = DeckConfig::default();
        config.apply_overrides(Some(Deck::Fungi), Some("elsewhere".to_string()));
        assert_eq!(config.data_dir(), "elsewhere");
        assert_eq!(config.export_path(), "output/The Fungus Deck.txt");
        assert_eq!(config.sorted_export_path(), "output/The Fungus Deck sorted.txt");
        assert_eq!(config.sort_key_field(), 67);
        assert_eq!(config.sort_prefix_columns(), 3);

        config.traits.wanted_terms = Some(vec!["habitat".to_string(), "conservation status".to_string()]);
        assert_eq!(config.sort_key_field(), 68);
    }

    #[test]
    fn test_load_missing_config_file() {
        assert!(matches!(
            DeckConfig::load("/nonexistent/typo.toml"),
            Err(EtlError::MissingConfigError { .. })
        ));
        // Tests run from the crate root, which ships no deck.toml.
        let config = DeckConfig::load(DEFAULT_CONFIG_FILE).unwrap();
        assert_eq!(config.sort_key_field(), config.taxonomic_sort_field());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[deck]\nkind = \"fungi\"\nnotetype = \"Mushroom\"\n")
            .unwrap();

        let config = DeckConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.profile().notetype, "Mushroom");
        assert_eq!(config.profile().ranks, vec!["genus", "species"]);
    }
}
