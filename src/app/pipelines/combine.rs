use crate::app::pipelines::{
    read_optional, read_species, write_output, COUNTRIES_STEM, IDENTIFICATION_STEM, IMAGES_STEM,
    TRAITS_STEM, TRANSLATIONS_STEM,
};
use crate::config::DeckConfig;
use crate::domain::languages::language_names;
use crate::domain::model::{into_string, Record, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::domain::taxa::DeckProfile;
use crate::utils::error::Result;
use crate::utils::text::{capitalize, capwords, tag_token};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;

pub const TAGS_COLUMN: &str = "Tags";
pub const TAXONOMIC_SORT_COLUMN: &str = "Taxonomic Sort";
pub const POPULARITY_SORT_COLUMN: &str = "Popularity Sort";

/// Processed tables merged onto the species list. `None` when the stage
/// never produced its file.
pub struct CombineInput {
    pub species: Table,
    pub translations: Option<Table>,
    pub countries: Option<Table>,
    pub images: Option<Table>,
    pub identification: Option<Table>,
    pub traits: Option<Table>,
}

/// Writes the Anki import file.
pub struct CombinePipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
}

impl<S: Storage> CombinePipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self { storage, config }
    }

    /// Note fields in import order.
    pub fn deck_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = ["EOL ID", "Scientific", TAGS_COLUMN, "iNaturalist ID", "GBIF ID"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        columns.extend(language_names().map(str::to_string));
        columns.extend(
            [
                "Countries",
                "Images",
                "Extinct",
                "Observations",
                "Wikipedia",
                "Summary",
                "Identification",
            ]
            .iter()
            .map(|c| c.to_string()),
        );
        columns.extend(self.config.wanted_terms().iter().map(|t| capwords(t)));
        columns.push(TAXONOMIC_SORT_COLUMN.to_string());
        columns.push(POPULARITY_SORT_COLUMN.to_string());
        columns
    }
}

/// Header lines understood by Anki's text importer.
pub fn anki_header(profile: &DeckProfile, columns: &[String]) -> String {
    let tags_column = columns
        .iter()
        .position(|c| c == TAGS_COLUMN)
        .map(|i| i + 1)
        .unwrap_or(0);
    format!(
        "#separator:Comma\n#html:true\n#notetype:{}\n#deck:{}\n#tags column:{}\n#columns:{}\n",
        profile.notetype,
        profile.name,
        tags_column,
        columns.join(",")
    )
}

/// `higherClassification` as one hierarchical tag, without the deck's own
/// prefix or any stripped component.
pub fn classification_tag(profile: &DeckProfile, classification: &str, strip: &[String]) -> String {
    let rest = classification
        .strip_prefix(profile.taxa.as_str())
        .unwrap_or(classification);
    rest.split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty() && !strip.iter().any(|s| s == c))
        .map(tag_token)
        .collect::<Vec<_>>()
        .join("::")
}

fn index_by_eol(table: &Option<Table>) -> HashMap<&str, &Record> {
    table
        .as_ref()
        .map(|t| t.index_by("eolID"))
        .unwrap_or_default()
}

fn observations(record: &Record) -> u64 {
    record
        .get("Observations")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// A finished note plus what it is ordered by.
struct Note<'a> {
    record: Record,
    rank: usize,
    classification: &'a str,
}

impl Note<'_> {
    fn scientific(&self) -> &str {
        self.record.get_or_empty("Scientific")
    }

    fn taxonomic_cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.classification.cmp(other.classification))
            .then_with(|| self.scientific().cmp(other.scientific()))
    }

    fn popularity_cmp(&self, other: &Self) -> Ordering {
        observations(&other.record)
            .cmp(&observations(&self.record))
            .then_with(|| self.scientific().cmp(other.scientific()))
    }
}

#[async_trait]
impl<S: Storage> Pipeline for CombinePipeline<S> {
    type Input = CombineInput;

    fn name(&self) -> &str {
        "combine"
    }

    async fn extract(&self) -> Result<CombineInput> {
        let species = read_species(&self.storage, &self.config, &[]).await?;
        let processed = |stem| self.config.processed_path(stem);

        Ok(CombineInput {
            translations: read_optional(&self.storage, &processed(TRANSLATIONS_STEM)).await?,
            countries: read_optional(&self.storage, &processed(COUNTRIES_STEM)).await?,
            images: read_optional(&self.storage, &processed(IMAGES_STEM)).await?,
            identification: read_optional(&self.storage, &processed(IDENTIFICATION_STEM)).await?,
            traits: read_optional(&self.storage, &processed(TRAITS_STEM)).await?,
            species,
        })
    }

    async fn transform(&self, input: CombineInput) -> Result<TransformResult> {
        let profile = self.config.profile();
        let strip = self.config.strip_components();
        let wanted_terms = self.config.wanted_terms();
        let columns = self.deck_columns();

        let translations = index_by_eol(&input.translations);
        let countries = index_by_eol(&input.countries);
        let images = index_by_eol(&input.images);
        let identification = index_by_eol(&input.identification);
        let traits = index_by_eol(&input.traits);
        let empty = Record::new();

        let mut notes: Vec<Note> = Vec::with_capacity(input.species.len());
        for species in &input.species.records {
            let eol_id = species.get_or_empty("eolID");
            let translation = translations.get(eol_id).copied().unwrap_or(&empty);
            let country = countries.get(eol_id).copied().unwrap_or(&empty);
            let image = images.get(eol_id).copied().unwrap_or(&empty);
            let description = identification.get(eol_id).copied().unwrap_or(&empty);
            let trait_values = traits.get(eol_id).copied().unwrap_or(&empty);

            if self.config.require_images() && image.get("images").is_none() {
                continue;
            }

            let mut row = Record::new()
                .with("EOL ID", eol_id)
                .with("Scientific", species.get_or_empty("canonicalName"))
                .with("iNaturalist ID", species.get_or_empty("inaturalistID"))
                .with("GBIF ID", species.get_or_empty("gbifID"));

            for language in language_names() {
                row.set(language, translation.get_or_empty(language));
            }
            let english = image
                .get("preferred_common_name")
                .or_else(|| translation.get("English"))
                .unwrap_or("");
            row.set("English", english);

            let country_tags = country.get_or_empty("countries");
            row.set("Countries", country_tags);
            row.set("Images", image.get_or_empty("images"));
            row.set("Extinct", image.get_or_empty("extinct"));
            row.set("Observations", image.get_or_empty("observations_count"));
            row.set("Wikipedia", image.get_or_empty("wikipedia_url"));
            row.set("Summary", image.get_or_empty("wikipedia_summary"));
            row.set("Identification", description.get_or_empty("identification"));

            for term in &wanted_terms {
                let mut value = trait_values.get_or_empty(term).to_string();
                if value.is_empty() && term == "conservation status" {
                    value = capitalize(image.get_or_empty("conservation_status"));
                }
                row.set(capwords(term), value);
            }

            let mut taxonomy = classification_tag(
                &profile,
                species.get_or_empty("higherClassification"),
                &strip,
            );
            if taxonomy.is_empty() {
                taxonomy = image.get_or_empty("taxonomy").to_string();
            }
            let rank = species.get_or_empty("taxonRank");
            let mut tags: Vec<&str> = vec![country_tags, taxonomy.as_str()];
            if profile.has_multiple_ranks() {
                tags.push(rank);
            }
            let tags = tags
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            row.set(TAGS_COLUMN, tags);

            notes.push(Note {
                record: row,
                rank: profile.rank_order(rank),
                classification: species.get_or_empty("higherClassification"),
            });
        }

        let mut popularity: Vec<usize> = (0..notes.len()).collect();
        popularity.sort_by(|&a, &b| notes[a].popularity_cmp(&notes[b]));
        let mut popularity_position = vec![0; notes.len()];
        for (position, index) in popularity.into_iter().enumerate() {
            popularity_position[index] = position + 1;
        }

        let mut ordered: Vec<(Note, usize)> = notes.into_iter().zip(popularity_position).collect();
        ordered.sort_by(|(a, _), (b, _)| a.taxonomic_cmp(b));

        let mut table = Table::new(columns.iter().cloned());
        for (position, (note, popularity)) in ordered.into_iter().enumerate() {
            let mut record = note.record;
            record.set(TAXONOMIC_SORT_COLUMN, (position + 1).to_string());
            record.set(POPULARITY_SORT_COLUMN, popularity.to_string());
            table.push(record);
        }
        tracing::info!("🃏 {} notes in {}", table.len(), profile.name);

        let mut writer = csv::Writer::from_writer(Vec::new());
        table.write_csv(&mut writer, false)?;
        let rendered = format!("{}{}", anki_header(&profile, &columns), into_string(writer)?);

        Ok(TransformResult { table, rendered })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let path = self.config.deck_output_path();
        write_output(&self.storage, &path, &result.rendered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStorage;
    use crate::domain::taxa::Deck;

    const SPECIES: &str = "eolID,canonicalName,higherClassification,taxonRank,inaturalistID,gbifID\n\
328598,Canis lupus,Life|Cellular Organisms|Eukaryota|Opisthokonta|Metazoa|Chordata|Mammalia|Canidae,species,42048,5219173\n\
1049343,Corvus corax,Life|Cellular Organisms|Eukaryota|Opisthokonta|Metazoa|Chordata|Aves|Corvidae,species,8010,2482513\n\
328580,Vulpes vulpes,,species,42069,5219243\n";

    async fn storage() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.insert("processed/Animal species.csv", SPECIES).await;
        storage
            .insert(
                "processed/Animal species with translations.csv",
                "eolID,canonicalName,English,German\n328598,Canis lupus,Grey Wolf,Wolf\n1049343,Corvus corax,Common Raven,Kolkrabe\n",
            )
            .await;
        storage
            .insert(
                "processed/Animal species with countries.csv",
                "eolID,countries\n328598,OBS::Canada OBS::Norway\n1049343,\n",
            )
            .await;
        storage
            .insert(
                "processed/Animal species with images.csv",
                "eolID,images,extinct,observations_count,wikipedia_url,wikipedia_summary,preferred_common_name,conservation_status,taxonomy\n\
328598,\"<img src=\"\"w.jpg\"\">|(c) A|cc-by\",false,500,https://en.wikipedia.org/wiki/Wolf,Big dog,Gray Wolf,least concern,Animalia::Chordata::Mammalia\n\
1049343,,false,900,,,,,\n\
328580,,false,500,,,Red Fox,,Animalia::Chordata::Mammalia::Carnivora\n",
            )
            .await;
        storage
    }

    #[test]
    fn test_classification_tag() {
        let profile = DeckProfile::new(Deck::Animals);
        let strip = vec!["Chordata".to_string()];
        assert_eq!(
            classification_tag(
                &profile,
                "Life|Cellular Organisms|Eukaryota|Opisthokonta|Metazoa|Chordata|Sea Turtles|Cheloniidae",
                &strip
            ),
            "Sea-Turtles::Cheloniidae"
        );
        assert_eq!(classification_tag(&profile, "", &strip), "");
    }

    #[test]
    fn test_anki_header() {
        let profile = DeckProfile::new(Deck::Plants);
        let columns = vec!["EOL ID".to_string(), "Scientific".to_string(), "Tags".to_string()];
        assert_eq!(
            anki_header(&profile, &columns),
            "#separator:Comma\n#html:true\n#notetype:Species\n#deck:The Plant Deck\n#tags column:3\n#columns:EOL ID,Scientific,Tags\n"
        );
    }

    #[test]
    fn test_default_sort_key_is_taxonomic_sort() {
        for terms in [None, Some(vec!["habitat".to_string(), "conservation status".to_string()])] {
            let mut config = DeckConfig::for_deck(Deck::Plants);
            config.traits.wanted_terms = terms;
            let key = config.sort_key_field();
            let pipeline = CombinePipeline::new(MemoryStorage::new(), config);
            assert_eq!(pipeline.deck_columns()[key], TAXONOMIC_SORT_COLUMN);
        }
    }

    #[tokio::test]
    async fn test_combines_available_tables() {
        let storage = storage().await;
        let pipeline = CombinePipeline::new(storage.clone(), DeckConfig::for_deck(Deck::Animals));
        let columns = pipeline.deck_columns();
        assert_eq!(columns.len(), 5 + 54 + 7 + 1 + 2);

        let input = pipeline.extract().await.unwrap();
        assert!(input.identification.is_none());
        assert!(input.traits.is_none());

        let result = pipeline.transform(input).await.unwrap();
        let notes = &result.table.records;
        assert_eq!(notes.len(), 3);

        // Taxonomic order: empty classification first, then Aves before Mammalia.
        assert_eq!(notes[0].get("Scientific"), Some("Vulpes vulpes"));
        assert_eq!(notes[1].get("Scientific"), Some("Corvus corax"));
        assert_eq!(notes[2].get("Scientific"), Some("Canis lupus"));

        let wolf = &notes[2];
        assert_eq!(wolf.get("English"), Some("Gray Wolf"));
        assert_eq!(wolf.get("German"), Some("Wolf"));
        assert_eq!(
            wolf.get("Tags"),
            Some("OBS::Canada OBS::Norway Chordata::Mammalia::Canidae")
        );
        assert_eq!(wolf.get("Conservation Status"), Some("Least concern"));
        assert_eq!(wolf.get("Taxonomic Sort"), Some("3"));
        // 900 observations beat 500; ties fall back to the name.
        assert_eq!(wolf.get("Popularity Sort"), Some("2"));

        let fox = &notes[0];
        assert_eq!(fox.get("English"), Some("Red Fox"));
        assert_eq!(fox.get("Tags"), Some("Animalia::Chordata::Mammalia::Carnivora"));
        assert_eq!(fox.get("Popularity Sort"), Some("3"));

        let raven = &notes[1];
        assert_eq!(raven.get("English"), Some("Common Raven"));
        assert_eq!(raven.get("Popularity Sort"), Some("1"));
        assert_eq!(raven.get("Identification"), None);

        let path = pipeline.load(result).await.unwrap();
        assert_eq!(path, "output/The Animal Deck.csv");
        let written = storage.get_string(&path).await.unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "#separator:Comma");
        assert_eq!(lines[3], "#deck:The Animal Deck");
        assert_eq!(lines[4], "#tags column:3");
        assert!(lines[5].starts_with("#columns:EOL ID,Scientific,Tags,iNaturalist ID,GBIF ID,English,Afrikaans,"));
        assert!(lines[5].ends_with(",Identification,Conservation Status,Taxonomic Sort,Popularity Sort"));
        assert!(lines[6].starts_with("328580,Vulpes vulpes,"));
        assert_eq!(lines.len(), 9);
    }

    #[tokio::test]
    async fn test_require_images_and_rank_tags() {
        let storage = storage().await;
        let mut config = DeckConfig::for_deck(Deck::Animals);
        config.deck.ranks = Some(vec!["genus".to_string(), "species".to_string()]);
        config.combine.require_images = Some(true);
        let pipeline = CombinePipeline::new(storage, config);

        let input = pipeline.extract().await.unwrap();
        let result = pipeline.transform(input).await.unwrap();
        assert_eq!(result.table.len(), 1);

        let wolf = &result.table.records[0];
        assert!(wolf.get("Tags").unwrap().ends_with(" species"));
        assert_eq!(wolf.get("Taxonomic Sort"), Some("1"));
        assert_eq!(wolf.get("Popularity Sort"), Some("1"));
        assert!(result.rendered.contains("\"<img src=\"\"w.jpg\"\">|(c) A|cc-by\""));
    }

    #[tokio::test]
    async fn test_species_file_is_required() {
        let pipeline = CombinePipeline::new(MemoryStorage::new(), DeckConfig::default());
        assert!(pipeline.extract().await.is_err());
    }
}
