use crate::adapters::inaturalist::{InaturalistClient, TaxonResult};
use crate::adapters::storage::join_path;
use crate::app::pipelines::{read_species, write_output, IMAGES_STEM};
use crate::config::toml_config::ImageSource;
use crate::config::DeckConfig;
use crate::domain::model::{Record, Table, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use crate::utils::rate_limiter::RateLimiter;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

pub const IMAGE_COLUMNS: [&str; 9] = [
    "eolID",
    "images",
    "extinct",
    "observations_count",
    "wikipedia_url",
    "wikipedia_summary",
    "preferred_common_name",
    "conservation_status",
    "taxonomy",
];

const MANIFEST_PREFIX: &str = "media_manifest";

pub enum ImageData {
    Inaturalist(Vec<TaxonResult>),
    /// `(page_id, image)` pairs in file order.
    Manifest(Vec<(String, String)>),
}

pub struct ImagesInput {
    pub species: Table,
    pub data: ImageData,
}

/// Photos and taxon metadata, from the iNaturalist API or a local media
/// manifest.
pub struct ImagesPipeline<S: Storage> {
    storage: S,
    config: DeckConfig,
}

impl<S: Storage> ImagesPipeline<S> {
    pub fn new(storage: S, config: DeckConfig) -> Self {
        Self { storage, config }
    }

    async fn fetch_inaturalist(&self, species: &Table) -> Result<Vec<TaxonResult>> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = species
            .records
            .iter()
            .filter_map(|r| r.get("inaturalistID"))
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect();

        let limiter = RateLimiter::per_minute(self.config.requests_per_minute());
        let client = InaturalistClient::new(
            self.config.api_endpoint(),
            limiter,
            self.config.request_timeout(),
        )?;

        let batch_size = self.config.batch_size();
        let batches = ids.len().div_ceil(batch_size);
        tracing::info!("📷 Fetching {} taxa in {} batches", ids.len(), batches);

        let mut results = Vec::with_capacity(ids.len());
        for (index, batch) in ids.chunks(batch_size).enumerate() {
            let fetched = client.fetch_taxa(batch).await?;
            tracing::debug!("Batch {}/{}: {} results", index + 1, batches, fetched.len());
            results.extend(fetched);
        }
        Ok(results)
    }

    /// Every `media_manifest*` file in the manifest directory. Files may or
    /// may not start with a header row; rows whose page id is not numeric
    /// are skipped.
    async fn read_manifest(&self) -> Result<Vec<(String, String)>> {
        let dir = self.config.manifest_dir();
        let files: Vec<String> = self
            .storage
            .list_files(&dir)
            .await?
            .into_iter()
            .filter(|name| name.starts_with(MANIFEST_PREFIX))
            .collect();
        tracing::info!("📷 Reading {} media manifest file(s) from {}", files.len(), dir);

        let mut images = Vec::new();
        for file in files {
            let data = self.storage.read_file(&join_path(&[&dir, &file])).await?;
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(data.as_slice());
            for row in reader.records() {
                let row = row?;
                let page = row.get(1).unwrap_or("").trim();
                if page.is_empty() || !page.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                let image = (3..=5)
                    .map(|i| row.get(i).unwrap_or("").trim())
                    .collect::<Vec<_>>()
                    .join("|");
                images.push((page.to_string(), image));
            }
        }
        tracing::info!("📷 {} images loaded", images.len());
        Ok(images)
    }
}

fn taxon_record(eol_id: &str, taxon: Option<&TaxonResult>) -> Record {
    let mut record = Record::new().with("eolID", eol_id);
    if let Some(taxon) = taxon {
        record.set("images", taxon.images_html());
        record.set(
            "extinct",
            taxon.extinct.map(|e| e.to_string()).unwrap_or_default(),
        );
        record.set(
            "observations_count",
            taxon
                .observations_count
                .map(|c| c.to_string())
                .unwrap_or_default(),
        );
        record.set("wikipedia_url", taxon.wikipedia_url.clone().unwrap_or_default());
        record.set(
            "wikipedia_summary",
            taxon.wikipedia_summary.clone().unwrap_or_default(),
        );
        record.set(
            "preferred_common_name",
            taxon.preferred_common_name.clone().unwrap_or_default(),
        );
        record.set("conservation_status", taxon.conservation_label());
        record.set("taxonomy", taxon.taxonomy_path());
    }
    record
}

#[async_trait]
impl<S: Storage> Pipeline for ImagesPipeline<S> {
    type Input = ImagesInput;

    fn name(&self) -> &str {
        "images"
    }

    async fn extract(&self) -> Result<ImagesInput> {
        let source = self.config.image_source();
        let columns: &[&str] = match source {
            ImageSource::Inaturalist => &["eolID", "inaturalistID"],
            ImageSource::MediaManifest => &["eolID"],
        };
        let species = read_species(&self.storage, &self.config, columns).await?;

        let data = match source {
            ImageSource::Inaturalist => ImageData::Inaturalist(self.fetch_inaturalist(&species).await?),
            ImageSource::MediaManifest => ImageData::Manifest(self.read_manifest().await?),
        };
        Ok(ImagesInput { species, data })
    }

    async fn transform(&self, input: ImagesInput) -> Result<TransformResult> {
        let mut table = Table::new(IMAGE_COLUMNS);

        match &input.data {
            ImageData::Inaturalist(results) => {
                let mut by_id: HashMap<String, &TaxonResult> = HashMap::new();
                for taxon in results {
                    by_id.entry(taxon.id.to_string()).or_insert(taxon);
                }
                for record in &input.species.records {
                    let taxon = record.get("inaturalistID").and_then(|id| by_id.get(id)).copied();
                    table.push(taxon_record(record.get_or_empty("eolID"), taxon));
                }
            }
            ImageData::Manifest(images) => {
                let max_images = self.config.max_images();
                let mut by_page: HashMap<&str, Vec<&str>> = HashMap::new();
                for (page, image) in images {
                    let entry = by_page.entry(page.as_str()).or_default();
                    if entry.len() < max_images {
                        entry.push(image.as_str());
                    }
                }
                for record in &input.species.records {
                    let eol_id = record.get_or_empty("eolID");
                    let images = by_page.get(eol_id).map(|v| v.join(";;")).unwrap_or_default();
                    table.push(Record::new().with("eolID", eol_id).with("images", images));
                }
            }
        }

        let with_images = table.records.iter().filter(|r| r.get("images").is_some()).count();
        tracing::info!("📷 {} of {} species have images", with_images, table.len());
        TransformResult::csv(table)
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let path = self.config.processed_path(IMAGES_STEM);
        write_output(&self.storage, &path, &result.rendered).await
    }
}
