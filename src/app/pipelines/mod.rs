pub mod combine;
pub mod countries;
pub mod identification;
pub mod images;
pub mod sort;
pub mod species;
pub mod traits;
pub mod translations;

pub use combine::CombinePipeline;
pub use countries::CountriesPipeline;
pub use identification::IdentificationPipeline;
pub use images::ImagesPipeline;
pub use sort::SortPipeline;
pub use species::SpeciesPipeline;
pub use traits::TraitsPipeline;
pub use translations::TranslationsPipeline;

use crate::config::DeckConfig;
use crate::domain::model::{ReadOptions, Table};
use crate::domain::ports::Storage;
use crate::utils::error::Result;

/// Processed file stems, one per stage output.
pub const SPECIES_STEM: &str = "species";
pub const TRANSLATIONS_STEM: &str = "species with translations";
pub const COUNTRIES_STEM: &str = "species with countries";
pub const IMAGES_STEM: &str = "species with images";
pub const IDENTIFICATION_STEM: &str = "species with identification";
pub const TRAITS_STEM: &str = "species with traits";

/// Reads `processed/{Type} species.csv`, written by the species stage.
/// An empty `columns` keeps every column.
pub(crate) async fn read_species<S: Storage>(
    storage: &S,
    config: &DeckConfig,
    columns: &[&str],
) -> Result<Table> {
    let path = config.processed_path(SPECIES_STEM);
    let data = storage.read_file(&path).await?;
    let options = if columns.is_empty() {
        ReadOptions::csv()
    } else {
        ReadOptions::csv().select(columns)
    };
    Table::read(&path, &data, options)
}

/// Reads an optional processed table. A missing file is logged and yields
/// `None`; its columns stay empty downstream.
pub(crate) async fn read_optional<S: Storage>(storage: &S, path: &str) -> Result<Option<Table>> {
    if !storage.exists(path).await {
        tracing::warn!("⚠️ {} not found, its columns will be empty", path);
        return Ok(None);
    }
    let data = storage.read_file(path).await?;
    Table::read(path, &data, ReadOptions::csv()).map(Some)
}

pub(crate) async fn write_output<S: Storage>(storage: &S, path: &str, contents: &str) -> Result<String> {
    tracing::debug!("Writing {} bytes to {}", contents.len(), path);
    storage.write_file(path, contents.as_bytes()).await?;
    Ok(path.to_string())
}
