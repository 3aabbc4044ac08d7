use httpmock::prelude::*;
use species_deck::app::build_sequence;
use species_deck::utils::validation::Validate;
use species_deck::{DeckConfig, EtlError, LocalStorage, StageKind, StageSequence};
use std::path::Path;
use tempfile::TempDir;

const TAXON_TAB: &str = "taxonID\teolID\tcanonicalName\ttaxonRank\thigherClassification\n\
EOL-1\t328598\tCanis lupus\tspecies\tLife|Cellular Organisms|Eukaryota|Opisthokonta|Metazoa|Chordata|Mammalia|Carnivora|Canidae|Canis\n\
EOL-2\t328580\tVulpes vulpes\tspecies\tLife|Cellular Organisms|Eukaryota|Opisthokonta|Metazoa|Chordata|Mammalia|Carnivora|Canidae|Vulpes\n\
EOL-3\t1061749\tQuercus robur\tspecies\tLife|Cellular Organisms|Eukaryota|Archaeplastida|Chloroplastida|Fagaceae|Quercus\n";

const PROVIDER_IDS: &str = "node_id,resource_pk,resource_id,page_id,preferred_canonical_for_page\n\
1,42048,1177,328598,Canis lupus\n\
2,5219173,1178,328598,Canis lupus\n\
3,42069,1177,328580,Vulpes vulpes\n\
4,5219243,1178,328580,Vulpes vulpes\n\
5,47851,1177,1061749,Quercus robur\n";

const VERNACULAR: &str = "page_id,canonical_form,vernacular_string,language_code,resource_name,is_preferred_by_resource,is_preferred_by_eol\n\
328598,Canis lupus,wolf,eng,ITIS,preferred,preferred\n\
328598,Canis lupus,loup gris,fre,Wikipedia,preferred,preferred\n\
328580,Vulpes vulpes,renard roux,fre,Wikipedia,,preferred\n";

const GBIF_OUTPUT: &str = "taxonkey\tcountrycode\tobservation_count\n\
5219173\tCA\t800\n\
5219173\tNO\t40\n\
5219173\tFR\t2\n\
5219243\tGB\t3\n";

const GUIDE: &str = "page_id\ttext\n\
328598\tLarge grey canid[1] living in packs.\n";

const TERMS: &str = "uri,name,type\n\
http://rs.tdwg.org/ontology/voc/SPMInfoItems#ConservationStatus,conservation status,measurement\n\
http://purl.obolibrary.org/obo/ENVO_01000181,least concern,value\n";

const TRAITS: &str = "eol_pk,page_id,predicate,value_uri\n\
R1,328598,http://rs.tdwg.org/ontology/voc/SPMInfoItems#ConservationStatus,http://purl.obolibrary.org/obo/ENVO_01000181\n";

fn write_inputs(data_dir: &Path) {
    let input = data_dir.join("input");
    std::fs::create_dir_all(input.join("trait_bank")).unwrap();
    std::fs::write(input.join("taxon.tab"), TAXON_TAB).unwrap();
    std::fs::write(input.join("full_provider_ids.csv"), PROVIDER_IDS).unwrap();
    std::fs::write(input.join("vernacularnames.csv"), VERNACULAR).unwrap();
    std::fs::write(input.join("GBIF_output.csv"), GBIF_OUTPUT).unwrap();
    std::fs::write(input.join("guide.tsv"), GUIDE).unwrap();
    std::fs::write(input.join("trait_bank").join("terms.csv"), TERMS).unwrap();
    std::fs::write(input.join("trait_bank").join("traits.csv"), TRAITS).unwrap();
}

fn deck_config(data_dir: &Path, endpoint: &str) -> DeckConfig {
    let toml = format!(
        r#"
[deck]
kind = "animals"

[paths]
data_dir = "{data_dir}"

[images]
endpoint = "{endpoint}"
requests_per_minute = 600

[[identification.sources]]
name = "Field Guide"
file = "guide.tsv"
key_column = "eolID"
id_column = "page_id"
content_column = "text"
format = "text"
"#,
        data_dir = data_dir.display(),
        endpoint = endpoint,
    );
    let config = DeckConfig::from_toml_str(&toml).unwrap();
    config.validate().unwrap();
    config
}

fn taxa_payload() -> serde_json::Value {
    serde_json::json!({
        "total_results": 2,
        "results": [
            {
                "id": 42048,
                "preferred_common_name": "Gray Wolf",
                "extinct": false,
                "observations_count": 51234,
                "wikipedia_url": "https://en.wikipedia.org/wiki/Wolf",
                "conservation_status": {"status": "LC", "status_name": "least concern"},
                "taxon_photos": [
                    {"photo": {"attribution": "(c) A", "license_code": "cc-by", "large_url": "https://img/wolf.jpg"}}
                ]
            },
            {
                "id": 42069,
                "preferred_common_name": "Red Fox",
                "extinct": false,
                "observations_count": 90210,
                "taxon_photos": []
            }
        ]
    })
}

#[tokio::test]
async fn test_full_deck_build_with_mocked_inaturalist() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());

    let server = MockServer::start_async().await;
    let taxa_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/taxa/42048,42069")
                .query_param("per_page", "2");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(taxa_payload());
        })
        .await;

    let config = deck_config(temp_dir.path(), &server.base_url());
    let storage = LocalStorage::new(config.data_dir());
    let sequence = build_sequence("it".to_string(), &config.stages(), storage, &config);
    assert_eq!(sequence.len(), 7);

    let reports = sequence.execute_all().await.unwrap();
    taxa_mock.assert_async().await;

    let summary = StageSequence::get_execution_summary(&reports);
    assert_eq!(summary["total_stages"], serde_json::json!(7));
    // The oak is not an animal.
    assert!(reports.iter().all(|r| r.rows == 2));

    let species = std::fs::read_to_string(temp_dir.path().join("processed/Animal species.csv")).unwrap();
    assert!(species.starts_with("eolID,canonicalName,higherClassification,taxonRank,inaturalistID,gbifID\n"));

    let deck = std::fs::read_to_string(temp_dir.path().join("output/The Animal Deck.csv")).unwrap();
    let lines: Vec<&str> = deck.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[2], "#notetype:Species");
    assert_eq!(lines[4], "#tags column:3");

    let wolf = lines[6];
    assert!(wolf.starts_with(
        "328598,Canis lupus,OBS::Canada OBS::Norway Chordata::Mammalia::Carnivora::Canidae::Canis,42048,5219173,Gray Wolf,"
    ));
    assert!(wolf.contains("Loup Gris"));
    assert!(wolf.contains("<p>Large grey canid living in packs.</p>"));
    assert!(wolf.ends_with(",Least concern,1,2"));

    // Rare in GB, so its only country is kept.
    let fox = lines[7];
    assert!(fox.starts_with("328580,Vulpes vulpes,OBS::United-Kingdom Chordata::Mammalia::Carnivora::Canidae::Vulpes,"));
    assert!(fox.contains(",Red Fox,"));
    assert!(fox.contains("Renard Roux"));
    assert!(fox.ends_with(",2,1"));
}

#[tokio::test]
async fn test_api_error_stops_the_sequence() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());

    let server = MockServer::start_async().await;
    let taxa_mock = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/taxa/");
            then.status(500).body("upstream unavailable");
        })
        .await;

    let config = deck_config(temp_dir.path(), &server.base_url());
    let storage = LocalStorage::new(config.data_dir());
    let sequence = build_sequence(
        "it".to_string(),
        &[StageKind::Species, StageKind::Images, StageKind::Combine],
        storage,
        &config,
    );

    let err = sequence.execute_all().await.unwrap_err();
    taxa_mock.assert_async().await;
    match err {
        EtlError::StageFailed { stage, details } => {
            assert_eq!(stage, "images");
            assert!(details.contains("500"));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(temp_dir.path().join("processed/Animal species.csv").exists());
    assert!(!temp_dir.path().join("output/The Animal Deck.csv").exists());
}

#[tokio::test]
async fn test_combine_without_optional_stages() {
    let temp_dir = TempDir::new().unwrap();
    write_inputs(temp_dir.path());

    let config = deck_config(temp_dir.path(), "https://api.inaturalist.org/v2");
    let storage = LocalStorage::new(config.data_dir());
    let sequence = build_sequence(
        "it".to_string(),
        &[StageKind::Species, StageKind::Combine],
        storage,
        &config,
    );

    let reports = sequence.execute_all().await.unwrap();
    assert_eq!(reports.len(), 2);

    let deck = std::fs::read_to_string(temp_dir.path().join("output/The Animal Deck.csv")).unwrap();
    let wolf = deck.lines().nth(6).unwrap();
    // No translations, countries or images: only ids, the taxonomy tag and the sort keys.
    assert!(wolf.starts_with("328598,Canis lupus,Chordata::Mammalia::Carnivora::Canidae::Canis,42048,5219173,,"));
}
