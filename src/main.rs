use clap::Parser;
use species_deck::app::build_sequence;
use species_deck::config::toml_config::ImageSource;
use species_deck::utils::{logger, validation::Validate};
use species_deck::{CliConfig, DeckConfig, EtlError, LocalStorage, StageKind, StageSequence};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting species-deck");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = cli.validate() {
        fail(&e, "Invalid command line");
    }

    tracing::info!("📁 Loading configuration from: {}", cli.config);
    let config = match cli.load_deck_config() {
        Ok(config) => config,
        Err(e) => fail(&e, "Failed to load configuration"),
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        fail(&e, "Configuration validation failed");
    }
    tracing::info!("✅ Configuration loaded and validated successfully");

    let stages = cli.select_stages(&config.stages());
    display_config_summary(&config, &stages);

    if stages.is_empty() {
        tracing::warn!("⚠️ No stages selected, nothing to do");
        return Ok(());
    }

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config, &stages);
        return Ok(());
    }

    if config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let execution_id = format!("deck_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"));
    let storage = LocalStorage::new(config.data_dir());
    let sequence = build_sequence(execution_id.clone(), &stages, storage, &config);

    match sequence.execute_all().await {
        Ok(reports) => {
            let summary = StageSequence::get_execution_summary(&reports);
            tracing::info!("📊 Run {} summary: {}", execution_id, serde_json::to_string(&summary)?);
            println!("✅ {} stage(s) completed", reports.len());
            for report in &reports {
                println!(
                    "  {:<15} {:>7} rows  {:>8.1?}  📁 {}",
                    report.stage, report.rows, report.duration, report.output_path
                );
            }
        }
        Err(e) => fail(&e, "Deck build failed"),
    }

    Ok(())
}

fn fail(e: &EtlError, context: &str) -> ! {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 嚴重程度為 Low 時仍視為失敗
    std::process::exit(e.exit_code().max(1));
}

fn display_config_summary(config: &DeckConfig, stages: &[StageKind]) {
    let profile = config.profile();
    println!("📋 Configuration Summary:");
    println!("  Deck: {} ({}, {})", profile.name, config.deck.kind, config.deck.kind.kingdom());
    println!("  Ranks: {}", profile.ranks.join(", "));
    println!("  Data directory: {}", config.data_dir());
    println!(
        "  Stages: {}",
        stages.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
    );
    println!("  Languages: {}", config.languages().len());
}

fn perform_dry_run(config: &DeckConfig, stages: &[StageKind]) {
    use species_deck::app::pipelines::*;

    println!("🔍 Dry run: the following stages would run:");
    for stage in stages {
        let (reads, writes) = match stage {
            StageKind::Species => (
                vec![config.taxon_file(), config.provider_ids_file()],
                config.processed_path(SPECIES_STEM),
            ),
            StageKind::Translations => (
                vec![config.vernacular_file()],
                config.processed_path(TRANSLATIONS_STEM),
            ),
            StageKind::Countries => (
                vec![config.countries_file()],
                config.processed_path(COUNTRIES_STEM),
            ),
            StageKind::Images => (
                vec![match config.image_source() {
                    ImageSource::Inaturalist => config.api_endpoint().to_string(),
                    ImageSource::MediaManifest => config.manifest_dir(),
                }],
                config.processed_path(IMAGES_STEM),
            ),
            StageKind::Identification => (
                config
                    .identification_sources()
                    .iter()
                    .map(|s| config.input_path(&s.file))
                    .collect(),
                config.processed_path(IDENTIFICATION_STEM),
            ),
            StageKind::Traits => (
                vec![config.traits_file(), config.terms_file()],
                config.processed_path(TRAITS_STEM),
            ),
            StageKind::Combine => (
                vec![config.processed_path(SPECIES_STEM)],
                config.deck_output_path(),
            ),
            StageKind::Sort => (vec![config.export_path()], config.sorted_export_path()),
        };
        println!("  {}", stage);
        for path in reads {
            println!("    ← {}", path);
        }
        println!("    → {}", writes);
    }
}
