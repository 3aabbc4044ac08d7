use clap::Parser;
use species_deck::app::pipelines::SortPipeline;
use species_deck::config::toml_config::DEFAULT_CONFIG_FILE;
use species_deck::utils::{logger, validation::Validate};
use species_deck::{Deck, DeckConfig, EtlEngine, LocalStorage};

#[derive(Parser)]
#[command(name = "sort-deck")]
#[command(about = "Re-sorts an Anki notes export into deck order")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Deck whose export is sorted; overrides the config
    #[arg(long)]
    deck: Option<Deck>,

    /// Export to sort, relative to the data directory
    #[arg(short, long)]
    input: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let mut config = match DeckConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(e.exit_code().max(1));
        }
    };
    config.apply_overrides(args.deck, None);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let storage = LocalStorage::new(config.data_dir());
    let mut pipeline = SortPipeline::new(storage, config);
    if let Some(input) = args.input {
        pipeline = pipeline.with_input(input);
    }
    tracing::info!("📑 Sorting {} → {}", pipeline.input_path(), pipeline.output_path());

    match EtlEngine::new(pipeline).run().await {
        Ok(report) => {
            println!("✅ Sorted {} notes", report.rows);
            println!("📁 Output saved to: {}", report.output_path);
        }
        Err(e) => {
            tracing::error!("❌ Sort failed: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(e.exit_code().max(1));
        }
    }

    Ok(())
}
