use crate::config::toml_config::{DeckConfig, DEFAULT_CONFIG_FILE};
use crate::core::sequence::StageKind;
use crate::domain::taxa::Deck;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_file_extension, validate_path, Validate};
use clap::Parser;


#[derive(Debug, Clone, Parser)]
#[command(name = "species-deck")]
#[command(about = "Builds an Anki species deck from EOL, GBIF and iNaturalist data")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Deck to build (animals, plants, fungi); overrides the config
    #[arg(long)]
    pub deck: Option<Deck>,

    /// Data directory holding input/, processed/ and output/
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Run only these stages
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<StageKind>,

    /// Skip these stages
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<StageKind>,

    /// Show what would run without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Log CPU and memory usage per stage
    #[arg(long)]
    pub monitor: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl CliConfig {
    /// Loads the TOML file and applies command-line overrides. A missing
    /// default config file falls back to built-in defaults.
    pub fn load_deck_config(&self) -> Result<DeckConfig> {
        let mut config = DeckConfig::load(&self.config)?;
        config.apply_overrides(self.deck, self.data_dir.clone());
        if self.monitor {
            config.monitoring = Some(crate::config::toml_config::MonitoringConfig { enabled: true });
        }
        Ok(config)
    }

    /// Stages to run: `--only` (or the configured list) minus `--skip`, in
    /// pipeline order.
    pub fn select_stages(&self, configured: &[StageKind]) -> Vec<StageKind> {
        let mut stages: Vec<StageKind> = if self.only.is_empty() {
            configured.to_vec()
        } else {
            self.only.clone()
        };
        stages.sort();
        stages.dedup();
        stages.retain(|stage| !self.skip.contains(stage));
        stages
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_file_extension("config", &self.config, &["toml"])?;
        if let Some(data_dir) = &self.data_dir {
            validate_path("data_dir", data_dir)?;
        }
        if let Some(stage) = self.only.iter().find(|s| self.skip.contains(s)) {
            return Err(EtlError::InvalidConfigValueError {
                field: "only/skip".to_string(),
                value: stage.to_string(),
                reason: "Stage is both selected and skipped".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = CliConfig::parse_from([
            "species-deck",
            "--deck",
            "plants",
            "--only",
            "combine,species",
            "--verbose",
        ]);
        assert_eq!(cli.deck, Some(Deck::Plants));
        assert_eq!(cli.config, "deck.toml");
        assert!(cli.verbose);
        assert_eq!(
            cli.select_stages(&StageKind::DEFAULT_ORDER),
            vec![StageKind::Species, StageKind::Combine]
        );
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_skip_removes_stages() {
        let cli = CliConfig::parse_from(["species-deck", "--skip", "images,identification"]);
        let stages = cli.select_stages(&StageKind::DEFAULT_ORDER);
        assert_eq!(stages.len(), StageKind::DEFAULT_ORDER.len() - 2);
        assert!(!stages.contains(&StageKind::Images));
        assert_eq!(stages.last(), Some(&StageKind::Combine));
    }

    #[test]
    fn test_conflicting_selection_is_invalid() {
        let cli = CliConfig::parse_from(["species-deck", "--only", "traits", "--skip", "traits"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!(CliConfig::try_parse_from(["species-deck", "--only", "photos"]).is_err());
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let cli = CliConfig::parse_from(["species-deck", "--config", "/nonexistent/deck.toml"]);
        assert!(matches!(
            cli.load_deck_config(),
            Err(EtlError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_default_config_falls_back_with_overrides() {
        let cli = CliConfig::parse_from([
            "species-deck",
            "--config",
            DEFAULT_CONFIG_FILE,
            "--deck",
            "fungi",
            "--data-dir",
            "/tmp/fungi",
            "--monitor",
        ]);
        // Tests run from the crate root, which ships no deck.toml.
        let config = cli.load_deck_config().unwrap();
        assert_eq!(config.deck.kind, Deck::Fungi);
        assert_eq!(config.data_dir(), "/tmp/fungi");
        assert!(config.monitoring_enabled());
    }
}
