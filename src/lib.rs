pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::DeckConfig;

pub use adapters::storage::{LocalStorage, MemoryStorage};
pub use core::{etl::EtlEngine, sequence::StageKind, sequence::StageSequence};
pub use domain::taxa::Deck;
pub use utils::error::{EtlError, Result};
