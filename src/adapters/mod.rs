// Adapters layer: concrete implementations for external systems.

pub mod inaturalist;
pub mod storage;

pub use inaturalist::InaturalistClient;
pub use storage::{LocalStorage, MemoryStorage};
