//! Indexer definition store, parser and upstream sync

pub mod catalog;
pub mod parser;
pub mod store;
pub mod sync;

pub use parser::parse_definition;
pub use store::DefinitionStore;
pub use sync::{load_cached_definitions, DefinitionSync, SyncConfig, SyncSummary};
