//! Domain models for Magnetarr

pub mod definition;
pub mod health;
pub mod search;
pub mod session;
pub mod torrent;

pub use definition::{
    FieldSelector, HttpMethod, IndexerDefinition, ResponseKind, SearchPath, SelectorSet,
    Visibility,
};
pub use health::{priority_score, IndexerHealth, SolverNeed, CIRCUIT_THRESHOLD};
pub use search::{ContentId, SearchQuery, SearchRequest, DEFAULT_DEADLINE_MS, SMART_PROVIDERS};
pub use session::{session_expiry, BypassSession, SessionCookie};
pub use torrent::{
    info_hash_from_magnet, normalize_info_hash, MediaType, Resolution, Torrent, TorrentExtras,
};
