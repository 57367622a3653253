//! Per-indexer search drivers
//!
//! Every driver, hand-coded or template-driven, exposes the same
//! never-failing signature: on any failure it logs and returns an empty
//! list. The dispatcher owns deadlines and fan-out; a driver only has to
//! stay inside its own request timeouts.

pub mod apibay;
pub mod eztv;
pub mod nyaa;
pub mod yts;

use async_trait::async_trait;
use magnetarr_core::{MediaType, SearchQuery, Torrent};

/// Per-request timeout used by the hand-coded drivers.
pub(crate) const DRIVER_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(8);

#[async_trait]
pub trait TorrentDriver: Send + Sync {
    /// Stable indexer id, also used as result provenance.
    fn id(&self) -> &str;

    fn supports(&self, media: MediaType) -> bool;

    /// Search never errors: failures are swallowed and logged, yielding an
    /// empty list.
    async fn search(&self, query: &SearchQuery) -> Vec<Torrent>;
}

pub use apibay::ApibayDriver;
pub use eztv::EztvDriver;
pub use nyaa::NyaaDriver;
pub use yts::YtsDriver;
