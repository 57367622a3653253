//! Addon-protocol response models

use magnetarr_core::Torrent;
use serde::Serialize;

pub const ADDON_ID: &str = "community.magnetarr";
pub const ADDON_NAME: &str = "Magnetarr";

/// Static addon descriptor served at /manifest.json.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: &'static str,
    pub version: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub resources: Vec<&'static str>,
    pub types: Vec<&'static str>,
    pub id_prefixes: Vec<&'static str>,
    pub catalogs: Vec<serde_json::Value>,
}

impl Manifest {
    pub fn current() -> Self {
        Self {
            id: ADDON_ID,
            version: env!("CARGO_PKG_VERSION"),
            name: ADDON_NAME,
            description: "Torrent search across public indexers",
            resources: vec!["stream"],
            types: vec!["movie", "series", "anime"],
            id_prefixes: vec!["tt", "kitsu"],
            catalogs: vec![],
        }
    }
}

/// One playable stream entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    /// Addon label with the resolution, shown as the source column.
    pub name: String,
    /// Release title plus a seeders/size info line.
    pub title: String,
    pub info_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior_hints: Option<serde_json::Value>,
}

/// Envelope for the stream endpoint.
#[derive(Debug, Serialize)]
pub struct StreamsResponse {
    pub streams: Vec<Stream>,
}

impl From<&Torrent> for Stream {
    fn from(torrent: &Torrent) -> Self {
        Self {
            name: format!("{} {}", ADDON_NAME, torrent.resolution.as_str()),
            title: format!(
                "{}\n👤 {} 💾 {} ⚙️ {}",
                torrent.title,
                torrent.seeders,
                human_size(torrent.size_bytes),
                torrent.provider
            ),
            info_hash: torrent.info_hash.clone(),
            behavior_hints: None,
        }
    }
}

pub fn human_size(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", size, UNITS[unit_index])
}
