//! Torrent result entry produced by drivers and returned by the dispatcher

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// User-facing content categories an indexer or a result can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
    Anime,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Anime => "anime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "movie" => Some(Self::Movie),
            "series" => Some(Self::Series),
            "anime" => Some(Self::Anime),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video resolution extracted from a release title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Resolution {
    #[serde(rename = "2160p")]
    R2160p,
    #[serde(rename = "1080p")]
    R1080p,
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "480p")]
    R480p,
    #[serde(rename = "unknown")]
    #[default]
    Unknown,
}

impl Resolution {
    /// Best-effort detection from a release title.
    pub fn from_title(title: &str) -> Self {
        let lower = title.to_lowercase();
        if lower.contains("2160p") || lower.contains("4k") || lower.contains("uhd") {
            Self::R2160p
        } else if lower.contains("1080p") {
            Self::R1080p
        } else if lower.contains("720p") {
            Self::R720p
        } else if lower.contains("480p") || lower.contains("dvdrip") {
            Self::R480p
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::R2160p => "2160p",
            Self::R1080p => "1080p",
            Self::R720p => "720p",
            Self::R480p => "480p",
            Self::Unknown => "unknown",
        }
    }
}

static INFO_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-f0-9]{40}$").expect("static regex"));

/// Canonicalize an infoHash to 40-hex lowercase.
///
/// Returns `None` for anything that does not canonicalize to a valid hash;
/// such entries are dropped at dedup ingress.
pub fn normalize_info_hash(raw: &str) -> Option<String> {
    let candidate = raw.trim().to_lowercase();
    if INFO_HASH_RE.is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Extract the infoHash from a magnet URI, canonicalized.
pub fn info_hash_from_magnet(magnet: &str) -> Option<String> {
    let hash = magnet.split("urn:btih:").nth(1)?.split('&').next()?;
    normalize_info_hash(hash)
}

/// Driver-specific metadata that does not fit the core record.
///
/// Closed side-channel: new facts get a typed field here, never an ad-hoc
/// key on [`Torrent`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentExtras {
    /// Spoken/subbed languages advertised by the indexer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Uploader flagged as trusted/verified by the source site.
    #[serde(default)]
    pub trusted: bool,
    /// Remote page for the release, when the indexer exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_url: Option<String>,
}

/// A single announced torrent matched to a content query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Torrent {
    /// 40-hex lowercase infoHash. Canonicalized before the dedup pass.
    pub info_hash: String,
    pub title: String,
    pub size_bytes: i64,
    pub seeders: i32,
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Indexer id this entry came from.
    pub provider: String,
    pub magnet_uri: String,
    pub resolution: Resolution,
    pub media_type: MediaType,
    pub imdb_id: Option<String>,
    pub kitsu_id: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    #[serde(default)]
    pub extras: TorrentExtras,
}

impl Torrent {
    /// Build a magnet URI from a bare infoHash and display name.
    pub fn magnet_for(info_hash: &str, title: &str) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            info_hash,
            urlencoding::encode(title)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let raw = "  0A1B2C3D4E5F60718293A4B5C6D7E8F901234567 ";
        assert_eq!(
            normalize_info_hash(raw).as_deref(),
            Some("0a1b2c3d4e5f60718293a4b5c6d7e8f901234567")
        );
    }

    #[test]
    fn rejects_invalid_hashes() {
        assert_eq!(normalize_info_hash("ZZZZ"), None);
        assert_eq!(normalize_info_hash("abcdef"), None);
        // 39 chars
        assert_eq!(
            normalize_info_hash("0a1b2c3d4e5f60718293a4b5c6d7e8f90123456"),
            None
        );
    }

    #[test]
    fn extracts_hash_from_magnet() {
        let magnet = "magnet:?xt=urn:btih:0A1B2C3D4E5F60718293A4B5C6D7E8F901234567&dn=Some+Movie";
        assert_eq!(
            info_hash_from_magnet(magnet).as_deref(),
            Some("0a1b2c3d4e5f60718293a4b5c6d7e8f901234567")
        );
        assert_eq!(info_hash_from_magnet("https://example.com/file.torrent"), None);
    }

    #[test]
    fn resolution_detection() {
        assert_eq!(
            Resolution::from_title("Movie.2024.2160p.WEB-DL"),
            Resolution::R2160p
        );
        assert_eq!(
            Resolution::from_title("Movie 2024 1080p BluRay"),
            Resolution::R1080p
        );
        assert_eq!(Resolution::from_title("Movie.2024.HDTV"), Resolution::Unknown);
    }
}
