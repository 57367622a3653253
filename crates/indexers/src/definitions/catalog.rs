//! Compiled-in indexer catalog
//!
//! Seeds the definition sync with the set of known indexer ids, and
//! carries the curated fallback mirror lists used when a definition has
//! not been synced yet (or arrives with an empty link list).

/// Indexer ids the sync task always refreshes.
pub const KNOWN_INDEXERS: [&str; 12] = [
    "badasstorrents",
    "bitsearch",
    "extratorrent",
    "gktorrent",
    "kickasstorrents-ws",
    "knaben",
    "limetorrents",
    "nyaasi",
    "therarbg",
    "torrentdownload",
    "torrentscsv",
    "uindex",
];

/// Curated fallback mirrors, consulted only when the definition store has
/// no links for an id. Whether these should ever be merged with synced
/// links is an open question upstream; the default is strict replacement,
/// with [`crate::definitions::DefinitionStore::merge_fallback_domains`]
/// as the knob.
pub const FALLBACK_DOMAINS: [(&str, &[&str]); 6] = [
    ("bitsearch", &["https://bitsearch.to"]),
    ("knaben", &["https://knaben.org", "https://knaben.eu"]),
    (
        "limetorrents",
        &[
            "https://www.limetorrents.lol",
            "https://limetorrents.zone",
        ],
    ),
    ("nyaasi", &["https://nyaa.si"]),
    ("therarbg", &["https://therarbg.to", "https://therarbg.com"]),
    ("torrentscsv", &["https://torrents-csv.com"]),
];

pub fn fallback_domains(id: &str) -> &'static [&'static str] {
    FALLBACK_DOMAINS
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .map(|(_, domains)| *domains)
        .unwrap_or(&[])
}
