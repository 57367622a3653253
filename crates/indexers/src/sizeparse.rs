//! Human-readable size strings to bytes
//!
//! Indexer listings write sizes as "1.4 GB", "700.5 MiB" or plain byte
//! counts. Both unit families use binary multipliers here.

use once_cell::sync::Lazy;
use regex::Regex;

static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([\d.,]+)\s*(B|KB|MB|GB|TB|KiB|MiB|GiB|TiB)?\s*$").expect("static regex")
});

/// Parse a size string into bytes. Returns `None` on anything unparseable.
pub fn parse_size(raw: &str) -> Option<i64> {
    let captures = SIZE_RE.captures(raw)?;
    let number: f64 = captures
        .get(1)?
        .as_str()
        .replace(',', "")
        .parse()
        .ok()?;
    let multiplier: f64 = match captures
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("b") => 1.0,
        Some("kb") | Some("kib") => 1024.0,
        Some("mb") | Some("mib") => 1024.0 * 1024.0,
        Some("gb") | Some("gib") => 1024.0 * 1024.0 * 1024.0,
        Some("tb") | Some("tib") => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        Some(_) => return None,
    };
    let bytes = number * multiplier;
    if bytes.is_finite() && bytes >= 0.0 {
        Some(bytes as i64)
    } else {
        None
    }
}
