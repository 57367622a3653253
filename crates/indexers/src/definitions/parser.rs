//! Upstream definition document parsing
//!
//! Definition documents are YAML recipes: identity, mirror links, search
//! paths, and extraction selectors. Parsing is pure and deterministic —
//! the same document always yields the same capability summary.

use magnetarr_core::{
    FieldSelector, HttpMethod, IndexerDefinition, MagnetarrError, MediaType, ResponseKind, Result,
    SearchPath, SelectorSet, Visibility,
};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    caps: Option<RawCaps>,
    #[serde(default)]
    search: Option<RawSearch>,
}

#[derive(Debug, Deserialize)]
struct RawCaps {
    #[serde(default)]
    categorymappings: Vec<RawCategoryMapping>,
}

#[derive(Debug, Deserialize)]
struct RawCategoryMapping {
    #[serde(default)]
    cat: Option<String>,
    #[serde(default)]
    desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    #[serde(default)]
    paths: Vec<RawPath>,
    #[serde(default)]
    rows: Option<RawRows>,
    #[serde(default)]
    fields: HashMap<String, RawField>,
}

#[derive(Debug, Deserialize)]
struct RawPath {
    path: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    response: Option<RawResponse>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRows {
    #[serde(default)]
    selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    attribute: Option<String>,
}

/// Parse one raw definition document.
pub fn parse_definition(id_hint: &str, document: &str) -> Result<IndexerDefinition> {
    let raw: RawDefinition =
        serde_yaml::from_str(document).map_err(|e| MagnetarrError::ParseError {
            context: format!("definition {}", id_hint),
            message: e.to_string(),
        })?;

    let id = raw.id.clone().unwrap_or_else(|| id_hint.to_string());
    let visibility = match raw.kind.as_deref() {
        Some("public") => Visibility::Public,
        // semi-private and private both need accounts; neither is probed.
        _ => Visibility::Private,
    };

    let search = raw.search.as_ref();
    let search_paths = search
        .map(|s| {
            s.paths
                .iter()
                .map(|p| SearchPath {
                    path: p.path.clone(),
                    method: match p.method.as_deref() {
                        Some(m) if m.eq_ignore_ascii_case("post") => HttpMethod::Post,
                        _ => HttpMethod::Get,
                    },
                    kind: match p.response.as_ref().and_then(|r| r.kind.as_deref()) {
                        Some("json") => ResponseKind::Json,
                        Some("xml") => ResponseKind::Rss,
                        _ => ResponseKind::Html,
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    let selectors = search
        .map(|s| SelectorSet {
            rows: s
                .rows
                .as_ref()
                .and_then(|r| r.selector.clone())
                .unwrap_or_default(),
            fields: s
                .fields
                .iter()
                .filter_map(|(name, field)| {
                    field.selector.clone().map(|selector| {
                        (
                            name.clone(),
                            FieldSelector {
                                selector,
                                attribute: field.attribute.clone(),
                            },
                        )
                    })
                })
                .collect(),
        })
        .unwrap_or_default();

    Ok(IndexerDefinition {
        id,
        display_name: raw.name,
        language: raw.language,
        visibility,
        links: raw
            .links
            .into_iter()
            .map(|l| l.trim_end_matches('/').to_string())
            .collect(),
        content_types: content_types_of(&raw.caps),
        search_paths,
        selectors,
    })
}

/// Deterministic mapping from category names to user-facing content types.
///
/// Categories outside the movie/series/anime families (games, books,
/// adult, software) contribute nothing; a definition made only of those
/// gets an empty set and is never selected.
fn content_types_of(caps: &Option<RawCaps>) -> BTreeSet<MediaType> {
    let mut types = BTreeSet::new();
    let Some(caps) = caps else {
        return types;
    };
    for mapping in &caps.categorymappings {
        let label = mapping
            .cat
            .as_deref()
            .or(mapping.desc.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        if label.contains("anime") {
            types.insert(MediaType::Anime);
        } else if label.starts_with("movies") || label == "movies" {
            types.insert(MediaType::Movie);
        } else if label.starts_with("tv") {
            types.insert(MediaType::Series);
        }
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
id: badasstorrents
name: BadassTorrents
language: en-US
type: public
links:
  - https://badasstorrents.example/
  - https://bt-mirror.example
caps:
  categorymappings:
    - { id: 600, cat: Movies, desc: "Movies" }
    - { id: 400, cat: TV/HD, desc: "TV HD" }
    - { id: 700, cat: Books, desc: "Books" }
search:
  paths:
    - path: "/torrents/search/{{ .Keywords }}/date/desc"
      response:
        type: html
  rows:
    selector: "table > tbody > tr"
  fields:
    title:
      selector: "td:nth-child(2) a"
    magnet:
      selector: "td:nth-child(3) a"
      attribute: href
    size:
      selector: "td:nth-child(5)"
    seeders:
      selector: "td:nth-child(6)"
"#;

    #[test]
    fn parses_full_definition() {
        let def = parse_definition("badasstorrents", SAMPLE).unwrap();
        assert_eq!(def.id, "badasstorrents");
        assert_eq!(def.display_name, "BadassTorrents");
        assert_eq!(def.visibility, Visibility::Public);
        // Trailing slashes are normalized away.
        assert_eq!(
            def.links,
            vec![
                "https://badasstorrents.example".to_string(),
                "https://bt-mirror.example".to_string()
            ]
        );
        assert_eq!(def.search_paths.len(), 1);
        assert_eq!(def.search_paths[0].kind, ResponseKind::Html);
        assert_eq!(def.search_paths[0].method, HttpMethod::Get);
        assert_eq!(
            def.content_types,
            BTreeSet::from([MediaType::Movie, MediaType::Series])
        );
        assert_eq!(def.selectors.rows, "table > tbody > tr");
        assert_eq!(
            def.selectors.fields.get("magnet").unwrap().attribute.as_deref(),
            Some("href")
        );
        assert!(def.is_usable());
    }

    #[test]
    fn games_only_definition_gets_empty_content_types() {
        let doc = r#"
name: GameSite
type: public
links: [https://games.example]
caps:
  categorymappings:
    - { id: 1, cat: PC/Games }
    - { id: 2, cat: Console }
search:
  paths:
    - path: "/search?q={{ .Keywords }}"
"#;
        let def = parse_definition("gamesite", doc).unwrap();
        assert!(def.content_types.is_empty());
    }

    #[test]
    fn anime_category_maps_to_anime() {
        let doc = r#"
name: AnimeSite
type: public
links: [https://anime.example]
caps:
  categorymappings:
    - { id: 1, cat: TV/Anime }
search:
  paths:
    - path: "/?q={{ .Keywords }}"
      response: { type: xml }
"#;
        let def = parse_definition("animesite", doc).unwrap();
        assert_eq!(def.content_types, BTreeSet::from([MediaType::Anime]));
        assert_eq!(def.search_paths[0].kind, ResponseKind::Rss);
    }

    #[test]
    fn non_public_definitions_marked_private() {
        for kind in ["private", "semi-private"] {
            let doc = format!(
                "name: X\ntype: {}\nlinks: [https://x.example]\nsearch:\n  paths:\n    - path: /q\n",
                kind
            );
            let def = parse_definition("x", &doc).unwrap();
            assert_eq!(def.visibility, Visibility::Private);
        }
    }

    #[test]
    fn parse_is_deterministic() {
        let first = parse_definition("badasstorrents", SAMPLE).unwrap();
        let second = parse_definition("badasstorrents", SAMPLE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn capability_summary_round_trips() {
        let def = parse_definition("badasstorrents", SAMPLE).unwrap();
        let json = serde_json::to_string(&def).unwrap();
        let back: IndexerDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = parse_definition("broken", ": : :").unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
