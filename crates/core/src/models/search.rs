//! Search request and content id models

use crate::models::torrent::MediaType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider sentinel selecting the health-ranked smart path.
pub const SMART_PROVIDERS: &str = "smart";

/// Default interactive deadline for a dispatch.
pub const DEFAULT_DEADLINE_MS: u64 = 15_000;

/// Deadline used by background (non-interactive) searches.
pub const BACKGROUND_DEADLINE_MS: u64 = 45_000;

/// A content id as it arrives on the addon surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentId {
    Imdb { id: String },
    Kitsu { id: u32 },
}

impl ContentId {
    /// Parse the id segment of a stream path: `tt0133093`,
    /// `tt0944947:1:2`, `kitsu:44042:3`.
    ///
    /// Returns the id plus positional season/episode when present.
    pub fn parse(raw: &str) -> Option<(Self, Option<u32>, Option<u32>)> {
        let mut parts = raw.split(':');
        let head = parts.next()?;

        if head == "kitsu" {
            let id: u32 = parts.next()?.parse().ok()?;
            let episode = parts.next().and_then(|p| p.parse().ok());
            return Some((ContentId::Kitsu { id }, None, episode));
        }

        if head.starts_with("tt") && head.len() > 2 && head[2..].chars().all(|c| c.is_ascii_digit())
        {
            let season = parts.next().and_then(|p| p.parse().ok());
            let episode = parts.next().and_then(|p| p.parse().ok());
            return Some((ContentId::Imdb { id: head.to_string() }, season, episode));
        }

        None
    }

    pub fn imdb_id(&self) -> Option<&str> {
        match self {
            ContentId::Imdb { id } => Some(id),
            ContentId::Kitsu { .. } => None,
        }
    }

    pub fn kitsu_id(&self) -> Option<u32> {
        match self {
            ContentId::Kitsu { id } => Some(*id),
            ContentId::Imdb { .. } => None,
        }
    }

    /// Raw string form, used as a last-resort query when the title cannot
    /// be resolved.
    pub fn as_query_fallback(&self) -> String {
        match self {
            ContentId::Imdb { id } => id.clone(),
            ContentId::Kitsu { id } => format!("kitsu:{}", id),
        }
    }
}

/// Top-level request handed to the search dispatcher.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub id: ContentId,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Canonical display title when already known; resolved on demand
    /// otherwise.
    pub title: Option<String>,
    /// Indexer ids to query. Empty, or containing [`SMART_PROVIDERS`],
    /// selects the smart path.
    pub providers: Vec<String>,
    pub deadline: Duration,
}

impl SearchRequest {
    pub fn new(id: ContentId, media_type: MediaType) -> Self {
        Self {
            id,
            media_type,
            season: None,
            episode: None,
            title: None,
            providers: Vec::new(),
            deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
        }
    }

    pub fn with_episode(mut self, season: Option<u32>, episode: Option<u32>) -> Self {
        self.season = season;
        self.episode = episode;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn is_smart(&self) -> bool {
        self.providers.is_empty() || self.providers.iter().any(|p| p == SMART_PROVIDERS)
    }
}

/// Normalized per-driver query built by the dispatcher.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub media_type: MediaType,
    pub imdb_id: Option<String>,
    pub kitsu_id: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Resolved display title, when available.
    pub title: Option<String>,
    /// Text query for full-text engines: title plus episode tag, falling
    /// back to the raw id.
    pub keywords: String,
    pub page: u32,
}

impl SearchQuery {
    pub fn from_request(request: &SearchRequest, resolved_title: Option<&str>) -> Self {
        let title = resolved_title.map(str::to_string).or_else(|| request.title.clone());
        let keywords = match &title {
            Some(title) => match (request.season, request.episode) {
                (Some(season), Some(episode)) => {
                    format!("{} S{:02}E{:02}", title, season, episode)
                }
                (Some(season), None) => format!("{} S{:02}", title, season),
                _ => title.clone(),
            },
            None => request.id.as_query_fallback(),
        };

        Self {
            media_type: request.media_type,
            imdb_id: request.id.imdb_id().map(str::to_string),
            kitsu_id: request.id.kitsu_id(),
            season: request.season,
            episode: request.episode,
            title,
            keywords,
            page: 1,
        }
    }

    /// Numeric IMDB id for APIs that reject the `tt` prefix.
    pub fn imdb_numeric(&self) -> Option<u64> {
        self.imdb_id
            .as_deref()
            .and_then(|id| id.strip_prefix("tt"))
            .and_then(|digits| digits.parse().ok())
    }
}
