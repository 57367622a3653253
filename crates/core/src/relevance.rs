//! Title-relevance filter
//!
//! Defends against indexers that answer a broken search with their homepage
//! listing: a candidate survives only if enough significant tokens of the
//! resolved title appear in its own title as whole words.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Fixed English stop words dropped during tokenization.
const STOP_WORDS: [&str; 13] = [
    "the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for", "with", "by",
];

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Threshold constants are heuristics; callers may tune them but the
/// defaults are the contract.
#[derive(Debug, Clone, Copy)]
pub struct RelevanceConfig {
    /// Required token share when the title has more than two significant
    /// tokens.
    pub threshold: f64,
    /// Required share for one- and two-token titles.
    pub short_title_threshold: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            short_title_threshold: 1.0,
        }
    }
}

/// Lowercase, strip punctuation, collapse whitespace, split.
fn tokenize(text: &str) -> Vec<String> {
    NON_WORD
        .split(&text.to_lowercase())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens of the query title that actually carry information.
pub fn significant_tokens(title: &str) -> Vec<String> {
    tokenize(title)
        .into_iter()
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    config: RelevanceConfig,
    tokens: Vec<String>,
    imdb_id: Option<String>,
}

impl RelevanceFilter {
    pub fn new(title: &str, imdb_id: Option<&str>) -> Self {
        Self::with_config(title, imdb_id, RelevanceConfig::default())
    }

    pub fn with_config(title: &str, imdb_id: Option<&str>, config: RelevanceConfig) -> Self {
        Self {
            config,
            tokens: significant_tokens(title),
            imdb_id: imdb_id.map(|id| id.to_lowercase()),
        }
    }

    /// A title made entirely of stop words disables the filter.
    pub fn is_disabled(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn matches(&self, candidate_title: &str) -> bool {
        if self.is_disabled() {
            return true;
        }

        let lower = candidate_title.to_lowercase();
        if let Some(imdb_id) = &self.imdb_id {
            if lower.contains(imdb_id.as_str()) {
                return true;
            }
        }

        let candidate_tokens: HashSet<String> = tokenize(&lower).into_iter().collect();
        let k = self.tokens.len();
        let threshold = if k <= 2 {
            self.config.short_title_threshold
        } else {
            self.config.threshold
        };
        let required = ((k as f64) * threshold).ceil() as usize;
        let present = self
            .tokens
            .iter()
            .filter(|t| candidate_tokens.contains(t.as_str()))
            .count();
        present >= required
    }

    /// Retain only candidates whose titles pass.
    pub fn filter_titles<'a, T, F>(&self, candidates: Vec<T>, title_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &'a str,
        T: 'a,
    {
        candidates
            .into_iter()
            .filter(|c| self.matches(title_of(c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn drops_homepage_noise() {
        let filter = RelevanceFilter::new("One Fast Move", None);
        assert!(filter.matches("One Fast Move 2024 1080p WEB"));
        assert!(!filter.matches("One Piece S01E01 720p"));
        assert!(!filter.matches("The Shawshank Redemption"));
    }

    #[test]
    fn imdb_id_in_title_bypasses_token_check() {
        let filter = RelevanceFilter::new("One Fast Move", Some("tt10886166"));
        assert!(filter.matches("tt10886166 repack proper"));
        assert!(!filter.matches("unrelated release"));
    }

    #[test]
    fn short_titles_require_every_token() {
        // K=1 and K=2 use threshold 1.0.
        let filter = RelevanceFilter::new("Dune", None);
        assert!(filter.matches("Dune 2021 2160p"));
        assert!(!filter.matches("Mad Max 2015"));
        let filter = RelevanceFilter::new("Blade Runner", None);
        assert!(filter.matches("Blade Runner 1982 Final Cut"));
        assert!(!filter.matches("Blade 1998 1080p"));
    }

    #[test]
    fn three_tokens_require_sixty_percent() {
        // K=3, ceil(3*0.6)=2 tokens required.
        let filter = RelevanceFilter::new("Mad Max Fury Road", None);
        // "mad", "max", "fury", "road" -> K=4, ceil(2.4)=3
        assert!(filter.matches("Mad Max Fury Road 2015"));
        assert!(filter.matches("Mad Max Fury 1080p"));
        assert!(!filter.matches("Mad 2023"));
    }

    #[test]
    fn stop_word_only_title_disables_filter() {
        let filter = RelevanceFilter::new("The And Of", None);
        assert!(filter.is_disabled());
        assert!(filter.matches("anything at all"));
    }

    #[test]
    fn single_letter_tokens_ignored() {
        // "a" is a stop word, "i" has length 1: both dropped.
        let tokens = significant_tokens("A I Robot");
        assert_eq!(tokens, vec!["robot"]);
    }

    #[test]
    fn whole_word_matching() {
        let filter = RelevanceFilter::new("Heat", None);
        assert!(filter.matches("Heat 1995 REMUX"));
        // "heatwave" must not count as a whole-word hit for "heat".
        assert!(!filter.matches("Heatwave 2022"));
    }

    proptest! {
        // Raising the threshold never lets more candidates through.
        #[test]
        fn monotonic_in_threshold(
            title in "[a-z]{2,8}( [a-z]{2,8}){2,4}",
            candidate in "[a-z]{2,8}( [a-z]{2,8}){0,6}",
            low in 0.0f64..=1.0,
            high in 0.0f64..=1.0,
        ) {
            let (low, high) = if low <= high { (low, high) } else { (high, low) };
            let strict = RelevanceFilter::with_config(&title, None, RelevanceConfig {
                threshold: high,
                short_title_threshold: high,
            });
            let lax = RelevanceFilter::with_config(&title, None, RelevanceConfig {
                threshold: low,
                short_title_threshold: low,
            });
            if strict.matches(&candidate) {
                prop_assert!(lax.matches(&candidate));
            }
        }
    }
}
