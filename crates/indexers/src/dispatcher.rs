//! Search dispatcher
//!
//! Turns one content query into a bounded-parallel fan-out over the
//! eligible indexers, then aggregates: relevance filter, infoHash dedup,
//! done. Always returns within the request deadline — late drivers are
//! discarded, and the only sanctioned drops are invalid hashes, relevance
//! failures, duplicates and deadline overruns.

use crate::definitions::DefinitionStore;
use crate::drivers::{ApibayDriver, EztvDriver, NyaaDriver, TorrentDriver, YtsDriver};
use crate::generic::GenericDriver;
use chrono::Utc;
use magnetarr_core::{
    normalize_info_hash, HealthStore, RelevanceFilter, SearchQuery, SearchRequest, SolverNeed,
    TitleResolver, Torrent,
};
use magnetarr_fetch::ProtectedFetcher;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Health rows considered before tiering.
    pub candidate_pool: i64,
    /// Success-rate floor for smart-path candidates.
    pub min_success_rate: f64,
    /// Challenge-free indexers queried in the first wave.
    pub fast_tier: usize,
    /// Solver-needing indexers held back for the second wave.
    pub slow_tier: usize,
    /// First-wave result count that makes the slow tier unnecessary.
    pub first_wave_target: usize,
    /// Interactive dispatches may skip the slow tier wholesale.
    pub include_slow_tier: bool,
    /// Cap on any single driver invocation.
    pub driver_timeout: Duration,
    /// Budget for resolving the display title.
    pub title_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            candidate_pool: 30,
            min_success_rate: 20.0,
            fast_tier: 8,
            slow_tier: 5,
            first_wave_target: 10,
            include_slow_tier: true,
            driver_timeout: Duration::from_secs(10),
            title_timeout: Duration::from_secs(5),
        }
    }
}

pub struct SearchDispatcher {
    health: Arc<dyn HealthStore>,
    definitions: Arc<DefinitionStore>,
    fetcher: Arc<ProtectedFetcher>,
    resolver: Option<Arc<dyn TitleResolver>>,
    hand_coded: Vec<Arc<dyn TorrentDriver>>,
    config: DispatcherConfig,
}

impl SearchDispatcher {
    pub fn new(
        health: Arc<dyn HealthStore>,
        definitions: Arc<DefinitionStore>,
        fetcher: Arc<ProtectedFetcher>,
        resolver: Option<Arc<dyn TitleResolver>>,
        hand_coded: Vec<Arc<dyn TorrentDriver>>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            health,
            definitions,
            fetcher,
            resolver,
            hand_coded,
            config,
        }
    }

    /// Standard construction with the built-in hand-coded driver set.
    pub fn with_default_drivers(
        health: Arc<dyn HealthStore>,
        definitions: Arc<DefinitionStore>,
        fetcher: Arc<ProtectedFetcher>,
        resolver: Option<Arc<dyn TitleResolver>>,
        config: DispatcherConfig,
    ) -> Self {
        let hand_coded: Vec<Arc<dyn TorrentDriver>> = vec![
            Arc::new(YtsDriver::new(fetcher.clone())),
            Arc::new(EztvDriver::new(fetcher.clone())),
            Arc::new(NyaaDriver::new(fetcher.clone())),
            Arc::new(ApibayDriver::new(fetcher.clone())),
        ];
        Self::new(health, definitions, fetcher, resolver, hand_coded, config)
    }

    /// Aggregated search. Never fails; "no results" is a valid outcome.
    #[instrument(skip(self, request), fields(media = %request.media_type, smart = request.is_smart()))]
    pub async fn search(&self, request: &SearchRequest) -> Vec<Torrent> {
        let deadline = Instant::now() + request.deadline;

        let (title, ungated) = self.resolve_title(request, deadline).await;
        let query = SearchQuery::from_request(request, title.as_deref());

        let (first_wave, slow_wave) = if request.is_smart() {
            self.smart_tiers(request).await
        } else {
            (self.manual_drivers(request).await, Vec::new())
        };

        let mut results = self.run_wave(first_wave, &query, deadline).await;
        debug!(count = results.len(), "first wave complete");

        if !slow_wave.is_empty()
            && self.config.include_slow_tier
            && results.len() < self.config.first_wave_target
            && Instant::now() < deadline
        {
            results.extend(self.run_wave(slow_wave, &query, deadline).await);
        }

        let gated = if ungated {
            results
        } else {
            let query_title = title.as_deref().unwrap_or_default();
            let filter = RelevanceFilter::new(query_title, query.imdb_id.as_deref());
            let before = results.len();
            let kept: Vec<Torrent> = results
                .into_iter()
                .filter(|t| filter.matches(&t.title))
                .collect();
            debug!(dropped = before - kept.len(), "relevance filter applied");
            kept
        };

        let deduped = dedup_by_info_hash(gated);
        info!(results = deduped.len(), "search complete");
        deduped
    }

    /// Title resolution, bounded by its own timeout and the deadline. A
    /// miss leaves the result set ungated: the relevance filter cannot be
    /// applied with confidence against a raw id.
    async fn resolve_title(
        &self,
        request: &SearchRequest,
        deadline: Instant,
    ) -> (Option<String>, bool) {
        if let Some(title) = &request.title {
            return (Some(title.clone()), false);
        }
        let Some(imdb_id) = request.id.imdb_id() else {
            return (None, true);
        };
        let Some(resolver) = &self.resolver else {
            return (None, true);
        };

        let budget = deadline
            .saturating_duration_since(Instant::now())
            .min(self.config.title_timeout);
        match tokio::time::timeout(budget, resolver.resolve_title(request.media_type, imdb_id))
            .await
        {
            Ok(Ok(title)) => (Some(title), false),
            Ok(Err(e)) => {
                warn!(imdb_id, error = %e, "title resolution failed, proceeding ungated");
                (None, true)
            }
            Err(_) => {
                warn!(imdb_id, "title resolution timed out, proceeding ungated");
                (None, true)
            }
        }
    }

    /// Smart path: health-ranked candidates partitioned into fast and slow
    /// tiers, plus the hand-coded drivers in the first wave.
    async fn smart_tiers(
        &self,
        request: &SearchRequest,
    ) -> (Vec<Arc<dyn TorrentDriver>>, Vec<Arc<dyn TorrentDriver>>) {
        let mut first_wave: Vec<Arc<dyn TorrentDriver>> = self
            .hand_coded
            .iter()
            .filter(|d| d.supports(request.media_type))
            .cloned()
            .collect();
        let mut slow_wave: Vec<Arc<dyn TorrentDriver>> = Vec::new();

        let now = Utc::now();
        let rows = match self
            .health
            .top_candidates(self.config.min_success_rate, self.config.candidate_pool, now)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                // Store outage must not fail the search: the compiled-in
                // drivers still run.
                warn!(error = %e, "health store unavailable, using built-in drivers only");
                return (first_wave, slow_wave);
            }
        };

        let mut fast = 0;
        let mut slow = 0;
        for row in rows {
            if !row.is_available(now) {
                continue;
            }
            // Empty set means inapplicable, never a heuristic fallback.
            if !row.content_types.contains(&request.media_type) {
                continue;
            }
            if self.hand_coded.iter().any(|d| d.id() == row.id) {
                continue;
            }
            let fast_tier = row.requires_solver == SolverNeed::No;
            if fast_tier && fast >= self.config.fast_tier {
                continue;
            }
            if !fast_tier && slow >= self.config.slow_tier {
                continue;
            }
            let Some(driver) = GenericDriver::for_indexer(
                &row.id,
                &self.definitions,
                self.fetcher.clone(),
                !fast_tier,
            )
            .await
            else {
                debug!(indexer = %row.id, "no usable definition, skipping");
                continue;
            };
            let driver: Arc<dyn TorrentDriver> = Arc::new(driver);
            if fast_tier {
                fast += 1;
                first_wave.push(driver);
            } else {
                slow += 1;
                slow_wave.push(driver);
            }
        }

        debug!(fast, slow, "smart tiers selected");
        (first_wave, slow_wave)
    }

    /// Manual path: exactly the listed providers, hand-coded drivers
    /// preferred over the generic one.
    async fn manual_drivers(&self, request: &SearchRequest) -> Vec<Arc<dyn TorrentDriver>> {
        let mut drivers: Vec<Arc<dyn TorrentDriver>> = Vec::new();
        for provider in &request.providers {
            if let Some(driver) = self.hand_coded.iter().find(|d| d.id() == provider) {
                drivers.push(driver.clone());
            } else if let Some(driver) = GenericDriver::for_indexer(
                provider,
                &self.definitions,
                self.fetcher.clone(),
                true,
            )
            .await
            {
                drivers.push(Arc::new(driver));
            } else {
                debug!(provider, "unknown provider requested, skipping");
            }
        }
        drivers
    }

    /// Fan a wave of drivers out in parallel and collect until all are
    /// done or the deadline fires; anything arriving later is discarded.
    async fn run_wave(
        &self,
        drivers: Vec<Arc<dyn TorrentDriver>>,
        query: &SearchQuery,
        deadline: Instant,
    ) -> Vec<Torrent> {
        if drivers.is_empty() {
            return Vec::new();
        }

        let (tx, mut rx) = mpsc::channel::<Vec<Torrent>>(drivers.len());
        for driver in drivers {
            let tx = tx.clone();
            let query = query.clone();
            let budget = self
                .config
                .driver_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            tokio::spawn(async move {
                let results = match tokio::time::timeout(budget, driver.search(&query)).await {
                    Ok(results) => results,
                    Err(_) => {
                        debug!(driver = driver.id(), "driver timed out, dropping its work");
                        Vec::new()
                    }
                };
                let _ = tx.send(results).await;
            });
        }
        drop(tx);

        let mut collected = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(mut batch)) => collected.append(&mut batch),
                Ok(None) => break,
                Err(_) => {
                    debug!("wave deadline reached, discarding stragglers");
                    break;
                }
            }
        }
        collected
    }
}

/// Canonicalize hashes, drop invalid ones, keep the first occurrence per
/// hash.
fn dedup_by_info_hash(results: Vec<Torrent>) -> Vec<Torrent> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(results.len());
    for mut torrent in results {
        let Some(hash) = normalize_info_hash(&torrent.info_hash) else {
            continue;
        };
        if seen.insert(hash.clone()) {
            torrent.info_hash = hash;
            out.push(torrent);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{torrent, MemoryHealthStore, StaticDriver};
    use magnetarr_core::{
        ContentId, FieldSelector, HttpMethod, IndexerDefinition, IndexerHealth, MediaType,
        ResponseKind, SearchPath, SelectorSet, Visibility,
    };
    use magnetarr_fetch::SessionCache;
    use std::collections::{BTreeSet, HashMap};
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Arc<ProtectedFetcher> {
        Arc::new(ProtectedFetcher::new(SessionCache::new(None), None).unwrap())
    }

    fn movie_request() -> SearchRequest {
        SearchRequest::new(
            ContentId::Imdb { id: "tt15398776".to_string() },
            MediaType::Movie,
        )
        .with_title("Oppenheimer")
    }

    fn dispatcher_with(
        health: Arc<MemoryHealthStore>,
        definitions: Arc<DefinitionStore>,
        hand_coded: Vec<Arc<dyn TorrentDriver>>,
        config: DispatcherConfig,
    ) -> SearchDispatcher {
        SearchDispatcher::new(health, definitions, fetcher(), None, hand_coded, config)
    }

    /// JSON definition pointing one indexer at a wiremock path.
    fn json_definition(id: &str, base: &str) -> IndexerDefinition {
        let mut fields = HashMap::new();
        for (name, selector) in [("title", "name"), ("infohash", "hash"), ("seeders", "seeders")] {
            fields.insert(
                name.to_string(),
                FieldSelector {
                    selector: selector.to_string(),
                    attribute: None,
                },
            );
        }
        IndexerDefinition {
            id: id.to_string(),
            display_name: id.to_string(),
            language: None,
            visibility: Visibility::Public,
            links: vec![base.to_string()],
            search_paths: vec![SearchPath {
                path: format!("/{}/search", id),
                method: HttpMethod::Get,
                kind: ResponseKind::Json,
            }],
            content_types: BTreeSet::from([MediaType::Movie]),
            selectors: SelectorSet {
                rows: "results".to_string(),
                fields,
            },
        }
    }

    fn healthy_row(id: &str, requires_solver: SolverNeed, priority: f64) -> IndexerHealth {
        let mut row = IndexerHealth::new(id);
        row.content_types = BTreeSet::from([MediaType::Movie]);
        row.success_rate = 90.0;
        row.priority = priority;
        row.requires_solver = requires_solver;
        row
    }

    fn json_results(prefix: u8, count: usize) -> serde_json::Value {
        let results: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "name": format!("Oppenheimer 2023 1080p v{}{}", prefix, i),
                    "hash": format!("{:02x}{:02x}{}", prefix, i, "0000000000000000000000000000000000ff"),
                    "seeders": 10
                })
            })
            .collect();
        serde_json::json!({ "results": results })
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_honored_and_slow_driver_dropped() {
        let slow = StaticDriver::slow(
            "slowpoke",
            vec![MediaType::Movie],
            Duration::from_secs(30),
            vec![torrent(
                "0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
                "Oppenheimer 2023",
                "slowpoke",
            )],
        );
        let dispatcher = dispatcher_with(
            Arc::new(MemoryHealthStore::new()),
            Arc::new(DefinitionStore::new()),
            vec![slow.clone()],
            DispatcherConfig {
                driver_timeout: Duration::from_secs(60),
                ..DispatcherConfig::default()
            },
        );

        let request = movie_request().with_deadline(Duration::from_secs(2));
        let started = Instant::now();
        let results = dispatcher.search(&request).await;
        let elapsed = started.elapsed();

        assert!(results.is_empty());
        assert!(
            elapsed <= Duration::from_secs(2) + Duration::from_millis(100),
            "dispatcher overran the deadline: {:?}",
            elapsed
        );
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn dedup_canonicalizes_and_drops_invalid_hashes() {
        let driver_a = StaticDriver::new(
            "a",
            vec![MediaType::Movie],
            vec![
                torrent("0a1b2c3d4e5f60718293a4b5c6d7e8f901234567", "Oppenheimer A", "a"),
                torrent("ZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ", "Oppenheimer bad", "a"),
            ],
        );
        let driver_b = StaticDriver::new(
            "b",
            vec![MediaType::Movie],
            vec![
                // Same hash as driver A, different case.
                torrent("0A1B2C3D4E5F60718293A4B5C6D7E8F901234567", "Oppenheimer B", "b"),
                torrent("c2d3e4f5a6b708192a3b4c5d6e7f809123456789", "Oppenheimer C", "b"),
            ],
        );
        let dispatcher = dispatcher_with(
            Arc::new(MemoryHealthStore::new()),
            Arc::new(DefinitionStore::new()),
            vec![driver_a, driver_b],
            DispatcherConfig::default(),
        );

        let request = movie_request().with_providers(vec!["a".to_string(), "b".to_string()]);
        let results = dispatcher.search(&request).await;

        // The shared hash survives exactly once, the invalid one not at
        // all; arrival order between drivers is unspecified.
        let mut hashes: Vec<&str> = results.iter().map(|t| t.info_hash.as_str()).collect();
        hashes.sort();
        assert_eq!(
            hashes,
            vec![
                "0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
                "c2d3e4f5a6b708192a3b4c5d6e7f809123456789"
            ]
        );
    }

    #[tokio::test]
    async fn relevance_filter_drops_homepage_noise() {
        let driver = StaticDriver::new(
            "noisy",
            vec![MediaType::Movie],
            vec![
                torrent("0a1b2c3d4e5f60718293a4b5c6d7e8f901234567", "One Fast Move 2024 1080p WEB", "noisy"),
                torrent("1111111111111111111111111111111111111111", "One Piece S01E01 720p", "noisy"),
                torrent("2222222222222222222222222222222222222222", "The Shawshank Redemption", "noisy"),
            ],
        );
        let dispatcher = dispatcher_with(
            Arc::new(MemoryHealthStore::new()),
            Arc::new(DefinitionStore::new()),
            vec![driver],
            DispatcherConfig::default(),
        );

        let request = SearchRequest::new(
            ContentId::Imdb { id: "tt10886166".to_string() },
            MediaType::Movie,
        )
        .with_title("One Fast Move");
        let results = dispatcher.search(&request).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "One Fast Move 2024 1080p WEB");
    }

    #[tokio::test]
    async fn unresolved_title_leaves_results_ungated() {
        let driver = StaticDriver::new(
            "noisy",
            vec![MediaType::Movie],
            vec![
                torrent("0a1b2c3d4e5f60718293a4b5c6d7e8f901234567", "Entirely unrelated", "noisy"),
            ],
        );
        let dispatcher = dispatcher_with(
            Arc::new(MemoryHealthStore::new()),
            Arc::new(DefinitionStore::new()),
            vec![driver],
            DispatcherConfig::default(),
        );

        // No title and no resolver configured: the filter must not apply.
        let request = SearchRequest::new(
            ContentId::Imdb { id: "tt10886166".to_string() },
            MediaType::Movie,
        );
        let results = dispatcher.search(&request).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn fast_tier_short_circuits_slow_tier() {
        let server = MockServer::start().await;
        let health = Arc::new(MemoryHealthStore::new());
        let definitions = Arc::new(DefinitionStore::new());

        // Eight challenge-free indexers, three results each.
        for i in 0..8u8 {
            let id = format!("fast{}", i);
            Mock::given(method("GET"))
                .and(url_path(format!("/{}/search", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json_results(i, 3)))
                .mount(&server)
                .await;
            definitions.insert(json_definition(&id, &server.uri())).await;
            health
                .upsert(&healthy_row(&id, SolverNeed::No, 90.0 - i as f64))
                .await
                .unwrap();
        }
        // Two solver-needing indexers that must never be contacted.
        for i in 0..2u8 {
            let id = format!("slow{}", i);
            Mock::given(method("GET"))
                .and(url_path(format!("/{}/search", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json_results(100 + i, 3)))
                .expect(0)
                .mount(&server)
                .await;
            definitions.insert(json_definition(&id, &server.uri())).await;
            health
                .upsert(&healthy_row(&id, SolverNeed::Yes, 99.0))
                .await
                .unwrap();
        }

        let dispatcher = dispatcher_with(
            health,
            definitions,
            Vec::new(),
            DispatcherConfig::default(),
        );
        let results = dispatcher.search(&movie_request()).await;

        // 8 indexers x 3 unique hashes, all relevant.
        assert_eq!(results.len(), 24);
        server.verify().await;
    }

    #[tokio::test]
    async fn disabled_indexer_is_skipped() {
        let server = MockServer::start().await;
        let health = Arc::new(MemoryHealthStore::new());
        let definitions = Arc::new(DefinitionStore::new());

        Mock::given(method("GET"))
            .and(url_path("/tripped/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json_results(1, 3)))
            .expect(0)
            .mount(&server)
            .await;
        definitions
            .insert(json_definition("tripped", &server.uri()))
            .await;
        let mut row = healthy_row("tripped", SolverNeed::No, 99.0);
        row.disabled_until = Some(Utc::now() + chrono::Duration::hours(1));
        row.enabled = false;
        health.upsert(&row).await.unwrap();

        let dispatcher = dispatcher_with(
            health,
            definitions,
            Vec::new(),
            DispatcherConfig::default(),
        );
        let results = dispatcher.search(&movie_request()).await;
        assert!(results.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn empty_content_types_never_selected() {
        let server = MockServer::start().await;
        let health = Arc::new(MemoryHealthStore::new());
        let definitions = Arc::new(DefinitionStore::new());

        Mock::given(method("GET"))
            .and(url_path("/adultsite/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json_results(1, 3)))
            .expect(0)
            .mount(&server)
            .await;
        let mut definition = json_definition("adultsite", &server.uri());
        definition.content_types.clear();
        definitions.insert(definition).await;
        let mut row = healthy_row("adultsite", SolverNeed::No, 100.0);
        row.content_types.clear();
        health.upsert(&row).await.unwrap();

        let dispatcher = dispatcher_with(
            health,
            definitions,
            Vec::new(),
            DispatcherConfig::default(),
        );
        let results = dispatcher.search(&movie_request()).await;
        assert!(results.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn store_outage_falls_back_to_hand_coded() {
        let health = Arc::new(MemoryHealthStore::new());
        health.set_unavailable(true);
        let driver = StaticDriver::new(
            "builtin",
            vec![MediaType::Movie],
            vec![torrent(
                "0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
                "Oppenheimer 2023",
                "builtin",
            )],
        );
        let dispatcher = dispatcher_with(
            health,
            Arc::new(DefinitionStore::new()),
            vec![driver],
            DispatcherConfig::default(),
        );

        let results = dispatcher.search(&movie_request()).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn manual_path_uses_exactly_listed_providers() {
        let wanted = StaticDriver::new(
            "wanted",
            vec![MediaType::Movie],
            vec![torrent(
                "0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
                "Oppenheimer 2023",
                "wanted",
            )],
        );
        let unwanted = StaticDriver::new(
            "unwanted",
            vec![MediaType::Movie],
            vec![torrent(
                "1111111111111111111111111111111111111111",
                "Oppenheimer 2160p",
                "unwanted",
            )],
        );
        let dispatcher = dispatcher_with(
            Arc::new(MemoryHealthStore::new()),
            Arc::new(DefinitionStore::new()),
            vec![wanted.clone(), unwanted.clone()],
            DispatcherConfig::default(),
        );

        let request = movie_request().with_providers(vec!["wanted".to_string()]);
        let results = dispatcher.search(&request).await;
        assert_eq!(results.len(), 1);
        assert_eq!(wanted.calls(), 1);
        assert_eq!(unwanted.calls(), 0);
    }
}
