//! Health probe loop
//!
//! One invocation probes a bounded batch of the least-recently-checked
//! indexers, sequentially, committing each row as soon as its check
//! finishes so partial progress survives the wall-clock budget. A 1 s
//! pause between checks keeps the loop polite towards shared anti-bot
//! infrastructure.

use crate::definitions::DefinitionStore;
use crate::template::{PathTemplate, TemplateVars};
use chrono::Utc;
use magnetarr_core::{HealthStore, IndexerHealth, Result};
use magnetarr_fetch::{FetchOptions, ProtectedFetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Mirrors tried per probe.
const MAX_DOMAINS: usize = 5;

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Indexers probed per invocation.
    pub batch_size: i64,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Wall-clock budget for the whole invocation.
    pub budget: Duration,
    /// Politeness pause between consecutive checks.
    pub pause: Duration,
    /// Canonical probe inputs.
    pub test_query: String,
    pub test_imdb_id: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            request_timeout: Duration::from_secs(10),
            budget: Duration::from_secs(280),
            pause: Duration::from_secs(1),
            test_query: "avengers".to_string(),
            test_imdb_id: "tt0848228".to_string(),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ProbeSummary {
    pub checked: usize,
    pub succeeded: usize,
    pub failed: usize,
}

enum ProbeOutcome {
    Success {
        response_ms: u64,
        domain: String,
        via_solver: bool,
    },
    Failure {
        error: String,
    },
}

pub struct HealthProbe {
    health: Arc<dyn HealthStore>,
    definitions: Arc<DefinitionStore>,
    fetcher: Arc<ProtectedFetcher>,
    config: ProbeConfig,
}

impl HealthProbe {
    pub fn new(
        health: Arc<dyn HealthStore>,
        definitions: Arc<DefinitionStore>,
        fetcher: Arc<ProtectedFetcher>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            health,
            definitions,
            fetcher,
            config,
        }
    }

    /// One probe pass. Returns early when the budget runs out; whatever
    /// was checked by then is already committed.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> ProbeSummary {
        let started = Instant::now();
        let batch = match self.health.stalest(self.config.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "health store unavailable, skipping probe pass");
                return ProbeSummary::default();
            }
        };

        let mut summary = ProbeSummary::default();
        for (index, row) in batch.into_iter().enumerate() {
            if started.elapsed() >= self.config.budget {
                info!(
                    checked = summary.checked,
                    "probe budget exhausted, committing partial pass"
                );
                break;
            }
            if index > 0 {
                tokio::time::sleep(self.config.pause).await;
            }

            let outcome = self.probe_indexer(&row.id).await;
            summary.checked += 1;
            let mut row = row;
            match outcome {
                ProbeOutcome::Success {
                    response_ms,
                    domain,
                    via_solver,
                } => {
                    debug!(indexer = %row.id, response_ms, via_solver, "probe succeeded");
                    row.record_success(response_ms, &domain, via_solver, Utc::now());
                    summary.succeeded += 1;
                }
                ProbeOutcome::Failure { error } => {
                    debug!(indexer = %row.id, error = %error, "probe failed");
                    row.record_failure(&error, Utc::now());
                    summary.failed += 1;
                }
            }
            // Commit per row, not at the end of the pass.
            if let Err(e) = self.commit(&row).await {
                warn!(indexer = %row.id, error = %e, "health row commit failed");
            }
        }

        info!(
            checked = summary.checked,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "probe pass complete"
        );
        summary
    }

    async fn commit(&self, row: &IndexerHealth) -> Result<()> {
        self.health.upsert(row).await
    }

    async fn probe_indexer(&self, id: &str) -> ProbeOutcome {
        let Some(definition) = self.definitions.get(id).await else {
            return ProbeOutcome::Failure {
                error: "definition not synced".to_string(),
            };
        };
        let Some(path) = definition.search_paths.first() else {
            return ProbeOutcome::Failure {
                error: "no search paths".to_string(),
            };
        };
        let template = match PathTemplate::parse(&path.path) {
            Ok(template) => template,
            Err(e) => {
                return ProbeOutcome::Failure {
                    error: format!("unusable search path: {}", e),
                }
            }
        };
        let rendered = template.render(&TemplateVars {
            keywords: self.config.test_query.clone(),
            imdb_id: Some(self.config.test_imdb_id.clone()),
            page: 1,
        });

        let domains = self.definitions.domains(id).await;
        if domains.is_empty() {
            return ProbeOutcome::Failure {
                error: "no mirrors".to_string(),
            };
        }

        // At most one solver attempt per indexer, not one per mirror.
        let mut allow_solver = self.fetcher.has_solver();
        let mut last_error = "unreachable".to_string();
        for domain in domains.iter().take(MAX_DOMAINS) {
            let url = format!(
                "{}/{}",
                domain.trim_end_matches('/'),
                rendered.trim_start_matches('/')
            );
            let opts = FetchOptions {
                timeout: self.config.request_timeout,
                use_solver: allow_solver,
            };
            let attempt_started = Instant::now();
            match self.fetcher.fetch(&url, &opts).await {
                Ok(outcome) => {
                    if outcome.solver_attempted {
                        allow_solver = false;
                    }
                    if outcome.is_ok() {
                        return ProbeOutcome::Success {
                            response_ms: attempt_started.elapsed().as_millis() as u64,
                            domain: domain.clone(),
                            via_solver: outcome.via_solver,
                        };
                    }
                    last_error = match outcome.challenge {
                        Some(kind) => format!("blocked: {}", kind),
                        None => format!("http {}", outcome.status),
                    };
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        ProbeOutcome::Failure { error: last_error }
    }
}
