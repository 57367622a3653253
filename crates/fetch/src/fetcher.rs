//! Protected fetcher
//!
//! The single HTTP path every indexer request goes through: attaches any
//! cached bypass session for the host, classifies the response with the
//! challenge detector, and on an eligible block hands off to the solver —
//! once per call site, gated by a per-host lock so concurrent callers for
//! the same host share one solve.

use crate::challenge::{detect, ChallengeKind};
use crate::session::SessionCache;
use crate::solver::SolverClient;
use chrono::Utc;
use magnetarr_core::{session_expiry, BypassSession, MagnetarrError, Result};
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, COOKIE, USER_AGENT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

/// Rotating desktop user agents for unsessioned requests.
const DESKTOP_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:125.0) Gecko/20100101 Firefox/125.0",
];

const MAX_REDIRECTS: usize = 5;

pub fn random_desktop_user_agent() -> &'static str {
    DESKTOP_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Whether an eligible block may be handed to the solver.
    pub use_solver: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            use_solver: false,
        }
    }
}

impl FetchOptions {
    pub fn with_solver() -> Self {
        Self {
            use_solver: true,
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A completed fetch. Any HTTP status lands here; only transport failures
/// surface as errors.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub challenge: Option<ChallengeKind>,
    /// Whether the body came via a solver-established session.
    pub via_solver: bool,
    /// Whether this call spent a solver invocation. Callers enforcing a
    /// one-solve-per-indexer budget key off this.
    pub solver_attempted: bool,
}

impl FetchOutcome {
    pub fn is_blocked(&self) -> bool {
        self.challenge.is_some()
    }

    pub fn is_ok(&self) -> bool {
        self.challenge.is_none() && (200..400).contains(&self.status)
    }
}

pub struct ProtectedFetcher {
    client: reqwest::Client,
    sessions: SessionCache,
    solver: Option<SolverClient>,
    /// One async lock per host gating solver invocation.
    solve_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProtectedFetcher {
    pub fn new(sessions: SessionCache, solver: Option<SolverClient>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| MagnetarrError::ConfigurationError {
                field: "http_client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            sessions,
            solver,
            solve_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn has_solver(&self) -> bool {
        self.solver.is_some()
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Fetch a URL through the session cache and challenge pipeline.
    #[instrument(skip(self, opts), fields(use_solver = opts.use_solver))]
    pub async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchOutcome> {
        let host = host_of(url)?;
        let now = Utc::now();
        let session = self.sessions.get(&host, now).await;

        let outcome = self.fetch_raw(url, opts, session.as_ref()).await?;

        let eligible = outcome
            .challenge
            .map(|c| c.solver_eligible())
            .unwrap_or(false);
        if !(eligible && opts.use_solver && self.solver.is_some()) {
            return Ok(outcome);
        }

        self.solve_and_retry(url, &host, opts, outcome).await
    }

    /// One solver attempt per call site, serialized per host. A caller
    /// arriving while another is solving the same host waits and reuses
    /// the fresh session instead of queueing a duplicate solve.
    async fn solve_and_retry(
        &self,
        url: &str,
        host: &str,
        opts: &FetchOptions,
        blocked: FetchOutcome,
    ) -> Result<FetchOutcome> {
        let lock = self.host_lock(host).await;
        let _guard = lock.lock().await;

        // Someone may have solved this host while we waited for the lock.
        let now = Utc::now();
        if let Some(session) = self.sessions.get(host, now).await {
            let retried = self.fetch_raw(url, opts, Some(&session)).await?;
            if !retried.is_blocked() {
                return Ok(FetchOutcome {
                    via_solver: true,
                    ..retried
                });
            }
            // Session did not clear the block; fall through to a fresh solve.
            self.sessions.evict(host).await;
        }

        let Some(solver) = self.solver.as_ref() else {
            return Ok(blocked);
        };
        let solved = match solver.solve(url).await {
            Ok(solved) => solved,
            Err(e) => {
                warn!(host, error = %e, "solver attempt failed");
                return Ok(FetchOutcome {
                    solver_attempted: true,
                    ..blocked
                });
            }
        };

        let now = Utc::now();
        let Some(expires_at) = session_expiry(&solved.cookies, now) else {
            debug!(host, "solved session expires too soon, not caching");
            return Ok(FetchOutcome {
                solver_attempted: true,
                ..blocked
            });
        };
        let session = BypassSession {
            host: host.to_string(),
            cookies: solved.cookies,
            user_agent: solved
                .user_agent
                .unwrap_or_else(|| random_desktop_user_agent().to_string()),
            expires_at,
        };
        self.sessions.put(session.clone()).await;

        let retried = self.fetch_raw(url, opts, Some(&session)).await?;
        Ok(FetchOutcome {
            via_solver: true,
            solver_attempted: true,
            ..retried
        })
    }

    async fn host_lock(&self, host: &str) -> Arc<Mutex<()>> {
        let mut locks = self.solve_locks.lock().await;
        locks
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Raw request: attach session if given, read the body whatever the
    /// status, classify. Network failures are the only error path.
    async fn fetch_raw(
        &self,
        url: &str,
        opts: &FetchOptions,
        session: Option<&BypassSession>,
    ) -> Result<FetchOutcome> {
        let mut headers = HeaderMap::new();
        let user_agent: &str = match session {
            Some(s) => s.user_agent.as_str(),
            None => random_desktop_user_agent(),
        };
        if let Ok(value) = user_agent.parse() {
            headers.insert(USER_AGENT, value);
        }
        if let Some(session) = session {
            if let Ok(value) = session.cookie_header().parse() {
                headers.insert(COOKIE, value);
            }
        }

        let response = self
            .client
            .get(url)
            .headers(headers)
            .timeout(opts.timeout)
            .send()
            .await
            .map_err(|e| MagnetarrError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
                retryable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let response_headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| MagnetarrError::NetworkError {
                url: url.to_string(),
                error: format!("body read failed: {}", e),
                retryable: e.is_timeout(),
            })?;

        let challenge = detect(status, &response_headers, &body);
        if let Some(kind) = challenge {
            debug!(url, status, challenge = %kind, "blocked response");
        }

        Ok(FetchOutcome {
            url: url.to_string(),
            final_url,
            status,
            body,
            challenge,
            via_solver: false,
            solver_attempted: false,
        })
    }
}

fn host_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| MagnetarrError::ValidationError {
        field: "url".to_string(),
        message: format!("{}: {}", url, e),
    })?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| MagnetarrError::ValidationError {
            field: "url".to_string(),
            message: format!("no host in {}", url),
        })
}
