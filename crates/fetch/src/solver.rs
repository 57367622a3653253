//! Challenge-solver client
//!
//! Thin client over a single external headless-browser solver instance.
//! The instance handles one challenge at a time, so every request goes
//! through an owning task that drains a bounded FIFO queue; at most one
//! solve is in flight across the whole process.

use chrono::{TimeZone, Utc};
use magnetarr_core::{MagnetarrError, Result, SessionCookie};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Extra slack on top of the solver's own maxTimeout.
const OUTER_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

const QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Base URL of the solver instance, without the `/v1` suffix.
    pub base_url: String,
    /// Per-solve budget handed to the solver (milliseconds).
    pub max_timeout: Duration,
}

impl SolverConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_timeout: Duration::from_secs(55),
        }
    }
}

/// Result of one solve attempt.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub cookies: Vec<SessionCookie>,
    pub user_agent: Option<String>,
    pub html: Option<String>,
    pub final_url: Option<String>,
    pub status: Option<u16>,
}

#[derive(Debug, Serialize)]
struct SolverCommand<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(rename = "maxTimeout", skip_serializing_if = "Option::is_none")]
    max_timeout: Option<u64>,
    #[serde(rename = "returnOnlyCookies", skip_serializing_if = "Option::is_none")]
    return_only_cookies: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
struct SolverSolution {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    cookies: Vec<RawCookie>,
    #[serde(rename = "userAgent", default)]
    user_agent: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    /// Epoch seconds; negative means a session cookie.
    #[serde(default)]
    expires: Option<f64>,
}

impl RawCookie {
    fn into_session_cookie(self) -> SessionCookie {
        let expires = self
            .expires
            .filter(|&e| e > 0.0)
            .and_then(|e| Utc.timestamp_opt(e as i64, 0).single());
        SessionCookie {
            name: self.name,
            value: self.value,
            domain: self.domain,
            path: self.path,
            expires,
        }
    }
}

struct SolveJob {
    url: String,
    reply: oneshot::Sender<Result<SolveOutcome>>,
}

/// Handle to the serial solver queue. Cheap to clone.
#[derive(Clone)]
pub struct SolverClient {
    tx: mpsc::Sender<SolveJob>,
}

impl SolverClient {
    /// Spawn the owning worker task and return the queue handle.
    pub fn spawn(config: SolverConfig) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(worker(config, rx));
        Self { tx }
    }

    /// Solve a challenge for `url`. Requests are processed strictly FIFO;
    /// a failed solve is never retried here — the caller decides.
    pub async fn solve(&self, url: &str) -> Result<SolveOutcome> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SolveJob {
                url: url.to_string(),
                reply,
            })
            .await
            .map_err(|_| MagnetarrError::SolverError {
                message: "solver queue closed".to_string(),
            })?;
        response.await.map_err(|_| MagnetarrError::SolverError {
            message: "solver worker dropped request".to_string(),
        })?
    }
}

async fn worker(config: SolverConfig, mut rx: mpsc::Receiver<SolveJob>) {
    let client = match reqwest::Client::builder().build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "failed to build solver HTTP client; queue disabled");
            return;
        }
    };
    // Endpoint flavor (root vs /v1) is probed once and cached for the
    // process lifetime.
    let mut endpoint: Option<String> = None;

    while let Some(job) = rx.recv().await {
        if endpoint.is_none() {
            endpoint = discover_endpoint(&client, &config.base_url).await;
        }
        let result = match &endpoint {
            Some(endpoint) => solve_one(&client, endpoint, &config, &job.url).await,
            None => Err(MagnetarrError::SolverError {
                message: "solver endpoint unreachable".to_string(),
            }),
        };
        // Receiver may have given up on the deadline; that is fine.
        let _ = job.reply.send(result);
    }
}

/// Probe candidate base paths with a cheap `sessions.list` command.
async fn discover_endpoint(client: &reqwest::Client, base_url: &str) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    for candidate in [base.to_string(), format!("{}/v1", base)] {
        let probe = SolverCommand {
            cmd: "sessions.list",
            url: None,
            max_timeout: None,
            return_only_cookies: None,
        };
        let response = client
            .post(&candidate)
            .json(&probe)
            .timeout(Duration::from_secs(10))
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => {
                info!(endpoint = %candidate, "solver endpoint discovered");
                return Some(candidate);
            }
            Ok(resp) => debug!(endpoint = %candidate, status = %resp.status(), "solver probe rejected"),
            Err(e) => debug!(endpoint = %candidate, error = %e, "solver probe failed"),
        }
    }
    warn!(base_url, "no solver endpoint answered the probe");
    None
}

async fn solve_one(
    client: &reqwest::Client,
    endpoint: &str,
    config: &SolverConfig,
    url: &str,
) -> Result<SolveOutcome> {
    let command = SolverCommand {
        cmd: "request.get",
        url: Some(url),
        max_timeout: Some(config.max_timeout.as_millis() as u64),
        return_only_cookies: Some(false),
    };

    let outer = config.max_timeout + OUTER_TIMEOUT_SLACK;
    let response = tokio::time::timeout(outer, client.post(endpoint).json(&command).send())
        .await
        .map_err(|_| MagnetarrError::Timeout {
            operation: format!("solver request.get {}", url),
        })?
        .map_err(|e| MagnetarrError::SolverError {
            message: format!("solver transport failure: {}", e),
        })?;

    let parsed: SolverResponse = response
        .json()
        .await
        .map_err(|e| MagnetarrError::SerializationError(e.to_string()))?;

    if parsed.status != "ok" {
        return Err(MagnetarrError::SolverError {
            message: parsed
                .message
                .unwrap_or_else(|| "solver reported failure".to_string()),
        });
    }

    let solution = parsed.solution.ok_or_else(|| MagnetarrError::SolverError {
        message: "solver returned ok without a solution".to_string(),
    })?;

    debug!(url, status = ?solution.status, cookies = solution.cookies.len(), "challenge solved");

    Ok(SolveOutcome {
        cookies: solution
            .cookies
            .into_iter()
            .map(RawCookie::into_session_cookie)
            .collect(),
        user_agent: solution.user_agent,
        html: solution.response,
        final_url: solution.url,
        status: solution.status,
    })
}
