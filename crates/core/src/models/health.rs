//! Per-indexer health row and circuit breaker rules
//!
//! The probe loop applies check outcomes through [`IndexerHealth::record_success`]
//! and [`IndexerHealth::record_failure`]; both take the clock as a parameter
//! so the breaker transitions are unit-testable.

use crate::models::torrent::MediaType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Consecutive failures that trip the circuit breaker.
pub const CIRCUIT_THRESHOLD: i32 = 5;

/// How long a tripped indexer stays disabled.
pub const CIRCUIT_COOLDOWN_HOURS: i64 = 2;

/// Whether an indexer has been observed to need the challenge solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverNeed {
    #[default]
    Unknown,
    No,
    Yes,
}

impl SolverNeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::No => "no",
            Self::Yes => "yes",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "no" => Self::No,
            "yes" => Self::Yes,
            _ => Self::Unknown,
        }
    }
}

/// Mutable health row, one per indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerHealth {
    pub id: String,

    // Capability metadata persisted from the definition sync so the
    // dispatcher reads a single table.
    pub display_name: String,
    pub language: Option<String>,
    pub is_public: bool,
    pub content_types: BTreeSet<MediaType>,

    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_succeeded_at: Option<DateTime<Utc>>,

    pub total_checks: i64,
    pub total_successes: i64,
    pub total_failures: i64,
    /// successes / checks * 100, stored for query convenience.
    pub success_rate: f64,
    /// Rolling average over successful checks only.
    pub avg_response_ms: f64,

    pub consecutive_failures: i32,
    pub enabled: bool,
    pub disabled_until: Option<DateTime<Utc>>,

    pub working_domain: Option<String>,
    pub last_error: Option<String>,
    pub requires_solver: SolverNeed,

    /// Dispatch ordering score in [0, 100].
    pub priority: f64,
}

impl IndexerHealth {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            language: None,
            is_public: true,
            content_types: BTreeSet::new(),
            last_checked_at: None,
            last_succeeded_at: None,
            total_checks: 0,
            total_successes: 0,
            total_failures: 0,
            success_rate: 0.0,
            avg_response_ms: 0.0,
            consecutive_failures: 0,
            enabled: true,
            disabled_until: None,
            working_domain: None,
            last_error: None,
            requires_solver: SolverNeed::Unknown,
            priority: 0.0,
        }
    }

    /// Whether the dispatcher may select this indexer right now.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self.disabled_until {
            Some(until) => until <= now,
            None => true,
        }
    }

    /// Record a successful check.
    ///
    /// Clears the breaker, resets the failure streak, updates the rolling
    /// response average and the working domain.
    pub fn record_success(
        &mut self,
        response_ms: u64,
        domain: &str,
        via_solver: bool,
        now: DateTime<Utc>,
    ) {
        self.total_checks += 1;
        self.total_successes += 1;
        self.last_checked_at = Some(now);
        self.last_succeeded_at = Some(now);
        self.consecutive_failures = 0;
        self.enabled = true;
        self.disabled_until = None;
        self.working_domain = Some(domain.to_string());
        self.last_error = None;
        self.requires_solver = if via_solver {
            SolverNeed::Yes
        } else {
            SolverNeed::No
        };

        // Rolling mean over successes only.
        let n = self.total_successes as f64;
        self.avg_response_ms += (response_ms as f64 - self.avg_response_ms) / n;

        self.recompute_derived(true, response_ms);
    }

    /// Record a failed check, tripping the breaker on a sustained streak.
    pub fn record_failure(&mut self, error: &str, now: DateTime<Utc>) {
        self.total_checks += 1;
        self.total_failures += 1;
        self.last_checked_at = Some(now);
        self.consecutive_failures += 1;
        self.last_error = Some(truncate_error(error));

        if self.consecutive_failures >= CIRCUIT_THRESHOLD {
            self.enabled = false;
            self.disabled_until = Some(now + Duration::hours(CIRCUIT_COOLDOWN_HOURS));
        }

        self.recompute_derived(false, 0);
    }

    fn recompute_derived(&mut self, success: bool, response_ms: u64) {
        self.success_rate = if self.total_checks > 0 {
            self.total_successes as f64 / self.total_checks as f64 * 100.0
        } else {
            0.0
        };
        self.priority = priority_score(
            self.success_rate,
            success,
            response_ms,
            self.requires_solver,
        );
    }
}

/// Dispatch priority in [0, 100].
pub fn priority_score(
    success_rate: f64,
    success: bool,
    response_ms: u64,
    requires_solver: SolverNeed,
) -> f64 {
    let speed = if success {
        (100.0 - response_ms as f64 / 100.0).max(0.0)
    } else {
        0.0
    };
    let base = 0.4 * success_rate + 0.4 * speed + if success { 20.0 } else { 0.0 };
    let solver_bonus = if requires_solver == SolverNeed::No {
        20.0
    } else {
        0.0
    };
    (base + solver_bonus).min(100.0)
}

fn truncate_error(error: &str) -> String {
    const MAX: usize = 200;
    if error.len() <= MAX {
        error.to_string()
    } else {
        let mut end = MAX;
        while !error.is_char_boundary(end) {
            end -= 1;
        }
        error[..end].to_string()
    }
}
