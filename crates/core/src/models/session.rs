//! Solved challenge sessions, keyed by host

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on how long a solved session is trusted.
pub const SESSION_DEFAULT_TTL_MINUTES: i64 = 30;

/// Safety margin subtracted from the clearance cookie expiry.
pub const SESSION_EXPIRY_MARGIN_SECONDS: i64 = 60;

/// One cookie captured from a solved browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

/// Cached cookies + user agent for one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassSession {
    pub host: String,
    pub cookies: Vec<SessionCookie>,
    pub user_agent: String,
    pub expires_at: DateTime<Utc>,
}

impl BypassSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Empty cookie sets carry no clearance and are treated as no session.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.cookies.is_empty() && !self.is_expired(now)
    }

    /// Cookie header value for attaching the session to a request.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Compute the cache expiry for a freshly solved session.
///
/// TTL is min(`cf_clearance` expiry minus a 60 s margin, the 30 min default
/// cap). A clearance cookie already within the margin means the session is
/// not worth caching and `None` is returned.
pub fn session_expiry(
    cookies: &[SessionCookie],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let default_cap = now + Duration::minutes(SESSION_DEFAULT_TTL_MINUTES);
    let clearance = cookies
        .iter()
        .find(|c| c.name == "cf_clearance")
        .and_then(|c| c.expires);

    match clearance {
        Some(expires) => {
            let usable_until = expires - Duration::seconds(SESSION_EXPIRY_MARGIN_SECONDS);
            if usable_until <= now {
                None
            } else {
                Some(usable_until.min(default_cap))
            }
        }
        None => Some(default_cap),
    }
}
