//! Anti-bot challenge detection
//!
//! Pure classification of an HTTP response into a challenge tag. The
//! decision table is ordered: the first matching rule wins.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, SERVER, VARY};

/// Recognized challenge/block classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    CfJs,
    CfCaptcha,
    CfDenied,
    CfError1020,
    DdosGuard,
    DdosGeneric,
    CfChallengePage,
    Sucuri,
    Akamai,
    RateLimited,
    Forbidden,
    Unavailable,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CfJs => "cf-js",
            Self::CfCaptcha => "cf-captcha",
            Self::CfDenied => "cf-denied",
            Self::CfError1020 => "cf-error-1020",
            Self::DdosGuard => "ddos-guard",
            Self::DdosGeneric => "ddos-generic",
            Self::CfChallengePage => "cf-challenge-page",
            Self::Sucuri => "sucuri",
            Self::Akamai => "akamai",
            Self::RateLimited => "rate-limited",
            Self::Forbidden => "forbidden",
            Self::Unavailable => "unavailable",
        }
    }

    /// Only CF- and DDoS-class blocks are worth a solver attempt; the rest
    /// are permanent failures for the mirror.
    pub fn solver_eligible(&self) -> bool {
        matches!(
            self,
            Self::CfJs
                | Self::CfCaptcha
                | Self::CfDenied
                | Self::CfError1020
                | Self::CfChallengePage
                | Self::DdosGuard
                | Self::DdosGeneric
        )
    }
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));

fn page_title(body: &str) -> String {
    TITLE_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_lowercase())
        .unwrap_or_default()
}

fn header_contains(headers: &HeaderMap, name: reqwest::header::HeaderName, needle: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase().contains(needle))
        .unwrap_or(false)
}

const CF_PAGE_MARKERS: [&str; 5] = [
    "cf-challenge-running",
    "cf-please-wait",
    "challenge-spinner",
    "turnstile-wrapper",
    "cf-error-title",
];

/// Classify a response. `None` means not blocked.
pub fn detect(status: u16, headers: &HeaderMap, body: &str) -> Option<ChallengeKind> {
    let title = page_title(body);
    let body_lower = body.to_lowercase();
    let blocked_status = status == 403 || status == 503;

    if blocked_status && title.contains("just a moment") {
        return Some(ChallengeKind::CfJs);
    }
    if blocked_status && title.contains("attention required") && title.contains("cloudflare") {
        return Some(ChallengeKind::CfCaptcha);
    }
    if blocked_status
        && title.contains("access denied")
        && header_contains(headers, SERVER, "cloudflare")
    {
        return Some(ChallengeKind::CfDenied);
    }
    if body_lower.contains("error code: 1020") {
        return Some(ChallengeKind::CfError1020);
    }
    if blocked_status
        && (title.contains("ddos-guard") || header_contains(headers, SERVER, "ddos-guard"))
    {
        return Some(ChallengeKind::DdosGuard);
    }
    if blocked_status
        && headers
            .get(VARY)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("Accept-Encoding,User-Agent"))
            .unwrap_or(false)
        && body_lower.contains("ddos")
    {
        return Some(ChallengeKind::DdosGeneric);
    }
    if CF_PAGE_MARKERS.iter().any(|m| body_lower.contains(m)) {
        return Some(ChallengeKind::CfChallengePage);
    }
    if body_lower.contains("sucuri") && (status == 403 || body_lower.contains("access denied")) {
        return Some(ChallengeKind::Sucuri);
    }
    if body_lower.contains("akamai") && status == 403 {
        return Some(ChallengeKind::Akamai);
    }
    if status == 429 {
        return Some(ChallengeKind::RateLimited);
    }
    if status == 403 {
        return Some(ChallengeKind::Forbidden);
    }
    if status == 503 {
        return Some(ChallengeKind::Unavailable);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, SERVER, VARY};

    fn headers(pairs: &[(reqwest::header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn detects_cloudflare_js_challenge() {
        let body = "<html><title>Just a moment...</title><body></body></html>";
        assert_eq!(detect(503, &HeaderMap::new(), body), Some(ChallengeKind::CfJs));
        assert_eq!(detect(403, &HeaderMap::new(), body), Some(ChallengeKind::CfJs));
        // Status outside 403/503 does not match the JS rule.
        assert_eq!(detect(200, &HeaderMap::new(), body), None);
    }

    #[test]
    fn detects_cf_captcha() {
        let body = "<title>Attention Required! | Cloudflare</title>";
        assert_eq!(
            detect(403, &HeaderMap::new(), body),
            Some(ChallengeKind::CfCaptcha)
        );
    }

    #[test]
    fn detects_cf_denied_needs_server_header() {
        let body = "<title>Access denied</title>";
        let hdrs = headers(&[(SERVER, "cloudflare")]);
        assert_eq!(detect(403, &hdrs, body), Some(ChallengeKind::CfDenied));
        // Without the server header it falls through to the 403 fallback.
        assert_eq!(
            detect(403, &HeaderMap::new(), body),
            Some(ChallengeKind::Forbidden)
        );
    }

    #[test]
    fn detects_error_1020_any_status() {
        let body = "Error code: 1020 - access denied by firewall rules";
        assert_eq!(
            detect(200, &HeaderMap::new(), body),
            Some(ChallengeKind::CfError1020)
        );
    }

    #[test]
    fn detects_ddos_guard() {
        let body = "<title>DDoS-Guard</title>";
        assert_eq!(
            detect(403, &HeaderMap::new(), body),
            Some(ChallengeKind::DdosGuard)
        );
        let hdrs = headers(&[(SERVER, "ddos-guard")]);
        assert_eq!(detect(503, &hdrs, "<html/>"), Some(ChallengeKind::DdosGuard));
    }

    #[test]
    fn detects_generic_ddos_via_vary_header() {
        let hdrs = headers(&[(VARY, "Accept-Encoding,User-Agent")]);
        let body = "checking your browser against ddos attacks";
        assert_eq!(detect(503, &hdrs, body), Some(ChallengeKind::DdosGeneric));
    }

    #[test]
    fn detects_challenge_page_markers() {
        for marker in CF_PAGE_MARKERS {
            let body = format!("<div class=\"{}\"></div>", marker);
            assert_eq!(
                detect(200, &HeaderMap::new(), &body),
                Some(ChallengeKind::CfChallengePage),
                "marker {}",
                marker
            );
        }
    }

    #[test]
    fn detects_sucuri_and_akamai() {
        assert_eq!(
            detect(403, &HeaderMap::new(), "Sucuri WebSite Firewall"),
            Some(ChallengeKind::Sucuri)
        );
        assert_eq!(
            detect(200, &HeaderMap::new(), "sucuri: access denied"),
            Some(ChallengeKind::Sucuri)
        );
        assert_eq!(
            detect(403, &HeaderMap::new(), "Reference akamai edge"),
            Some(ChallengeKind::Akamai)
        );
        assert_eq!(detect(200, &HeaderMap::new(), "akamai cdn mention"), None);
    }

    #[test]
    fn status_fallbacks() {
        assert_eq!(
            detect(429, &HeaderMap::new(), ""),
            Some(ChallengeKind::RateLimited)
        );
        assert_eq!(
            detect(403, &HeaderMap::new(), ""),
            Some(ChallengeKind::Forbidden)
        );
        assert_eq!(
            detect(503, &HeaderMap::new(), ""),
            Some(ChallengeKind::Unavailable)
        );
        assert_eq!(detect(200, &HeaderMap::new(), "regular page"), None);
        assert_eq!(detect(404, &HeaderMap::new(), "not found"), None);
    }

    #[test]
    fn solver_eligibility() {
        assert!(ChallengeKind::CfJs.solver_eligible());
        assert!(ChallengeKind::DdosGuard.solver_eligible());
        assert!(ChallengeKind::CfChallengePage.solver_eligible());
        assert!(!ChallengeKind::RateLimited.solver_eligible());
        assert!(!ChallengeKind::Forbidden.solver_eligible());
        assert!(!ChallengeKind::Sucuri.solver_eligible());
    }

    #[test]
    fn detection_is_pure() {
        let body = "<title>Just a moment...</title>";
        let first = detect(503, &HeaderMap::new(), body);
        let second = detect(503, &HeaderMap::new(), body);
        assert_eq!(first, second);
    }
}
