//! Core data types for CDC lookups, parsed records, and errors.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cookies::CookieJar;
use crate::enrich::DEFAULT_LOOKUP_TIMEOUT;
use crate::session::DEFAULT_SESSION_TTL;

/// One row of an HTML table, keyed by header label (or `col_<i>`).
pub type Record = BTreeMap<String, String>;

/// Field added to service records by vessel enrichment.
pub const SHIP_TYPE_FIELD: &str = "_shipType";

/// Form field name used when the search page does not say otherwise.
pub const DEFAULT_CSRF_NAME: &str = "_csrf-search";

/// Everything extracted from a CDC details or results page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdcInfo {
    pub search_results: Vec<Record>,
    pub details: BTreeMap<String, String>,
    pub details_available: bool,
    pub service_records: Vec<Record>,
    pub table_headers: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CdcInfo {
    /// True when nothing at all was extracted from the page.
    pub fn is_empty(&self) -> bool {
        self.search_results.is_empty()
            && self.details.is_empty()
            && self.service_records.is_empty()
            && self.photo_url.is_none()
    }
}

/// Cookie and CSRF state carried between the captcha and submit legs.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowState {
    pub cookies: CookieJar,
    pub csrf_token: String,
    pub csrf_name: String,
}

/// What the user typed into the search form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    pub cdc_number: String,
    pub dob: String,
    pub captcha: String,
}

/// Result of the captcha leg: the image to show plus the state to submit with.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    /// `data:<mime>;base64,<payload>`
    pub captcha_image: String,
    pub state: FlowState,
}

/// Endpoints and timeouts for one deployment.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Records site root, e.g. `https://erp.gso.gov.bd`.
    pub base_url: String,
    /// Vessel directory root, e.g. `https://www.vesselfinder.com`.
    pub vessel_directory_url: String,
    pub http_timeout: Duration,
    pub session_ttl: Duration,
    pub lookup_timeout: Duration,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://erp.gso.gov.bd".to_string(),
            vessel_directory_url: "https://www.vesselfinder.com".to_string(),
            http_timeout: Duration::from_secs(20),
            session_ttl: DEFAULT_SESSION_TTL,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

impl SiteConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_vessel_directory_url(mut self, url: impl Into<String>) -> Self {
        self.vessel_directory_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// The page holding the search form and captcha.
    pub fn search_page(&self) -> String {
        format!("{}/cdc-search/", self.base_url)
    }

    /// The form's POST target.
    pub fn search_action(&self) -> String {
        format!("{}/frontend/web/cdc-search", self.base_url)
    }
}

/// Errors that can occur while running a verification.
#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Failed to fetch page: HTTP {status}. The page may require an active session.")]
    PageUnavailable { url: String, status: u16 },

    #[error("Site markup changed: {0}")]
    MarkupChanged(String),

    #[error("Session expired. Please fetch a new CAPTCHA.")]
    SessionExpired,

    #[error("{0}")]
    CaptchaRejected(String),

    #[error("No CDC records found for the given information.")]
    NotFound,

    #[error("{0}")]
    Unparseable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl VerifyError {
    /// Stable machine-readable tag reported to callers as `errorType`.
    pub fn error_type(&self) -> &'static str {
        match self {
            VerifyError::Transport(_)
            | VerifyError::UpstreamStatus { .. }
            | VerifyError::PageUnavailable { .. } => "transport_error",
            VerifyError::MarkupChanged(_) => "markup_changed",
            VerifyError::SessionExpired => "session_expired",
            VerifyError::CaptchaRejected(_) => "captcha_invalid",
            VerifyError::NotFound => "not_found",
            VerifyError::Unparseable(_) => "parse_error",
            VerifyError::InvalidInput(_) => "invalid_request",
        }
    }

    /// Whether restarting the flow (or re-entering input) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerifyError::SessionExpired
                | VerifyError::CaptchaRejected(_)
                | VerifyError::Transport(_)
                | VerifyError::UpstreamStatus { .. }
                | VerifyError::PageUnavailable { .. }
        )
    }
}

/// Convenience result type.
pub type VerifyResult<T> = Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdc_info_serializes_camel_case() {
        let mut info = CdcInfo::default();
        info.details.insert("Name".into(), "RAHIM".into());
        info.details_available = true;
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["detailsAvailable"], true);
        assert!(v.get("serviceRecords").is_some());
        assert!(v.get("photoUrl").is_none());
    }

    #[test]
    fn test_error_types() {
        assert_eq!(VerifyError::NotFound.error_type(), "not_found");
        assert_eq!(
            VerifyError::CaptchaRejected("bad".into()).error_type(),
            "captcha_invalid"
        );
        assert!(VerifyError::SessionExpired.is_retryable());
        assert!(!VerifyError::MarkupChanged("csrf".into()).is_retryable());
    }

    #[test]
    fn test_site_urls() {
        let site = SiteConfig::default().with_base_url("http://127.0.0.1:9000/");
        assert_eq!(site.search_page(), "http://127.0.0.1:9000/cdc-search/");
        assert_eq!(
            site.search_action(),
            "http://127.0.0.1:9000/frontend/web/cdc-search"
        );
    }
}
