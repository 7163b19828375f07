//! Async HTTP client wrapping reqwest.
//!
//! Not a browser, just HTTP requests that look like one. Cookies are not
//! stored by the client; callers thread a [`CookieJar`] through explicitly.
//! A TLS-class failure on an `https://` URL is retried once over `http://`,
//! since the records site has a history of broken certificate chains.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;

use crate::cookies::CookieJar;
use crate::types::VerifyResult;

/// Desktop Chrome user-agent sent with every request.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Substrings (lowercased) that mark an error as certificate/TLS related
/// when its type does not.
const TLS_MARKERS: &[&str] = &[
    "certificate",
    "unknownissuer",
    "tls",
    "ssl",
    "handshake",
    "corrupt message",
    "peer is incompatible",
];

/// A request that can be replayed verbatim against a downgraded URL.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            form: None,
        }
    }

    /// POST with an `application/x-www-form-urlencoded` body.
    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            form: Some(fields),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a `Cookie` header unless the jar is empty.
    pub fn cookies(self, jar: &CookieJar) -> Self {
        if jar.is_empty() {
            self
        } else {
            self.header("Cookie", jar.header_value())
        }
    }
}

/// Response with the full header map and raw body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// URL actually requested (after any scheme downgrade).
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Cookies set by this response.
    pub fn cookies(&self) -> CookieJar {
        CookieJar::from_set_cookie(&self.headers)
    }
}

/// HTTP client for the records site and the vessel directory.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with a browser user-agent and `Accept` header.
    pub fn new(timeout: Duration) -> VerifyResult<Self> {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(defaults)
            .build()?;

        Ok(Self { client })
    }

    /// Send the request; on a TLS-class failure retry once over plain HTTP.
    ///
    /// Any other error is returned unchanged. HTTP error statuses are not
    /// errors here; callers check [`HttpResponse::is_success`].
    pub async fn fetch_resilient(&self, request: &FetchRequest) -> VerifyResult<HttpResponse> {
        match self.send(request, &request.url).await {
            Ok(resp) => Ok(resp),
            Err(e) if is_tls_failure(&e) => match downgrade_scheme(&request.url) {
                Some(plain) => {
                    tracing::warn!("TLS failure for {}, retrying over HTTP: {e}", request.url);
                    Ok(self.send(request, &plain).await?)
                }
                None => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn send(&self, request: &FetchRequest, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = self.client.request(request.method.clone(), url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(fields) = &request.form {
            builder = builder.form(fields);
        }

        tracing::debug!("{} {}", request.method, url);
        let r = builder.send().await?;
        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let headers = r.headers().clone();
        let body = r.bytes().await?.to_vec();

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            headers,
            body,
        })
    }
}

/// Whether a failed send was a certificate/TLS failure.
pub fn is_tls_failure(err: &reqwest::Error) -> bool {
    is_tls_chain(err, err.is_connect())
}

/// Walk the source chain of `err` looking for a TLS-class failure.
///
/// While connecting, an `InvalidData` I/O error can only come from the TLS
/// stream (rustls reports handshake and record errors that way). Otherwise
/// fall back to the message markers.
pub fn is_tls_chain(err: &(dyn StdError + 'static), connecting: bool) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if connecting {
            if let Some(io_err) = e.downcast_ref::<io::Error>() {
                if io_err.kind() == io::ErrorKind::InvalidData {
                    return true;
                }
            }
        }
        let msg = e.to_string().to_lowercase();
        if TLS_MARKERS.iter().any(|m| msg.contains(m)) {
            return true;
        }
        current = e.source();
    }
    false
}

/// `https://host/path` → `http://host/path`; `None` for anything else.
pub fn downgrade_scheme(url: &str) -> Option<String> {
    url.strip_prefix("https://").map(|rest| format!("http://{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Layer {
        msg: &'static str,
        source: Option<Box<dyn StdError + Send + Sync>>,
    }

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.msg)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source
                .as_deref()
                .map(|s| s as &(dyn StdError + 'static))
        }
    }

    fn layer(msg: &'static str, source: Option<Box<dyn StdError + Send + Sync>>) -> Layer {
        Layer { msg, source }
    }

    #[test]
    fn test_tls_failure_found_deep_in_chain() {
        let err = layer(
            "error sending request",
            Some(Box::new(layer(
                "client error (Connect)",
                Some(Box::new(layer("invalid peer certificate: UnknownIssuer", None))),
            ))),
        );
        assert!(is_tls_chain(&err, true));
        assert!(is_tls_chain(&err, false));
    }

    #[test]
    fn test_invalid_data_while_connecting_is_tls() {
        let io_err = io::Error::new(
            io::ErrorKind::InvalidData,
            "received corrupt message of type InvalidContentType",
        );
        let err = layer("client error (Connect)", Some(Box::new(io_err)));
        assert!(is_tls_chain(&err, true));

        let io_err = io::Error::new(io::ErrorKind::InvalidData, "bad gzip header");
        let err = layer("error decoding response body", Some(Box::new(io_err)));
        assert!(!is_tls_chain(&err, false));
    }

    #[test]
    fn test_other_failures_are_not_tls() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err = layer("error sending request", Some(Box::new(refused)));
        assert!(!is_tls_chain(&err, true));
    }

    #[test]
    fn test_downgrade_scheme() {
        assert_eq!(
            downgrade_scheme("https://erp.gso.gov.bd/cdc-search/").as_deref(),
            Some("http://erp.gso.gov.bd/cdc-search/")
        );
        assert_eq!(downgrade_scheme("http://erp.gso.gov.bd/"), None);
    }

    #[test]
    fn test_request_builders() {
        let req = FetchRequest::get("https://x.test/")
            .cookies(&CookieJar::parse("a=1"))
            .header("Referer", "https://x.test/cdc-search/");
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.headers[0], ("Cookie".to_string(), "a=1".to_string()));

        let empty = FetchRequest::get("https://x.test/").cookies(&CookieJar::new());
        assert!(empty.headers.is_empty());
    }

    #[test]
    fn test_http_client_creation() {
        let client = HttpClient::new(Duration::from_secs(5));
        assert!(client.is_ok());
    }
}
