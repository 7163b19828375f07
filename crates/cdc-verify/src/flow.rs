//! The CDC search flow: captcha, form submission, result interpretation, and
//! the details follow-up.
//!
//! ```text
//! Idle ──begin──▶ AwaitingCaptcha ──submit──▶ Submitting ─┬─▶ Resolved
//!                                                         ├─▶ CaptchaRejected
//!                                                         ├─▶ NotFound
//!                                                         └─▶ DetailsUnavailable
//! ```
//!
//! All flow state lives in [`FlowState`]. The session-id adapters park it
//! in the [`SessionStore`] between the two legs; the raw adapters hand it to
//! the caller instead.

use std::sync::{Arc, OnceLock};

use base64::Engine;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::Serialize;

use crate::cookies::CookieJar;
use crate::enrich::{enrich, VesselDirectory, VesselFinderDirectory};
use crate::html::{collapse_whitespace, element_text, resolve_url, selector};
use crate::parser::{parse_details_page, parse_results_table};
use crate::session::SessionStore;
use crate::transport::{FetchRequest, HttpClient, HttpResponse};
use crate::types::{
    CaptchaChallenge, CdcInfo, FlowState, Record, SearchInput, SiteConfig, VerifyError,
    VerifyResult,
};

const CAPTCHA_FALLBACK_MESSAGE: &str = "CAPTCHA verification failed. Please try again.";
const INCORRECT_CAPTCHA_PHRASE: &str = "the verification code is incorrect";
const NOT_FOUND_PHRASES: &[&str] = &["no results found", "no record"];

const NO_DETAILS_LINK_NOTE: &str = "Could not find Details link. Returning search results only.";
const RESULTS_PAGE_NOTE: &str = "This appears to be a search results page, not a details page. \
     Please navigate to the details page and paste that URL instead.";

/// Hosts and paths a pasted details URL may point at.
const ALLOWED_URL_MARKERS: &[&str] = &["gso.gov.bd", "erp.gso", "cdc-search"];

fn csrf_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"name="(_csrf-search|_csrf)"[^>]*value="([^"]*)""#)
            .expect("csrf regex is valid")
    })
}

fn captcha_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"id="cdcsearchform-captcha-image"[^>]*src="([^"]*)""#)
            .expect("captcha image regex is valid")
    })
}

fn details_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:details?|view)\b").expect("details regex is valid"))
}

/// Returned by [`VerificationFlow::init_session`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTicket {
    pub session_id: String,
    pub captcha_image: String,
}

/// Drives one records site plus the vessel directory used for enrichment.
pub struct VerificationFlow {
    http: HttpClient,
    sessions: Arc<SessionStore>,
    site: SiteConfig,
    directory: Arc<dyn VesselDirectory>,
}

impl VerificationFlow {
    /// Build a flow with its own HTTP client, session store, and a
    /// VesselFinder directory, all configured from `site`.
    pub fn new(site: SiteConfig) -> VerifyResult<Self> {
        let http = HttpClient::new(site.http_timeout)?;
        let sessions = Arc::new(SessionStore::new(site.session_ttl));
        let directory = Arc::new(VesselFinderDirectory::new(
            http.clone(),
            site.vessel_directory_url.clone(),
        ));
        Ok(Self::with_parts(http, sessions, site, directory))
    }

    pub fn with_parts(
        http: HttpClient,
        sessions: Arc<SessionStore>,
        site: SiteConfig,
        directory: Arc<dyn VesselDirectory>,
    ) -> Self {
        Self {
            http,
            sessions,
            site,
            directory,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    // ── Begin ───────────────────────────────────────────────────────────────

    /// Load the search page and its captcha image.
    pub async fn begin(&self) -> VerifyResult<CaptchaChallenge> {
        let search_page = self.site.search_page();
        let page = self.get_ok(FetchRequest::get(&search_page)).await?;
        let html = page.text();
        let cookies = page.cookies();

        let csrf = csrf_re()
            .captures(&html)
            .ok_or_else(|| VerifyError::MarkupChanged("CSRF token not found on search page".into()))?;
        let csrf_name = csrf[1].to_string();
        let csrf_token = html_escape::decode_html_entities(&csrf[2]).into_owned();

        let image_src = captcha_image_re()
            .captures(&html)
            .map(|c| html_escape::decode_html_entities(&c[1]).into_owned())
            .ok_or_else(|| {
                VerifyError::MarkupChanged("CAPTCHA image not found on search page".into())
            })?;
        let image_url = resolve_url(&self.site.base_url, &image_src);

        let image = self
            .get_ok(
                FetchRequest::get(&image_url)
                    .cookies(&cookies)
                    .header("Referer", &page.final_url),
            )
            .await?;
        let cookies = cookies.merge(&image.cookies());

        let mime = image
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "image/png".to_string());
        let payload = base64::engine::general_purpose::STANDARD.encode(&image.body);

        tracing::info!("Captcha loaded ({} bytes, {} cookies)", image.body.len(), cookies.len());
        Ok(CaptchaChallenge {
            captcha_image: format!("data:{mime};base64,{payload}"),
            state: FlowState {
                cookies,
                csrf_token,
                csrf_name,
            },
        })
    }

    /// Begin and park the flow state in the session store.
    pub async fn init_session(&self) -> VerifyResult<SessionTicket> {
        let challenge = self.begin().await?;
        let session_id = self.sessions.create(challenge.state).await;
        Ok(SessionTicket {
            session_id,
            captcha_image: challenge.captcha_image,
        })
    }

    /// Begin and hand the flow state back to the caller.
    pub async fn fetch_captcha(&self) -> VerifyResult<CaptchaChallenge> {
        self.begin().await
    }

    // ── Submit ──────────────────────────────────────────────────────────────

    /// Submit using state parked by [`VerificationFlow::init_session`].
    ///
    /// The session is consumed whether or not the submission succeeds.
    pub async fn submit_search(
        &self,
        session_id: &str,
        input: &SearchInput,
    ) -> VerifyResult<CdcInfo> {
        validate_input(input)?;
        let session = self.sessions.consume(session_id).await?;
        self.submit(session.into_flow_state(), input).await
    }

    /// Submit using caller-held cookies and CSRF token.
    pub async fn submit_verification(
        &self,
        state: FlowState,
        input: &SearchInput,
    ) -> VerifyResult<CdcInfo> {
        if state.csrf_token.trim().is_empty() {
            return Err(VerifyError::InvalidInput("csrfToken is required".into()));
        }
        if state.cookies.is_empty() {
            return Err(VerifyError::InvalidInput("sessionCookies is required".into()));
        }
        self.submit(state, input).await
    }

    /// POST the search form and interpret the response.
    pub async fn submit(&self, state: FlowState, input: &SearchInput) -> VerifyResult<CdcInfo> {
        validate_input(input)?;

        let fields = vec![
            (state.csrf_name.clone(), state.csrf_token.clone()),
            ("CdcSearchForm[cdc_number]".to_string(), input.cdc_number.trim().to_string()),
            ("CdcSearchForm[date_of_birth]".to_string(), input.dob.trim().to_string()),
            ("CdcSearchForm[captcha]".to_string(), input.captcha.trim().to_string()),
        ];
        let request = FetchRequest::post_form(self.site.search_action(), fields)
            .cookies(&state.cookies)
            .header("Referer", self.site.search_page())
            .header("Origin", &self.site.base_url)
            .header("X-CSRF-Token", &state.csrf_token);

        tracing::info!("Submitting CDC search for {}", input.cdc_number.trim());
        let resp = self.get_ok(request).await?;
        let cookies = state.cookies.merge(&resp.cookies());

        self.interpret(&resp.text(), &cookies).await
    }

    async fn interpret(&self, html: &str, cookies: &CookieJar) -> VerifyResult<CdcInfo> {
        if let Some(message) = captcha_rejection(html) {
            tracing::info!("Captcha rejected: {message}");
            return Err(VerifyError::CaptchaRejected(message));
        }
        if is_not_found(html) {
            tracing::info!("No CDC records found");
            return Err(VerifyError::NotFound);
        }

        let search_results = parse_results_table(html);
        let Some(link) = find_details_link(html) else {
            return self
                .resolve_listing(html, search_results, NO_DETAILS_LINK_NOTE.to_string())
                .await;
        };

        let details_url = resolve_url(&self.site.base_url, &link);
        let request = FetchRequest::get(&details_url)
            .cookies(cookies)
            .header("Referer", self.site.search_action());

        let note = match self.http.fetch_resilient(&request).await {
            Ok(resp) if resp.is_success() => {
                let mut info = parse_details_page(&resp.text(), search_results, &self.site.base_url);
                if info.is_empty() {
                    return Err(VerifyError::Unparseable(
                        "Details page contained no recognisable CDC data.".into(),
                    ));
                }
                tracing::info!(
                    "Parsed details page: {} fields, {} service records",
                    info.details.len(),
                    info.service_records.len()
                );
                self.enrich_service_records(&mut info).await;
                return Ok(info);
            }
            Ok(resp) => {
                tracing::warn!("Details page {details_url} returned HTTP {}", resp.status);
                format!(
                    "Failed to fetch details page: HTTP {}. Returning search results only.",
                    resp.status
                )
            }
            Err(e) => {
                tracing::warn!("Details page {details_url} failed: {e}");
                format!("Failed to fetch details page: {e}. Returning search results only.")
            }
        };

        self.resolve_listing(html, search_results, note).await
    }

    /// Extract what we can from the search response itself.
    async fn resolve_listing(
        &self,
        html: &str,
        search_results: Vec<Record>,
        note: String,
    ) -> VerifyResult<CdcInfo> {
        let mut info = parse_details_page(html, search_results, &self.site.base_url);

        if info.details.is_empty() {
            // A listing: its wide table is the results table, not service history.
            info.service_records.clear();
            info.table_headers.clear();
            if info.search_results.is_empty() {
                return Err(VerifyError::Unparseable(
                    "Could not find results table in response. The search may have failed."
                        .into(),
                ));
            }
            info.note = Some(note);
            return Ok(info);
        }

        self.enrich_service_records(&mut info).await;
        Ok(info)
    }

    // ── Scrape details ──────────────────────────────────────────────────────

    /// Parse a details page the user opened themselves.
    pub async fn scrape_details(&self, url: &str) -> VerifyResult<CdcInfo> {
        let url = self.validate_details_url(url)?;

        let resp = self.http.fetch_resilient(&FetchRequest::get(&url)).await?;
        if !resp.is_success() {
            return Err(VerifyError::PageUnavailable {
                url,
                status: resp.status,
            });
        }
        let html = resp.text();

        let mut info = parse_details_page(&html, Vec::new(), &self.site.base_url);
        if info.details.is_empty() {
            let rows = parse_results_table(&html);
            if rows.is_empty() {
                return Err(VerifyError::Unparseable(
                    "Could not extract CDC details from this page. \
                     Make sure you are on the CDC details/view page."
                        .into(),
                ));
            }
            tracing::info!("Scraped page is a results listing ({} rows)", rows.len());
            return Ok(CdcInfo {
                search_results: rows,
                note: Some(RESULTS_PAGE_NOTE.to_string()),
                ..CdcInfo::default()
            });
        }

        self.enrich_service_records(&mut info).await;
        Ok(info)
    }

    fn validate_details_url(&self, raw: &str) -> VerifyResult<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VerifyError::InvalidInput("Missing required field: url".into()));
        }
        let parsed = url::Url::parse(raw)
            .map_err(|e| VerifyError::InvalidInput(format!("Invalid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VerifyError::InvalidInput(
                "URL must use http or https".into(),
            ));
        }

        let on_site = raw.starts_with(&self.site.base_url);
        if !on_site && !ALLOWED_URL_MARKERS.iter().any(|m| raw.contains(m)) {
            return Err(VerifyError::InvalidInput(
                "Please provide a URL from the DOS (erp.gso.gov.bd) website.".into(),
            ));
        }
        Ok(raw.to_string())
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    async fn enrich_service_records(&self, info: &mut CdcInfo) {
        if info.service_records.is_empty() {
            return;
        }
        let found = enrich(
            &mut info.service_records,
            self.directory.as_ref(),
            self.site.lookup_timeout,
        )
        .await;
        tracing::debug!("Enrichment resolved {} vessel(s)", found.len());
    }

    async fn get_ok(&self, request: FetchRequest) -> VerifyResult<HttpResponse> {
        let resp = self.http.fetch_resilient(&request).await?;
        if !resp.is_success() {
            return Err(VerifyError::UpstreamStatus {
                url: request.url,
                status: resp.status,
            });
        }
        Ok(resp)
    }
}

fn validate_input(input: &SearchInput) -> VerifyResult<()> {
    let missing: Vec<&str> = [
        ("cdcNumber", &input.cdc_number),
        ("dob", &input.dob),
        ("captcha", &input.captcha),
    ]
    .iter()
    .filter(|(_, v)| v.trim().is_empty())
    .map(|(name, _)| *name)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::InvalidInput(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// The captcha error message, if the page reports one.
///
/// The captcha field flagged with an error class counts, and so does the
/// rejection phrase anywhere in rendered text. Script and style bodies are
/// skipped: the form's client-side validation script embeds the same phrase
/// on every page.
fn captcha_rejection(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let feedback = selector(".help-block, .invalid-feedback");
    let first_feedback = |scope: ElementRef<'_>| {
        scope
            .select(&feedback)
            .map(element_text)
            .find(|t| !t.is_empty())
    };

    let flagged = document
        .select(&selector(
            ".field-cdcsearchform-captcha.has-error, \
             .field-cdcsearchform-captcha.is-invalid, \
             #cdcsearchform-captcha.is-invalid, \
             input.is-invalid[name=\"CdcSearchForm[captcha]\"]",
        ))
        .next()
        .map(|el| match el.value().name() {
            // Bootstrap 4 marks the input; its feedback is a sibling.
            "input" => el.parent().and_then(ElementRef::wrap).unwrap_or(el),
            _ => el,
        });
    let phrase = rendered_text(&document)
        .find(|t| t.to_lowercase().contains(INCORRECT_CAPTCHA_PHRASE))
        .map(collapse_whitespace);

    if flagged.is_none() && phrase.is_none() {
        return None;
    }

    let message = flagged
        .and_then(first_feedback)
        .or(phrase)
        .or_else(|| first_feedback(document.root_element()))
        .unwrap_or_else(|| CAPTCHA_FALLBACK_MESSAGE.to_string());
    Some(message)
}

/// Text nodes a browser would render: everything outside `<script>` and
/// `<style>`.
fn rendered_text(document: &Html) -> impl Iterator<Item = &str> + '_ {
    document.tree.nodes().filter_map(|node| {
        let text = node.value().as_text()?;
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
        });
        (!hidden).then_some(&**text)
    })
}

fn is_not_found(html: &str) -> bool {
    let lower = html.to_lowercase();
    NOT_FOUND_PHRASES.iter().any(|p| lower.contains(p))
}

fn is_followable(anchor: &ElementRef<'_>) -> bool {
    let href = anchor.value().attr("href").unwrap_or("").trim();
    !href.is_empty() && !href.starts_with('#') && !href.to_lowercase().starts_with("javascript:")
}

/// The link to the details page: an anchor labelled "details"/"view", else
/// the last link in the last table.
fn find_details_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]");

    let labelled = document
        .select(&anchors)
        .filter(is_followable)
        .find(|a| {
            let title = a.value().attr("title").unwrap_or("");
            details_word_re().is_match(&element_text(*a)) || details_word_re().is_match(title)
        });

    let chosen = labelled.or_else(|| {
        document
            .select(&selector("table"))
            .last()
            .and_then(|table| table.select(&anchors).filter(is_followable).last())
    })?;

    chosen.value().attr("href").map(|h| h.trim().to_string())
}
