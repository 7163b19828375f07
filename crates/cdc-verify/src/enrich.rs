//! Best-effort vessel-type enrichment for service records.
//!
//! Each distinct vessel named in the service history is looked up once in an
//! external directory. Lookups run concurrently with independent timeouts;
//! any failure just leaves the matching records unenriched.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;

use crate::html::resolve_url;
use crate::transport::{FetchRequest, HttpClient};
use crate::types::{Record, VerifyError, VerifyResult, SHIP_TYPE_FIELD};

/// Default per-lookup timeout.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(8);

fn imo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5,}$").expect("imo regex is valid"))
}

fn vessel_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:M\.?V|M\.?T|S\.?S|M\.?S)(?:\.\s*|\s+)")
            .expect("vessel prefix regex is valid")
    })
}

fn ship_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:Ship|Vessel|AIS)\s+Type\s*(?:<[^>]*>\s*)*([^<]+)<")
            .expect("ship type regex is valid")
    })
}

fn detail_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"href="(/vessels/details/[^"]+)""#).expect("detail link regex is valid")
    })
}

/// One vessel to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTask {
    /// IMO number, when the record has one.
    pub identifier: Option<String>,
    /// Vessel name with any `M.V.`-style prefix removed.
    pub display_name: Option<String>,
}

impl LookupTask {
    /// Dedup key: the identifier, else the lowercased name.
    pub fn key(&self) -> Option<String> {
        self.identifier
            .clone()
            .or_else(|| self.display_name.as_ref().map(|n| n.to_lowercase()))
    }
}

/// A source of vessel types.
#[async_trait]
pub trait VesselDirectory: Send + Sync {
    /// Look up the ship type for a vessel. `Ok(None)` means not found.
    async fn ship_type(&self, task: &LookupTask) -> VerifyResult<Option<String>>;
}

/// Drop a leading `M.V.`, `MV`, `M.T.`, `S.S.`, `MS` (etc.) from a vessel name.
pub fn strip_vessel_prefix(name: &str) -> String {
    vessel_prefix_re().replace(name.trim(), "").trim().to_string()
}

/// Work out what to look up for one service record.
///
/// Fields are visited in label order; the first matching field wins.
pub fn derive_task(record: &Record) -> Option<LookupTask> {
    let mut identifier = None;
    let mut display_name = None;

    for (label, value) in record {
        let label = label.to_lowercase();
        let value = value.trim();
        if identifier.is_none() && label.contains("imo") && imo_re().is_match(value) {
            identifier = Some(value.to_string());
        }
        if display_name.is_none()
            && (label.contains("ship") || label.contains("vessel"))
            && !label.contains("type")
        {
            let name = strip_vessel_prefix(value);
            if !name.is_empty() {
                display_name = Some(name);
            }
        }
    }

    if identifier.is_none() && display_name.is_none() {
        return None;
    }
    Some(LookupTask {
        identifier,
        display_name,
    })
}

/// Look up every distinct vessel in `records` and tag matches with
/// `_shipType`. Returns the key → ship type map of successful lookups.
pub async fn enrich(
    records: &mut [Record],
    directory: &dyn VesselDirectory,
    timeout: Duration,
) -> HashMap<String, String> {
    let mut seen = HashSet::new();
    let tasks: Vec<(String, LookupTask)> = records
        .iter()
        .filter_map(derive_task)
        .filter_map(|task| task.key().map(|key| (key, task)))
        .filter(|(key, _)| seen.insert(key.clone()))
        .collect();

    if tasks.is_empty() {
        return HashMap::new();
    }
    tracing::debug!("Enriching {} vessel(s)", tasks.len());

    let lookups = tasks.iter().map(|(key, task)| async move {
        let outcome = tokio::time::timeout(timeout, directory.ship_type(task)).await;
        (key, outcome)
    });

    let mut found = HashMap::new();
    for (key, outcome) in join_all(lookups).await {
        match outcome {
            Ok(Ok(Some(ship_type))) => {
                found.insert(key.clone(), ship_type);
            }
            Ok(Ok(None)) => tracing::debug!("No ship type for {key}"),
            Ok(Err(e)) => tracing::debug!("Vessel lookup for {key} failed: {e}"),
            Err(_) => tracing::debug!("Vessel lookup for {key} timed out after {timeout:?}"),
        }
    }

    for record in records.iter_mut() {
        let Some(task) = derive_task(record) else {
            continue;
        };
        let by_id = task.identifier.as_ref().and_then(|id| found.get(id));
        let by_name = task
            .display_name
            .as_ref()
            .and_then(|n| found.get(&n.to_lowercase()));
        if let Some(ship_type) = by_id.or(by_name) {
            record.insert(SHIP_TYPE_FIELD.to_string(), ship_type.clone());
        }
    }

    found
}

/// Pull the ship type out of a vessel detail page.
pub fn parse_ship_type(html: &str) -> Option<String> {
    ship_type_re()
        .captures(html)
        .map(|c| html_escape::decode_html_entities(c[1].trim()).into_owned())
        .filter(|t| !t.is_empty())
}

/// First `/vessels/details/…` link on a search results page.
pub fn first_detail_link(html: &str) -> Option<String> {
    detail_link_re()
        .captures(html)
        .map(|c| html_escape::decode_html_entities(&c[1]).into_owned())
}

/// [`VesselDirectory`] backed by the VesselFinder website.
#[derive(Clone)]
pub struct VesselFinderDirectory {
    http: HttpClient,
    base_url: String,
}

impl VesselFinderDirectory {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_page(&self, url: &str) -> VerifyResult<String> {
        let resp = self.http.fetch_resilient(&FetchRequest::get(url)).await?;
        if !resp.is_success() {
            return Err(VerifyError::UpstreamStatus {
                url: url.to_string(),
                status: resp.status,
            });
        }
        Ok(resp.text())
    }

    async fn by_identifier(&self, imo: &str) -> VerifyResult<Option<String>> {
        let url = format!("{}/vessels/details/{imo}", self.base_url);
        Ok(parse_ship_type(&self.fetch_page(&url).await?))
    }

    async fn by_name(&self, name: &str) -> VerifyResult<Option<String>> {
        let search = url::Url::parse_with_params(
            &format!("{}/vessels", self.base_url),
            &[("name", name)],
        )
        .map_err(|e| VerifyError::InvalidInput(format!("vessel directory URL: {e}")))?;

        let listing = self.fetch_page(search.as_str()).await?;
        let Some(link) = first_detail_link(&listing) else {
            return Ok(None);
        };
        let detail = resolve_url(&self.base_url, &link);
        Ok(parse_ship_type(&self.fetch_page(&detail).await?))
    }
}

#[async_trait]
impl VesselDirectory for VesselFinderDirectory {
    async fn ship_type(&self, task: &LookupTask) -> VerifyResult<Option<String>> {
        if let Some(imo) = &task.identifier {
            match self.by_identifier(imo).await {
                Ok(Some(ship_type)) => return Ok(Some(ship_type)),
                Ok(None) => {}
                Err(e) if task.display_name.is_some() => {
                    tracing::debug!("Lookup by IMO {imo} failed, trying name: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        match &task.display_name {
            Some(name) => self.by_name(name).await,
            None => Ok(None),
        }
    }
}
