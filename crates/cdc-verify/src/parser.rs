//! Extract structured CDC data from loosely structured HTML.
//!
//! The records site has no stable markup contract, so the details page is
//! read by several independent strategies. Each one returns a partial
//! label → value map; the maps are unioned in a fixed order and later
//! strategies overwrite earlier ones on the same label.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use crate::html::{
    direct_cells, element_text, normalize_label, resolve_url, scan_table, selector, table_rows,
};
use crate::types::{CdcInfo, Record};

/// Labels this long or longer are prose, not field names.
const MAX_LABEL_LEN: usize = 60;

/// Tables need at least this many distinct headers to count as service history.
const MIN_SERVICE_HEADERS: usize = 3;

type Pairs = BTreeMap<String, String>;

/// Parse a CDC details page.
///
/// `search_results` are carried through unchanged from the results page
/// that linked here; `site_base` resolves a relative photo URL.
pub fn parse_details_page(html: &str, search_results: Vec<Record>, site_base: &str) -> CdcInfo {
    let document = Html::parse_document(html);

    let mut details = Pairs::new();
    // 1. Generic label/value layouts
    details.extend(two_cell_rows(&document));
    details.extend(definition_list(&document));
    details.extend(labelled_values(&document));
    // 2. The Yii DetailView widget
    details.extend(detail_view(&document));

    let (service_records, table_headers) = service_tables(&document);
    let photo_url = photo_url(&document, site_base);

    CdcInfo {
        search_results,
        details_available: !details.is_empty(),
        details,
        service_records,
        table_headers,
        photo_url,
        note: None,
    }
}

/// Scan the last table on a search results page, headers upper-cased.
pub fn parse_results_table(html: &str) -> Vec<Record> {
    let document = Html::parse_document(html);
    let table = selector("table");
    match document.select(&table).last() {
        Some(last) => scan_table(last, true).rows,
        None => Vec::new(),
    }
}

// ── Strategies ──────────────────────────────────────────────────────────────

fn insert_pair(pairs: &mut Pairs, label: &str, value: String) {
    let label = normalize_label(label);
    if label.is_empty() || label.chars().count() >= MAX_LABEL_LEN || value.is_empty() {
        return;
    }
    pairs.insert(label, value);
}

/// Rows of exactly two cells: `<th|td>label</…><td>value</td>`.
fn two_cell_rows(document: &Html) -> Pairs {
    let mut pairs = Pairs::new();
    for row in document.select(&selector("tr")) {
        let cells = direct_cells(row);
        if let [label, value] = cells.as_slice() {
            if value.value().name() == "td" {
                insert_pair(&mut pairs, &element_text(*label), element_text(*value));
            }
        }
    }
    pairs
}

/// `<dt>` immediately followed by `<dd>`.
fn definition_list(document: &Html) -> Pairs {
    let mut pairs = Pairs::new();
    for dt in document.select(&selector("dt")) {
        let next = dt.next_siblings().find_map(ElementRef::wrap);
        if let Some(dd) = next.filter(|n| n.value().name() == "dd") {
            insert_pair(&mut pairs, &element_text(dt), element_text(dd));
        }
    }
    pairs
}

fn is_value_holder(el: ElementRef<'_>) -> bool {
    if !matches!(el.value().name(), "span" | "p" | "div") {
        return false;
    }
    let class = el.value().attr("class").unwrap_or("").to_lowercase();
    ["form-control", "value", "detail"]
        .iter()
        .any(|c| class.contains(c))
}

/// `<label>` paired with the nearest following value element, stopping at
/// the next label.
fn labelled_values(document: &Html) -> Pairs {
    let mut pairs = Pairs::new();
    let holders = selector("span, p, div");

    for label in document.select(&selector("label")) {
        let mut found = None;
        for sibling in label.next_siblings().filter_map(ElementRef::wrap) {
            if sibling.value().name() == "label" {
                break;
            }
            if is_value_holder(sibling) {
                found = Some(sibling);
            } else {
                found = sibling.select(&holders).find(|el| is_value_holder(*el));
            }
            if found.is_some() {
                break;
            }
        }
        if let Some(value) = found {
            insert_pair(&mut pairs, &element_text(label), element_text(value));
        }
    }
    pairs
}

/// Rows of `table.detail-view`; first two cells of each row.
fn detail_view(document: &Html) -> Pairs {
    let mut pairs = Pairs::new();
    for table in document.select(&selector("table.detail-view")) {
        for row in table_rows(table) {
            let cells = direct_cells(row);
            if cells.len() >= 2 {
                insert_pair(&mut pairs, &element_text(cells[0]), element_text(cells[1]));
            }
        }
    }
    pairs
}

fn photo_url(document: &Html, site_base: &str) -> Option<String> {
    document.select(&selector("img")).find_map(|img| {
        let class = img.value().attr("class").unwrap_or("").to_lowercase();
        let id = img.value().attr("id").unwrap_or("").to_lowercase();
        let is_photo = ["photo", "profile", "passport"]
            .iter()
            .any(|c| class.contains(c))
            || id.contains("photo");
        if !is_photo {
            return None;
        }
        img.value()
            .attr("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(|src| resolve_url(site_base, src))
    })
}

/// Every wide table on the page, rows in document order.
fn service_tables(document: &Html) -> (Vec<Record>, Vec<Vec<String>>) {
    let mut records = Vec::new();
    let mut headers = Vec::new();

    for table in document.select(&selector("table")) {
        let scanned = scan_table(table, false);
        if scanned.distinct_headers() < MIN_SERVICE_HEADERS || scanned.rows.is_empty() {
            continue;
        }
        records.extend(scanned.rows);
        headers.push(scanned.headers);
    }

    (records, headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://erp.gso.gov.bd";

    #[test]
    fn test_two_cell_rows() {
        let html = r#"
            <table>
              <tr><th>Name :</th><td>MD. RAHIM UDDIN</td></tr>
              <tr><td>CDC No</td><td>C/O/12345</td></tr>
              <tr><td>Empty</td><td>  </td></tr>
              <tr><td></td><td>orphan</td></tr>
            </table>"#;
        let info = parse_details_page(html, Vec::new(), BASE);
        assert_eq!(info.details.len(), 2);
        assert_eq!(info.details["Name"], "MD. RAHIM UDDIN");
        assert_eq!(info.details["CDC No"], "C/O/12345");
        assert!(info.details_available);
    }

    #[test]
    fn test_long_labels_are_ignored() {
        let long = "x".repeat(MAX_LABEL_LEN);
        let html = format!("<table><tr><td>{long}</td><td>value</td></tr></table>");
        let info = parse_details_page(&html, Vec::new(), BASE);
        assert!(info.details.is_empty());
        assert!(!info.details_available);
    }

    #[test]
    fn test_definition_list() {
        let html = "<dl><dt>Rank:</dt><dd>Able Seaman</dd><dt>Orphan</dt></dl>";
        let info = parse_details_page(html, Vec::new(), BASE);
        assert_eq!(info.details.len(), 1);
        assert_eq!(info.details["Rank"], "Able Seaman");
    }

    #[test]
    fn test_labelled_values() {
        let html = r#"
            <div class="form-group">
              <label>Date of Birth</label>
              <div class="form-control">01-01-1990</div>
            </div>
            <div class="row">
              <label>Nationality</label>
              <div><span class="field-value">Bangladeshi</span></div>
            </div>
            <div>
              <label>Missing</label><label>Next</label><p class="value">kept for Next</p>
            </div>"#;
        let info = parse_details_page(html, Vec::new(), BASE);
        assert_eq!(info.details["Date of Birth"], "01-01-1990");
        assert_eq!(info.details["Nationality"], "Bangladeshi");
        assert_eq!(info.details["Next"], "kept for Next");
        assert!(!info.details.contains_key("Missing"));
    }

    #[test]
    fn test_detail_view_overrides_generic_strategies() {
        let html = r#"
            <dl><dt>Status</dt><dd>pending</dd></dl>
            <table class="table detail-view">
              <tr><th>Status</th><td>Valid</td><td>ignored</td></tr>
            </table>"#;
        let info = parse_details_page(html, Vec::new(), BASE);
        assert_eq!(info.details["Status"], "Valid");
    }

    #[test]
    fn test_photo_url_resolved() {
        let html = r#"<img src="/logo.png" class="brand"><img id="seafarerPhoto" src="/uploads/p/42.jpg">"#;
        let info = parse_details_page(html, Vec::new(), BASE);
        assert_eq!(
            info.photo_url.as_deref(),
            Some("https://erp.gso.gov.bd/uploads/p/42.jpg")
        );

        let html = r#"<img class="img-thumbnail profile-pic" src="https://cdn.test/a.jpg">"#;
        let info = parse_details_page(html, Vec::new(), BASE);
        assert_eq!(info.photo_url.as_deref(), Some("https://cdn.test/a.jpg"));
    }

    #[test]
    fn test_service_tables_need_three_headers() {
        let html = r#"
            <table>
              <tr><th>Vessel</th><th>Rank</th></tr>
              <tr><td>MV A</td><td>OS</td></tr>
            </table>
            <table>
              <tr><th>Vessel Name</th><th>IMO No</th><th>Rank</th><th>Sign On</th></tr>
              <tr><td>MV Star</td><td>9876543</td><td>AB</td><td>2020-01-01</td></tr>
              <tr><td>MT Moon</td><td>9123456</td><td>OS</td><td>2021-05-01</td></tr>
            </table>"#;
        let info = parse_details_page(html, Vec::new(), BASE);
        assert_eq!(info.service_records.len(), 2);
        assert_eq!(info.service_records[0]["Vessel Name"], "MV Star");
        assert_eq!(info.service_records[1]["IMO No"], "9123456");
        assert_eq!(
            info.table_headers,
            vec![vec!["Vessel Name", "IMO No", "Rank", "Sign On"]]
        );
    }

    #[test]
    fn test_header_only_table_is_not_service_history() {
        let html = "<table><tr><th>A</th><th>B</th><th>C</th></tr></table>";
        let info = parse_details_page(html, Vec::new(), BASE);
        assert!(info.service_records.is_empty());
        assert!(info.table_headers.is_empty());
    }

    #[test]
    fn test_search_results_are_carried() {
        let mut row = Record::new();
        row.insert("CDC NO".into(), "C/O/1".into());
        let info = parse_details_page("<p>nothing</p>", vec![row.clone()], BASE);
        assert_eq!(info.search_results, vec![row]);
        assert!(info.details.is_empty());
    }

    #[test]
    fn test_parse_results_table_uses_last_table() {
        let html = r#"
            <table><tr><th>Layout</th></tr><tr><td>x</td></tr></table>
            <table>
              <tr><th>Cdc No</th><th>Name</th><th>Action</th></tr>
              <tr><td>C/O/1</td><td>RAHIM</td><td><a href="/view?id=1">View</a></td></tr>
            </table>"#;
        let rows = parse_results_table(html);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["CDC NO"], "C/O/1");
        assert_eq!(rows[0]["ACTION"], "View");
        assert!(parse_results_table("<p>none</p>").is_empty());
    }
}
