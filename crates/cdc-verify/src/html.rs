//! Low-level HTML helpers shared by the flow controller, record parser, and
//! vessel enrichment.
//!
//! String-level helpers for labels and links, plus DOM-level helpers built on
//! `scraper` for walking tables.

use std::collections::HashSet;

use scraper::{ElementRef, Selector};

use crate::types::Record;

/// Parse a selector that is known at compile time.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Collapse runs of whitespace (including non-breaking spaces) to one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of an element, whitespace-normalised.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Turn a label cell like `"Date of Birth :"` into `"Date of Birth"`.
pub fn normalize_label(text: &str) -> String {
    collapse_whitespace(&text.replace(':', ""))
}

/// Resolve an href the way the records site links pages.
///
/// Absolute URLs pass through; `/path` is joined to the site root; anything
/// else is treated as relative to the site root too.
pub fn resolve_url(base: &str, href: &str) -> String {
    let base = base.trim_end_matches('/');
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with("//") {
        let scheme = base.split("://").next().unwrap_or("https");
        format!("{scheme}:{href}")
    } else if href.starts_with('/') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    }
}

/// The `<td>`/`<th>` children of a row, in order.
pub fn direct_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

/// Rows that belong to `table` itself, skipping rows of nested tables.
pub fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let tr = selector("tr");
    table
        .select(&tr)
        .filter(|row| {
            row.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "table")
                .is_some_and(|owner| owner.id() == table.id())
        })
        .collect()
}

/// A table flattened into header labels and keyed rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScannedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl ScannedTable {
    /// Number of distinct, non-empty header labels.
    pub fn distinct_headers(&self) -> usize {
        self.headers
            .iter()
            .filter(|h| !h.is_empty())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Scan a table generically.
///
/// Any row containing `<th>` cells (re)defines the column labels; every row
/// of `<td>` cells becomes a record keyed by label, or `col_<i>` where no
/// label exists for that position.
pub fn scan_table(table: ElementRef<'_>, uppercase_headers: bool) -> ScannedTable {
    let mut scanned = ScannedTable::default();

    for row in table_rows(table) {
        let cells = direct_cells(row);
        if cells.iter().any(|c| c.value().name() == "th") {
            scanned.headers = cells
                .iter()
                .filter(|c| c.value().name() == "th")
                .map(|c| {
                    let text = element_text(*c);
                    if uppercase_headers {
                        text.to_uppercase()
                    } else {
                        text
                    }
                })
                .collect();
            continue;
        }
        if cells.is_empty() {
            continue;
        }

        let record: Record = cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let key = match scanned.headers.get(idx) {
                    Some(h) if !h.is_empty() => h.clone(),
                    _ => format!("col_{idx}"),
                };
                (key, element_text(*cell))
            })
            .collect();
        scanned.rows.push(record);
    }

    scanned
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Date of Birth : "), "Date of Birth");
        assert_eq!(normalize_label(":"), "");
    }

    #[test]
    fn test_resolve_url() {
        let base = "https://erp.gso.gov.bd";
        assert_eq!(
            resolve_url(base, "https://x.test/a"),
            "https://x.test/a"
        );
        assert_eq!(
            resolve_url(base, "/cdc/view?id=4"),
            "https://erp.gso.gov.bd/cdc/view?id=4"
        );
        assert_eq!(
            resolve_url("https://erp.gso.gov.bd/", "cdc/view?id=4"),
            "https://erp.gso.gov.bd/cdc/view?id=4"
        );
        assert_eq!(resolve_url(base, "//cdn.test/p.png"), "https://cdn.test/p.png");
    }

    #[test]
    fn test_scan_table_with_headers_and_fallback_keys() {
        let doc = Html::parse_document(
            "<table>
               <tr><th>Vessel</th><th>Rank</th></tr>
               <tr><td>M.V. Star</td><td>AB</td><td>extra</td></tr>
             </table>",
        );
        let table = doc.select(&selector("table")).next().unwrap();
        let scanned = scan_table(table, false);
        assert_eq!(scanned.headers, vec!["Vessel", "Rank"]);
        assert_eq!(scanned.rows.len(), 1);
        assert_eq!(scanned.rows[0]["Vessel"], "M.V. Star");
        assert_eq!(scanned.rows[0]["col_2"], "extra");
    }

    #[test]
    fn test_scan_table_skips_nested_rows() {
        let doc = Html::parse_document(
            "<table id=\"outer\">
               <tr><th>A</th><th>B</th><th>C</th></tr>
               <tr><td>1</td><td>2</td><td><table><tr><td>inner</td></tr></table></td></tr>
             </table>",
        );
        let outer = doc.select(&selector("table#outer")).next().unwrap();
        let scanned = scan_table(outer, true);
        assert_eq!(scanned.rows.len(), 1);
        assert_eq!(scanned.distinct_headers(), 3);
    }
}
