//! Output formatting for result sets.

use serde::Serialize;
use serde_json::Value;

use atlas_core::types::{value_as_text, GroupSummary, Point, SearchResultItem};
use atlas_hybrid::SearchView;

/// Maximum characters of row text shown per item
const SNIPPET_MAX_LEN: usize = 120;

#[derive(Serialize)]
struct JsonGroup<'a> {
    key: &'a str,
    count: usize,
    distance: Option<f64>,
    representative: String,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    label: Option<&'a str>,
    status: Option<&'a str>,
    has_more: bool,
    items: &'a [SearchResultItem],
    groups: Vec<JsonGroup<'a>>,
    focus: Option<Point>,
}

pub fn format_json(view: &SearchView, items: &[SearchResultItem], groups: &[GroupSummary], focus: Option<Point>) -> String {
    let output = JsonOutput {
        label: view.results.as_deref().map(|r| r.label.as_str()),
        status: view.status.as_deref(),
        has_more: view.has_more,
        items,
        groups: groups
            .iter()
            .map(|g| JsonGroup {
                key: &g.key,
                count: g.count,
                distance: g.distance.is_finite().then_some(g.distance),
                representative: g.representative.id.to_string(),
            })
            .collect(),
        focus,
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_human(view: &SearchView, items: &[SearchResultItem], groups: &[GroupSummary]) -> String {
    let mut out = String::new();
    let Some(results) = view.results.as_deref() else { return "No search has run.".to_string() };
    out.push_str(&results.label);
    out.push('\n');
    if let Some(status) = &view.status {
        out.push_str(&format!("  ({status})\n"));
    }
    if items.is_empty() {
        out.push_str("  no results\n");
        return out;
    }
    for (i, item) in items.iter().enumerate() {
        let distance = item.distance.map_or_else(|| "-".to_string(), |d| format!("{d:.4}"));
        let text = item.text.as_deref().map(|t| truncate_text(t, SNIPPET_MAX_LEN)).unwrap_or_default();
        out.push_str(&format!("{:>4}. {:<12} {:>8}  {}\n", i + 1, item.id.to_string(), distance, text));
        let extra: Vec<String> = item
            .fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{k}={}", field_text(v)))
            .collect();
        if !extra.is_empty() { out.push_str(&format!("        {}\n", extra.join("  "))); }
    }
    if view.has_more { out.push_str("  ... more available (--pages)\n"); }
    if !groups.is_empty() {
        out.push_str("\nGroups\n");
        for g in groups {
            out.push_str(&format!("  {:<20} {:>4}  closest {}\n", g.label, g.count, g.representative.id));
        }
    }
    out
}

fn field_text(value: &Value) -> String { truncate_text(&value_as_text(value), 40) }

/// Truncates on a char boundary, appending "..." when shortened.
fn truncate_text(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
