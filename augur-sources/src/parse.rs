//! Source payload parsing
//!
//! Normalizes a response body into a list of opaque JSON fragments, one per
//! post, article, repository, quote or review. JSON bodies are unpacked by
//! source type; anything else is treated as markup (RSS, Atom or HTML).

use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::LazyLock;

use augur_core::SourceType;

use crate::FetchError;

/// Maximum characters kept per text field
const MAX_TEXT_LENGTH: usize = 4000;

static ITEM_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("item, entry, article").unwrap());
static ITEM_TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title, h1, h2, h3").unwrap());
static ITEM_BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("description, summary, content, p").unwrap());
static ITEM_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("link, a").unwrap());
static ITEM_GUID_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("guid, id").unwrap());
static PAGE_TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static BODY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Split a response body into payload fragments
pub fn parse_payload(source_type: SourceType, body: &str) -> Result<Vec<Value>, FetchError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(parse_json(source_type, value)),
        Err(json_err) if trimmed.starts_with('<') => {
            let fragments = parse_markup(trimmed);
            if fragments.is_empty() {
                Err(FetchError::Parse(format!("no content in markup ({})", json_err)))
            } else {
                Ok(fragments)
            }
        }
        Err(e) => Err(FetchError::Parse(e.to_string())),
    }
}

/// Array fields that hold the records for each source type, in lookup order
fn record_fields(source_type: SourceType) -> &'static [&'static str] {
    match source_type {
        SourceType::Social => &["posts", "statuses", "data", "results"],
        SourceType::News => &["articles", "items", "feed", "results"],
        SourceType::Technical => &["items", "hits", "results", "data"],
        SourceType::Financial => &["feed", "data", "quotes", "results"],
        SourceType::Reviews => &["reviews", "items", "results", "data"],
    }
}

fn parse_json(source_type: SourceType, value: Value) -> Vec<Value> {
    // Reddit listing: {"data": {"children": [{"data": {...}}]}}
    if source_type == SourceType::Social {
        if let Some(children) = value.pointer("/data/children").and_then(Value::as_array) {
            return children
                .iter()
                .map(|child| child.get("data").cloned().unwrap_or_else(|| child.clone()))
                .filter(is_meaningful)
                .collect();
        }
    }

    if let Value::Object(map) = &value {
        let nested = record_fields(source_type)
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_array));
        if let Some(items) = nested {
            return items.iter().filter(|v| is_meaningful(v)).cloned().collect();
        }
    }

    match value {
        Value::Array(items) => items.into_iter().filter(is_meaningful).collect(),
        // A single quote, release or review
        other if is_meaningful(&other) => vec![other],
        _ => Vec::new(),
    }
}

fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// RSS/Atom items or HTML articles; a plain page becomes one fragment
fn parse_markup(markup: &str) -> Vec<Value> {
    let document = Html::parse_document(&unwrap_cdata(markup));

    let items: Vec<Value> = document
        .select(&ITEM_SELECTOR)
        .filter_map(|item| {
            let title = first_text(&item, &ITEM_TITLE_SELECTOR);
            let description = first_text(&item, &ITEM_BODY_SELECTOR);
            if title.is_none() && description.is_none() {
                return None;
            }

            let link = item_link(&item);
            Some(json!({
                "title": title.unwrap_or_default(),
                "description": description.unwrap_or_default(),
                "link": link,
            }))
        })
        .collect();

    if !items.is_empty() {
        return items;
    }

    let (title, text) = extract_content(&document);
    if text.is_empty() {
        Vec::new()
    } else {
        vec![json!({ "title": title, "text": text })]
    }
}

/// Replace CDATA sections with their contents. The HTML parser reads
/// `<![CDATA[` as a bogus comment that ends at the first `>` inside it.
fn unwrap_cdata(markup: &str) -> Cow<'_, str> {
    const OPEN: &str = "<![CDATA[";
    const CLOSE: &str = "]]>";

    if !markup.contains(OPEN) {
        return Cow::Borrowed(markup);
    }

    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let inner = &rest[start + OPEN.len()..];
        match inner.find(CLOSE) {
            Some(end) => {
                out.push_str(&inner[..end]);
                rest = &inner[end + CLOSE.len()..];
            }
            None => {
                out.push_str(inner);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Item URL from an `href`, link text, or the `guid`/`id` as a last resort
fn item_link(item: &ElementRef<'_>) -> Option<String> {
    for el in item.select(&ITEM_LINK_SELECTOR) {
        if let Some(href) = el.value().attr("href").and_then(|h| non_empty(h.to_string())) {
            return Some(href);
        }
        if let Some(text) = non_empty(el.text().collect::<String>()) {
            return Some(text);
        }
        // RSS <link> is void in HTML, so its URL lands in the next text node
        let following = el
            .next_sibling()
            .and_then(|node| node.value().as_text().map(|t| t.trim().to_string()))
            .and_then(non_empty);
        if following.is_some() {
            return following;
        }
    }

    item.select(&ITEM_GUID_SELECTOR)
        .map(|el| el.text().collect::<String>())
        .find_map(non_empty)
}

fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .find(|text| !text.is_empty())
        .map(|text| truncate(&text))
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extract title and visible body text from an HTML page
fn extract_content(document: &Html) -> (Option<String>, String) {
    use scraper::node::Node;

    let title = document
        .select(&PAGE_TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string());

    let Some(body) = document.select(&BODY_SELECTOR).next() else {
        return (title, String::new());
    };

    let mut text_parts = Vec::new();
    for node_ref in body.descendants() {
        if let Node::Text(text_node) = node_ref.value() {
            let in_excluded = node_ref.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"))
            });

            if !in_excluded {
                let trimmed = text_node.trim();
                if !trimmed.is_empty() {
                    text_parts.push(trimmed.to_string());
                }
            }
        }
    }

    (title, truncate(&normalize_whitespace(&text_parts.join(" "))))
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_TEXT_LENGTH {
        let cut: String = text.chars().take(MAX_TEXT_LENGTH).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Normalize whitespace in text
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
