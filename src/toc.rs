//! Table-of-contents resolution
//!
//! Three strategies, tried in order:
//! 1. An embedded JSON tree on a navigation widget (`data-toc`, `data-tree`,
//!    `data-nav-tree`)
//! 2. A nested list following an "Inhaltsangabe" heading
//! 3. Probing `{base}/divisions/{n}` until a page is missing or too short

use crate::config::ProbeConfig;
use crate::error::Result;
use crate::fetch::{FetchedPage, Fetcher};
use crate::html::{
    child_elements, descendant_elements, element_text, is_heading_tag, normalize_for_match,
    resolve_url, select_all, select_first, tag_name,
};
use crate::segment::segment;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

const DESCRIPTOR_SELECTOR: &str = "[data-toc], [data-tree], [data-nav-tree]";
const DESCRIPTOR_ATTRS: &[&str] = &["data-toc", "data-tree", "data-nav-tree"];
const TOC_HEADINGS: &[&str] = &["inhaltsangabe", "inhaltsverzeichnis", "table of contents"];

/// One content-unit descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TocEntry {
    pub level: u32,
    pub label: String,
    pub url: Option<String>,
    pub has_content: bool,
    pub unit_id: Option<String>,
}

/// Which strategy produced the entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocSource {
    Descriptor,
    NestedList,
    Probe,
    None,
}

impl std::fmt::Display for TocSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TocSource::Descriptor => write!(f, "descriptor"),
            TocSource::NestedList => write!(f, "nested-list"),
            TocSource::Probe => write!(f, "probe"),
            TocSource::None => write!(f, "none"),
        }
    }
}

/// Resolved TOC plus pages already fetched while probing
#[derive(Debug, Clone)]
pub struct ResolvedToc {
    pub entries: Vec<TocEntry>,
    pub source: TocSource,
    pub prefetched: HashMap<String, FetchedPage>,
}

/// Resolve the TOC of a version from its root page
pub async fn resolve_toc(
    fetcher: &dyn Fetcher,
    root_html: &str,
    version_url: &str,
    locale_prefix: &str,
    probe: &ProbeConfig,
) -> Result<ResolvedToc> {
    if let Some((entries, source)) = parse_toc(root_html, version_url, locale_prefix) {
        info!(url = version_url, entries = entries.len(), %source, "Resolved TOC");
        return Ok(ResolvedToc {
            entries,
            source,
            prefetched: HashMap::new(),
        });
    }

    debug!(url = version_url, "No TOC markup, probing divisions");
    let (entries, prefetched) = probe_divisions(fetcher, version_url, probe).await?;
    let source = if entries.is_empty() {
        TocSource::None
    } else {
        TocSource::Probe
    };
    info!(url = version_url, entries = entries.len(), %source, "Resolved TOC");
    Ok(ResolvedToc {
        entries,
        source,
        prefetched,
    })
}

/// Markup-only strategies (descriptor, then nested list)
pub fn parse_toc(html: &str, base_url: &str, locale_prefix: &str) -> Option<(Vec<TocEntry>, TocSource)> {
    let doc = Html::parse_document(html);

    let from_descriptor = parse_descriptor(&doc, base_url, locale_prefix);
    if !from_descriptor.is_empty() {
        return Some((from_descriptor, TocSource::Descriptor));
    }

    let from_list = parse_nested_list(&doc, base_url, locale_prefix);
    if !from_list.is_empty() {
        return Some((from_list, TocSource::NestedList));
    }

    None
}

// ===== Embedded descriptor =====

fn parse_descriptor(doc: &Html, base_url: &str, locale_prefix: &str) -> Vec<TocEntry> {
    for el in select_all(doc.root_element(), DESCRIPTOR_SELECTOR) {
        let Some(raw) = DESCRIPTOR_ATTRS.iter().find_map(|a| el.value().attr(a)) else {
            continue;
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(tree) => {
                let entries = flatten_descriptor(&tree, base_url, locale_prefix);
                if !entries.is_empty() {
                    return entries;
                }
            }
            Err(e) => warn!("Ignoring malformed TOC descriptor: {}", e),
        }
    }
    Vec::new()
}

fn field<'a>(node: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| node.get(*n)).filter(|v| !v.is_null())
}

fn field_str(node: &Value, names: &[&str]) -> Option<String> {
    match field(node, names)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn children_of(node: &Value) -> &[Value] {
    match node {
        Value::Array(items) => items,
        _ => field(node, &["children", "items", "nodes", "entries"])
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
    }
}

/// Depth-first flattening with an explicit stack
fn flatten_descriptor(tree: &Value, base_url: &str, locale_prefix: &str) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    let mut stack: Vec<(&Value, u32)> = children_of(tree).iter().rev().map(|n| (n, 1)).collect();

    while let Some((node, depth)) = stack.pop() {
        let label = field_str(node, &["label", "title", "text", "name"]);
        let child_depth = if label.is_some() { depth + 1 } else { depth };

        if let Some(label) = label {
            let url = field_str(node, &["href", "url", "link", "path"])
                .and_then(|h| resolve_url(base_url, &h))
                .map(|u| enforce_locale(&u, base_url, locale_prefix));
            let level = field(node, &["level", "depth"])
                .and_then(Value::as_u64)
                .map(|l| u32::try_from(l.max(1)).unwrap_or(u32::MAX))
                .unwrap_or(depth);
            let has_content = field(node, &["has_content", "hasContent"])
                .and_then(Value::as_bool)
                .unwrap_or(url.is_some());
            let unit_id = field_str(node, &["id", "unit_id"])
                .or_else(|| url.as_deref().and_then(unit_id_from_url));

            entries.push(TocEntry {
                level,
                label,
                url,
                has_content,
                unit_id,
            });
        }

        for child in children_of(node).iter().rev() {
            stack.push((child, child_depth));
        }
    }

    entries
}

/// Prefix same-host paths with the locale (e.g. `/werke/1` → `/de/werke/1`)
pub fn enforce_locale(url: &str, base_url: &str, locale_prefix: &str) -> String {
    let prefix = locale_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return url.to_string();
    }
    let (Ok(mut parsed), Ok(base)) = (Url::parse(url), Url::parse(base_url)) else {
        return url.to_string();
    };
    if parsed.host_str() != base.host_str() {
        return url.to_string();
    }
    let path = parsed.path().to_string();
    if path == prefix || path.starts_with(&format!("{}/", prefix)) {
        return url.to_string();
    }
    parsed.set_path(&format!("{}{}", prefix, path));
    parsed.to_string()
}

/// Last non-empty path segment of a unit URL
pub fn unit_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}

// ===== Nested list =====

fn find_toc_heading(doc: &Html) -> Option<ElementRef<'_>> {
    descendant_elements(doc.root_element()).find(|el| {
        let tag = tag_name(*el);
        if !is_heading_tag(&tag) {
            return false;
        }
        let text = normalize_for_match(&element_text(*el));
        TOC_HEADINGS.iter().any(|h| text.contains(h)) || text == "inhalt"
    })
}

/// First list after `heading` in document order
fn list_after<'a>(doc: &'a Html, heading: ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut passed = false;
    for el in descendant_elements(doc.root_element()) {
        if el.id() == heading.id() {
            passed = true;
            continue;
        }
        if passed
            && matches!(tag_name(el).as_str(), "ul" | "ol")
            && !el.ancestors().any(|a| a.id() == heading.id())
        {
            return Some(el);
        }
    }
    None
}

fn is_list(el: ElementRef<'_>) -> bool {
    matches!(tag_name(el).as_str(), "ul" | "ol")
}

fn list_items(list: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    child_elements(list).filter(|c| tag_name(*c) == "li").collect()
}

/// Text of a list item without its nested lists
fn own_text(li: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for child in li.children() {
        if ElementRef::wrap(child).is_some_and(is_list) {
            continue;
        }
        for node in child.descendants() {
            if let Node::Text(text) = node.value() {
                raw.push_str(text);
                raw.push(' ');
            }
        }
    }
    crate::html::collapse_whitespace(&raw)
}

/// First link of a list item outside its nested lists
fn own_link(li: ElementRef<'_>) -> Option<ElementRef<'_>> {
    for child in child_elements(li) {
        if is_list(child) {
            continue;
        }
        if tag_name(child) == "a" && child.value().attr("href").is_some() {
            return Some(child);
        }
        if let Some(a) = select_all(child, "a[href]").into_iter().next() {
            return Some(a);
        }
    }
    None
}

fn parse_nested_list(doc: &Html, base_url: &str, locale_prefix: &str) -> Vec<TocEntry> {
    let Some(heading) = find_toc_heading(doc) else {
        return Vec::new();
    };
    let Some(list) = list_after(doc, heading) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut stack: Vec<(ElementRef<'_>, u32)> =
        list_items(list).into_iter().rev().map(|li| (li, 1)).collect();

    while let Some((li, level)) = stack.pop() {
        let link = own_link(li);
        let label = link
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| own_text(li));

        let child_level = if label.is_empty() { level } else { level + 1 };
        if !label.is_empty() {
            let url = link
                .and_then(|a| a.value().attr("href"))
                .and_then(|h| resolve_url(base_url, h))
                .map(|u| enforce_locale(&u, base_url, locale_prefix));
            entries.push(TocEntry {
                level,
                label,
                has_content: url.is_some(),
                unit_id: url.as_deref().and_then(unit_id_from_url),
                url,
            });
        }

        let nested: Vec<_> = child_elements(li)
            .filter(|c| is_list(*c))
            .flat_map(list_items)
            .collect();
        for child in nested.into_iter().rev() {
            stack.push((child, child_level));
        }
    }

    entries
}

// ===== Synthetic division probing =====

/// Outcome of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Content,
    TooShort,
    NotFound,
}

/// Judge a probe response body
pub fn probe_verdict(body: &str, probe: &ProbeConfig) -> ProbeVerdict {
    let doc = Html::parse_document(body);
    let main_text = segment(&doc).main_text();
    let title = select_first(&doc, "title").map(element_text).unwrap_or_default();

    let haystack = normalize_for_match(&format!("{} {}", title, main_text));
    let not_found = probe
        .not_found_phrases
        .iter()
        .map(|p| normalize_for_match(p))
        .any(|p| !p.is_empty() && haystack.contains(&p));
    if not_found {
        return ProbeVerdict::NotFound;
    }
    if main_text.chars().count() < probe.min_content_chars {
        return ProbeVerdict::TooShort;
    }
    ProbeVerdict::Content
}

/// Probe `{base}/divisions/{n}` for `n = 1..=max_divisions`
///
/// The first missing, short or failing probe ends the sequence.
pub async fn probe_divisions(
    fetcher: &dyn Fetcher,
    version_url: &str,
    probe: &ProbeConfig,
) -> Result<(Vec<TocEntry>, HashMap<String, FetchedPage>)> {
    let base = version_url.trim_end_matches('/');
    let mut entries = Vec::new();
    let mut prefetched = HashMap::new();

    for n in 1..=probe.max_divisions {
        let url = format!("{}/divisions/{}", base, n);
        let page = match fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(url = %url, "Probe failed, stopping: {}", e);
                break;
            }
        };

        if !page.is_success() {
            debug!(url = %url, status = page.status, "Probe ended on status");
            break;
        }
        let verdict = probe_verdict(&page.body, probe);
        if verdict != ProbeVerdict::Content {
            debug!(url = %url, ?verdict, "Probe ended");
            break;
        }

        entries.push(TocEntry {
            level: 1,
            label: format!("Division {}", n),
            url: Some(url.clone()),
            has_content: true,
            unit_id: Some(n.to_string()),
        });
        prefetched.insert(url, page);
    }

    Ok((entries, prefetched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::fetch::HttpFetcher;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BASE: &str = "https://bkv.example.org/de/works/42/versions/7";

    #[test]
    fn test_descriptor_level_saturates() {
        let html = r#"<html><body><nav data-toc='[
            {"title": "Tief", "href": "divisions/1", "level": 99999999999},
            {"title": "Null", "href": "divisions/2", "level": 0}
        ]'></nav></body></html>"#;
        let (entries, _) = parse_toc(html, BASE, "/de").unwrap();
        let levels: Vec<_> = entries.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![u32::MAX, 1]);
    }

    #[test]
    fn test_descriptor_flattened_with_depth() {
        let html = r#"<html><body><nav data-toc='[
            {"title": "Vorwort", "href": "/works/42/versions/7/divisions/1"},
            {"title": "Erstes Buch", "children": [
                {"title": "Kapitel 1", "href": "divisions/3", "id": 3},
                {"title": "Kapitel 2", "url": "https://bkv.example.org/de/works/42/versions/7/divisions/4"}
            ]},
            {"label": "Anhang", "href": "/de/works/42/versions/7/divisions/5", "level": 1}
        ]'></nav></body></html>"#;

        let (entries, source) = parse_toc(html, BASE, "/de").unwrap();
        assert_eq!(source, TocSource::Descriptor);
        let summary: Vec<_> = entries.iter().map(|e| (e.level, e.label.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (1, "Vorwort"),
                (1, "Erstes Buch"),
                (2, "Kapitel 1"),
                (2, "Kapitel 2"),
                (1, "Anhang")
            ]
        );
        assert_eq!(
            entries[0].url.as_deref(),
            Some("https://bkv.example.org/de/works/42/versions/7/divisions/1")
        );
        assert!(!entries[1].has_content);
        assert_eq!(entries[2].unit_id.as_deref(), Some("3"));
        assert_eq!(entries[3].unit_id.as_deref(), Some("4"));
    }

    #[test]
    fn test_nested_list_after_heading() {
        let html = r#"<html><body>
            <ul class="menu"><li><a href="/de/home">Home</a></li></ul>
            <h3>Inhaltsangabe</h3>
            <div><ul>
                <li><a href="divisions/1">Vorwort</a></li>
                <li>Erster Teil
                    <ul>
                        <li><a href="divisions/2">Kapitel 1</a></li>
                        <li><a href="divisions/3">Kapitel 2</a>
                            <ol><li><a href="divisions/4">Abschnitt</a></li></ol>
                        </li>
                    </ul>
                </li>
                <li><a href="divisions/5">Anhang</a></li>
            </ul></div>
        </body></html>"#;

        let base = format!("{}/", BASE);
        let (entries, source) = parse_toc(html, &base, "/de").unwrap();
        assert_eq!(source, TocSource::NestedList);
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.level, e.label.as_str(), e.has_content))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "Vorwort", true),
                (1, "Erster Teil", false),
                (2, "Kapitel 1", true),
                (2, "Kapitel 2", true),
                (3, "Abschnitt", true),
                (1, "Anhang", true)
            ]
        );
        assert_eq!(
            entries[5].url.as_deref(),
            Some("https://bkv.example.org/de/works/42/versions/7/divisions/5")
        );
    }

    #[test]
    fn test_no_toc_markup() {
        assert!(parse_toc("<html><body><p>nothing</p></body></html>", BASE, "/de").is_none());
    }

    #[test]
    fn test_enforce_locale() {
        assert_eq!(
            enforce_locale("https://bkv.example.org/works/1", BASE, "/de"),
            "https://bkv.example.org/de/works/1"
        );
        assert_eq!(
            enforce_locale("https://bkv.example.org/de/works/1", BASE, "/de"),
            "https://bkv.example.org/de/works/1"
        );
        assert_eq!(
            enforce_locale("https://other.org/works/1", BASE, "/de"),
            "https://other.org/works/1"
        );
    }

    #[test]
    fn test_probe_verdict() {
        let probe = ProbeConfig::default();
        let long = format!("<html><body><p>{}</p></body></html>", "Wort ".repeat(40));
        assert_eq!(probe_verdict(&long, &probe), ProbeVerdict::Content);
        assert_eq!(
            probe_verdict("<html><body><p>kurz</p></body></html>", &probe),
            ProbeVerdict::TooShort
        );
        let missing = format!(
            "<html><head><title>Seite nicht gefunden</title></head><body><p>{}</p></body></html>",
            "Wort ".repeat(40)
        );
        assert_eq!(probe_verdict(&missing, &probe), ProbeVerdict::NotFound);
    }

    #[tokio::test]
    async fn test_probe_stops_at_missing_division() {
        let server = MockServer::start().await;
        let body = format!("<html><body><p>{}</p></body></html>", "Text ".repeat(50));
        for n in 1..=4 {
            Mock::given(method("GET"))
                .and(path(format!("/de/works/1/versions/2/divisions/{}", n)))
                .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/de/works/1/versions/2/divisions/5"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/de/works/1/versions/2/divisions/6"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .expect(0)
            .mount(&server)
            .await;

        let fetch = FetchConfig {
            requests_per_second: 100.0,
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&fetch, CancellationToken::new()).unwrap();
        let version = format!("{}/de/works/1/versions/2", server.uri());

        let resolved = resolve_toc(
            &fetcher,
            "<html><body><p>Kein Inhaltsverzeichnis</p></body></html>",
            &version,
            "/de",
            &ProbeConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(resolved.source, TocSource::Probe);
        assert_eq!(resolved.entries.len(), 4);
        assert!(resolved.entries.iter().all(|e| e.level == 1 && e.has_content));
        assert_eq!(resolved.entries[3].label, "Division 4");
        assert_eq!(resolved.prefetched.len(), 4);
    }
}
