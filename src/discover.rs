//! Version discovery from the paginated works index

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::html::{element_text, resolve_url, select_all, select_first};
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info};
use url::Url;

/// Version links and the next index page found on one index page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPage {
    pub versions: Vec<String>,
    pub next: Option<String>,
}

fn divisions_suffix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/divisions(?:/\d+)?/?$").ok()).as_ref()
}

/// Drop a trailing `/divisions` or `/divisions/{n}`
pub fn strip_divisions(url: &str) -> String {
    match divisions_suffix() {
        Some(re) => re.replace(url, "").into_owned(),
        None => url.to_string(),
    }
}

/// Path segment following `/works/`
pub fn work_slug_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    segments.find(|s| *s == "works")?;
    segments.next().filter(|s| !s.is_empty()).map(|s| s.to_string())
}

/// Collect version links tagged with `language_marker` from one index page
pub fn parse_index_page(html: &str, page_url: &str, language_marker: &str) -> IndexPage {
    let doc = Html::parse_document(html);
    let marker = language_marker.to_lowercase();
    let mut page = IndexPage::default();

    for li in select_all(doc.root_element(), "li") {
        let Some(small) = select_all(li, "small").into_iter().next() else {
            continue;
        };
        if !element_text(small).to_lowercase().contains(&marker) {
            continue;
        }
        let Some(href) = select_all(li, "a[href]")
            .into_iter()
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let Some(url) = resolve_url(page_url, href) else {
            continue;
        };
        if url.contains("/versions/") {
            page.versions.push(strip_divisions(&url));
        }
    }

    page.next = select_first(&doc, "a[rel~='next'][href]")
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_url(page_url, href));

    page
}

/// Walk the works index, following `rel="next"` until exhausted or `max_works` is reached
pub async fn discover_versions(
    fetcher: &dyn Fetcher,
    start_url: &str,
    language_marker: &str,
    max_works: Option<usize>,
) -> Result<Vec<String>> {
    info!(url = start_url, "Discovering versions");

    let mut discovered: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut next = Some(start_url.to_string());
    let limit_reached = |n: usize| max_works.is_some_and(|max| n >= max);

    while let Some(page_url) = next.take() {
        if limit_reached(discovered.len()) || !visited.insert(page_url.clone()) {
            break;
        }

        let page = fetcher.fetch_ok(&page_url).await?;
        let index = parse_index_page(&page.body, &page_url, language_marker);
        debug!(url = %page_url, found = index.versions.len(), "Parsed index page");

        for version in index.versions {
            if limit_reached(discovered.len()) {
                break;
            }
            if seen.insert(version.clone()) {
                debug!(url = %version, "Found version");
                discovered.push(version);
            }
        }
        next = index.next;
    }

    info!(count = discovered.len(), "Discovered versions");
    Ok(discovered)
}

/// Skip versions until the one whose work slug equals `slug`
pub fn resume_from(versions: Vec<String>, slug: &str) -> Vec<String> {
    let start = versions
        .iter()
        .position(|v| work_slug_from_url(v).as_deref() == Some(slug));
    match start {
        Some(i) => versions.into_iter().skip(i).collect(),
        None => Vec::new(),
    }
}
