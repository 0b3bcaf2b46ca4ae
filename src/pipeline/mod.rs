//! Crawl orchestration
//!
//! One task drives discovery and then processes versions one after another,
//! and the units of each version in TOC order. Entities of the Work in
//! flight live only in this task and are persisted in one go once every
//! unit has been visited.

pub mod assemble;
pub mod extract;

use crate::config::Config;
use crate::discover::{discover_versions, resume_from};
use crate::error::{Error, Result};
use crate::fetch::{FetchedPage, Fetcher};
use crate::model::WorkBundle;
use crate::progress::{advance_progress, finish_progress, start_progress};
use crate::report::{write_qa_csv, QaRow, RunSummary};
use crate::store::{persist_bundle, PersistStats, Store};
use crate::toc::{resolve_toc, unit_id_from_url, TocEntry, TocSource};
use crate::version::parse_version;
use assemble::{assemble, UnitOutcome, UnitRecord, WorkSource};
use extract::extract_unit;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of processing one version
#[derive(Debug, Clone)]
pub struct VersionOutcome {
    pub bundle: WorkBundle,
    pub row: QaRow,
    pub persisted: PersistStats,
}

/// Drives discovery, extraction and persistence
pub struct Harvester {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    cancel: CancellationToken,
}

impl Harvester {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
            cancel,
        }
    }

    /// Full crawl: discover versions, process each, write the QA report
    ///
    /// Only a discovery failure or a configuration error ends the run with
    /// an error; cancellation stops it cleanly.
    pub async fn run(&self, resume: Option<&str>) -> Result<RunSummary> {
        let source = &self.config.source;
        let mut versions = discover_versions(
            self.fetcher.as_ref(),
            &source.start_url,
            &source.language_marker,
            source.max_works,
        )
        .await?;

        if let Some(slug) = resume {
            versions = resume_from(versions, slug);
            info!(slug, remaining = versions.len(), "Resuming");
        }

        let mut summary = RunSummary::default();
        for (i, version_url) in versions.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Cancelled, stopping before {}", version_url);
                break;
            }
            info!(url = %version_url, "Processing version {}/{}", i + 1, versions.len());

            match self.process_version(version_url).await {
                Ok(outcome) => summary.record_ok(outcome.row),
                Err(Error::Cancelled) => {
                    warn!(url = %version_url, "Cancelled, in-flight work discarded");
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(url = %version_url, "Version failed: {}", e);
                    summary.record_failure();
                }
            }
        }

        write_qa_csv(Path::new(&self.config.report.qa_csv), &summary.rows)?;
        summary.log();
        Ok(summary)
    }

    /// Process a single version URL end to end
    pub async fn process_version(&self, version_url: &str) -> Result<VersionOutcome> {
        let root = self.fetcher.fetch_ok(version_url).await?;
        let meta = parse_version(&root.body);
        debug!(author = %meta.author_name, title = %meta.title, "Parsed version metadata");

        let resolved = resolve_toc(
            self.fetcher.as_ref(),
            &root.body,
            version_url,
            &self.config.source.locale_prefix,
            &self.config.probe,
        )
        .await?;

        let mut pages: HashMap<String, FetchedPage> = resolved.prefetched;
        let mut source_kind = resolved.source;
        let mut entries = resolved.entries;
        if entries.is_empty() {
            // No units at all: the root page is the only content
            let problem = Error::Structural(format!("no content units in {}", version_url));
            warn!("{}, using the version page itself", problem);
            entries.push(TocEntry {
                level: 1,
                label: meta.title.clone(),
                url: Some(version_url.to_string()),
                has_content: true,
                unit_id: unit_id_from_url(version_url),
            });
            pages.insert(version_url.to_string(), root);
            source_kind = TocSource::None;
        }

        let units = self.fetch_units(entries, &mut pages, &meta.title).await?;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let source = WorkSource {
            meta: &meta,
            version_url,
            language: &self.config.source.language,
        };
        let assembled = assemble(&source, &units);
        for (unit, class) in units.iter().zip(&assembled.classifications) {
            debug!(unit = %unit.entry.label, role = %class.role, reasons = ?class.reasons, "Classified");
        }

        let persisted = persist_bundle(self.store.as_ref(), &assembled.bundle).await?;
        let row = QaRow::new(
            &assembled.bundle,
            &assembled.summary,
            source_kind,
            assembled.units_failed,
        );
        info!(
            work_slug = %row.work_slug,
            sections = row.sections,
            passages = row.passages,
            notes = row.notes,
            rows = persisted.total(),
            "Persisted work"
        );

        Ok(VersionOutcome {
            bundle: assembled.bundle,
            row,
            persisted,
        })
    }

    /// Fetch and extract every unit in TOC order
    ///
    /// A failed unit is recorded and skipped; cancellation aborts the Work.
    async fn fetch_units(
        &self,
        entries: Vec<TocEntry>,
        pages: &mut HashMap<String, FetchedPage>,
        title: &str,
    ) -> Result<Vec<UnitRecord>> {
        let progress = start_progress(entries.len(), title);
        let mut units = Vec::with_capacity(entries.len());

        for entry in entries {
            let outcome = match entry.url.as_deref() {
                Some(url) if entry.has_content => self.fetch_unit(url, pages).await?,
                _ => UnitOutcome::Branch,
            };
            if let UnitOutcome::Failed(reason) = &outcome {
                warn!(unit = %entry.label, url = ?entry.url, "Unit skipped: {}", reason);
            }
            units.push(UnitRecord { entry, outcome });
            advance_progress(&progress);
        }

        finish_progress(progress);
        Ok(units)
    }

    async fn fetch_unit(
        &self,
        url: &str,
        pages: &mut HashMap<String, FetchedPage>,
    ) -> Result<UnitOutcome> {
        let page = match pages.get(url) {
            Some(page) => page.clone(),
            None => match self.fetcher.fetch(url).await {
                Ok(page) => {
                    pages.insert(url.to_string(), page.clone());
                    page
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(UnitOutcome::Failed(e.to_string())),
            },
        };

        if !page.is_success() {
            return Ok(UnitOutcome::Failed(format!("HTTP {}", page.status)));
        }
        Ok(UnitOutcome::Extracted(extract_unit(&page.body, url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use crate::model::SectionRole;
    use crate::store::{NullStore, SqliteStore, Table};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VERSION: &str = "/de/works/7/versions/9";

    fn test_config() -> Config {
        let mut config = Config::default();
        config.fetch.requests_per_second = 200.0;
        config.fetch.max_attempts = 2;
        config.fetch.initial_backoff_ms = 1;
        config.fetch.max_backoff_ms = 2;
        config.fetch.jitter = 0.0;
        config
    }

    fn prose(words: usize) -> String {
        format!("<html><body><div><p>{}</p></div></body></html>", "Wort ".repeat(words))
    }

    fn root_with_toc(items: &[(&str, &str)]) -> String {
        let list: String = items
            .iter()
            .map(|(n, label)| format!("<li><a href=\"{}/divisions/{}\">{}</a></li>", VERSION, n, label))
            .collect();
        format!(
            "<html><body><h2>Ambrosius von Mailand (340-397)</h2>\
             <h1>Der Tod ein Gut (De bono mortis)</h1>\
             <h3>Inhaltsangabe</h3><ul>{}</ul></body></html>",
            list
        )
    }

    async fn mount_page(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    fn harvester(
        config: Config,
        store: Arc<dyn Store>,
        cancel: CancellationToken,
    ) -> Harvester {
        let fetcher = HttpFetcher::new(&config.fetch, cancel.clone()).unwrap();
        Harvester::new(config, Arc::new(fetcher), store, cancel)
    }

    #[tokio::test]
    async fn test_nested_toc_roles_and_idempotent_persistence() {
        let server = MockServer::start().await;
        let root = root_with_toc(&[("1", "Vorwort"), ("2", "Erstes Buch"), ("3", "Anhang")]);
        mount_page(&server, VERSION, 200, root).await;
        mount_page(&server, &format!("{}/divisions/1", VERSION), 200, prose(60)).await;
        mount_page(&server, &format!("{}/divisions/2", VERSION), 200, prose(900)).await;
        mount_page(&server, &format!("{}/divisions/3", VERSION), 200, prose(120)).await;

        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let h = harvester(test_config(), store.clone(), CancellationToken::new());
        let url = format!("{}{}", server.uri(), VERSION);

        let first = h.process_version(&url).await.unwrap();
        let roles: Vec<_> = first.bundle.sections.iter().map(|s| s.role).collect();
        assert_eq!(
            roles,
            vec![SectionRole::Preface, SectionRole::MainText, SectionRole::Appendix]
        );
        assert_eq!(first.row.toc_source, "nested-list");

        let mut counts = Vec::new();
        for table in Table::ALL {
            counts.push(store.count(table).await.unwrap());
        }

        let second = h.process_version(&url).await.unwrap();
        assert_eq!(first.bundle.authors[0].id, second.bundle.authors[0].id);
        assert_eq!(first.bundle.works[0].id, second.bundle.works[0].id);
        for (table, before) in Table::ALL.iter().zip(counts) {
            assert_eq!(store.count(*table).await.unwrap(), before, "{} grew", table);
        }
        assert_eq!(store.count(Table::Sections).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_probed_divisions_become_level_one_sections() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            VERSION,
            200,
            "<html><body><h1>Basilius (330-379)</h1><h2>Homilien (Homiliae)</h2></body></html>"
                .to_string(),
        )
        .await;
        for n in 1..=4 {
            Mock::given(method("GET"))
                .and(path(format!("{}/divisions/{}", VERSION, n)))
                .respond_with(ResponseTemplate::new(200).set_body_string(prose(50)))
                .expect(1)
                .mount(&server)
                .await;
        }
        mount_page(
            &server,
            &format!("{}/divisions/5", VERSION),
            404,
            "not found".to_string(),
        )
        .await;

        let h = harvester(test_config(), Arc::new(NullStore), CancellationToken::new());
        let url = format!("{}{}", server.uri(), VERSION);
        let outcome = h.process_version(&url).await.unwrap();

        assert_eq!(outcome.bundle.sections.len(), 4);
        assert!(outcome.bundle.sections.iter().all(|s| s.level == 1 && s.parent_id.is_none()));
        assert_eq!(outcome.bundle.passages.len(), 4);
        assert_eq!(outcome.row.toc_source, "probe");
    }

    #[tokio::test]
    async fn test_superscript_footnote_end_to_end() {
        let server = MockServer::start().await;
        mount_page(&server, VERSION, 200, root_with_toc(&[("1", "Kapitel 1")])).await;
        mount_page(
            &server,
            &format!("{}/divisions/1", VERSION),
            200,
            "<html><body><div><p>Hier steht ein text¹ mit Anmerkung.</p>\
             <p>Footnotes: 1. note text</p></div></body></html>"
                .to_string(),
        )
        .await;

        let h = harvester(test_config(), Arc::new(NullStore), CancellationToken::new());
        let url = format!("{}{}", server.uri(), VERSION);
        let bundle = h.process_version(&url).await.unwrap().bundle;

        assert_eq!(bundle.notes.len(), 1);
        assert_eq!(bundle.notes[0].note_key, "1:1");
        assert_eq!(bundle.notes[0].plain_text, "note text");
        assert_eq!(bundle.note_links.len(), 1);
        let link = &bundle.note_links[0];
        assert_eq!(link.note_id, bundle.notes[0].id);
        assert_eq!(link.origin_html_anchor, "1");
        assert!(link.context_snippet.contains("text"));
        assert_eq!(link.origin_passage_id, bundle.passages[0].id);
    }

    #[tokio::test]
    async fn test_descriptor_branch_without_content_is_not_fetched() {
        let server = MockServer::start().await;
        let root = format!(
            "<html><body><h2>Ambrosius von Mailand (340-397)</h2><h1>Der Tod ein Gut</h1>\
             <nav data-toc='[\
               {{\"title\": \"Erstes Buch\", \"href\": \"{v}/divisions/1\", \"has_content\": false, \"children\": [\
                 {{\"title\": \"Kapitel 1\", \"href\": \"{v}/divisions/2\"}}\
               ]}}\
             ]'></nav></body></html>",
            v = VERSION
        );
        mount_page(&server, VERSION, 200, root).await;
        Mock::given(method("GET"))
            .and(path(format!("{}/divisions/1", VERSION)))
            .respond_with(ResponseTemplate::new(200).set_body_string(prose(300)))
            .expect(0)
            .mount(&server)
            .await;
        mount_page(&server, &format!("{}/divisions/2", VERSION), 200, prose(300)).await;

        let h = harvester(test_config(), Arc::new(NullStore), CancellationToken::new());
        let url = format!("{}{}", server.uri(), VERSION);
        let outcome = h.process_version(&url).await.unwrap();

        assert_eq!(outcome.row.toc_source, "descriptor");
        let sections = &outcome.bundle.sections;
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].parent_id, Some(sections[0].id));
        assert_eq!(outcome.bundle.passages.len(), 1);
        assert_eq!(outcome.bundle.passages[0].section_id, sections[1].id);
        assert_eq!(outcome.row.units_failed, 0);
    }

    #[tokio::test]
    async fn test_inline_footnotes_are_not_body_text() {
        let server = MockServer::start().await;
        mount_page(&server, VERSION, 200, root_with_toc(&[("1", "Kapitel 1")])).await;
        mount_page(
            &server,
            &format!("{}/divisions/1", VERSION),
            200,
            "<html><body><div><p>Hier steht ein text¹ von 20 m² mit Anmerkung. \
             Fußnoten: 1. note text</p></div></body></html>"
                .to_string(),
        )
        .await;

        let h = harvester(test_config(), Arc::new(NullStore), CancellationToken::new());
        let url = format!("{}{}", server.uri(), VERSION);
        let bundle = h.process_version(&url).await.unwrap().bundle;

        assert_eq!(bundle.passages.len(), 1);
        let passage = &bundle.passages[0];
        assert_eq!(passage.plain_text, "Hier steht ein text von 20 m² mit Anmerkung.");
        assert!(!passage.html.contains("note text"));
        assert_eq!(bundle.notes.len(), 1);
        assert_eq!(bundle.notes[0].plain_text, "note text");
        assert_eq!(bundle.note_links.len(), 1);
        assert_eq!(
            bundle.note_links[0].position_char,
            Some("Hier steht ein text".chars().count())
        );
    }

    #[tokio::test]
    async fn test_version_without_units_uses_root_page() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            VERSION,
            200,
            format!(
                "<html><body><h2>Basilius (330-379)</h2><h1>Brief an Gregor</h1><div><p>{}</p></div></body></html>",
                "Wort ".repeat(200)
            ),
        )
        .await;

        let h = harvester(test_config(), Arc::new(NullStore), CancellationToken::new());
        let url = format!("{}{}", server.uri(), VERSION);
        let outcome = h.process_version(&url).await.unwrap();

        assert_eq!(outcome.row.toc_source, "none");
        assert_eq!(outcome.bundle.sections.len(), 1);
        assert_eq!(outcome.bundle.passages.len(), 1);
        assert_eq!(outcome.row.units_failed, 0);
    }

    #[tokio::test]
    async fn test_failed_unit_is_skipped() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            VERSION,
            200,
            root_with_toc(&[("1", "Kapitel 1"), ("2", "Kapitel 2")]),
        )
        .await;
        mount_page(&server, &format!("{}/divisions/1", VERSION), 200, prose(300)).await;
        mount_page(&server, &format!("{}/divisions/2", VERSION), 500, String::new()).await;

        let h = harvester(test_config(), Arc::new(NullStore), CancellationToken::new());
        let url = format!("{}{}", server.uri(), VERSION);
        let outcome = h.process_version(&url).await.unwrap();

        assert_eq!(outcome.bundle.sections.len(), 2);
        assert_eq!(outcome.bundle.passages.len(), 1);
        assert_eq!(outcome.row.units_failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_version_writes_nothing() {
        let server = MockServer::start().await;
        mount_page(&server, VERSION, 200, root_with_toc(&[("1", "Kapitel 1")])).await;

        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let h = harvester(test_config(), store.clone(), cancel);
        let url = format!("{}{}", server.uri(), VERSION);

        let err = h.process_version(&url).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(store.count(Table::Works).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_discovers_and_writes_report() {
        let server = MockServer::start().await;
        let index = format!(
            "<html><body><ul>\
             <li><a href=\"{}/divisions\">Der Tod ein Gut</a> <small>Übersetzung (Deutsch)</small></li>\
             <li><a href=\"/de/works/8/versions/1\">Other</a> <small>English</small></li>\
             </ul></body></html>",
            VERSION
        );
        mount_page(&server, "/de/works", 200, index).await;
        mount_page(&server, VERSION, 200, root_with_toc(&[("1", "Kapitel 1")])).await;
        mount_page(&server, &format!("{}/divisions/1", VERSION), 200, prose(300)).await;

        let tmp = TempDir::new().unwrap();
        let mut config = test_config();
        config.source.start_url = format!("{}/de/works", server.uri());
        config.report.qa_csv = tmp.path().join("qa.csv").display().to_string();

        let h = harvester(config.clone(), Arc::new(NullStore), CancellationToken::new());
        let summary = h.run(None).await.unwrap();

        assert_eq!(summary.works_ok, 1);
        assert_eq!(summary.works_failed, 0);
        let csv = std::fs::read_to_string(&config.report.qa_csv).unwrap();
        assert!(csv.contains("ambrosius-von-mailand-der-tod-ein-gut-de"));
    }
}
