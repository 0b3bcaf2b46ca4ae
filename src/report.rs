//! Per-work QA rows and the end-of-run summary

use crate::classify::WorkSummary;
use crate::error::Result;
use crate::model::{SectionRole, WorkBundle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One CSV row per processed Work
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaRow {
    pub work_slug: String,
    pub toc_source: String,
    pub sections: usize,
    pub passages: usize,
    pub verses: usize,
    pub notes: usize,
    pub note_links: usize,
    pub units_failed: usize,
    pub role_introduction: usize,
    pub role_preface: usize,
    pub role_main_text: usize,
    pub role_commentary: usize,
    pub role_notes: usize,
    pub role_appendix: usize,
    pub dominant_role: String,
    pub has_introduction: bool,
    pub has_appendix: bool,
    pub has_commentary: bool,
}

impl QaRow {
    pub fn new(
        bundle: &WorkBundle,
        summary: &WorkSummary,
        toc_source: impl ToString,
        units_failed: usize,
    ) -> Self {
        Self {
            work_slug: bundle.work().map(|w| w.work_slug.clone()).unwrap_or_default(),
            toc_source: toc_source.to_string(),
            sections: bundle.sections.len(),
            passages: bundle.passages.len(),
            verses: bundle.verses.len(),
            notes: bundle.notes.len(),
            note_links: bundle.note_links.len(),
            units_failed,
            role_introduction: summary.count(SectionRole::Introduction),
            role_preface: summary.count(SectionRole::Preface),
            role_main_text: summary.count(SectionRole::MainText),
            role_commentary: summary.count(SectionRole::Commentary),
            role_notes: summary.count(SectionRole::Notes),
            role_appendix: summary.count(SectionRole::Appendix),
            dominant_role: summary
                .dominant_role
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
            has_introduction: summary.has_introduction,
            has_appendix: summary.has_appendix,
            has_commentary: summary.has_commentary,
        }
    }
}

/// Write all rows to `path`, replacing any previous report
pub fn write_qa_csv(path: &Path, rows: &[QaRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Wrote QA report");
    Ok(())
}

/// Outcome counters of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub works_ok: usize,
    pub works_failed: usize,
    pub rows: Vec<QaRow>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            works_ok: 0,
            works_failed: 0,
            rows: Vec::new(),
        }
    }
}

impl RunSummary {
    pub fn record_ok(&mut self, row: QaRow) {
        self.works_ok += 1;
        self.rows.push(row);
    }

    pub fn record_failure(&mut self) {
        self.works_failed += 1;
    }

    pub fn log(&self) {
        let elapsed = Utc::now() - self.started_at;
        info!(
            works_ok = self.works_ok,
            works_failed = self.works_failed,
            elapsed_secs = elapsed.num_seconds(),
            "Run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_qa_csv_written_with_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("qa.csv");
        let summary = WorkSummary::from_roles(&[
            SectionRole::Preface,
            SectionRole::MainText,
            SectionRole::MainText,
        ]);
        let row = QaRow::new(&WorkBundle::default(), &summary, "probe", 1);
        assert_eq!(row.dominant_role, "main_text");
        assert_eq!(row.role_main_text, 2);

        write_qa_csv(&path, &[row]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("work_slug,toc_source,sections"));
        assert!(header.contains("has_commentary"));
        let data = lines.next().unwrap();
        assert!(data.contains("probe"));
        assert!(data.contains("main_text"));
    }

    #[test]
    fn test_run_summary_counts() {
        let mut run = RunSummary::default();
        run.record_failure();
        run.record_ok(QaRow::new(
            &WorkBundle::default(),
            &WorkSummary::from_roles(&[]),
            "none",
            0,
        ));
        assert_eq!((run.works_ok, run.works_failed), (1, 1));
        run.log();
    }
}
