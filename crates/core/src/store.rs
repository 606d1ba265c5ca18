use chrono::Utc;
use rusqlite::{params, Connection, ToSql};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{OpnoteError, Result};
use crate::model::{
    GeneratedReport, NewGeneratedReport, NewReport, ReportRecord, ReportSource, SearchQuery,
    SurgeonInputs,
};

const DEFAULT_SEARCH_LIMIT: usize = 100;

const REPORT_COLUMNS: &str =
    "id, procedure_type, specialty, report_name, report_text, keywords, source, is_deidentified, added_at";

#[derive(Clone)]
pub struct ReportStore {
    path: PathBuf,
}

impl ReportStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.init()?;
        Ok(store)
    }

    fn connection(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    pub fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                procedure_type TEXT NOT NULL,
                specialty TEXT NOT NULL,
                report_name TEXT,
                report_text TEXT NOT NULL,
                keywords TEXT,
                source TEXT NOT NULL,
                is_deidentified INTEGER NOT NULL DEFAULT 1,
                added_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS generated_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                procedure_type TEXT NOT NULL,
                surgeon_inputs TEXT NOT NULL,
                generated_report TEXT NOT NULL,
                user_rating INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reports_source ON reports(source);
            CREATE INDEX IF NOT EXISTS idx_reports_specialty ON reports(specialty);
            "#,
        )?;
        Ok(())
    }

    pub fn create(&self, report: &NewReport) -> Result<ReportRecord> {
        validate_new_report(report)?;
        let conn = self.connection()?;
        let added_at = Utc::now();
        conn.execute(
            "INSERT INTO reports (procedure_type, specialty, report_name, report_text, keywords, source, is_deidentified, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.procedure_type.trim(),
                report.specialty.trim(),
                report.report_name,
                report.report_text,
                report.keywords,
                report.source.as_str(),
                report.is_deidentified,
                added_at,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(ReportRecord {
            id,
            procedure_type: report.procedure_type.trim().to_string(),
            specialty: report.specialty.trim().to_string(),
            report_name: report.report_name.clone(),
            report_text: report.report_text.clone(),
            keywords: report.keywords.clone(),
            source: report.source,
            is_deidentified: report.is_deidentified,
            added_at,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<ReportRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_report(row)?)),
            None => Ok(None),
        }
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<ReportRecord>> {
        let conn = self.connection()?;
        let mut sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE 1=1");
        let mut bindings: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(specialty) = &query.specialty {
            sql.push_str(" AND specialty LIKE ?");
            bindings.push(Box::new(format!("%{specialty}%")));
        }
        if let Some(procedure_type) = &query.procedure_type {
            sql.push_str(" AND procedure_type LIKE ?");
            bindings.push(Box::new(format!("%{procedure_type}%")));
        }
        if let Some(keyword) = &query.keyword {
            sql.push_str(" AND (report_text LIKE ? OR keywords LIKE ?)");
            let pattern = format!("%{keyword}%");
            bindings.push(Box::new(pattern.clone()));
            bindings.push(Box::new(pattern));
        }
        if let Some(source) = &query.source {
            sql.push_str(" AND source = ?");
            bindings.push(Box::new(source.as_str().to_string()));
        }
        sql.push_str(" ORDER BY added_at DESC, id DESC LIMIT ? OFFSET ?");
        bindings.push(Box::new(query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT) as i64));
        bindings.push(Box::new(query.offset.unwrap_or(0) as i64));
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = bindings.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(refs.as_slice())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_report(row)?);
        }
        Ok(out)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.connection()?;
        let deleted = conn.execute("DELETE FROM reports WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn count_by_source(&self) -> Result<BTreeMap<ReportSource, u64>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT source, COUNT(*) FROM reports GROUP BY source ORDER BY source")?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let source = ReportSource::from_str(&raw)
                .ok_or_else(|| OpnoteError::Validation(format!("unknown source '{raw}'")))?;
            counts.insert(source, count as u64);
        }
        Ok(counts)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn all_deidentified(&self, limit: usize, offset: usize) -> Result<Vec<ReportRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE is_deidentified = 1 ORDER BY id ASC LIMIT ?1 OFFSET ?2"
        ))?;
        let mut rows = stmt.query(params![limit as i64, offset as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_report(row)?);
        }
        Ok(out)
    }

    pub fn create_generated(&self, report: &NewGeneratedReport) -> Result<GeneratedReport> {
        if report.procedure_type.trim().is_empty() {
            return Err(OpnoteError::Validation(
                "procedure_type is required".to_string(),
            ));
        }
        if report.generated_report.trim().is_empty() {
            return Err(OpnoteError::Validation(
                "generated_report must not be empty".to_string(),
            ));
        }
        let conn = self.connection()?;
        let inputs_json = serde_json::to_string(&report.surgeon_inputs)?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO generated_reports (procedure_type, surgeon_inputs, generated_report, user_rating, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            params![
                report.procedure_type.trim(),
                inputs_json,
                report.generated_report,
                created_at,
            ],
        )?;
        Ok(GeneratedReport {
            id: conn.last_insert_rowid(),
            procedure_type: report.procedure_type.trim().to_string(),
            surgeon_inputs: report.surgeon_inputs.clone(),
            generated_report: report.generated_report.clone(),
            user_rating: None,
            created_at,
        })
    }

    pub fn get_generated(&self, id: i64) -> Result<Option<GeneratedReport>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, procedure_type, surgeon_inputs, generated_report, user_rating, created_at
             FROM generated_reports WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => {
                let inputs_json: String = row.get(2)?;
                let surgeon_inputs: SurgeonInputs = serde_json::from_str(&inputs_json)?;
                Ok(Some(GeneratedReport {
                    id: row.get(0)?,
                    procedure_type: row.get(1)?,
                    surgeon_inputs,
                    generated_report: row.get(3)?,
                    user_rating: row.get(4)?,
                    created_at: row.get(5)?,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn rate_generated(&self, id: i64, rating: i64) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(OpnoteError::Validation(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        let conn = self.connection()?;
        let updated = conn.execute(
            "UPDATE generated_reports SET user_rating = ?1 WHERE id = ?2",
            params![rating, id],
        )?;
        if updated == 0 {
            return Err(OpnoteError::NotFound(id));
        }
        Ok(())
    }
}

fn validate_new_report(report: &NewReport) -> Result<()> {
    if report.procedure_type.trim().is_empty() {
        return Err(OpnoteError::Validation(
            "procedure_type is required".to_string(),
        ));
    }
    if report.specialty.trim().is_empty() {
        return Err(OpnoteError::Validation("specialty is required".to_string()));
    }
    if report.report_text.trim().is_empty() {
        return Err(OpnoteError::Validation(
            "report_text must not be empty".to_string(),
        ));
    }
    if report.source == ReportSource::OwnClinical && !report.is_deidentified {
        return Err(OpnoteError::Validation(
            "own-clinical reports must be de-identified".to_string(),
        ));
    }
    Ok(())
}

fn read_report(row: &rusqlite::Row<'_>) -> Result<ReportRecord> {
    let raw_source: String = row.get(6)?;
    let source = ReportSource::from_str(&raw_source)
        .ok_or_else(|| OpnoteError::Validation(format!("unknown source '{raw_source}'")))?;
    Ok(ReportRecord {
        id: row.get(0)?,
        procedure_type: row.get(1)?,
        specialty: row.get(2)?,
        report_name: row.get(3)?,
        report_text: row.get(4)?,
        keywords: row.get(5)?,
        source,
        is_deidentified: row.get(7)?,
        added_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_report(procedure: &str) -> NewReport {
        NewReport {
            procedure_type: procedure.to_string(),
            specialty: "General Surgery".to_string(),
            report_name: Some("sample".to_string()),
            report_text: "The abdomen was prepped and draped in the usual sterile fashion."
                .to_string(),
            keywords: Some("laparoscopy, abdomen".to_string()),
            source: ReportSource::OwnClinical,
            is_deidentified: true,
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> ReportStore {
        ReportStore::open(dir.path().join("reports.db")).unwrap()
    }

    #[test]
    fn create_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let created = store.create(&sample_report("Laparoscopic Appendectomy")).unwrap();
        assert!(created.id > 0);
        let fetched = store.get(created.id).unwrap().unwrap();
        assert_eq!(fetched.procedure_type, "Laparoscopic Appendectomy");
        assert_eq!(fetched.source, ReportSource::OwnClinical);
        assert!(fetched.is_deidentified);
        assert_eq!(fetched.added_at, created.added_at);
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        assert!(store.get(999).unwrap().is_none());
    }

    #[test]
    fn create_rejects_blank_fields() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let mut report = sample_report("  ");
        let err = store.create(&report).unwrap_err();
        assert!(matches!(err, OpnoteError::Validation(_)));
        report = sample_report("Colonoscopy");
        report.report_text = "   ".to_string();
        assert!(matches!(
            store.create(&report).unwrap_err(),
            OpnoteError::Validation(_)
        ));
    }

    #[test]
    fn create_rejects_unscrubbed_clinical_reports() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let mut report = sample_report("Colonoscopy");
        report.is_deidentified = false;
        assert!(matches!(
            store.create(&report).unwrap_err(),
            OpnoteError::Validation(_)
        ));
    }

    #[test]
    fn search_filters_and_paginates() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        for i in 0..5 {
            store
                .create(&sample_report(&format!("Appendectomy {i}")))
                .unwrap();
        }
        let mut corpus = sample_report("Total Knee Arthroplasty");
        corpus.specialty = "Orthopedic Surgery".to_string();
        corpus.source = ReportSource::ExternalCorpus;
        store.create(&corpus).unwrap();

        let hits = store
            .search(&SearchQuery {
                procedure_type: Some("Appendectomy".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 5);

        let page = store
            .search(&SearchQuery {
                procedure_type: Some("Appendectomy".to_string()),
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 2);
        // newest first, so offset 2 of five records 0..4 lands on "Appendectomy 2"
        assert_eq!(page[0].procedure_type, "Appendectomy 2");

        let by_source = store
            .search(&SearchQuery {
                source: Some(ReportSource::ExternalCorpus),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].specialty, "Orthopedic Surgery");
    }

    #[test]
    fn free_text_search_matches_body_and_keywords() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let mut body_only = sample_report("Laparoscopic Appendectomy");
        body_only.report_text =
            "The mesoappendix was divided with the harmonic scalpel.".to_string();
        body_only.keywords = None;
        let body_hit = store.create(&body_only).unwrap();

        let mut keyword_only = sample_report("Colonoscopy");
        keyword_only.keywords = Some("screening, polypectomy".to_string());
        let keyword_hit = store.create(&keyword_only).unwrap();

        let hits = store
            .search(&SearchQuery {
                keyword: Some("mesoappendix".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, body_hit.id);

        let hits = store
            .search(&SearchQuery {
                keyword: Some("polypectomy".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, keyword_hit.id);
    }

    #[test]
    fn delete_reports_outcome() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let created = store.create(&sample_report("Hernia Repair")).unwrap();
        assert!(store.delete(created.id).unwrap());
        assert!(!store.delete(created.id).unwrap());
        assert!(store.get(created.id).unwrap().is_none());
    }

    #[test]
    fn counts_group_by_source() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.create(&sample_report("Appendectomy")).unwrap();
        let mut corpus = sample_report("Cholecystectomy");
        corpus.source = ReportSource::ExternalCorpus;
        store.create(&corpus).unwrap();
        store.create(&corpus).unwrap();
        let counts = store.count_by_source().unwrap();
        assert_eq!(counts.get(&ReportSource::OwnClinical), Some(&1));
        assert_eq!(counts.get(&ReportSource::ExternalCorpus), Some(&2));
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn all_deidentified_skips_unscrubbed_rows() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.create(&sample_report("Appendectomy")).unwrap();
        let mut raw = sample_report("Bronchoscopy");
        raw.source = ReportSource::ExternalCorpus;
        raw.is_deidentified = false;
        store.create(&raw).unwrap();
        let rows = store.all_deidentified(100, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].procedure_type, "Appendectomy");
    }

    #[test]
    fn generated_reports_roundtrip_and_rate() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let inputs = SurgeonInputs {
            procedure_type: "Laparoscopic Cholecystectomy".to_string(),
            preop_diagnosis: "Cholelithiasis".to_string(),
            surgeon_name: "[NAME]".to_string(),
            ..Default::default()
        };
        let created = store
            .create_generated(&NewGeneratedReport {
                procedure_type: inputs.procedure_type.clone(),
                surgeon_inputs: inputs.clone(),
                generated_report: "PREOPERATIVE DIAGNOSIS: Cholelithiasis".to_string(),
            })
            .unwrap();
        assert!(created.user_rating.is_none());

        let fetched = store.get_generated(created.id).unwrap().unwrap();
        assert_eq!(fetched.surgeon_inputs, inputs);

        store.rate_generated(created.id, 4).unwrap();
        let rated = store.get_generated(created.id).unwrap().unwrap();
        assert_eq!(rated.user_rating, Some(4));

        assert!(matches!(
            store.rate_generated(created.id, 6).unwrap_err(),
            OpnoteError::Validation(_)
        ));
        assert!(matches!(
            store.rate_generated(9999, 3).unwrap_err(),
            OpnoteError::NotFound(9999)
        ));
    }
}
