use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use walkdir::WalkDir;

use opnote_core::{DeidGate, NewReport, OpnoteError, ReportRecord, ReportStore, ReportSource, Result};
use opnote_index::{RebuildStats, VectorIndex};
use opnote_llm::{OcrClient, OcrOutcome};

use crate::extract::{extract_procedure_type, extract_specialty};

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];
const PDF_EXTENSION: &str = "pdf";
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const MIN_TEXT_LEN: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct AdmitOptions {
    pub procedure_type: Option<String>,
    pub specialty: Option<String>,
    pub report_name: Option<String>,
    pub keywords: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdmittedReport {
    pub record: ReportRecord,
    pub found_phi: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<(String, String)>,
}

/// Owns the record store, the vector index, and the de-identification
/// gate, and keeps the first two consistent: every index mutation is
/// strictly downstream of a store mutation, serialized behind one write
/// gate. Reads and index queries never touch the gate.
#[derive(Clone)]
pub struct IngestPipeline {
    store: ReportStore,
    index: VectorIndex,
    gate: DeidGate,
    write_gate: Arc<Mutex<()>>,
}

impl IngestPipeline {
    pub fn new(store: ReportStore, index: VectorIndex, gate: DeidGate) -> Self {
        Self {
            store,
            index,
            gate,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn gate(&self) -> &DeidGate {
        &self.gate
    }

    /// Scrub, store, index, in that order and only that order. The
    /// gate runs before any write and a gate error aborts the whole
    /// attempt. An index failure after the store write is reported as an
    /// IndexError naming the stored id; the divergence is repaired by an
    /// explicit rebuild, never silently here.
    pub fn admit_text(&self, raw_text: &str, opts: &AdmitOptions) -> Result<AdmittedReport> {
        let scrubbed = self.gate.scrub(raw_text)?;
        self.admit_clean(&scrubbed.clean, scrubbed.found_phi, ReportSource::OwnClinical, opts)
    }

    fn admit_clean(
        &self,
        clean_text: &str,
        found_phi: bool,
        source: ReportSource,
        opts: &AdmitOptions,
    ) -> Result<AdmittedReport> {
        let procedure_type = opts
            .procedure_type
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| extract_procedure_type(clean_text));
        let specialty = opts
            .specialty
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| extract_specialty(clean_text));
        let _guard = self.write_gate.lock();
        let record = self.store.create(&NewReport {
            procedure_type,
            specialty,
            report_name: opts.report_name.clone(),
            report_text: clean_text.to_string(),
            keywords: opts.keywords.clone(),
            source,
            is_deidentified: true,
        })?;
        if let Err(err) = self.index.upsert(
            record.id,
            &record.report_text,
            &record.procedure_type,
            &record.specialty,
        ) {
            return Err(OpnoteError::Index(format!(
                "report {} was stored but not indexed ({err}); run a rebuild to reconcile",
                record.id
            )));
        }
        Ok(AdmittedReport { record, found_phi })
    }

    /// Removes the record and its index entry in one gated operation. A
    /// stray index entry is removed even when the record is already gone.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let _guard = self.write_gate.lock();
        let deleted = self.store.delete(id)?;
        self.index.delete(id)?;
        Ok(deleted)
    }

    /// Holds the write gate for the whole rebuild so creates and deletes
    /// queue behind it; readers are unaffected and see the old index
    /// until the atomic swap.
    pub fn rebuild(&self) -> Result<RebuildStats> {
        let _guard = self.write_gate.lock();
        self.index.rebuild_from(&self.store)
    }

    /// Bulk entrypoint over `<root>/raw/`: per file, extract text (direct
    /// read, PDF text layer, or fail-soft OCR), scrub, admit; the
    /// de-identified copy lands in `<root>/deid/` and the original moves
    /// to `<root>/imported/`. One bad file never aborts the batch.
    pub fn import_dir(&self, ocr: &OcrClient, root: &Path) -> Result<ImportSummary> {
        let raw_dir = root.join("raw");
        let deid_dir = root.join("deid");
        let imported_dir = root.join("imported");
        for dir in [&raw_dir, &deid_dir, &imported_dir] {
            fs::create_dir_all(dir)?;
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&raw_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort_by_key(|path| path.file_name().map(|n| n.to_ascii_lowercase()));

        let mut summary = ImportSummary {
            total: files.len(),
            ..Default::default()
        };
        for path in files {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.import_one(ocr, &path, &deid_dir, &imported_dir) {
                Ok(Some(record)) => {
                    info!(id = record.id, file = %filename, "imported report");
                    summary.succeeded += 1;
                }
                Ok(None) => {
                    summary.skipped += 1;
                }
                Err(err) => {
                    warn!(file = %filename, %err, "import failed; continuing with the batch");
                    summary.failed += 1;
                    summary.failures.push((filename, err.to_string()));
                }
            }
        }
        Ok(summary)
    }

    /// Ok(None) means the file was skipped (unsupported extension).
    fn import_one(
        &self,
        ocr: &OcrClient,
        path: &Path,
        deid_dir: &Path,
        imported_dir: &Path,
    ) -> Result<Option<ReportRecord>> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let raw_text = if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            String::from_utf8_lossy(&fs::read(path)?).into_owned()
        } else if ext == PDF_EXTENSION {
            pdf_extract::extract_text(path).map_err(|err| {
                OpnoteError::Validation(format!("failed to read pdf text layer: {err}"))
            })?
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            match ocr.extract_image(&fs::read(path)?) {
                OcrOutcome::Text(text) => text,
                OcrOutcome::Failed { reason } => {
                    return Err(OpnoteError::Validation(format!("ocr failed: {reason}")))
                }
            }
        } else {
            return Ok(None);
        };

        if raw_text.trim().chars().count() < MIN_TEXT_LEN {
            return Err(OpnoteError::Validation(
                "extracted text too short or empty".to_string(),
            ));
        }

        // fail-closed: nothing is written unless the gate succeeds
        let scrubbed = self.gate.scrub(&raw_text)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        fs::write(deid_dir.join(format!("{stem}.txt")), &scrubbed.clean)?;

        let admitted = self.admit_clean(
            &scrubbed.clean,
            scrubbed.found_phi,
            ReportSource::OwnClinical,
            &AdmitOptions {
                report_name: Some(stem.clone()),
                ..Default::default()
            },
        )?;

        let mut target = imported_dir.join(path.file_name().unwrap_or_default());
        let mut counter = 1;
        while target.exists() {
            target = imported_dir.join(format!("{stem}_{counter}.{ext}"));
            counter += 1;
        }
        fs::rename(path, target)?;
        Ok(Some(admitted.record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opnote_core::SearchQuery;
    use opnote_index::{EmbeddingClient, QueryFilters};
    use tempfile::tempdir;

    fn pipeline(dir: &tempfile::TempDir) -> IngestPipeline {
        let store = ReportStore::open(dir.path().join("reports.db")).unwrap();
        let index = VectorIndex::open(dir.path().join("index"), EmbeddingClient::hash()).unwrap();
        IngestPipeline::new(store, index, DeidGate::pattern())
    }

    const SAMPLE_NOTE: &str = "PROCEDURE PERFORMED: Laparoscopic Appendectomy\n\
        Patient: Jane Doe, MRN: 5551234.\n\
        The abdomen was insufflated and the appendix was removed without difficulty. \
        Hemostasis was confirmed and the ports were closed.";

    #[test]
    fn admit_scrubs_extracts_and_indexes() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let admitted = pipeline
            .admit_text(SAMPLE_NOTE, &AdmitOptions::default())
            .unwrap();
        assert!(admitted.found_phi);
        assert_eq!(admitted.record.procedure_type, "Laparoscopic Appendectomy");
        assert_eq!(admitted.record.specialty, "General Surgery");
        assert!(!admitted.record.report_text.contains("Jane"));
        assert!(!admitted.record.report_text.contains("5551234"));
        assert!(pipeline.index().contains(admitted.record.id));
    }

    #[test]
    fn gate_failure_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(dir.path().join("reports.db")).unwrap();
        let index = VectorIndex::open(dir.path().join("index"), EmbeddingClient::hash()).unwrap();
        let broken_gate = DeidGate::http(
            "http://127.0.0.1:1/scrub",
            std::time::Duration::from_millis(200),
        )
        .unwrap();
        let pipeline = IngestPipeline::new(store, index, broken_gate);
        let err = pipeline
            .admit_text(SAMPLE_NOTE, &AdmitOptions::default())
            .unwrap_err();
        assert!(matches!(err, OpnoteError::PhiGate(_)));
        assert_eq!(pipeline.store().count().unwrap(), 0);
        assert_eq!(pipeline.index().len(), 0);
    }

    #[test]
    fn delete_removes_both_sides() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let admitted = pipeline
            .admit_text(SAMPLE_NOTE, &AdmitOptions::default())
            .unwrap();
        let id = admitted.record.id;
        assert!(pipeline.delete(id).unwrap());
        assert!(pipeline.store().get(id).unwrap().is_none());
        assert!(!pipeline.index().contains(id));
        let hits = pipeline
            .index()
            .query("laparoscopic appendectomy", 5, &QueryFilters::default())
            .unwrap();
        assert!(hits.iter().all(|hit| hit.id != id));
        // second delete reports missing but stays consistent
        assert!(!pipeline.delete(id).unwrap());
    }

    #[test]
    fn referential_invariant_holds_after_create_delete_rebuild() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let a = pipeline
            .admit_text(SAMPLE_NOTE, &AdmitOptions::default())
            .unwrap()
            .record
            .id;
        let b = pipeline
            .admit_text(
                "OPERATION: Laparoscopic Cholecystectomy\nThe gallbladder was dissected \
                 free of the liver bed and removed in a specimen bag without incident.",
                &AdmitOptions::default(),
            )
            .unwrap()
            .record
            .id;
        pipeline.delete(a).unwrap();
        pipeline.rebuild().unwrap();
        let store_ids: Vec<i64> = pipeline
            .store()
            .search(&SearchQuery::default())
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(store_ids, vec![b]);
        assert_eq!(pipeline.index().len(), 1);
        assert!(pipeline.index().contains(b));
        assert!(!pipeline.index().contains(a));
    }

    #[test]
    fn import_dir_isolates_per_file_failures() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let root = dir.path().join("own_reports");
        let raw = root.join("raw");
        fs::create_dir_all(&raw).unwrap();
        for i in 0..9 {
            fs::write(
                raw.join(format!("note_{i}.txt")),
                format!(
                    "PROCEDURE: Hernia Repair {i}\nAn uncomplicated open inguinal hernia \
                     repair was performed with mesh. The patient tolerated it well."
                ),
            )
            .unwrap();
        }
        // OCR is disabled, so the image fails extraction
        fs::write(raw.join("scan.png"), b"not really a png").unwrap();

        let summary = pipeline.import_dir(&OcrClient::disabled(), &root).unwrap();
        assert_eq!(summary.total, 10);
        assert_eq!(summary.succeeded, 9);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failures[0].0, "scan.png");

        assert_eq!(pipeline.store().count().unwrap(), 9);
        assert_eq!(pipeline.index().len(), 9);
        // originals moved, de-identified copies written
        assert_eq!(fs::read_dir(&raw).unwrap().count(), 1);
        assert_eq!(fs::read_dir(root.join("deid")).unwrap().count(), 9);
        assert_eq!(fs::read_dir(root.join("imported")).unwrap().count(), 9);
    }

    #[test]
    fn import_dir_rejects_short_extractions() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let root = dir.path().join("own_reports");
        fs::create_dir_all(root.join("raw")).unwrap();
        fs::write(root.join("raw/short.txt"), "too short").unwrap();
        let summary = pipeline.import_dir(&OcrClient::disabled(), &root).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(pipeline.store().count().unwrap(), 0);
    }
}
