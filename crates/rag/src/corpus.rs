use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use opnote_core::{NewReport, OpnoteError, ReportSource, ReportStore, Result};

/// One row of the published transcription corpus. The column names are
/// the corpus's own; the short `description` doubles as the procedure
/// type and `transcription` carries the report body.
#[derive(Debug, Deserialize)]
struct CorpusRow {
    #[serde(default)]
    description: String,
    #[serde(default)]
    medical_specialty: String,
    #[serde(default)]
    sample_name: String,
    #[serde(default)]
    transcription: String,
    #[serde(default)]
    keywords: String,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub target_specialties: Vec<String>,
    pub limit: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            target_specialties: vec![
                "Surgery".to_string(),
                "General Surgery".to_string(),
                "Gastroenterology".to_string(),
            ],
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    pub total_rows: usize,
    pub loaded: usize,
    pub skipped: usize,
    pub by_specialty: BTreeMap<String, u64>,
}

/// Loads an already-public corpus straight into the store. The rows are
/// published material, so the de-identification gate is not involved,
/// and indexing is deferred to an explicit rebuild rather than paying an
/// embedding per row here.
pub fn load_corpus(store: &ReportStore, csv_path: &Path, opts: &LoadOptions) -> Result<LoadStats> {
    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|err| OpnoteError::Other(format!("failed to open corpus csv: {err}")))?;
    let mut stats = LoadStats::default();
    for row in reader.deserialize::<CorpusRow>() {
        let row = row.map_err(|err| OpnoteError::Other(format!("malformed corpus row: {err}")))?;
        stats.total_rows += 1;
        let specialty = row.medical_specialty.trim();
        let wanted = opts
            .target_specialties
            .iter()
            .any(|target| target.eq_ignore_ascii_case(specialty));
        if !wanted || row.transcription.trim().is_empty() {
            stats.skipped += 1;
            continue;
        }
        let procedure_type = row.description.trim();
        store.create(&NewReport {
            procedure_type: if procedure_type.is_empty() {
                "Unknown Procedure".to_string()
            } else {
                procedure_type.to_string()
            },
            specialty: specialty.to_string(),
            report_name: Some(row.sample_name.trim().to_string()).filter(|n| !n.is_empty()),
            report_text: row.transcription.trim().to_string(),
            keywords: Some(row.keywords.trim().to_string()).filter(|k| !k.is_empty()),
            source: ReportSource::ExternalCorpus,
            is_deidentified: true,
        })?;
        stats.loaded += 1;
        *stats.by_specialty.entry(specialty.to_string()).or_insert(0) += 1;
        if let Some(limit) = opts.limit {
            if stats.loaded >= limit {
                break;
            }
        }
    }
    info!(
        loaded = stats.loaded,
        skipped = stats.skipped,
        "corpus load finished"
    );
    Ok(stats)
}
