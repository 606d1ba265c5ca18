use tracing::warn;

use opnote_core::{char_count, sentence_prefix, ReportRecord, ReportStore, Result};
use opnote_index::{QueryFilters, VectorIndex};

pub const NO_CONTEXT_LINE: &str = "No similar reports found in the database.";

const CONTEXT_HEADER: &str = "=== SIMILAR REPORTS FOR REFERENCE ===\n\n";
const CONTEXT_FOOTER: &str = "=== END OF REFERENCE REPORTS ===";
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone)]
pub struct ScoredReport {
    pub record: ReportRecord,
    pub score: f32,
}

/// Queries the index and hydrates each hit from the record store. A hit
/// whose backing record is gone is a store/index divergence; it is dropped
/// and logged, and the divergence is left for an explicit rebuild.
pub fn find_similar(
    index: &VectorIndex,
    store: &ReportStore,
    query: &str,
    n_results: usize,
) -> Result<Vec<ScoredReport>> {
    let hits = index.query(query, n_results, &QueryFilters::default())?;
    let mut reports = Vec::with_capacity(hits.len());
    for hit in hits {
        match store.get(hit.id)? {
            Some(record) => reports.push(ScoredReport {
                record,
                score: hit.score,
            }),
            None => {
                warn!(
                    id = hit.id,
                    "index hit has no backing record; dropping it (rebuild the index to reconcile)"
                );
            }
        }
    }
    Ok(reports)
}

/// Assembles the labeled reference block handed to the generator. The
/// character budget is spent in rank order; when it runs out mid-excerpt
/// the excerpt is cut at the last sentence boundary that fits and assembly
/// stops. The returned string never exceeds `max_context_chars`.
pub fn build_context(
    index: &VectorIndex,
    store: &ReportStore,
    procedure_type: &str,
    findings: &str,
    n_results: usize,
    max_context_chars: usize,
) -> Result<String> {
    let query = format!("{procedure_type}: {findings}");
    let matches = find_similar(index, store, &query, n_results)?;
    if matches.is_empty() {
        if char_count(NO_CONTEXT_LINE) <= max_context_chars {
            return Ok(NO_CONTEXT_LINE.to_string());
        }
        return Ok(String::new());
    }

    let frame_cost = char_count(CONTEXT_HEADER) + char_count(CONTEXT_FOOTER);
    if frame_cost > max_context_chars {
        return Ok(String::new());
    }
    let mut remaining = max_context_chars - frame_cost;
    let mut out = String::from(CONTEXT_HEADER);
    for (rank, scored) in matches.iter().enumerate() {
        let record = &scored.record;
        let label = format!(
            "--- Example Report {} ({} | {} | {}) ---\n",
            rank + 1,
            record.procedure_type,
            record.specialty,
            record.source.as_str()
        );
        let body = record.report_text.trim();
        // label + body + blank line separating excerpts
        let full_cost = char_count(&label) + char_count(body) + 2;
        if full_cost <= remaining {
            out.push_str(&label);
            out.push_str(body);
            out.push_str("\n\n");
            remaining -= full_cost;
            continue;
        }
        let overhead = char_count(&label) + char_count(ELLIPSIS) + 2;
        if remaining > overhead {
            if let Some(prefix) = sentence_prefix(body, remaining - overhead) {
                out.push_str(&label);
                out.push_str(prefix);
                out.push_str(ELLIPSIS);
                out.push_str("\n\n");
            }
        }
        break;
    }
    out.push_str(CONTEXT_FOOTER);
    debug_assert!(char_count(&out) <= max_context_chars);
    Ok(out)
}
