use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use opnote_core::{OpnoteError, ReportStore, Result};

use crate::embedding::EmbeddingClient;
use crate::log::{JsonlWriter, LogRecord};

const META_FILE: &str = "meta.json";
const LOG_FILE: &str = "entries.jsonl";
const REBUILD_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: i64,
    pub embedding: Vec<f32>,
    pub procedure_type: String,
    pub specialty: String,
}

/// Pins the embedding space for the lifetime of the on-disk index.
/// Entries are only comparable within one provider/model/dimension triple;
/// switching the model requires a full rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub provider: String,
    pub model: String,
    /// 0 until the first embedding fixes it.
    #[serde(default)]
    pub dimensions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub procedure_type: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: i64,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildStats {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
}

#[derive(Debug)]
struct IndexState {
    entries: FxHashMap<i64, IndexEntry>,
    meta: IndexMeta,
}

/// Nearest-neighbor index over report embeddings, keyed by record id.
/// Derived data: every mutation is appended to `entries.jsonl` before
/// memory changes, and the whole index is rebuildable from the record
/// store. Clones share one index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dir: PathBuf,
    embeddings: EmbeddingClient,
    state: Arc<RwLock<IndexState>>,
}

impl VectorIndex {
    pub fn open<P: AsRef<Path>>(dir: P, embeddings: EmbeddingClient) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let meta = load_or_init_meta(&dir, &embeddings)?;
        let entries = replay_log(&dir.join(LOG_FILE), meta.dimensions)?;
        Ok(Self {
            dir,
            embeddings,
            state: Arc::new(RwLock::new(IndexState { entries, meta })),
        })
    }

    pub fn embeddings(&self) -> &EmbeddingClient {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    pub fn meta(&self) -> IndexMeta {
        self.state.read().meta.clone()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.state.read().entries.contains_key(&id)
    }

    /// Embeds `text` and stores or replaces the entry for `id`.
    pub fn upsert(&self, id: i64, text: &str, procedure_type: &str, specialty: &str) -> Result<()> {
        let embedding = self.embeddings.embed(text)?;
        let entry = IndexEntry {
            id,
            embedding,
            procedure_type: procedure_type.to_string(),
            specialty: specialty.to_string(),
        };
        let mut state = self.state.write();
        self.pin_dimensions(&mut state, entry.embedding.len())?;
        self.append_record(&LogRecord::Upsert(entry.clone()))?;
        state.entries.insert(id, entry);
        Ok(())
    }

    /// Idempotent; removing an absent id is not an error.
    pub fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.write();
        if state.entries.contains_key(&id) {
            self.append_record(&LogRecord::Delete { id })?;
            state.entries.remove(&id);
        }
        Ok(())
    }

    /// Ranked by cosine similarity, descending, ties broken by ascending
    /// id so repeated queries are deterministic.
    pub fn query(&self, text: &str, top_k: usize, filters: &QueryFilters) -> Result<Vec<Hit>> {
        let query_embedding = self.embeddings.embed(text)?;
        let state = self.state.read();
        let mut hits: Vec<Hit> = state
            .entries
            .values()
            .filter(|entry| matches_filters(entry, filters))
            .map(|entry| Hit {
                id: entry.id,
                score: cosine_similarity(&query_embedding, &entry.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        if hits.len() > top_k {
            hits.truncate(top_k);
        }
        Ok(hits)
    }

    /// Re-derives the whole index from the store's de-identified records.
    /// Builds a fresh map and a fresh snapshot log, renames the snapshot
    /// into place, then swaps memory under a brief write lock; readers see
    /// the old index until the swap, and a failed rebuild leaves it
    /// untouched.
    pub fn rebuild_from(&self, store: &ReportStore) -> Result<RebuildStats> {
        let mut stats = RebuildStats::default();
        let mut fresh: FxHashMap<i64, IndexEntry> = FxHashMap::default();
        let mut dimensions = 0usize;
        let mut offset = 0usize;
        loop {
            let page = store.all_deidentified(REBUILD_PAGE_SIZE, offset)?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for record in &page {
                stats.total += 1;
                if record.report_text.trim().is_empty() {
                    stats.skipped += 1;
                    continue;
                }
                let embedding = self.embeddings.embed(&record.report_text)?;
                if dimensions == 0 {
                    dimensions = embedding.len();
                } else if embedding.len() != dimensions {
                    return Err(OpnoteError::Index(format!(
                        "embedding dimensionality changed mid-rebuild: {} then {}",
                        dimensions,
                        embedding.len()
                    )));
                }
                fresh.insert(
                    record.id,
                    IndexEntry {
                        id: record.id,
                        embedding,
                        procedure_type: record.procedure_type.clone(),
                        specialty: record.specialty.clone(),
                    },
                );
                stats.indexed += 1;
            }
        }

        let snapshot_path = self.dir.join(format!("{LOG_FILE}.rebuild"));
        write_snapshot(&snapshot_path, &fresh)?;

        let mut state = self.state.write();
        if dimensions != 0 {
            state.meta.dimensions = dimensions;
            write_meta(&self.dir, &state.meta)?;
        }
        // rename last: the swap of the on-disk log is the final fallible
        // step, so a failure anywhere above leaves the old log current
        fs::rename(&snapshot_path, self.dir.join(LOG_FILE))?;
        state.entries = fresh;
        Ok(stats)
    }

    fn pin_dimensions(&self, state: &mut IndexState, dims: usize) -> Result<()> {
        if state.meta.dimensions == 0 {
            state.meta.dimensions = dims;
            write_meta(&self.dir, &state.meta)?;
            return Ok(());
        }
        if state.meta.dimensions != dims {
            return Err(OpnoteError::Index(format!(
                "embedding has {} dimensions but the index is pinned to {}; \
                 rebuild the index to change the embedding model",
                dims, state.meta.dimensions
            )));
        }
        Ok(())
    }

    fn append_record(&self, record: &LogRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(LOG_FILE))?;
        let mut writer = JsonlWriter::new(BufWriter::new(file));
        writer.write_record(record)?;
        writer.into_inner().flush()?;
        Ok(())
    }
}

fn matches_filters(entry: &IndexEntry, filters: &QueryFilters) -> bool {
    if let Some(procedure_type) = &filters.procedure_type {
        if &entry.procedure_type != procedure_type {
            return false;
        }
    }
    if let Some(specialty) = &filters.specialty {
        if &entry.specialty != specialty {
            return false;
        }
    }
    true
}

fn load_or_init_meta(dir: &Path, embeddings: &EmbeddingClient) -> Result<IndexMeta> {
    let path = dir.join(META_FILE);
    if path.exists() {
        let meta: IndexMeta = serde_json::from_str(&fs::read_to_string(&path)?)?;
        if meta.provider != embeddings.provider() || meta.model != embeddings.model() {
            return Err(OpnoteError::Index(format!(
                "index at {} was built with {}/{} but the client is {}/{}; \
                 rebuild the index to change the embedding model",
                dir.display(),
                meta.provider,
                meta.model,
                embeddings.provider(),
                embeddings.model()
            )));
        }
        return Ok(meta);
    }
    let meta = IndexMeta {
        provider: embeddings.provider().to_string(),
        model: embeddings.model(),
        dimensions: embeddings.fixed_dimensions().unwrap_or(0),
    };
    write_meta(dir, &meta)?;
    Ok(meta)
}

fn write_meta(dir: &Path, meta: &IndexMeta) -> Result<()> {
    fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(meta)?)?;
    Ok(())
}

fn replay_log(path: &Path, dimensions: usize) -> Result<FxHashMap<i64, IndexEntry>> {
    let mut entries = FxHashMap::default();
    if !path.exists() {
        return Ok(entries);
    }
    let reader = BufReader::new(File::open(path)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: LogRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    line = lineno + 1,
                    %err,
                    "skipping unparseable index log line; run a rebuild if queries look stale"
                );
                continue;
            }
        };
        match record {
            LogRecord::Upsert(entry) => {
                if dimensions != 0 && entry.embedding.len() != dimensions {
                    warn!(
                        id = entry.id,
                        "skipping index entry with stale dimensionality; run a rebuild"
                    );
                    continue;
                }
                entries.insert(entry.id, entry);
            }
            LogRecord::Delete { id } => {
                entries.remove(&id);
            }
        }
    }
    Ok(entries)
}

fn write_snapshot(path: &Path, entries: &FxHashMap<i64, IndexEntry>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = JsonlWriter::new(BufWriter::new(file));
    let mut ids: Vec<i64> = entries.keys().copied().collect();
    ids.sort_unstable();
    for id in ids {
        writer.write_record(&LogRecord::Upsert(entries[&id].clone()))?;
    }
    writer.into_inner().flush()?;
    Ok(())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}
