use std::env;
use std::path::PathBuf;

use anyhow::Result;

use opnote_core::{DeidGate, ReportStore};
use opnote_index::{EmbeddingClient, VectorIndex};
use opnote_rag::IngestPipeline;

#[derive(Debug, Clone)]
pub struct OpnoteConfig {
    pub db_path: PathBuf,
    pub index_dir: PathBuf,
}

impl OpnoteConfig {
    pub fn from_env() -> Self {
        let db_path = env::var("OPNOTE_DB").unwrap_or_else(|_| "opnote.db".to_string());
        let index_dir = env::var("OPNOTE_INDEX_DIR").unwrap_or_else(|_| "opnote_index".to_string());
        Self {
            db_path: PathBuf::from(db_path),
            index_dir: PathBuf::from(index_dir),
        }
    }

    pub fn open_store(&self) -> Result<ReportStore> {
        Ok(ReportStore::open(&self.db_path)?)
    }

    pub fn open_index(&self) -> Result<VectorIndex> {
        Ok(VectorIndex::open(&self.index_dir, EmbeddingClient::from_env()?)?)
    }

    pub fn open_pipeline(&self) -> Result<IngestPipeline> {
        Ok(IngestPipeline::new(
            self.open_store()?,
            self.open_index()?,
            DeidGate::from_env()?,
        ))
    }
}
