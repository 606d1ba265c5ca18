mod corpus;
mod extract;
mod generate;
mod ingest;
mod retrieval;

pub use corpus::{load_corpus, LoadOptions, LoadStats};
pub use extract::{extract_procedure_type, extract_specialty};
pub use generate::{
    extract_inputs, generate_report, persist, rate, GenerateOptions, DEFAULT_CONTEXT_REPORTS,
    DEFAULT_MAX_CONTEXT_CHARS,
};
pub use ingest::{AdmitOptions, AdmittedReport, ImportSummary, IngestPipeline};
pub use retrieval::{build_context, find_similar, ScoredReport, NO_CONTEXT_LINE};
