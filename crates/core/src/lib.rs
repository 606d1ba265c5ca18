mod deid;
mod error;
mod model;
mod store;
mod text;

pub use deid::{DeidBackend, DeidGate, HttpScrubber, PatternScrubber, ScrubOutcome};
pub use error::{OpnoteError, Result};
pub use model::{
    GeneratedReport, NewGeneratedReport, NewReport, ReportRecord, ReportSource, SearchQuery,
    SurgeonInputs,
};
pub use store::ReportStore;
pub use text::{char_count, sentence_prefix, truncate_to_chars};
