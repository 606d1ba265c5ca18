use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "opnote", about = "Operative report store, retrieval, and drafting CLI")]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Admit a single report through the de-identification gate.
    Add {
        /// Path to a text file; use --text to pass the report inline.
        file: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        procedure: Option<String>,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
    },
    /// Bulk-import every supported file under <dir>/raw.
    Import {
        dir: String,
    },
    /// Load the transcription corpus CSV into the record store.
    LoadCorpus {
        csv: String,
        /// Comma-separated specialty filter.
        #[arg(long)]
        specialties: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Semantic search over the indexed reports.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    Show {
        id: i64,
    },
    Delete {
        id: i64,
    },
    /// Re-derive the whole index from the record store.
    Rebuild,
    Stats,
    /// Draft an operative report from structured surgeon inputs.
    Generate {
        #[arg(long)]
        procedure: String,
        #[arg(long, default_value = "")]
        preop: String,
        #[arg(long, default_value = "")]
        postop: String,
        #[arg(long, default_value = "")]
        surgeon: String,
        #[arg(long, default_value = "")]
        assistant: String,
        #[arg(long, default_value = "")]
        anesthesia: String,
        #[arg(long, default_value = "")]
        indications: String,
        #[arg(long, default_value = "")]
        findings: String,
        #[arg(long, default_value = "")]
        details: String,
        #[arg(long, default_value = "")]
        specimens: String,
        #[arg(long, default_value = "")]
        drains: String,
        #[arg(long, default_value = "")]
        ebl: String,
        #[arg(long, default_value = "")]
        complications: String,
        #[arg(long, default_value_t = 3)]
        context: usize,
        #[arg(long, default_value_t = 9000)]
        max_context_chars: usize,
        /// Persist the draft and print its id.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Extract structured surgeon inputs from a brief note.
    Extract {
        file: Option<String>,
        #[arg(long)]
        text: Option<String>,
    },
}
