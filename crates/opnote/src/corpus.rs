use std::path::PathBuf;

use anyhow::Result;

use opnote_rag::{load_corpus, LoadOptions};

use crate::config::OpnoteConfig;

pub fn run(
    config: &OpnoteConfig,
    csv: String,
    specialties: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let store = config.open_store()?;
    let mut opts = LoadOptions {
        limit,
        ..Default::default()
    };
    if let Some(list) = specialties {
        let targets: Vec<String> = list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !targets.is_empty() {
            opts.target_specialties = targets;
        }
    }
    let stats = load_corpus(&store, &PathBuf::from(csv), &opts)?;
    println!(
        "[opnote] corpus load: {} rows read, {} loaded, {} skipped",
        stats.total_rows, stats.loaded, stats.skipped
    );
    for (specialty, count) in &stats.by_specialty {
        println!("[opnote]   {specialty}: {count}");
    }
    println!("[opnote] run `opnote rebuild` to index the new records");
    Ok(())
}
