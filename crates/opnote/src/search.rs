use anyhow::Result;

use opnote_rag::find_similar;

use crate::config::OpnoteConfig;

pub fn run(config: &OpnoteConfig, query: String, top: usize) -> Result<()> {
    let store = config.open_store()?;
    let index = config.open_index()?;
    let scored = find_similar(&index, &store, &query, top)?;
    if scored.is_empty() {
        println!("[opnote] no matching reports");
        return Ok(());
    }
    for hit in scored {
        println!(
            "{:>6}  {:.3}  {} | {} | {}",
            hit.record.id,
            hit.score,
            hit.record.procedure_type,
            hit.record.specialty,
            hit.record.source.as_str()
        );
    }
    Ok(())
}
