use anyhow::Result;

use crate::config::OpnoteConfig;

pub fn run(config: &OpnoteConfig) -> Result<()> {
    let pipeline = config.open_pipeline()?;
    println!("[opnote] rebuilding the index from the record store...");
    let stats = pipeline.rebuild()?;
    println!(
        "[opnote] rebuild finished: {} records, {} indexed, {} skipped",
        stats.total, stats.indexed, stats.skipped
    );
    Ok(())
}
