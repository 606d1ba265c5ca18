use anyhow::Result;

use crate::config::OpnoteConfig;

pub fn run(config: &OpnoteConfig) -> Result<()> {
    let store = config.open_store()?;
    let index = config.open_index()?;
    println!("[opnote] stored reports: {}", store.count()?);
    for (source, count) in store.count_by_source()? {
        println!("[opnote]   {}: {count}", source.as_str());
    }
    let meta = index.meta();
    println!(
        "[opnote] index: {} entries ({} / {}, {} dimensions)",
        index.len(),
        meta.provider,
        meta.model,
        meta.dimensions
    );
    Ok(())
}
