use anyhow::Result;

use crate::config::OpnoteConfig;

pub fn run(config: &OpnoteConfig, id: i64) -> Result<()> {
    let pipeline = config.open_pipeline()?;
    if pipeline.delete(id)? {
        println!("[opnote] deleted report {id}");
    } else {
        println!("[opnote] report {id} was not present");
    }
    Ok(())
}
