use std::path::PathBuf;

use anyhow::Result;

use opnote_llm::OcrClient;

use crate::config::OpnoteConfig;

pub fn run(config: &OpnoteConfig, dir: String) -> Result<()> {
    let root = PathBuf::from(dir);
    let pipeline = config.open_pipeline()?;
    let ocr = OcrClient::from_env()?;
    if !ocr.is_enabled() {
        println!("[opnote] ocr is disabled; image files will be reported as failures");
    }
    let summary = pipeline.import_dir(&ocr, &root)?;
    println!(
        "[opnote] import finished: {} total, {} succeeded, {} failed, {} skipped",
        summary.total, summary.succeeded, summary.failed, summary.skipped
    );
    for (file, reason) in &summary.failures {
        println!("[opnote]   {file}: {reason}");
    }
    Ok(())
}
