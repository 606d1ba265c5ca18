use anyhow::{anyhow, Result};

use crate::config::OpnoteConfig;

pub fn run(config: &OpnoteConfig, id: i64) -> Result<()> {
    let store = config.open_store()?;
    let record = store
        .get(id)?
        .ok_or_else(|| anyhow!("report {id} not found"))?;
    println!("id:            {}", record.id);
    println!("procedure:     {}", record.procedure_type);
    println!("specialty:     {}", record.specialty);
    if let Some(name) = &record.report_name {
        println!("name:          {name}");
    }
    println!("source:        {}", record.source.as_str());
    println!("deidentified:  {}", record.is_deidentified);
    println!("added:         {}", record.added_at.to_rfc3339());
    if let Some(keywords) = &record.keywords {
        println!("keywords:      {keywords}");
    }
    println!("\n{}", record.report_text);
    Ok(())
}
