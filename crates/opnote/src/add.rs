use anyhow::Result;

use opnote_rag::AdmitOptions;

use crate::config::OpnoteConfig;
use crate::input::read_input;

pub struct AddArgs {
    pub file: Option<String>,
    pub text: Option<String>,
    pub procedure: Option<String>,
    pub specialty: Option<String>,
    pub name: Option<String>,
    pub keywords: Option<String>,
}

pub fn run(config: &OpnoteConfig, args: AddArgs) -> Result<()> {
    let raw = read_input(args.file, args.text)?;
    let pipeline = config.open_pipeline()?;
    let admitted = pipeline.admit_text(
        &raw,
        &AdmitOptions {
            procedure_type: args.procedure,
            specialty: args.specialty,
            report_name: args.name,
            keywords: args.keywords,
        },
    )?;
    if admitted.found_phi {
        println!("[opnote] identifiers were found and scrubbed before storage");
    }
    println!(
        "[opnote] stored report {} ({} | {})",
        admitted.record.id, admitted.record.procedure_type, admitted.record.specialty
    );
    Ok(())
}
