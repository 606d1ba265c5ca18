use anyhow::Result;

use opnote_core::SurgeonInputs;
use opnote_llm::LlmClient;
use opnote_rag::{generate_report, persist, GenerateOptions};

use crate::config::OpnoteConfig;

pub struct GenerateArgs {
    pub procedure: String,
    pub inputs: SurgeonInputs,
    pub context: usize,
    pub max_context_chars: usize,
    pub save: bool,
}

pub fn run(config: &OpnoteConfig, args: GenerateArgs) -> Result<()> {
    let store = config.open_store()?;
    let index = config.open_index()?;
    let llm = LlmClient::from_env()?;
    let draft = generate_report(
        &llm,
        &index,
        &store,
        &args.procedure,
        &args.inputs,
        &GenerateOptions {
            n_context_reports: args.context,
            max_context_chars: args.max_context_chars,
        },
    )?;
    println!("{draft}");
    if args.save {
        let id = persist(&store, &args.procedure, &args.inputs, &draft)?;
        println!("\n[opnote] saved draft {id}; rate it with the service or keep iterating");
    }
    Ok(())
}
