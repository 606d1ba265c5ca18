use anyhow::Result;

use opnote_core::DeidGate;
use opnote_llm::LlmClient;
use opnote_rag::extract_inputs;

use crate::config::OpnoteConfig;
use crate::input::read_input;

pub fn run(_config: &OpnoteConfig, file: Option<String>, text: Option<String>) -> Result<()> {
    let raw = read_input(file, text)?;
    let gate = DeidGate::from_env()?;
    let llm = LlmClient::from_env()?;
    let inputs = extract_inputs(&gate, &llm, &raw)?;
    println!("{}", serde_json::to_string_pretty(&inputs)?);
    Ok(())
}
