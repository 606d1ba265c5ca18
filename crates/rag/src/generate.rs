use tracing::warn;

use opnote_core::{
    DeidGate, NewGeneratedReport, OpnoteError, ReportStore, Result, SurgeonInputs,
};
use opnote_index::VectorIndex;
use opnote_llm::{ChatRequest, GenOptions, LlmClient};

use crate::retrieval::{build_context, NO_CONTEXT_LINE};

pub const DEFAULT_CONTEXT_REPORTS: usize = 3;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 9000;

const SYSTEM_PROMPT: &str = "\
You are an expert medical transcriptionist specializing in operative reports.
Your task is to generate a complete, professional operative report based on the surgeon's inputs.

CRITICAL REQUIREMENTS:
1. Use proper medical terminology throughout
2. Maintain a professional, formal tone appropriate for medical records
3. DO NOT use any placeholders, brackets, or fill-in-the-blank text (e.g., no [DATE], [TIME], etc.)
4. Generate complete sentences and paragraphs
5. Follow standard operative report structure and formatting
6. Include all provided information naturally in the report
7. If a field is marked \"None\" or empty, either omit it or state appropriately (e.g., \"No drains were placed\")

The report should include these sections in order:
- PREOPERATIVE DIAGNOSIS
- POSTOPERATIVE DIAGNOSIS
- PROCEDURE PERFORMED
- SURGEON / ASSISTANT
- ANESTHESIA
- INDICATIONS
- FINDINGS
- PROCEDURE IN DETAIL
- SPECIMENS
- DRAINS
- ESTIMATED BLOOD LOSS
- COMPLICATIONS
- DISPOSITION (patient condition at end)";

const EXTRACTION_SYSTEM_PROMPT: &str = "You are a medical data extraction assistant. \
Extract structured information from operative notes and return valid JSON only.";

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub n_context_reports: usize,
    pub max_context_chars: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            n_context_reports: DEFAULT_CONTEXT_REPORTS,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

/// Drafts an operative report from the surgeon's structured inputs plus
/// retrieved reference context. A retrieval failure degrades to the
/// no-context line and generation proceeds; a generation failure surfaces
/// as GenerationError and nothing is persisted here.
pub fn generate_report(
    llm: &LlmClient,
    index: &VectorIndex,
    store: &ReportStore,
    procedure_type: &str,
    inputs: &SurgeonInputs,
    opts: &GenerateOptions,
) -> Result<String> {
    let findings = format!(
        "{} {} {}",
        inputs.indications, inputs.findings, inputs.procedure_details
    );
    let context = match build_context(
        index,
        store,
        procedure_type,
        &findings,
        opts.n_context_reports,
        opts.max_context_chars,
    ) {
        Ok(context) => context,
        Err(OpnoteError::Index(reason)) => {
            warn!(%reason, "context retrieval failed; generating without reference reports");
            NO_CONTEXT_LINE.to_string()
        }
        Err(other) => return Err(other),
    };
    let response = llm.chat(
        &ChatRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            user: user_prompt(procedure_type, inputs, &context),
        },
        &GenOptions::default(),
    )?;
    Ok(response.content)
}

pub fn persist(
    store: &ReportStore,
    procedure_type: &str,
    inputs: &SurgeonInputs,
    generated_report: &str,
) -> Result<i64> {
    let created = store.create_generated(&NewGeneratedReport {
        procedure_type: procedure_type.to_string(),
        surgeon_inputs: inputs.clone(),
        generated_report: generated_report.to_string(),
    })?;
    Ok(created.id)
}

pub fn rate(store: &ReportStore, id: i64, score: i64) -> Result<()> {
    store.rate_generated(id, score)
}

/// Pre-fills surgeon inputs from a brief note. The note goes through the
/// de-identification gate before anything is sent to the extraction model;
/// a gate failure aborts, the same contract ingestion honors.
pub fn extract_inputs(gate: &DeidGate, llm: &LlmClient, raw_text: &str) -> Result<SurgeonInputs> {
    let scrubbed = gate.scrub(raw_text)?;
    let prompt = format!(
        "Extract the following fields from this brief operative note.\n\
         Return ONLY a valid JSON object with these keys:\n\
         procedure_type, preop_diagnosis, postop_diagnosis, surgeon_name, assistant,\n\
         anesthesia_type, indications, findings, procedure_details, specimens,\n\
         drains, ebl, complications.\n\n\
         If a field is not mentioned, use an empty string for that field.\n\n\
         Brief Operative Note:\n{}",
        scrubbed.clean
    );
    let response = llm.chat(
        &ChatRequest {
            system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            user: prompt,
        },
        &GenOptions::extraction(),
    )?;
    let json_text = strip_markdown_fences(&response.content);
    serde_json::from_str(json_text.trim()).map_err(|err| {
        OpnoteError::Generation(format!("failed to parse extraction response as JSON: {err}"))
    })
}

fn user_prompt(procedure_type: &str, inputs: &SurgeonInputs, context: &str) -> String {
    format!(
        "Generate an operative report using the following information:\n\n\
         SURGEON INPUTS:\n\
         - Procedure Type: {procedure_type}\n\
         - Preoperative Diagnosis: {preop}\n\
         - Postoperative Diagnosis: {postop}\n\
         - Surgeon: {surgeon}\n\
         - Assistant: {assistant}\n\
         - Anesthesia: {anesthesia}\n\
         - Indications: {indications}\n\
         - Findings: {findings}\n\
         - Procedure Details: {details}\n\
         - Specimens: {specimens}\n\
         - Drains: {drains}\n\
         - Estimated Blood Loss: {ebl}\n\
         - Complications: {complications}\n\n\
         {context}\n\n\
         Based on the surgeon inputs above and using the reference reports for \
         formatting and structure guidance, generate a complete operative report. \
         Write the full report now:",
        preop = inputs.preop_diagnosis,
        postop = or_default(&inputs.postop_diagnosis, &inputs.preop_diagnosis),
        surgeon = inputs.surgeon_name,
        assistant = or_default(&inputs.assistant, "None"),
        anesthesia = or_default(&inputs.anesthesia_type, "General"),
        indications = or_default(&inputs.indications, "As per diagnosis"),
        findings = or_default(&inputs.findings, "As expected for the diagnosis"),
        details = inputs.procedure_details,
        specimens = or_default(&inputs.specimens, "None"),
        drains = or_default(&inputs.drains, "None"),
        ebl = or_default(&inputs.ebl, "Minimal"),
        complications = or_default(&inputs.complications, "None"),
    )
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn strip_markdown_fences(text: &str) -> &str {
    if let Some(after) = text.split("```json").nth(1) {
        return after.split("```").next().unwrap_or(after);
    }
    if let Some(after) = text.split("```").nth(1) {
        return after;
    }
    text
}
