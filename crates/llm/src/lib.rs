use base64::Engine as _;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;

use opnote_core::{OpnoteError, Result};

pub const DEFAULT_GENERATION_MODEL: &str = "qwen2.5:32b";
pub const DEFAULT_OCR_MODEL: &str = "glm-ocr";
const OCR_PROMPT: &str = "Text Recognition:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "ollama" => Some(LlmProvider::Ollama),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
}

/// Sampling knobs passed through to the generation service.
#[derive(Debug, Clone, Copy)]
pub struct GenOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 4096,
        }
    }
}

impl GenOptions {
    /// Low-temperature settings for constrained field extraction.
    pub fn extraction() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            num_predict: 1024,
        }
    }
}

#[derive(Clone)]
enum LlmBackend {
    Ollama(OllamaChatClient),
    Local,
}

#[derive(Clone)]
pub struct LlmClient {
    backend: LlmBackend,
    model: String,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let provider_name = env::var("OPNOTE_LLM_PROVIDER").unwrap_or_else(|_| "local".to_string());
        let provider = LlmProvider::from_str(&provider_name).ok_or_else(|| {
            OpnoteError::Generation(format!("unknown llm provider {provider_name}"))
        })?;
        let model =
            env::var("OPNOTE_LLM_MODEL").unwrap_or_else(|_| DEFAULT_GENERATION_MODEL.to_string());
        match provider {
            LlmProvider::Ollama => {
                let base_url = env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string());
                let timeout = env::var("OPNOTE_LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(120);
                Self::ollama(&base_url, &model, Duration::from_secs(timeout))
            }
            LlmProvider::Local => Ok(Self::local()),
        }
    }

    pub fn ollama(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            backend: LlmBackend::Ollama(OllamaChatClient::new(base_url, timeout)?),
            model: model.to_string(),
        })
    }

    pub fn local() -> Self {
        Self {
            backend: LlmBackend::Local,
            model: "local".to_string(),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        match &self.backend {
            LlmBackend::Ollama(_) => LlmProvider::Ollama,
            LlmBackend::Local => LlmProvider::Local,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn chat(&self, req: &ChatRequest, opts: &GenOptions) -> Result<ChatResponse> {
        match &self.backend {
            LlmBackend::Ollama(client) => client.chat(&self.model, req, opts),
            LlmBackend::Local => Ok(ChatResponse {
                content: synthesize_local_response(req),
            }),
        }
    }
}

#[derive(Clone)]
struct OllamaChatClient {
    http: Client,
    base_url: String,
}

impl OllamaChatClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|err| {
            OpnoteError::Generation(format!("failed to build http client: {err}"))
        })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chat(&self, model: &str, req: &ChatRequest, opts: &GenOptions) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": opts.temperature,
                "top_p": opts.top_p,
                "num_predict": opts.num_predict,
            },
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|err| OpnoteError::Generation(format!("generation request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(OpnoteError::Generation(format!(
                "generation service returned status {}",
                response.status()
            )));
        }
        let parsed: OllamaChatResponse = response
            .json()
            .map_err(|err| OpnoteError::Generation(format!("invalid generation response: {err}")))?;
        if parsed.message.content.trim().is_empty() {
            return Err(OpnoteError::Generation(
                "generation response was empty".to_string(),
            ));
        }
        Ok(ChatResponse {
            content: parsed.message.content,
        })
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

const REPORT_SECTIONS: [(&str, &str); 13] = [
    ("PREOPERATIVE DIAGNOSIS", "Preoperative Diagnosis"),
    ("POSTOPERATIVE DIAGNOSIS", "Postoperative Diagnosis"),
    ("PROCEDURE PERFORMED", "Procedure Type"),
    ("SURGEON / ASSISTANT", "Surgeon"),
    ("ANESTHESIA", "Anesthesia"),
    ("INDICATIONS", "Indications"),
    ("FINDINGS", "Findings"),
    ("PROCEDURE IN DETAIL", "Procedure Details"),
    ("SPECIMENS", "Specimens"),
    ("DRAINS", "Drains"),
    ("ESTIMATED BLOOD LOSS", "Estimated Blood Loss"),
    ("COMPLICATIONS", "Complications"),
    ("DISPOSITION", ""),
];

/// Deterministic offline generator. Dispatches on prompt markers: the
/// constrained-extraction prompt gets a JSON object scraped from labeled
/// lines of the note; the report prompt gets a skeletal sectioned report
/// assembled from the `- Field: value` lines of the inputs block.
fn synthesize_local_response(req: &ChatRequest) -> String {
    if req.user.contains("Return ONLY a valid JSON object") {
        return synthesize_extraction(&req.user);
    }
    synthesize_report(&req.user)
}

fn synthesize_report(prompt: &str) -> String {
    let mut sections = Vec::with_capacity(REPORT_SECTIONS.len());
    for (heading, input_label) in REPORT_SECTIONS {
        let value = if input_label.is_empty() {
            "The patient tolerated the procedure well and was transferred to the \
             recovery room in stable condition."
                .to_string()
        } else {
            labeled_value(prompt, input_label).unwrap_or_else(|| "None".to_string())
        };
        sections.push(format!("{heading}: {value}"));
    }
    sections.join("\n\n")
}

fn synthesize_extraction(prompt: &str) -> String {
    let note = prompt
        .split("Brief Operative Note:")
        .nth(1)
        .unwrap_or(prompt);
    let fields = [
        ("procedure_type", "procedure"),
        ("preop_diagnosis", "preop"),
        ("postop_diagnosis", "postop"),
        ("surgeon_name", "surgeon"),
        ("assistant", "assistant"),
        ("anesthesia_type", "anesthesia"),
        ("indications", "indications"),
        ("findings", "findings"),
        ("procedure_details", "details"),
        ("specimens", "specimens"),
        ("drains", "drains"),
        ("ebl", "ebl"),
        ("complications", "complications"),
    ];
    let mut object = serde_json::Map::new();
    for (key, label) in fields {
        let value = note
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(head, _)| head.trim().to_lowercase().contains(label))
            .map(|(_, tail)| tail.trim().to_string())
            .unwrap_or_default();
        object.insert(key.to_string(), serde_json::Value::String(value));
    }
    serde_json::Value::Object(object).to_string()
}

fn labeled_value(prompt: &str, label: &str) -> Option<String> {
    let needle = format!("- {label}:");
    for line in prompt.lines() {
        if let Some(rest) = line.trim().strip_prefix(&needle) {
            let value = rest.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Outcome of an OCR attempt. Extraction failures are values, not errors;
/// the bulk importer records them and moves on to the next file.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutcome {
    Text(String),
    Failed { reason: String },
}

impl OcrOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        OcrOutcome::Failed {
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
enum OcrBackend {
    Ollama {
        http: Client,
        base_url: String,
        model: String,
    },
    Disabled,
}

#[derive(Clone)]
pub struct OcrClient {
    backend: OcrBackend,
}

impl OcrClient {
    pub fn from_env() -> Result<Self> {
        match env::var("OPNOTE_OCR_PROVIDER")
            .unwrap_or_else(|_| "disabled".to_string())
            .to_lowercase()
            .as_str()
        {
            "ollama" => {
                let base_url = env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string());
                let model =
                    env::var("OPNOTE_OCR_MODEL").unwrap_or_else(|_| DEFAULT_OCR_MODEL.to_string());
                let timeout = env::var("OPNOTE_OCR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(120);
                Self::ollama(&base_url, &model, Duration::from_secs(timeout))
            }
            _ => Ok(Self::disabled()),
        }
    }

    pub fn ollama(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|err| {
            OpnoteError::Generation(format!("failed to build http client: {err}"))
        })?;
        Ok(Self {
            backend: OcrBackend::Ollama {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                model: model.to_string(),
            },
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: OcrBackend::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, OcrBackend::Disabled)
    }

    pub fn extract_image(&self, bytes: &[u8]) -> OcrOutcome {
        match &self.backend {
            OcrBackend::Disabled => {
                OcrOutcome::failed("OCR is disabled; set OPNOTE_OCR_PROVIDER=ollama to enable it")
            }
            OcrBackend::Ollama {
                http,
                base_url,
                model,
            } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                let payload = json!({
                    "model": model,
                    "messages": [{
                        "role": "user",
                        "content": OCR_PROMPT,
                        "images": [encoded],
                    }],
                    "stream": false,
                });
                let response = match http
                    .post(format!("{base_url}/api/chat"))
                    .json(&payload)
                    .send()
                {
                    Ok(response) => response,
                    Err(err) => return OcrOutcome::failed(format!("ocr request failed: {err}")),
                };
                if !response.status().is_success() {
                    return OcrOutcome::failed(format!(
                        "ocr service returned status {}",
                        response.status()
                    ));
                }
                match response.json::<OllamaChatResponse>() {
                    Ok(parsed) if parsed.message.content.trim().is_empty() => {
                        OcrOutcome::failed("ocr returned no text")
                    }
                    Ok(parsed) => OcrOutcome::Text(parsed.message.content),
                    Err(err) => OcrOutcome::failed(format!("invalid ocr response: {err}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_report_contains_every_section_in_order() {
        let client = LlmClient::local();
        let prompt = "Generate an operative report using the following information:\n\n\
                      SURGEON INPUTS:\n\
                      - Procedure Type: Laparoscopic Cholecystectomy\n\
                      - Preoperative Diagnosis: Cholelithiasis\n\
                      - Postoperative Diagnosis: Chronic cholecystitis\n\
                      - Surgeon: [NAME]\n\
                      - Estimated Blood Loss: Less than 20 mL\n";
        let response = client
            .chat(
                &ChatRequest {
                    system: None,
                    user: prompt.to_string(),
                },
                &GenOptions::default(),
            )
            .unwrap();
        let mut last = 0;
        for (heading, _) in REPORT_SECTIONS {
            let pos = response.content.find(heading).unwrap();
            assert!(pos >= last, "{heading} out of order");
            last = pos;
        }
        assert!(response
            .content
            .contains("PROCEDURE PERFORMED: Laparoscopic Cholecystectomy"));
        assert!(response
            .content
            .contains("ESTIMATED BLOOD LOSS: Less than 20 mL"));
    }

    #[test]
    fn local_extraction_returns_parseable_json() {
        let client = LlmClient::local();
        let prompt = "Extract the following fields from this brief operative note.\n\
                      Return ONLY a valid JSON object with these keys:\n\
                      procedure_type, preop_diagnosis, ...\n\n\
                      Brief Operative Note:\n\
                      Procedure: Laparoscopic Appendectomy\n\
                      Surgeon: [NAME]\n\
                      EBL: Minimal\n";
        let response = client
            .chat(
                &ChatRequest {
                    system: None,
                    user: prompt.to_string(),
                },
                &GenOptions::extraction(),
            )
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&response.content).unwrap();
        assert_eq!(parsed["procedure_type"], "Laparoscopic Appendectomy");
        assert_eq!(parsed["ebl"], "Minimal");
        assert_eq!(parsed["drains"], "");
    }

    #[test]
    fn unreachable_generation_service_is_a_generation_error() {
        let client = LlmClient::ollama(
            "http://127.0.0.1:1",
            DEFAULT_GENERATION_MODEL,
            Duration::from_millis(200),
        )
        .unwrap();
        let err = client
            .chat(
                &ChatRequest {
                    system: None,
                    user: "anything".to_string(),
                },
                &GenOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, OpnoteError::Generation(_)));
    }

    #[test]
    fn ocr_failures_are_values_not_errors() {
        let disabled = OcrClient::disabled();
        assert!(matches!(
            disabled.extract_image(b"not an image"),
            OcrOutcome::Failed { .. }
        ));
        let unreachable = OcrClient::ollama(
            "http://127.0.0.1:1",
            DEFAULT_OCR_MODEL,
            Duration::from_millis(200),
        )
        .unwrap();
        match unreachable.extract_image(b"bytes") {
            OcrOutcome::Failed { reason } => assert!(reason.contains("ocr request failed")),
            OcrOutcome::Text(_) => panic!("expected failure"),
        }
    }
}
