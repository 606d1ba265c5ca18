use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::{OpnoteError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ScrubOutcome {
    pub clean: String,
    pub found_phi: bool,
}

#[derive(Clone)]
pub enum DeidBackend {
    Pattern(PatternScrubber),
    Http(HttpScrubber),
}

#[derive(Clone)]
pub struct DeidGate {
    backend: DeidBackend,
}

impl DeidGate {
    pub fn from_env() -> Result<Self> {
        match env::var("DEID_PROVIDER")
            .unwrap_or_else(|_| "pattern".to_string())
            .to_lowercase()
            .as_str()
        {
            "http" => {
                let url = env::var("DEID_URL").map_err(|_| {
                    OpnoteError::PhiGate("DEID_URL is required for the http scrubber".to_string())
                })?;
                let timeout = env::var("DEID_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(30);
                Ok(Self::http(&url, Duration::from_secs(timeout))?)
            }
            _ => Ok(Self::pattern()),
        }
    }

    pub fn pattern() -> Self {
        Self {
            backend: DeidBackend::Pattern(PatternScrubber::new()),
        }
    }

    pub fn http(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            backend: DeidBackend::Http(HttpScrubber::new(url, timeout)?),
        })
    }

    pub fn scrub(&self, text: &str) -> Result<ScrubOutcome> {
        match &self.backend {
            DeidBackend::Pattern(scrubber) => Ok(scrubber.scrub(text)),
            DeidBackend::Http(scrubber) => scrubber.scrub(text),
        }
    }
}

static PHI_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\b\d{3}-\d{2}-\d{4}\b", "[SSN]"),
        (
            r"(?i)\b(?:mrn|medical record(?: number)?)\s*[:#]?\s*\d+",
            "[MRN]",
        ),
        (r"\b\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b", "[PHONE]"),
        (
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "[EMAIL]",
        ),
        (r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b", "[DATE]"),
        // HIPAA safe harbor: ages of 90 and over identify the patient
        (
            r"(?i)\b(?:9\d|1[0-2]\d)[\s-](?:year|yr)s?[\s-]old\b",
            "[AGE]-year-old",
        ),
        (r"(?i)\b(aged?)\s*:?\s*(?:9\d|1[0-2]\d)\b", "$1 [AGE]"),
        (
            r"\b(Dr|Mr|Mrs|Ms|Prof)\.\s+[A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+)?",
            "$1. [NAME]",
        ),
        (
            r"(?i)\b(patient(?: name)?)\s*:\s*[A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,2}",
            "$1: [NAME]",
        ),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid phi pattern"), replacement))
    .collect()
});

#[derive(Clone, Default)]
pub struct PatternScrubber;

impl PatternScrubber {
    pub fn new() -> Self {
        Self
    }

    pub fn scrub(&self, text: &str) -> ScrubOutcome {
        let mut clean = text.to_string();
        let mut found_phi = false;
        for (rule, replacement) in PHI_RULES.iter() {
            if rule.is_match(&clean) {
                found_phi = true;
                clean = rule.replace_all(&clean, *replacement).into_owned();
            }
        }
        ScrubOutcome { clean, found_phi }
    }
}

#[derive(Clone)]
pub struct HttpScrubber {
    http: Client,
    url: String,
}

impl HttpScrubber {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| OpnoteError::PhiGate(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    pub fn scrub(&self, text: &str) -> Result<ScrubOutcome> {
        let payload = serde_json::json!({ "text": text });
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|err| OpnoteError::PhiGate(format!("scrub request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(OpnoteError::PhiGate(format!(
                "scrub service returned status {}",
                response.status()
            )));
        }
        let parsed: ScrubResponse = response
            .json()
            .map_err(|err| OpnoteError::PhiGate(format!("invalid scrub response: {err}")))?;
        Ok(ScrubOutcome {
            clean: parsed.text,
            found_phi: parsed.phi_found,
        })
    }
}

#[derive(Deserialize)]
struct ScrubResponse {
    text: String,
    #[serde(default)]
    phi_found: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_scrubber_removes_identifiers() {
        let gate = DeidGate::pattern();
        let outcome = gate
            .scrub("Patient: John Smith, MRN: 4482913, DOB 03/14/1962. Call (415) 555-0198.")
            .unwrap();
        assert!(outcome.found_phi);
        assert!(!outcome.clean.contains("John"));
        assert!(!outcome.clean.contains("4482913"));
        assert!(!outcome.clean.contains("03/14/1962"));
        assert!(!outcome.clean.contains("555-0198"));
        assert!(outcome.clean.contains("[NAME]"));
        assert!(outcome.clean.contains("[MRN]"));
    }

    #[test]
    fn pattern_scrubber_preserves_clinical_text() {
        let gate = DeidGate::pattern();
        let text = "The gallbladder was dissected free of the liver bed using electrocautery.";
        let outcome = gate.scrub(text).unwrap();
        assert!(!outcome.found_phi);
        assert_eq!(outcome.clean, text);
    }

    #[test]
    fn scrub_is_idempotent() {
        let gate = DeidGate::pattern();
        let first = gate
            .scrub("Dr. Garcia saw the patient. SSN 123-45-6789, reachable at ana@example.org.")
            .unwrap();
        let second = gate.scrub(&first.clean).unwrap();
        assert_eq!(first.clean, second.clean);
        assert!(!second.found_phi);
    }

    #[test]
    fn titled_names_keep_their_title() {
        let gate = DeidGate::pattern();
        let outcome = gate.scrub("Surgeon was Dr. Okafor, assisted by Ms. Lindqvist.").unwrap();
        assert!(outcome.clean.contains("Dr. [NAME]"));
        assert!(outcome.clean.contains("Ms. [NAME]"));
    }

    #[test]
    fn ages_ninety_and_over_are_scrubbed() {
        let gate = DeidGate::pattern();
        let outcome = gate
            .scrub("The patient is a 94-year-old male, aged 94 at admission.")
            .unwrap();
        assert!(outcome.found_phi);
        assert!(!outcome.clean.contains("94"));
        assert!(outcome.clean.contains("[AGE]-year-old"));
        assert!(outcome.clean.contains("aged [AGE]"));

        let under_ninety = gate.scrub("A 67-year-old female, aged 67.").unwrap();
        assert!(!under_ninety.found_phi);
        assert!(under_ninety.clean.contains("67-year-old"));

        let rescrub = gate.scrub(&outcome.clean).unwrap();
        assert_eq!(rescrub.clean, outcome.clean);
    }

    #[test]
    fn http_scrubber_failure_is_a_gate_error() {
        let gate = DeidGate::http("http://127.0.0.1:1/scrub", Duration::from_millis(200)).unwrap();
        let err = gate.scrub("anything").unwrap_err();
        assert!(matches!(err, OpnoteError::PhiGate(_)));
    }
}
