use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_SPECIALTY: &str = "Surgery";
pub const UNKNOWN_PROCEDURE: &str = "Unknown Procedure";

const MAX_PROCEDURE_LEN: usize = 200;

static PROCEDURE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:OPERATIVE\s+)?PROCEDURE(?:\s+PERFORMED)?[:\s]+([^\n]+)",
        r"(?i)OPERATION(?:\s+PERFORMED)?[:\s]+([^\n]+)",
        r"(?i)SURGERY[:\s]+([^\n]+)",
        r"(?i)POSTOPERATIVE\s+DIAGNOSIS[:\s]+([^\n]+)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid header pattern"))
    .collect()
});

static SPECIALTY_KEYWORDS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "Gastroenterology",
            vec!["gastro", "endoscopy", "colonoscopy", "egd", "ercp"],
        ),
        (
            "Orthopedic Surgery",
            vec!["orthopedic", "arthroplasty", "fracture", "joint"],
        ),
        (
            "Cardiothoracic Surgery",
            vec!["cardiothoracic", "cabg", "cardiac", "thoracotomy"],
        ),
        (
            "Neurosurgery",
            vec!["neurosurg", "craniotomy", "laminectomy", "spine"],
        ),
        (
            "Urology",
            vec!["urolog", "cystoscopy", "prostatectomy", "nephrectomy"],
        ),
        ("Gynecology", vec!["gynecolog", "hysterectomy", "oophorectomy"]),
        (
            "General Surgery",
            vec!["appendectomy", "cholecystectomy", "hernia", "laparoscopic"],
        ),
    ]
});

/// Pulls the procedure type out of common report headers
/// (PROCEDURE:, OPERATION PERFORMED:, ...).
pub fn extract_procedure_type(text: &str) -> String {
    for pattern in PROCEDURE_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(text) {
            let mut procedure = captures[1]
                .trim()
                .trim_matches(|c: char| c == ',' || c.is_whitespace())
                .replace("**", "");
            procedure = procedure.trim().to_string();
            if procedure.chars().count() > MAX_PROCEDURE_LEN {
                let clipped: String = procedure.chars().take(MAX_PROCEDURE_LEN).collect();
                procedure = format!("{clipped}...");
            }
            let lower = procedure.to_lowercase();
            if !procedure.is_empty() && lower != "none" && lower != "n/a" {
                return procedure;
            }
        }
    }
    UNKNOWN_PROCEDURE.to_string()
}

/// Guesses the specialty from keyword occurrence, defaulting to Surgery.
pub fn extract_specialty(text: &str) -> String {
    let lower = text.to_lowercase();
    for (specialty, keywords) in SPECIALTY_KEYWORDS.iter() {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return specialty.to_string();
        }
    }
    DEFAULT_SPECIALTY.to_string()
}
