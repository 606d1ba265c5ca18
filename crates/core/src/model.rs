use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportSource {
    #[serde(rename = "external-corpus")]
    ExternalCorpus,
    #[serde(rename = "own-clinical-deidentified")]
    OwnClinical,
}

impl ReportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSource::ExternalCorpus => "external-corpus",
            ReportSource::OwnClinical => "own-clinical-deidentified",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "external-corpus" => Some(ReportSource::ExternalCorpus),
            "own-clinical-deidentified" => Some(ReportSource::OwnClinical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub procedure_type: String,
    pub specialty: String,
    #[serde(default)]
    pub report_name: Option<String>,
    pub report_text: String,
    #[serde(default)]
    pub keywords: Option<String>,
    pub source: ReportSource,
    pub is_deidentified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: i64,
    pub procedure_type: String,
    pub specialty: String,
    pub report_name: Option<String>,
    pub report_text: String,
    pub keywords: Option<String>,
    pub source: ReportSource,
    pub is_deidentified: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub specialty: Option<String>,
    pub procedure_type: Option<String>,
    pub keyword: Option<String>,
    pub source: Option<ReportSource>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurgeonInputs {
    #[serde(default)]
    pub procedure_type: String,
    #[serde(default)]
    pub preop_diagnosis: String,
    #[serde(default)]
    pub postop_diagnosis: String,
    #[serde(default)]
    pub surgeon_name: String,
    #[serde(default)]
    pub assistant: String,
    #[serde(default)]
    pub anesthesia_type: String,
    #[serde(default)]
    pub indications: String,
    #[serde(default)]
    pub findings: String,
    #[serde(default)]
    pub procedure_details: String,
    #[serde(default)]
    pub specimens: String,
    #[serde(default)]
    pub drains: String,
    #[serde(default)]
    pub ebl: String,
    #[serde(default)]
    pub complications: String,
}

#[derive(Debug, Clone)]
pub struct NewGeneratedReport {
    pub procedure_type: String,
    pub surgeon_inputs: SurgeonInputs,
    pub generated_report: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub id: i64,
    pub procedure_type: String,
    pub surgeon_inputs: SurgeonInputs,
    pub generated_report: String,
    pub user_rating: Option<i64>,
    pub created_at: DateTime<Utc>,
}
