use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::MedicalReport;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeReportRequest {
    pub image: Option<String>,
    pub text: Option<String>,
    #[serde(alias = "report_type")]
    pub report_type: Option<String>,
}

/// Lab value classification against its reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum FindingStatus {
    Normal,
    Low,
    High,
    Borderline,
    Unknown,
}

impl FindingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Low => "low",
            Self::High => "high",
            Self::Borderline => "borderline",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for FindingStatus {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "normal" | "ok" | "within range" | "in range" | "optimal" => Self::Normal,
            "low" | "below range" | "deficient" | "decreased" => Self::Low,
            "high" | "above range" | "elevated" | "increased" => Self::High,
            "borderline" | "borderline high" | "borderline low" | "slightly high"
            | "slightly low" => Self::Borderline,
            _ => Self::Unknown,
        }
    }
}

/// Models return lab values as numbers or strings; keep them as text.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "reference_range")]
    pub reference_range: Option<String>,
    #[serde(default = "unknown_status")]
    pub status: FindingStatus,
}

fn unknown_status() -> FindingStatus {
    FindingStatus::Unknown
}

/// What the model extracts from a report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAnalysis {
    #[serde(default, alias = "report_type")]
    pub report_type: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: Uuid,
    pub report_type: String,
    pub summary: String,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ReportResponse {
    pub fn from_record(r: MedicalReport, image_url: Option<String>) -> Self {
        Self {
            id: r.id,
            report_type: r.report_type,
            summary: r.summary,
            findings: r.findings.0,
            recommendations: r.recommendations.0,
            image_url,
            created_at: r.created_at,
        }
    }
}
