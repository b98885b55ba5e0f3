use tracing::instrument;

use super::dto::ReportAnalysis;
use crate::clients::ai::{complete_json, AiClient, CompletionRequest, Message};
use crate::error::{AppError, AppResult};
use crate::images::services::DecodedImage;

pub const MAX_REPORT_TEXT: usize = 20_000;
const MAX_FINDINGS: usize = 60;

const REPORT_PROMPT: &str = "You read medical lab reports and explain them to patients. \
Reply with JSON only: {\"reportType\": string, \"summary\": string, \"findings\": \
[{\"name\": string, \"value\": string, \"unit\": string, \"referenceRange\": string, \
\"status\": \"normal\" | \"low\" | \"high\" | \"borderline\"}], \"recommendations\": [string]}. \
The summary is plain language, three sentences at most. Recommendations focus on diet \
and lifestyle and suggest seeing a doctor for anything out of range. Do not diagnose.";

/// Report text after trimming, or an error when the request carries neither
/// an image nor usable text.
pub fn validate_inputs(has_image: bool, text: Option<&str>) -> AppResult<Option<String>> {
    let text = text.map(str::trim).filter(|t| !t.is_empty());
    if let Some(t) = text {
        if t.chars().count() > MAX_REPORT_TEXT {
            return Err(AppError::bad_request(format!(
                "Report text is too long, maximum is {MAX_REPORT_TEXT} characters"
            )));
        }
    }
    if !has_image && text.is_none() {
        return Err(AppError::bad_request("Provide a report image or text"));
    }
    Ok(text.map(str::to_string))
}

#[instrument(skip_all)]
pub async fn analyze_report(
    ai: &dyn AiClient,
    image: Option<&DecodedImage>,
    text: Option<&str>,
    report_type: Option<&str>,
) -> AppResult<ReportAnalysis> {
    let mut prompt = String::from("Analyze this medical report.");
    if let Some(kind) = report_type {
        prompt.push_str(&format!(" The user says it is a {kind} report."));
    }
    if let Some(t) = text {
        prompt.push_str("\n\nReport text:\n");
        prompt.push_str(t);
    }
    let mut user = Message::user(prompt);
    if let Some(img) = image {
        user = user.with_image(img.inline());
    }

    let req = CompletionRequest {
        messages: vec![Message::system(REPORT_PROMPT), user],
        temperature: Some(0.2),
        ..Default::default()
    };
    let mut analysis: ReportAnalysis = complete_json(ai, req).await?;

    analysis.findings.retain(|f| !f.name.trim().is_empty());
    analysis.findings.truncate(MAX_FINDINGS);
    analysis.recommendations.retain(|r| !r.trim().is_empty());
    if analysis.summary.trim().is_empty() && analysis.findings.is_empty() {
        return Err(AppError::Unprocessable(
            "Could not read the report, please upload a clearer image".into(),
        ));
    }
    Ok(analysis)
}

/// Caller's label wins; then the model's; then a generic one.
pub fn resolve_report_type(requested: Option<&str>, detected: Option<&str>) -> String {
    fn clean(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }
    clean(requested)
        .or(clean(detected))
        .unwrap_or("general")
        .to_string()
}
