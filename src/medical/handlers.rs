use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AnalyzeReportRequest, ReportResponse},
    repo::{self, NewReport},
    services,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    images::services::{decode_image, delete_quietly, presign_opt, store_image},
    scans::dto::Pagination,
    state::AppState,
};

pub fn function_routes() -> Router<AppState> {
    Router::new().route(
        "/functions/analyze-medical-report",
        post(analyze_medical_report),
    )
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/medical-reports", get(list_reports))
        .route("/medical-reports/:id", get(get_report).delete(delete_report))
}

#[instrument(skip(state, body))]
pub async fn analyze_medical_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<AnalyzeReportRequest>,
) -> AppResult<Json<ReportResponse>> {
    let image = body
        .image
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| decode_image(raw, state.config.limits.max_image_bytes))
        .transpose()?;
    let text = services::validate_inputs(image.is_some(), body.text.as_deref())?;

    let analysis = services::analyze_report(
        state.ai.as_ref(),
        image.as_ref(),
        text.as_deref(),
        body.report_type.as_deref(),
    )
    .await?;

    let image_key = match &image {
        Some(img) => match store_image(&state, "medical", user_id, img).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, %user_id, "report image upload failed");
                None
            }
        },
        None => None,
    };

    let report_type =
        services::resolve_report_type(body.report_type.as_deref(), analysis.report_type.as_deref());
    let record = repo::insert(
        &state.db,
        user_id,
        NewReport {
            report_type: &report_type,
            summary: &analysis.summary,
            findings: &analysis.findings,
            recommendations: &analysis.recommendations,
            image_key: image_key.as_deref(),
        },
    )
    .await?;
    info!(%user_id, report_id = %record.id, findings = analysis.findings.len(), "medical report stored");

    let url = presign_opt(&state, record.image_key.as_deref()).await;
    Ok(Json(ReportResponse::from_record(record, url)))
}

#[instrument(skip(state))]
pub async fn list_reports(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<ReportResponse>>> {
    let records = repo::list_by_user(&state.db, user_id, page.limit(), page.offset()).await?;
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        let url = presign_opt(&state, r.image_key.as_deref()).await;
        out.push(ReportResponse::from_record(r, url));
    }
    Ok(Json(out))
}

#[instrument(skip(state))]
pub async fn get_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReportResponse>> {
    let record = repo::get(&state.db, user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Report not found"))?;
    let url = presign_opt(&state, record.image_key.as_deref()).await;
    Ok(Json(ReportResponse::from_record(record, url)))
}

#[instrument(skip(state))]
pub async fn delete_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let image_key = repo::delete(&state.db, user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Report not found"))?;
    delete_quietly(&state, image_key.as_deref()).await;
    info!(%user_id, report_id = %id, "medical report deleted");
    Ok(StatusCode::NO_CONTENT)
}
