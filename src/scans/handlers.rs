use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AnalyzeFoodRequest, AnalyzeFoodResponse, DailySummary, Pagination, Remaining,
        ScanResponse, SummaryQuery,
    },
    repo, services,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    goals,
    images::services::{decode_image, delete_quietly, presign_opt, store_image},
    nutrition::NutritionSources,
    state::AppState,
};

pub fn function_routes() -> Router<AppState> {
    Router::new().route("/functions/analyze-food", post(analyze_food))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/scans", get(list_scans))
        .route("/scans/summary", get(daily_summary))
        .route("/scans/:id", get(get_scan).delete(delete_scan))
}

#[instrument(skip(state, body))]
pub async fn analyze_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<AnalyzeFoodRequest>,
) -> AppResult<Json<AnalyzeFoodResponse>> {
    let raw = body
        .image
        .ok_or_else(|| AppError::bad_request("image is required"))?;
    let image = decode_image(&raw, state.config.limits.max_image_bytes)?;

    let quota = services::claim_scan_quota(&state, user_id).await?;

    let sources = NutritionSources::from_state(&state);
    let analysis = match services::analyze_food_image(state.ai.as_ref(), &sources, &image).await {
        Ok(analysis) => analysis,
        Err(e) => {
            services::release_scan_quota(&state, user_id, quota).await;
            return Err(e);
        }
    };

    // The analysis is still useful without the photo.
    let image_key = match store_image(&state, "scans", user_id, &image).await {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(error = %e, %user_id, "scan image upload failed");
            None
        }
    };

    let record = state
        .scans
        .insert(user_id, &analysis, image_key.as_deref())
        .await?;
    info!(
        %user_id,
        scan_id = %record.id,
        items = analysis.items.len(),
        calories = analysis.totals.calories,
        "food scan stored"
    );

    let image_url = presign_opt(&state, image_key.as_deref()).await;
    Ok(Json(AnalyzeFoodResponse {
        scan_id: record.id,
        food_name: analysis.food_name,
        calories: analysis.totals.calories,
        protein: analysis.totals.protein,
        fat: analysis.totals.fat,
        carbs: analysis.totals.carbs,
        fiber: analysis.totals.fiber,
        health_tip: analysis.health_tip,
        quick_advice: analysis.quick_advice,
        items: analysis.items,
        is_multi_item: analysis.is_multi_item,
        image_url,
    }))
}

#[instrument(skip(state))]
pub async fn list_scans(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<ScanResponse>>> {
    let records = repo::list_by_user(&state.db, user_id, page.limit(), page.offset()).await?;
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        let url = presign_opt(&state, r.image_key.as_deref()).await;
        out.push(ScanResponse::from_record(r, url));
    }
    Ok(Json(out))
}

#[instrument(skip(state))]
pub async fn get_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ScanResponse>> {
    let record = repo::get(&state.db, user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Scan not found"))?;
    let url = presign_opt(&state, record.image_key.as_deref()).await;
    Ok(Json(ScanResponse::from_record(record, url)))
}

#[instrument(skip(state))]
pub async fn delete_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let image_key = state
        .scans
        .delete(user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Scan not found"))?;
    delete_quietly(&state, image_key.as_deref()).await;
    info!(%user_id, scan_id = %id, "scan deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn parse_day(date: Option<&str>) -> AppResult<Date> {
    match date {
        None => Ok(OffsetDateTime::now_utc().date()),
        Some(s) => Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
            .map_err(|_| AppError::bad_request("date must be YYYY-MM-DD")),
    }
}

#[instrument(skip(state))]
pub async fn daily_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SummaryQuery>,
) -> AppResult<Json<DailySummary>> {
    let day = parse_day(q.date.as_deref())?;
    let (from, to) = services::utc_day_bounds(day);

    let ((consumed, scan_count), (goals, _)) = tokio::try_join!(
        repo::totals_between(&state.db, user_id, from, to),
        goals::services::effective_goals(&state.db, user_id),
    )?;
    let consumed = consumed.rounded();

    Ok(Json(DailySummary {
        date: day.to_string(),
        remaining: Remaining::of(&goals, &consumed),
        consumed,
        goals,
        scan_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use crate::clients::ai::AiError;
    use crate::nutrition::NutrientsPer100g;
    use crate::testing::{bearer_for, FakeFoodTable, FakeStorage, Fakes, ScriptedAi};
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::sync::Arc;
    use time::macros::date;
    use tower::ServiceExt;

    #[test]
    fn parses_iso_day_and_rejects_garbage() {
        assert_eq!(parse_day(Some("2026-02-28")).unwrap(), date!(2026 - 02 - 28));
        assert!(matches!(parse_day(Some("28/02/2026")), Err(AppError::BadRequest(_))));
        assert!(parse_day(Some("2026-02-30")).is_err());
        assert!(parse_day(None).is_ok());
    }

    fn analyze_request(auth: Option<String>, body: String) -> Request<Body> {
        let mut req = Request::post("/api/v1/functions/analyze-food")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            req = req.header(header::AUTHORIZATION, auth);
        }
        req.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn analyze_requires_auth() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(analyze_request(None, r#"{"image":"abc"}"#.into()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oversized_image_is_rejected_before_any_upstream_call() {
        let state = AppState::fake();
        let auth = bearer_for(&state, Uuid::new_v4());
        let huge = "A".repeat(state.config.limits.max_image_bytes * 2);
        let body = serde_json::json!({ "image": huge }).to_string();

        let res = build_app(state)
            .oneshot(analyze_request(Some(auth), body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_image_is_bad_request() {
        let state = AppState::fake();
        let auth = bearer_for(&state, Uuid::new_v4());
        let res = build_app(state)
            .oneshot(analyze_request(Some(auth), "{}".into()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    fn rice() -> NutrientsPer100g {
        NutrientsPer100g { calories: 130.0, protein: 2.7, fat: 0.3, carbs: 28.0, fiber: 0.4 }
    }

    fn photo_body() -> String {
        let jpeg = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F']);
        serde_json::json!({ "image": format!("data:image/jpeg;base64,{jpeg}") }).to_string()
    }

    /// Fakes scripted for `scans` successful rice analyses.
    fn rice_fakes(scans: usize) -> Fakes {
        let mut replies = Vec::new();
        for _ in 0..scans {
            replies.push(r#"{"items": [{"name": "rice", "portionGrams": 150}]}"#);
            replies.push(r#"{"healthTip": "Add some protein.", "quickAdvice": "Pair with dal."}"#);
        }
        Fakes {
            ai: Arc::new(ScriptedAi::replying(&replies)),
            food_table: Arc::new(FakeFoodTable::with(&[("rice", rice())])),
            ..Fakes::default()
        }
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn analyze_food_stores_the_scan_and_returns_a_signed_url() {
        let fakes = rice_fakes(1);
        let state = AppState::fake_with(&fakes);
        let user = Uuid::new_v4();
        let auth = bearer_for(&state, user);

        let (status, json) = send(&state, analyze_request(Some(auth), photo_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["foodName"], "rice");
        assert_eq!(json["calories"], 195.0);
        assert_eq!(json["healthTip"], "Add some protein.");
        assert_eq!(json["quickAdvice"], "Pair with dal.");
        assert_eq!(json["isMultiItem"], false);
        assert_eq!(json["items"][0]["source"], "local");

        let puts = fakes.storage.puts();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].starts_with(&format!("scans/{user}/")));
        assert!(puts[0].ends_with(".jpg"));
        assert_eq!(json["imageUrl"], format!("https://fake.local/{}", puts[0]));

        let stored = fakes.scans.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(json["scanId"], stored[0].id.to_string());
        assert_eq!(stored[0].image_key.as_deref(), Some(puts[0].as_str()));
        assert_eq!(fakes.scans.used(user), 1);
    }

    #[tokio::test]
    async fn failed_upload_still_stores_the_scan_without_an_image() {
        let fakes = Fakes {
            storage: Arc::new(FakeStorage::failing()),
            ..rice_fakes(1)
        };
        let state = AppState::fake_with(&fakes);
        let auth = bearer_for(&state, Uuid::new_v4());

        let (status, json) = send(&state, analyze_request(Some(auth), photo_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("imageUrl").is_none());
        assert_eq!(fakes.scans.records()[0].image_key, None);
    }

    #[tokio::test]
    async fn fourth_free_scan_of_the_day_needs_premium() {
        let fakes = rice_fakes(3);
        let state = AppState::fake_with(&fakes);
        let user = Uuid::new_v4();
        let auth = bearer_for(&state, user);

        for _ in 0..3 {
            let (status, _) = send(&state, analyze_request(Some(auth.clone()), photo_body())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, json) = send(&state, analyze_request(Some(auth.clone()), photo_body())).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            json["error"],
            "Daily free scan limit reached, upgrade to premium for unlimited scans"
        );
        // Refused before the vision call: 3 scans, 2 calls each.
        assert_eq!(fakes.ai.requests().len(), 6);
    }

    #[tokio::test]
    async fn deleting_a_scan_does_not_give_the_free_scan_back() {
        let fakes = rice_fakes(3);
        let state = AppState::fake_with(&fakes);
        let user = Uuid::new_v4();
        let auth = bearer_for(&state, user);

        for _ in 0..3 {
            let (status, _) = send(&state, analyze_request(Some(auth.clone()), photo_body())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let victim = fakes.scans.records()[0].clone();
        let delete = Request::delete(format!("/api/v1/scans/{}", victim.id))
            .header(header::AUTHORIZATION, auth.clone())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(fakes.scans.records().len(), 2);
        assert_eq!(fakes.storage.deletes(), vec![victim.image_key.unwrap()]);

        let (status, _) = send(&state, analyze_request(Some(auth), photo_body())).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(fakes.scans.used(user), 3);
    }

    #[tokio::test]
    async fn failed_analysis_hands_the_free_scan_back() {
        let fakes = Fakes {
            ai: Arc::new(ScriptedAi::with_results(vec![Err(AiError::RateLimited)])),
            ..Fakes::default()
        };
        let state = AppState::fake_with(&fakes);
        let user = Uuid::new_v4();
        let auth = bearer_for(&state, user);

        let (status, _) = send(&state, analyze_request(Some(auth), photo_body())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(fakes.scans.used(user), 0);
        assert!(fakes.scans.records().is_empty());
    }

    #[tokio::test]
    async fn premium_accounts_are_not_counted() {
        let fakes = rice_fakes(1);
        let user = Uuid::new_v4();
        fakes.payment_store.grant(user, "monthly", OffsetDateTime::now_utc() + time::Duration::days(3));
        let mut state = AppState::fake_with(&fakes);
        let mut config = (*state.config).clone();
        config.limits.free_daily_scans = 0;
        state.config = Arc::new(config);
        let auth = bearer_for(&state, user);

        let (status, _) = send(&state, analyze_request(Some(auth), photo_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fakes.scans.used(user), 0);
    }
}
