use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{
        AccountInfo, Credentials, MessageResponse, PasswordResetConfirm, PasswordResetRequest,
        RefreshRequest, Session,
    },
    extractors::AuthUser,
    password::{check_password_policy, clean_email, hash_password, verify_password},
    repo::Account,
    tokens::{JwtKeys, TokenKind},
};
use crate::{
    error::{AppError, AppResult},
    extract::ApiJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/functions/password-reset", post(request_password_reset))
        .route("/functions/password-reset/confirm", post(confirm_password_reset))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

const RESET_SENT: &str = "If an account exists for that email, a reset link has been sent.";

fn open_session(keys: &JwtKeys, account: Account) -> AppResult<Session> {
    Ok(Session {
        access_token: keys.sign(account.id, account.token_version, TokenKind::Access)?,
        refresh_token: keys.sign(account.id, account.token_version, TokenKind::Refresh)?,
        token_type: "Bearer",
        expires_in: keys.access_ttl().whole_seconds(),
        user: AccountInfo {
            id: account.id,
            email: account.email,
        },
    })
}

#[instrument(skip_all)]
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Credentials>,
) -> AppResult<Json<Session>> {
    let email = clean_email(&body.email)?;
    check_password_policy(&body.password)?;

    let hash = hash_password(&body.password)?;
    let Some(account) = state.accounts.create(&email, &hash).await? else {
        warn!("registration for an existing email");
        return Err(AppError::Conflict("Email already registered".into()));
    };

    info!(user_id = %account.id, "account created");
    Ok(Json(open_session(&JwtKeys::from_ref(&state), account)?))
}

#[instrument(skip_all)]
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Credentials>,
) -> AppResult<Json<Session>> {
    let email = clean_email(&body.email)?;
    let bad_credentials = || AppError::Unauthorized("Invalid email or password".into());

    let account = state
        .accounts
        .find_by_email(&email)
        .await?
        .ok_or_else(bad_credentials)?;
    if !verify_password(&body.password, &account.password_hash)? {
        warn!(user_id = %account.id, "wrong password");
        return Err(bad_credentials());
    }

    info!(user_id = %account.id, "signed in");
    Ok(Json(open_session(&JwtKeys::from_ref(&state), account)?))
}

#[instrument(skip_all)]
async fn refresh(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> AppResult<Json<Session>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify(&body.refresh_token, TokenKind::Refresh)
        .map_err(|e| {
            warn!(error = %e, "refresh rejected");
            AppError::Unauthorized("Invalid or expired refresh token".into())
        })?;

    let account = state
        .accounts
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;
    if account.token_version != claims.ver {
        warn!(user_id = %account.id, "refresh token predates a password reset");
        return Err(AppError::Unauthorized("Invalid or expired refresh token".into()));
    }
    Ok(Json(open_session(&keys, account)?))
}

#[instrument(skip(state))]
async fn me(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> AppResult<Json<AccountInfo>> {
    let account = state
        .accounts
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;
    Ok(Json(AccountInfo {
        id: account.id,
        email: account.email,
    }))
}

fn reset_link(public_url: &str, token: &str) -> String {
    format!("{}/reset-password?token={token}", public_url.trim_end_matches('/'))
}

fn reset_email_html(link: &str) -> String {
    format!(
        "<p>We received a request to reset your NutriScan password.</p>\
         <p><a href=\"{link}\">Reset your password</a></p>\
         <p>If you did not ask for this, you can ignore this email.</p>"
    )
}

/// Answers identically whether or not the account exists; mail failures are only logged.
#[instrument(skip_all)]
async fn request_password_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = clean_email(&body.email)?;

    match state.accounts.find_by_email(&email).await? {
        Some(account) => {
            let token =
                JwtKeys::from_ref(&state).sign(account.id, account.token_version, TokenKind::Reset)?;
            let html = reset_email_html(&reset_link(&state.config.public_url, &token));
            match state
                .mailer
                .send(&account.email, "Reset your NutriScan password", &html)
                .await
            {
                Ok(()) => info!(user_id = %account.id, "reset email sent"),
                Err(e) => error!(user_id = %account.id, error = %e, "reset email failed"),
            }
        }
        None => info!("reset requested for unknown email"),
    }

    Ok(Json(MessageResponse { message: RESET_SENT }))
}

#[instrument(skip_all)]
async fn confirm_password_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PasswordResetConfirm>,
) -> AppResult<Json<MessageResponse>> {
    check_password_policy(&body.password)?;

    let claims = JwtKeys::from_ref(&state)
        .verify(&body.token, TokenKind::Reset)
        .map_err(|e| {
            warn!(error = %e, "reset token rejected");
            AppError::Unauthorized("Invalid or expired reset link".into())
        })?;

    // Succeeds once per token: the version moves on with the new hash.
    let hash = hash_password(&body.password)?;
    if !state.accounts.reset_password(claims.sub, claims.ver, &hash).await? {
        warn!(user_id = %claims.sub, "reset link already used or account gone");
        return Err(AppError::Unauthorized("Invalid or expired reset link".into()));
    }

    info!(user_id = %claims.sub, "password changed via reset link");
    Ok(Json(MessageResponse {
        message: "Password updated",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use crate::testing::Fakes;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn post_json(state: &AppState, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let res = build_app(state.clone())
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    fn token_from_email(html: &str) -> String {
        let start = html.find("token=").unwrap() + "token=".len();
        html[start..].split('"').next().unwrap().to_string()
    }

    #[test]
    fn reset_link_points_at_the_frontend() {
        assert_eq!(
            reset_link("https://app.test/", "abc.def"),
            "https://app.test/reset-password?token=abc.def"
        );
        assert!(reset_email_html("https://x/y").contains("href=\"https://x/y\""));
    }

    #[tokio::test]
    async fn session_exposes_tokens_not_the_hash() {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let session = open_session(
            &keys,
            Account {
                id: Uuid::nil(),
                email: "asha@example.com".into(),
                password_hash: "x".into(),
                token_version: 0,
                created_at: time::OffsetDateTime::UNIX_EPOCH,
            },
        )
        .unwrap();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 300);
        assert_eq!(json["user"]["email"], "asha@example.com");
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn register_then_login_and_duplicate_email() {
        let state = AppState::fake();
        let creds = json!({ "email": " Asha@Example.com ", "password": "mango-lassi-42" });

        let (status, json) = post_json(&state, "/api/v1/auth/register", creds.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["email"], "asha@example.com");

        let (status, _) = post_json(&state, "/api/v1/auth/register", creds.clone()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, json) = post_json(&state, "/api/v1/auth/login", creds).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["access_token"].as_str().is_some());

        let wrong = json!({ "email": "asha@example.com", "password": "not-the-password" });
        let (status, _) = post_json(&state, "/api/v1/auth/login", wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let state = AppState::fake();
        let (status, json) = post_json(
            &state,
            "/api/v1/auth/register",
            json!({ "email": "not-an-email", "password": "longenough" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "A valid email is required");

        let (status, _) = post_json(
            &state,
            "/api/v1/auth/register",
            json!({ "email": "asha@example.com", "password": "short" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let state = AppState::fake();
        let access = JwtKeys::from_ref(&state).sign(Uuid::new_v4(), 0, TokenKind::Access).unwrap();
        let (status, _) = post_json(&state, "/api/v1/auth/refresh", json!({ "refreshToken": access })).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reset_confirm_requires_a_reset_token() {
        let state = AppState::fake();
        let refresh = JwtKeys::from_ref(&state).sign(Uuid::new_v4(), 0, TokenKind::Refresh).unwrap();
        let (status, json) = post_json(
            &state,
            "/api/v1/functions/password-reset/confirm",
            json!({ "token": refresh, "newPassword": "brand-new-pass" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or expired reset link");
    }

    #[tokio::test]
    async fn reset_link_works_once_and_retires_old_sessions() {
        let fakes = Fakes::default();
        let state = AppState::fake_with(&fakes);
        let creds = json!({ "email": "asha@example.com", "password": "old-password-1" });
        let (_, session) = post_json(&state, "/api/v1/auth/register", creds.clone()).await;
        let old_refresh = session["refresh_token"].clone();

        let (status, json) = post_json(
            &state,
            "/api/v1/functions/password-reset",
            json!({ "email": "ASHA@example.com" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], RESET_SENT);
        let sent = fakes.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "asha@example.com");
        let token = token_from_email(&sent[0].2);

        let confirm = json!({ "token": token, "newPassword": "new-password-2" });
        let uri = "/api/v1/functions/password-reset/confirm";
        let (status, _) = post_json(&state, uri, confirm.clone()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = post_json(&state, uri, confirm).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or expired reset link");

        let stale = json!({ "refresh_token": old_refresh });
        let (status, _) = post_json(&state, "/api/v1/auth/refresh", stale).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = post_json(&state, "/api/v1/auth/login", creds).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let fresh = json!({ "email": "asha@example.com", "password": "new-password-2" });
        let (status, session) = post_json(&state, "/api/v1/auth/login", fresh).await;
        assert_eq!(status, StatusCode::OK);
        let refresh = json!({ "refresh_token": session["refresh_token"].clone() });
        let (status, _) = post_json(&state, "/api/v1/auth/refresh", refresh).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reset_request_does_not_reveal_unknown_emails() {
        let fakes = Fakes::default();
        let state = AppState::fake_with(&fakes);
        let (status, json) = post_json(
            &state,
            "/api/v1/functions/password-reset",
            json!({ "email": "nobody@example.com" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], RESET_SENT);
        assert!(fakes.mailer.sent().is_empty());

        let (status, _) = post_json(&state, "/api/v1/functions/password-reset", json!({ "email": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
