use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        CreateOrderRequest, CreateOrderResponse, Plan, SubscriptionResponse, VerifyPaymentRequest,
        VerifyPaymentResponse, CURRENCY,
    },
    repo::Activation,
    services,
};
use crate::{
    auth::AuthUser,
    clients::razorpay::NewOrder,
    error::{AppError, AppResult},
    extract::ApiJson,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/functions/create-razorpay-order", post(create_order))
        .route("/functions/verify-razorpay-payment", post(verify_payment))
        .route("/subscription", get(get_subscription))
}

#[instrument(skip(state, body))]
pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<CreateOrderRequest>,
) -> AppResult<Json<CreateOrderResponse>> {
    let plan = body
        .plan
        .as_deref()
        .and_then(Plan::parse)
        .ok_or_else(|| AppError::bad_request("plan must be 'monthly' or 'yearly'"))?;

    // Razorpay caps receipts at 40 characters.
    let receipt = format!("ns_{}", &Uuid::new_v4().simple().to_string()[..20]);
    let order = state
        .payments
        .create_order(NewOrder {
            amount: plan.amount(),
            currency: CURRENCY,
            receipt: &receipt,
            notes: json!({ "user_id": user_id, "plan": plan.as_str() }),
        })
        .await?;
    state.payment_store.insert_order(user_id, plan, &order).await?;
    info!(%user_id, order_id = %order.id, plan = plan.as_str(), amount = order.amount, "payment order created");

    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        key_id: state.config.razorpay.key_id.clone(),
        plan: plan.as_str(),
    }))
}

#[instrument(skip(state, body))]
pub async fn verify_payment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<VerifyPaymentRequest>,
) -> AppResult<Json<VerifyPaymentResponse>> {
    services::check_verify_request(&body)?;
    let order_id = body.razorpay_order_id.trim();
    let payment_id = body.razorpay_payment_id.trim();

    if !services::verify_signature(
        &state.config.razorpay.key_secret,
        order_id,
        payment_id,
        &body.razorpay_signature,
    ) {
        warn!(%user_id, order_id, "payment signature mismatch");
        return Err(AppError::bad_request("Invalid payment signature"));
    }

    let now = OffsetDateTime::now_utc();
    let sub = match state
        .payment_store
        .activate(user_id, order_id, payment_id, now)
        .await?
    {
        Activation::OrderNotFound => return Err(AppError::not_found("Order not found")),
        Activation::AlreadyPaid(sub) => {
            info!(%user_id, order_id, "payment already applied");
            sub
        }
        Activation::Activated(sub) => {
            info!(%user_id, order_id, plan = %sub.plan, expires_at = %sub.expires_at, "subscription activated");
            sub
        }
    };

    Ok(Json(VerifyPaymentResponse {
        success: true,
        plan: sub.plan,
        expires_at: sub.expires_at,
    }))
}

#[instrument(skip(state))]
pub async fn get_subscription(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<SubscriptionResponse>> {
    let now = OffsetDateTime::now_utc();
    let resp = match state.payment_store.get_subscription(user_id).await? {
        Some(sub) => SubscriptionResponse {
            is_active: sub.is_active(now),
            status: if sub.expires_at <= now { "expired".into() } else { sub.status },
            plan: Some(sub.plan),
            expires_at: Some(sub.expires_at),
        },
        None => SubscriptionResponse {
            plan: None,
            status: "none".into(),
            expires_at: None,
            is_active: false,
        },
    };
    Ok(Json(resp))
}
