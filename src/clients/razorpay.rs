use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::RazorpayConfig;

/// Order as returned by the payment gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewOrder<'a> {
    /// Amount in the currency's smallest unit (paise for INR).
    pub amount: i64,
    pub currency: &'a str,
    pub receipt: &'a str,
    pub notes: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, order: NewOrder<'_>) -> anyhow::Result<GatewayOrder>;
}

pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(http: reqwest::Client, cfg: &RazorpayConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, order: NewOrder<'_>) -> anyhow::Result<GatewayOrder> {
        let resp = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": order.amount,
                "currency": order.currency,
                "receipt": order.receipt,
                "notes": order.notes,
            }))
            .send()
            .await
            .context("razorpay create order request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body = %body, "razorpay order rejected");
            anyhow::bail!("payment gateway returned {status}");
        }

        let created: GatewayOrder = resp.json().await.context("razorpay order body")?;
        info!(order_id = %created.id, amount = created.amount, status = %created.status, "razorpay order created");
        Ok(created)
    }
}
