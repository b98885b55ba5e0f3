use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::Plan;
use super::services::next_expiry;
use crate::clients::razorpay::GatewayOrder;

#[derive(Debug, Clone, FromRow)]
pub struct PaymentOrder {
    pub id: String,
    pub user_id: Uuid,
    pub plan: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_id: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub starts_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.status == "active" && self.expires_at > now
    }
}

/// Outcome of applying a verified payment.
#[derive(Debug)]
pub enum Activation {
    OrderNotFound,
    /// The order was settled earlier; nothing changed.
    AlreadyPaid(Subscription),
    Activated(Subscription),
}

/// What a verified payment does to the account, decided from the locked rows.
#[derive(Debug)]
pub(crate) enum Settlement {
    AlreadyPaid(Subscription),
    Extend { plan: Plan, expires_at: OffsetDateTime },
}

/// A paid order with a subscription on file is settled; anything else
/// (including a paid order whose subscription row is gone) grants the plan.
pub(crate) fn settle(
    order: &PaymentOrder,
    current: Option<Subscription>,
    now: OffsetDateTime,
) -> anyhow::Result<Settlement> {
    if order.status == "paid" {
        if let Some(sub) = current {
            return Ok(Settlement::AlreadyPaid(sub));
        }
    }
    let plan = Plan::parse(&order.plan)
        .with_context(|| format!("order {} has unknown plan {}", order.id, order.plan))?;
    let previous = current
        .as_ref()
        .filter(|s| s.status == "active")
        .map(|s| s.expires_at);
    Ok(Settlement::Extend {
        plan,
        expires_at: next_expiry(now, previous, plan),
    })
}

/// Orders and subscriptions.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_order(&self, user_id: Uuid, plan: Plan, order: &GatewayOrder) -> anyhow::Result<()>;
    async fn get_subscription(&self, user_id: Uuid) -> anyhow::Result<Option<Subscription>>;
    /// Marks the order paid and extends the user's subscription, atomically.
    /// Only orders owned by `user_id` are found.
    async fn activate(
        &self,
        user_id: Uuid,
        order_id: &str,
        payment_id: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Activation>;
}

pub struct PgPaymentStore {
    db: PgPool,
}

impl PgPaymentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const SUB_COLUMNS: &str = "user_id, plan, status, razorpay_order_id, razorpay_payment_id, \
                           starts_at, expires_at, updated_at";

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_order(&self, user_id: Uuid, plan: Plan, order: &GatewayOrder) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_orders (id, user_id, plan, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, 'created')
            "#,
        )
        .bind(&order.id)
        .bind(user_id)
        .bind(plan.as_str())
        .bind(order.amount)
        .bind(&order.currency)
        .execute(&self.db)
        .await
        .context("insert payment order")?;
        Ok(())
    }

    async fn get_subscription(&self, user_id: Uuid) -> anyhow::Result<Option<Subscription>> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUB_COLUMNS} FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("get subscription")
    }

    async fn activate(
        &self,
        user_id: Uuid,
        order_id: &str,
        payment_id: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Activation> {
        let mut tx = self.db.begin().await.context("begin payment tx")?;

        let order: Option<PaymentOrder> = sqlx::query_as(
            r#"
            SELECT id, user_id, plan, amount, currency, status, payment_id, created_at
              FROM payment_orders
             WHERE id = $1 AND user_id = $2
               FOR UPDATE
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock payment order")?;
        let Some(order) = order else {
            return Ok(Activation::OrderNotFound);
        };

        let current: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUB_COLUMNS} FROM subscriptions WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock subscription")?;

        let (plan, expires_at) = match settle(&order, current, now)? {
            Settlement::AlreadyPaid(sub) => return Ok(Activation::AlreadyPaid(sub)),
            Settlement::Extend { plan, expires_at } => (plan, expires_at),
        };

        let sub: Subscription = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions (user_id, plan, status, razorpay_order_id, razorpay_payment_id,
                                       starts_at, expires_at, updated_at)
            VALUES ($1, $2, 'active', $3, $4, $5, $6, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = 'active',
                razorpay_order_id = EXCLUDED.razorpay_order_id,
                razorpay_payment_id = EXCLUDED.razorpay_payment_id,
                expires_at = EXCLUDED.expires_at,
                updated_at = EXCLUDED.updated_at
            RETURNING {SUB_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(plan.as_str())
        .bind(order_id)
        .bind(payment_id)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .context("upsert subscription")?;

        sqlx::query("UPDATE payment_orders SET status = 'paid', payment_id = $2 WHERE id = $1")
            .bind(order_id)
            .bind(payment_id)
            .execute(&mut *tx)
            .await
            .context("mark order paid")?;

        tx.commit().await.context("commit payment tx")?;
        Ok(Activation::Activated(sub))
    }
}
