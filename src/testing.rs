//! In-memory stand-ins for the upstream services, used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use bytes::Bytes;
use sqlx::types::Json;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::auth::repo::{Account, AccountStore};
use crate::auth::tokens::{JwtKeys, TokenKind};
use crate::clients::ai::{AiClient, AiError, CompletionRequest};
use crate::clients::razorpay::{GatewayOrder, NewOrder, PaymentGateway};
use crate::clients::{Mailer, NutritionApi};
use crate::nutrition::{FoodTable, NutrientsPer100g};
use crate::payments::repo::{settle, Activation, PaymentOrder, PaymentStore, Settlement, Subscription};
use crate::payments::Plan;
use crate::scans::repo::ScanStore;
use crate::scans::services::FoodAnalysis;
use crate::scans::ScanRecord;
use crate::state::AppState;
use crate::storage::StorageClient;

#[derive(Default)]
pub struct FakeStorage {
    fail_puts: bool,
    puts: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeStorage {
    /// Every upload fails.
    pub fn failing() -> Self {
        Self { fail_puts: true, ..Default::default() }
    }

    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, _body: Bytes, _ct: &str) -> anyhow::Result<()> {
        if self.fail_puts {
            anyhow::bail!("storage unavailable");
        }
        self.puts.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}"))
    }
}

/// Replays canned replies in order; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedAi {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedAi {
    pub fn replying(replies: &[&str]) -> Self {
        Self::with_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiClient for ScriptedAi {
    async fn complete(&self, req: CompletionRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(req);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AiError::EmptyResponse))
    }
}

#[derive(Default)]
pub struct FakeFoodTable {
    items: HashMap<String, NutrientsPer100g>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeFoodTable {
    pub fn with(items: &[(&str, NutrientsPer100g)]) -> Self {
        Self {
            items: items.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FoodTable for FakeFoodTable {
    async fn lookup(&self, name: &str) -> anyhow::Result<Option<NutrientsPer100g>> {
        self.calls.lock().unwrap().push(name.to_string());
        if self.fail {
            anyhow::bail!("food table unavailable");
        }
        Ok(self.items.get(&name.to_lowercase()).copied())
    }
}

#[derive(Default)]
pub struct FakeNutritionApi {
    items: HashMap<String, NutrientsPer100g>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeNutritionApi {
    pub fn with(items: &[(&str, NutrientsPer100g)]) -> Self {
        Self {
            items: items.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NutritionApi for FakeNutritionApi {
    async fn search(&self, name: &str) -> anyhow::Result<Option<NutrientsPer100g>> {
        self.calls.lock().unwrap().push(name.to_string());
        if self.fail {
            anyhow::bail!("nutrition api returned 503");
        }
        Ok(self.items.get(&name.to_lowercase()).copied())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<Vec<i64>>,
}

impl FakeGateway {
    pub fn order_amounts(&self) -> Vec<i64> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, order: NewOrder<'_>) -> anyhow::Result<GatewayOrder> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.amount);
        Ok(GatewayOrder {
            id: format!("order_test_{}", orders.len()),
            amount: order.amount,
            currency: order.currency.to_string(),
            status: "created".into(),
        })
    }
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), html.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAccounts {
    accounts: Mutex<Vec<Account>>,
}

#[async_trait]
impl AccountStore for FakeAccounts {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<Account>> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.iter().any(|a| a.email == email) {
            return Ok(None);
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            token_version: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        accounts.push(account.clone());
        Ok(Some(account))
    }

    async fn reset_password(
        &self,
        id: Uuid,
        token_version: i32,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.iter_mut().find(|a| a.id == id && a.token_version == token_version) {
            Some(a) => {
                a.password_hash = password_hash.to_string();
                a.token_version += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Scans and per-day usage kept in memory, with the same claim rules as Postgres.
#[derive(Default)]
pub struct FakeScanStore {
    records: Mutex<Vec<ScanRecord>>,
    usage: Mutex<HashMap<(Uuid, Date), i64>>,
}

impl FakeScanStore {
    pub fn records(&self) -> Vec<ScanRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Free scans used today.
    pub fn used(&self, user_id: Uuid) -> i64 {
        let today = OffsetDateTime::now_utc().date();
        let usage = self.usage.lock().unwrap();
        usage.get(&(user_id, today)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ScanStore for FakeScanStore {
    async fn claim_free_scan(&self, user_id: Uuid, day: Date, limit: i64) -> anyhow::Result<bool> {
        let mut usage = self.usage.lock().unwrap();
        let used = usage.entry((user_id, day)).or_insert(0);
        if *used >= limit {
            return Ok(false);
        }
        *used += 1;
        Ok(true)
    }

    async fn release_free_scan(&self, user_id: Uuid, day: Date) -> anyhow::Result<()> {
        if let Some(used) = self.usage.lock().unwrap().get_mut(&(user_id, day)) {
            *used = (*used - 1).max(0);
        }
        Ok(())
    }

    async fn insert(
        &self,
        user_id: Uuid,
        a: &FoodAnalysis,
        image_key: Option<&str>,
    ) -> anyhow::Result<ScanRecord> {
        let record = ScanRecord {
            id: Uuid::new_v4(),
            user_id,
            food_name: a.food_name.clone(),
            calories: a.totals.calories,
            protein: a.totals.protein,
            fat: a.totals.fat,
            carbs: a.totals.carbs,
            fiber: a.totals.fiber,
            health_tip: Some(a.health_tip.clone()),
            quick_advice: Some(a.quick_advice.clone()),
            items: Json(a.items.clone()),
            is_multi_item: a.is_multi_item,
            image_key: image_key.map(str::to_string),
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Option<String>>> {
        let mut records = self.records.lock().unwrap();
        let Some(pos) = records.iter().position(|r| r.id == id && r.user_id == user_id) else {
            return Ok(None);
        };
        Ok(Some(records.remove(pos).image_key))
    }
}

/// Orders and subscriptions in memory, settled by the same rules as Postgres.
#[derive(Default)]
pub struct FakePaymentStore {
    orders: Mutex<Vec<PaymentOrder>>,
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
}

impl FakePaymentStore {
    pub fn order_status(&self, order_id: &str) -> Option<String> {
        let orders = self.orders.lock().unwrap();
        orders.iter().find(|o| o.id == order_id).map(|o| o.status.clone())
    }

    /// Puts an active subscription on file directly.
    pub fn grant(&self, user_id: Uuid, plan: &str, expires_at: OffsetDateTime) {
        let now = OffsetDateTime::now_utc();
        self.subscriptions.lock().unwrap().insert(
            user_id,
            Subscription {
                user_id,
                plan: plan.to_string(),
                status: "active".into(),
                razorpay_order_id: None,
                razorpay_payment_id: None,
                starts_at: now,
                expires_at,
                updated_at: now,
            },
        );
    }
}

#[async_trait]
impl PaymentStore for FakePaymentStore {
    async fn insert_order(&self, user_id: Uuid, plan: Plan, order: &GatewayOrder) -> anyhow::Result<()> {
        self.orders.lock().unwrap().push(PaymentOrder {
            id: order.id.clone(),
            user_id,
            plan: plan.as_str().to_string(),
            amount: order.amount,
            currency: order.currency.clone(),
            status: "created".into(),
            payment_id: None,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn get_subscription(&self, user_id: Uuid) -> anyhow::Result<Option<Subscription>> {
        Ok(self.subscriptions.lock().unwrap().get(&user_id).cloned())
    }

    async fn activate(
        &self,
        user_id: Uuid,
        order_id: &str,
        payment_id: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Activation> {
        let mut orders = self.orders.lock().unwrap();
        let mut subs = self.subscriptions.lock().unwrap();
        let Some(order) = orders.iter_mut().find(|o| o.id == order_id && o.user_id == user_id) else {
            return Ok(Activation::OrderNotFound);
        };
        let current = subs.get(&user_id).cloned();
        let (plan, expires_at) = match settle(order, current.clone(), now)? {
            Settlement::AlreadyPaid(sub) => return Ok(Activation::AlreadyPaid(sub)),
            Settlement::Extend { plan, expires_at } => (plan, expires_at),
        };
        let sub = Subscription {
            user_id,
            plan: plan.as_str().to_string(),
            status: "active".into(),
            razorpay_order_id: Some(order_id.to_string()),
            razorpay_payment_id: Some(payment_id.to_string()),
            starts_at: current.map(|c| c.starts_at).unwrap_or(now),
            expires_at,
            updated_at: now,
        };
        subs.insert(user_id, sub.clone());
        order.status = "paid".into();
        order.payment_id = Some(payment_id.to_string());
        Ok(Activation::Activated(sub))
    }
}

/// One request as seen by [`stub_upstream`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// Local HTTP server that records every request and answers `status` with `reply`.
/// Returns its base url.
pub async fn stub_upstream(
    status: StatusCode,
    reply: serde_json::Value,
) -> (String, Arc<Mutex<Vec<CapturedRequest>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let app = axum::Router::new().fallback(move |uri: Uri, headers: HeaderMap, body: Bytes| {
        let log = log.clone();
        let reply = reply.clone();
        async move {
            log.lock().unwrap().push(CapturedRequest {
                path: uri.path().to_string(),
                authorization: headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                body: serde_json::from_slice(&body).unwrap_or_default(),
            });
            (status, axum::Json(reply))
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), seen)
}

/// Handles to the fakes wired into an `AppState`.
#[derive(Clone, Default)]
pub struct Fakes {
    pub storage: Arc<FakeStorage>,
    pub ai: Arc<ScriptedAi>,
    pub food_table: Arc<FakeFoodTable>,
    pub nutrition_api: Arc<FakeNutritionApi>,
    pub payments: Arc<FakeGateway>,
    pub mailer: Arc<FakeMailer>,
    pub accounts: Arc<FakeAccounts>,
    pub scans: Arc<FakeScanStore>,
    pub payment_store: Arc<FakePaymentStore>,
}

/// Bearer header value for a fresh access token.
pub fn bearer_for(state: &AppState, user_id: Uuid) -> String {
    let keys: JwtKeys = axum::extract::FromRef::from_ref(state);
    format!("Bearer {}", keys.sign(user_id, 0, TokenKind::Access).unwrap())
}
