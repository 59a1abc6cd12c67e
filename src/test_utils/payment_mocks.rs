//! In-memory mock implementations for the payment reconciliation ports.
//!
//! The mocks enforce the same uniqueness and compare-and-swap rules the
//! Postgres adapters rely on, so concurrency properties can be tested here.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            payment_gateway::{GatewayCheckout, PaymentGateway},
            webhook_verifier::WebhookVerifier,
        },
        use_cases::reconciliation::{
            ActivationKeyProfile, ActivationKeyRepoTrait, CreatePaymentInput, KeyInsertOutcome,
            NewOnlineKeyInput, OnlinePaymentProfile, OnlinePaymentRepoTrait, PaymentClaim,
            ReconciliationSettings, ReconciliationUseCases, SalesChannelRepoTrait,
            UserEntitlementRepoTrait, next_expiry,
        },
    },
    domain::entities::{
        entitlement::UserEntitlement, payment_source::PaymentSource,
        payment_status::PaymentStatus,
    },
    infra::rate_limit::RateLimiterTrait,
};

// ============================================================================
// InMemoryOnlinePaymentRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryOnlinePaymentRepo {
    pub payments: Mutex<HashMap<String, OnlinePaymentProfile>>,
    pub writes: AtomicUsize,
    /// Key id linked by a simulated concurrent writer just before the next claim.
    preempt_claim: Mutex<Option<Uuid>>,
}

impl InMemoryOnlinePaymentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, payment: OnlinePaymentProfile) {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.checkout_id.clone(), payment);
    }

    pub fn get(&self, checkout_id: &str) -> Option<OnlinePaymentProfile> {
        self.payments.lock().unwrap().get(checkout_id).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn preempt_next_claim_with(&self, key_id: Uuid) {
        *self.preempt_claim.lock().unwrap() = Some(key_id);
    }
}

#[async_trait]
impl OnlinePaymentRepoTrait for InMemoryOnlinePaymentRepo {
    async fn get_by_checkout_id(
        &self,
        checkout_id: &str,
    ) -> AppResult<Option<OnlinePaymentProfile>> {
        tokio::task::yield_now().await;
        Ok(self.get(checkout_id))
    }

    async fn upsert_gateway_status(
        &self,
        input: &CreatePaymentInput,
    ) -> AppResult<OnlinePaymentProfile> {
        tokio::task::yield_now().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now().naive_utc();
        let mut payments = self.payments.lock().unwrap();

        let payment = payments
            .entry(input.checkout_id.clone())
            .and_modify(|p| {
                if !p.status.is_terminal() {
                    p.status = input.status;
                }
                p.invoice_id = p.invoice_id.take().or_else(|| input.invoice_id.clone());
                p.payment_method = p
                    .payment_method
                    .take()
                    .or_else(|| input.payment_method.clone());
                p.updated_at = Some(now);
            })
            .or_insert_with(|| OnlinePaymentProfile {
                id: Uuid::new_v4(),
                checkout_id: input.checkout_id.clone(),
                status: input.status,
                customer_email: input.customer_email.clone(),
                customer_name: input.customer_name.clone(),
                amount: input.amount,
                currency: input.currency.clone(),
                duration_days: input.duration_days,
                activation_key_id: None,
                user_id: input.user_id,
                invoice_id: input.invoice_id.clone(),
                payment_method: input.payment_method.clone(),
                paid_at: None,
                created_at: Some(now),
                updated_at: Some(now),
            });
        Ok(payment.clone())
    }

    async fn claim_for_key(&self, checkout_id: &str, claim: &PaymentClaim) -> AppResult<bool> {
        tokio::task::yield_now().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut payments = self.payments.lock().unwrap();
        let Some(payment) = payments.get_mut(checkout_id) else {
            return Ok(false);
        };

        if let Some(key_id) = self.preempt_claim.lock().unwrap().take() {
            payment.activation_key_id = Some(key_id);
            payment.status = PaymentStatus::Paid;
        }

        if payment.activation_key_id.is_some() {
            return Ok(false);
        }
        payment.activation_key_id = Some(claim.activation_key_id);
        payment.status = PaymentStatus::Paid;
        payment.paid_at = Some(claim.paid_at);
        if claim.invoice_id.is_some() {
            payment.invoice_id = claim.invoice_id.clone();
        }
        if claim.payment_method.is_some() {
            payment.payment_method = claim.payment_method.clone();
        }
        payment.updated_at = Some(claim.paid_at);
        Ok(true)
    }
}

// ============================================================================
// InMemoryActivationKeyRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryActivationKeyRepo {
    pub keys: Mutex<HashMap<Uuid, ActivationKeyProfile>>,
    pub insert_attempts: AtomicUsize,
    pub checkout_conflicts: AtomicUsize,
    /// Codes handed to the next inserts as if already taken.
    taken_codes: AtomicUsize,
}

impl InMemoryActivationKeyRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ActivationKeyProfile) -> ActivationKeyProfile {
        self.keys.lock().unwrap().insert(key.id, key.clone());
        key
    }

    pub fn get(&self, id: Uuid) -> Option<ActivationKeyProfile> {
        self.keys.lock().unwrap().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    /// Report the next `n` inserts as code collisions.
    pub fn collide_next_codes(&self, n: usize) {
        self.taken_codes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivationKeyRepoTrait for InMemoryActivationKeyRepo {
    async fn insert_online(&self, input: &NewOnlineKeyInput) -> AppResult<KeyInsertOutcome> {
        tokio::task::yield_now().await;
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let mut keys = self.keys.lock().unwrap();

        if keys
            .values()
            .any(|k| k.source_checkout_id.as_deref() == Some(input.source_checkout_id.as_str()))
        {
            self.checkout_conflicts.fetch_add(1, Ordering::SeqCst);
            return Ok(KeyInsertOutcome::CheckoutConflict);
        }
        if self
            .taken_codes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
            || keys.values().any(|k| k.key_code == input.key_code)
        {
            return Ok(KeyInsertOutcome::CodeCollision);
        }

        let key = ActivationKeyProfile {
            id: Uuid::new_v4(),
            key_code: input.key_code.clone(),
            duration_days: input.duration_days,
            payment_source: PaymentSource::Online,
            sales_point_id: Some(input.sales_point_id),
            price_paid: input.price_paid,
            is_used: false,
            used_by: None,
            used_at: None,
            expires_at: None,
            payment_id: None,
            source_checkout_id: Some(input.source_checkout_id.clone()),
            notes: input.notes.clone(),
            created_at: Some(Utc::now().naive_utc()),
        };
        keys.insert(key.id, key.clone());
        Ok(KeyInsertOutcome::Created(key))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ActivationKeyProfile>> {
        tokio::task::yield_now().await;
        Ok(self.get(id))
    }

    async fn get_by_source_checkout(
        &self,
        checkout_id: &str,
    ) -> AppResult<Option<ActivationKeyProfile>> {
        tokio::task::yield_now().await;
        Ok(self
            .keys
            .lock()
            .unwrap()
            .values()
            .find(|k| k.source_checkout_id.as_deref() == Some(checkout_id))
            .cloned())
    }

    async fn set_payment_id(&self, key_id: Uuid, payment_id: Uuid) -> AppResult<()> {
        let mut keys = self.keys.lock().unwrap();
        let key = keys.get_mut(&key_id).ok_or(AppError::NotFound)?;
        key.payment_id = Some(payment_id);
        Ok(())
    }

    async fn mark_used(
        &self,
        key_id: Uuid,
        user_id: Uuid,
        used_at: NaiveDateTime,
        expires_at: Option<NaiveDateTime>,
    ) -> AppResult<()> {
        let mut keys = self.keys.lock().unwrap();
        let key = keys.get_mut(&key_id).ok_or(AppError::NotFound)?;
        key.is_used = true;
        key.used_by = Some(user_id);
        key.used_at = Some(used_at);
        key.expires_at = expires_at;
        Ok(())
    }

    async fn reset_usage(&self, key_id: Uuid) -> AppResult<()> {
        let mut keys = self.keys.lock().unwrap();
        let key = keys.get_mut(&key_id).ok_or(AppError::NotFound)?;
        key.is_used = false;
        key.used_by = None;
        key.used_at = None;
        key.expires_at = None;
        Ok(())
    }

    async fn discard_unlinked(&self, key_id: Uuid) -> AppResult<bool> {
        let mut keys = self.keys.lock().unwrap();
        match keys.get(&key_id) {
            Some(key) if !key.is_used && key.payment_id.is_none() => {
                keys.remove(&key_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// InMemoryUserEntitlementRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserEntitlementRepo {
    pub users: Mutex<HashMap<Uuid, UserEntitlement>>,
    pub grant_calls: AtomicUsize,
    /// When set, every grant fails with a database error.
    pub fail_grants: AtomicBool,
}

impl InMemoryUserEntitlementRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, is_paid: bool, subscription_expires_at: Option<NaiveDateTime>) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.lock().unwrap().insert(
            user_id,
            UserEntitlement {
                user_id,
                is_paid,
                subscription_expires_at,
            },
        );
        user_id
    }

    pub fn get_user(&self, user_id: Uuid) -> Option<UserEntitlement> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }
}

#[async_trait]
impl UserEntitlementRepoTrait for InMemoryUserEntitlementRepo {
    async fn get(&self, user_id: Uuid) -> AppResult<Option<UserEntitlement>> {
        tokio::task::yield_now().await;
        Ok(self.get_user(user_id))
    }

    async fn grant(
        &self,
        user_id: Uuid,
        duration_days: i32,
        now: NaiveDateTime,
    ) -> AppResult<Option<NaiveDateTime>> {
        tokio::task::yield_now().await;
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(AppError::Database("simulated write failure".into()));
        }
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        let expires_at = next_expiry(user, now, duration_days)?;
        user.is_paid = true;
        user.subscription_expires_at = expires_at;
        Ok(expires_at)
    }
}

// ============================================================================
// InMemorySalesChannelRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySalesChannelRepo {
    pub channels: Mutex<HashMap<String, Uuid>>,
}

impl InMemorySalesChannelRepo {
    pub fn with_channel(code: &str, id: Uuid) -> Self {
        Self {
            channels: Mutex::new(HashMap::from([(code.to_string(), id)])),
        }
    }
}

#[async_trait]
impl SalesChannelRepoTrait for InMemorySalesChannelRepo {
    async fn find_active_by_code(&self, code: &str) -> AppResult<Option<Uuid>> {
        Ok(self.channels.lock().unwrap().get(code).copied())
    }
}

// ============================================================================
// StubPaymentGateway
// ============================================================================

/// Gateway returning canned checkouts, with a call counter and failure switch.
#[derive(Default)]
pub struct StubPaymentGateway {
    pub checkouts: Mutex<HashMap<String, GatewayCheckout>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl StubPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_checkout(&self, checkout: GatewayCheckout) {
        self.checkouts
            .lock()
            .unwrap()
            .insert(checkout.id.clone(), checkout);
    }
}

#[async_trait]
impl PaymentGateway for StubPaymentGateway {
    async fn get_checkout(&self, checkout_id: &str) -> AppResult<GatewayCheckout> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable("gateway timed out".into()));
        }
        self.checkouts
            .lock()
            .unwrap()
            .get(checkout_id)
            .cloned()
            .ok_or_else(|| AppError::UpstreamUnavailable("checkout not found at gateway".into()))
    }
}

// ============================================================================
// Webhook verifier stubs
// ============================================================================

/// Accepts a delivery only when the signature equals the configured value.
pub struct StaticSignatureVerifier {
    pub expected: Option<String>,
}

impl WebhookVerifier for StaticSignatureVerifier {
    fn verify(&self, _payload: &str, signature: Option<&str>) -> AppResult<()> {
        match (&self.expected, signature) {
            (None, _) => Ok(()),
            (Some(expected), Some(sig)) if expected == sig => Ok(()),
            (Some(_), Some(_)) => Err(AppError::Unauthorized("invalid signature".into())),
            (Some(_), None) => Err(AppError::Unauthorized("missing signature".into())),
        }
    }

    fn signature_required(&self) -> bool {
        self.expected.is_some()
    }
}

// ============================================================================
// CountingRateLimiter
// ============================================================================

/// Rate limiter that admits the first `max` calls per key and counts every call.
pub struct CountingRateLimiter {
    pub calls: AtomicUsize,
    counts: Mutex<HashMap<String, u64>>,
    max: u64,
}

impl CountingRateLimiter {
    pub fn new(max: u64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            counts: Mutex::new(HashMap::new()),
            max,
        }
    }

    pub fn permissive() -> Self {
        Self::new(u64::MAX)
    }
}

#[async_trait]
impl RateLimiterTrait for CountingRateLimiter {
    async fn allow(&self, key: &str, _max: u64, _window_ms: u64) -> AppResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count <= self.max)
    }
}

// ============================================================================
// ReconciliationMocks
// ============================================================================

pub const TEST_ONLINE_SALES_POINT_CODE: &str = "ONLINE";
pub const TEST_DEFAULT_DURATION_DAYS: i32 = 365;

/// The full set of in-memory ports behind a `ReconciliationUseCases`.
#[derive(Clone)]
pub struct ReconciliationMocks {
    pub payments: Arc<InMemoryOnlinePaymentRepo>,
    pub keys: Arc<InMemoryActivationKeyRepo>,
    pub entitlements: Arc<InMemoryUserEntitlementRepo>,
    pub sales_channels: Arc<InMemorySalesChannelRepo>,
    pub gateway: Arc<StubPaymentGateway>,
    pub online_sales_point_id: Uuid,
}

impl ReconciliationMocks {
    pub fn new() -> Self {
        let online_sales_point_id = Uuid::new_v4();
        Self {
            payments: Arc::new(InMemoryOnlinePaymentRepo::new()),
            keys: Arc::new(InMemoryActivationKeyRepo::new()),
            entitlements: Arc::new(InMemoryUserEntitlementRepo::new()),
            sales_channels: Arc::new(InMemorySalesChannelRepo::with_channel(
                TEST_ONLINE_SALES_POINT_CODE,
                online_sales_point_id,
            )),
            gateway: Arc::new(StubPaymentGateway::new()),
            online_sales_point_id,
        }
    }

    /// Mocks whose sales point table lacks the online sales point.
    pub fn without_sales_point() -> Self {
        let mocks = Self::new();
        mocks.sales_channels.channels.lock().unwrap().clear();
        mocks
    }

    pub fn settings() -> ReconciliationSettings {
        ReconciliationSettings {
            online_sales_point_code: TEST_ONLINE_SALES_POINT_CODE.to_string(),
            default_duration_days: TEST_DEFAULT_DURATION_DAYS,
        }
    }

    pub fn use_cases(&self) -> ReconciliationUseCases {
        ReconciliationUseCases::new(
            self.payments.clone(),
            self.keys.clone(),
            self.entitlements.clone(),
            self.sales_channels.clone(),
            self.gateway.clone(),
            Self::settings(),
        )
    }
}

impl Default for ReconciliationMocks {
    fn default() -> Self {
        Self::new()
    }
}
