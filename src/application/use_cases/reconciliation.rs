use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        activation_code::generate_activation_code,
        ports::payment_gateway::{GatewayCheckout, PaymentGateway},
        validators::is_valid_email,
    },
    domain::entities::{
        entitlement::{UserEntitlement, extend_expiry},
        payment_source::PaymentSource,
        payment_status::PaymentStatus,
    },
};

// ============================================================================
// Constants
// ============================================================================

/// Stored when the checkout metadata carries no usable email.
pub const UNKNOWN_CUSTOMER_EMAIL: &str = "unknown@payment.com";
pub const DEFAULT_CURRENCY: &str = "dzd";
/// Attempts at drawing a fresh code when the generated one already exists.
pub const MAX_CODE_ATTEMPTS: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// One row per gateway checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlinePaymentProfile {
    pub id: Uuid,
    pub checkout_id: String,
    pub status: PaymentStatus,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub duration_days: i32,
    pub activation_key_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub invoice_id: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Row written when a checkout is first observed or its status is mirrored.
#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub checkout_id: String,
    pub status: PaymentStatus,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub duration_days: i32,
    pub user_id: Option<Uuid>,
    pub invoice_id: Option<String>,
    pub payment_method: Option<String>,
}

/// Values written by the linkage compare-and-swap.
#[derive(Debug, Clone)]
pub struct PaymentClaim {
    pub activation_key_id: Uuid,
    pub paid_at: NaiveDateTime,
    pub invoice_id: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationKeyProfile {
    pub id: Uuid,
    pub key_code: String,
    pub duration_days: i32,
    pub payment_source: PaymentSource,
    pub sales_point_id: Option<Uuid>,
    pub price_paid: i64,
    pub is_used: bool,
    pub used_by: Option<Uuid>,
    pub used_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub payment_id: Option<Uuid>,
    pub source_checkout_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewOnlineKeyInput {
    pub key_code: String,
    pub duration_days: i32,
    pub sales_point_id: Uuid,
    pub price_paid: i64,
    /// Unique per key; a second insert for the same checkout conflicts.
    pub source_checkout_id: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub enum KeyInsertOutcome {
    Created(ActivationKeyProfile),
    /// A key for this checkout already exists.
    CheckoutConflict,
    /// The generated code is already taken by another key.
    CodeCollision,
}

/// Which path produced a reconciliation answer. Observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileSource {
    Database,
    GatewayPoll,
    DatabaseFallback,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationOutcome {
    pub status: PaymentStatus,
    pub activation_code: Option<String>,
    pub customer_email: String,
    pub amount: i64,
    pub currency: String,
    pub source: ReconcileSource,
}

impl ReconciliationOutcome {
    fn from_payment(
        payment: &OnlinePaymentProfile,
        activation_code: Option<String>,
        source: ReconcileSource,
    ) -> Self {
        Self {
            status: payment.status,
            activation_code,
            customer_email: payment.customer_email.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationSettings {
    /// Code of the sales point online keys are attributed to.
    pub online_sales_point_code: String,
    /// Used when checkout metadata carries no duration.
    pub default_duration_days: i32,
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait OnlinePaymentRepoTrait: Send + Sync {
    async fn get_by_checkout_id(&self, checkout_id: &str)
    -> AppResult<Option<OnlinePaymentProfile>>;

    /// Insert the row, or mirror status onto an existing one.
    /// Terminal statuses (paid, refunded) are never overwritten.
    async fn upsert_gateway_status(
        &self,
        input: &CreatePaymentInput,
    ) -> AppResult<OnlinePaymentProfile>;

    /// Link a key and mark the payment paid, only while no key is linked yet.
    /// Returns `true` if this call performed the linkage.
    async fn claim_for_key(&self, checkout_id: &str, claim: &PaymentClaim) -> AppResult<bool>;
}

#[async_trait]
pub trait ActivationKeyRepoTrait: Send + Sync {
    async fn insert_online(&self, input: &NewOnlineKeyInput) -> AppResult<KeyInsertOutcome>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ActivationKeyProfile>>;

    async fn get_by_source_checkout(
        &self,
        checkout_id: &str,
    ) -> AppResult<Option<ActivationKeyProfile>>;

    async fn set_payment_id(&self, key_id: Uuid, payment_id: Uuid) -> AppResult<()>;

    async fn mark_used(
        &self,
        key_id: Uuid,
        user_id: Uuid,
        used_at: NaiveDateTime,
        expires_at: Option<NaiveDateTime>,
    ) -> AppResult<()>;

    /// Return a key to its unused state.
    async fn reset_usage(&self, key_id: Uuid) -> AppResult<()>;

    /// Delete an unused key that no payment references. Returns whether a row was removed.
    async fn discard_unlinked(&self, key_id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait UserEntitlementRepoTrait: Send + Sync {
    async fn get(&self, user_id: Uuid) -> AppResult<Option<UserEntitlement>>;

    /// Set `is_paid` and extend the expiry by `duration_days` in one atomic
    /// write, counting from the later of the stored expiry and `now`.
    /// Perpetual access stays perpetual. Returns the stored expiry.
    /// `Err(NotFound)` if the user does not exist.
    async fn grant(
        &self,
        user_id: Uuid,
        duration_days: i32,
        now: NaiveDateTime,
    ) -> AppResult<Option<NaiveDateTime>>;
}

#[async_trait]
pub trait SalesChannelRepoTrait: Send + Sync {
    async fn find_active_by_code(&self, code: &str) -> AppResult<Option<Uuid>>;
}

/// Expiry after adding `duration_days` to an entitlement. Perpetual access stays `None`.
pub fn next_expiry(
    current: &UserEntitlement,
    now: NaiveDateTime,
    duration_days: i32,
) -> AppResult<Option<NaiveDateTime>> {
    if current.is_perpetual() {
        return Ok(None);
    }
    extend_expiry(current.subscription_expires_at, now, duration_days)
        .map(Some)
        .ok_or_else(|| {
            AppError::Internal(format!(
                "subscription expiry overflows when adding {duration_days} days"
            ))
        })
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct ReconciliationUseCases {
    payments: Arc<dyn OnlinePaymentRepoTrait>,
    keys: Arc<dyn ActivationKeyRepoTrait>,
    entitlements: Arc<dyn UserEntitlementRepoTrait>,
    sales_channels: Arc<dyn SalesChannelRepoTrait>,
    gateway: Arc<dyn PaymentGateway>,
    settings: ReconciliationSettings,
}

impl ReconciliationUseCases {
    pub fn new(
        payments: Arc<dyn OnlinePaymentRepoTrait>,
        keys: Arc<dyn ActivationKeyRepoTrait>,
        entitlements: Arc<dyn UserEntitlementRepoTrait>,
        sales_channels: Arc<dyn SalesChannelRepoTrait>,
        gateway: Arc<dyn PaymentGateway>,
        settings: ReconciliationSettings,
    ) -> Self {
        Self {
            payments,
            keys,
            entitlements,
            sales_channels,
            gateway,
            settings,
        }
    }

    /// Answer the current state of a checkout, issuing and applying the
    /// entitlement if the checkout has just become paid.
    ///
    /// Safe to call any number of times, concurrently, from pollers and
    /// webhooks alike: at most one activation key is ever linked to the payment.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, checkout_id: &str) -> AppResult<ReconciliationOutcome> {
        if let Some(payment) = self.payments.get_by_checkout_id(checkout_id).await?
            && payment.status == PaymentStatus::Paid
            && let Some(key_id) = payment.activation_key_id
        {
            if let Some(key) = self.keys.get_by_id(key_id).await? {
                return Ok(ReconciliationOutcome::from_payment(
                    &payment,
                    Some(key.key_code),
                    ReconcileSource::Database,
                ));
            }
            warn!(checkout_id, %key_id, "Linked activation key not found, asking gateway");
        }

        let checkout = match self.gateway.get_checkout(checkout_id).await {
            Ok(checkout) if checkout.id == checkout_id => checkout,
            Ok(checkout) => {
                let err = AppError::UpstreamUnavailable(format!(
                    "gateway answered for checkout {}",
                    checkout.id
                ));
                return self.fallback_to_database(checkout_id, err).await;
            }
            Err(err) => return self.fallback_to_database(checkout_id, err).await,
        };

        self.apply_gateway_report(&checkout, ReconcileSource::GatewayPoll)
            .await
    }

    /// Apply an authoritative gateway view of a checkout (from a poll or a webhook).
    #[instrument(skip(self, checkout), fields(checkout_id = %checkout.id, gateway_status = %checkout.status))]
    pub async fn apply_gateway_report(
        &self,
        checkout: &GatewayCheckout,
        source: ReconcileSource,
    ) -> AppResult<ReconciliationOutcome> {
        match checkout.payment_status() {
            PaymentStatus::Paid => self.issue_for_paid_checkout(checkout, source).await,
            status => {
                let payment = self
                    .payments
                    .upsert_gateway_status(&self.payment_input_from(checkout, status))
                    .await?;
                self.outcome_for_payment(&payment, source).await
            }
        }
    }

    async fn fallback_to_database(
        &self,
        checkout_id: &str,
        gateway_err: AppError,
    ) -> AppResult<ReconciliationOutcome> {
        warn!(checkout_id, error = %gateway_err, "Gateway lookup failed, falling back to stored payment");

        match self.payments.get_by_checkout_id(checkout_id).await? {
            Some(payment) => {
                self.outcome_for_payment(&payment, ReconcileSource::DatabaseFallback)
                    .await
            }
            None => Err(match gateway_err {
                AppError::UpstreamUnavailable(msg) => AppError::UpstreamUnavailable(msg),
                other => AppError::UpstreamUnavailable(other.to_string()),
            }),
        }
    }

    async fn issue_for_paid_checkout(
        &self,
        checkout: &GatewayCheckout,
        source: ReconcileSource,
    ) -> AppResult<ReconciliationOutcome> {
        // Re-read: another caller may have finished issuance since the fast path.
        let payment = match self.payments.get_by_checkout_id(&checkout.id).await? {
            Some(payment) => payment,
            None => {
                self.payments
                    .upsert_gateway_status(
                        &self.payment_input_from(checkout, PaymentStatus::Pending),
                    )
                    .await?
            }
        };

        if let Some(key_id) = payment.activation_key_id {
            return self
                .outcome_with_linked_key(&payment, key_id, ReconcileSource::Database)
                .await;
        }
        if payment.status == PaymentStatus::Refunded {
            warn!(checkout_id = %checkout.id, "Gateway reports paid for a refunded payment, not issuing");
            return Ok(ReconciliationOutcome::from_payment(&payment, None, source));
        }

        let sales_point_id = self.resolve_online_sales_point().await?;

        let key = match self.insert_key(&payment, sales_point_id).await? {
            KeyInsertOutcome::Created(key) => key,
            _ => {
                let winner = self
                    .keys
                    .get_by_source_checkout(&payment.checkout_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal("conflicting activation key disappeared".into())
                    })?;
                info!(checkout_id = %checkout.id, key_id = %winner.id, "Activation key already issued by a concurrent caller");
                return self.finish_linkage(checkout, &payment, winner, source, false).await;
            }
        };

        self.finish_linkage(checkout, &payment, key, source, true)
            .await
    }

    /// Resolve the sales point online keys are attributed to.
    /// A missing sales point aborts issuance rather than creating an orphaned key.
    async fn resolve_online_sales_point(&self) -> AppResult<Uuid> {
        let code = &self.settings.online_sales_point_code;
        self.sales_channels
            .find_active_by_code(code)
            .await?
            .ok_or_else(|| {
                error!(sales_point_code = %code, "Online sales point missing, refusing to issue activation key");
                AppError::Configuration(format!("sales point '{code}' is not configured"))
            })
    }

    /// Insert a new key for the payment. Only ever returns `Created` or `CheckoutConflict`.
    async fn insert_key(
        &self,
        payment: &OnlinePaymentProfile,
        sales_point_id: Uuid,
    ) -> AppResult<KeyInsertOutcome> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let input = NewOnlineKeyInput {
                key_code: generate_activation_code(),
                duration_days: payment.duration_days,
                sales_point_id,
                price_paid: payment.amount,
                source_checkout_id: payment.checkout_id.clone(),
                notes: Some(format!(
                    "Auto-generated from online payment: {}",
                    payment.checkout_id
                )),
            };

            match self.keys.insert_online(&input).await? {
                KeyInsertOutcome::CodeCollision => {
                    warn!(checkout_id = %payment.checkout_id, attempt, "Activation code collision, regenerating");
                }
                outcome => return Ok(outcome),
            }
        }

        Err(AppError::Internal(
            "could not generate a unique activation code".into(),
        ))
    }

    /// Link `key` to the payment with a compare-and-swap, then apply the
    /// entitlement if this call won the linkage.
    ///
    /// `key_is_ours` is false when converging on a key another caller inserted;
    /// such a key is never discarded here.
    async fn finish_linkage(
        &self,
        checkout: &GatewayCheckout,
        payment: &OnlinePaymentProfile,
        key: ActivationKeyProfile,
        source: ReconcileSource,
        key_is_ours: bool,
    ) -> AppResult<ReconciliationOutcome> {
        let now = Utc::now().naive_utc();
        let claim = PaymentClaim {
            activation_key_id: key.id,
            paid_at: now,
            invoice_id: checkout.invoice_id.clone(),
            payment_method: checkout.payment_method.clone(),
        };

        if !self.payments.claim_for_key(&payment.checkout_id, &claim).await? {
            return self.resolve_lost_claim(payment, &key, key_is_ours).await;
        }

        info!(checkout_id = %payment.checkout_id, key_id = %key.id, "Payment linked to activation key");

        if let Err(err) = self.keys.set_payment_id(key.id, payment.id).await {
            warn!(key_id = %key.id, payment_id = %payment.id, error = %err, "Failed to set payment back-reference on activation key");
        }

        if let Some(user_id) = payment.user_id {
            self.apply_entitlement(payment, &key, user_id, now).await;
        }

        Ok(ReconciliationOutcome {
            status: PaymentStatus::Paid,
            activation_code: Some(key.key_code),
            customer_email: payment.customer_email.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            source,
        })
    }

    /// Someone else linked the payment first: return their key, dropping ours.
    async fn resolve_lost_claim(
        &self,
        payment: &OnlinePaymentProfile,
        our_key: &ActivationKeyProfile,
        key_is_ours: bool,
    ) -> AppResult<ReconciliationOutcome> {
        let current = self
            .payments
            .get_by_checkout_id(&payment.checkout_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let linked_id = current.activation_key_id.ok_or_else(|| {
            AppError::Internal("payment claim failed but no activation key is linked".into())
        })?;

        if key_is_ours && linked_id != our_key.id {
            match self.keys.discard_unlinked(our_key.id).await {
                Ok(true) => {
                    info!(checkout_id = %payment.checkout_id, key_id = %our_key.id, "Discarded activation key that lost the linkage race")
                }
                Ok(false) => {
                    warn!(checkout_id = %payment.checkout_id, key_id = %our_key.id, "Losing activation key was not discarded")
                }
                Err(err) => {
                    warn!(checkout_id = %payment.checkout_id, key_id = %our_key.id, error = %err, "Failed to discard losing activation key")
                }
            }
        }

        self.outcome_with_linked_key(&current, linked_id, ReconcileSource::Database)
            .await
    }

    /// Mark the key used and extend the user's access. Any failure resets the
    /// key so its code stays redeemable; the payment keeps its linkage.
    async fn apply_entitlement(
        &self,
        payment: &OnlinePaymentProfile,
        key: &ActivationKeyProfile,
        user_id: Uuid,
        now: NaiveDateTime,
    ) {
        match self.try_apply_entitlement(key, user_id, now).await {
            Ok(expires_at) => {
                info!(checkout_id = %payment.checkout_id, %user_id, expires_at = ?expires_at, "Entitlement applied");
            }
            Err(err) => {
                error!(
                    checkout_id = %payment.checkout_id,
                    key_id = %key.id,
                    %user_id,
                    error = %err,
                    "Entitlement update failed after key issuance, resetting key to unused"
                );
                match self.keys.reset_usage(key.id).await {
                    Ok(()) => warn!(
                        checkout_id = %payment.checkout_id,
                        key_id = %key.id,
                        "Inconsistency: payment stays linked to an unused activation key"
                    ),
                    Err(rollback_err) => error!(
                        checkout_id = %payment.checkout_id,
                        key_id = %key.id,
                        error = %rollback_err,
                        "CRITICAL: activation key rollback failed"
                    ),
                }
            }
        }
    }

    async fn try_apply_entitlement(
        &self,
        key: &ActivationKeyProfile,
        user_id: Uuid,
        now: NaiveDateTime,
    ) -> AppResult<Option<NaiveDateTime>> {
        let current = self
            .entitlements
            .get(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let expected = next_expiry(&current, now, key.duration_days)?;

        self.keys
            .mark_used(key.id, user_id, now, expected)
            .await?;
        let granted = self
            .entitlements
            .grant(user_id, key.duration_days, now)
            .await?;

        // Another purchase for the same user moved the expiry in between.
        if granted != expected
            && let Err(err) = self.keys.mark_used(key.id, user_id, now, granted).await
        {
            warn!(key_id = %key.id, %user_id, error = %err, "Failed to record final expiry on activation key");
        }
        Ok(granted)
    }

    async fn outcome_with_linked_key(
        &self,
        payment: &OnlinePaymentProfile,
        key_id: Uuid,
        source: ReconcileSource,
    ) -> AppResult<ReconciliationOutcome> {
        let code = match self.keys.get_by_id(key_id).await? {
            Some(key) => Some(key.key_code),
            None => {
                error!(checkout_id = %payment.checkout_id, %key_id, "Payment links an activation key that does not exist");
                None
            }
        };
        Ok(ReconciliationOutcome::from_payment(payment, code, source))
    }

    /// Stored state as an outcome; the code is only revealed for paid payments.
    async fn outcome_for_payment(
        &self,
        payment: &OnlinePaymentProfile,
        source: ReconcileSource,
    ) -> AppResult<ReconciliationOutcome> {
        match payment.activation_key_id {
            Some(key_id) if payment.status == PaymentStatus::Paid => {
                self.outcome_with_linked_key(payment, key_id, source).await
            }
            _ => Ok(ReconciliationOutcome::from_payment(payment, None, source)),
        }
    }

    fn payment_input_from(
        &self,
        checkout: &GatewayCheckout,
        status: PaymentStatus,
    ) -> CreatePaymentInput {
        let customer_email = checkout
            .customer_email()
            .filter(|email| is_valid_email(email))
            .unwrap_or_else(|| UNKNOWN_CUSTOMER_EMAIL.to_string());
        let currency = checkout
            .currency
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        CreatePaymentInput {
            checkout_id: checkout.id.clone(),
            status,
            customer_email,
            customer_name: checkout.customer_name(),
            amount: checkout.amount,
            currency,
            duration_days: checkout
                .duration_days()
                .unwrap_or(self.settings.default_duration_days),
            user_id: checkout.user_id(),
            invoice_id: checkout.invoice_id.clone(),
            payment_method: checkout.payment_method.clone(),
        }
    }
}
