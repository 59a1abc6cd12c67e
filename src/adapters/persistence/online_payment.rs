use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{
        CreatePaymentInput, OnlinePaymentProfile, OnlinePaymentRepoTrait, PaymentClaim,
    },
};

const SELECT_COLS: &str = r#"
    id, checkout_id, status, customer_email, customer_name,
    amount, currency, duration_days, activation_key_id, user_id,
    invoice_id, payment_method, paid_at, created_at, updated_at
"#;

fn row_to_profile(row: sqlx::postgres::PgRow) -> OnlinePaymentProfile {
    OnlinePaymentProfile {
        id: row.get("id"),
        checkout_id: row.get("checkout_id"),
        status: row.get("status"),
        customer_email: row.get("customer_email"),
        customer_name: row.get("customer_name"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        duration_days: row.get("duration_days"),
        activation_key_id: row.get("activation_key_id"),
        user_id: row.get("user_id"),
        invoice_id: row.get("invoice_id"),
        payment_method: row.get("payment_method"),
        paid_at: row.get("paid_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl OnlinePaymentRepoTrait for PostgresPersistence {
    async fn get_by_checkout_id(
        &self,
        checkout_id: &str,
    ) -> AppResult<Option<OnlinePaymentProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM online_payments WHERE checkout_id = $1"
        ))
        .bind(checkout_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn upsert_gateway_status(
        &self,
        input: &CreatePaymentInput,
    ) -> AppResult<OnlinePaymentProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO online_payments (
                id, checkout_id, status, customer_email, customer_name,
                amount, currency, duration_days, user_id, invoice_id, payment_method
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (checkout_id) DO UPDATE SET
                -- Terminal rows keep their status whatever the gateway now reports
                status = CASE
                    WHEN online_payments.status IN ('paid', 'refunded')
                    THEN online_payments.status
                    ELSE EXCLUDED.status
                END,
                invoice_id = COALESCE(online_payments.invoice_id, EXCLUDED.invoice_id),
                payment_method = COALESCE(online_payments.payment_method, EXCLUDED.payment_method),
                updated_at = CURRENT_TIMESTAMP
            RETURNING {SELECT_COLS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.checkout_id)
        .bind(input.status)
        .bind(&input.customer_email)
        .bind(&input.customer_name)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(input.duration_days)
        .bind(input.user_id)
        .bind(&input.invoice_id)
        .bind(&input.payment_method)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_profile(row))
    }

    async fn claim_for_key(&self, checkout_id: &str, claim: &PaymentClaim) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE online_payments
            SET activation_key_id = $2,
                status = 'paid',
                paid_at = $3,
                invoice_id = COALESCE($4, invoice_id),
                payment_method = COALESCE($5, payment_method),
                updated_at = CURRENT_TIMESTAMP
            WHERE checkout_id = $1 AND activation_key_id IS NULL
            "#,
        )
        .bind(checkout_id)
        .bind(claim.activation_key_id)
        .bind(claim.paid_at)
        .bind(&claim.invoice_id)
        .bind(&claim.payment_method)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }
}
