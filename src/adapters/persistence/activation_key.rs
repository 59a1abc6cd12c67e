use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, unique_violation},
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{
        ActivationKeyProfile, ActivationKeyRepoTrait, KeyInsertOutcome, NewOnlineKeyInput,
    },
    domain::entities::payment_source::PaymentSource,
};

const SOURCE_CHECKOUT_CONSTRAINT: &str = "activation_keys_source_checkout_id_key";
const KEY_CODE_CONSTRAINT: &str = "activation_keys_key_code_key";

const SELECT_COLS: &str = r#"
    id, key_code, duration_days, payment_source, sales_point_id, price_paid,
    is_used, used_by, used_at, expires_at, payment_id, source_checkout_id,
    notes, created_at
"#;

fn row_to_profile(row: sqlx::postgres::PgRow) -> ActivationKeyProfile {
    ActivationKeyProfile {
        id: row.get("id"),
        key_code: row.get("key_code"),
        duration_days: row.get("duration_days"),
        payment_source: row.get("payment_source"),
        sales_point_id: row.get("sales_point_id"),
        price_paid: row.get("price_paid"),
        is_used: row.get("is_used"),
        used_by: row.get("used_by"),
        used_at: row.get("used_at"),
        expires_at: row.get("expires_at"),
        payment_id: row.get("payment_id"),
        source_checkout_id: row.get("source_checkout_id"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ActivationKeyRepoTrait for PostgresPersistence {
    async fn insert_online(&self, input: &NewOnlineKeyInput) -> AppResult<KeyInsertOutcome> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO activation_keys (
                id, key_code, duration_days, payment_source, sales_point_id,
                price_paid, source_checkout_id, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SELECT_COLS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.key_code)
        .bind(input.duration_days)
        .bind(PaymentSource::Online)
        .bind(input.sales_point_id)
        .bind(input.price_paid)
        .bind(&input.source_checkout_id)
        .bind(&input.notes)
        .fetch_one(self.pool())
        .await;

        match result {
            Ok(row) => Ok(KeyInsertOutcome::Created(row_to_profile(row))),
            Err(err) => match unique_violation(&err) {
                Some(SOURCE_CHECKOUT_CONSTRAINT) => Ok(KeyInsertOutcome::CheckoutConflict),
                Some(KEY_CODE_CONSTRAINT) => Ok(KeyInsertOutcome::CodeCollision),
                _ => Err(AppError::from(err)),
            },
        }
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ActivationKeyProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM activation_keys WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn get_by_source_checkout(
        &self,
        checkout_id: &str,
    ) -> AppResult<Option<ActivationKeyProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM activation_keys WHERE source_checkout_id = $1"
        ))
        .bind(checkout_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn set_payment_id(&self, key_id: Uuid, payment_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE activation_keys SET payment_id = $2 WHERE id = $1")
            .bind(key_id)
            .bind(payment_id)
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_used(
        &self,
        key_id: Uuid,
        user_id: Uuid,
        used_at: NaiveDateTime,
        expires_at: Option<NaiveDateTime>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE activation_keys
            SET is_used = TRUE, used_by = $2, used_at = $3, expires_at = $4
            WHERE id = $1
            "#,
        )
        .bind(key_id)
        .bind(user_id)
        .bind(used_at)
        .bind(expires_at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn reset_usage(&self, key_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE activation_keys
            SET is_used = FALSE, used_by = NULL, used_at = NULL, expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(key_id)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn discard_unlinked(&self, key_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM activation_keys
            WHERE id = $1
              AND is_used = FALSE
              AND payment_id IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM online_payments WHERE activation_key_id = $1
              )
            "#,
        )
        .bind(key_id)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }
}
