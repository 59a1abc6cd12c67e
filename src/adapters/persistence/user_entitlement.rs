use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::UserEntitlementRepoTrait,
    domain::entities::entitlement::UserEntitlement,
};

#[async_trait]
impl UserEntitlementRepoTrait for PostgresPersistence {
    async fn get(&self, user_id: Uuid) -> AppResult<Option<UserEntitlement>> {
        let row = sqlx::query("SELECT id, is_paid, subscription_expires_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(|row| UserEntitlement {
            user_id: row.get("id"),
            is_paid: row.get("is_paid"),
            subscription_expires_at: row.get("subscription_expires_at"),
        }))
    }

    async fn grant(
        &self,
        user_id: Uuid,
        duration_days: i32,
        now: NaiveDateTime,
    ) -> AppResult<Option<NaiveDateTime>> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET is_paid = TRUE,
                subscription_expires_at = CASE
                    WHEN is_paid AND subscription_expires_at IS NULL THEN NULL
                    ELSE GREATEST(COALESCE(subscription_expires_at, $3), $3)
                        + make_interval(days => $2)
                END
            WHERE id = $1
            RETURNING subscription_expires_at
            "#,
        )
        .bind(user_id)
        .bind(duration_days)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound)?;

        Ok(row.get("subscription_expires_at"))
    }
}
