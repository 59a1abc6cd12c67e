use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::SalesChannelRepoTrait,
};

#[async_trait]
impl SalesChannelRepoTrait for PostgresPersistence {
    async fn find_active_by_code(&self, code: &str) -> AppResult<Option<Uuid>> {
        sqlx::query_scalar("SELECT id FROM sales_points WHERE code = $1 AND is_active = TRUE")
            .bind(code)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)
    }
}
