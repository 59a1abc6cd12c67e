use sqlx::PgPool;

use crate::app_error::AppError;

pub mod activation_key;
pub mod online_payment;
pub mod sales_point;
pub mod user_entitlement;

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Name of the violated constraint if `err` is a unique violation.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            db_err.constraint().or(Some(""))
        }
        _ => None,
    }
}

/// Constraint violations the engine recovers from are mapped by the adapters
/// before reaching here. Anything else is a storage failure, never client input.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                // Log the actual error for debugging, but don't expose details
                tracing::error!(
                    error = ?err,
                    constraint = db_err.constraint().unwrap_or_default(),
                    "Database error"
                );
                AppError::Database("Database operation failed".into())
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
