use serde::{Deserialize, Serialize};

/// How an activation key was paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// Issued by staff at a physical sales point.
    Manual,
    /// Issued automatically after a gateway checkout was paid.
    Online,
}

impl PaymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentSource::Manual => "manual",
            PaymentSource::Online => "online",
        }
    }
}

impl std::fmt::Display for PaymentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
