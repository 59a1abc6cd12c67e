pub mod entitlement;
pub mod payment_source;
pub mod payment_status;
