pub mod payment_gateway;
pub mod webhook_verifier;
