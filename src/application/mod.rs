pub mod activation_code;
pub mod app_error;
pub mod ports;
pub mod use_cases;
pub mod validators;
