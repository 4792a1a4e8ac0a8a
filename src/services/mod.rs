pub mod lock_manager;
pub mod payment_data;
pub mod payment_processor;
pub mod reconciliation;
pub mod signature;
