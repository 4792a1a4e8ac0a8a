pub mod invoice_repo;
pub mod lock_store;
pub mod order_repo;
