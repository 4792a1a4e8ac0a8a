pub mod error;
pub mod id;
pub mod lock;
pub mod money;
pub mod order;
pub mod payment;
pub mod provider;
