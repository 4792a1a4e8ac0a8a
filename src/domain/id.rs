use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;

/// Longest payment id accepted from the outside.
pub const MAX_PAYMENT_ID_LEN: usize = 64;

/// Provider-assigned payment identifier. Immutable once issued.
///
/// Restricted to ASCII letters, digits, `_` and `-`: the id arrives from
/// shoppers' query strings and ends up in provider URLs and lock keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "payment id must not be empty".into(),
            ));
        }
        if id.len() > MAX_PAYMENT_ID_LEN
            || !id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(PipelineError::Validation(
                "payment id contains unexpected characters".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Merchant-side order identifier (the order increment id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "order id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}
