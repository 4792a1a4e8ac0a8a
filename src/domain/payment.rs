use {
    super::error::PipelineError,
    super::id::{OrderId, PaymentId},
    super::money::{Currency, Money, MoneyAmount},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    std::fmt,
};

/// Result code for failures with no more specific provider code.
pub const ERROR_UNKNOWN: &str = "ERROR_UNKNOWN";

/// Result code for "another process holds this payment".
pub const ERROR_LOCK_TIMEOUT: &str = "ERROR_LOCK_TIMEOUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Expired,
    Canceled,
    Failed,
    Succeeded,
    PartiallyRefunded,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 8] = [
        Self::Pending,
        Self::Authorized,
        Self::Expired,
        Self::Canceled,
        Self::Failed,
        Self::Succeeded,
        Self::PartiallyRefunded,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Authorized => "AUTHORIZED",
            Self::Expired => "EXPIRED",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
            Self::Succeeded => "SUCCEEDED",
            Self::PartiallyRefunded => "PARTIALLY_REFUNDED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// No further transitions are expected once a payment is here.
    ///
    /// SUCCEEDED counts as final for order processing even though refunds
    /// may still follow it.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::Expired | Self::Refunded
        )
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallyRefunded)
    }

    /// Transitions the provider can report for a single payment.
    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized | Succeeded | Failed | Expired | Canceled)
                | (Authorized, Succeeded | Canceled | Expired)
                | (Succeeded, PartiallyRefunded | Refunded)
                | (PartiallyRefunded, Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "AUTHORIZED" => Ok(Self::Authorized),
            "EXPIRED" => Ok(Self::Expired),
            "CANCELED" => Ok(Self::Canceled),
            "FAILED" => Ok(Self::Failed),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "PARTIALLY_REFUNDED" => Ok(Self::PartiallyRefunded),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(PipelineError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Canonical payment as reported by the provider at one point in time.
///
/// Built once at the ingestion boundary; everything downstream reads this
/// type, never the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    id: PaymentId,
    order_id: OrderId,
    status: PaymentStatus,
    money: Money,
    created_at: Option<String>,
    updated_at: Option<String>,
    metadata: Map<String, Value>,
    status_code: Option<String>,
    status_message: Option<String>,
    raw_data: Value,
}

const REQUIRED_FIELDS: [&str; 5] = ["id", "status", "amount", "currency", "orderId"];

impl PaymentRecord {
    /// Normalize a provider payment object. Fails if any required field is
    /// absent or empty.
    pub fn from_value(raw: Value) -> Result<Self, PipelineError> {
        let missing = missing_fields(&raw);
        if !missing.is_empty() {
            return Err(PipelineError::Validation(format!(
                "missing required payment fields: {}",
                missing.join(", ")
            )));
        }

        let id = PaymentId::new(string_field(&raw, "id").unwrap_or_default())?;
        let order_id = OrderId::new(string_field(&raw, "orderId").unwrap_or_default())?;
        let status = PaymentStatus::try_from(string_field(&raw, "status").unwrap_or_default().as_str())?;
        let cents = raw
            .get("amount")
            .and_then(Value::as_i64)
            .ok_or_else(|| PipelineError::Validation("amount must be an integer".into()))?;
        let currency = Currency::try_from(string_field(&raw, "currency").unwrap_or_default().as_str())?;

        let metadata = match raw.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        Ok(Self {
            id,
            order_id,
            status,
            money: Money::new(MoneyAmount::new(cents)?, currency),
            created_at: timestamp_field(&raw, "createdAt"),
            updated_at: timestamp_field(&raw, "updatedAt"),
            metadata,
            status_code: string_field(&raw, "statusCode"),
            status_message: string_field(&raw, "statusMessage"),
            raw_data: raw,
        })
    }

    /// True when every required field is present and non-empty.
    pub fn has_required_fields(raw: &Value) -> bool {
        missing_fields(raw).is_empty()
    }

    pub fn id(&self) -> &PaymentId {
        &self.id
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn money(&self) -> &Money {
        &self.money
    }

    pub fn amount_in_cents(&self) -> i64 {
        self.money.amount().cents()
    }

    pub fn amount(&self) -> f64 {
        self.money.amount().as_major()
    }

    pub fn currency(&self) -> &str {
        self.money.currency().as_str()
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn status_code(&self) -> Option<&str> {
        self.status_code.as_deref()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn raw_data(&self) -> &Value {
        &self.raw_data
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }
}

fn missing_fields(raw: &Value) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .into_iter()
        .filter(|field| match raw.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect()
}

/// Strings pass through; numbers are stringified (order ids and status
/// codes arrive in both forms).
fn string_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Epoch seconds become RFC 3339; strings are kept as given.
fn timestamp_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            let secs = n.as_i64()?;
            chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339())
        }
        _ => None,
    }
}

/// Outcome of one processing attempt, handed back to whichever flow
/// (webhook, callback, redirect return, sweep) triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    status: Option<PaymentStatus>,
    order_id: String,
    payment_id: String,
    successful: bool,
    error_message: Option<String>,
    status_code: Option<String>,
    full_error_response: Option<Value>,
}

impl ProcessingResult {
    pub fn success(status: PaymentStatus, order_id: &OrderId, payment_id: &PaymentId) -> Self {
        Self {
            status: Some(status),
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            successful: true,
            error_message: None,
            status_code: None,
            full_error_response: None,
        }
    }

    pub fn error(
        status: Option<PaymentStatus>,
        order_id: &OrderId,
        payment_id: &PaymentId,
        message: impl Into<String>,
        status_code: Option<String>,
        full_error_response: Option<Value>,
    ) -> Self {
        Self {
            status,
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            successful: false,
            error_message: Some(message.into()),
            status_code,
            full_error_response,
        }
    }

    /// Result for a payment the provider reported as not completed.
    pub fn from_unsuccessful(record: &PaymentRecord) -> Self {
        let message = record
            .status_message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("payment {}", record.status().as_str().to_lowercase()));
        Self::error(
            Some(record.status()),
            record.order_id(),
            record.id(),
            message,
            record.status_code().map(str::to_string),
            Some(record.raw_data().clone()),
        )
    }

    pub fn status(&self) -> Option<PaymentStatus> {
        self.status
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn status_code(&self) -> Option<&str> {
        self.status_code.as_deref()
    }

    pub fn full_error_response(&self) -> Option<&Value> {
        self.full_error_response.as_ref()
    }
}
