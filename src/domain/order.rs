use {
    super::error::PipelineError,
    super::id::OrderId,
    super::payment::{PaymentRecord, PaymentStatus},
    chrono::{DateTime, Utc},
    futures::future::BoxFuture,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Order state, the coarse lifecycle bucket an order status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    PendingPayment,
    Processing,
    Complete,
    Canceled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configured labels for the two statuses merchants may rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLabels {
    pub confirmed: String,
    pub pre_authorized: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            confirmed: "monei_succeeded".into(),
            pre_authorized: "monei_authorized".into(),
        }
    }
}

impl StatusLabels {
    /// Every payment status must map to its own non-empty label, otherwise
    /// [`OrderStatus::from_label`] could read an order back as the wrong status.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut seen: Vec<(&str, OrderStatus)> = Vec::with_capacity(PaymentStatus::ALL.len());
        for status in PaymentStatus::ALL.into_iter().map(OrderStatus::from) {
            let label = status.label(self);
            if label.trim().is_empty() {
                return Err(PipelineError::Config(format!(
                    "status label for {} must not be empty",
                    status.payment_status()
                )));
            }
            if let Some((_, other)) = seen.iter().find(|(l, _)| *l == label) {
                return Err(PipelineError::Config(format!(
                    "status label {label:?} is used for both {} and {}",
                    other.payment_status(),
                    status.payment_status()
                )));
            }
            seen.push((label, status));
        }
        Ok(())
    }
}

/// Merchant order status, one per payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Authorized,
    Succeeded,
    Failed,
    Canceled,
    Expired,
    PartiallyRefunded,
    Refunded,
}

impl From<PaymentStatus> for OrderStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => Self::Pending,
            PaymentStatus::Authorized => Self::Authorized,
            PaymentStatus::Succeeded => Self::Succeeded,
            PaymentStatus::Failed => Self::Failed,
            PaymentStatus::Canceled => Self::Canceled,
            PaymentStatus::Expired => Self::Expired,
            PaymentStatus::PartiallyRefunded => Self::PartiallyRefunded,
            PaymentStatus::Refunded => Self::Refunded,
        }
    }
}

impl OrderStatus {
    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            Self::Pending => PaymentStatus::Pending,
            Self::Authorized => PaymentStatus::Authorized,
            Self::Succeeded => PaymentStatus::Succeeded,
            Self::Failed => PaymentStatus::Failed,
            Self::Canceled => PaymentStatus::Canceled,
            Self::Expired => PaymentStatus::Expired,
            Self::PartiallyRefunded => PaymentStatus::PartiallyRefunded,
            Self::Refunded => PaymentStatus::Refunded,
        }
    }

    pub fn label<'a>(&self, labels: &'a StatusLabels) -> &'a str {
        match self {
            Self::Pending => "monei_pending",
            Self::Authorized => &labels.pre_authorized,
            Self::Succeeded => &labels.confirmed,
            Self::Failed => "monei_failed",
            Self::Canceled => "monei_canceled",
            Self::Expired => "monei_expired",
            Self::PartiallyRefunded => "monei_partially_refunded",
            Self::Refunded => "monei_refunded",
        }
    }

    pub fn state(&self) -> OrderState {
        match self {
            Self::Pending => OrderState::PendingPayment,
            Self::Authorized | Self::Succeeded | Self::PartiallyRefunded => OrderState::Processing,
            Self::Failed | Self::Canceled | Self::Expired => OrderState::Canceled,
            Self::Refunded => OrderState::Complete,
        }
    }

    /// Reverse lookup; `None` for statuses this integration does not own.
    pub fn from_label(label: &str, labels: &StatusLabels) -> Option<Self> {
        PaymentStatus::ALL
            .into_iter()
            .map(OrderStatus::from)
            .find(|status| status.label(labels) == label)
    }
}

/// What processing should do to an order for an incoming payment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    /// Order already reflects this status.
    AlreadyApplied,
    /// Payment is an older, superseded attempt that did not succeed.
    NotCurrentAttempt,
    /// Failed attempt: the order stays as is so the shopper can retry.
    LeaveUnchanged,
    /// Transition would regress the order; log it, do not apply.
    Anomaly { current: OrderStatus },
    Apply {
        target: OrderStatus,
        generate_invoice: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub increment_id: OrderId,
    pub store_id: i32,
    pub state: String,
    pub status: String,
    pub monei_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn current_status(&self, labels: &StatusLabels) -> Option<OrderStatus> {
        OrderStatus::from_label(&self.status, labels)
    }

    pub fn decide(&self, record: &PaymentRecord, labels: &StatusLabels) -> OrderAction {
        let target = OrderStatus::from(record.status());
        let current = self.current_status(labels);
        let same_attempt = self
            .monei_payment_id
            .as_deref()
            .is_none_or(|id| id == record.id().as_str());

        if !same_attempt && !record.is_successful() {
            return OrderAction::NotCurrentAttempt;
        }
        if same_attempt && current == Some(target) {
            return OrderAction::AlreadyApplied;
        }
        if record.status() == PaymentStatus::Failed {
            return OrderAction::LeaveUnchanged;
        }

        match current {
            Some(cur) if same_attempt && !cur.payment_status().can_transition_to(&record.status()) => {
                OrderAction::Anomaly { current: cur }
            }
            Some(cur) if !same_attempt && cur.payment_status().is_successful() => {
                OrderAction::Anomaly { current: cur }
            }
            _ => OrderAction::Apply {
                target,
                generate_invoice: target == OrderStatus::Succeeded,
            },
        }
    }

    /// Point the order at `record` and move it to `target`.
    pub fn apply(&mut self, target: OrderStatus, record: &PaymentRecord, labels: &StatusLabels) {
        self.status = target.label(labels).to_string();
        self.state = target.state().as_str().to_string();
        self.monei_payment_id = Some(record.id().to_string());
        self.updated_at = Utc::now();
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

pub trait OrderRepository: Send + Sync {
    fn get<'a>(&'a self, id: &'a OrderId) -> BoxFuture<'a, Result<Order, PipelineError>>;

    fn save<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<(), PipelineError>>;

    /// Orders in `status` that carry a payment id and do not belong to one of
    /// `excluded_stores`, oldest first.
    fn find_reconcilable<'a>(
        &'a self,
        status: &'a str,
        excluded_stores: &'a [i32],
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Order>, PipelineError>>;
}

/// Invoice generation for captured payments.
pub trait InvoiceService: Send + Sync {
    fn generate_invoice<'a>(
        &'a self,
        order: &'a Order,
        record: &'a PaymentRecord,
    ) -> BoxFuture<'a, Result<(), PipelineError>>;
}
