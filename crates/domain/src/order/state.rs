//! Order and payment state machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fulfillment state of an order.
///
/// Allowed transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │            │             │             │
///    └────────────┴─────────────┴─────────────┴──► Cancelled
/// ```
///
/// `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order has been placed, awaiting payment confirmation.
    #[default]
    Pending,

    /// Payment confirmed, order accepted.
    Confirmed,

    /// Order is being picked and packed.
    Processing,

    /// Order has left the warehouse.
    Shipped,

    /// Order reached the customer (terminal state).
    Delivered,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the transition `self -> next` is in the allowed table.
    ///
    /// Forward steps are strict (no skipping); `Cancelled` is reachable from
    /// every non-terminal state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (*self, next) {
            (Pending, Confirmed) => true,
            (Confirmed, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payment state of an order.
///
/// Allowed transitions: `Pending -> Completed`, `Pending -> Failed`,
/// `Failed -> Pending` (retry), `Failed -> Completed` (retry collapsed into
/// a single verification), `Completed -> Refunded`. `Refunded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Payment has not been captured yet.
    #[default]
    Pending,

    /// Payment captured in full.
    Completed,

    /// The last payment attempt failed; retry permitted.
    Failed,

    /// Payment was reversed (terminal state).
    Refunded,
}

impl PaymentStatus {
    /// Returns true if the transition `self -> next` is in the allowed table.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Completed)
                | (Pending, Failed)
                | (Failed, Pending)
                | (Failed, Completed)
                | (Failed, Failed)
                | (Completed, Refunded)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Refunded)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry in an order's append-only status history.
///
/// History entries are the audit trail of the state machine: they are only
/// ever appended, never mutated or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// The order status after the change this entry records.
    pub status: OrderStatus,

    /// When the change was committed.
    pub timestamp: DateTime<Utc>,

    /// Optional human-readable note.
    pub note: Option<String>,
}

impl StatusHistoryEntry {
    /// Creates a new history entry.
    pub fn new(status: OrderStatus, timestamp: DateTime<Utc>, note: Option<String>) -> Self {
        Self {
            status,
            timestamp,
            note,
        }
    }
}
