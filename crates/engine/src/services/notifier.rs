//! Notifier trait and in-memory implementation.
//!
//! Notifications are fire-and-forget: the engine schedules them strictly
//! after a successful commit, and a notifier failure is logged, never
//! surfaced as an operation failure.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{ActorId, OrderId};
use domain::{Money, Order, OrderStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happened to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderCreated,
    OrderStatusChanged,
    PaymentCompleted,
    PaymentFailed,
    OrderCancelled,
    RefundProcessed,
}

/// Snapshot of an order handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    /// The order's ID.
    pub order_id: OrderId,

    /// The order's human-readable number.
    pub order_number: String,

    /// The owning actor.
    pub owner_id: ActorId,

    /// Fulfillment status at notification time.
    pub order_status: OrderStatus,

    /// Payment status at notification time.
    pub payment_status: PaymentStatus,

    /// Total amount charged.
    pub total_amount: Money,
}

impl OrderSummary {
    /// Builds a summary from an order.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            owner_id: order.owner_id(),
            order_status: order.order_status(),
            payment_status: order.payment_status(),
            total_amount: order.total_amount(),
        }
    }
}

/// A notification could not be delivered.
#[derive(Debug, Clone, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Trait for outbound notification delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification. Failures are the notifier's problem;
    /// callers log and move on.
    async fn notify(
        &self,
        event: NotificationEvent,
        summary: OrderSummary,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(NotificationEvent, OrderSummary)>,
    fail_on_notify: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail deliveries.
    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_notify = fail;
    }

    /// Returns the number of delivered notifications.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns the delivered notifications.
    pub fn sent(&self) -> Vec<(NotificationEvent, OrderSummary)> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(
        &self,
        event: NotificationEvent,
        summary: OrderSummary,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_notify {
            return Err(NotifyError("smtp connection refused".to_string()));
        }

        state.sent.push((event, summary));
        Ok(())
    }
}
