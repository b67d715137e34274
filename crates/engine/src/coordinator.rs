//! Transaction coordinator for compound order operations.

use std::future::Future;

use chrono::Utc;
use common::{ActorId, OrderId, Version};
use domain::{
    IdempotencyKey, Order, OrderCharges, OrderStatus, PaymentMethod, PaymentStatus, ProductId,
    ShippingDetails,
};
use serde::{Deserialize, Serialize};
use store::{Store, StoreError, StoreExt, Transaction};

use crate::actor::Actor;
use crate::config::EngineConfig;
use crate::error::{EngineError, order_error};
use crate::services::notifier::{NotificationEvent, Notifier, OrderSummary};
use crate::services::verifier::PaymentVerifier;

/// One requested line of a new order, before the product snapshot is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product to order.
    pub product_id: ProductId,

    /// Quantity requested.
    pub quantity: u32,

    /// Variant size, for variant-tracked products.
    pub size: Option<String>,

    /// Variant color, for variant-tracked products.
    pub color: Option<String>,
}

/// Request to create an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// The purchasing actor.
    pub owner_id: ActorId,

    /// Requested lines.
    pub lines: Vec<OrderLine>,

    /// Reference to the shipping address held by the address book.
    pub shipping_address_id: String,

    /// How the customer pays.
    pub payment_method: PaymentMethod,

    /// Shipping/tax/discount charges, validated and recomputed by the core.
    pub charges: OrderCharges,

    /// Caller-supplied key making retries safe. Without one, a retried
    /// create risks a duplicate order and a double stock decrement.
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Request to move one order forward in its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    /// The order to update.
    pub order_id: OrderId,

    /// The target status.
    pub new_status: OrderStatus,

    /// Optional note recorded in the status history.
    pub note: Option<String>,

    /// Carrier, recorded when moving to `Shipped`.
    pub carrier: Option<String>,

    /// Tracking number, recorded when moving to `Shipped`.
    pub tracking_number: Option<String>,
}

/// Outcome of a best-effort bulk status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkStatusOutcome {
    /// Orders that were found.
    pub matched: usize,

    /// Orders whose status actually changed.
    pub modified: usize,
}

/// Coordinates compound operations across the order documents and the
/// stock ledger.
///
/// Every mutation is staged into a store [`Transaction`] and committed
/// all-or-nothing, guarded by the version the operation read; the loser of
/// a concurrent race gets `StateConflict` and retries with refreshed state.
/// Each operation is bounded by [`EngineConfig::transaction_timeout`].
pub struct OrderEngine<S, V, N>
where
    S: Store,
    V: PaymentVerifier,
    N: Notifier,
{
    pub(crate) store: S,
    pub(crate) verifier: V,
    pub(crate) notifier: N,
    pub(crate) config: EngineConfig,
}

impl<S, V, N> OrderEngine<S, V, N>
where
    S: Store,
    V: PaymentVerifier,
    N: Notifier + Clone + 'static,
{
    /// Creates a new engine.
    pub fn new(store: S, verifier: V, notifier: N, config: EngineConfig) -> Self {
        Self {
            store,
            verifier,
            notifier,
            config,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bounds a compound operation with the configured timeout.
    ///
    /// A timed-out operation has not committed anything: commits happen in
    /// one store call at the end of each operation, so cutting the future
    /// off cannot leave partial state behind.
    pub(crate) async fn bounded<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        match tokio::time::timeout(self.config.transaction_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("engine_timeouts_total").increment(1);
                tracing::warn!(operation, "operation timed out, transaction aborted");
                Err(EngineError::TransactionTimeout { operation })
            }
        }
    }

    /// Schedules a fire-and-forget notification, strictly after commit.
    /// Delivery failures are logged and never affect the operation result.
    pub(crate) fn notify_after_commit(&self, event: NotificationEvent, order: &Order) {
        let notifier = self.notifier.clone();
        let summary = OrderSummary::from_order(order);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(event, summary).await {
                tracing::warn!(error = %e, "notification dispatch failed");
            }
        });
    }

    /// Creates an order: validates the requested lines against the catalog,
    /// freezes product snapshots, decrements stock for every variant line,
    /// and inserts the order document — one all-or-nothing commit.
    ///
    /// Retries must carry the same idempotency key; a replayed key returns
    /// the already-created order without decrementing stock again.
    #[tracing::instrument(skip(self, request), fields(owner_id = %request.owner_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, EngineError> {
        let start = std::time::Instant::now();
        let result = self
            .bounded("create_order", self.create_order_txn(request))
            .await;
        metrics::histogram!("order_create_duration_seconds").record(start.elapsed().as_secs_f64());
        if result.is_ok() {
            metrics::counter!("orders_created_total").increment(1);
        }
        result
    }

    async fn create_order_txn(&self, request: CreateOrderRequest) -> Result<Order, EngineError> {
        if let Some(key) = &request.idempotency_key
            && let Some(order_id) = self.store.find_order_by_idempotency_key(key).await?
        {
            tracing::info!(%order_id, "idempotency key replay, returning existing order");
            return Ok(self.store.get_existing_order(order_id).await?);
        }

        let mut items = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = self.store.get_existing_product(&line.product_id).await?;
            if let (Some(size), Some(color)) = (&line.size, &line.color)
                && product.variant(size, color).is_none()
            {
                return Err(EngineError::VariantNotFound {
                    product_id: product.id.clone(),
                    size: size.clone(),
                    color: color.clone(),
                });
            }
            items.push(product.freeze_item(line.quantity, line.size.clone(), line.color.clone())?);
        }

        let starts_paid = request.payment_method.is_cod() && self.config.cod_marks_paid;
        let mut order = Order::create(
            request.owner_id,
            items,
            request.shipping_address_id,
            request.payment_method,
            request.charges,
            starts_paid,
            Utc::now(),
        )?;

        let tx = Transaction::new()
            .insert_order(order.clone(), request.idempotency_key.clone())
            .adjust_stock_all(order.reservation_adjustments());

        match self.store.commit(tx).await {
            Ok(()) => {
                order.set_version(Version::first());
                tracing::info!(
                    order_id = %order.id(),
                    order_number = %order.order_number(),
                    total = %order.total_amount(),
                    "order created"
                );
                self.notify_after_commit(NotificationEvent::OrderCreated, &order);
                Ok(order)
            }
            Err(StoreError::IdempotencyKeyReplay { key }) => {
                // Lost a race against a concurrent retry carrying the same key.
                let order_id = self
                    .store
                    .find_order_by_idempotency_key(&key)
                    .await?
                    .ok_or(EngineError::StateConflict {
                        order_id: order.id(),
                    })?;
                Ok(self.store.get_existing_order(order_id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves a single order forward per the allowed-transition table, with
    /// a history append, as one conditional commit.
    ///
    /// `Cancelled` is rejected here: cancellation restores stock and goes
    /// through [`OrderEngine::cancel_order`] or the refund engine.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, new_status = %request.new_status))]
    pub async fn update_order_status(
        &self,
        request: UpdateStatusRequest,
    ) -> Result<Order, EngineError> {
        self.bounded(
            "update_order_status",
            self.update_order_status_txn(request),
        )
        .await
    }

    async fn update_order_status_txn(
        &self,
        request: UpdateStatusRequest,
    ) -> Result<Order, EngineError> {
        if request.new_status == OrderStatus::Cancelled {
            return Err(EngineError::InvalidState {
                order_id: request.order_id,
                reason: "cancellation restores stock; use cancel_order or process_refund"
                    .to_string(),
            });
        }

        let mut order = self.store.get_existing_order(request.order_id).await?;
        let expected = order.version();
        let now = Utc::now();

        order
            .transition_order_status(request.new_status, request.note.clone(), now)
            .map_err(|e| order_error(request.order_id, e))?;

        if request.new_status == OrderStatus::Shipped {
            order.set_shipping_details(ShippingDetails {
                carrier: request.carrier.clone(),
                tracking_number: request.tracking_number.clone(),
                shipped_at: now,
            });
        }

        self.store
            .commit(Transaction::new().update_order(expected, order.clone()))
            .await?;
        order.set_version(expected.next());

        self.notify_after_commit(NotificationEvent::OrderStatusChanged, &order);
        Ok(order)
    }

    /// Cancels an unpaid order and restores its reserved stock, as one
    /// all-or-nothing commit.
    ///
    /// Paid orders go through the refund engine so money and stock move
    /// together.
    #[tracing::instrument(skip(self, reason), fields(%order_id))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        actor: Actor,
        reason: impl Into<String>,
    ) -> Result<Order, EngineError> {
        let reason = reason.into();
        self.bounded(
            "cancel_order",
            self.cancel_order_txn(order_id, actor, reason),
        )
        .await
    }

    async fn cancel_order_txn(
        &self,
        order_id: OrderId,
        actor: Actor,
        reason: String,
    ) -> Result<Order, EngineError> {
        let mut order = self.store.get_existing_order(order_id).await?;
        if !actor.can_access(order.owner_id()) {
            return Err(EngineError::Forbidden {
                actor_id: actor.id,
                order_id,
            });
        }
        if order.payment_status() == PaymentStatus::Completed {
            return Err(EngineError::InvalidState {
                order_id,
                reason: "paid orders are cancelled through process_refund".to_string(),
            });
        }

        let expected = order.version();
        order
            .transition_order_status(OrderStatus::Cancelled, Some(reason), Utc::now())
            .map_err(|e| order_error(order_id, e))?;

        let tx = Transaction::new()
            .update_order(expected, order.clone())
            .adjust_stock_all(order.restoration_adjustments());
        self.store.commit(tx).await?;
        order.set_version(expected.next());

        metrics::counter!("orders_cancelled_total").increment(1);
        self.notify_after_commit(NotificationEvent::OrderCancelled, &order);
        Ok(order)
    }

    /// Applies the same forward transition to every order independently.
    ///
    /// Each order's update is atomic, but the batch as a whole is
    /// best-effort: a missing order, a rejected transition, or a lost
    /// version race is logged and skipped so one bad order cannot block the
    /// rest. Contrast with the all-or-nothing batch refund.
    #[tracing::instrument(skip(self, order_ids, note), fields(count = order_ids.len(), %new_status))]
    pub async fn bulk_update_order_status(
        &self,
        order_ids: Vec<OrderId>,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<BulkStatusOutcome, EngineError> {
        self.bounded(
            "bulk_update_order_status",
            self.bulk_update_txn(order_ids, new_status, note),
        )
        .await
    }

    async fn bulk_update_txn(
        &self,
        order_ids: Vec<OrderId>,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<BulkStatusOutcome, EngineError> {
        let mut matched = 0usize;
        let mut modified = 0usize;
        let now = Utc::now();

        for order_id in order_ids {
            let Some(mut order) = self.store.get_order(order_id).await? else {
                tracing::warn!(%order_id, "bulk status update: order not found, skipping");
                continue;
            };
            matched += 1;

            if new_status == OrderStatus::Cancelled {
                tracing::warn!(%order_id, "bulk status update cannot cancel, skipping");
                continue;
            }

            let expected = order.version();
            if let Err(e) = order.transition_order_status(new_status, note.clone(), now) {
                tracing::warn!(%order_id, error = %e, "bulk status update: transition rejected, skipping");
                continue;
            }

            match self
                .store
                .commit(Transaction::new().update_order(expected, order.clone()))
                .await
            {
                Ok(()) => {
                    order.set_version(expected.next());
                    modified += 1;
                    self.notify_after_commit(NotificationEvent::OrderStatusChanged, &order);
                }
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, "bulk status update: commit failed, skipping");
                }
            }
        }

        metrics::counter!("bulk_status_updates_total").increment(1);
        Ok(BulkStatusOutcome { matched, modified })
    }

    /// Reads one order, with the ownership check applied.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn get_order(&self, order_id: OrderId, actor: Actor) -> Result<Order, EngineError> {
        let order = self.store.get_existing_order(order_id).await?;
        if !actor.can_access(order.owner_id()) {
            return Err(EngineError::Forbidden {
                actor_id: actor.id,
                order_id,
            });
        }
        Ok(order)
    }
}
