//! Refund & restock engine.
//!
//! A refund reverses a completed payment: refund metadata, the transition
//! to cancelled, the history append, and the stock restorations all commit
//! in one transaction. The batch variant keeps that guarantee across the
//! whole batch — refunds move money, so unlike the bulk status update they
//! must not partially apply.

use chrono::Utc;
use common::OrderId;
use domain::{Money, Order, PaymentStatus, RefundRequest};
use serde::{Deserialize, Serialize};
use store::{Store, StoreExt, Transaction};
use uuid::Uuid;

use crate::actor::Actor;
use crate::coordinator::OrderEngine;
use crate::error::{EngineError, order_error};
use crate::services::notifier::{NotificationEvent, Notifier};
use crate::services::verifier::PaymentVerifier;

/// Outcome of an all-or-nothing batch refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundBatchOutcome {
    /// Orders whose payment was refunded.
    pub orders_processed: usize,

    /// Variant stock restorations committed alongside them.
    pub stock_restored: usize,
}

fn fresh_refund_id() -> String {
    format!("REF-{}", Uuid::new_v4().simple())
}

impl<S, V, N> OrderEngine<S, V, N>
where
    S: Store,
    V: PaymentVerifier,
    N: Notifier + Clone + 'static,
{
    /// Refunds a completed payment and restores the stock its order
    /// reserved, as one all-or-nothing commit.
    ///
    /// `amount` defaults to the order total; it may not exceed it. If any
    /// stock restoration fails the whole refund aborts and the payment
    /// stays completed, so the operation can be retried.
    #[tracing::instrument(skip(self, actor, reason), fields(%order_id))]
    pub async fn process_refund(
        &self,
        order_id: OrderId,
        actor: Actor,
        amount: Option<Money>,
        reason: impl Into<String>,
    ) -> Result<Order, EngineError> {
        let reason = reason.into();
        let result = self
            .bounded(
                "process_refund",
                self.process_refund_txn(order_id, actor, amount, reason),
            )
            .await;
        if result.is_ok() {
            metrics::counter!("refunds_processed_total").increment(1);
        }
        result
    }

    async fn process_refund_txn(
        &self,
        order_id: OrderId,
        actor: Actor,
        amount: Option<Money>,
        reason: String,
    ) -> Result<Order, EngineError> {
        let mut order = self.store.get_existing_order(order_id).await?;

        if !actor.can_access(order.owner_id()) {
            return Err(EngineError::Forbidden {
                actor_id: actor.id,
                order_id,
            });
        }

        let amount = amount.unwrap_or(order.total_amount());
        let expected = order.version();
        order
            .apply_refund(
                RefundRequest {
                    refund_id: fresh_refund_id(),
                    amount,
                    reason,
                },
                Utc::now(),
            )
            .map_err(|e| order_error(order_id, e))?;

        let restorations = order.restoration_adjustments();
        let tx = Transaction::new()
            .update_order(expected, order.clone())
            .adjust_stock_all(restorations);
        self.store.commit(tx).await?;
        order.set_version(expected.next());

        tracing::info!(%order_id, amount = %amount, "refund processed");
        self.notify_after_commit(NotificationEvent::RefundProcessed, &order);
        Ok(order)
    }

    /// Refunds every order in the batch whose payment is completed, in ONE
    /// transaction: all the order mutations and all the stock restorations
    /// commit together or not at all.
    ///
    /// Orders that are missing or not in a refundable payment state are
    /// filtered out before the transaction is built; they do not count
    /// toward the outcome.
    #[tracing::instrument(skip(self, order_ids, reason), fields(count = order_ids.len()))]
    pub async fn batch_process_refunds(
        &self,
        order_ids: Vec<OrderId>,
        reason: impl Into<String>,
    ) -> Result<RefundBatchOutcome, EngineError> {
        let reason = reason.into();
        self.bounded(
            "batch_process_refunds",
            self.batch_process_refunds_txn(order_ids, reason),
        )
        .await
    }

    async fn batch_process_refunds_txn(
        &self,
        order_ids: Vec<OrderId>,
        reason: String,
    ) -> Result<RefundBatchOutcome, EngineError> {
        let now = Utc::now();
        let mut tx = Transaction::new();
        let mut refunded = Vec::new();
        let mut stock_restored = 0usize;

        for order_id in order_ids {
            let Some(mut order) = self.store.get_order(order_id).await? else {
                tracing::warn!(%order_id, "batch refund: order not found, filtered out");
                continue;
            };
            if order.payment_status() != PaymentStatus::Completed {
                tracing::warn!(
                    %order_id,
                    payment_status = %order.payment_status(),
                    "batch refund: payment not completed, filtered out"
                );
                continue;
            }

            let expected = order.version();
            order
                .apply_refund(
                    RefundRequest {
                        refund_id: fresh_refund_id(),
                        amount: order.total_amount(),
                        reason: reason.clone(),
                    },
                    now,
                )
                .map_err(|e| order_error(order_id, e))?;

            let restorations = order.restoration_adjustments();
            stock_restored += restorations.len();
            tx = tx
                .update_order(expected, order.clone())
                .adjust_stock_all(restorations);
            order.set_version(expected.next());
            refunded.push(order);
        }

        if refunded.is_empty() {
            return Ok(RefundBatchOutcome {
                orders_processed: 0,
                stock_restored: 0,
            });
        }

        // One commit for the whole batch; any failure aborts every refund.
        self.store.commit(tx).await?;

        metrics::counter!("refunds_processed_total").increment(refunded.len() as u64);
        for order in &refunded {
            self.notify_after_commit(NotificationEvent::RefundProcessed, order);
        }

        tracing::info!(
            orders_processed = refunded.len(),
            stock_restored,
            "batch refund committed"
        );
        Ok(RefundBatchOutcome {
            orders_processed: refunded.len(),
            stock_restored,
        })
    }
}
