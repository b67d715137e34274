//! Payment verification gate.
//!
//! Intent creation is freely retryable; verification is the state-gated
//! step that drives the payment (and possibly the order) forward. The
//! verdict itself comes from the pluggable external verifier.

use chrono::Utc;
use common::OrderId;
use domain::{Money, Order, OrderStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::{Store, StoreExt, Transaction};
use uuid::Uuid;

use crate::actor::Actor;
use crate::coordinator::OrderEngine;
use crate::error::{EngineError, order_error};
use crate::services::notifier::{NotificationEvent, Notifier};
use crate::services::verifier::{PaymentEvidence, PaymentVerifier};

/// A freshly issued payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// The order being paid.
    pub order_id: OrderId,

    /// Reference handed to the gateway and back to the verifier.
    pub intent_ref: String,

    /// Amount to charge.
    pub amount: Money,
}

impl<S, V, N> OrderEngine<S, V, N>
where
    S: Store,
    V: PaymentVerifier,
    N: Notifier + Clone + 'static,
{
    /// Issues a payment intent for an order.
    ///
    /// Idempotent per order: calling again before verification reissues a
    /// fresh reference; stock and history are never touched.
    #[tracing::instrument(skip(self, actor), fields(%order_id))]
    pub async fn create_payment_intent(
        &self,
        order_id: OrderId,
        actor: Actor,
    ) -> Result<PaymentIntent, EngineError> {
        self.bounded(
            "create_payment_intent",
            self.create_payment_intent_txn(order_id, actor),
        )
        .await
    }

    async fn create_payment_intent_txn(
        &self,
        order_id: OrderId,
        actor: Actor,
    ) -> Result<PaymentIntent, EngineError> {
        let mut order = self.store.get_existing_order(order_id).await?;

        if !actor.can_access(order.owner_id()) {
            return Err(EngineError::Forbidden {
                actor_id: actor.id,
                order_id,
            });
        }
        match order.payment_status() {
            PaymentStatus::Completed => return Err(EngineError::AlreadyPaid(order_id)),
            PaymentStatus::Refunded => {
                return Err(EngineError::InvalidState {
                    order_id,
                    reason: "payment has been refunded".to_string(),
                });
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {}
        }
        if order.order_status() == OrderStatus::Cancelled {
            return Err(EngineError::InvalidState {
                order_id,
                reason: "cancelled orders cannot be paid".to_string(),
            });
        }

        let intent_ref = format!("PI-{}", Uuid::new_v4().simple());
        let expected = order.version();
        order.reissue_payment_intent(&intent_ref);

        self.store
            .commit(Transaction::new().update_order(expected, order.clone()))
            .await?;

        tracing::info!(%order_id, intent_ref, "payment intent issued");
        Ok(PaymentIntent {
            order_id,
            intent_ref,
            amount: order.total_amount(),
        })
    }

    /// Verifies a payment attempt against the external verifier and drives
    /// the order's payment state forward.
    ///
    /// A positive verdict completes the payment and, if the order is still
    /// pending, confirms it; a negative verdict marks the payment failed —
    /// both commit, each with exactly one history append. A second call on
    /// an already-completed payment is a no-op. One conditional commit; a
    /// concurrent verification loses with `StateConflict`.
    #[tracing::instrument(skip(self, actor, evidence), fields(%order_id))]
    pub async fn verify_payment(
        &self,
        order_id: OrderId,
        actor: Actor,
        evidence: PaymentEvidence,
    ) -> Result<Order, EngineError> {
        let result = self
            .bounded(
                "verify_payment",
                self.verify_payment_txn(order_id, actor, evidence),
            )
            .await;
        if let Ok(order) = &result
            && order.payment_status() == PaymentStatus::Completed
        {
            metrics::counter!("payments_verified_total").increment(1);
        }
        result
    }

    async fn verify_payment_txn(
        &self,
        order_id: OrderId,
        actor: Actor,
        evidence: PaymentEvidence,
    ) -> Result<Order, EngineError> {
        let order = self.store.get_existing_order(order_id).await?;

        if !actor.can_access(order.owner_id()) {
            return Err(EngineError::Forbidden {
                actor_id: actor.id,
                order_id,
            });
        }
        if order.payment_status() == PaymentStatus::Completed {
            // Verification is idempotent in effect: the payment stays
            // completed and no history entry is duplicated.
            return Ok(order);
        }
        if order.payment_status() == PaymentStatus::Refunded {
            return Err(EngineError::InvalidState {
                order_id,
                reason: "payment has been refunded".to_string(),
            });
        }
        if order.order_status() == OrderStatus::Cancelled {
            return Err(EngineError::InvalidState {
                order_id,
                reason: "cancelled orders cannot be paid".to_string(),
            });
        }

        let intent_ref = order
            .payment_details()
            .payment_intent_id
            .clone()
            .ok_or_else(|| EngineError::InvalidState {
                order_id,
                reason: "no payment intent issued".to_string(),
            })?;

        let verdict = self
            .verifier
            .verify(&intent_ref, &evidence)
            .await
            .map_err(|e| EngineError::ExternalVerifierFailure(e.to_string()))?;

        // Re-read before mutating: the verifier call suspended us, and the
        // order may have moved underneath. The conditional commit below
        // still guards the write.
        let mut order = self.store.get_existing_order(order_id).await?;
        if order.payment_status() == PaymentStatus::Completed {
            return Ok(order);
        }

        let expected = order.version();
        let now = Utc::now();
        if verdict.valid {
            order
                .record_payment_success(Some(evidence.transaction_id.clone()), now)
                .map_err(|e| order_error(order_id, e))?;
        } else {
            order
                .record_payment_failure(now)
                .map_err(|e| order_error(order_id, e))?;
        }

        self.store
            .commit(Transaction::new().update_order(expected, order.clone()))
            .await?;
        order.set_version(expected.next());

        if verdict.valid {
            tracing::info!(%order_id, "payment verified");
            self.notify_after_commit(NotificationEvent::PaymentCompleted, &order);
        } else {
            tracing::warn!(%order_id, "payment verification returned a negative verdict");
            metrics::counter!("payment_failures_total").increment(1);
            self.notify_after_commit(NotificationEvent::PaymentFailed, &order);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::coordinator::{CreateOrderRequest, OrderLine};
    use crate::services::notifier::InMemoryNotifier;
    use crate::services::verifier::InMemoryPaymentVerifier;
    use common::ActorId;
    use domain::{OrderCharges, PaymentMethod, Product, ProductId, StockVariant};
    use store::InMemoryStore;

    async fn setup() -> (
        OrderEngine<InMemoryStore, InMemoryPaymentVerifier, InMemoryNotifier>,
        InMemoryPaymentVerifier,
        Order,
        Actor,
    ) {
        let store = InMemoryStore::new();
        let verifier = InMemoryPaymentVerifier::new();
        let engine = OrderEngine::new(
            store.clone(),
            verifier.clone(),
            InMemoryNotifier::new(),
            EngineConfig::default(),
        );

        store
            .upsert_product(Product {
                id: ProductId::new("P1"),
                name: "Tee".to_string(),
                unit_price: Money::from_cents(50000),
                discount_unit_price: None,
                variants: vec![StockVariant {
                    size: "M".to_string(),
                    color: "Red".to_string(),
                    quantity: 5,
                }],
            })
            .await
            .unwrap();

        let owner_id = ActorId::new();
        let order = engine
            .create_order(CreateOrderRequest {
                owner_id,
                lines: vec![OrderLine {
                    product_id: ProductId::new("P1"),
                    quantity: 1,
                    size: Some("M".to_string()),
                    color: Some("Red".to_string()),
                }],
                shipping_address_id: "ADDR-1".to_string(),
                payment_method: PaymentMethod::Upi,
                charges: OrderCharges::default(),
                idempotency_key: None,
            })
            .await
            .unwrap();

        (engine, verifier, order, Actor::customer(owner_id))
    }

    fn evidence() -> PaymentEvidence {
        PaymentEvidence {
            transaction_id: "TXN-1".to_string(),
            signature: Some("sig".to_string()),
        }
    }

    #[tokio::test]
    async fn test_intent_then_verify_confirms_order() {
        let (engine, _, order, actor) = setup().await;

        let intent = engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        assert!(intent.intent_ref.starts_with("PI-"));
        assert_eq!(intent.amount, order.total_amount());

        let verified = engine
            .verify_payment(order.id(), actor, evidence())
            .await
            .unwrap();

        assert_eq!(verified.payment_status(), PaymentStatus::Completed);
        assert_eq!(verified.order_status(), OrderStatus::Confirmed);
        assert!(verified.payment_details().paid_at.is_some());
        assert_eq!(
            verified.payment_details().transaction_id.as_deref(),
            Some("TXN-1")
        );
        // creation + confirmation
        assert_eq!(verified.status_history().len(), 2);
    }

    #[tokio::test]
    async fn test_intent_is_reissuable() {
        let (engine, _, order, actor) = setup().await;

        let first = engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        let second = engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();

        assert_ne!(first.intent_ref, second.intent_ref);

        // no history entries were appended by either call
        let stored = engine.get_order(order.id(), actor).await.unwrap();
        assert_eq!(stored.status_history().len(), 1);
    }

    #[tokio::test]
    async fn test_intent_requires_ownership() {
        let (engine, _, order, _) = setup().await;

        let stranger = Actor::customer(ActorId::new());
        let result = engine.create_payment_intent(order.id(), stranger).await;
        assert!(matches!(result, Err(EngineError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_intent_missing_order() {
        let (engine, _, _, actor) = setup().await;
        let result = engine.create_payment_intent(OrderId::new(), actor).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_intent_after_payment_rejected() {
        let (engine, _, order, actor) = setup().await;

        engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        engine
            .verify_payment(order.id(), actor, evidence())
            .await
            .unwrap();

        let result = engine.create_payment_intent(order.id(), actor).await;
        assert!(matches!(result, Err(EngineError::AlreadyPaid(_))));
    }

    #[tokio::test]
    async fn test_intent_on_cancelled_order_rejected() {
        let (engine, _, order, actor) = setup().await;

        engine
            .cancel_order(order.id(), actor, "changed my mind")
            .await
            .unwrap();

        let result = engine.create_payment_intent(order.id(), actor).await;
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_negative_verdict_marks_failed_but_succeeds() {
        let (engine, verifier, order, actor) = setup().await;

        engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        verifier.set_verdict(false);

        let result = engine
            .verify_payment(order.id(), actor, evidence())
            .await
            .unwrap();

        assert_eq!(result.payment_status(), PaymentStatus::Failed);
        assert_eq!(result.order_status(), OrderStatus::Pending);
        // creation + failure note
        assert_eq!(result.status_history().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_payment_can_retry() {
        let (engine, verifier, order, actor) = setup().await;

        engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        verifier.set_verdict(false);
        engine
            .verify_payment(order.id(), actor, evidence())
            .await
            .unwrap();

        verifier.set_verdict(true);
        engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        let verified = engine
            .verify_payment(order.id(), actor, evidence())
            .await
            .unwrap();

        assert_eq!(verified.payment_status(), PaymentStatus::Completed);
        assert_eq!(verified.order_status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_verify_is_idempotent() {
        let (engine, verifier, order, actor) = setup().await;

        engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        let first = engine
            .verify_payment(order.id(), actor, evidence())
            .await
            .unwrap();
        let second = engine
            .verify_payment(order.id(), actor, evidence())
            .await
            .unwrap();

        assert_eq!(second.payment_status(), PaymentStatus::Completed);
        assert_eq!(
            first.status_history().len(),
            second.status_history().len()
        );
        // the second call never reached the verifier
        assert_eq!(verifier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_verify_without_intent_rejected() {
        let (engine, _, order, actor) = setup().await;

        let result = engine.verify_payment(order.id(), actor, evidence()).await;
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_verifier_outage_surfaces() {
        let (engine, verifier, order, actor) = setup().await;

        engine
            .create_payment_intent(order.id(), actor)
            .await
            .unwrap();
        verifier.set_fail_on_verify(true);

        let result = engine.verify_payment(order.id(), actor, evidence()).await;
        assert!(matches!(
            result,
            Err(EngineError::ExternalVerifierFailure(_))
        ));

        // nothing committed
        let stored = engine.get_order(order.id(), actor).await.unwrap();
        assert_eq!(stored.payment_status(), PaymentStatus::Pending);
        assert_eq!(stored.status_history().len(), 1);
    }
}
