//! Compound order operations for the order-processing core.
//!
//! The [`OrderEngine`] coordinates every mutation that spans the order
//! document and the stock ledger: order creation, status updates,
//! cancellation, payment verification, refunds, and the two batch shapes
//! (best-effort bulk status updates, all-or-nothing batch refunds). Every
//! compound operation is bounded by a timeout and commits through the
//! store's all-or-nothing transaction, so a failure or a lost
//! optimistic-concurrency race never leaves partial state behind.

pub mod actor;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod payment;
pub mod refund;
pub mod services;

pub use actor::{Actor, Role};
pub use config::EngineConfig;
pub use coordinator::{
    BulkStatusOutcome, CreateOrderRequest, OrderEngine, OrderLine, UpdateStatusRequest,
};
pub use error::EngineError;
pub use payment::PaymentIntent;
pub use refund::RefundBatchOutcome;
pub use services::notifier::{
    InMemoryNotifier, NotificationEvent, Notifier, NotifyError, OrderSummary,
};
pub use services::verifier::{
    InMemoryPaymentVerifier, PaymentEvidence, PaymentVerifier, Verdict, VerifierError,
};
