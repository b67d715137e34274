//! Payment verifier trait and in-memory implementation.
//!
//! The engine never talks to a payment gateway; it hands the evidence a
//! client collected to a pluggable verifier and acts on the verdict.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Evidence a client presents for a payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvidence {
    /// Gateway transaction reference.
    pub transaction_id: String,

    /// Gateway signature over the attempt, if the gateway issues one.
    pub signature: Option<String>,
}

/// The verifier's binary judgment on a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the evidence checks out.
    pub valid: bool,
}

/// The verifier itself was unreachable or errored.
///
/// Distinct from a negative verdict: a negative verdict is an answer, this
/// is the absence of one.
#[derive(Debug, Clone, Error)]
#[error("Payment verifier unavailable: {0}")]
pub struct VerifierError(pub String);

/// Trait for external payment verification.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Judges the evidence for a previously issued intent reference.
    async fn verify(
        &self,
        intent_ref: &str,
        evidence: &PaymentEvidence,
    ) -> Result<Verdict, VerifierError>;
}

#[derive(Debug, Default)]
struct InMemoryVerifierState {
    next_verdict: Option<bool>,
    fail_on_verify: bool,
    call_count: u32,
}

/// In-memory payment verifier for testing.
///
/// Returns a positive verdict unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentVerifier {
    state: Arc<RwLock<InMemoryVerifierState>>,
}

impl InMemoryPaymentVerifier {
    /// Creates a new in-memory verifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the verdict returned by subsequent verify calls.
    pub fn set_verdict(&self, valid: bool) {
        self.state.write().unwrap().next_verdict = Some(valid);
    }

    /// Configures the verifier to error (as if unreachable).
    pub fn set_fail_on_verify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_verify = fail;
    }

    /// Returns how many times verify was called.
    pub fn call_count(&self) -> u32 {
        self.state.read().unwrap().call_count
    }
}

#[async_trait]
impl PaymentVerifier for InMemoryPaymentVerifier {
    async fn verify(
        &self,
        _intent_ref: &str,
        _evidence: &PaymentEvidence,
    ) -> Result<Verdict, VerifierError> {
        let mut state = self.state.write().unwrap();
        state.call_count += 1;

        if state.fail_on_verify {
            return Err(VerifierError("gateway unreachable".to_string()));
        }

        Ok(Verdict {
            valid: state.next_verdict.unwrap_or(true),
        })
    }
}
