//! Engine configuration loaded from environment variables.

use std::time::Duration;

/// Engine policy knobs with sensible defaults.
///
/// Reads from environment variables:
/// - `COD_MARKS_PAID` — when set to `1` or `true`, cash-on-delivery orders
///   start with their payment marked completed instead of pending
///   (default: `false`)
/// - `TXN_TIMEOUT_MS` — upper bound on any compound operation, in
///   milliseconds (default: `5000`)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// COD policy: whether COD orders start with `payment_status = completed`.
    pub cod_marks_paid: bool,

    /// Upper bound on a compound operation before it aborts cleanly.
    pub transaction_timeout: Duration,
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let cod_marks_paid = std::env::var("COD_MARKS_PAID")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let timeout_ms = std::env::var("TXN_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        Self {
            cod_marks_paid,
            transaction_timeout: Duration::from_millis(timeout_ms),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cod_marks_paid: false,
            transaction_timeout: Duration::from_millis(5000),
        }
    }
}
