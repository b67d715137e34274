//! Persistence layer for the order-processing core.
//!
//! The store holds two kinds of documents: orders (versioned, updated only
//! through conditional writes) and products with their per-variant stock
//! records. Compound operations stage their mutations in a [`Transaction`]
//! and hand it to [`Store::commit`], which applies everything or nothing.
//!
//! Two implementations are provided: [`InMemoryStore`] (reference semantics,
//! used throughout the test suites) and [`PostgresStore`].

mod error;
mod memory;
mod postgres;
mod store;
mod transaction;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{Store, StoreExt};
pub use transaction::{Operation, Transaction, validate_transaction};
