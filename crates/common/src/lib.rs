//! Shared types used across the order-processing crates.

mod types;

pub use types::{ActorId, OrderId, Version};
