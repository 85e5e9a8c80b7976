//! Kitchen order workflow.
//!
//! Orders are made of dish lines moving PENDING → COOKING → READY → SERVED,
//! with CANCELLED reachable from any open state. Ingredients leave stock when
//! a line starts cooking.

pub mod error;
pub mod machine;
pub mod order;
pub mod store;

pub use error::{KitchenError, KitchenResult};
pub use machine::OrderStateMachine;
pub use order::{LineState, Order, OrderLine, Transition};
pub use store::{InMemoryOrderStore, OrderStore, OrderStoreError};
