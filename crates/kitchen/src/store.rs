use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use hotelpos_core::{OrderId, OrderLineId};

use crate::order::{LineState, Order, OrderLine};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderStoreError {
    #[error("order store lock poisoned")]
    Poisoned,

    #[error("order storage failure: {0}")]
    Backend(String),
}

/// Order persistence seam.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError>;

    /// Insert or overwrite the whole order, lines included.
    async fn save(&self, order: Order) -> Result<(), OrderStoreError>;

    async fn order_of_line(&self, line_id: OrderLineId) -> Result<Option<OrderId>, OrderStoreError>;

    /// Lines currently in `state`, unordered.
    async fn lines_in_state(&self, state: LineState) -> Result<Vec<OrderLine>, OrderStoreError>;
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).get(order_id).await
    }

    async fn save(&self, order: Order) -> Result<(), OrderStoreError> {
        (**self).save(order).await
    }

    async fn order_of_line(&self, line_id: OrderLineId) -> Result<Option<OrderId>, OrderStoreError> {
        (**self).order_of_line(line_id).await
    }

    async fn lines_in_state(&self, state: LineState) -> Result<Vec<OrderLine>, OrderStoreError> {
        (**self).lines_in_state(state).await
    }
}

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    line_index: HashMap<OrderLineId, OrderId>,
}

/// In-memory order store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    inner: RwLock<State>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let state = self.inner.read().map_err(|_| OrderStoreError::Poisoned)?;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn save(&self, order: Order) -> Result<(), OrderStoreError> {
        let mut state = self.inner.write().map_err(|_| OrderStoreError::Poisoned)?;
        for line in &order.lines {
            state.line_index.insert(line.id, order.id);
        }
        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn order_of_line(&self, line_id: OrderLineId) -> Result<Option<OrderId>, OrderStoreError> {
        let state = self.inner.read().map_err(|_| OrderStoreError::Poisoned)?;
        Ok(state.line_index.get(&line_id).copied())
    }

    async fn lines_in_state(&self, wanted: LineState) -> Result<Vec<OrderLine>, OrderStoreError> {
        let state = self.inner.read().map_err(|_| OrderStoreError::Poisoned)?;
        Ok(state
            .orders
            .values()
            .flat_map(|o| o.lines.iter())
            .filter(|l| l.state == wanted)
            .cloned()
            .collect())
    }
}
