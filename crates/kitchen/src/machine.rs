//! Order line state machine.
//!
//! Entering COOKING is the only transition with a stock side effect: the
//! ingredients of every affected line are consumed through the BOM resolver as
//! one all-or-nothing unit before the new state is persisted. All transitions
//! on one order are serialized by a per-order lock, so a line cannot be
//! cooked twice by racing requests.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use hotelpos_core::{DomainError, DomainResult, ItemId, OrderId, OrderLineId, ensure_positive};
use hotelpos_events::KeyedLocks;
use hotelpos_inventory::{BomResolver, InventoryError, ItemStore, StockChange};

use crate::error::KitchenResult;
use crate::order::{LineState, Order, OrderLine, Transition};
use crate::store::OrderStore;

pub struct OrderStateMachine<I, O> {
    bom: BomResolver<I>,
    orders: O,
    locks: KeyedLocks<OrderId>,
}

impl<I, O> OrderStateMachine<I, O>
where
    I: ItemStore,
    O: OrderStore,
{
    pub fn new(items: I, orders: O) -> Self {
        Self {
            bom: BomResolver::new(items),
            orders,
            locks: KeyedLocks::new(),
        }
    }

    pub fn bom(&self) -> &BomResolver<I> {
        &self.bom
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Persist a new order whose lines are all PENDING and reference live items.
    pub async fn submit_order(&self, order: Order) -> KitchenResult<Order> {
        for line in &order.lines {
            ensure_positive(line.portions, "portions")?;
            if line.state != LineState::Pending {
                return Err(DomainError::validation(format!(
                    "new line {} must start as {}",
                    line.id,
                    LineState::Pending
                ))
                .into());
            }
            let item = self
                .bom
                .store()
                .get(line.item_id)
                .await
                .map_err(InventoryError::from)?
                .ok_or_else(|| DomainError::not_found(format!("item {}", line.item_id)))?;
            if item.is_deleted() {
                return Err(DomainError::validation(format!(
                    "item {} is no longer on sale",
                    item.id
                ))
                .into());
            }
        }

        let _guard = self.locks.lock(order.id).await;
        if self.orders.get(order.id).await?.is_some() {
            return Err(DomainError::conflict(format!("order {} already exists", order.id)).into());
        }
        self.orders.save(order.clone()).await?;

        info!(order_id = %order.id, lines = order.lines.len(), "order submitted");
        Ok(order)
    }

    /// Move one line to `target`.
    pub async fn transition_line(
        &self,
        line_id: OrderLineId,
        target: LineState,
    ) -> KitchenResult<OrderLine> {
        let order_id = self
            .orders
            .order_of_line(line_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("order line {line_id}")))?;

        let _guard = self.locks.lock(order_id).await;
        let order = self.load(order_id).await?;
        let order = self.commit(order, &[line_id], target).await?;
        Ok(order.line(line_id)?.clone())
    }

    /// Like [`Self::transition_line`], with the target given as a state code.
    pub async fn transition_line_code(
        &self,
        line_id: OrderLineId,
        code: &str,
    ) -> KitchenResult<OrderLine> {
        let target = LineState::from_code(code)?;
        self.transition_line(line_id, target).await
    }

    /// Move every open line of an order to `target` as one unit.
    ///
    /// Lines already SERVED or CANCELLED are left as they are. Consumption for
    /// all lines entering COOKING succeeds or fails together.
    pub async fn transition_order(&self, order_id: OrderId, target: LineState) -> KitchenResult<Order> {
        let _guard = self.locks.lock(order_id).await;
        let order = self.load(order_id).await?;
        let open: Vec<OrderLineId> = order
            .lines
            .iter()
            .filter(|l| !l.state.is_terminal())
            .map(|l| l.id)
            .collect();
        self.commit(order, &open, target).await
    }

    pub async fn transition_order_code(&self, order_id: OrderId, code: &str) -> KitchenResult<Order> {
        let target = LineState::from_code(code)?;
        self.transition_order(order_id, target).await
    }

    /// Move lines independently; returns the ids that made it.
    ///
    /// A failing line is logged and skipped, it never aborts the others.
    pub async fn transition_lines(
        &self,
        line_ids: &[OrderLineId],
        target: LineState,
    ) -> Vec<OrderLineId> {
        let mut moved = Vec::with_capacity(line_ids.len());
        for line_id in line_ids {
            match self.transition_line(*line_id, target).await {
                Ok(_) => moved.push(*line_id),
                Err(err) => {
                    warn!(line_id = %line_id, state = %target, error = %err, "line transition skipped");
                }
            }
        }
        moved
    }

    /// Lines in `state`, oldest first by the timestamp relevant to that state.
    pub async fn kitchen_queue(&self, state: LineState) -> KitchenResult<Vec<OrderLine>> {
        let mut lines = self.orders.lines_in_state(state).await?;
        lines.sort_by_key(|l| (l.queued_at(), l.id));
        Ok(lines)
    }

    async fn load(&self, order_id: OrderId) -> KitchenResult<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("order {order_id}")).into())
    }

    async fn commit(
        &self,
        mut order: Order,
        line_ids: &[OrderLineId],
        target: LineState,
    ) -> KitchenResult<Order> {
        let mut moves = Vec::new();
        for line_id in line_ids {
            if let Transition::Move { consumes, .. } = order.line(*line_id)?.plan(target)? {
                moves.push((*line_id, consumes));
            }
        }
        if moves.is_empty() {
            return Ok(order);
        }

        let dishes = moves
            .iter()
            .filter(|(_, consumes)| *consumes)
            .map(|(id, _)| order.line(*id).map(|l| (l.item_id, l.portions)))
            .collect::<DomainResult<Vec<(ItemId, Decimal)>>>()?;
        let consumed = if dishes.is_empty() {
            Vec::new()
        } else {
            self.bom.consume_many(&dishes).await?
        };

        let now = Utc::now();
        for (line_id, _) in &moves {
            let line = order.line_mut(*line_id)?;
            if target == LineState::Cancelled && line.has_been_cooked() {
                warn!(
                    order_id = %line.order_id,
                    line_id = %line.id,
                    item_id = %line.item_id,
                    from = %line.state,
                    "cooked line cancelled; ingredients are not restored"
                );
            }
            line.apply(target, now);
        }

        if let Err(err) = self.orders.save(order.clone()).await {
            self.compensate(order.id, &consumed).await;
            return Err(err.into());
        }

        info!(order_id = %order.id, lines = moves.len(), state = %target, "order lines moved");
        Ok(order)
    }

    /// Give back stock taken for a transition that could not be persisted.
    async fn compensate(&self, order_id: OrderId, consumed: &[StockChange]) {
        if consumed.is_empty() {
            return;
        }
        let reversed: Vec<StockChange> = consumed
            .iter()
            .map(|c| StockChange::increment(c.item_id, -c.delta))
            .collect();
        match self.bom.store().apply_stock_batch(&reversed).await {
            Ok(()) => warn!(order_id = %order_id, leaves = reversed.len(), "consumed stock restored after failed save"),
            Err(err) => error!(order_id = %order_id, error = %err, "failed to restore consumed stock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KitchenError;
    use crate::store::{InMemoryOrderStore, OrderStoreError};
    use async_trait::async_trait;
    use hotelpos_inventory::{InMemoryItemStore, Item, RecipeComponent, replace_recipe};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Order store whose saves can be switched to fail.
    #[derive(Default)]
    struct FlakyOrders {
        inner: InMemoryOrderStore,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl OrderStore for FlakyOrders {
        async fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
            self.inner.get(order_id).await
        }

        async fn save(&self, order: Order) -> Result<(), OrderStoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(OrderStoreError::Backend("disk full".into()));
            }
            self.inner.save(order).await
        }

        async fn order_of_line(&self, line_id: OrderLineId) -> Result<Option<OrderId>, OrderStoreError> {
            self.inner.order_of_line(line_id).await
        }

        async fn lines_in_state(&self, state: LineState) -> Result<Vec<OrderLine>, OrderStoreError> {
            self.inner.lines_in_state(state).await
        }
    }

    type Machine = OrderStateMachine<Arc<InMemoryItemStore>, Arc<FlakyOrders>>;

    struct Fixture {
        items: Arc<InMemoryItemStore>,
        orders: Arc<FlakyOrders>,
        machine: Arc<Machine>,
        rice: ItemId,
        bowl: ItemId,
    }

    /// Rice bowl: 0.2 kg rice per portion, 3 kg in stock.
    async fn fixture() -> Fixture {
        let items = Arc::new(InMemoryItemStore::new());
        let rice = Item::new("Rice", "kg").with_stock(d("3"));
        let bowl = Item::new("Rice bowl", "pc");
        let (rice_id, bowl_id) = (rice.id, bowl.id);
        items.save(rice).await.unwrap();
        items.save(bowl).await.unwrap();
        replace_recipe(items.as_ref(), bowl_id, vec![RecipeComponent::new(rice_id, d("0.2"))])
            .await
            .unwrap();

        let orders = Arc::new(FlakyOrders::default());
        Fixture {
            machine: Arc::new(OrderStateMachine::new(items.clone(), orders.clone())),
            items,
            orders,
            rice: rice_id,
            bowl: bowl_id,
        }
    }

    impl Fixture {
        async fn order(&self, portions: &[&str]) -> Order {
            let mut order = Order::new(Utc::now());
            for p in portions {
                order.add_line(self.bowl, d(p)).unwrap();
            }
            self.machine.submit_order(order).await.unwrap()
        }

        async fn rice_stock(&self) -> Decimal {
            self.items.get(self.rice).await.unwrap().unwrap().amount
        }
    }

    #[tokio::test]
    async fn repeated_cooking_consumes_once() {
        let f = fixture().await;
        let order = f.order(&["2"]).await;
        let line = order.lines[0].id;

        f.machine.transition_line(line, LineState::Cooking).await.unwrap();
        let again = f.machine.transition_line(line, LineState::Cooking).await.unwrap();

        assert_eq!(again.state, LineState::Cooking);
        assert_eq!(f.rice_stock().await, d("2.6"));
    }

    #[tokio::test]
    async fn concurrent_cooking_requests_consume_once() {
        let f = fixture().await;
        let order = f.order(&["5"]).await;
        let line = order.lines[0].id;

        let a = tokio::spawn({
            let m = f.machine.clone();
            async move { m.transition_line(line, LineState::Cooking).await }
        });
        let b = tokio::spawn({
            let m = f.machine.clone();
            async move { m.transition_line(line, LineState::Cooking).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(f.rice_stock().await, d("2.0"));
    }

    #[tokio::test]
    async fn cancelling_cooked_lines_keeps_stock_consumed() {
        let f = fixture().await;
        let order = f.order(&["1", "1"]).await;
        let (cooking, ready) = (order.lines[0].id, order.lines[1].id);

        f.machine.transition_line(cooking, LineState::Cooking).await.unwrap();
        f.machine.transition_line(ready, LineState::Cooking).await.unwrap();
        f.machine.transition_line(ready, LineState::Ready).await.unwrap();
        assert_eq!(f.rice_stock().await, d("2.6"));

        let a = f.machine.transition_line(cooking, LineState::Cancelled).await.unwrap();
        let b = f.machine.transition_line(ready, LineState::Cancelled).await.unwrap();

        assert!(a.cancelled_at.is_some() && b.cancelled_at.is_some());
        assert_eq!(f.rice_stock().await, d("2.6"));
    }

    #[tokio::test]
    async fn shortfall_leaves_state_and_stock_untouched() {
        let f = fixture().await;
        let order = f.order(&["20"]).await;
        let line = order.lines[0].id;

        let err = f.machine.transition_line(line, LineState::Cooking).await.unwrap_err();

        let shortfalls = err.as_domain().and_then(DomainError::shortfalls).unwrap();
        assert_eq!(shortfalls[0].missing, d("1.0"));
        let stored = f.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.lines[0].state, LineState::Pending);
        assert_eq!(f.rice_stock().await, d("3"));
    }

    #[tokio::test]
    async fn order_transition_is_all_or_nothing() {
        let f = fixture().await;
        let order = f.order(&["10", "10"]).await;

        let err = f.machine.transition_order(order.id, LineState::Cooking).await;
        assert!(err.is_err());
        assert_eq!(f.rice_stock().await, d("3"));

        let small = f.order(&["4", "6"]).await;
        let moved = f.machine.transition_order(small.id, LineState::Cooking).await.unwrap();
        assert!(moved.lines.iter().all(|l| l.state == LineState::Cooking));
        assert_eq!(f.rice_stock().await, d("1.0"));
    }

    #[tokio::test]
    async fn batch_returns_only_successful_lines() {
        let f = fixture().await;
        let order = f.order(&["5", "100", "5"]).await;
        let ids: Vec<OrderLineId> = order.lines.iter().map(|l| l.id).collect();

        let moved = f.machine.transition_lines(&ids, LineState::Cooking).await;

        assert_eq!(moved, vec![ids[0], ids[2]]);
        assert_eq!(f.rice_stock().await, d("1.0"));
    }

    #[tokio::test]
    async fn failed_save_restores_consumed_stock() {
        let f = fixture().await;
        let order = f.order(&["5"]).await;
        f.orders.fail_saves.store(true, Ordering::SeqCst);

        let err = f
            .machine
            .transition_line(order.lines[0].id, LineState::Cooking)
            .await
            .unwrap_err();

        assert!(matches!(err, KitchenError::Orders(_)));
        assert_eq!(f.rice_stock().await, d("3"));
    }

    #[tokio::test]
    async fn terminal_lines_reject_further_moves() {
        let f = fixture().await;
        let order = f.order(&["1"]).await;
        let line = order.lines[0].id;
        f.machine.transition_line(line, LineState::Served).await.unwrap();

        let err = f.machine.transition_line(line, LineState::Cooking).await.unwrap_err();
        assert!(matches!(err, KitchenError::Domain(DomainError::InvariantViolation(_))));
        assert_eq!(f.rice_stock().await, d("3"));
    }

    #[tokio::test]
    async fn unknown_state_code_and_line_are_not_found() {
        let f = fixture().await;
        let order = f.order(&["1"]).await;

        let err = f
            .machine
            .transition_line_code(order.lines[0].id, "PLATING")
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenError::Domain(DomainError::NotFound(_))));

        let err = f
            .machine
            .transition_line(OrderLineId::new(), LineState::Ready)
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenError::Domain(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn order_code_transition_skips_closed_lines() {
        let f = fixture().await;
        let order = f.order(&["1", "1"]).await;
        f.machine
            .transition_line(order.lines[1].id, LineState::Cancelled)
            .await
            .unwrap();

        let served = f.machine.transition_order_code(order.id, "served").await.unwrap();

        assert_eq!(served.lines[0].state, LineState::Served);
        assert!(served.lines[0].served_at.is_some());
        assert_eq!(served.lines[1].state, LineState::Cancelled);
        assert_eq!(f.rice_stock().await, d("3"));
    }

    #[tokio::test]
    async fn kitchen_queue_orders_by_cook_start() {
        let f = fixture().await;
        let first = f.order(&["1"]).await;
        let second = f.order(&["1"]).await;

        f.machine.transition_line(second.lines[0].id, LineState::Cooking).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        f.machine.transition_line(first.lines[0].id, LineState::Cooking).await.unwrap();

        let queue = f.machine.kitchen_queue(LineState::Cooking).await.unwrap();
        let ids: Vec<OrderLineId> = queue.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![second.lines[0].id, first.lines[0].id]);
        assert!(f.machine.kitchen_queue(LineState::Pending).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_unknown_items() {
        let f = fixture().await;
        let mut order = Order::new(Utc::now());
        order.add_line(ItemId::new(), d("1")).unwrap();

        let err = f.machine.submit_order(order).await.unwrap_err();
        assert!(matches!(err, KitchenError::Domain(DomainError::NotFound(_))));
    }
}
