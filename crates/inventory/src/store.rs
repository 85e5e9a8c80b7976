//! Item and recipe persistence seam.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use hotelpos_core::{DomainError, ItemId, Shortfall};

use crate::item::{Item, RecipeEdge, StockChange};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A conditional decrement found less stock than requested; nothing was applied.
    #[error("stock changed concurrently for {} item(s)", .0.len())]
    StockConflict(Vec<Shortfall>),

    #[error("item {0} does not exist")]
    MissingItem(ItemId),

    /// The item failed [`Item::validate`] and was not written.
    #[error(transparent)]
    InvalidItem(DomainError),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Item + recipe storage.
///
/// Implementations must make `replace_recipe` and `apply_stock_batch` atomic:
/// either every row changes or none does.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Bulk lookup. Unknown ids are skipped.
    async fn get_many(&self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError>;

    /// Insert or update. Rejects items failing [`Item::validate`].
    async fn save(&self, item: Item) -> Result<(), StoreError>;

    /// Every item that is not soft-deleted.
    async fn list_live(&self) -> Result<Vec<Item>, StoreError>;

    /// Direct recipe of `composite_id` in insertion order. Empty for leaves.
    async fn recipe(&self, composite_id: ItemId) -> Result<Vec<RecipeEdge>, StoreError>;

    /// Delete all edges of `composite_id` and insert `edges` in their place.
    async fn replace_recipe(
        &self,
        composite_id: ItemId,
        edges: Vec<RecipeEdge>,
    ) -> Result<(), StoreError>;

    /// Apply signed stock changes as one unit.
    ///
    /// Every decrement is conditional on `amount + delta >= 0`; if any fails
    /// the whole batch is rejected with [`StoreError::StockConflict`].
    async fn apply_stock_batch(&self, changes: &[StockChange]) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> ItemStore for Arc<S>
where
    S: ItemStore + ?Sized,
{
    async fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get(id).await
    }

    async fn get_many(&self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
        (**self).get_many(ids).await
    }

    async fn save(&self, item: Item) -> Result<(), StoreError> {
        (**self).save(item).await
    }

    async fn list_live(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_live().await
    }

    async fn recipe(&self, composite_id: ItemId) -> Result<Vec<RecipeEdge>, StoreError> {
        (**self).recipe(composite_id).await
    }

    async fn replace_recipe(
        &self,
        composite_id: ItemId,
        edges: Vec<RecipeEdge>,
    ) -> Result<(), StoreError> {
        (**self).replace_recipe(composite_id, edges).await
    }

    async fn apply_stock_batch(&self, changes: &[StockChange]) -> Result<(), StoreError> {
        (**self).apply_stock_batch(changes).await
    }
}

/// Sum deltas per item, keeping first-seen order.
pub fn merge_changes(changes: &[StockChange]) -> Vec<StockChange> {
    let mut merged: Vec<StockChange> = Vec::with_capacity(changes.len());
    for change in changes {
        match merged.iter_mut().find(|c| c.item_id == change.item_id) {
            Some(existing) => existing.delta += change.delta,
            None => merged.push(*change),
        }
    }
    merged
}

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    recipes: HashMap<ItemId, Vec<RecipeEdge>>,
}

/// In-memory item store for tests/dev.
///
/// One lock guards items and recipes together, which is what makes the batch
/// operations atomic.
#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    inner: RwLock<State>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.items.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ids.iter().filter_map(|id| state.items.get(id).cloned()).collect())
    }

    async fn save(&self, item: Item) -> Result<(), StoreError> {
        item.validate().map_err(StoreError::InvalidItem)?;
        let mut state = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        state.items.insert(item.id, item);
        Ok(())
    }

    async fn list_live(&self) -> Result<Vec<Item>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| !i.is_deleted())
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    async fn recipe(&self, composite_id: ItemId) -> Result<Vec<RecipeEdge>, StoreError> {
        let state = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.recipes.get(&composite_id).cloned().unwrap_or_default())
    }

    async fn replace_recipe(
        &self,
        composite_id: ItemId,
        edges: Vec<RecipeEdge>,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if !state.items.contains_key(&composite_id) {
            return Err(StoreError::MissingItem(composite_id));
        }
        if edges.is_empty() {
            state.recipes.remove(&composite_id);
        } else {
            state.recipes.insert(composite_id, edges);
        }
        Ok(())
    }

    async fn apply_stock_batch(&self, changes: &[StockChange]) -> Result<(), StoreError> {
        let changes = merge_changes(changes);
        let mut state = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        let mut conflicts = Vec::new();
        for change in &changes {
            let item = state
                .items
                .get(&change.item_id)
                .ok_or(StoreError::MissingItem(change.item_id))?;
            if item.amount + change.delta < Decimal::ZERO {
                conflicts.push(Shortfall::new(
                    item.id,
                    item.name.clone(),
                    item.unit.clone(),
                    -change.delta,
                    item.amount,
                ));
            }
        }
        if !conflicts.is_empty() {
            return Err(StoreError::StockConflict(conflicts));
        }

        for change in &changes {
            if let Some(item) = state.items.get_mut(&change.item_id) {
                item.amount += change.delta;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = InMemoryItemStore::new();
        let flour = Item::new("Flour", "kg").with_stock(d("5"));
        let eggs = Item::new("Eggs", "pc").with_stock(d("2"));
        store.save(flour.clone()).await.unwrap();
        store.save(eggs.clone()).await.unwrap();

        let err = store
            .apply_stock_batch(&[
                StockChange::decrement(flour.id, d("1")),
                StockChange::decrement(eggs.id, d("3")),
            ])
            .await
            .unwrap_err();

        match err {
            StoreError::StockConflict(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].item_id, eggs.id);
                assert_eq!(items[0].missing, d("1"));
            }
            other => panic!("expected StockConflict, got {other:?}"),
        }
        assert_eq!(store.get(flour.id).await.unwrap().unwrap().amount, d("5"));
        assert_eq!(store.get(eggs.id).await.unwrap().unwrap().amount, d("2"));
    }

    #[tokio::test]
    async fn save_rejects_items_that_fail_validation() {
        let store = InMemoryItemStore::new();
        let broken = Item::new("Butter", "kg").with_stock(d("-0.5"));

        let err = store.save(broken.clone()).await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidItem(DomainError::InvariantViolation(_))));
        assert!(store.get(broken.id).await.unwrap().is_none());
        assert!(matches!(
            crate::error::InventoryError::from(err),
            crate::error::InventoryError::Domain(DomainError::InvariantViolation(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_changes_are_summed_before_the_check() {
        let store = InMemoryItemStore::new();
        let salt = Item::new("Salt", "kg").with_stock(d("1"));
        store.save(salt.clone()).await.unwrap();

        let result = store
            .apply_stock_batch(&[
                StockChange::decrement(salt.id, d("0.6")),
                StockChange::decrement(salt.id, d("0.6")),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::StockConflict(_))));
    }

    #[tokio::test]
    async fn unknown_item_in_batch_is_reported() {
        let store = InMemoryItemStore::new();
        let ghost = ItemId::new();
        let result = store
            .apply_stock_batch(&[StockChange::increment(ghost, d("1"))])
            .await;
        assert_eq!(result, Err(StoreError::MissingItem(ghost)));
    }

    #[tokio::test]
    async fn list_live_skips_soft_deleted_items() {
        let store = InMemoryItemStore::new();
        let mut gone = Item::new("Old menu", "pc");
        gone.deleted_at = Some(chrono::Utc::now());
        store.save(gone).await.unwrap();
        store.save(Item::new("Bread", "pc")).await.unwrap();

        let live = store.list_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "Bread");
    }
}
