//! Recursive bill-of-materials resolution.
//!
//! A composite item's recipe is walked down to its leaf ingredients. Required
//! quantities propagate multiplicatively: a component needed at `q` per
//! portion of a parent requested `n` times is requested `q × n` times, and if
//! it is itself composite, its own components are resolved for that many
//! portions. Only leaves carry ledger stock; composite items are never
//! decremented themselves.
//!
//! The walk keeps the current path as a visited set. A component already on
//! the path is a cycle and is skipped with a warning; the same sub-recipe
//! reached again through a sibling branch (a diamond) is counted again, once
//! per path.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hotelpos_core::{DomainError, ItemId, Shortfall, ensure_positive, round_money, round_quantity};

use crate::error::InventoryResult;
use crate::item::{Item, RecipeEdge, StockChange};
use crate::store::ItemStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One line of a direct recipe with its costing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub component_id: ItemId,
    pub name: String,
    pub unit: String,
    pub quantity_per_portion: Decimal,
    /// `price_buy` for leaves, the cost of one portion for composites.
    pub unit_cost: Decimal,
    pub line_cost: Decimal,
    pub is_composite: bool,
}

/// Direct recipe of an item and the cost of one portion of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeCost {
    pub item_id: ItemId,
    pub lines: Vec<RecipeLine>,
    pub total_cost: Decimal,
}

/// Demand on one leaf ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientRequirement {
    pub item_id: ItemId,
    pub name: String,
    pub unit: String,
    pub required: Decimal,
    pub available: Decimal,
    pub is_available: bool,
}

impl IngredientRequirement {
    pub fn shortfall(&self) -> Shortfall {
        Shortfall::new(
            self.item_id,
            self.name.clone(),
            self.unit.clone(),
            self.required,
            self.available,
        )
    }
}

/// Outcome of an availability check, one entry per distinct leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub can_prepare: bool,
    pub ingredients: Vec<IngredientRequirement>,
    pub missing: Vec<IngredientRequirement>,
}

impl AvailabilityReport {
    pub fn requirement(&self, item_id: ItemId) -> Option<&IngredientRequirement> {
        self.ingredients.iter().find(|i| i.item_id == item_id)
    }

    pub fn shortfalls(&self) -> Vec<Shortfall> {
        self.missing.iter().map(IngredientRequirement::shortfall).collect()
    }
}

/// Accumulated, unrounded demand on one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LeafDemand {
    item_id: ItemId,
    required: Decimal,
    /// Some path contributed a non-positive quantity.
    blocked: bool,
}

fn merge_demand(acc: &mut Vec<LeafDemand>, item_id: ItemId, required: Decimal, blocked: bool) {
    match acc.iter_mut().find(|d| d.item_id == item_id) {
        Some(existing) => {
            existing.required += required;
            existing.blocked |= blocked;
        }
        None => acc.push(LeafDemand {
            item_id,
            required,
            blocked,
        }),
    }
}

/// Resolves, checks, consumes and restores ingredient stock for composite items.
#[derive(Debug, Clone)]
pub struct BomResolver<S> {
    store: S,
}

impl<S> BomResolver<S>
where
    S: ItemStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct recipe of `item_id` with unit and line costs.
    ///
    /// Costs are rounded to 2 decimals and quantities to 3. Items without a
    /// recipe yield no lines and a total cost of zero.
    pub async fn resolve_direct_recipe(&self, item_id: ItemId) -> InventoryResult<RecipeCost> {
        self.require_item(item_id).await?;
        let edges = self.store.recipe(item_id).await?;
        let mut path = vec![item_id];
        self.cost_of(item_id, edges, &mut path).await
    }

    /// Leaf requirements for `portions` of `item_id` against current stock.
    ///
    /// Read-only; safe to call speculatively.
    pub async fn check_availability(
        &self,
        item_id: ItemId,
        portions: Decimal,
    ) -> InventoryResult<AvailabilityReport> {
        self.check_availability_many(&[(item_id, portions)]).await
    }

    /// Like [`Self::check_availability`] for several dishes at once; demand on
    /// a leaf shared between dishes is summed.
    pub async fn check_availability_many(
        &self,
        dishes: &[(ItemId, Decimal)],
    ) -> InventoryResult<AvailabilityReport> {
        let demand = self.leaf_demand(dishes).await?;
        self.availability_of(&demand).await
    }

    /// Consume leaf stock for `portions` of `item_id`.
    ///
    /// Fails with [`DomainError::InsufficientStock`] listing every short leaf,
    /// without touching any stock, when the full demand cannot be covered.
    pub async fn consume_ingredients(
        &self,
        item_id: ItemId,
        portions: Decimal,
    ) -> InventoryResult<Vec<StockChange>> {
        self.consume_many(&[(item_id, portions)]).await
    }

    /// Consume stock for several dishes as one all-or-nothing unit.
    ///
    /// Returns the applied changes so callers can compensate.
    pub async fn consume_many(
        &self,
        dishes: &[(ItemId, Decimal)],
    ) -> InventoryResult<Vec<StockChange>> {
        let demand = self.leaf_demand(dishes).await?;
        let report = self.availability_of(&demand).await?;
        if !report.can_prepare {
            let shortfalls = report.shortfalls();
            warn!(
                dishes = dishes.len(),
                missing = shortfalls.len(),
                "ingredient consumption rejected"
            );
            return Err(DomainError::InsufficientStock(shortfalls).into());
        }

        let changes: Vec<StockChange> = demand
            .iter()
            .map(|d| StockChange::decrement(d.item_id, d.required))
            .collect();
        if !changes.is_empty() {
            // Conditional per leaf: a concurrent consumer that won the race
            // turns into InsufficientStock here rather than negative stock.
            self.store.apply_stock_batch(&changes).await?;
        }

        info!(dishes = dishes.len(), leaves = changes.len(), "ingredients consumed");
        Ok(changes)
    }

    /// Put back exactly what consuming `portions` of `item_id` would take.
    ///
    /// No availability check is performed. Nothing in the order workflow calls
    /// this on its own; the caller decides when stock really came back.
    pub async fn restore_ingredients(
        &self,
        item_id: ItemId,
        portions: Decimal,
    ) -> InventoryResult<Vec<StockChange>> {
        self.restore_many(&[(item_id, portions)]).await
    }

    pub async fn restore_many(
        &self,
        dishes: &[(ItemId, Decimal)],
    ) -> InventoryResult<Vec<StockChange>> {
        let demand = self.leaf_demand(dishes).await?;
        let changes: Vec<StockChange> = demand
            .iter()
            .filter(|d| d.required > Decimal::ZERO)
            .map(|d| StockChange::increment(d.item_id, d.required))
            .collect();
        if !changes.is_empty() {
            self.store.apply_stock_batch(&changes).await?;
        }

        info!(dishes = dishes.len(), leaves = changes.len(), "ingredients restored");
        Ok(changes)
    }

    /// Whole portions of `item_id` the current leaf stock can produce.
    ///
    /// This is the derived stock of a composite item. `None` for leaves.
    pub async fn producible_portions(&self, item_id: ItemId) -> InventoryResult<Option<Decimal>> {
        self.require_item(item_id).await?;
        let edges = self.store.recipe(item_id).await?;
        if edges.is_empty() {
            return Ok(None);
        }

        let mut demand = Vec::new();
        let mut path = vec![item_id];
        self.collect_demand(edges, Decimal::ONE, &mut path, &mut demand)
            .await?;
        if demand.is_empty() {
            return Ok(Some(Decimal::ZERO));
        }

        let items = self.items_by_id(&demand).await?;
        let mut portions: Option<Decimal> = None;
        for d in &demand {
            let item = lookup(&items, d.item_id)?;
            let possible = if d.blocked || d.required <= Decimal::ZERO {
                Decimal::ZERO
            } else {
                (item.amount / d.required).floor()
            };
            portions = Some(portions.map_or(possible, |p| p.min(possible)));
        }
        Ok(portions)
    }

    async fn require_item(&self, item_id: ItemId) -> InventoryResult<Item> {
        self.store
            .get(item_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("item {item_id}")).into())
    }

    async fn leaf_demand(&self, dishes: &[(ItemId, Decimal)]) -> InventoryResult<Vec<LeafDemand>> {
        let mut demand = Vec::new();
        for (item_id, portions) in dishes {
            ensure_positive(*portions, "portions")?;
            self.require_item(*item_id).await?;
            let edges = self.store.recipe(*item_id).await?;
            let mut path = vec![*item_id];
            self.collect_demand(edges, *portions, &mut path, &mut demand)
                .await?;
        }
        Ok(demand)
    }

    fn collect_demand<'a>(
        &'a self,
        edges: Vec<RecipeEdge>,
        portions: Decimal,
        path: &'a mut Vec<ItemId>,
        acc: &'a mut Vec<LeafDemand>,
    ) -> BoxFuture<'a, InventoryResult<()>> {
        Box::pin(async move {
            for edge in edges {
                let required = edge.quantity_per_portion * portions;
                let sub_edges = self.store.recipe(edge.component_id).await?;

                if sub_edges.is_empty() {
                    let blocked =
                        edge.quantity_per_portion <= Decimal::ZERO || required <= Decimal::ZERO;
                    merge_demand(acc, edge.component_id, required, blocked);
                    continue;
                }

                if path.contains(&edge.component_id) {
                    warn!(
                        composite_id = %edge.composite_id,
                        component_id = %edge.component_id,
                        "recipe cycle detected; skipping component"
                    );
                    continue;
                }

                path.push(edge.component_id);
                let result = self.collect_demand(sub_edges, required, path, acc).await;
                path.pop();
                result?;
            }
            Ok(())
        })
    }

    fn cost_of<'a>(
        &'a self,
        item_id: ItemId,
        edges: Vec<RecipeEdge>,
        path: &'a mut Vec<ItemId>,
    ) -> BoxFuture<'a, InventoryResult<RecipeCost>> {
        Box::pin(async move {
            let mut lines = Vec::with_capacity(edges.len());
            for edge in edges {
                let component = self.require_item(edge.component_id).await?;
                let sub_edges = self.store.recipe(component.id).await?;
                let is_composite = !sub_edges.is_empty();

                let unit_cost = if is_composite && !path.contains(&component.id) {
                    path.push(component.id);
                    let sub = self.cost_of(component.id, sub_edges, path).await;
                    path.pop();
                    sub?.total_cost
                } else {
                    if is_composite {
                        warn!(
                            item_id = %item_id,
                            component_id = %component.id,
                            "recipe cycle detected; costing component at purchase price"
                        );
                    }
                    round_money(component.price_buy)
                };

                lines.push(RecipeLine {
                    component_id: component.id,
                    name: component.name,
                    unit: component.unit,
                    quantity_per_portion: round_quantity(edge.quantity_per_portion),
                    unit_cost,
                    line_cost: round_money(edge.quantity_per_portion * unit_cost),
                    is_composite,
                });
            }

            let total_cost = round_money(lines.iter().map(|l| l.line_cost).sum());
            debug!(item_id = %item_id, lines = lines.len(), %total_cost, "recipe costed");
            Ok(RecipeCost {
                item_id,
                lines,
                total_cost,
            })
        })
    }

    async fn items_by_id(&self, demand: &[LeafDemand]) -> InventoryResult<HashMap<ItemId, Item>> {
        let ids: Vec<ItemId> = demand.iter().map(|d| d.item_id).collect();
        Ok(self
            .store
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect())
    }

    async fn availability_of(&self, demand: &[LeafDemand]) -> InventoryResult<AvailabilityReport> {
        let items = self.items_by_id(demand).await?;

        let mut ingredients = Vec::with_capacity(demand.len());
        for d in demand {
            let item = lookup(&items, d.item_id)?;
            // Non-positive demand cannot be judged, so it blocks preparation.
            // The verdict uses the exact demand; only the reported figure is rounded.
            let is_available =
                !d.blocked && d.required > Decimal::ZERO && item.amount >= d.required;
            ingredients.push(IngredientRequirement {
                item_id: item.id,
                name: item.name.clone(),
                unit: item.unit.clone(),
                required: round_quantity(d.required),
                available: item.amount,
                is_available,
            });
        }

        let missing: Vec<IngredientRequirement> = ingredients
            .iter()
            .filter(|i| !i.is_available)
            .cloned()
            .collect();

        Ok(AvailabilityReport {
            can_prepare: missing.is_empty(),
            ingredients,
            missing,
        })
    }
}

fn lookup(items: &HashMap<ItemId, Item>, item_id: ItemId) -> InventoryResult<&Item> {
    items
        .get(&item_id)
        .ok_or_else(|| DomainError::not_found(format!("ingredient item {item_id}")).into())
}
