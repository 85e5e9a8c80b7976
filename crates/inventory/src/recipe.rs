//! Recipe editing with write-time graph validation.
//!
//! The recipe graph must stay acyclic. Traversals in [`crate::bom`] still keep
//! a visited set, because rows written before this check existed (or by other
//! writers) can still contain cycles.

use std::collections::HashSet;

use tracing::info;

use hotelpos_core::{DomainError, ItemId, ensure_positive};

use crate::error::InventoryResult;
use crate::item::{RecipeComponent, RecipeEdge};
use crate::store::ItemStore;

/// Validate `components` and atomically replace the recipe of `composite_id`.
///
/// An empty component list turns the item back into a leaf.
pub async fn replace_recipe<S>(
    store: &S,
    composite_id: ItemId,
    components: Vec<RecipeComponent>,
) -> InventoryResult<Vec<RecipeEdge>>
where
    S: ItemStore + ?Sized,
{
    let composite = store
        .get(composite_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("item {composite_id}")))?;
    if composite.is_deleted() {
        return Err(DomainError::validation(format!(
            "cannot edit the recipe of deleted item {composite_id}"
        ))
        .into());
    }

    let mut seen = HashSet::new();
    for component in &components {
        ensure_positive(component.quantity_per_portion, "quantity_per_portion")?;
        if component.component_id == composite_id {
            return Err(DomainError::validation(format!(
                "item {composite_id} cannot be a component of itself"
            ))
            .into());
        }
        if !seen.insert(component.component_id) {
            return Err(DomainError::validation(format!(
                "component {} listed more than once",
                component.component_id
            ))
            .into());
        }
    }

    let ids: Vec<ItemId> = components.iter().map(|c| c.component_id).collect();
    let found = store.get_many(&ids).await?;
    if let Some(missing) = ids.iter().find(|id| !found.iter().any(|i| i.id == **id)) {
        return Err(DomainError::not_found(format!("component item {missing}")).into());
    }

    ensure_acyclic(store, composite_id, &ids).await?;

    let edges: Vec<RecipeEdge> = components
        .into_iter()
        .map(|c| RecipeEdge {
            composite_id,
            component_id: c.component_id,
            quantity_per_portion: c.quantity_per_portion,
            notes: c.notes,
        })
        .collect();

    store.replace_recipe(composite_id, edges.clone()).await?;
    info!(item_id = %composite_id, components = edges.len(), "recipe replaced");

    Ok(edges)
}

/// Reject the edit if `composite_id` is reachable from any new component
/// through existing edges.
async fn ensure_acyclic<S>(
    store: &S,
    composite_id: ItemId,
    components: &[ItemId],
) -> InventoryResult<()>
where
    S: ItemStore + ?Sized,
{
    // (node, direct component it was reached through)
    let mut stack: Vec<(ItemId, ItemId)> = components.iter().map(|c| (*c, *c)).collect();
    let mut seen = HashSet::new();

    while let Some((node, via)) = stack.pop() {
        if node == composite_id {
            return Err(DomainError::validation(format!(
                "recipe for item {composite_id} would create a cycle through component {via}"
            ))
            .into());
        }
        if !seen.insert(node) {
            continue;
        }
        for edge in store.recipe(node).await? {
            stack.push((edge.component_id, via));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryError;
    use crate::item::Item;
    use crate::store::InMemoryItemStore;
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    async fn item(store: &InMemoryItemStore, name: &str) -> ItemId {
        let item = Item::new(name, "kg");
        let id = item.id;
        store.save(item).await.unwrap();
        id
    }

    fn validation_message(err: InventoryError) -> String {
        match err {
            InventoryError::Domain(DomainError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replaces_previous_edges() {
        let store = InMemoryItemStore::new();
        let dish = item(&store, "Omelette").await;
        let eggs = item(&store, "Eggs").await;
        let milk = item(&store, "Milk").await;

        replace_recipe(&store, dish, vec![RecipeComponent::new(eggs, d("3"))])
            .await
            .unwrap();
        replace_recipe(
            &store,
            dish,
            vec![RecipeComponent::new(milk, d("0.1")).with_notes("whole")],
        )
        .await
        .unwrap();

        let edges = store.recipe(dish).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].component_id, milk);
        assert_eq!(edges[0].notes.as_deref(), Some("whole"));
    }

    #[tokio::test]
    async fn rejects_transitive_cycle() {
        let store = InMemoryItemStore::new();
        let a = item(&store, "A").await;
        let b = item(&store, "B").await;
        let c = item(&store, "C").await;

        replace_recipe(&store, a, vec![RecipeComponent::new(b, d("1"))]).await.unwrap();
        replace_recipe(&store, b, vec![RecipeComponent::new(c, d("1"))]).await.unwrap();

        let err = replace_recipe(&store, c, vec![RecipeComponent::new(a, d("1"))])
            .await
            .unwrap_err();
        assert!(validation_message(err).contains("cycle"));
        assert!(store.recipe(c).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepts_diamond_shaped_graph() {
        let store = InMemoryItemStore::new();
        let dish = item(&store, "Plate").await;
        let sauce = item(&store, "Sauce").await;
        let garnish = item(&store, "Garnish").await;
        let butter = item(&store, "Butter").await;

        replace_recipe(&store, sauce, vec![RecipeComponent::new(butter, d("0.05"))]).await.unwrap();
        replace_recipe(&store, garnish, vec![RecipeComponent::new(butter, d("0.01"))]).await.unwrap();
        replace_recipe(
            &store,
            dish,
            vec![RecipeComponent::new(sauce, d("1")), RecipeComponent::new(garnish, d("1"))],
        )
        .await
        .unwrap();

        assert_eq!(store.recipe(dish).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_self_reference_zero_quantity_and_duplicates() {
        let store = InMemoryItemStore::new();
        let dish = item(&store, "Soup").await;
        let water = item(&store, "Water").await;

        let err = replace_recipe(&store, dish, vec![RecipeComponent::new(dish, d("1"))])
            .await
            .unwrap_err();
        assert!(validation_message(err).contains("itself"));

        let err = replace_recipe(&store, dish, vec![RecipeComponent::new(water, Decimal::ZERO)])
            .await
            .unwrap_err();
        assert!(validation_message(err).contains("quantity_per_portion"));

        let err = replace_recipe(
            &store,
            dish,
            vec![RecipeComponent::new(water, d("1")), RecipeComponent::new(water, d("2"))],
        )
        .await
        .unwrap_err();
        assert!(validation_message(err).contains("more than once"));
    }

    #[tokio::test]
    async fn unknown_component_is_not_found() {
        let store = InMemoryItemStore::new();
        let dish = item(&store, "Stew").await;

        let err = replace_recipe(&store, dish, vec![RecipeComponent::new(ItemId::new(), d("1"))])
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Domain(DomainError::NotFound(_))));
    }
}
