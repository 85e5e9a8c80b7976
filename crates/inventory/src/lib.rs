//! Items, recipes and ingredient stock.
//!
//! Composite items (dishes, sub-recipes) own a recipe: a list of weighted
//! edges to other items. [`BomResolver`] walks that graph to answer "can we
//! make N portions" and to move leaf stock when dishes are cooked.

pub mod bom;
pub mod error;
pub mod item;
pub mod recipe;
pub mod store;

pub use bom::{AvailabilityReport, BomResolver, IngredientRequirement, RecipeCost, RecipeLine};
pub use error::{InventoryError, InventoryResult};
pub use item::{Item, RecipeComponent, RecipeEdge, StockChange};
pub use recipe::replace_recipe;
pub use store::{InMemoryItemStore, ItemStore, StoreError, merge_changes};
