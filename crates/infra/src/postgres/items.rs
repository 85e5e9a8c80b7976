use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use hotelpos_core::{ItemId, Shortfall};
use hotelpos_inventory::{Item, ItemStore, RecipeEdge, StockChange, StoreError, merge_changes};

use super::describe_sqlx_error;

/// Item and recipe storage in Postgres.
///
/// Stock batches run in one transaction. Each decrement is a conditional
/// `UPDATE .. WHERE amount + delta >= 0`, so a concurrent consumer can never
/// push stock below zero; any failed row rolls the whole batch back.
#[derive(Debug, Clone)]
pub struct PostgresItemStore {
    pool: Arc<PgPool>,
}

impl PostgresItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn backend(operation: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Backend(describe_sqlx_error(operation, e))
}

struct ItemRow {
    id: Uuid,
    name: String,
    unit: String,
    amount: Decimal,
    price_buy: Decimal,
    price_sale: Decimal,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            unit: row.try_get("unit")?,
            amount: row.try_get("amount")?,
            price_buy: row.try_get("price_buy")?,
            price_sale: row.try_get("price_sale")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: ItemId::from_uuid(row.id),
            name: row.name,
            unit: row.unit,
            amount: row.amount,
            price_buy: row.price_buy,
            price_sale: row.price_sale,
            deleted_at: row.deleted_at,
        }
    }
}

const ITEM_COLUMNS: &str = "id, name, unit, amount, price_buy, price_sale, deleted_at";

#[async_trait]
impl ItemStore for PostgresItemStore {
    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend("get_item"))?;
        Ok(row.map(Item::from))
    }

    async fn get_many(&self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ANY($1)"
        ))
        .bind(uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(backend("get_items"))?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn save(&self, item: Item) -> Result<(), StoreError> {
        item.validate().map_err(StoreError::InvalidItem)?;
        sqlx::query(
            r#"
            INSERT INTO items (id, name, unit, amount, price_buy, price_sale, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                unit = EXCLUDED.unit,
                amount = EXCLUDED.amount,
                price_buy = EXCLUDED.price_buy,
                price_sale = EXCLUDED.price_sale,
                deleted_at = EXCLUDED.deleted_at
            "#,
        )
        .bind(*item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.unit)
        .bind(item.amount)
        .bind(item.price_buy)
        .bind(item.price_sale)
        .bind(item.deleted_at)
        .execute(&*self.pool)
        .await
        .map_err(backend("save_item"))?;
        Ok(())
    }

    async fn list_live(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(backend("list_live_items"))?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn recipe(&self, composite_id: ItemId) -> Result<Vec<RecipeEdge>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT component_id, quantity_per_portion, notes
            FROM recipe_edges
            WHERE composite_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(*composite_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(backend("load_recipe"))?;

        rows.iter()
            .map(|row| -> Result<RecipeEdge, sqlx::Error> {
                Ok(RecipeEdge {
                    composite_id,
                    component_id: ItemId::from_uuid(row.try_get("component_id")?),
                    quantity_per_portion: row.try_get("quantity_per_portion")?,
                    notes: row.try_get("notes")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(backend("decode_recipe"))
    }

    #[instrument(skip(self, edges), fields(item_id = %composite_id, edges = edges.len()), err)]
    async fn replace_recipe(
        &self,
        composite_id: ItemId,
        edges: Vec<RecipeEdge>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend("begin_transaction"))?;

        let exists = sqlx::query("SELECT 1 FROM items WHERE id = $1 FOR UPDATE")
            .bind(*composite_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend("lock_composite"))?
            .is_some();
        if !exists {
            tx.rollback().await.map_err(backend("rollback"))?;
            return Err(StoreError::MissingItem(composite_id));
        }

        sqlx::query("DELETE FROM recipe_edges WHERE composite_id = $1")
            .bind(*composite_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend("delete_recipe"))?;

        for (position, edge) in edges.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO recipe_edges (composite_id, component_id, quantity_per_portion, notes, position)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(*composite_id.as_uuid())
            .bind(*edge.component_id.as_uuid())
            .bind(edge.quantity_per_portion)
            .bind(edge.notes.as_deref())
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .map_err(backend("insert_recipe_edge"))?;
        }

        tx.commit().await.map_err(backend("commit_transaction"))?;
        Ok(())
    }

    #[instrument(skip(self, changes), fields(changes = changes.len()), err)]
    async fn apply_stock_batch(&self, changes: &[StockChange]) -> Result<(), StoreError> {
        let mut changes = merge_changes(changes);
        // Fixed lock order across concurrent batches.
        changes.sort_by_key(|c| c.item_id);

        let mut tx = self.pool.begin().await.map_err(backend("begin_transaction"))?;
        let mut conflicts = Vec::new();

        for change in &changes {
            let updated = sqlx::query(
                r#"
                UPDATE items
                SET amount = amount + $2
                WHERE id = $1 AND amount + $2 >= 0
                RETURNING amount
                "#,
            )
            .bind(*change.item_id.as_uuid())
            .bind(change.delta)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend("apply_stock_change"))?;

            if updated.is_none() {
                match current_stock(&mut tx, change.item_id).await? {
                    Some((name, unit, amount)) => {
                        conflicts.push(Shortfall::new(change.item_id, name, unit, -change.delta, amount));
                    }
                    None => {
                        tx.rollback().await.map_err(backend("rollback"))?;
                        return Err(StoreError::MissingItem(change.item_id));
                    }
                }
            }
        }

        if !conflicts.is_empty() {
            tx.rollback().await.map_err(backend("rollback"))?;
            return Err(StoreError::StockConflict(conflicts));
        }

        tx.commit().await.map_err(backend("commit_transaction"))?;
        Ok(())
    }
}

async fn current_stock(
    tx: &mut Transaction<'_, Postgres>,
    item_id: ItemId,
) -> Result<Option<(String, String, Decimal)>, StoreError> {
    let row = sqlx::query("SELECT name, unit, amount FROM items WHERE id = $1")
        .bind(*item_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend("read_stock"))?;

    row.map(|r| -> Result<(String, String, Decimal), sqlx::Error> {
        Ok((r.try_get("name")?, r.try_get("unit")?, r.try_get("amount")?))
    })
    .transpose()
    .map_err(backend("decode_stock"))
}
