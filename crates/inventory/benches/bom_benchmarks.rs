use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use hotelpos_core::ItemId;
use hotelpos_inventory::{
    BomResolver, InMemoryItemStore, Item, ItemStore, RecipeComponent, replace_recipe,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Builds a chain of `depth` sub-recipes, each level using `width` fresh
/// leaves plus the level below it.
async fn layered_menu(store: &InMemoryItemStore, depth: usize, width: usize) -> ItemId {
    let mut below: Option<ItemId> = None;
    for level in 0..depth {
        let mut components = Vec::with_capacity(width + 1);
        for n in 0..width {
            let leaf = Item::new(format!("leaf-{level}-{n}"), "kg").with_stock(Decimal::from(1_000_000));
            components.push(RecipeComponent::new(leaf.id, Decimal::new(125, 3)));
            store.save(leaf).await.unwrap();
        }
        if let Some(sub) = below {
            components.push(RecipeComponent::new(sub, Decimal::ONE));
        }

        let dish = Item::new(format!("level-{level}"), "pc");
        let id = dish.id;
        store.save(dish).await.unwrap();
        replace_recipe(store, id, components).await.unwrap();
        below = Some(id);
    }
    below.unwrap()
}

fn bench_check_availability(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("check_availability");

    for depth in [1usize, 4, 8] {
        let store = Arc::new(InMemoryItemStore::new());
        let dish = rt.block_on(layered_menu(&store, depth, 6));
        let bom = BomResolver::new(store);

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let report = rt
                    .block_on(bom.check_availability(dish, black_box(Decimal::TWO)))
                    .unwrap();
                black_box(report.can_prepare)
            })
        });
    }

    group.finish();
}

fn bench_consume_restore(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = Arc::new(InMemoryItemStore::new());
    let dish = rt.block_on(layered_menu(&store, 4, 6));
    let bom = BomResolver::new(store);

    c.bench_function("consume_then_restore_depth_4", |b| {
        b.iter(|| {
            rt.block_on(async {
                bom.consume_ingredients(dish, Decimal::ONE).await.unwrap();
                bom.restore_ingredients(dish, Decimal::ONE).await.unwrap();
            })
        })
    });
}

criterion_group!(benches, bench_check_availability, bench_consume_restore);
criterion_main!(benches);
