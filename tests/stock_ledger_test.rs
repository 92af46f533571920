mod common;

use assert_matches::assert_matches;
use common::TestApp;
use sea_orm::{ActiveModelTrait, Set};
use sitestock_api::{
    entities::{
        item::{self, ItemKind, SupplyChannel},
        AdjustmentKind, Partition,
    },
    errors::ServiceError,
    services::{
        items::NewItem,
        stock::{AdjustStock, StockReference},
    },
};

#[tokio::test]
async fn general_pool_falls_back_to_opening_balance() {
    let app = TestApp::new().await;
    let cement = app.material("CEM-42", 25).await;

    assert_eq!(app.balance(cement.id, None).await, 25);
    assert_eq!(app.balance(cement.id, Some(3)).await, 0);
    assert_eq!(app.balance(9_999, None).await, 0);
}

#[tokio::test]
async fn in_and_out_write_snapshots_and_refresh_the_cache() {
    let app = TestApp::new().await;
    let rebar = app.material("REBAR-12", 10).await;
    let stock = &app.services().stock;

    let received = stock
        .adjust(
            AdjustStock::new(rebar.id, 5, AdjustmentKind::In)
                .with_reference(StockReference::new("purchase", 77))
                .with_note("delivery from yard"),
        )
        .await
        .unwrap();
    assert_eq!(received.previous_balance, 10);
    assert_eq!(received.entry.resulting_balance, 15);
    assert_eq!(received.entry.reference_type.as_deref(), Some("purchase"));
    assert_eq!(received.entry.reference_id.as_deref(), Some("77"));
    assert_eq!(received.entry.partition, Partition::Material);

    let issued = stock
        .adjust(AdjustStock::new(rebar.id, 4, AdjustmentKind::Out))
        .await
        .unwrap();
    assert_eq!(issued.entry.resulting_balance, 11);
    assert_eq!(app.cached_balance(rebar.id).await, 11);
}

#[tokio::test]
async fn out_below_zero_is_rejected_without_writing() {
    let app = TestApp::new().await;
    let sand = app.material("SAND", 3).await;

    let err = app
        .services()
        .stock
        .adjust(AdjustStock::new(sand.id, 4, AdjustmentKind::Out))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(ref shortages) if shortages.len() == 1
        && shortages[0].available == 3
        && shortages[0].requested == 4);

    let history = app.services().stock.history(sand.id, None, 10).await.unwrap();
    assert!(history.is_empty());
    assert_eq!(app.cached_balance(sand.id).await, 3);
}

#[tokio::test]
async fn adjustment_sets_the_balance_verbatim() {
    let app = TestApp::new().await;
    let bricks = app.material("BRICK", 0).await;
    app.stock_in(bricks.id, 100, None).await;

    let counted = app
        .services()
        .stock
        .adjust(AdjustStock::new(bricks.id, 42, AdjustmentKind::Adjustment))
        .await
        .unwrap();
    assert_eq!(counted.previous_balance, 100);
    assert_eq!(counted.entry.resulting_balance, 42);
    assert_eq!(app.balance(bricks.id, None).await, 42);
}

#[tokio::test]
async fn non_positive_quantities_and_unknown_items_fail() {
    let app = TestApp::new().await;
    let pipe = app.material("PIPE", 1).await;
    let stock = &app.services().stock;

    assert_matches!(
        stock.adjust(AdjustStock::new(pipe.id, 0, AdjustmentKind::In)).await,
        Err(ServiceError::InvalidQuantity(0))
    );
    assert_matches!(
        stock.adjust(AdjustStock::new(pipe.id, -2, AdjustmentKind::Out)).await,
        Err(ServiceError::InvalidQuantity(-2))
    );
    assert_matches!(
        stock.adjust(AdjustStock::new(4_242, 1, AdjustmentKind::In)).await,
        Err(ServiceError::ItemNotFound(4_242))
    );
}

#[tokio::test]
async fn balance_overflow_is_rejected_without_writing() {
    let app = TestApp::new().await;
    let nails = app.material("NAIL", 5).await;
    let stock = &app.services().stock;

    assert_matches!(
        stock
            .adjust(AdjustStock::new(nails.id, i64::MAX, AdjustmentKind::In))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert!(stock.history(nails.id, None, 10).await.unwrap().is_empty());
    assert_eq!(app.balance(nails.id, None).await, 5);
    assert_eq!(app.cached_balance(nails.id).await, 5);
}

#[tokio::test]
async fn site_pools_are_independent_of_the_general_cache() {
    let app = TestApp::new().await;
    let tiles = app.material("TILE", 8).await;

    app.stock_in(tiles.id, 5, Some(1)).await;
    app.stock_in(tiles.id, 2, Some(2)).await;

    assert_eq!(app.balance(tiles.id, Some(1)).await, 5);
    assert_eq!(app.balance(tiles.id, Some(2)).await, 2);
    assert_eq!(app.balance(tiles.id, None).await, 8);
    assert_eq!(app.cached_balance(tiles.id).await, 8);
    assert_eq!(app.services().stock.available(tiles.id, Some(1)).await.unwrap(), 13);
}

#[tokio::test]
async fn partition_wrappers_reject_the_wrong_kind() {
    let app = TestApp::new().await;
    let gravel = app.material("GRAVEL", 10).await;
    let door = app.product("DOOR", SupplyChannel::Warehouse, 2).await;
    let hybrid = app
        .item("PANEL", ItemKind::Hybrid, SupplyChannel::Warehouse, 6)
        .await;
    let stock = &app.services().stock;

    assert_matches!(
        stock
            .adjust_for_product(AdjustStock::new(gravel.id, 1, AdjustmentKind::Out))
            .await,
        Err(ServiceError::PartitionMismatch { .. })
    );
    assert_matches!(
        stock
            .adjust_for_material(AdjustStock::new(door.id, 1, AdjustmentKind::Out))
            .await,
        Err(ServiceError::PartitionMismatch { .. })
    );

    let written = stock
        .adjust_for_material(AdjustStock::new(hybrid.id, 1, AdjustmentKind::Out))
        .await
        .unwrap();
    assert_eq!(written.entry.partition, Partition::Product);
    assert_eq!(written.entry.resulting_balance, 5);

    assert_eq!(
        stock
            .current_balance(door.id, None, Some(Partition::Material))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn reclassified_item_cannot_continue_the_old_partition() {
    let app = TestApp::new().await;
    let beam = app.material("BEAM", 4).await;
    app.stock_in(beam.id, 2, None).await;

    let mut reclassified: item::ActiveModel = beam.clone().into();
    reclassified.kind = Set(ItemKind::Product);
    reclassified.update(app.state.db.as_ref()).await.unwrap();

    let err = app
        .services()
        .stock
        .adjust(AdjustStock::new(beam.id, 1, AdjustmentKind::In))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::PartitionMismatch { item_id, ref expected, ref found }
            if item_id == beam.id && expected == "product" && found == "material"
    );

    let history = app.services().stock.history(beam.id, None, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(app.balance(beam.id, None).await, 6);
}

#[tokio::test]
async fn partition_checks_can_be_disabled() {
    let app = TestApp::with_config(|cfg| cfg.stock.enforce_partition = false).await;
    let gravel = app.material("GRAVEL", 10).await;

    let written = app
        .services()
        .stock
        .adjust_for_product(AdjustStock::new(gravel.id, 1, AdjustmentKind::Out))
        .await
        .unwrap();
    assert_eq!(written.entry.partition, Partition::Material);
}

#[tokio::test]
async fn voiding_falls_back_to_the_previous_snapshot() {
    let app = TestApp::new().await;
    let lumber = app.material("LUMBER", 0).await;
    app.stock_in(lumber.id, 10, None).await;
    let mistake = app
        .services()
        .stock
        .adjust(AdjustStock::new(lumber.id, 90, AdjustmentKind::In))
        .await
        .unwrap();
    assert_eq!(app.cached_balance(lumber.id).await, 100);

    let voided = app
        .services()
        .stock
        .void_entry(mistake.entry.id)
        .await
        .unwrap();
    assert!(!voided.active);
    assert_eq!(app.balance(lumber.id, None).await, 10);
    assert_eq!(app.cached_balance(lumber.id).await, 10);

    // Second void is a no-op
    let again = app.services().stock.void_entry(mistake.entry.id).await.unwrap();
    assert!(!again.active);

    let history = app.services().stock.history(lumber.id, None, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].active);
}

#[tokio::test]
async fn low_stock_threshold_is_reported_on_general_writes() {
    let app = TestApp::new().await;
    let nails = app
        .services()
        .items
        .create_item(NewItem {
            sku: "NAIL".into(),
            name: "Nails".into(),
            kind: ItemKind::Material,
            channel: SupplyChannel::Hardware,
            opening_balance: 20,
            low_stock_threshold: Some(5),
        })
        .await
        .unwrap();

    let above = app
        .services()
        .stock
        .adjust(AdjustStock::new(nails.id, 10, AdjustmentKind::Out))
        .await
        .unwrap();
    assert_eq!(above.low_stock_threshold, None);

    let below = app
        .services()
        .stock
        .adjust(AdjustStock::new(nails.id, 6, AdjustmentKind::Out))
        .await
        .unwrap();
    assert_eq!(below.low_stock_threshold, Some(5));
    assert_eq!(below.events().len(), 2);
}
