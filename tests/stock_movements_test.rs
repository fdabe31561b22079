mod common;

use assert_matches::assert_matches;
use central_stores::{
    entities::{stock_movement, user::Role},
    errors::ServiceError,
    ledger::ContractCall,
    notifications::NotificationKind,
    services::stock::{
        NewDamageReport, NewDelivery, NewRelocation, NewStock, QuantityUpdate, StockFilter,
        StockView,
    },
};
use common::{Staff, TestContext, DEAN_ADDRESS};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

async fn laptops(ctx: &TestContext, staff: &Staff, quantity: i32) -> StockView {
    ctx.state
        .stock
        .create_stock(
            &staff.stores_manager,
            NewStock {
                item_name: "Laptop".to_string(),
                category: Some("Electronics".to_string()),
                quantity,
                unit_cost: dec!(850.00),
                location: "Main Store".to_string(),
                low_stock_threshold: 3,
            },
        )
        .await
        .expect("create stock")
}

async fn movements(ctx: &TestContext, stock: &StockView) -> Vec<stock_movement::Model> {
    ctx.state.stock.list_movements(stock.stock.id).await.unwrap()
}

#[tokio::test]
async fn creation_records_an_initial_movement() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;

    let stock = laptops(&ctx, &staff, 10).await;

    assert_eq!(stock.stock.current_quantity, 10);
    assert_eq!(stock.stock.original_quantity, 10);
    assert!(stock.available);
    assert!(!stock.is_low_stock);
    assert_eq!(stock.total_value, dec!(8500.00));

    let history = movements(&ctx, &stock).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].movement_type, "IN");
    assert_eq!(history[0].quantity, 10);
    assert_eq!(history[0].previous_quantity, 0);
}

#[tokio::test]
async fn only_stock_roles_create_items() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;

    let err = ctx
        .state
        .stock
        .create_stock(
            &staff.dean,
            NewStock {
                item_name: "Projector".to_string(),
                category: None,
                quantity: 1,
                unit_cost: dec!(300),
                location: "Main Store".to_string(),
                low_stock_threshold: 0,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn damage_report_removes_units_and_logs_out_movement() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 10).await;

    let report = ctx
        .state
        .stock
        .record_damage(
            &staff.stores_manager,
            NewDamageReport {
                stock_id: stock.stock.id,
                quantity: 2,
                description: "Cracked screens".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(report.report_no, "DMG-0001");
    assert_eq!(report.stock.stock.current_quantity, 8);
    assert_eq!(
        ctx.state
            .stock
            .get_stock(stock.stock.id)
            .await
            .unwrap()
            .stock
            .current_quantity,
        8
    );

    let history = movements(&ctx, &stock).await;
    assert_eq!(history.len(), 2);
    let out: Vec<_> = history.iter().filter(|m| m.movement_type == "OUT").collect();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].quantity, -2);
    assert_eq!(out[0].previous_quantity, 10);
    assert_eq!(out[0].new_quantity, 8);
    assert_eq!(out[0].reference.as_deref(), Some("DMG-0001"));

    assert_eq!(ctx.notifier.of_kind(NotificationKind::DamageReported).len(), 2);
}

#[tokio::test]
async fn damage_beyond_stock_is_rejected_not_clamped() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 3).await;

    let err = ctx
        .state
        .stock
        .record_damage(
            &staff.stores_manager,
            NewDamageReport {
                stock_id: stock.stock.id,
                quantity: 4,
                description: "Water damage".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let after = ctx.state.stock.get_stock(stock.stock.id).await.unwrap();
    assert_eq!(after.stock.current_quantity, 3);
    assert_eq!(movements(&ctx, &stock).await.len(), 1);
}

#[tokio::test]
async fn quantity_never_goes_negative_across_a_sequence() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 5).await;
    let service = &ctx.state.stock;

    for quantity in [2, 2, 2] {
        let _ = service
            .record_damage(
                &staff.stores_manager,
                NewDamageReport {
                    stock_id: stock.stock.id,
                    quantity,
                    description: "Dropped".to_string(),
                },
            )
            .await;
    }

    let after = service.get_stock(stock.stock.id).await.unwrap();
    assert_eq!(after.stock.current_quantity, 1);
    assert!(!after.stock.current_quantity.is_negative());

    let err = service
        .set_quantity(
            &staff.stores_manager,
            stock.stock.id,
            QuantityUpdate {
                quantity: -1,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn set_quantity_picks_movement_kind_from_the_change() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 10).await;
    let service = &ctx.state.stock;

    let raised = service
        .set_quantity(
            &staff.stores_manager,
            stock.stock.id,
            QuantityUpdate {
                quantity: 14,
                reason: Some("Cycle count".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(raised.stock.current_quantity, 14);

    service
        .set_quantity(
            &staff.admin,
            stock.stock.id,
            QuantityUpdate {
                quantity: 9,
                reason: None,
            },
        )
        .await
        .unwrap();

    let history = movements(&ctx, &stock).await;
    let kinds: Vec<(&str, i32)> = history
        .iter()
        .map(|m| (m.movement_type.as_str(), m.quantity))
        .collect();
    assert!(kinds.contains(&("IN", 4)));
    assert!(kinds.contains(&("OUT", -5)));
    let deduction = history.iter().find(|m| m.quantity == -5).unwrap();
    assert_eq!(deduction.reason, "Stock deduction");

    let err = service
        .set_quantity(
            &staff.procurement,
            stock.stock.id,
            QuantityUpdate {
                quantity: 1,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn overdrawn_relocation_mutates_nothing() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 4).await;

    let err = ctx
        .state
        .stock
        .relocate(
            &staff.stores_manager,
            NewRelocation {
                stock_id: stock.stock.id,
                from_location: "Main Store".to_string(),
                to_location: "Annex B".to_string(),
                quantity: 5,
                reason: "Space".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let after = ctx.state.stock.get_stock(stock.stock.id).await.unwrap();
    assert_eq!(after.stock.location, "Main Store");
    assert_eq!(after.stock.current_quantity, 4);
    assert_eq!(movements(&ctx, &stock).await.len(), 1);
}

#[tokio::test]
async fn relocation_moves_the_item_and_logs_a_transfer() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 4).await;

    let relocation = ctx
        .state
        .stock
        .relocate(
            &staff.stores_manager,
            NewRelocation {
                stock_id: stock.stock.id,
                from_location: "Main Store".to_string(),
                to_location: "Annex B".to_string(),
                quantity: 4,
                reason: "Renovation".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(relocation.relocation_no, "REL-0001");
    assert!(relocation.completed);
    let after = ctx.state.stock.get_stock(stock.stock.id).await.unwrap();
    assert_eq!(after.stock.location, "Annex B");
    assert_eq!(after.stock.current_quantity, 4);

    let transfer = movements(&ctx, &stock)
        .await
        .into_iter()
        .find(|m| m.movement_type == "TRANSFER")
        .expect("transfer movement");
    assert_eq!(transfer.quantity, 0);
    assert_eq!(transfer.reference.as_deref(), Some("REL-0001"));
}

#[tokio::test]
async fn relocation_checks_the_source_location() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 4).await;
    let service = &ctx.state.stock;

    let err = service
        .relocate(
            &staff.stores_manager,
            NewRelocation {
                stock_id: stock.stock.id,
                from_location: "Annex A".to_string(),
                to_location: "Annex B".to_string(),
                quantity: 1,
                reason: "Space".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let err = service
        .relocate(
            &staff.stores_manager,
            NewRelocation {
                stock_id: stock.stock.id,
                from_location: "Main Store".to_string(),
                to_location: "Main Store".to_string(),
                quantity: 1,
                reason: "Space".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn deliveries_are_received_once() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 4).await;
    let service = &ctx.state.stock;

    let delivery = service
        .create_delivery(
            &staff.procurement,
            NewDelivery {
                stock_id: stock.stock.id,
                supplier: "Dell Direct".to_string(),
                quantity: 6,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(delivery.delivery_no, "DEL-0001");
    assert_eq!(delivery.status, "PENDING");

    let received = service
        .receive_delivery(&staff.stores_manager, delivery.id)
        .await
        .unwrap();
    assert_eq!(received.status, "RECEIVED");
    assert_eq!(received.received_by, Some(staff.stores_manager.id));
    assert_eq!(
        service.get_stock(stock.stock.id).await.unwrap().stock.current_quantity,
        10
    );

    let err = service
        .receive_delivery(&staff.stores_manager, delivery.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
    assert_eq!(
        service.get_stock(stock.stock.id).await.unwrap().stock.current_quantity,
        10
    );

    let to_procurement = ctx.notifier.for_user(staff.procurement.id);
    assert!(to_procurement
        .iter()
        .any(|n| n.kind == NotificationKind::DeliveryReceived));
}

#[tokio::test]
async fn deans_cannot_log_deliveries() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 4).await;

    let err = ctx
        .state
        .stock
        .create_delivery(
            &staff.dean,
            NewDelivery {
                stock_id: stock.stock.id,
                supplier: "Dell Direct".to_string(),
                quantity: 1,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn dropping_to_the_threshold_alerts_watchers() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 5).await;
    assert!(ctx.notifier.of_kind(NotificationKind::StockLow).is_empty());

    ctx.state
        .stock
        .record_damage(
            &staff.stores_manager,
            NewDamageReport {
                stock_id: stock.stock.id,
                quantity: 2,
                description: "Dropped".to_string(),
            },
        )
        .await
        .unwrap();

    let alerts = ctx.notifier.of_kind(NotificationKind::StockLow);
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|n| n.title == "Low Stock Alert - Laptop"));

    let low = ctx.state.stock.low_stock_items().await.unwrap();
    assert_eq!(low.len(), 1);
    assert!(low[0].is_low_stock);

    ctx.notifier.clear();
    assert_eq!(ctx.state.stock.check_low_stock().await.unwrap(), 1);
    assert_eq!(ctx.notifier.of_kind(NotificationKind::StockLow).len(), 2);
}

#[tokio::test]
async fn exhausted_items_are_not_low_stock() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 5).await;

    ctx.state
        .stock
        .set_quantity(
            &staff.stores_manager,
            stock.stock.id,
            QuantityUpdate {
                quantity: 0,
                reason: Some("Issued out".to_string()),
            },
        )
        .await
        .unwrap();

    assert!(ctx.state.stock.low_stock_items().await.unwrap().is_empty());
    ctx.notifier.clear();
    assert_eq!(ctx.state.stock.check_low_stock().await.unwrap(), 0);
    assert!(ctx.notifier.of_kind(NotificationKind::StockLow).is_empty());

    ctx.state
        .stock
        .set_quantity(
            &staff.stores_manager,
            stock.stock.id,
            QuantityUpdate {
                quantity: 1,
                reason: Some("Returned".to_string()),
            },
        )
        .await
        .unwrap();
    let low = ctx.state.stock.low_stock_items().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].stock.current_quantity, 1);
}

#[tokio::test]
async fn stock_changes_are_mirrored_to_the_ledger() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let mut manager = ctx
        .user("chain_manager", Role::StoresManager, None)
        .await;
    manager.blockchain_address = Some(DEAN_ADDRESS.to_string());
    let stock = laptops(&ctx, &staff, 10).await;

    ctx.state
        .stock
        .record_damage(
            &manager,
            NewDamageReport {
                stock_id: stock.stock.id,
                quantity: 2,
                description: "Cracked".to_string(),
            },
        )
        .await
        .unwrap();

    let submitted = ctx.ledger.wait_for_submissions(1).await;
    assert_eq!(submitted.len(), 1);
    let (call, sender) = &submitted[0];
    assert_matches!(
        call,
        ContractCall::AdjustStock { item_name, delta: -2, .. } if item_name == "Laptop"
    );
    assert_eq!(sender, DEAN_ADDRESS);
}

#[tokio::test]
async fn relocations_are_mirrored_to_the_ledger() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let mut manager = ctx
        .user("chain_manager", Role::StoresManager, None)
        .await;
    manager.blockchain_address = Some(DEAN_ADDRESS.to_string());
    let stock = laptops(&ctx, &staff, 10).await;

    let relocation = ctx
        .state
        .stock
        .relocate(
            &manager,
            NewRelocation {
                stock_id: stock.stock.id,
                from_location: "Main Store".to_string(),
                to_location: "Annex B".to_string(),
                quantity: 4,
                reason: "Renovation".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(relocation.relocation_no, "REL-0001");

    let submitted = ctx.ledger.wait_for_submissions(1).await;
    assert_eq!(submitted.len(), 1);
    let (call, sender) = &submitted[0];
    assert_matches!(
        call,
        ContractCall::AdjustStock { item_name, delta: 0, reason }
            if item_name == "Laptop" && reason.contains("Main Store") && reason.contains("Annex B")
    );
    assert_eq!(sender, DEAN_ADDRESS);
}

#[tokio::test]
async fn ledger_outage_does_not_block_stock_changes() {
    let ctx = TestContext::with_ledger(common::FakeLedger::unconfigured()).await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 10).await;

    let report = ctx
        .state
        .stock
        .record_damage(
            &staff.stores_manager,
            NewDamageReport {
                stock_id: stock.stock.id,
                quantity: 1,
                description: "Scratched".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.stock.stock.current_quantity, 9);
    assert!(ctx.ledger.submitted().is_empty());
}

async fn stocked(
    ctx: &TestContext,
    staff: &Staff,
    item_name: &str,
    category: Option<&str>,
    location: &str,
) -> StockView {
    ctx.state
        .stock
        .create_stock(
            &staff.stores_manager,
            NewStock {
                item_name: item_name.to_string(),
                category: category.map(str::to_string),
                quantity: 10,
                unit_cost: dec!(20),
                location: location.to_string(),
                low_stock_threshold: 2,
            },
        )
        .await
        .unwrap()
}

fn names(items: &[StockView]) -> Vec<&str> {
    items.iter().map(|s| s.stock.item_name.as_str()).collect()
}

#[tokio::test]
async fn stock_list_filters_by_category_and_location() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    stocked(&ctx, &staff, "Projector", Some("Electronics"), "Annex B").await;
    stocked(&ctx, &staff, "Laptop", Some("Electronics"), "Main Store").await;
    stocked(&ctx, &staff, "Printer Paper", Some("Stationery"), "Main Store").await;
    stocked(&ctx, &staff, "Mop", None, "Main Store").await;

    let all = ctx.state.stock.list_stocks(StockFilter::default()).await.unwrap();
    assert_eq!(names(&all), vec!["Laptop", "Mop", "Printer Paper", "Projector"]);

    let electronics = ctx
        .state
        .stock
        .list_stocks(StockFilter {
            category: Some("electronics".to_string()),
            location: None,
        })
        .await
        .unwrap();
    assert_eq!(names(&electronics), vec!["Laptop", "Projector"]);

    let main_electronics = ctx
        .state
        .stock
        .list_stocks(StockFilter {
            category: Some("Electronics".to_string()),
            location: Some("MAIN STORE".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(names(&main_electronics), vec!["Laptop"]);

    let unknown = ctx
        .state
        .stock
        .list_stocks(StockFilter {
            category: Some("Furniture".to_string()),
            location: None,
        })
        .await
        .unwrap();
    assert!(unknown.is_empty());

    let categories: Vec<String> = ctx
        .state
        .stock
        .categories()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(categories, vec!["Electronics", "Stationery"]);
}

#[tokio::test]
async fn deleting_stock_removes_its_history() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let stock = laptops(&ctx, &staff, 10).await;
    ctx.state
        .stock
        .record_damage(
            &staff.stores_manager,
            NewDamageReport {
                stock_id: stock.stock.id,
                quantity: 1,
                description: "Cracked".to_string(),
            },
        )
        .await
        .unwrap();

    let err = ctx
        .state
        .stock
        .delete_stock(&staff.dean, stock.stock.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    ctx.state
        .stock
        .delete_stock(&staff.admin, stock.stock.id)
        .await
        .unwrap();

    assert_matches!(
        ctx.state.stock.get_stock(stock.stock.id).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        ctx.state.stock.list_movements(stock.stock.id).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        ctx.state.stock.delete_stock(&staff.admin, stock.stock.id).await,
        Err(ServiceError::NotFound(_))
    );
    let leftover = stock_movement::Entity::find()
        .filter(stock_movement::Column::StockId.eq(stock.stock.id))
        .count(ctx.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(leftover, 0);
}
