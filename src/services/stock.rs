//! Inventory operations.
//!
//! Every quantity change writes one stock movement in the same transaction
//! and mirrors an `adjustStock` call to the ledger afterwards.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::flatten_txn_error;
use crate::entities::delivery::{self, DeliveryStatus};
use crate::entities::stock_movement::{self, MovementKind};
use crate::entities::user::{self, Role};
use crate::entities::{category, damage_report, relocation, stock};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::{ContractCall, LedgerEmitter};
use crate::notifications::{
    NewNotification, NotificationDispatcher, NotificationKind, NotificationPriority, RelatedObject,
};
use crate::services::{not_blank, sequence};

/// Roles told about low stock and damage
const STOCK_WATCHERS: [Role; 2] = [Role::StoresManager, Role::Admin];

fn non_negative_cost(cost: &Decimal) -> Result<(), ValidationError> {
    if cost.is_sign_negative() {
        return Err(ValidationError::new("negative_cost"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewStock {
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub item_name: String,
    pub category: Option<String>,
    #[validate(range(min = 0))]
    pub quantity: i32,
    #[validate(custom = "non_negative_cost")]
    pub unit_cost: Decimal,
    #[validate(custom = "not_blank")]
    pub location: String,
    #[validate(range(min = 0))]
    pub low_stock_threshold: i32,
}

/// Optional filters for `list_stocks`, matched case-insensitively
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockFilter {
    pub category: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuantityUpdate {
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewDamageReport {
    pub stock_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom = "not_blank")]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRelocation {
    pub stock_id: Uuid,
    #[validate(custom = "not_blank")]
    pub from_location: String,
    #[validate(custom = "not_blank")]
    pub to_location: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom = "not_blank")]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewDelivery {
    pub stock_id: Uuid,
    #[validate(custom = "not_blank")]
    pub supplier: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub notes: Option<String>,
}

/// A stock row with its derived flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockView {
    #[serde(flatten)]
    pub stock: stock::Model,
    pub available: bool,
    pub is_low_stock: bool,
    pub total_value: Decimal,
}

impl From<stock::Model> for StockView {
    fn from(stock: stock::Model) -> Self {
        Self {
            available: stock.available(),
            is_low_stock: stock.is_low_stock(),
            total_value: stock.total_value(),
            stock,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageReportView {
    pub id: Uuid,
    pub report_no: String,
    pub stock_id: Uuid,
    pub quantity: i32,
    pub description: String,
    pub reported_by: Uuid,
    pub stock: StockView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocationView {
    pub id: Uuid,
    pub relocation_no: String,
    pub stock_id: Uuid,
    pub from_location: String,
    pub to_location: String,
    pub quantity: i32,
    pub reason: String,
    pub completed: bool,
}

impl From<relocation::Model> for RelocationView {
    fn from(model: relocation::Model) -> Self {
        Self {
            relocation_no: model.display_id(),
            id: model.id,
            stock_id: model.stock_id,
            from_location: model.from_location,
            to_location: model.to_location,
            quantity: model.quantity,
            reason: model.reason,
            completed: model.completed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryView {
    pub id: Uuid,
    pub delivery_no: String,
    pub stock_id: Uuid,
    pub supplier: String,
    pub quantity: i32,
    pub status: String,
    pub notes: Option<String>,
    pub received_by: Option<Uuid>,
    pub received_at: Option<chrono::DateTime<Utc>>,
}

impl From<delivery::Model> for DeliveryView {
    fn from(model: delivery::Model) -> Self {
        Self {
            delivery_no: model.display_id(),
            id: model.id,
            stock_id: model.stock_id,
            supplier: model.supplier,
            quantity: model.quantity,
            status: model.status,
            notes: model.notes,
            received_by: model.received_by,
            received_at: model.received_at,
        }
    }
}

fn require_any_role(actor: &user::Model, roles: &[Role], action: &str) -> Result<(), ServiceError> {
    match actor.role() {
        Some(role) if roles.contains(&role) => Ok(()),
        _ => Err(ServiceError::Forbidden(format!(
            "Role {} may not {}",
            actor.role, action
        ))),
    }
}

async fn find_stock<C: ConnectionTrait>(conn: &C, stock_id: Uuid) -> Result<stock::Model, ServiceError> {
    stock::Entity::find_by_id(stock_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Stock {} not found", stock_id)))
}

/// Applies `delta` to the stock row, refusing to go below zero.
///
/// The bound is part of the UPDATE's WHERE clause, so a concurrent decrement
/// cannot slip between check and write.
async fn apply_delta<C: ConnectionTrait>(
    conn: &C,
    stock_id: Uuid,
    delta: i32,
) -> Result<stock::Model, ServiceError> {
    let mut update = stock::Entity::update_many()
        .col_expr(
            stock::Column::CurrentQuantity,
            Expr::col(stock::Column::CurrentQuantity).add(delta),
        )
        .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock::Column::Id.eq(stock_id));
    if delta < 0 {
        update = update.filter(stock::Column::CurrentQuantity.gte(-delta));
    }

    if update.exec(conn).await?.rows_affected == 0 {
        let current = find_stock(conn, stock_id).await?;
        return Err(ServiceError::InsufficientStock(format!(
            "{} has {} units, cannot remove {}",
            current.item_name, current.current_quantity, -delta
        )));
    }
    find_stock(conn, stock_id).await
}

#[allow(clippy::too_many_arguments)]
async fn record_movement<C: ConnectionTrait>(
    conn: &C,
    stock_id: Uuid,
    kind: MovementKind,
    delta: i32,
    previous_quantity: i32,
    new_quantity: i32,
    reason: &str,
    reference: Option<String>,
    performed_by: Option<Uuid>,
) -> Result<stock_movement::Model, ServiceError> {
    Ok(stock_movement::ActiveModel {
        stock_id: Set(stock_id),
        movement_type: Set(kind.to_string()),
        quantity: Set(delta),
        previous_quantity: Set(previous_quantity),
        new_quantity: Set(new_quantity),
        reason: Set(reason.to_string()),
        reference: Set(reference),
        performed_by: Set(performed_by),
        ..Default::default()
    }
    .insert(conn)
    .await?)
}

async fn find_or_create_category<C: ConnectionTrait>(
    conn: &C,
    name: &str,
) -> Result<category::Model, ServiceError> {
    if let Some(existing) = category::Entity::find()
        .filter(category::Column::Name.eq(name))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }
    Ok(category::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        ..Default::default()
    }
    .insert(conn)
    .await?)
}

/// Stock items and everything that moves them.
#[derive(Clone)]
pub struct StockService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    ledger: LedgerEmitter,
    notifications: NotificationDispatcher,
}

impl StockService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        ledger: LedgerEmitter,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            db,
            event_sender,
            ledger,
            notifications,
        }
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.id, item = %input.item_name))]
    pub async fn create_stock(
        &self,
        actor: &user::Model,
        input: NewStock,
    ) -> Result<StockView, ServiceError> {
        require_any_role(actor, &STOCK_WATCHERS, "create stock items")?;
        input.validate()?;

        let actor_id = actor.id;
        const REASON: &str = "Initial stock creation";
        let created = self
            .db
            .transaction::<_, stock::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let category_id = match input.category.as_deref().map(str::trim) {
                        Some(name) if !name.is_empty() => {
                            Some(find_or_create_category(txn, name).await?.id)
                        }
                        _ => None,
                    };

                    let created = stock::ActiveModel {
                        item_name: Set(input.item_name.trim().to_string()),
                        category_id: Set(category_id),
                        original_quantity: Set(input.quantity),
                        current_quantity: Set(input.quantity),
                        unit_cost: Set(input.unit_cost),
                        location: Set(input.location.trim().to_string()),
                        low_stock_threshold: Set(input.low_stock_threshold),
                        created_by: Set(Some(actor_id)),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    record_movement(
                        txn,
                        created.id,
                        MovementKind::In,
                        input.quantity,
                        0,
                        input.quantity,
                        REASON,
                        None,
                        Some(actor_id),
                    )
                    .await?;
                    Ok(created)
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(stock_id = %created.id, quantity = created.current_quantity, "stock item created");
        self.after_movement(actor, &created, MovementKind::In, created.current_quantity, REASON)
            .await;
        Ok(created.into())
    }

    pub async fn get_stock(&self, stock_id: Uuid) -> Result<StockView, ServiceError> {
        Ok(find_stock(self.db.as_ref(), stock_id).await?.into())
    }

    /// Sets the absolute quantity. The movement kind follows the sign of the change.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id))]
    pub async fn set_quantity(
        &self,
        actor: &user::Model,
        stock_id: Uuid,
        input: QuantityUpdate,
    ) -> Result<StockView, ServiceError> {
        require_any_role(actor, &STOCK_WATCHERS, "adjust stock")?;
        input.validate()?;

        let actor_id = actor.id;
        let target = input.quantity;
        let (updated, kind, delta, reason) = self
            .db
            .transaction::<_, (stock::Model, MovementKind, i32, String), ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = find_stock(txn, stock_id).await?;
                    let delta = target - current.current_quantity;
                    let (kind, default_reason) = match delta {
                        d if d > 0 => (MovementKind::In, "Stock addition"),
                        d if d < 0 => (MovementKind::Out, "Stock deduction"),
                        _ => (MovementKind::Adjustment, "Manual stock adjustment"),
                    };
                    let reason = input
                        .reason
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or_else(|| default_reason.to_string());

                    let result = stock::Entity::update_many()
                        .col_expr(stock::Column::CurrentQuantity, Expr::value(target))
                        .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(stock::Column::Id.eq(stock_id))
                        .filter(stock::Column::CurrentQuantity.eq(current.current_quantity))
                        .exec(txn)
                        .await?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::Conflict(format!(
                            "{} changed while it was being adjusted",
                            current.item_name
                        )));
                    }

                    record_movement(
                        txn,
                        stock_id,
                        kind,
                        delta,
                        current.current_quantity,
                        target,
                        &reason,
                        None,
                        Some(actor_id),
                    )
                    .await?;
                    Ok((find_stock(txn, stock_id).await?, kind, delta, reason))
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        self.after_movement(actor, &updated, kind, delta, &reason).await;
        Ok(updated.into())
    }

    /// Records damaged units and removes them from stock.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id, stock_id = %input.stock_id))]
    pub async fn record_damage(
        &self,
        actor: &user::Model,
        input: NewDamageReport,
    ) -> Result<DamageReportView, ServiceError> {
        input.validate()?;

        let actor_id = actor.id;
        let quantity = input.quantity;
        let (report, updated) = self
            .db
            .transaction::<_, (damage_report::Model, stock::Model), ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = find_stock(txn, input.stock_id).await?;
                    if quantity > current.current_quantity {
                        return Err(ServiceError::InsufficientStock(format!(
                            "Damaged quantity {} exceeds the {} units of {} in stock",
                            quantity, current.current_quantity, current.item_name
                        )));
                    }

                    let updated = apply_delta(txn, input.stock_id, -quantity).await?;
                    let report_no = sequence::next_value(txn, sequence::DAMAGE_REPORT).await?;
                    let report = damage_report::ActiveModel {
                        report_no: Set(report_no),
                        stock_id: Set(input.stock_id),
                        quantity: Set(quantity),
                        description: Set(input.description.trim().to_string()),
                        reported_by: Set(actor_id),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    record_movement(
                        txn,
                        input.stock_id,
                        MovementKind::Out,
                        -quantity,
                        updated.current_quantity + quantity,
                        updated.current_quantity,
                        &format!("Damage: {}", report.description),
                        Some(report.display_id()),
                        Some(actor_id),
                    )
                    .await?;
                    Ok((report, updated))
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        let display_id = report.display_id();
        info!(report = %display_id, quantity, "damage reported");

        self.event_sender.publish(Event::DamageReported {
            report_id: report.id,
            stock_id: updated.id,
            quantity,
        });
        self.notifications
            .send_to_roles(
                &STOCK_WATCHERS,
                NotificationKind::DamageReported,
                &format!("Damage Reported - {}", display_id),
                &format!(
                    "Damage reported for {}: {}",
                    updated.item_name, report.description
                ),
                NotificationPriority::High,
                Some(RelatedObject::new("damage_report", display_id.clone())),
            )
            .await;
        self.after_movement(
            actor,
            &updated,
            MovementKind::Out,
            -quantity,
            &format!("Damage: {}", report.description),
        )
        .await;

        Ok(DamageReportView {
            id: report.id,
            report_no: display_id,
            stock_id: report.stock_id,
            quantity: report.quantity,
            description: report.description,
            reported_by: report.reported_by,
            stock: updated.into(),
        })
    }

    /// Moves a stock item to a new location.
    ///
    /// Rejected before any write when the quantity exceeds what is on hand or
    /// the item is not at `from_location`.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id, stock_id = %input.stock_id))]
    pub async fn relocate(
        &self,
        actor: &user::Model,
        input: NewRelocation,
    ) -> Result<RelocationView, ServiceError> {
        require_any_role(actor, &STOCK_WATCHERS, "relocate stock")?;
        input.validate()?;
        if input.from_location.trim() == input.to_location.trim() {
            return Err(ServiceError::ValidationError(
                "from_location and to_location must differ".to_string(),
            ));
        }

        let actor_id = actor.id;
        let (relocated, moved) = self
            .db
            .transaction::<_, (relocation::Model, stock::Model), ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = find_stock(txn, input.stock_id).await?;
                    if input.quantity > current.current_quantity {
                        return Err(ServiceError::InsufficientStock(format!(
                            "Cannot relocate {} units of {}; only {} in stock",
                            input.quantity, current.item_name, current.current_quantity
                        )));
                    }
                    if current.location != input.from_location.trim() {
                        return Err(ServiceError::Conflict(format!(
                            "{} is at {}, not {}",
                            current.item_name,
                            current.location,
                            input.from_location.trim()
                        )));
                    }

                    let to_location = input.to_location.trim().to_string();
                    let mut active: stock::ActiveModel = current.clone().into();
                    active.location = Set(to_location.clone());
                    let moved = active.update(txn).await?;

                    let relocation_no = sequence::next_value(txn, sequence::RELOCATION).await?;
                    let relocated = relocation::ActiveModel {
                        relocation_no: Set(relocation_no),
                        stock_id: Set(current.id),
                        from_location: Set(current.location.clone()),
                        to_location: Set(to_location.clone()),
                        quantity: Set(input.quantity),
                        reason: Set(input.reason.trim().to_string()),
                        relocated_by: Set(actor_id),
                        completed: Set(true),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    record_movement(
                        txn,
                        current.id,
                        MovementKind::Transfer,
                        0,
                        current.current_quantity,
                        current.current_quantity,
                        &format!(
                            "Relocated {} units from {} to {}",
                            input.quantity, current.location, to_location
                        ),
                        Some(relocated.display_id()),
                        Some(actor_id),
                    )
                    .await?;
                    Ok((relocated, moved))
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(relocation = %relocated.display_id(), to = %relocated.to_location, "stock relocated");
        self.event_sender.publish(Event::RelocationCompleted {
            relocation_id: relocated.id,
            stock_id: relocated.stock_id,
            to_location: relocated.to_location.clone(),
        });
        self.after_movement(
            actor,
            &moved,
            MovementKind::Transfer,
            0,
            &format!(
                "Relocation {} from {} to {}",
                relocated.display_id(),
                relocated.from_location,
                relocated.to_location
            ),
        )
        .await;
        Ok(relocated.into())
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.id, stock_id = %input.stock_id))]
    pub async fn create_delivery(
        &self,
        actor: &user::Model,
        input: NewDelivery,
    ) -> Result<DeliveryView, ServiceError> {
        require_any_role(
            actor,
            &[Role::ProcurementOfficer, Role::StoresManager, Role::Admin],
            "log deliveries",
        )?;
        input.validate()?;

        let actor_id = actor.id;
        let created = self
            .db
            .transaction::<_, delivery::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    find_stock(txn, input.stock_id).await?;
                    let delivery_no = sequence::next_value(txn, sequence::DELIVERY).await?;
                    Ok(delivery::ActiveModel {
                        delivery_no: Set(delivery_no),
                        stock_id: Set(input.stock_id),
                        supplier: Set(input.supplier.trim().to_string()),
                        quantity: Set(input.quantity),
                        status: Set(DeliveryStatus::Pending.to_string()),
                        notes: Set(input.notes),
                        logged_by: Set(Some(actor_id)),
                        received_by: Set(None),
                        received_at: Set(None),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?)
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(delivery = %created.display_id(), "delivery logged");
        Ok(created.into())
    }

    /// Marks a delivery received and books its quantity into stock. Only once.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn receive_delivery(
        &self,
        actor: &user::Model,
        delivery_id: Uuid,
    ) -> Result<DeliveryView, ServiceError> {
        require_any_role(actor, &STOCK_WATCHERS, "receive deliveries")?;

        let actor_id = actor.id;
        let (received, updated) = self
            .db
            .transaction::<_, (delivery::Model, stock::Model), ServiceError>(move |txn| {
                Box::pin(async move {
                    let pending = delivery::Entity::find_by_id(delivery_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Delivery {} not found", delivery_id))
                        })?;

                    let now = Utc::now();
                    let result = delivery::Entity::update_many()
                        .set(delivery::ActiveModel {
                            status: Set(DeliveryStatus::Received.to_string()),
                            received_by: Set(Some(actor_id)),
                            received_at: Set(Some(now)),
                            ..Default::default()
                        })
                        .filter(delivery::Column::Id.eq(delivery_id))
                        .filter(delivery::Column::Status.eq(DeliveryStatus::Pending.to_string()))
                        .exec(txn)
                        .await?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::Conflict(format!(
                            "{} was already received",
                            pending.display_id()
                        )));
                    }

                    let updated = apply_delta(txn, pending.stock_id, pending.quantity).await?;
                    record_movement(
                        txn,
                        pending.stock_id,
                        MovementKind::In,
                        pending.quantity,
                        updated.current_quantity - pending.quantity,
                        updated.current_quantity,
                        &format!("Delivery from {}", pending.supplier),
                        Some(pending.display_id()),
                        Some(actor_id),
                    )
                    .await?;

                    let received = delivery::Model {
                        status: DeliveryStatus::Received.to_string(),
                        received_by: Some(actor_id),
                        received_at: Some(now),
                        ..pending
                    };
                    Ok((received, updated))
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        let display_id = received.display_id();
        info!(delivery = %display_id, quantity = received.quantity, "delivery received");

        self.event_sender.publish(Event::DeliveryReceived {
            delivery_id: received.id,
            stock_id: updated.id,
            quantity: received.quantity,
        });
        if let Some(logged_by) = received.logged_by {
            self.notifications
                .send(NewNotification {
                    user_id: logged_by,
                    kind: NotificationKind::DeliveryReceived,
                    title: format!("Delivery Received - {}", display_id),
                    message: format!("Delivery for {} has been received", updated.item_name),
                    priority: NotificationPriority::Medium,
                    related: Some(RelatedObject::new("delivery", display_id.clone())),
                })
                .await;
        }
        self.after_movement(
            actor,
            &updated,
            MovementKind::In,
            received.quantity,
            &format!("Delivery {}", display_id),
        )
        .await;

        Ok(received.into())
    }

    /// Stock items ordered by name, narrowed by category and location.
    pub async fn list_stocks(&self, filter: StockFilter) -> Result<Vec<StockView>, ServiceError> {
        let mut query = stock::Entity::find().order_by_asc(stock::Column::ItemName);

        if let Some(name) = filter.category.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            let category_ids: Vec<Uuid> = category::Entity::find()
                .filter(
                    Expr::expr(Func::lower(Expr::col(category::Column::Name)))
                        .eq(name.to_lowercase()),
                )
                .all(self.db.as_ref())
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect();
            if category_ids.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(stock::Column::CategoryId.is_in(category_ids));
        }
        if let Some(location) = filter.location.as_deref().map(str::trim).filter(|l| !l.is_empty())
        {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(stock::Column::Location)))
                    .eq(location.to_lowercase()),
            );
        }

        let items = query.all(self.db.as_ref()).await?;
        Ok(items.into_iter().map(StockView::from).collect())
    }

    pub async fn categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    /// Removes a stock item together with its movements, deliveries,
    /// damage reports and relocations.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete_stock(&self, actor: &user::Model, stock_id: Uuid) -> Result<(), ServiceError> {
        require_any_role(actor, &STOCK_WATCHERS, "delete stock items")?;

        let removed = self
            .db
            .transaction::<_, stock::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let stock = find_stock(txn, stock_id).await?;
                    stock_movement::Entity::delete_many()
                        .filter(stock_movement::Column::StockId.eq(stock_id))
                        .exec(txn)
                        .await?;
                    delivery::Entity::delete_many()
                        .filter(delivery::Column::StockId.eq(stock_id))
                        .exec(txn)
                        .await?;
                    damage_report::Entity::delete_many()
                        .filter(damage_report::Column::StockId.eq(stock_id))
                        .exec(txn)
                        .await?;
                    relocation::Entity::delete_many()
                        .filter(relocation::Column::StockId.eq(stock_id))
                        .exec(txn)
                        .await?;
                    stock::Entity::delete_by_id(stock_id).exec(txn).await?;
                    Ok(stock)
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(%stock_id, item = %removed.item_name, "stock item deleted");
        self.event_sender.publish(Event::StockDeleted {
            stock_id,
            item_name: removed.item_name,
        });
        Ok(())
    }

    /// Movements of one stock item, newest first.
    pub async fn list_movements(
        &self,
        stock_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        find_stock(self.db.as_ref(), stock_id).await?;
        Ok(stock_movement::Entity::find()
            .filter(stock_movement::Column::StockId.eq(stock_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Items still on the shelf but at or below their threshold. Exhausted
    /// items are left out.
    pub async fn low_stock_items(&self) -> Result<Vec<StockView>, ServiceError> {
        let items = stock::Entity::find()
            .filter(stock::Column::CurrentQuantity.gt(0))
            .filter(
                Expr::col(stock::Column::CurrentQuantity)
                    .lte(Expr::col(stock::Column::LowStockThreshold)),
            )
            .order_by_asc(stock::Column::ItemName)
            .all(self.db.as_ref())
            .await?;
        Ok(items.into_iter().map(StockView::from).collect())
    }

    /// Sends a low-stock alert for every item `low_stock_items` returns.
    pub async fn check_low_stock(&self) -> Result<usize, ServiceError> {
        let items = self.low_stock_items().await?;
        for item in &items {
            self.alert_low_stock(&item.stock).await;
        }
        info!(items = items.len(), "low stock check complete");
        Ok(items.len())
    }

    async fn alert_low_stock(&self, stock: &stock::Model) {
        self.event_sender.publish(Event::LowStockDetected {
            stock_id: stock.id,
            current_quantity: stock.current_quantity,
            threshold: stock.low_stock_threshold,
        });
        self.notifications
            .send_to_roles(
                &STOCK_WATCHERS,
                NotificationKind::StockLow,
                &format!("Low Stock Alert - {}", stock.item_name),
                &format!(
                    "{} is running low. Current quantity: {}",
                    stock.item_name, stock.current_quantity
                ),
                NotificationPriority::High,
                Some(RelatedObject::new("stock", stock.id.to_string())),
            )
            .await;
    }

    async fn after_movement(
        &self,
        actor: &user::Model,
        stock: &stock::Model,
        kind: MovementKind,
        delta: i32,
        reason: &str,
    ) {
        self.event_sender.publish(Event::StockAdjusted {
            stock_id: stock.id,
            movement_type: kind.to_string(),
            delta,
            new_quantity: stock.current_quantity,
        });
        self.ledger.emit(
            ContractCall::adjust_stock(&stock.item_name, delta, reason),
            actor.blockchain_address.as_deref(),
        );
        if delta < 0 && stock.is_low_stock() {
            self.alert_low_stock(stock).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_stock_rejects_negative_values() {
        let input = NewStock {
            item_name: "Laptop".into(),
            category: None,
            quantity: -1,
            unit_cost: dec!(-5),
            location: "Main Store".into(),
            low_stock_threshold: 2,
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("quantity"));
        assert!(fields.contains_key("unit_cost"));
    }

    #[test]
    fn damage_report_needs_a_description() {
        let input = NewDamageReport {
            stock_id: Uuid::new_v4(),
            quantity: 1,
            description: "   ".into(),
        };
        assert!(input.validate().is_err());
    }
}
