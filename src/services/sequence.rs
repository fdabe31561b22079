use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::entities::id_sequence;

/// Sequence names, one per entity kind with a display identifier.
pub const REQUEST: &str = "request";
pub const DELIVERY: &str = "delivery";
pub const DAMAGE_REPORT: &str = "damage_report";
pub const RELOCATION: &str = "relocation";

/// Allocates the next value of `name`, starting at 1.
///
/// Must run inside the transaction that inserts the numbered row; the
/// increment holds the sequence row lock until that transaction ends.
pub async fn next_value<C: ConnectionTrait>(conn: &C, name: &str) -> Result<i64, DbErr> {
    let seeded = id_sequence::Entity::insert(id_sequence::ActiveModel {
        name: Set(name.to_string()),
        value: Set(0),
    })
    .on_conflict(
        OnConflict::column(id_sequence::Column::Name)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await;
    match seeded {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(e) => return Err(e),
    }

    id_sequence::Entity::update_many()
        .col_expr(
            id_sequence::Column::Value,
            Expr::col(id_sequence::Column::Value).add(1),
        )
        .filter(id_sequence::Column::Name.eq(name))
        .exec(conn)
        .await?;

    id_sequence::Entity::find_by_id(name.to_string())
        .one(conn)
        .await?
        .map(|row| row.value)
        .ok_or_else(|| DbErr::RecordNotFound(format!("sequence {}", name)))
}
