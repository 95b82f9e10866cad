use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::club;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sellers")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  pub club_id: String,
  pub name: String,
  pub sales_count: i64,
  pub revenue: i64,
  pub commission_accrued: i64,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "club::Entity",
    from = "Column::ClubId",
    to = "club::Column::Id"
  )]
  Club,
}

impl Related<club::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Club.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
