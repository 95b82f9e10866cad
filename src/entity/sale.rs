use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::reservation;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  #[sea_orm(unique)]
  pub reservation_id: String,
  pub seller_id: String,
  pub club_id: String,
  #[sea_orm(unique)]
  pub license_id: String,
  pub price: i64,
  pub payment_method: String,
  pub provider_agreement_id: Option<String>,
  pub created_at: DateTime,
  pub completed_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "reservation::Entity",
    from = "Column::ReservationId",
    to = "reservation::Column::Id"
  )]
  Reservation,
}

impl Related<reservation::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Reservation.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
