use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{club, license, seller};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
  #[sea_orm(string_value = "reserved")]
  #[default]
  Reserved,
  #[sea_orm(string_value = "completed")]
  Completed,
  #[sea_orm(string_value = "cancelled")]
  Cancelled,
  #[sea_orm(string_value = "expired")]
  Expired,
}

impl ReservationStatus {
  pub fn is_terminal(self) -> bool {
    self != Self::Reserved
  }
}

impl std::fmt::Display for ReservationStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Reserved => "reserved",
      Self::Completed => "completed",
      Self::Cancelled => "cancelled",
      Self::Expired => "expired",
    };
    f.write_str(s)
  }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  #[sea_orm(indexed)]
  pub seller_id: String,
  pub club_id: String,
  pub license_id: String,
  pub price: i64,
  pub status: ReservationStatus,
  #[sea_orm(unique, nullable)]
  pub provider_agreement_id: Option<String>,
  pub provider_status: Option<String>,
  pub created_at: DateTime,
  pub expires_at: DateTime,
  pub completed_at: Option<DateTime>,
  pub cancelled_at: Option<DateTime>,
}

impl Model {
  pub fn is_stale(&self, now: DateTime) -> bool {
    !self.status.is_terminal() && now > self.expires_at
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "seller::Entity",
    from = "Column::SellerId",
    to = "seller::Column::Id"
  )]
  Seller,
  #[sea_orm(
    belongs_to = "club::Entity",
    from = "Column::ClubId",
    to = "club::Column::Id"
  )]
  Club,
  #[sea_orm(
    belongs_to = "license::Entity",
    from = "Column::LicenseId",
    to = "license::Column::Id"
  )]
  License,
}

impl Related<seller::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Seller.def()
  }
}

impl Related<license::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::License.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
