use json as serde_json;
use sea_orm::{FromJsonQueryResult, entity::prelude::*};
use serde::{Deserialize, Serialize};

use super::club;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum LicenseState {
  #[sea_orm(string_value = "available")]
  #[default]
  Available,
  #[sea_orm(string_value = "reserved")]
  Reserved,
  #[sea_orm(string_value = "completed")]
  Completed,
  #[sea_orm(string_value = "expired")]
  Expired,
}

/// Buyer details attached on completion. Fetching them is best-effort, so a
/// license may stay `registration_pending` until the profile is retrieved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(Serialize, Deserialize, FromJsonQueryResult)]
pub struct BuyerInfo {
  pub name: Option<String>,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub registration_pending: bool,
}

impl BuyerInfo {
  pub fn pending() -> Self {
    Self { registration_pending: true, ..Default::default() }
  }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "licenses")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  #[sea_orm(indexed)]
  pub club_id: String,
  pub package_id: String,
  pub state: LicenseState,
  pub reserved_by: Option<String>,
  pub reservation_id: Option<String>,
  #[sea_orm(column_type = "Json", nullable)]
  pub buyer_info: Option<BuyerInfo>,
  /// Mirrors `buyer_info.registration_pending` so the retry job can query it.
  pub registration_pending: bool,
  pub expires_at: Option<DateTime>,
  pub created_at: DateTime,
  pub completed_at: Option<DateTime>,
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
