use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{finance_entry, license, seller};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
  #[sea_orm(string_value = "inactive")]
  #[default]
  Inactive,
  #[sea_orm(string_value = "active")]
  Active,
  #[sea_orm(string_value = "suspended")]
  Suspended,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clubs")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  pub name: String,
  pub agent_id: Option<String>,
  pub package_id: Option<String>,
  pub package_status: PackageStatus,
  pub package_activated_at: Option<DateTime>,
  pub sales_count: i64,
  pub revenue: i64,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "seller::Entity")]
  Sellers,
  #[sea_orm(has_many = "license::Entity")]
  Licenses,
  #[sea_orm(has_many = "finance_entry::Entity")]
  FinanceEntries,
}

impl Related<seller::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Sellers.def()
  }
}

impl Related<license::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Licenses.def()
  }
}

impl Related<finance_entry::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::FinanceEntries.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
