use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::club;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
  #[sea_orm(string_value = "package_activation")]
  #[default]
  PackageActivation,
  #[sea_orm(string_value = "monthly_debt")]
  MonthlyDebt,
  #[sea_orm(string_value = "license_sale")]
  LicenseSale,
  #[sea_orm(string_value = "debt_payment")]
  DebtPayment,
}

/// Append-only ledger line. Negative amounts are debt owed by the club.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "finance_entries")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  #[sea_orm(indexed)]
  pub club_id: String,
  pub entry_type: EntryType,
  pub amount: i64,
  pub period_year: Option<i32>,
  pub period_month: Option<i32>,
  #[sea_orm(unique, nullable)]
  pub idempotency_key: Option<String>,
  pub created_at: DateTime,
  pub metadata: Option<Json>,
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
