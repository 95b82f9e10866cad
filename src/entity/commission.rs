use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
  #[sea_orm(string_value = "activation")]
  #[default]
  Activation,
  #[sea_orm(string_value = "monthly")]
  Monthly,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
  #[sea_orm(string_value = "earned")]
  #[default]
  Earned,
  #[sea_orm(string_value = "pending")]
  Pending,
  #[sea_orm(string_value = "paid")]
  Paid,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commissions")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  #[sea_orm(indexed)]
  pub agent_id: String,
  pub club_id: String,
  pub amount: i64,
  pub commission_type: CommissionType,
  pub status: CommissionStatus,
  pub period_year: Option<i32>,
  pub period_month: Option<i32>,
  pub due_date: Option<DateTime>,
  #[sea_orm(unique, nullable)]
  pub idempotency_key: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
