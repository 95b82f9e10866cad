use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_clubs::Clubs;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(FinanceEntries::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(FinanceEntries::Id)
              .string()
              .not_null()
              .primary_key(),
          )
          .col(ColumnDef::new(FinanceEntries::ClubId).string().not_null())
          .col(ColumnDef::new(FinanceEntries::EntryType).string().not_null())
          .col(ColumnDef::new(FinanceEntries::Amount).big_integer().not_null())
          .col(ColumnDef::new(FinanceEntries::PeriodYear).integer().null())
          .col(ColumnDef::new(FinanceEntries::PeriodMonth).integer().null())
          // one recurring line per key; NULLs do not collide
          .col(
            ColumnDef::new(FinanceEntries::IdempotencyKey)
              .string()
              .null()
              .unique_key(),
          )
          .col(ColumnDef::new(FinanceEntries::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(FinanceEntries::Metadata).json().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_finance_entries_club")
              .from(FinanceEntries::Table, FinanceEntries::ClubId)
              .to(Clubs::Table, Clubs::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_finance_entries_club_type")
          .table(FinanceEntries::Table)
          .col(FinanceEntries::ClubId)
          .col(FinanceEntries::EntryType)
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Commissions::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Commissions::Id).string().not_null().primary_key(),
          )
          .col(ColumnDef::new(Commissions::AgentId).string().not_null())
          .col(ColumnDef::new(Commissions::ClubId).string().not_null())
          .col(ColumnDef::new(Commissions::Amount).big_integer().not_null())
          .col(ColumnDef::new(Commissions::CommissionType).string().not_null())
          .col(ColumnDef::new(Commissions::Status).string().not_null())
          .col(ColumnDef::new(Commissions::PeriodYear).integer().null())
          .col(ColumnDef::new(Commissions::PeriodMonth).integer().null())
          .col(ColumnDef::new(Commissions::DueDate).date_time().null())
          .col(
            ColumnDef::new(Commissions::IdempotencyKey)
              .string()
              .null()
              .unique_key(),
          )
          .col(ColumnDef::new(Commissions::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_commissions_agent")
          .table(Commissions::Table)
          .col(Commissions::AgentId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Commissions::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(FinanceEntries::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum FinanceEntries {
  Table,
  Id,
  ClubId,
  EntryType,
  Amount,
  PeriodYear,
  PeriodMonth,
  IdempotencyKey,
  CreatedAt,
  Metadata,
}

#[derive(DeriveIden)]
pub enum Commissions {
  Table,
  Id,
  AgentId,
  ClubId,
  Amount,
  CommissionType,
  Status,
  PeriodYear,
  PeriodMonth,
  DueDate,
  IdempotencyKey,
  CreatedAt,
}
