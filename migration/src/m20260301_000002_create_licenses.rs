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
          .table(Licenses::Table)
          .if_not_exists()
          .col(ColumnDef::new(Licenses::Id).string().not_null().primary_key())
          .col(ColumnDef::new(Licenses::ClubId).string().not_null())
          .col(ColumnDef::new(Licenses::PackageId).string().not_null())
          .col(
            ColumnDef::new(Licenses::State)
              .string()
              .not_null()
              .default("available"),
          )
          .col(ColumnDef::new(Licenses::ReservedBy).string().null())
          .col(ColumnDef::new(Licenses::ReservationId).string().null())
          .col(ColumnDef::new(Licenses::BuyerInfo).json().null())
          .col(
            ColumnDef::new(Licenses::RegistrationPending)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(ColumnDef::new(Licenses::ExpiresAt).date_time().null())
          .col(ColumnDef::new(Licenses::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Licenses::CompletedAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_licenses_club")
              .from(Licenses::Table, Licenses::ClubId)
              .to(Clubs::Table, Clubs::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    // claim scans available licenses of one club
    manager
      .create_index(
        Index::create()
          .name("idx_licenses_club_state")
          .table(Licenses::Table)
          .col(Licenses::ClubId)
          .col(Licenses::State)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_licenses_registration_pending")
          .table(Licenses::Table)
          .col(Licenses::RegistrationPending)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Licenses::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Licenses {
  Table,
  Id,
  ClubId,
  PackageId,
  State,
  ReservedBy,
  ReservationId,
  BuyerInfo,
  RegistrationPending,
  ExpiresAt,
  CreatedAt,
  CompletedAt,
}
