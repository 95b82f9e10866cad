use sea_orm_migration::prelude::*;

use super::{
  m20260301_000001_create_clubs::{Clubs, Sellers},
  m20260301_000002_create_licenses::Licenses,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Reservations::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Reservations::Id).string().not_null().primary_key(),
          )
          .col(ColumnDef::new(Reservations::SellerId).string().not_null())
          .col(ColumnDef::new(Reservations::ClubId).string().not_null())
          .col(ColumnDef::new(Reservations::LicenseId).string().not_null())
          .col(ColumnDef::new(Reservations::Price).big_integer().not_null())
          .col(ColumnDef::new(Reservations::Status).string().not_null())
          .col(
            ColumnDef::new(Reservations::ProviderAgreementId)
              .string()
              .null()
              .unique_key(),
          )
          .col(ColumnDef::new(Reservations::ProviderStatus).string().null())
          .col(ColumnDef::new(Reservations::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Reservations::ExpiresAt).date_time().not_null())
          .col(ColumnDef::new(Reservations::CompletedAt).date_time().null())
          .col(ColumnDef::new(Reservations::CancelledAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_reservations_seller")
              .from(Reservations::Table, Reservations::SellerId)
              .to(Sellers::Table, Sellers::Id),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_reservations_license")
              .from(Reservations::Table, Reservations::LicenseId)
              .to(Licenses::Table, Licenses::Id),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_reservations_seller_status")
          .table(Reservations::Table)
          .col(Reservations::SellerId)
          .col(Reservations::Status)
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Sales::Table)
          .if_not_exists()
          .col(ColumnDef::new(Sales::Id).string().not_null().primary_key())
          .col(
            ColumnDef::new(Sales::ReservationId)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(Sales::SellerId).string().not_null())
          .col(ColumnDef::new(Sales::ClubId).string().not_null())
          .col(ColumnDef::new(Sales::LicenseId).string().not_null().unique_key())
          .col(ColumnDef::new(Sales::Price).big_integer().not_null())
          .col(ColumnDef::new(Sales::PaymentMethod).string().not_null())
          .col(ColumnDef::new(Sales::ProviderAgreementId).string().null())
          .col(ColumnDef::new(Sales::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Sales::CompletedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_sales_reservation")
              .from(Sales::Table, Sales::ReservationId)
              .to(Reservations::Table, Reservations::Id),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_sales_club")
              .from(Sales::Table, Sales::ClubId)
              .to(Clubs::Table, Clubs::Id),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_sales_club")
          .table(Sales::Table)
          .col(Sales::ClubId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Sales::Table).to_owned()).await?;
    manager
      .drop_table(Table::drop().table(Reservations::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Reservations {
  Table,
  Id,
  SellerId,
  ClubId,
  LicenseId,
  Price,
  Status,
  ProviderAgreementId,
  ProviderStatus,
  CreatedAt,
  ExpiresAt,
  CompletedAt,
  CancelledAt,
}

#[derive(DeriveIden)]
pub enum Sales {
  Table,
  Id,
  ReservationId,
  SellerId,
  ClubId,
  LicenseId,
  Price,
  PaymentMethod,
  ProviderAgreementId,
  CreatedAt,
  CompletedAt,
}
