use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Clubs::Table)
          .if_not_exists()
          .col(ColumnDef::new(Clubs::Id).string().not_null().primary_key())
          .col(ColumnDef::new(Clubs::Name).string().not_null())
          .col(ColumnDef::new(Clubs::AgentId).string().null())
          .col(ColumnDef::new(Clubs::PackageId).string().null())
          .col(
            ColumnDef::new(Clubs::PackageStatus)
              .string()
              .not_null()
              .default("inactive"),
          )
          .col(ColumnDef::new(Clubs::PackageActivatedAt).date_time().null())
          .col(
            ColumnDef::new(Clubs::SalesCount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Clubs::Revenue).big_integer().not_null().default(0),
          )
          .col(ColumnDef::new(Clubs::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Sellers::Table)
          .if_not_exists()
          .col(ColumnDef::new(Sellers::Id).string().not_null().primary_key())
          .col(ColumnDef::new(Sellers::ClubId).string().not_null())
          .col(ColumnDef::new(Sellers::Name).string().not_null())
          .col(
            ColumnDef::new(Sellers::SalesCount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Sellers::Revenue)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Sellers::CommissionAccrued)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(ColumnDef::new(Sellers::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_sellers_club")
              .from(Sellers::Table, Sellers::ClubId)
              .to(Clubs::Table, Clubs::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_sellers_club")
          .table(Sellers::Table)
          .col(Sellers::ClubId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Sellers::Table).to_owned()).await?;
    manager.drop_table(Table::drop().table(Clubs::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Clubs {
  Table,
  Id,
  Name,
  AgentId,
  PackageId,
  PackageStatus,
  PackageActivatedAt,
  SalesCount,
  Revenue,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum Sellers {
  Table,
  Id,
  ClubId,
  Name,
  SalesCount,
  Revenue,
  CommissionAccrued,
  CreatedAt,
}
