pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_clubs;
mod m20260301_000002_create_licenses;
mod m20260302_000003_create_reservations;
mod m20260310_000004_create_ledger;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260301_000001_create_clubs::Migration),
      Box::new(m20260301_000002_create_licenses::Migration),
      Box::new(m20260302_000003_create_reservations::Migration),
      Box::new(m20260310_000004_create_ledger::Migration),
    ]
  }
}
