use migration::{Migrator, MigratorTrait};
use sea_orm::ConnectOptions;

use crate::{
  config::Config,
  prelude::*,
  sv::{self, provider::PaymentProvider},
};

pub struct AppState {
  pub db: DatabaseConnection,
  pub config: Config,
  pub provider: Arc<dyn PaymentProvider>,
}

/// Services borrowing the shared connection for one request or job run.
pub struct Services<'a> {
  pub club: sv::Club<'a>,
  pub seller: sv::Seller<'a>,
  pub pool: sv::Pool<'a>,
  pub reservation: sv::Reservation<'a>,
  pub payment: sv::Payment<'a>,
  pub ledger: sv::Ledger<'a>,
}

impl AppState {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    let mut opts = ConnectOptions::new(&config.database_url);
    opts.sqlx_logging(false);
    let db =
      Database::connect(opts).await.context("Failed to connect to database")?;

    Migrator::up(&db, None).await.context("Failed to run migrations")?;

    let provider = sv::provider::RecurringClient::new(
      config.provider_url.clone(),
      config.provider_token.clone(),
      config.provider_timeout,
    )?;

    Ok(Self::with_provider(db, config, Arc::new(provider)))
  }

  pub fn with_provider(
    db: DatabaseConnection,
    config: Config,
    provider: Arc<dyn PaymentProvider>,
  ) -> Self {
    Self { db, config, provider }
  }

  pub fn sv(&self) -> Services<'_> {
    Services {
      club: sv::Club::new(&self.db),
      seller: sv::Seller::new(&self.db),
      pool: sv::Pool::new(&self.db),
      reservation: sv::Reservation::new(
        &self.db,
        self.config.reservation_ttl(),
      ),
      payment: sv::Payment::new(&self.db, &*self.provider, &self.config),
      ledger: sv::Ledger::new(&self.db, self.config.debt_due_days),
    }
  }
}
