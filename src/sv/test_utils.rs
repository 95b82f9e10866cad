//! Shared test utilities: database setup, fixtures and a scripted provider.

use crate::{entity::reservation, prelude::*};

pub mod test_db {
  use sea_orm::{ConnectOptions, DbBackend, Schema};
  use tempfile::TempDir;

  use crate::{entity::*, prelude::*};

  /// In-memory SQLite with every table. A single connection keeps the
  /// database alive for the whole test and serializes transactions.
  pub async fn setup() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    create_tables(&db).await;
    db
  }

  /// File-backed SQLite behind the same pool options the server uses, so
  /// transactions run on parallel connections. Keep the directory alive
  /// for as long as the connection is used.
  pub async fn setup_shared() -> (DatabaseConnection, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let mut opts = ConnectOptions::new(url);
    opts.sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    create_tables(&db).await;
    (db, dir)
  }

  async fn create_tables(db: &DatabaseConnection) {
    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();

    let tables = [
      schema.create_table_from_entity(club::Entity),
      schema.create_table_from_entity(seller::Entity),
      schema.create_table_from_entity(license::Entity),
      schema.create_table_from_entity(reservation::Entity),
      schema.create_table_from_entity(sale::Entity),
      schema.create_table_from_entity(finance_entry::Entity),
      schema.create_table_from_entity(commission::Entity),
    ];
    for stmt in &tables {
      db.execute(backend.build(stmt)).await.unwrap();
    }
  }
}

/// Midnight of the given day.
pub fn at(year: i32, month: u32, day: u32) -> DateTime {
  chrono::NaiveDate::from_ymd_opt(year, month, day)
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .unwrap()
}

/// Pushes a reservation's deadline into the past.
pub async fn backdate(db: &DatabaseConnection, reservation_id: &str) {
  reservation::Entity::update_many()
    .set(reservation::ActiveModel {
      expires_at: Set(now() - TimeDelta::minutes(1)),
      ..Default::default()
    })
    .filter(reservation::Column::Id.eq(reservation_id))
    .exec(db)
    .await
    .unwrap();
}

pub mod fixtures {
  use crate::{
    entity::{PackageStatus, club, seller},
    prelude::*,
    sv::{Club, Pool, Seller},
  };

  pub async fn club(db: &DatabaseConnection) -> club::Model {
    Club::new(db).create("Test FC", None).await.unwrap()
  }

  pub async fn active_club_at(
    db: &DatabaseConnection,
    package_id: &str,
    when: DateTime,
  ) -> club::Model {
    let club = club(db).await;
    Club::new(db)
      .activate_package_at(&club.id, package_id, when)
      .await
      .unwrap()
      .club
  }

  pub async fn agent_club_at(
    db: &DatabaseConnection,
    agent_id: &str,
    package_id: &str,
    when: DateTime,
  ) -> club::Model {
    let club =
      Club::new(db).create("Agent FC", Some(agent_id.into())).await.unwrap();
    Club::new(db)
      .activate_package_at(&club.id, package_id, when)
      .await
      .unwrap()
      .club
  }

  pub async fn seller(
    db: &DatabaseConnection,
    club_id: &str,
    seller_id: &str,
  ) -> seller::Model {
    Seller::new(db).create(seller_id, club_id, "Test Seller").await.unwrap()
  }

  /// Club with an activated package and one seller.
  pub async fn selling_club(
    db: &DatabaseConnection,
    package_id: &str,
  ) -> (club::Model, seller::Model) {
    let club = club(db).await;
    let club = Club::new(db)
      .activate_package(&club.id, package_id)
      .await
      .unwrap()
      .club;
    let seller = seller(db, &club.id, "seller-a").await;
    (club, seller)
  }

  /// Active "starter" club holding exactly `licenses` available licenses.
  pub async fn selling_club_with(
    db: &DatabaseConnection,
    licenses: u32,
  ) -> (club::Model, seller::Model) {
    let club = club(db).await;
    club::Entity::update_many()
      .set(club::ActiveModel {
        package_id: Set(Some("starter".into())),
        package_status: Set(PackageStatus::Active),
        package_activated_at: Set(Some(now())),
        ..Default::default()
      })
      .filter(club::Column::Id.eq(club.id.as_str()))
      .exec(db)
      .await
      .unwrap();

    if licenses > 0 {
      Pool::new(db)
        .add_batch(&club.id, licenses, "starter", now() + TimeDelta::days(365))
        .await
        .unwrap();
    }

    let club = Club::new(db).by_id(&club.id).await.unwrap();
    let seller = seller(db, &club.id, "seller-a").await;
    (club, seller)
  }
}

pub use mock::MockProvider;

mod mock {
  use std::{
    collections::HashSet,
    sync::{
      Mutex,
      atomic::{AtomicBool, AtomicU32, Ordering},
    },
  };

  use async_trait::async_trait;

  use crate::{
    prelude::*,
    sv::provider::{
      Agreement, AgreementRequest, AgreementStatus, BuyerProfile,
      PaymentProvider,
    },
  };

  /// Provider double. Agreements start `PENDING`; tests move them with
  /// [`MockProvider::activate`] or [`MockProvider::set_status`].
  #[derive(Default)]
  pub struct MockProvider {
    statuses: Mutex<HashMap<String, AgreementStatus>>,
    lost_profiles: Mutex<HashSet<String>>,
    created: AtomicU32,
    fail_create: AtomicBool,
    fail_status: AtomicBool,
    fail_profile: AtomicBool,
  }

  impl MockProvider {
    pub fn activate(&self, agreement_id: &str) {
      self.set_status(agreement_id, AgreementStatus::Active);
    }

    pub fn set_status(&self, agreement_id: &str, status: AgreementStatus) {
      self.statuses.lock().unwrap().insert(agreement_id.into(), status);
    }

    pub fn fail_create(&self, fail: bool) {
      self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
      self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile(&self, fail: bool) {
      self.fail_profile.store(fail, Ordering::SeqCst);
    }

    /// The provider no longer knows the buyer behind this agreement.
    pub fn lose_profile(&self, agreement_id: &str) {
      self.lost_profiles.lock().unwrap().insert(agreement_id.into());
    }

    pub fn created(&self) -> u32 {
      self.created.load(Ordering::SeqCst)
    }

    fn unavailable() -> Error {
      Error::UpstreamUnavailable("provider offline".into())
    }
  }

  #[async_trait]
  impl PaymentProvider for MockProvider {
    async fn create_agreement(&self, req: AgreementRequest) -> Result<Agreement> {
      if self.fail_create.load(Ordering::SeqCst) {
        return Err(Self::unavailable());
      }
      let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
      let agreement_id = format!("agr-{n}-{}", req.merchant_reference);
      self.set_status(&agreement_id, AgreementStatus::Pending);
      Ok(Agreement {
        confirmation_url: format!("https://provider.test/confirm/{agreement_id}"),
        agreement_id,
      })
    }

    async fn agreement_status(
      &self,
      agreement_id: &str,
    ) -> Result<AgreementStatus> {
      if self.fail_status.load(Ordering::SeqCst) {
        return Err(Self::unavailable());
      }
      self
        .statuses
        .lock()
        .unwrap()
        .get(agreement_id)
        .copied()
        .ok_or_else(|| Error::InvalidArgs("unknown agreement".into()))
    }

    async fn buyer_profile(&self, agreement_id: &str) -> Result<BuyerProfile> {
      if self.fail_profile.load(Ordering::SeqCst) {
        return Err(Self::unavailable());
      }
      if self.lost_profiles.lock().unwrap().contains(agreement_id) {
        return Err(Error::InvalidArgs("unknown agreement".into()));
      }
      Ok(BuyerProfile {
        name: Some("Test Buyer".into()),
        email: Some("buyer@example.com".into()),
        phone_number: Some("4791234567".into()),
      })
    }
  }
}
