//! License pool: the per-club inventory and the only code that moves a
//! license between states. Every transition is a conditional update keyed on
//! the current state; the affected-row count tells the caller if it won.

use sea_orm::{Condition, sea_query::Expr};
use serde::Serialize;

use crate::{
  entity::{BuyerInfo, LicenseState, license},
  prelude::*,
};

/// Candidates tried per selection round.
const CLAIM_WINDOW: u64 = 8;
const CLAIM_ROUNDS: usize = 4;
const BATCH_CHUNK: usize = 50;

pub struct Pool<'a, C = DatabaseConnection> {
  db: &'a C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
  pub requested: u32,
  pub created: u32,
}

impl BatchReport {
  pub fn failed(&self) -> u32 {
    self.requested - self.created
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
  pub total: u64,
  pub available: u64,
  pub reserved: u64,
  pub completed: u64,
  pub expired: u64,
}

impl<'a, C: ConnectionTrait> Pool<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn by_id(&self, license_id: &str) -> Result<license::Model> {
    license::Entity::find_by_id(license_id)
      .one(self.db)
      .await?
      .ok_or(Error::LicenseNotFound)
  }

  /// Moves one available license of the club to `reserved`, tagged with the
  /// reservation. Concurrent callers never receive the same license.
  pub async fn claim_next(
    &self,
    club_id: &str,
    seller_id: &str,
    reservation_id: &str,
  ) -> Result<license::Model> {
    for round in 0..CLAIM_ROUNDS {
      let candidates: Vec<String> = license::Entity::find()
        .select_only()
        .column(license::Column::Id)
        .filter(license::Column::ClubId.eq(club_id))
        .filter(license::Column::State.eq(LicenseState::Available))
        .filter(
          Condition::any()
            .add(license::Column::ExpiresAt.is_null())
            .add(license::Column::ExpiresAt.gt(now())),
        )
        .order_by_asc(license::Column::CreatedAt)
        .order_by_asc(license::Column::Id)
        .limit(CLAIM_WINDOW)
        .into_tuple()
        .all(self.db)
        .await?;

      if candidates.is_empty() {
        return Err(Error::NoLicenseAvailable);
      }

      for id in candidates {
        let res = license::Entity::update_many()
          .set(license::ActiveModel {
            state: Set(LicenseState::Reserved),
            reserved_by: Set(Some(seller_id.to_string())),
            reservation_id: Set(Some(reservation_id.to_string())),
            ..Default::default()
          })
          .filter(license::Column::Id.eq(id.as_str()))
          .filter(license::Column::State.eq(LicenseState::Available))
          .exec(self.db)
          .await?;

        if res.rows_affected == 1 {
          debug!(license_id = %id, club_id, reservation_id, "license claimed");
          return self.by_id(&id).await;
        }
        trace!(license_id = %id, "claim lost to a concurrent caller");
      }

      debug!(club_id, round, "claim window exhausted, selecting again");
    }

    warn!(club_id, "license claim gave up under contention");
    Err(Error::PersistenceConflict)
  }

  /// `reserved -> available`, only while the license still belongs to the
  /// given reservation. Returns `false` when nothing had to change.
  pub async fn release(
    &self,
    license_id: &str,
    reservation_id: &str,
  ) -> Result<bool> {
    let res = license::Entity::update_many()
      .set(license::ActiveModel {
        state: Set(LicenseState::Available),
        reserved_by: Set(None),
        reservation_id: Set(None),
        ..Default::default()
      })
      .filter(license::Column::Id.eq(license_id))
      .filter(license::Column::State.eq(LicenseState::Reserved))
      .filter(license::Column::ReservationId.eq(reservation_id))
      .exec(self.db)
      .await?;

    if res.rows_affected == 1 {
      debug!(license_id, reservation_id, "license released");
      return Ok(true);
    }

    let license = self.by_id(license_id).await?;
    debug!(license_id, state = ?license.state, "release was a no-op");
    Ok(false)
  }

  /// `reserved -> completed` with buyer details and subscription validity.
  /// Repeating it for the same reservation is a no-op returning `false`.
  pub async fn complete(
    &self,
    license_id: &str,
    reservation_id: &str,
    buyer_info: BuyerInfo,
    expires_at: DateTime,
  ) -> Result<bool> {
    let pending = buyer_info.registration_pending;
    let res = license::Entity::update_many()
      .set(license::ActiveModel {
        state: Set(LicenseState::Completed),
        buyer_info: Set(Some(buyer_info)),
        registration_pending: Set(pending),
        expires_at: Set(Some(expires_at)),
        completed_at: Set(Some(now())),
        ..Default::default()
      })
      .filter(license::Column::Id.eq(license_id))
      .filter(license::Column::State.eq(LicenseState::Reserved))
      .filter(license::Column::ReservationId.eq(reservation_id))
      .exec(self.db)
      .await?;

    if res.rows_affected == 1 {
      return Ok(true);
    }

    let license = self.by_id(license_id).await?;
    if license.state == LicenseState::Completed
      && license.reservation_id.as_deref() == Some(reservation_id)
    {
      return Ok(false);
    }

    Err(Error::InvalidTransition("license is not held by this reservation"))
  }

  /// Buyer-info enrichment, the only mutation a completed license accepts.
  pub async fn enrich(
    &self,
    license_id: &str,
    buyer_info: BuyerInfo,
  ) -> Result<bool> {
    let pending = buyer_info.registration_pending;
    let res = license::Entity::update_many()
      .set(license::ActiveModel {
        buyer_info: Set(Some(buyer_info)),
        registration_pending: Set(pending),
        ..Default::default()
      })
      .filter(license::Column::Id.eq(license_id))
      .filter(license::Column::State.eq(LicenseState::Completed))
      .exec(self.db)
      .await?;

    Ok(res.rows_affected == 1)
  }

  /// Creates `count` available licenses. Chunks that fail are logged and
  /// reported through the returned counts instead of aborting the batch.
  pub async fn add_batch(
    &self,
    club_id: &str,
    count: u32,
    package_id: &str,
    expires_at: DateTime,
  ) -> Result<BatchReport> {
    let now = now();
    let models: Vec<_> = (0..count)
      .map(|_| license::ActiveModel {
        id: Set(new_id()),
        club_id: Set(club_id.to_string()),
        package_id: Set(package_id.to_string()),
        state: Set(LicenseState::Available),
        reserved_by: Set(None),
        reservation_id: Set(None),
        buyer_info: Set(None),
        registration_pending: Set(false),
        expires_at: Set(Some(expires_at)),
        created_at: Set(now),
        completed_at: Set(None),
      })
      .collect();

    let mut created = 0u32;
    let mut chunks = models.into_iter().peekable();
    while chunks.peek().is_some() {
      let chunk: Vec<_> = chunks.by_ref().take(BATCH_CHUNK).collect();
      let len = chunk.len() as u32;
      match license::Entity::insert_many(chunk)
        .exec_without_returning(self.db)
        .await
      {
        Ok(_) => created += len,
        Err(err) => {
          error!(club_id, "failed to insert {len} licenses: {err}");
        }
      }
    }

    let report = BatchReport { requested: count, created };
    if report.failed() > 0 {
      warn!(club_id, failed = report.failed(), "license batch incomplete");
    } else {
      info!(club_id, created, package_id, "license batch created");
    }
    Ok(report)
  }

  pub async fn stats(&self, club_id: &str) -> Result<PoolStats> {
    let count = |state: LicenseState| {
      license::Entity::find()
        .filter(license::Column::ClubId.eq(club_id))
        .filter(license::Column::State.eq(state))
        .count(self.db)
    };

    let available = count(LicenseState::Available).await?;
    let reserved = count(LicenseState::Reserved).await?;
    let completed = count(LicenseState::Completed).await?;
    let expired = count(LicenseState::Expired).await?;

    Ok(PoolStats {
      total: available + reserved + completed + expired,
      available,
      reserved,
      completed,
      expired,
    })
  }

  /// `available -> expired` for licenses whose batch validity has lapsed.
  pub async fn expire_unsold(&self, now: DateTime) -> Result<u64> {
    let res = license::Entity::update_many()
      .col_expr(license::Column::State, Expr::value(LicenseState::Expired))
      .filter(license::Column::State.eq(LicenseState::Available))
      .filter(license::Column::ExpiresAt.lt(now))
      .exec(self.db)
      .await?;
    Ok(res.rows_affected)
  }

  /// Completed licenses still waiting for buyer info, oldest sale first.
  pub async fn pending_registrations(
    &self,
    limit: u64,
    offset: u64,
  ) -> Result<Vec<license::Model>> {
    Ok(
      license::Entity::find()
        .filter(license::Column::State.eq(LicenseState::Completed))
        .filter(license::Column::RegistrationPending.eq(true))
        .order_by_asc(license::Column::CompletedAt)
        .order_by_asc(license::Column::Id)
        .offset(offset)
        .limit(limit)
        .all(self.db)
        .await?,
    )
  }
}
