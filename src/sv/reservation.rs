//! Seller-facing reservation lifecycle.
//!
//! `reserved` is the only non-terminal status. Expiry is discovered lazily:
//! whoever reads a stale reservation moves it to `expired` and returns its
//! license to the pool before acting on it.

use crate::{
  entity::{PackageStatus, ReservationStatus, reservation},
  prelude::*,
  sv::{Club, Pool, Seller, package},
};

pub struct Reservation<'a> {
  db: &'a DatabaseConnection,
  ttl: TimeDelta,
}

impl<'a> Reservation<'a> {
  pub fn new(db: &'a DatabaseConnection, ttl: TimeDelta) -> Self {
    Self { db, ttl }
  }

  pub async fn find(&self, id: &str) -> Result<Option<reservation::Model>> {
    Ok(reservation::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_id(&self, id: &str) -> Result<reservation::Model> {
    self.find(id).await?.ok_or(Error::ReservationNotFound)
  }

  pub async fn by_agreement(
    &self,
    agreement_id: &str,
  ) -> Result<Option<reservation::Model>> {
    Ok(
      reservation::Entity::find()
        .filter(reservation::Column::ProviderAgreementId.eq(agreement_id))
        .one(self.db)
        .await?,
    )
  }

  /// Claims a license for the seller and opens a reservation on it. Both
  /// rows are written in one transaction, so a failed claim leaves nothing.
  pub async fn start(
    &self,
    seller_id: &str,
    club_id: &str,
  ) -> Result<reservation::Model> {
    let seller = Seller::new(self.db).by_id(seller_id).await?;
    if seller.club_id != club_id {
      return Err(Error::Forbidden);
    }

    let club = Club::new(self.db).by_id(club_id).await?;
    if club.package_status != PackageStatus::Active {
      return Err(Error::InvalidTransition("club has no active package"));
    }
    let package = package::find(club.package_id.as_deref().unwrap_or_default())?;

    let id = new_id();
    let now = now();
    let txn = self.db.begin().await?;

    let license = Pool::new(&txn).claim_next(club_id, seller_id, &id).await?;

    let reservation = reservation::ActiveModel {
      id: Set(id),
      seller_id: Set(seller_id.to_string()),
      club_id: Set(club_id.to_string()),
      license_id: Set(license.id),
      price: Set(package.license_price),
      status: Set(ReservationStatus::Reserved),
      provider_agreement_id: Set(None),
      provider_status: Set(None),
      created_at: Set(now),
      expires_at: Set(now + self.ttl),
      completed_at: Set(None),
      cancelled_at: Set(None),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(
      reservation_id = %reservation.id,
      license_id = %reservation.license_id,
      seller_id,
      "reservation started"
    );
    Ok(reservation)
  }

  /// Seller cancellation. Ownership is checked before state so a foreign
  /// request never touches the record.
  pub async fn cancel(
    &self,
    reservation_id: &str,
    requesting_seller_id: &str,
  ) -> Result<reservation::Model> {
    let current = self.by_id(reservation_id).await?;
    if current.seller_id != requesting_seller_id {
      return Err(Error::Forbidden);
    }

    let current = self.expire_if_stale(current).await?;
    if current.status != ReservationStatus::Reserved {
      return Err(Error::InvalidState(current.status));
    }

    let (updated, moved) =
      self.close(&current, ReservationStatus::Cancelled, None).await?;
    if !moved {
      return Err(Error::InvalidState(updated.status));
    }

    info!(reservation_id, "reservation cancelled by seller");
    Ok(updated)
  }

  /// Status read used by polling. Terminal records come back untouched.
  pub async fn check_and_expire(
    &self,
    reservation_id: &str,
  ) -> Result<reservation::Model> {
    let current = self.by_id(reservation_id).await?;
    self.expire_if_stale(current).await
  }

  pub async fn expire_if_stale(
    &self,
    current: reservation::Model,
  ) -> Result<reservation::Model> {
    if !current.is_stale(now()) {
      return Ok(current);
    }

    let (updated, moved) =
      self.close(&current, ReservationStatus::Expired, None).await?;
    if moved {
      info!(reservation_id = %updated.id, "reservation expired");
    }
    Ok(updated)
  }

  /// Reservations of a seller, optionally narrowed to one status. Stale
  /// ones are expired on the way out.
  pub async fn by_seller(
    &self,
    seller_id: &str,
    status: Option<ReservationStatus>,
  ) -> Result<Vec<reservation::Model>> {
    let mut query = reservation::Entity::find()
      .filter(reservation::Column::SellerId.eq(seller_id));

    if let Some(status) = status {
      query = query.filter(reservation::Column::Status.eq(status));
    }

    let found =
      query.order_by_desc(reservation::Column::CreatedAt).all(self.db).await?;

    let mut out = Vec::with_capacity(found.len());
    for reservation in found {
      let reservation = self.expire_if_stale(reservation).await?;
      if status.is_none_or(|s| s == reservation.status) {
        out.push(reservation);
      }
    }
    Ok(out)
  }

  /// Records the provider agreement. Succeeds once, and only while the
  /// reservation is still open.
  pub async fn attach_agreement(
    &self,
    reservation_id: &str,
    agreement_id: &str,
  ) -> Result<bool> {
    let res = reservation::Entity::update_many()
      .set(reservation::ActiveModel {
        provider_agreement_id: Set(Some(agreement_id.to_string())),
        ..Default::default()
      })
      .filter(reservation::Column::Id.eq(reservation_id))
      .filter(reservation::Column::Status.eq(ReservationStatus::Reserved))
      .filter(reservation::Column::ProviderAgreementId.is_null())
      .exec(self.db)
      .await?;

    Ok(res.rows_affected == 1)
  }

  /// `reserved -> target` and license release in one transaction. Returns
  /// the record as stored afterwards and whether this call moved it.
  pub(crate) async fn close(
    &self,
    current: &reservation::Model,
    target: ReservationStatus,
    provider_status: Option<String>,
  ) -> Result<(reservation::Model, bool)> {
    let mut update =
      reservation::ActiveModel { status: Set(target), ..Default::default() };
    if target == ReservationStatus::Cancelled {
      update.cancelled_at = Set(Some(now()));
    }
    if provider_status.is_some() {
      update.provider_status = Set(provider_status);
    }

    let txn = self.db.begin().await?;
    let res = reservation::Entity::update_many()
      .set(update)
      .filter(reservation::Column::Id.eq(current.id.as_str()))
      .filter(reservation::Column::Status.eq(ReservationStatus::Reserved))
      .exec(&txn)
      .await?;

    if res.rows_affected == 0 {
      txn.rollback().await?;
      return Ok((self.by_id(&current.id).await?, false));
    }

    if !Pool::new(&txn).release(&current.license_id, &current.id).await? {
      warn!(
        reservation_id = %current.id,
        license_id = %current.license_id,
        "license was not held by the closing reservation"
      );
    }
    txn.commit().await?;

    Ok((self.by_id(&current.id).await?, true))
  }
}
