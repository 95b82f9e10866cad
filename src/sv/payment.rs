//! Payment confirmation.
//!
//! Two triggers reach this module: the buyer's redirect back from the
//! provider and the provider webhook. Both end in [`Payment::confirm`] or
//! [`Payment::reject`], so duplicate or out-of-order delivery is handled in
//! one place. Completion writes the reservation, the license, the sale, the
//! counters and the ledger line in a single transaction.

use sea_orm::sea_query::Expr;
use serde::{Deserialize, Serialize};

use crate::{
  config::Config,
  entity::{
    BuyerInfo, EntryType, ReservationStatus, club, license, reservation, sale,
    seller,
  },
  prelude::*,
  sv::{
    Club, Pool, Reservation,
    ledger::{self, NewEntry},
    package::{self, Package},
    provider::{AgreementRequest, AgreementStatus, PaymentProvider},
  },
};

pub const PAYMENT_METHOD: &str = "recurring_agreement";
const CURRENCY: &str = "NOK";

#[derive(Debug, Clone, Copy)]
pub enum ReservationRef<'r> {
  Id(&'r str),
  Agreement(&'r str),
}

#[derive(Debug)]
pub enum Outcome {
  Completed(sale::Model),
  AlreadyCompleted(sale::Model),
  /// The provider has not activated the agreement yet. Nothing changed.
  Pending,
  Rejected(reservation::Model),
  /// No reservation matches the reference.
  Ignored,
}

impl Outcome {
  pub fn sale(&self) -> Option<&sale::Model> {
    match self {
      Self::Completed(sale) | Self::AlreadyCompleted(sale) => Some(sale),
      _ => None,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Completed(_) | Self::AlreadyCompleted(_) => "completed",
      Self::Pending => "pending",
      Self::Rejected(_) => "rejected",
      Self::Ignored => "ignored",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventType {
  AgreementActivated,
  ChargeCompleted,
  AgreementRejected,
  AgreementCancelled,
  AgreementExpired,
  #[serde(other)]
  Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
  pub agreement_id: String,
  #[serde(default)]
  pub status: Option<String>,
  pub event_type: WebhookEventType,
}

pub struct Payment<'a> {
  db: &'a DatabaseConnection,
  provider: &'a dyn PaymentProvider,
  config: &'a Config,
}

impl<'a> Payment<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    provider: &'a dyn PaymentProvider,
    config: &'a Config,
  ) -> Self {
    Self { db, provider, config }
  }

  fn reservations(&self) -> Reservation<'a> {
    Reservation::new(self.db, self.config.reservation_ttl())
  }

  async fn resolve(
    &self,
    reference: ReservationRef<'_>,
  ) -> Result<Option<reservation::Model>> {
    match reference {
      ReservationRef::Id(id) => self.reservations().find(id).await,
      ReservationRef::Agreement(id) => self.reservations().by_agreement(id).await,
    }
  }

  async fn existing_sale(&self, reservation_id: &str) -> Result<sale::Model> {
    sale::Entity::find()
      .filter(sale::Column::ReservationId.eq(reservation_id))
      .one(self.db)
      .await?
      .ok_or(Error::SaleNotFound)
  }

  /// Opens a provider agreement for the reservation and returns the URL the
  /// buyer confirms it at.
  pub async fn initiate(
    &self,
    reservation_id: &str,
    phone_number: Option<String>,
  ) -> Result<String> {
    let reservations = self.reservations();
    let current = reservations.check_and_expire(reservation_id).await?;
    if current.status != ReservationStatus::Reserved {
      return Err(Error::InvalidState(current.status));
    }
    if current.provider_agreement_id.is_some() {
      return Err(Error::InvalidTransition("payment is already initiated"));
    }

    let club = Club::new(self.db).by_id(&current.club_id).await?;
    let license = Pool::new(self.db).by_id(&current.license_id).await?;
    let package = package::find(&license.package_id)?;

    let agreement = self
      .provider
      .create_agreement(AgreementRequest {
        amount: current.price,
        currency: CURRENCY.into(),
        product_name: format!("{} {}", club.name, package.name),
        merchant_reference: current.id.clone(),
        return_url: self.config.return_url(&current.id),
        phone_number,
      })
      .await?;

    if !reservations
      .attach_agreement(&current.id, &agreement.agreement_id)
      .await?
    {
      return Err(Error::InvalidTransition("payment is already initiated"));
    }

    info!(
      reservation_id,
      agreement_id = %agreement.agreement_id,
      "payment agreement created"
    );
    Ok(agreement.confirmation_url)
  }

  /// Drives a reservation to `completed` once the provider reports the
  /// agreement active. Safe to call any number of times from either trigger.
  pub async fn confirm(&self, reference: ReservationRef<'_>) -> Result<Outcome> {
    let Some(current) = self.resolve(reference).await? else {
      debug!(?reference, "confirmation for unknown reservation");
      return Ok(Outcome::Ignored);
    };

    let current = self.reservations().expire_if_stale(current).await?;
    match current.status {
      ReservationStatus::Reserved => {}
      ReservationStatus::Completed => {
        return Ok(Outcome::AlreadyCompleted(
          self.existing_sale(&current.id).await?,
        ));
      }
      status => return Err(Error::InvalidState(status)),
    }

    let Some(agreement_id) = current.provider_agreement_id.clone() else {
      return Ok(Outcome::Pending);
    };

    let status = self.provider.agreement_status(&agreement_id).await?;
    match status {
      AgreementStatus::Active => {}
      AgreementStatus::Pending => return Ok(Outcome::Pending),
      AgreementStatus::Stopped | AgreementStatus::Expired => {
        return self.close_rejected(current, status.as_str()).await;
      }
    }

    let buyer = match self.provider.buyer_profile(&agreement_id).await {
      Ok(profile) => BuyerInfo::from(profile),
      Err(err) => {
        warn!(
          reservation_id = %current.id,
          "buyer profile unavailable, completing as pending: {err}"
        );
        BuyerInfo::pending()
      }
    };

    self.finalize(current, agreement_id, status, buyer).await
  }

  async fn finalize(
    &self,
    current: reservation::Model,
    agreement_id: String,
    status: AgreementStatus,
    buyer: BuyerInfo,
  ) -> Result<Outcome> {
    let license = Pool::new(self.db).by_id(&current.license_id).await?;
    let package = package::find(&license.package_id)?;
    let commission =
      Package::percent_of(current.price, self.config.seller_commission_percent);
    let now = now();

    let txn = self.db.begin().await?;

    let res = reservation::Entity::update_many()
      .set(reservation::ActiveModel {
        status: Set(ReservationStatus::Completed),
        provider_status: Set(Some(status.as_str().to_string())),
        completed_at: Set(Some(now)),
        ..Default::default()
      })
      .filter(reservation::Column::Id.eq(current.id.as_str()))
      .filter(reservation::Column::Status.eq(ReservationStatus::Reserved))
      .exec(&txn)
      .await?;

    if res.rows_affected == 0 {
      txn.rollback().await?;
      return self.after_lost_race(&current.id).await;
    }

    Pool::new(&txn)
      .complete(&current.license_id, &current.id, buyer, now + package.validity())
      .await?;

    let inserted = sale::ActiveModel {
      id: Set(new_id()),
      reservation_id: Set(current.id.clone()),
      seller_id: Set(current.seller_id.clone()),
      club_id: Set(current.club_id.clone()),
      license_id: Set(current.license_id.clone()),
      price: Set(current.price),
      payment_method: Set(PAYMENT_METHOD.into()),
      provider_agreement_id: Set(Some(agreement_id)),
      created_at: Set(now),
      completed_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(Error::from_insert);

    let sale = match inserted {
      Ok(sale) => sale,
      Err(Error::DuplicateOperation) => {
        txn.rollback().await?;
        return self.after_lost_race(&current.id).await;
      }
      Err(err) => return Err(err),
    };

    club::Entity::update_many()
      .col_expr(
        club::Column::SalesCount,
        Expr::col(club::Column::SalesCount).add(1),
      )
      .col_expr(
        club::Column::Revenue,
        Expr::col(club::Column::Revenue).add(current.price),
      )
      .filter(club::Column::Id.eq(current.club_id.as_str()))
      .exec(&txn)
      .await?;

    seller::Entity::update_many()
      .col_expr(
        seller::Column::SalesCount,
        Expr::col(seller::Column::SalesCount).add(1),
      )
      .col_expr(
        seller::Column::Revenue,
        Expr::col(seller::Column::Revenue).add(current.price),
      )
      .col_expr(
        seller::Column::CommissionAccrued,
        Expr::col(seller::Column::CommissionAccrued).add(commission),
      )
      .filter(seller::Column::Id.eq(current.seller_id.as_str()))
      .exec(&txn)
      .await?;

    ledger::append_entry(
      &txn,
      NewEntry {
        club_id: current.club_id.clone(),
        entry_type: EntryType::LicenseSale,
        amount: current.price,
        period: None,
        idempotency_key: Some(format!("license_sale:{}", current.id)),
        metadata: Some(json::json!({
          "sale_id": sale.id,
          "seller_id": current.seller_id,
        })),
      },
    )
    .await?;

    txn.commit().await?;
    info!(
      sale_id = %sale.id,
      reservation_id = %current.id,
      license_id = %current.license_id,
      "sale completed"
    );
    Ok(Outcome::Completed(sale))
  }

  /// Another caller moved the reservation first; report what it did.
  async fn after_lost_race(&self, reservation_id: &str) -> Result<Outcome> {
    let current = self.reservations().by_id(reservation_id).await?;
    match current.status {
      ReservationStatus::Completed => {
        debug!(reservation_id, "duplicate confirmation absorbed");
        Ok(Outcome::AlreadyCompleted(self.existing_sale(reservation_id).await?))
      }
      ReservationStatus::Reserved => Err(Error::PersistenceConflict),
      status => Err(Error::InvalidState(status)),
    }
  }

  /// Provider-side rejection: an open reservation is cancelled and its
  /// license released, exactly like a seller cancellation.
  pub async fn reject(
    &self,
    reference: ReservationRef<'_>,
    provider_status: &str,
  ) -> Result<Outcome> {
    let Some(current) = self.resolve(reference).await? else {
      debug!(?reference, "rejection for unknown reservation");
      return Ok(Outcome::Ignored);
    };

    let current = self.reservations().expire_if_stale(current).await?;
    match current.status {
      ReservationStatus::Reserved => {
        self.close_rejected(current, provider_status).await
      }
      ReservationStatus::Completed => {
        info!(
          reservation_id = %current.id,
          provider_status,
          "rejection after completion ignored"
        );
        Ok(Outcome::Ignored)
      }
      _ => Ok(Outcome::Rejected(current)),
    }
  }

  async fn close_rejected(
    &self,
    current: reservation::Model,
    provider_status: &str,
  ) -> Result<Outcome> {
    let (updated, moved) = self
      .reservations()
      .close(
        &current,
        ReservationStatus::Cancelled,
        Some(provider_status.to_string()),
      )
      .await?;

    if moved {
      info!(reservation_id = %updated.id, provider_status, "payment rejected");
    }
    match updated.status {
      ReservationStatus::Completed => {
        Ok(Outcome::AlreadyCompleted(self.existing_sale(&updated.id).await?))
      }
      _ => Ok(Outcome::Rejected(updated)),
    }
  }

  /// Webhook adapter. The boundary has already authenticated the request.
  pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<Outcome> {
    let reference = ReservationRef::Agreement(&event.agreement_id);
    match event.event_type {
      WebhookEventType::AgreementActivated
      | WebhookEventType::ChargeCompleted => self.confirm(reference).await,
      WebhookEventType::AgreementRejected => {
        self.reject(reference, event.status.as_deref().unwrap_or("REJECTED")).await
      }
      WebhookEventType::AgreementCancelled => {
        self.reject(reference, event.status.as_deref().unwrap_or("STOPPED")).await
      }
      WebhookEventType::AgreementExpired => {
        self.reject(reference, event.status.as_deref().unwrap_or("EXPIRED")).await
      }
      WebhookEventType::Unknown => {
        debug!(agreement_id = %event.agreement_id, "unhandled webhook event");
        Ok(Outcome::Ignored)
      }
    }
  }

  /// Retries the buyer profile for licenses sold while it was unavailable,
  /// walking the pending set in pages of `page`. Licenses whose profile
  /// cannot be fetched are skipped so later ones still get their turn; a
  /// retryable provider failure ends the run early.
  pub async fn retry_pending_buyer_info(&self, page: u64) -> Result<u32> {
    let pool = Pool::new(self.db);
    let mut enriched = 0;
    let mut skipped = 0;

    loop {
      let batch = pool.pending_registrations(page, skipped).await?;
      if batch.is_empty() {
        break;
      }

      for license in batch {
        let Some(agreement_id) = self.agreement_of(&license).await? else {
          skipped += 1;
          continue;
        };

        match self.provider.buyer_profile(&agreement_id).await {
          Ok(profile) => {
            // false: enriched concurrently, it left the pending set anyway
            if pool.enrich(&license.id, profile.into()).await? {
              enriched += 1;
            }
          }
          Err(err) if err.is_retryable() => {
            debug!("buyer profile unavailable, retrying next run: {err}");
            return Ok(enriched);
          }
          Err(err) => {
            warn!(license_id = %license.id, "buyer profile failed: {err}");
            skipped += 1;
          }
        }
      }
    }

    Ok(enriched)
  }

  async fn agreement_of(
    &self,
    license: &license::Model,
  ) -> Result<Option<String>> {
    let Some(reservation_id) = license.reservation_id.as_deref() else {
      return Ok(None);
    };
    Ok(
      self
        .reservations()
        .find(reservation_id)
        .await?
        .and_then(|r| r.provider_agreement_id),
    )
  }
}

#[cfg(test)]
mod tests {
  use futures::future::join_all;

  use super::*;
  use crate::{
    entity::{LicenseState, finance_entry},
    sv::{
      Seller,
      test_utils::{MockProvider, backdate, fixtures, test_db},
    },
  };

  struct Harness {
    db: DatabaseConnection,
    provider: MockProvider,
    config: Config,
  }

  impl Harness {
    async fn new() -> Self {
      Self {
        db: test_db::setup().await,
        provider: MockProvider::default(),
        config: Config::default(),
      }
    }

    fn payment(&self) -> Payment<'_> {
      Payment::new(&self.db, &self.provider, &self.config)
    }

    fn reservations(&self) -> Reservation<'_> {
      Reservation::new(&self.db, self.config.reservation_ttl())
    }

    /// A reservation whose buyer has gone through the provider flow.
    async fn initiated(&self) -> (reservation::Model, String) {
      let (club, seller) = fixtures::selling_club(&self.db, "starter").await;
      let reservation =
        self.reservations().start(&seller.id, &club.id).await.unwrap();
      let url = self.payment().initiate(&reservation.id, None).await.unwrap();
      assert!(url.starts_with("https://provider.test/confirm/"));
      let reservation = self.reservations().by_id(&reservation.id).await.unwrap();
      let agreement = reservation.provider_agreement_id.clone().unwrap();
      (reservation, agreement)
    }

    async fn sales(&self) -> u64 {
      sale::Entity::find().count(&self.db).await.unwrap()
    }
  }

  #[tokio::test]
  async fn test_confirm_completes_everything() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);

    let outcome =
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();
    let Outcome::Completed(sale) = outcome else {
      panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(sale.reservation_id, reservation.id);
    assert_eq!(sale.price, reservation.price);
    assert_eq!(sale.provider_agreement_id.as_deref(), Some(agreement.as_str()));
    assert_eq!(sale.created_at, sale.completed_at);
    assert!(sale.created_at >= reservation.created_at);

    let stored = h.reservations().by_id(&reservation.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Completed);
    assert_eq!(stored.provider_status.as_deref(), Some("ACTIVE"));

    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert_eq!(license.state, LicenseState::Completed);
    assert!(!license.registration_pending);
    assert_eq!(license.buyer_info.unwrap().name.as_deref(), Some("Test Buyer"));

    let club = Club::new(&h.db).by_id(&reservation.club_id).await.unwrap();
    assert_eq!(club.sales_count, 1);
    assert_eq!(club.revenue, reservation.price);

    let seller = Seller::new(&h.db).by_id(&reservation.seller_id).await.unwrap();
    assert_eq!(seller.sales_count, 1);
    assert_eq!(seller.commission_accrued, reservation.price / 10);

    let sale_lines = finance_entry::Entity::find()
      .filter(finance_entry::Column::EntryType.eq(EntryType::LicenseSale))
      .count(&h.db)
      .await
      .unwrap();
    assert_eq!(sale_lines, 1);
  }

  #[tokio::test]
  async fn test_second_confirm_returns_same_sale() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);

    let first =
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();
    let second =
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();

    assert!(matches!(first, Outcome::Completed(_)));
    assert!(matches!(second, Outcome::AlreadyCompleted(_)));
    assert_eq!(first.sale().unwrap().id, second.sale().unwrap().id);
    assert_eq!(h.sales().await, 1);
  }

  #[tokio::test]
  async fn test_webhook_then_redirect() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);

    let event = WebhookEvent {
      agreement_id: agreement.clone(),
      status: Some("ACTIVE".into()),
      event_type: WebhookEventType::AgreementActivated,
    };
    let hooked = h.payment().handle_webhook(&event).await.unwrap();
    let redirected =
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();

    assert_eq!(hooked.sale().unwrap().id, redirected.sale().unwrap().id);
    assert_eq!(h.sales().await, 1);

    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert_eq!(license.state, LicenseState::Completed);
    let club = Club::new(&h.db).by_id(&reservation.club_id).await.unwrap();
    assert_eq!(club.sales_count, 1);
  }

  #[tokio::test]
  async fn test_racing_triggers_yield_one_sale() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);

    let event = WebhookEvent {
      agreement_id: agreement.clone(),
      status: None,
      event_type: WebhookEventType::ChargeCompleted,
    };
    let payment = h.payment();
    let attempts = (0..6).map(|i| {
      let payment = &payment;
      let event = &event;
      let id = reservation.id.as_str();
      async move {
        if i % 2 == 0 {
          payment.handle_webhook(event).await
        } else {
          payment.confirm(ReservationRef::Id(id)).await
        }
      }
    });
    let outcomes = join_all(attempts).await;

    let mut ids: Vec<_> = outcomes
      .iter()
      .map(|o| o.as_ref().unwrap().sale().unwrap().id.clone())
      .collect();
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(h.sales().await, 1);

    let club = Club::new(&h.db).by_id(&reservation.club_id).await.unwrap();
    assert_eq!(club.sales_count, 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_parallel_triggers_yield_one_sale_per_reservation() {
    let (db, _dir) = test_db::setup_shared().await;
    let provider = Arc::new(MockProvider::default());
    let config = Arc::new(Config::default());
    let (club, seller) = fixtures::selling_club(&db, "starter").await;

    let reservations = Reservation::new(&db, config.reservation_ttl());
    let mut paid = Vec::new();
    for _ in 0..10 {
      let reservation = reservations.start(&seller.id, &club.id).await.unwrap();
      Payment::new(&db, provider.as_ref(), &config)
        .initiate(&reservation.id, None)
        .await
        .unwrap();
      let reservation = reservations.by_id(&reservation.id).await.unwrap();
      let agreement = reservation.provider_agreement_id.unwrap();
      provider.activate(&agreement);
      paid.push((reservation.id, agreement));
    }

    let (db_ref, provider_ref, config_ref) = (&db, &provider, &config);
    let tasks = paid.iter().flat_map(|(id, agreement)| {
      (0..6).map(move |i| {
        let (db, provider, config) =
          (db_ref.clone(), provider_ref.clone(), config_ref.clone());
        let event = WebhookEvent {
          agreement_id: agreement.clone(),
          status: None,
          event_type: WebhookEventType::ChargeCompleted,
        };
        let id = id.clone();
        tokio::spawn(async move {
          let payment = Payment::new(&db, provider.as_ref(), &config);
          // retryable failures are redelivered by the provider
          for _ in 0..5 {
            let outcome = if i % 2 == 0 {
              payment.handle_webhook(&event).await
            } else {
              payment.confirm(ReservationRef::Id(&id)).await
            };
            match outcome {
              Err(err) if err.is_retryable() => continue,
              other => return other,
            }
          }
          Err(Error::PersistenceConflict)
        })
      })
    });
    let outcomes: Vec<_> = join_all(tasks)
      .await
      .into_iter()
      .map(|joined| joined.unwrap().unwrap())
      .collect();
    assert_eq!(outcomes.len(), 60);

    let mut sale_ids: Vec<_> =
      outcomes.iter().map(|o| o.sale().unwrap().id.clone()).collect();
    sale_ids.sort();
    sale_ids.dedup();
    assert_eq!(sale_ids.len(), 10);
    assert_eq!(
      outcomes.iter().filter(|o| matches!(o, Outcome::Completed(_))).count(),
      10
    );
    assert_eq!(sale::Entity::find().count(&db).await.unwrap(), 10);

    let club = Club::new(&db).by_id(&club.id).await.unwrap();
    assert_eq!(club.sales_count, 10);
    let seller = Seller::new(&db).by_id(&seller.id).await.unwrap();
    assert_eq!(seller.sales_count, 10);
  }

  #[tokio::test]
  async fn test_rejection_cancels_and_blocks_completion() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;

    let event = WebhookEvent {
      agreement_id: agreement.clone(),
      status: None,
      event_type: WebhookEventType::AgreementRejected,
    };
    let outcome = h.payment().handle_webhook(&event).await.unwrap();
    let Outcome::Rejected(rejected) = outcome else {
      panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(rejected.status, ReservationStatus::Cancelled);
    assert_eq!(rejected.provider_status.as_deref(), Some("REJECTED"));

    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert_eq!(license.state, LicenseState::Available);

    h.provider.activate(&agreement);
    assert!(matches!(
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await,
      Err(Error::InvalidState(ReservationStatus::Cancelled))
    ));
    assert_eq!(h.sales().await, 0);

    // redelivery is harmless
    assert!(matches!(
      h.payment().handle_webhook(&event).await,
      Ok(Outcome::Rejected(_))
    ));
  }

  #[tokio::test]
  async fn test_rejection_after_completion_is_ignored() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);
    h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();

    let outcome = h
      .payment()
      .reject(ReservationRef::Agreement(&agreement), "STOPPED")
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Ignored));

    let stored = h.reservations().by_id(&reservation.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Completed);
  }

  #[tokio::test]
  async fn test_provider_down_leaves_reservation_open() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);
    h.provider.fail_status(true);

    let err = h
      .payment()
      .confirm(ReservationRef::Id(&reservation.id))
      .await
      .unwrap_err();
    assert!(err.is_retryable());

    let stored = h.reservations().by_id(&reservation.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Reserved);
    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert_eq!(license.state, LicenseState::Reserved);
    assert_eq!(h.sales().await, 0);

    h.provider.fail_status(false);
    assert!(matches!(
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await,
      Ok(Outcome::Completed(_))
    ));
  }

  #[tokio::test]
  async fn test_pending_agreement_changes_nothing() {
    let h = Harness::new().await;
    let (reservation, _) = h.initiated().await;

    let outcome =
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();
    assert!(matches!(outcome, Outcome::Pending));
    let stored = h.reservations().by_id(&reservation.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Reserved);
  }

  #[tokio::test]
  async fn test_stopped_agreement_on_redirect_cancels() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.set_status(&agreement, AgreementStatus::Stopped);

    let outcome =
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();
    assert!(matches!(outcome, Outcome::Rejected(_)));
    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert_eq!(license.state, LicenseState::Available);
  }

  #[tokio::test]
  async fn test_expired_reservation_cannot_complete() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);
    backdate(&h.db, &reservation.id).await;

    assert!(matches!(
      h.payment().confirm(ReservationRef::Agreement(&agreement)).await,
      Err(Error::InvalidState(ReservationStatus::Expired))
    ));
    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert_eq!(license.state, LicenseState::Available);
  }

  #[tokio::test]
  async fn test_unknown_references_are_ignored() {
    let h = Harness::new().await;
    assert!(matches!(
      h.payment().confirm(ReservationRef::Id("nope")).await,
      Ok(Outcome::Ignored)
    ));
    let event = WebhookEvent {
      agreement_id: "agr-unknown".into(),
      status: None,
      event_type: WebhookEventType::AgreementExpired,
    };
    assert!(matches!(
      h.payment().handle_webhook(&event).await,
      Ok(Outcome::Ignored)
    ));
  }

  #[tokio::test]
  async fn test_profile_failure_is_best_effort() {
    let h = Harness::new().await;
    let (reservation, agreement) = h.initiated().await;
    h.provider.activate(&agreement);
    h.provider.fail_profile(true);

    let outcome =
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();
    assert!(matches!(outcome, Outcome::Completed(_)));

    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert!(license.registration_pending);
    assert_eq!(license.buyer_info, Some(BuyerInfo::pending()));

    assert_eq!(h.payment().retry_pending_buyer_info(10).await.unwrap(), 0);
    h.provider.fail_profile(false);
    assert_eq!(h.payment().retry_pending_buyer_info(10).await.unwrap(), 1);

    let license = Pool::new(&h.db).by_id(&reservation.license_id).await.unwrap();
    assert!(!license.registration_pending);
    assert_eq!(license.state, LicenseState::Completed);
  }

  #[tokio::test]
  async fn test_lost_profiles_do_not_block_later_retries() {
    let h = Harness::new().await;
    let (club, seller) = fixtures::selling_club(&h.db, "starter").await;
    h.provider.fail_profile(true);

    let mut agreements = Vec::new();
    for _ in 0..3 {
      let reservation =
        h.reservations().start(&seller.id, &club.id).await.unwrap();
      h.payment().initiate(&reservation.id, None).await.unwrap();
      let agreement = h
        .reservations()
        .by_id(&reservation.id)
        .await
        .unwrap()
        .provider_agreement_id
        .unwrap();
      h.provider.activate(&agreement);
      h.payment().confirm(ReservationRef::Id(&reservation.id)).await.unwrap();
      agreements.push(agreement);
    }

    h.provider.fail_profile(false);
    h.provider.lose_profile(&agreements[0]);
    h.provider.lose_profile(&agreements[1]);

    // pages of one: the two lost profiles are stepped over
    assert_eq!(h.payment().retry_pending_buyer_info(1).await.unwrap(), 1);
    let pending = Pool::new(&h.db).pending_registrations(10, 0).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(h.payment().retry_pending_buyer_info(1).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_initiate_survives_provider_outage() {
    let h = Harness::new().await;
    let (club, seller) = fixtures::selling_club(&h.db, "starter").await;
    let reservation = h.reservations().start(&seller.id, &club.id).await.unwrap();

    h.provider.fail_create(true);
    let err = h.payment().initiate(&reservation.id, None).await.unwrap_err();
    assert!(err.is_retryable());
    let stored = h.reservations().by_id(&reservation.id).await.unwrap();
    assert_eq!(stored.provider_agreement_id, None);

    h.provider.fail_create(false);
    assert!(h.payment().initiate(&reservation.id, None).await.is_ok());
  }

  #[tokio::test]
  async fn test_initiate_only_once() {
    let h = Harness::new().await;
    let (reservation, _) = h.initiated().await;

    assert!(matches!(
      h.payment().initiate(&reservation.id, None).await,
      Err(Error::InvalidTransition(_))
    ));
    assert_eq!(h.provider.created(), 1);
  }

  #[test]
  fn test_webhook_payload() {
    let event: WebhookEvent = json::from_str(
      r#"{"agreementId":"agr-1","status":"ACTIVE","eventType":"AGREEMENT_ACTIVATED"}"#,
    )
    .unwrap();
    assert_eq!(event.event_type, WebhookEventType::AgreementActivated);

    let event: WebhookEvent = json::from_str(
      r#"{"agreementId":"agr-1","eventType":"SOMETHING_NEW"}"#,
    )
    .unwrap();
    assert_eq!(event.event_type, WebhookEventType::Unknown);
    assert_eq!(event.status, None);
  }
}
