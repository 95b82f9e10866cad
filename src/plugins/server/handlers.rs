use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use serde::{Deserialize, Serialize};

use super::extract::{Admin, CronAuth, SellerId, WebhookAuth};
use crate::{
  entity::{ReservationStatus, club, finance_entry, reservation, seller},
  prelude::*,
  state::AppState,
  sv::{
    club::Activation,
    ledger::{LedgerReport, OverdueClub, Period},
    package,
    payment::{Outcome, ReservationRef, WebhookEvent},
    pool::PoolStats,
  },
  utils::format_amount,
};

type App = State<Arc<AppState>>;

#[derive(Serialize)]
pub struct Health {
  status: &'static str,
  version: &'static str,
}

pub async fn health() -> Json<Health> {
  Json(Health { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Started {
  pub reservation_id: String,
  pub expires_at: DateTime,
  pub license_quote_url: String,
  pub price: i64,
}

pub async fn start_sale(
  State(app): App,
  SellerId(seller_id): SellerId,
) -> Result<Json<Started>> {
  let sv = app.sv();
  let seller = sv.seller.by_id(&seller_id).await?;
  let reservation = sv.reservation.start(&seller.id, &seller.club_id).await?;

  Ok(Json(Started {
    license_quote_url: app.config.quote_url(&reservation.id),
    reservation_id: reservation.id,
    expires_at: reservation.expires_at,
    price: reservation.price,
  }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReq {
  pub reservation_id: String,
}

pub async fn cancel_sale(
  State(app): App,
  SellerId(seller_id): SellerId,
  Json(req): Json<ReservationReq>,
) -> Result<Json<reservation::Model>> {
  let cancelled =
    app.sv().reservation.cancel(&req.reservation_id, &seller_id).await?;
  Ok(Json(cancelled))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
  pub status: Option<ReservationStatus>,
}

pub async fn my_reservations(
  State(app): App,
  SellerId(seller_id): SellerId,
  Query(query): Query<ListQuery>,
) -> Result<Json<Vec<reservation::Model>>> {
  Ok(Json(app.sv().reservation.by_seller(&seller_id, query.status).await?))
}

/// What the buyer sees on the quote page. No buyer or seller details.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
  pub reservation_id: String,
  pub status: ReservationStatus,
  pub club_name: String,
  pub package_name: String,
  pub price: i64,
  pub price_display: String,
  pub expires_at: DateTime,
}

pub async fn quote(
  State(app): App,
  Path(id): Path<String>,
) -> Result<Json<Quote>> {
  let sv = app.sv();
  let reservation = sv.reservation.check_and_expire(&id).await?;
  if matches!(
    reservation.status,
    ReservationStatus::Cancelled | ReservationStatus::Expired
  ) {
    return Err(Error::InvalidState(reservation.status));
  }

  let club = sv.club.by_id(&reservation.club_id).await?;
  let license = sv.pool.by_id(&reservation.license_id).await?;
  let package = package::find(&license.package_id)?;

  Ok(Json(Quote {
    reservation_id: reservation.id,
    status: reservation.status,
    club_name: club.name,
    package_name: package.name.to_string(),
    price: reservation.price,
    price_display: format_amount(reservation.price),
    expires_at: reservation.expires_at,
  }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateReq {
  pub reservation_id: String,
  pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiated {
  pub confirmation_url: String,
}

pub async fn initiate_payment(
  State(app): App,
  Json(req): Json<InitiateReq>,
) -> Result<Json<Initiated>> {
  let confirmation_url =
    app.sv().payment.initiate(&req.reservation_id, req.phone_number).await?;
  Ok(Json(Initiated { confirmation_url }))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
  pub status: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sale_id: Option<String>,
}

impl Confirmation {
  fn of(outcome: &Outcome) -> Self {
    Self {
      status: outcome.label().to_string(),
      sale_id: outcome.sale().map(|s| s.id.clone()),
    }
  }
}

/// Buyer redirect back from the provider.
pub async fn complete_payment(
  State(app): App,
  Json(req): Json<ReservationReq>,
) -> Result<(StatusCode, Json<Confirmation>)> {
  let outcome =
    app.sv().payment.confirm(ReservationRef::Id(&req.reservation_id)).await?;

  match &outcome {
    Outcome::Completed(_)
    | Outcome::AlreadyCompleted(_)
    | Outcome::Ignored => {
      Ok((StatusCode::OK, Json(Confirmation::of(&outcome))))
    }
    Outcome::Pending => {
      Ok((StatusCode::ACCEPTED, Json(Confirmation::of(&outcome))))
    }
    Outcome::Rejected(reservation) => {
      Err(Error::InvalidState(reservation.status))
    }
  }
}

/// Provider webhook. Terminal outcomes are acknowledged with 200 so the
/// provider stops redelivering; retryable failures are surfaced so it
/// tries again.
pub async fn payment_webhook(
  State(app): App,
  _: WebhookAuth,
  Json(event): Json<WebhookEvent>,
) -> Result<Json<Confirmation>> {
  debug!(
    agreement_id = %event.agreement_id,
    event_type = ?event.event_type,
    "webhook received"
  );

  match app.sv().payment.handle_webhook(&event).await {
    Ok(outcome) => Ok(Json(Confirmation::of(&outcome))),
    Err(Error::InvalidState(status)) => {
      info!(
        agreement_id = %event.agreement_id,
        %status,
        "webhook for closed reservation acknowledged"
      );
      Ok(Json(Confirmation { status: status.to_string(), sale_id: None }))
    }
    Err(err) => Err(err),
  }
}

pub async fn monthly_debt(
  State(app): App,
  _: CronAuth,
) -> Result<Json<LedgerReport>> {
  info!("monthly debt triggered externally");
  Ok(Json(app.sv().ledger.process_all_clubs().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClub {
  pub name: String,
  pub agent_id: Option<String>,
}

pub async fn create_club(
  State(app): App,
  Admin(admin): Admin,
  Json(req): Json<NewClub>,
) -> Result<Json<club::Model>> {
  let club = app.sv().club.create(&req.name, req.agent_id).await?;
  info!(club_id = %club.id, admin, "club created");
  Ok(Json(club))
}

pub async fn list_clubs(
  State(app): App,
  _: Admin,
) -> Result<Json<Vec<club::Model>>> {
  Ok(Json(app.sv().club.all().await?))
}

pub async fn suspend_club(
  State(app): App,
  Admin(admin): Admin,
  Path(club_id): Path<String>,
) -> Result<Json<club::Model>> {
  let club = app.sv().club.suspend(&club_id).await?;
  info!(club_id, admin, "club suspended");
  Ok(Json(club))
}

pub async fn list_sellers(
  State(app): App,
  _: Admin,
  Path(club_id): Path<String>,
) -> Result<Json<Vec<seller::Model>>> {
  let sv = app.sv();
  sv.club.by_id(&club_id).await?;
  Ok(Json(sv.seller.by_club(&club_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSeller {
  pub seller_id: String,
  pub name: String,
}

pub async fn create_seller(
  State(app): App,
  _: Admin,
  Path(club_id): Path<String>,
  Json(req): Json<NewSeller>,
) -> Result<Json<seller::Model>> {
  Ok(Json(app.sv().seller.create(&req.seller_id, &club_id, &req.name).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateReq {
  pub package_id: String,
}

pub async fn activate_package(
  State(app): App,
  _: Admin,
  Path(club_id): Path<String>,
  Json(req): Json<ActivateReq>,
) -> Result<Json<Activation>> {
  Ok(Json(app.sv().club.activate_package(&club_id, &req.package_id).await?))
}

pub async fn license_stats(
  State(app): App,
  _: Admin,
  Path(club_id): Path<String>,
) -> Result<Json<PoolStats>> {
  let sv = app.sv();
  sv.club.by_id(&club_id).await?;
  Ok(Json(sv.pool.stats(&club_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PaymentReq {
  pub year: i32,
  pub month: u32,
  pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentRecorded {
  pub entry: finance_entry::Model,
  pub balance: i64,
}

pub async fn record_payment(
  State(app): App,
  _: Admin,
  Path(club_id): Path<String>,
  Json(req): Json<PaymentReq>,
) -> Result<Json<PaymentRecorded>> {
  let ledger = app.sv().ledger;
  let period = Period::new(req.year, req.month)?;
  let entry = ledger.record_payment(&club_id, period, req.amount).await?;
  let balance = ledger.balance(&club_id).await?;
  Ok(Json(PaymentRecorded { entry, balance }))
}

pub async fn overdue(
  State(app): App,
  _: Admin,
) -> Result<Json<Vec<OverdueClub>>> {
  Ok(Json(app.sv().ledger.list_overdue_clubs().await?))
}
