use sea_orm::{DbErr, SqlErr};

use crate::entity::ReservationStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("club not found")]
  ClubNotFound,
  #[error("seller not found")]
  SellerNotFound,
  #[error("license not found")]
  LicenseNotFound,
  #[error("reservation not found")]
  ReservationNotFound,
  #[error("sale not found")]
  SaleNotFound,
  #[error("no license available")]
  NoLicenseAvailable,
  #[error("reservation is {0}")]
  InvalidState(ReservationStatus),
  #[error("invalid state: {0}")]
  InvalidTransition(&'static str),
  #[error("forbidden")]
  Forbidden,
  #[error("unauthorized")]
  Unauthorized,
  #[error("operation already applied")]
  DuplicateOperation,
  #[error("payment provider unavailable: {0}")]
  UpstreamUnavailable(String),
  #[error("concurrent update lost the race")]
  PersistenceConflict,
  #[error("invalid arguments: {0}")]
  InvalidArgs(String),
  #[error("internal error: {0}")]
  Internal(String),
  #[error("database error: {0}")]
  Db(#[from] DbErr),
}

impl Error {
  /// Stable machine-readable code, surfaced to API clients.
  pub fn code(&self) -> &'static str {
    match self {
      Self::ClubNotFound
      | Self::SellerNotFound
      | Self::LicenseNotFound
      | Self::ReservationNotFound
      | Self::SaleNotFound => "NOT_FOUND",
      Self::NoLicenseAvailable => "NO_LICENSE_AVAILABLE",
      Self::InvalidState(_) | Self::InvalidTransition(_) => "INVALID_STATE",
      Self::Forbidden => "FORBIDDEN",
      Self::Unauthorized => "UNAUTHORIZED",
      Self::DuplicateOperation => "DUPLICATE_OPERATION",
      Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
      Self::PersistenceConflict => "PERSISTENCE_CONFLICT",
      Self::InvalidArgs(_) => "INVALID_ARGS",
      Self::Internal(_) | Self::Db(_) => "INTERNAL",
    }
  }

  /// The caller may repeat the whole operation; the core keeps retries safe.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::UpstreamUnavailable(_) | Self::PersistenceConflict)
  }

  pub fn user_message(&self) -> String {
    match self {
      Self::ClubNotFound => "Club not found".into(),
      Self::SellerNotFound => "You are not registered with a club".into(),
      Self::LicenseNotFound => "License not found".into(),
      Self::ReservationNotFound => "Reservation not found".into(),
      Self::SaleNotFound => "Sale not found".into(),
      Self::NoLicenseAvailable => "No licenses available".into(),
      Self::InvalidState(ReservationStatus::Expired) => {
        "Reservation expired".into()
      }
      Self::InvalidState(ReservationStatus::Cancelled) => {
        "Reservation already cancelled".into()
      }
      Self::InvalidState(ReservationStatus::Completed) => {
        "Reservation already completed".into()
      }
      Self::InvalidState(ReservationStatus::Reserved) => {
        "Reservation is still awaiting payment".into()
      }
      Self::InvalidTransition(msg) => msg.to_string(),
      Self::Forbidden => "You do not have access to this resource".into(),
      Self::Unauthorized => "Authentication required".into(),
      Self::InvalidArgs(msg) => msg.clone(),
      Self::DuplicateOperation
      | Self::UpstreamUnavailable(_)
      | Self::PersistenceConflict
      | Self::Internal(_)
      | Self::Db(_) => "Something went wrong, please try again".into(),
    }
  }

  /// Insert hit a unique index guarding an idempotency key.
  pub fn from_insert(err: DbErr) -> Self {
    match err.sql_err() {
      Some(SqlErr::UniqueConstraintViolation(_)) => Self::DuplicateOperation,
      _ => Self::Db(err),
    }
  }
}
