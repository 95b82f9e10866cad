//! Maps [`Error`] to HTTP responses.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
  pub error: String,
  pub message: String,
}

pub fn status_of(err: &Error) -> StatusCode {
  match err {
    // a seller without a club is a bad request, not a missing resource
    Error::SellerNotFound => StatusCode::BAD_REQUEST,
    Error::ClubNotFound
    | Error::LicenseNotFound
    | Error::ReservationNotFound
    | Error::SaleNotFound => StatusCode::NOT_FOUND,
    Error::NoLicenseAvailable
    | Error::InvalidState(_)
    | Error::InvalidTransition(_)
    | Error::InvalidArgs(_) => StatusCode::BAD_REQUEST,
    Error::Forbidden => StatusCode::FORBIDDEN,
    Error::Unauthorized => StatusCode::UNAUTHORIZED,
    Error::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    Error::PersistenceConflict => StatusCode::CONFLICT,
    Error::DuplicateOperation | Error::Internal(_) | Error::Db(_) => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = status_of(&self);
    if status.is_server_error() {
      if self.is_retryable() {
        warn!(code = self.code(), "retryable failure: {self}");
      } else {
        error!(code = self.code(), "request failed: {self}");
      }
    }

    let body =
      ErrorBody { error: self.code().to_string(), message: self.user_message() };
    (status, Json(body)).into_response()
  }
}
