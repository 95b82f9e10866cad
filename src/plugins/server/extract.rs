//! Request identity and shared-secret guards.
//!
//! User identity is resolved by the auth layer in front of this service and
//! forwarded as `x-user-id` / `x-user-role`.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};

use crate::{prelude::*, state::AppState, utils::secret_eq};

pub const USER_ID: &str = "x-user-id";
pub const USER_ROLE: &str = "x-user-role";
pub const CRON_SECRET: &str = "x-cron-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Seller,
  Admin,
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

fn identity(headers: &HeaderMap) -> Result<(String, Role)> {
  let user_id = header(headers, USER_ID).ok_or(Error::Unauthorized)?;
  let role = match header(headers, USER_ROLE) {
    Some("seller") => Role::Seller,
    Some("admin") => Role::Admin,
    Some(_) => return Err(Error::Forbidden),
    None => return Err(Error::Unauthorized),
  };
  Ok((user_id.to_string(), role))
}

/// Authenticated seller, carrying the seller id.
#[derive(Debug, Clone)]
pub struct SellerId(pub String);

impl FromRequestParts<Arc<AppState>> for SellerId {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    _: &Arc<AppState>,
  ) -> Result<Self, Self::Rejection> {
    match identity(&parts.headers)? {
      (id, Role::Seller) => Ok(Self(id)),
      _ => Err(Error::Forbidden),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Admin(pub String);

impl FromRequestParts<Arc<AppState>> for Admin {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    _: &Arc<AppState>,
  ) -> Result<Self, Self::Rejection> {
    match identity(&parts.headers)? {
      (id, Role::Admin) => Ok(Self(id)),
      _ => Err(Error::Forbidden),
    }
  }
}

/// Provider webhook, authenticated with the shared bearer token.
pub struct WebhookAuth;

impl FromRequestParts<Arc<AppState>> for WebhookAuth {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self, Self::Rejection> {
    let token = header(&parts.headers, AUTHORIZATION.as_str())
      .and_then(|v| v.strip_prefix("Bearer "))
      .ok_or(Error::Unauthorized)?;

    if !secret_eq(token, &app.config.webhook_token) {
      warn!("webhook rejected: bad token");
      return Err(Error::Unauthorized);
    }
    Ok(Self)
  }
}

/// Scheduler trigger, authenticated with the cron secret header.
pub struct CronAuth;

impl FromRequestParts<Arc<AppState>> for CronAuth {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self, Self::Rejection> {
    let given = header(&parts.headers, CRON_SECRET).ok_or(Error::Unauthorized)?;
    if !secret_eq(given, &app.config.cron_secret) {
      warn!("cron trigger rejected: bad secret");
      return Err(Error::Unauthorized);
    }
    Ok(Self)
  }
}
