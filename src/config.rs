use std::env;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub port: u16,
  pub base_url: String,
  pub reservation_ttl: Duration,
  pub provider_url: String,
  pub provider_token: String,
  pub provider_timeout: Duration,
  pub webhook_token: String,
  pub cron_secret: String,
  pub debt_due_days: u32,
  pub seller_commission_percent: i64,
  /// Zero disables the in-process ledger job.
  pub ledger_interval: Duration,
  pub buyer_info_retry_interval: Duration,
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    Ok(Self {
      database_url: var_or("DATABASE_URL", "sqlite:sales.db?mode=rwc"),
      port: parse_or("PORT", 3000)?,
      base_url: var_or("BASE_URL", "http://localhost:3000"),
      reservation_ttl: duration_or("RESERVATION_TTL", "10m")?,
      provider_url: required("PROVIDER_URL")?,
      provider_token: required("PROVIDER_TOKEN")?,
      provider_timeout: duration_or("PROVIDER_TIMEOUT", "10s")?,
      webhook_token: required("WEBHOOK_TOKEN")?,
      cron_secret: required("CRON_SECRET")?,
      debt_due_days: parse_or("DEBT_DUE_DAYS", 14)?,
      seller_commission_percent: parse_or("SELLER_COMMISSION_PERCENT", 10)?,
      ledger_interval: duration_or("LEDGER_INTERVAL", "6h")?,
      buyer_info_retry_interval: duration_or(
        "BUYER_INFO_RETRY_INTERVAL",
        "15m",
      )?,
    })
  }

  pub fn reservation_ttl(&self) -> TimeDelta {
    TimeDelta::from_std(self.reservation_ttl)
      .unwrap_or_else(|_| TimeDelta::minutes(10))
  }

  pub fn quote_url(&self, reservation_id: &str) -> String {
    format!("{}/quote/{}", self.base_url.trim_end_matches('/'), reservation_id)
  }

  pub fn return_url(&self, reservation_id: &str) -> String {
    format!(
      "{}/sales/complete?reservation={}",
      self.base_url.trim_end_matches('/'),
      reservation_id
    )
  }
}

#[cfg(test)]
impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: "sqlite::memory:".into(),
      port: 0,
      base_url: "https://sales.test".into(),
      reservation_ttl: Duration::from_secs(600),
      provider_url: "https://provider.test".into(),
      provider_token: "provider-token".into(),
      provider_timeout: Duration::from_secs(1),
      webhook_token: "webhook-token".into(),
      cron_secret: "cron-secret".into(),
      debt_due_days: 14,
      seller_commission_percent: 10,
      ledger_interval: Duration::ZERO,
      buyer_info_retry_interval: Duration::ZERO,
    }
  }
}

fn var_or(key: &str, default: &str) -> String {
  env::var(key).unwrap_or_else(|_| default.into())
}

fn required(key: &str) -> anyhow::Result<String> {
  env::var(key).with_context(|| format!("{key} not set"))
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
  T: std::str::FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match env::var(key) {
    Ok(raw) => raw.trim().parse().with_context(|| format!("invalid {key}")),
    Err(_) => Ok(default),
  }
}

fn duration_or(key: &str, default: &str) -> anyhow::Result<Duration> {
  let raw = var_or(key, default);
  humantime::parse_duration(raw.trim())
    .with_context(|| format!("invalid {key}: {raw}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn urls_ignore_trailing_slash() {
    let config =
      Config { base_url: "https://sales.test/".into(), ..Default::default() };
    assert_eq!(config.quote_url("r1"), "https://sales.test/quote/r1");
    assert_eq!(
      config.return_url("r1"),
      "https://sales.test/sales/complete?reservation=r1"
    );
  }

  #[test]
  fn ttl_as_delta() {
    let config = Config {
      reservation_ttl: Duration::from_secs(90),
      ..Default::default()
    };
    assert_eq!(config.reservation_ttl(), TimeDelta::seconds(90));
  }
}
