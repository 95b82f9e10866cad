use std::sync::Arc;

use async_trait::async_trait;
use tokio::time;

use crate::{
  plugins::Plugin,
  prelude::*,
  state::AppState,
  utils::{format_amount, format_date},
};

const BUYER_INFO_BATCH: u64 = 50;

/// Interval-driven ledger run. Running it more often than monthly is safe,
/// each club gets at most one debt line per period.
pub struct MonthlyDebt;

#[async_trait]
impl Plugin for MonthlyDebt {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let every = app.config.ledger_interval;
    if every.is_zero() {
      info!("MonthlyDebt disabled via config (0 interval)");
      return Ok(());
    }

    info!("MonthlyDebt started (interval: {})", humantime::format_duration(every));
    let mut interval = time::interval(every);

    loop {
      interval.tick().await;

      let ledger = app.sv().ledger;
      if let Err(err) = ledger.process_all_clubs().await {
        error!("monthly debt run failed: {err}");
      }

      match ledger.list_overdue_clubs().await {
        Ok(overdue) => {
          for club in overdue {
            warn!(
              club_id = %club.club_id,
              "{} owes {} for {} (due {})",
              club.name,
              format_amount(club.outstanding),
              club.period,
              format_date(club.due_date)
            );
          }
        }
        Err(err) => error!("overdue scan failed: {err}"),
      }
    }
  }
}

pub struct ExpireUnsold;

#[async_trait]
impl Plugin for ExpireUnsold {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut interval = time::interval(Duration::from_secs(3600));

    loop {
      interval.tick().await;

      match app.sv().pool.expire_unsold(now()).await {
        Ok(0) => debug!("no unsold licenses lapsed"),
        Ok(count) => info!("expired {count} unsold licenses"),
        Err(err) => error!("expire unsold failed: {err}"),
      }
    }
  }
}

/// Retries buyer profiles for sales completed while the provider profile
/// endpoint was failing.
pub struct BuyerInfoRetry;

#[async_trait]
impl Plugin for BuyerInfoRetry {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let every = app.config.buyer_info_retry_interval;
    if every.is_zero() {
      info!("BuyerInfoRetry disabled via config (0 interval)");
      return Ok(());
    }

    let mut interval = time::interval(every);

    loop {
      interval.tick().await;

      match app.sv().payment.retry_pending_buyer_info(BUYER_INFO_BATCH).await {
        Ok(0) => {}
        Ok(count) => info!("enriched buyer info for {count} licenses"),
        Err(err) => error!("buyer info retry failed: {err}"),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::Config,
    sv::{
      Payment, Pool, Reservation,
      payment::ReservationRef,
      test_utils::{MockProvider, fixtures, test_db},
    },
  };

  #[tokio::test]
  async fn test_buyer_info_retry_runs_at_boot() {
    let provider = Arc::new(MockProvider::default());
    let config = Config {
      buyer_info_retry_interval: Duration::from_secs(3600),
      ..Config::default()
    };
    let app = Arc::new(AppState::with_provider(
      test_db::setup().await,
      config,
      provider.clone(),
    ));

    // a sale left pending by an earlier process
    let (club, seller) = fixtures::selling_club(&app.db, "starter").await;
    let reservation = Reservation::new(&app.db, app.config.reservation_ttl())
      .start(&seller.id, &club.id)
      .await
      .unwrap();
    let payment = Payment::new(&app.db, provider.as_ref(), &app.config);
    payment.initiate(&reservation.id, None).await.unwrap();
    let agreement = Reservation::new(&app.db, app.config.reservation_ttl())
      .by_id(&reservation.id)
      .await
      .unwrap()
      .provider_agreement_id
      .unwrap();
    provider.activate(&agreement);
    provider.fail_profile(true);
    payment.confirm(ReservationRef::Id(&reservation.id)).await.unwrap();
    provider.fail_profile(false);

    let job = tokio::spawn({
      let app = app.clone();
      async move { BuyerInfoRetry.start(app).await }
    });

    let mut pending = true;
    for _ in 0..100 {
      let license =
        Pool::new(&app.db).by_id(&reservation.license_id).await.unwrap();
      pending = license.registration_pending;
      if !pending {
        break;
      }
      time::sleep(Duration::from_millis(20)).await;
    }
    job.abort();
    assert!(!pending);
  }
}
