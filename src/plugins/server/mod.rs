mod error;
mod extract;
mod handlers;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
  Router,
  routing::{get, post},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

pub use self::error::ErrorBody;

type Routes = Router<Arc<AppState>>;

/// Routes reachable by sellers and buyers. These are the ones rate limited.
fn sales_routes() -> Routes {
  Router::new()
    .route("/sales/start", post(handlers::start_sale))
    .route("/sales/cancel", post(handlers::cancel_sale))
    .route("/sales/reservations", get(handlers::my_reservations))
    .route("/sales/reservation/{id}", get(handlers::quote))
    .route("/sales/initiate-payment", post(handlers::initiate_payment))
    .route("/sales/complete-payment", post(handlers::complete_payment))
}

fn service_routes() -> Routes {
  Router::new()
    .route("/health", get(handlers::health))
    .route("/webhooks/payment-provider", post(handlers::payment_webhook))
    .route(
      "/cron/monthly-debt",
      get(handlers::monthly_debt).post(handlers::monthly_debt),
    )
    .route(
      "/admin/clubs",
      get(handlers::list_clubs).post(handlers::create_club),
    )
    .route(
      "/admin/clubs/{id}/sellers",
      get(handlers::list_sellers).post(handlers::create_seller),
    )
    .route("/admin/clubs/{id}/activate", post(handlers::activate_package))
    .route("/admin/clubs/{id}/suspend", post(handlers::suspend_club))
    .route("/admin/clubs/{id}/licenses", get(handlers::license_stats))
    .route("/admin/clubs/{id}/payments", post(handlers::record_payment))
    .route("/admin/overdue", get(handlers::overdue))
}

fn router(app: Arc<AppState>, sales: Routes) -> Router {
  Router::new()
    .merge(sales)
    .merge(service_routes())
    .layer(
      ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
          .allow_origin(Any)
          .allow_methods(Any)
          .allow_headers(Any),
      ),
    )
    .with_state(app)
}

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(30)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();

    tokio::spawn(async move {
      loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        governor_limiter.retain_recent();
      }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
    let sales = sales_routes().layer(GovernorLayer::new(governor_conf));
    let router = router(app, sales)
      .into_make_service_with_connect_info::<SocketAddr>();

    info!("HTTP Server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, router).await.context("Server error")?;

    Ok(())
  }
}
