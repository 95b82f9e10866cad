//! Recurring-payment provider integration.
//!
//! The provider is consumed through [`PaymentProvider`] with three calls:
//! create an agreement, read its status and read the buyer profile. The HTTP
//! client below talks to the provider REST API; tests swap in a mock.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{entity::BuyerInfo, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgreementStatus {
  Pending,
  Active,
  Stopped,
  Expired,
}

impl AgreementStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Active => "ACTIVE",
      Self::Stopped => "STOPPED",
      Self::Expired => "EXPIRED",
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementRequest {
  /// Monthly price in øre
  pub amount: i64,
  pub currency: String,
  pub product_name: String,
  pub merchant_reference: String,
  pub return_url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
  pub agreement_id: String,
  pub confirmation_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerProfile {
  pub name: Option<String>,
  pub email: Option<String>,
  pub phone_number: Option<String>,
}

impl From<BuyerProfile> for BuyerInfo {
  fn from(profile: BuyerProfile) -> Self {
    Self {
      name: profile.name,
      email: profile.email,
      phone: profile.phone_number,
      registration_pending: false,
    }
  }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
  async fn create_agreement(&self, req: AgreementRequest) -> Result<Agreement>;

  async fn agreement_status(&self, agreement_id: &str)
  -> Result<AgreementStatus>;

  async fn buyer_profile(&self, agreement_id: &str) -> Result<BuyerProfile>;
}

#[derive(Debug, Deserialize)]
struct AgreementView {
  status: AgreementStatus,
}

/// REST client for the provider's recurring API.
#[derive(Clone)]
pub struct RecurringClient {
  client: Client,
  base_url: String,
  token: String,
}

impl RecurringClient {
  pub fn new(
    base_url: String,
    token: String,
    timeout: Duration,
  ) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build provider HTTP client")?;
    Ok(Self { client, base_url: base_url.trim_end_matches('/').into(), token })
  }

  async fn read<T: DeserializeOwned>(
    &self,
    response: reqwest::Response,
  ) -> Result<T> {
    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
      return Err(Error::UpstreamUnavailable(format!("provider {status}")));
    }
    if status == StatusCode::NOT_FOUND {
      return Err(Error::InvalidArgs("unknown agreement".into()));
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(Error::Internal(format!("provider {status}: {body}")));
    }

    response.json().await.map_err(|e| {
      Error::UpstreamUnavailable(format!("Failed to parse response: {e}"))
    })
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let response = self
      .client
      .get(format!("{}{}", self.base_url, path))
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(|e| Error::UpstreamUnavailable(format!("Request failed: {e}")))?;
    self.read(response).await
  }
}

#[async_trait]
impl PaymentProvider for RecurringClient {
  async fn create_agreement(&self, req: AgreementRequest) -> Result<Agreement> {
    let response = self
      .client
      .post(format!("{}/agreements", self.base_url))
      .bearer_auth(&self.token)
      .header("Idempotency-Key", &req.merchant_reference)
      .json(&req)
      .send()
      .await
      .map_err(|e| Error::UpstreamUnavailable(format!("Request failed: {e}")))?;
    self.read(response).await
  }

  async fn agreement_status(
    &self,
    agreement_id: &str,
  ) -> Result<AgreementStatus> {
    let view: AgreementView =
      self.get(&format!("/agreements/{agreement_id}")).await?;
    Ok(view.status)
  }

  async fn buyer_profile(&self, agreement_id: &str) -> Result<BuyerProfile> {
    self.get(&format!("/agreements/{agreement_id}/profile")).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn agreement_status_wire_format() {
    let view: AgreementView = json::from_str(r#"{"status":"ACTIVE"}"#).unwrap();
    assert_eq!(view.status, AgreementStatus::Active);
    assert_eq!(AgreementStatus::Stopped.as_str(), "STOPPED");
  }

  #[test]
  fn request_omits_missing_phone() {
    let req = AgreementRequest {
      amount: 49_900,
      currency: "NOK".into(),
      product_name: "Starter".into(),
      merchant_reference: "r1".into(),
      return_url: "https://sales.test/sales/complete?reservation=r1".into(),
      phone_number: None,
    };
    let body = json::to_value(&req).unwrap();
    assert_eq!(body["merchantReference"], "r1");
    assert!(body.get("phoneNumber").is_none());
  }

  #[test]
  fn profile_into_buyer_info() {
    let info: BuyerInfo = BuyerProfile {
      name: Some("Kari".into()),
      email: None,
      phone_number: Some("4790000000".into()),
    }
    .into();
    assert!(!info.registration_pending);
    assert_eq!(info.phone.as_deref(), Some("4790000000"));
  }
}
