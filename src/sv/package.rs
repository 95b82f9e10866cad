//! Static package catalogue. Pricing is a pure lookup, amounts in øre.

use crate::prelude::*;

/// 1 NOK = 100 øre
pub const ORE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
  pub id: &'static str,
  pub name: &'static str,
  pub license_count: u32,
  pub license_price: i64,
  pub activation_fee: i64,
  pub monthly_fee: i64,
  pub validity_days: i64,
  pub agent_activation_percent: i64,
  pub agent_monthly_percent: i64,
}

pub const PACKAGES: &[Package] = &[
  Package {
    id: "starter",
    name: "Starter",
    license_count: 25,
    license_price: 499 * ORE,
    activation_fee: 1_990 * ORE,
    monthly_fee: 490 * ORE,
    validity_days: 365,
    agent_activation_percent: 20,
    agent_monthly_percent: 0,
  },
  Package {
    id: "standard",
    name: "Standard",
    license_count: 100,
    license_price: 449 * ORE,
    activation_fee: 4_990 * ORE,
    monthly_fee: 990 * ORE,
    validity_days: 365,
    agent_activation_percent: 20,
    agent_monthly_percent: 10,
  },
  Package {
    id: "premium",
    name: "Premium",
    license_count: 300,
    license_price: 399 * ORE,
    activation_fee: 9_990 * ORE,
    monthly_fee: 1_990 * ORE,
    validity_days: 365,
    agent_activation_percent: 25,
    agent_monthly_percent: 10,
  },
];

pub fn find(id: &str) -> Result<&'static Package> {
  PACKAGES
    .iter()
    .find(|p| p.id == id)
    .ok_or_else(|| Error::InvalidArgs(format!("unknown package `{id}`")))
}

impl Package {
  pub fn validity(&self) -> TimeDelta {
    TimeDelta::days(self.validity_days)
  }

  pub fn percent_of(amount: i64, percent: i64) -> i64 {
    amount * percent / 100
  }
}
