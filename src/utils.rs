use sha2::{Digest, Sha256};

use crate::prelude::*;

pub fn format_date(date: DateTime) -> String {
  date.format("%d.%m.%Y %H:%M").to_string()
}

/// Formats minor units (øre) as kroner with two decimals.
pub fn format_amount(minor: i64) -> String {
  let sign = if minor < 0 { "-" } else { "" };
  let abs = minor.unsigned_abs();
  format!("{sign}{}.{:02} NOK", abs / 100, abs % 100)
}

/// Compares secrets by digest so the comparison time does not depend on how
/// many leading bytes match.
pub fn secret_eq(given: &str, expected: &str) -> bool {
  !expected.is_empty()
    && Sha256::digest(given.as_bytes()) == Sha256::digest(expected.as_bytes())
}
