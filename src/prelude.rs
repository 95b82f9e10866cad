pub use std::{collections::HashMap, sync::Arc, time::Duration};

pub use anyhow::Context;
pub use chrono::{
  Datelike, NaiveDateTime as DateTime, TimeDelta, TimeZone, Utc,
};
pub use sea_orm::{
  ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection,
  EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
  TransactionTrait,
};
pub use tracing::{debug, error, info, trace, warn};

pub use crate::error::{Error, Result};

pub fn now() -> DateTime {
  Utc::now().naive_utc()
}

pub fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}
