//! Club finance ledger and the monthly debt batch.
//!
//! Entries are append-only. Recurring lines carry an idempotency key backed
//! by a unique index, so a re-run of the batch inside the same period cannot
//! post twice even when two runs race.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  entity::{
    CommissionStatus, CommissionType, EntryType, PackageStatus, club,
    commission, finance_entry,
  },
  prelude::*,
  sv::package::{self, Package},
};

/// A (year, month) billing cycle key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
pub struct Period {
  pub year: i32,
  pub month: u32,
}

impl Period {
  pub fn new(year: i32, month: u32) -> Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(Error::InvalidArgs(format!("invalid month {month}")));
    }
    Ok(Self { year, month })
  }

  pub fn of(date: NaiveDate) -> Self {
    Self { year: date.year(), month: date.month() }
  }

  pub fn prev(self) -> Self {
    match self.month {
      1 => Self { year: self.year - 1, month: 12 },
      m => Self { year: self.year, month: m - 1 },
    }
  }

  pub fn next(self) -> Self {
    match self.month {
      12 => Self { year: self.year + 1, month: 1 },
      m => Self { year: self.year, month: m + 1 },
    }
  }

  pub fn key(self) -> String {
    format!("{:04}-{:02}", self.year, self.month)
  }

  fn days(self) -> u32 {
    let next = self.next();
    NaiveDate::from_ymd_opt(next.year, next.month, 1)
      .and_then(|d| d.pred_opt())
      .map_or(28, |d| d.day())
  }

  /// First day of the cycle when billing is anchored on `anchor_day`.
  /// Anchors past the end of a short month fall on its last day.
  pub fn start(self, anchor_day: u32) -> NaiveDate {
    let day = anchor_day.clamp(1, self.days());
    NaiveDate::from_ymd_opt(self.year, self.month, day)
      .unwrap_or(NaiveDate::MIN)
  }

  /// The cycle `now` falls in for a package activated at `activated_at`.
  pub fn current(activated_at: DateTime, now: DateTime) -> Self {
    let anchor = activated_at.day();
    let this = Self::of(now.date());
    if now.date() >= this.start(anchor) { this } else { this.prev() }
  }

  pub fn due_date(self, anchor_day: u32, due_days: u32) -> DateTime {
    self.start(anchor_day).and_time(chrono::NaiveTime::MIN)
      + TimeDelta::days(due_days as i64)
  }
}

impl std::fmt::Display for Period {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.key())
  }
}

pub struct NewEntry {
  pub club_id: String,
  pub entry_type: EntryType,
  pub amount: i64,
  pub period: Option<Period>,
  pub idempotency_key: Option<String>,
  pub metadata: Option<json::Value>,
}

/// Appends a ledger line. A clash on the idempotency key comes back as
/// [`Error::DuplicateOperation`].
pub async fn append_entry<C: ConnectionTrait>(
  db: &C,
  entry: NewEntry,
) -> Result<finance_entry::Model> {
  finance_entry::ActiveModel {
    id: Set(new_id()),
    club_id: Set(entry.club_id),
    entry_type: Set(entry.entry_type),
    amount: Set(entry.amount),
    period_year: Set(entry.period.map(|p| p.year)),
    period_month: Set(entry.period.map(|p| p.month as i32)),
    idempotency_key: Set(entry.idempotency_key),
    created_at: Set(now()),
    metadata: Set(entry.metadata),
  }
  .insert(db)
  .await
  .map_err(Error::from_insert)
}

pub struct NewCommission {
  pub agent_id: String,
  pub club_id: String,
  pub amount: i64,
  pub commission_type: CommissionType,
  pub status: CommissionStatus,
  pub period: Option<Period>,
  pub due_date: Option<DateTime>,
  pub idempotency_key: String,
}

pub async fn append_commission<C: ConnectionTrait>(
  db: &C,
  new: NewCommission,
) -> Result<commission::Model> {
  commission::ActiveModel {
    id: Set(new_id()),
    agent_id: Set(new.agent_id),
    club_id: Set(new.club_id),
    amount: Set(new.amount),
    commission_type: Set(new.commission_type),
    status: Set(new.status),
    period_year: Set(new.period.map(|p| p.year)),
    period_month: Set(new.period.map(|p| p.month as i32)),
    due_date: Set(new.due_date),
    idempotency_key: Set(Some(new.idempotency_key)),
    created_at: Set(now()),
  }
  .insert(db)
  .await
  .map_err(Error::from_insert)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubFailure {
  pub club_id: String,
  pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerReport {
  pub processed_count: u32,
  pub skipped_count: u32,
  pub errors: Vec<ClubFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueClub {
  pub club_id: String,
  pub name: String,
  pub period: Period,
  pub due_date: DateTime,
  pub outstanding: i64,
}

#[derive(Debug, PartialEq, Eq)]
enum Posting {
  Posted,
  /// The activation fee covers the first cycle.
  FirstPeriod,
  AlreadyPosted,
}

pub struct Ledger<'a> {
  db: &'a DatabaseConnection,
  due_days: u32,
}

impl<'a> Ledger<'a> {
  pub fn new(db: &'a DatabaseConnection, due_days: u32) -> Self {
    Self { db, due_days }
  }

  pub async fn process_all_clubs(&self) -> Result<LedgerReport> {
    self.process_at(now()).await
  }

  /// Posts the current period's debt for every active club. One club
  /// failing is recorded in the report and does not stop the others.
  pub async fn process_at(&self, now: DateTime) -> Result<LedgerReport> {
    let clubs = club::Entity::find()
      .filter(club::Column::PackageStatus.eq(PackageStatus::Active))
      .order_by_asc(club::Column::CreatedAt)
      .all(self.db)
      .await?;

    let mut report = LedgerReport::default();
    for club in clubs {
      match self.process_club(&club, now).await {
        Ok(Posting::Posted) => report.processed_count += 1,
        Ok(skip) => {
          trace!(club_id = %club.id, ?skip, "monthly debt skipped");
          report.skipped_count += 1;
        }
        Err(err) => {
          error!(club_id = %club.id, "monthly debt failed: {err}");
          report
            .errors
            .push(ClubFailure { club_id: club.id, error: err.to_string() });
        }
      }
    }

    info!(
      processed = report.processed_count,
      skipped = report.skipped_count,
      failed = report.errors.len(),
      "monthly debt run finished"
    );
    Ok(report)
  }

  async fn process_club(
    &self,
    club: &club::Model,
    now: DateTime,
  ) -> Result<Posting> {
    let (Some(activated_at), Some(package_id)) =
      (club.package_activated_at, club.package_id.as_deref())
    else {
      return Err(Error::InvalidArgs("active club without a package".into()));
    };
    let package = package::find(package_id)?;

    let period = Period::current(activated_at, now);
    if period <= Period::of(activated_at.date()) {
      return Ok(Posting::FirstPeriod);
    }

    let key = format!("monthly_debt:{}:{}", club.id, period.key());
    let exists = finance_entry::Entity::find()
      .filter(finance_entry::Column::IdempotencyKey.eq(key.as_str()))
      .count(self.db)
      .await?;
    if exists > 0 {
      return Ok(Posting::AlreadyPosted);
    }

    let due_date = period.due_date(activated_at.day(), self.due_days);
    let txn = self.db.begin().await?;

    let posted = append_entry(
      &txn,
      NewEntry {
        club_id: club.id.clone(),
        entry_type: EntryType::MonthlyDebt,
        amount: -package.monthly_fee,
        period: Some(period),
        idempotency_key: Some(key),
        metadata: Some(json::json!({
          "package_id": package.id,
          "due_date": due_date,
        })),
      },
    )
    .await;

    match posted {
      Ok(_) => {}
      Err(Error::DuplicateOperation) => return Ok(Posting::AlreadyPosted),
      Err(err) => return Err(err),
    }

    if let Some(agent_id) = &club.agent_id {
      self
        .post_agent_commission(&txn, agent_id, club, package, period, due_date)
        .await?;
    }

    txn.commit().await?;
    info!(club_id = %club.id, %period, "monthly debt posted");
    Ok(Posting::Posted)
  }

  async fn post_agent_commission<C: ConnectionTrait>(
    &self,
    db: &C,
    agent_id: &str,
    club: &club::Model,
    package: &Package,
    period: Period,
    due_date: DateTime,
  ) -> Result<()> {
    let amount =
      Package::percent_of(package.monthly_fee, package.agent_monthly_percent);
    if amount <= 0 {
      return Ok(());
    }

    let res = append_commission(
      db,
      NewCommission {
        agent_id: agent_id.to_string(),
        club_id: club.id.clone(),
        amount,
        commission_type: CommissionType::Monthly,
        status: CommissionStatus::Pending,
        period: Some(period),
        due_date: Some(due_date),
        idempotency_key: format!(
          "monthly:{}:{}:{}",
          agent_id,
          club.id,
          period.key()
        ),
      },
    )
    .await;

    match res {
      Ok(_) | Err(Error::DuplicateOperation) => Ok(()),
      Err(err) => Err(err),
    }
  }

  pub async fn record_payment(
    &self,
    club_id: &str,
    period: Period,
    amount: i64,
  ) -> Result<finance_entry::Model> {
    if amount <= 0 {
      return Err(Error::InvalidArgs("Payment amount must be positive".into()));
    }
    club::Entity::find_by_id(club_id)
      .one(self.db)
      .await?
      .ok_or(Error::ClubNotFound)?;

    append_entry(
      self.db,
      NewEntry {
        club_id: club_id.to_string(),
        entry_type: EntryType::DebtPayment,
        amount,
        period: Some(period),
        idempotency_key: None,
        metadata: None,
      },
    )
    .await
  }

  pub async fn entries(&self, club_id: &str) -> Result<Vec<finance_entry::Model>> {
    Ok(
      finance_entry::Entity::find()
        .filter(finance_entry::Column::ClubId.eq(club_id))
        .order_by_asc(finance_entry::Column::CreatedAt)
        .all(self.db)
        .await?,
    )
  }

  pub async fn balance(&self, club_id: &str) -> Result<i64> {
    Ok(self.entries(club_id).await?.iter().map(|e| e.amount).sum())
  }

  pub async fn list_overdue_clubs(&self) -> Result<Vec<OverdueClub>> {
    self.overdue_at(now()).await
  }

  /// Clubs whose latest monthly debt is past due and not covered by
  /// payments recorded for that period. Read-only.
  pub async fn overdue_at(&self, now: DateTime) -> Result<Vec<OverdueClub>> {
    let clubs = club::Entity::find()
      .order_by_asc(club::Column::CreatedAt)
      .all(self.db)
      .await?;

    let mut overdue = Vec::new();
    for club in clubs {
      let Some(debt) = finance_entry::Entity::find()
        .filter(finance_entry::Column::ClubId.eq(club.id.as_str()))
        .filter(finance_entry::Column::EntryType.eq(EntryType::MonthlyDebt))
        .order_by_desc(finance_entry::Column::PeriodYear)
        .order_by_desc(finance_entry::Column::PeriodMonth)
        .one(self.db)
        .await?
      else {
        continue;
      };

      let (Some(year), Some(month)) = (debt.period_year, debt.period_month)
      else {
        warn!(entry_id = %debt.id, "monthly debt without a period");
        continue;
      };
      let period = Period::new(year, month as u32)?;
      let anchor = club.package_activated_at.map_or(1, |at| at.day());
      let due_date = period.due_date(anchor, self.due_days);
      if due_date >= now {
        continue;
      }

      let paid: i64 = finance_entry::Entity::find()
        .filter(finance_entry::Column::ClubId.eq(club.id.as_str()))
        .filter(finance_entry::Column::EntryType.eq(EntryType::DebtPayment))
        .filter(finance_entry::Column::PeriodYear.eq(year))
        .filter(finance_entry::Column::PeriodMonth.eq(month))
        .all(self.db)
        .await?
        .iter()
        .map(|e| e.amount)
        .sum();

      let outstanding = -debt.amount - paid;
      if outstanding > 0 {
        overdue.push(OverdueClub {
          club_id: club.id,
          name: club.name,
          period,
          due_date,
          outstanding,
        });
      }
    }

    Ok(overdue)
  }
}
