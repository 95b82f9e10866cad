use serde::Serialize;

use crate::{
  entity::{
    CommissionStatus, CommissionType, EntryType, PackageStatus, club,
  },
  prelude::*,
  sv::{
    ledger::{self, NewCommission, NewEntry, Period},
    package::{self, Package},
    pool::{BatchReport, Pool},
  },
};

pub struct Club<'a> {
  db: &'a DatabaseConnection,
}

#[derive(Debug, Serialize)]
pub struct Activation {
  pub club: club::Model,
  pub licenses: BatchReport,
}

impl<'a> Club<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn create(
    &self,
    name: &str,
    agent_id: Option<String>,
  ) -> Result<club::Model> {
    let name = name.trim();
    if name.is_empty() {
      return Err(Error::InvalidArgs("Club name must not be empty".into()));
    }

    let club = club::ActiveModel {
      id: Set(new_id()),
      name: Set(name.to_string()),
      agent_id: Set(agent_id),
      package_id: Set(None),
      package_status: Set(PackageStatus::Inactive),
      package_activated_at: Set(None),
      sales_count: Set(0),
      revenue: Set(0),
      created_at: Set(now()),
    };

    Ok(club.insert(self.db).await?)
  }

  pub async fn by_id(&self, club_id: &str) -> Result<club::Model> {
    club::Entity::find_by_id(club_id)
      .one(self.db)
      .await?
      .ok_or(Error::ClubNotFound)
  }

  pub async fn activate_package(
    &self,
    club_id: &str,
    package_id: &str,
  ) -> Result<Activation> {
    self.activate_package_at(club_id, package_id, now()).await
  }

  /// Activates a package: package fields, activation fee, agent activation
  /// commission, then the license batch.
  pub async fn activate_package_at(
    &self,
    club_id: &str,
    package_id: &str,
    now: DateTime,
  ) -> Result<Activation> {
    let package = package::find(package_id)?;
    let txn = self.db.begin().await?;

    let res = club::Entity::update_many()
      .set(club::ActiveModel {
        package_id: Set(Some(package.id.to_string())),
        package_status: Set(PackageStatus::Active),
        package_activated_at: Set(Some(now)),
        ..Default::default()
      })
      .filter(club::Column::Id.eq(club_id))
      .filter(club::Column::PackageStatus.ne(PackageStatus::Active))
      .exec(&txn)
      .await?;

    if res.rows_affected == 0 {
      club::Entity::find_by_id(club_id)
        .one(&txn)
        .await?
        .ok_or(Error::ClubNotFound)?;
      return Err(Error::InvalidTransition("package is already active"));
    }

    let club = club::Entity::find_by_id(club_id)
      .one(&txn)
      .await?
      .ok_or(Error::ClubNotFound)?;

    let stamp = now.and_utc().timestamp();
    ledger::append_entry(
      &txn,
      NewEntry {
        club_id: club.id.clone(),
        entry_type: EntryType::PackageActivation,
        amount: -package.activation_fee,
        period: Some(Period::of(now.date())),
        idempotency_key: Some(format!("package_activation:{club_id}:{stamp}")),
        metadata: Some(json::json!({ "package_id": package.id })),
      },
    )
    .await?;

    if let Some(agent_id) = &club.agent_id {
      let amount = Package::percent_of(
        package.activation_fee,
        package.agent_activation_percent,
      );
      if amount > 0 {
        ledger::append_commission(
          &txn,
          NewCommission {
            agent_id: agent_id.clone(),
            club_id: club.id.clone(),
            amount,
            commission_type: CommissionType::Activation,
            status: CommissionStatus::Earned,
            period: None,
            due_date: None,
            idempotency_key: format!("activation:{agent_id}:{club_id}:{stamp}"),
          },
        )
        .await?;
      }
    }

    txn.commit().await?;
    info!(club_id, package_id = package.id, "package activated");

    let licenses = Pool::new(self.db)
      .add_batch(
        club_id,
        package.license_count,
        package.id,
        now + package.validity(),
      )
      .await?;

    Ok(Activation { club, licenses })
  }

  pub async fn suspend(&self, club_id: &str) -> Result<club::Model> {
    let club = self.by_id(club_id).await?;

    Ok(
      club::ActiveModel {
        package_status: Set(PackageStatus::Suspended),
        ..club.into()
      }
      .update(self.db)
      .await?,
    )
  }

  pub async fn all(&self) -> Result<Vec<club::Model>> {
    Ok(
      club::Entity::find()
        .order_by_asc(club::Column::CreatedAt)
        .all(self.db)
        .await?,
    )
  }
}
