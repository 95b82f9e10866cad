use crate::{entity::seller, prelude::*, sv::Club};

pub struct Seller<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Seller<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Registers the identity issued by the auth layer as a seller of a club.
  pub async fn create(
    &self,
    seller_id: &str,
    club_id: &str,
    name: &str,
  ) -> Result<seller::Model> {
    if seller_id.trim().is_empty() {
      return Err(Error::InvalidArgs("Seller id must not be empty".into()));
    }
    Club::new(self.db).by_id(club_id).await?;

    if seller::Entity::find_by_id(seller_id).one(self.db).await?.is_some() {
      return Err(already_registered());
    }

    let seller = seller::ActiveModel {
      id: Set(seller_id.to_string()),
      club_id: Set(club_id.to_string()),
      name: Set(name.trim().to_string()),
      sales_count: Set(0),
      revenue: Set(0),
      commission_accrued: Set(0),
      created_at: Set(now()),
    };

    // a concurrent registration of the same id lands on the primary key
    seller.insert(self.db).await.map_err(|err| match Error::from_insert(err) {
      Error::DuplicateOperation => already_registered(),
      err => err,
    })
  }

  pub async fn by_id(&self, seller_id: &str) -> Result<seller::Model> {
    seller::Entity::find_by_id(seller_id)
      .one(self.db)
      .await?
      .ok_or(Error::SellerNotFound)
  }

  pub async fn by_club(&self, club_id: &str) -> Result<Vec<seller::Model>> {
    Ok(
      seller::Entity::find()
        .filter(seller::Column::ClubId.eq(club_id))
        .order_by_asc(seller::Column::CreatedAt)
        .all(self.db)
        .await?,
    )
  }
}

fn already_registered() -> Error {
  Error::InvalidArgs("Seller is already registered".into())
}
