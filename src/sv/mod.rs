pub mod club;
pub mod ledger;
pub mod package;
pub mod payment;
pub mod pool;
pub mod provider;
pub mod reservation;
pub mod seller;
#[cfg(test)]
pub mod test_utils;

pub use club::Club;
pub use ledger::Ledger;
pub use payment::Payment;
pub use pool::Pool;
pub use reservation::Reservation;
pub use seller::Seller;
