pub mod club;
pub mod commission;
pub mod finance_entry;
pub mod license;
pub mod reservation;
pub mod sale;
pub mod seller;

pub use club::PackageStatus;
pub use commission::{CommissionStatus, CommissionType};
pub use finance_entry::EntryType;
pub use license::{BuyerInfo, LicenseState};
pub use reservation::ReservationStatus;
