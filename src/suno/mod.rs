pub mod auth;
pub mod harvest;
pub mod rest;
pub mod types;

pub use auth::CredentialBundle;
pub use harvest::{HarvestTarget, Harvester};
pub use rest::{PlatformApi, SunoRest};
pub use types::{ApiResponse, ListingKind};
