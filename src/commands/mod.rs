pub mod check_store;
pub mod harvest;

pub use check_store::check_store;
pub use harvest::{harvest, HarvestArgs};
