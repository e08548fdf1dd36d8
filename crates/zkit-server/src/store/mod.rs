pub mod crypto;
pub mod db;
pub mod model;

pub use db::RegStore;
pub use model::RegistrationRecord;
