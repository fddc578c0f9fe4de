pub mod config;
pub mod db;
pub mod error;

pub use db::DbClient;
pub use error::{Entity, StoreError, StoreResult};
