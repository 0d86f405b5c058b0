pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod domain;
pub mod economy;
pub mod engine;
pub mod error;
pub mod guard;

pub use catalog::{CatalogSnapshot, ConfigCache};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{Decimal, PetId, PlayerId, TimeMs, Token};
pub use economy::{Action, EconomyEngine, EconomyError, Purchase, Reason};
pub use error::AppError;
pub use guard::{ActionGuard, InMemoryGuard, RedisGuard};
