// warden-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;
pub mod memory;

pub use self::duckdb::DuckDbConnector;
pub use memory::{InMemoryStore, StoreState};
