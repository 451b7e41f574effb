// warden-core/src/ports/mod.rs

pub mod catalog;
pub mod connector;
pub mod store;

pub use catalog::CatalogSource;
pub use connector::{ConnectorError, DataSourceConnector, QueryResult};
pub use store::{IssueStore, ResultStore, RuleStore};
