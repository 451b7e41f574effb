// warden-core/src/ports/catalog.rs

use async_trait::async_trait;

use crate::domain::catalog::{Asset, AssetFilter, Column, ColumnClassification, ColumnRef};
use crate::error::Result;

/// Schema registry supplying assets and columns. Crawling is someone else's job.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_assets(&self, source_id: &str, filter: &AssetFilter) -> Result<Vec<Asset>>;

    async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>>;

    /// Columns in ordinal order, carrying their last known classification.
    async fn list_columns(&self, asset_id: &str) -> Result<Vec<Column>>;

    async fn update_column_classification(
        &self,
        column: &ColumnRef,
        classification: ColumnClassification,
    ) -> Result<()>;
}
