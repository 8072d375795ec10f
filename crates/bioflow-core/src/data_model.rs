//! Data-model service trait definition.
//!
//! Tables are addressed by workspace. The resolver reads through this trait
//! and the submission sync handler writes run outputs back through it.

use bioflow_types::data_model::{DataModel, DataModelType, TableRows};
use bioflow_types::error::RepositoryError;

pub trait DataModelService: Send + Sync {
    fn get_table(
        &self,
        workspace_id: &str,
        table_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<DataModel>, RepositoryError>> + Send;

    /// Rows of a table. An empty `row_ids` selects every row.
    fn list_rows(
        &self,
        workspace_id: &str,
        table_id: &str,
        row_ids: &[String],
    ) -> impl std::future::Future<Output = Result<TableRows, RepositoryError>> + Send;

    /// Tables whose name contains `search_word`, restricted to `kinds` (empty = all).
    fn list_tables(
        &self,
        workspace_id: &str,
        search_word: Option<&str>,
        kinds: &[DataModelType],
    ) -> impl std::future::Future<Output = Result<Vec<DataModel>, RepositoryError>> + Send;

    /// Upsert rows into the table called `name`.
    ///
    /// `headers[0]` is the id header and `row[0]` the row id. Unknown headers
    /// become new columns. Unknown row ids become new rows. A missing table is
    /// created as an entity table.
    fn patch_table(
        &self,
        workspace_id: &str,
        name: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Create or replace a whole table.
    fn import_table(
        &self,
        table: &DataModel,
        rows: &[Vec<String>],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
