use crate::{
    config::TableReference,
    errors::Nl2SqlError,
    types::{QueryResult, TableSchema},
};
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;
use std::sync::Arc;

/// A trait for interacting with a storage backend.
///
/// This trait defines the warehouse operations the agent's tools need:
/// metadata discovery, schema lookup and query execution.
#[async_trait]
pub trait Storage: Send + Sync + DynClone + Debug {
    /// Returns the name of the storage provider (e.g., "BigQuery").
    fn name(&self) -> &str;

    /// Lists the dataset ids in `project_id`.
    async fn list_dataset_ids(&self, project_id: &str) -> Result<Vec<String>, Nl2SqlError>;

    /// Lists the table ids in `project_id.dataset_id`.
    async fn list_table_ids(
        &self,
        project_id: &str,
        dataset_id: &str,
    ) -> Result<Vec<String>, Nl2SqlError>;

    /// Retrieves the schema for a given table.
    async fn get_table_schema(
        &self,
        table: &TableReference,
    ) -> Result<Arc<TableSchema>, Nl2SqlError>;

    /// Executes SQL as a job billed to `project_id`.
    ///
    /// Waits for the job to finish and returns at most `max_rows` rows along
    /// with the total row count.
    async fn execute_sql(
        &self,
        project_id: &str,
        sql: &str,
        max_rows: usize,
    ) -> Result<QueryResult, Nl2SqlError>;
}

dyn_clone::clone_trait_object!(Storage);
