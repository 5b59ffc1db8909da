use crate::{
    config::TableReference,
    errors::Nl2SqlError,
    providers::db::storage::Storage,
    types::{QueryResult, Rows, TableField, TableSchema},
};
use async_trait::async_trait;
use gcp_bigquery_client::{
    dataset,
    model::{
        get_query_results_parameters::GetQueryResultsParameters,
        query_request::QueryRequest,
        query_response::{QueryResponse, ResultSet},
        table::Table,
    },
    table, Client,
};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// How long each `getQueryResults` call waits server-side for the job.
const POLL_TIMEOUT_MS: i32 = 10_000;
/// Polls before a still-running job is reported as a failure.
const MAX_POLLS: usize = 30;

/// A provider for interacting with Google BigQuery.
#[derive(Clone)]
pub struct BigQueryProvider {
    client: Client,
    schema_cache: Arc<RwLock<HashMap<String, Arc<TableSchema>>>>,
}

impl BigQueryProvider {
    /// Creates a new `BigQueryProvider` from application default credentials.
    pub async fn new() -> Result<Self, Nl2SqlError> {
        let client = Client::from_application_default_credentials()
            .await
            .map_err(|e| Nl2SqlError::Authentication(e.to_string()))?;
        Ok(Self {
            client,
            schema_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Waits for an unfinished query job, re-reading its first page.
    async fn wait_for_job(
        &self,
        project_id: &str,
        mut response: QueryResponse,
        max_rows: usize,
    ) -> Result<QueryResponse, Nl2SqlError> {
        let mut polls = 0;
        while response.job_complete == Some(false) {
            let job = response.job_reference.clone().unwrap_or_default();
            let job_id = job.job_id.ok_or_else(|| {
                Nl2SqlError::ExternalService(
                    "BigQuery reported an unfinished query without a job id".to_string(),
                )
            })?;
            if polls == MAX_POLLS {
                return Err(Nl2SqlError::ExternalService(format!(
                    "BigQuery job '{job_id}' did not finish after {MAX_POLLS} polls"
                )));
            }
            polls += 1;
            debug!(%job_id, polls, "Waiting for BigQuery job");

            let page = self
                .client
                .job()
                .get_query_results(
                    project_id,
                    &job_id,
                    GetQueryResultsParameters {
                        location: job.location,
                        max_results: Some(page_size(max_rows)),
                        timeout_ms: Some(POLL_TIMEOUT_MS),
                        ..Default::default()
                    },
                )
                .await?;
            response = QueryResponse::from(page);
        }
        Ok(response)
    }
}

fn page_size(max_rows: usize) -> i32 {
    i32::try_from(max_rows.max(1)).unwrap_or(i32::MAX)
}

/// Reads the rows of a finished query response, keeping at most `max_rows`.
pub fn read_query_response(
    response: QueryResponse,
    max_rows: usize,
) -> Result<QueryResult, Nl2SqlError> {
    if response.job_complete == Some(false) {
        return Err(Nl2SqlError::ExternalService(
            "BigQuery query has not finished".to_string(),
        ));
    }
    let total_rows = response
        .total_rows
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok());

    let mut results = ResultSet::new_from_query_response(response);
    let mut rows: Rows = Vec::new();
    let column_names = results.column_names();

    while rows.len() < max_rows && results.next_row() {
        let mut row_map = serde_json::Map::new();
        for name in &column_names {
            let value = results
                .get_json_value_by_name(name)
                .ok()
                .flatten()
                .unwrap_or(Value::Null);
            row_map.insert(name.clone(), value);
        }
        rows.push(Value::Object(row_map));
    }

    Ok(QueryResult {
        total_rows: total_rows.unwrap_or(rows.len() as u64),
        rows,
    })
}

/// Collects the id at `pointer` from every entry of `list_key` in a serialized list page.
fn ids_from_page(page: &Value, list_key: &str, pointer: &str) -> Vec<String> {
    page.get(list_key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.pointer(pointer).and_then(Value::as_str))
        .map(String::from)
        .collect()
}

fn next_page_token(page: &Value) -> Option<String> {
    page.get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

impl Debug for BigQueryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for BigQueryProvider {
    fn name(&self) -> &str {
        "BigQuery"
    }

    async fn list_dataset_ids(&self, project_id: &str) -> Result<Vec<String>, Nl2SqlError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut options = dataset::ListOptions::default();
            if let Some(token) = page_token.take() {
                options = options.page_token(token);
            }
            let page = self.client.dataset().list(project_id, options).await?;
            let page = serde_json::to_value(&page)?;
            ids.extend(ids_from_page(&page, "datasets", "/datasetReference/datasetId"));
            match next_page_token(&page) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn list_table_ids(
        &self,
        project_id: &str,
        dataset_id: &str,
    ) -> Result<Vec<String>, Nl2SqlError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut options = table::ListOptions::default();
            if let Some(token) = page_token.take() {
                options = options.page_token(token);
            }
            let page = self
                .client
                .table()
                .list(project_id, dataset_id, options)
                .await?;
            let page = serde_json::to_value(&page)?;
            ids.extend(ids_from_page(&page, "tables", "/tableReference/tableId"));
            match next_page_token(&page) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Retrieves the schema for a given BigQuery table.
    async fn get_table_schema(
        &self,
        table: &TableReference,
    ) -> Result<Arc<TableSchema>, Nl2SqlError> {
        let key = table.to_string();
        if let Some(schema) = self.schema_cache.read().await.get(&key) {
            debug!(table = %key, "Returning cached schema.");
            return Ok(schema.clone());
        }

        let bq_table: Table = self
            .client
            .table()
            .get(&table.project_id, &table.dataset_id, &table.table_id, None)
            .await?;

        let fields = bq_table
            .schema
            .fields
            .unwrap_or_default()
            .into_iter()
            .map(|field| TableField {
                name: field.name,
                r#type: format!("{:?}", field.r#type).to_uppercase(),
                mode: field.mode,
                description: field.description,
            })
            .collect();

        let schema_arc = Arc::new(TableSchema { fields });
        self.schema_cache
            .write()
            .await
            .insert(key, schema_arc.clone());

        Ok(schema_arc)
    }

    /// Executes a SQL query on BigQuery and returns the rows as JSON objects.
    async fn execute_sql(
        &self,
        project_id: &str,
        sql: &str,
        max_rows: usize,
    ) -> Result<QueryResult, Nl2SqlError> {
        info!("--> Executing BigQuery SQL: {sql}");
        let response = self
            .client
            .job()
            .query(
                project_id,
                QueryRequest {
                    query: sql.to_string(),
                    max_results: Some(page_size(max_rows)),
                    ..Default::default()
                },
            )
            .await?;

        let response = self.wait_for_job(project_id, response, max_rows).await?;
        read_query_response(response, max_rows)
    }
}
