use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Method;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::SnowflakeResult;
use crate::response::{StatementResponse, StringTable};
use crate::result::{worker_count, ColumnMap, PartitionRetriever, QueryResult, StreamingResult};
use crate::transport::RequestExecutor;
use crate::ClientConfig;

/// A single SQL statement bound to a client, ready to submit.
///
/// Created by [`crate::SnowflakeClient::prepare`].
#[derive(Clone)]
pub struct Statement {
    executor: Arc<RequestExecutor>,
    config: Arc<ClientConfig>,
    sql: String,
    warehouse: String,
}

#[derive(Serialize, Debug)]
struct WireStatement<'a> {
    statement: &'a str,
    warehouse: &'a str,
}

impl Statement {
    pub(crate) fn new(
        executor: Arc<RequestExecutor>,
        config: Arc<ClientConfig>,
        sql: &str,
    ) -> Statement {
        let warehouse = config.default_warehouse.clone();
        Statement {
            executor,
            config,
            sql: sql.to_owned(),
            warehouse,
        }
    }

    /// Route this statement to a warehouse other than the configured
    /// default.
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Statement {
        self.warehouse = warehouse.into();
        self
    }

    async fn submit(&self) -> SnowflakeResult<StatementResponse> {
        let path = format!("/api/v2/statements?requestId={}", Uuid::new_v4());
        let body = WireStatement {
            statement: &self.sql,
            warehouse: &self.warehouse,
        };
        let response: StatementResponse = self
            .executor
            .request_json(Method::POST, &path, Some(&body))
            .await?;
        log::debug!("Submitted statement, handle {}", response.statement_handle);
        Ok(response)
    }

    /// Execute and materialize every partition in memory.
    ///
    /// Partitions beyond the first are fetched sequentially or through a
    /// bounded number of concurrent requests, depending on how many there
    /// are relative to the configured scale factor.
    pub async fn query(&self) -> SnowflakeResult<QueryResult> {
        let response = self.submit().await?;
        let Some(meta) = response.result_set_meta_data else {
            return Ok(QueryResult::empty());
        };
        let partition_count = meta.partition_info.len();
        let columns = ColumnMap::new(meta.row_type);
        let mut rows: StringTable =
            Arc::unwrap_or_clone(response.data.unwrap_or_default());

        if partition_count > 1 {
            let retriever =
                PartitionRetriever::new(self.executor.clone(), response.statement_handle);
            let workers = worker_count(
                partition_count,
                self.config.thread_scale_factor,
                self.config.max_threads_per_query,
            );
            log::debug!(
                "Fetching {} additional partitions with {workers} workers",
                partition_count - 1
            );
            if workers == 1 {
                for index in 1..partition_count {
                    rows.extend(retriever.fetch(index).await?.iter().cloned());
                }
            } else {
                // buffered() caps the in-flight fetches and yields tables in
                // partition order no matter which finishes first; the first
                // error drops whatever is still in flight.
                let tables = stream::iter((1..partition_count).map(|index| retriever.fetch(index)))
                    .buffered(workers)
                    .try_collect::<Vec<_>>()
                    .await?;
                for table in tables {
                    rows.extend(table.iter().cloned());
                }
            }
        }
        Ok(QueryResult::new(columns, rows))
    }

    /// Execute and stream the result, fetching partitions only as
    /// iteration reaches them.
    pub async fn query_streaming(&self) -> SnowflakeResult<StreamingResult> {
        let response = self.submit().await?;
        let retriever = PartitionRetriever::new(self.executor.clone(), response.statement_handle);
        let Some(meta) = response.result_set_meta_data else {
            return Ok(StreamingResult::new(
                ColumnMap::new(Vec::new()),
                Arc::new(Vec::new()),
                0,
                None,
                retriever,
            ));
        };
        Ok(StreamingResult::new(
            ColumnMap::new(meta.row_type),
            response.data.unwrap_or_default(),
            meta.partition_info.len().max(1),
            meta.num_rows,
            retriever,
        ))
    }
}
