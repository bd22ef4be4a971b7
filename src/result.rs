use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use indexmap::IndexMap;
use reqwest::Method;
use uuid::Uuid;

use crate::cells::{Cell, ColumnType};
use crate::errors::{SnowflakeError, SnowflakeResult};
use crate::response::{PartitionResponse, StringTable};
use crate::transport::RequestExecutor;

/// Column metadata plus a case-insensitive name lookup, shared by every row
/// of one result.
#[derive(Debug)]
pub(crate) struct ColumnMap {
    row_types: Vec<ColumnType>,
    by_lower_name: HashMap<String, usize>,
}

impl ColumnMap {
    pub fn new(row_types: Vec<ColumnType>) -> Arc<ColumnMap> {
        let mut by_lower_name = HashMap::with_capacity(row_types.len());
        for (index, column) in row_types.iter().enumerate() {
            // first occurrence wins for duplicated names
            by_lower_name
                .entry(column.name.to_lowercase())
                .or_insert(index);
        }
        Arc::new(ColumnMap {
            row_types,
            by_lower_name,
        })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.by_lower_name.get(&name.to_lowercase()).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.row_types.iter().map(|column| column.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.row_types.len()
    }
}

/// A view of one row; cells are decoded on access.
#[derive(Clone, Debug)]
pub struct Row {
    columns: Arc<ColumnMap>,
    table: Arc<StringTable>,
    row_index: usize,
}

impl Row {
    fn raw_cells(&self) -> &[Option<String>] {
        &self.table[self.row_index]
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Decode the cell at `index`.
    pub fn get(&self, index: usize) -> Option<Cell> {
        let raw = self.raw_cells().get(index)?;
        Some(self.columns.row_types[index].decode(raw))
    }

    /// Decode the cell in the column called `name`, matched
    /// case-insensitively. Returns the same value as [`Row::get`] on that
    /// column's index.
    pub fn get_by_name(&self, name: &str) -> Option<Cell> {
        self.get(self.columns.index_of(name)?)
    }

    /// The raw string exactly as the Service sent it, if the cell is
    /// non-null.
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.raw_cells().get(index)?.as_deref()
    }

    /// Decode the whole row in column order.
    pub fn cells(&self) -> Vec<Cell> {
        (0..self.num_columns()).filter_map(|index| self.get(index)).collect()
    }

    /// Column name to decoded value, iterating in metadata column order
    /// with the original column names.
    pub fn to_map(&self) -> IndexMap<String, Cell> {
        self.columns
            .row_types
            .iter()
            .enumerate()
            .map(|(index, column)| {
                (column.name.clone(), self.get(index).unwrap_or(Cell::Null))
            })
            .collect()
    }
}

/// Fetches the partitions past the first for one statement, through the
/// same executor and pool that submitted it.
pub(crate) struct PartitionRetriever {
    executor: Arc<RequestExecutor>,
    statement_handle: String,
}

impl PartitionRetriever {
    pub fn new(executor: Arc<RequestExecutor>, statement_handle: String) -> PartitionRetriever {
        PartitionRetriever {
            executor,
            statement_handle,
        }
    }

    pub async fn fetch(&self, index: usize) -> SnowflakeResult<Arc<StringTable>> {
        let path = format!(
            "/api/v2/statements/{}?partition={}&requestId={}",
            self.statement_handle,
            index,
            Uuid::new_v4(),
        );
        let response: PartitionResponse = self
            .executor
            .request_json(Method::GET, &path, None::<&()>)
            .await?;
        Ok(response.data)
    }
}

/// Workers used to fetch a result of `partition_count` partitions. The
/// count scales with the total number of partitions, the first included
/// even though it is never re-fetched.
pub(crate) fn worker_count(
    partition_count: usize,
    scale_factor: usize,
    max_threads: usize,
) -> usize {
    partition_count.div_ceil(scale_factor).clamp(1, max_threads)
}

/// A fully materialized result set.
#[derive(Debug)]
pub struct QueryResult {
    columns: Arc<ColumnMap>,
    rows: Arc<StringTable>,
}

impl QueryResult {
    pub(crate) fn new(columns: Arc<ColumnMap>, rows: StringTable) -> QueryResult {
        QueryResult {
            columns,
            rows: Arc::new(rows),
        }
    }

    pub(crate) fn empty() -> QueryResult {
        QueryResult::new(ColumnMap::new(Vec::new()), Vec::new())
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.names().collect()
    }

    pub fn row(&self, index: usize) -> Option<Row> {
        (index < self.rows.len()).then(|| Row {
            columns: self.columns.clone(),
            table: self.rows.clone(),
            row_index: index,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.num_rows()).map(move |row_index| Row {
            columns: self.columns.clone(),
            table: self.rows.clone(),
            row_index,
        })
    }
}

/// A result whose partitions past the first are fetched only when
/// iteration reaches them.
pub struct StreamingResult {
    columns: Arc<ColumnMap>,
    first: Arc<StringTable>,
    partition_count: usize,
    num_rows_hint: Option<usize>,
    retriever: PartitionRetriever,
}

impl StreamingResult {
    pub(crate) fn new(
        columns: Arc<ColumnMap>,
        first: Arc<StringTable>,
        partition_count: usize,
        num_rows_hint: Option<usize>,
        retriever: PartitionRetriever,
    ) -> StreamingResult {
        StreamingResult {
            columns,
            first,
            partition_count,
            num_rows_hint,
            retriever,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partition_count
    }

    /// Total rows across all partitions, when the Service reported it.
    pub fn num_rows(&self) -> Option<usize> {
        self.num_rows_hint
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.names().collect()
    }

    /// Stream rows in partition order.
    ///
    /// Partition `i` is requested only once the stream reaches it; a
    /// dropped stream fetches nothing further. A failed fetch surfaces at
    /// the point of iteration.
    pub fn rows(&self) -> impl Stream<Item = SnowflakeResult<Row>> + '_ {
        stream::try_unfold(0usize, move |index| async move {
            if index >= self.partition_count {
                return Ok::<_, SnowflakeError>(None);
            }
            let table = if index == 0 {
                self.first.clone()
            } else {
                self.retriever.fetch(index).await?
            };
            Ok(Some((table, index + 1)))
        })
        .map_ok(move |table: Arc<StringTable>| {
            let columns = self.columns.clone();
            stream::iter((0..table.len()).map(move |row_index| {
                Ok(Row {
                    columns: columns.clone(),
                    table: table.clone(),
                    row_index,
                })
            }))
        })
        .try_flatten()
    }
}
