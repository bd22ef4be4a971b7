use std::sync::Arc;

use serde::Deserialize;

use crate::cells::ColumnType;

/// Rows exactly as Snowflake sends them: every cell a string or null.
pub(crate) type StringTable = Vec<Vec<Option<String>>>;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatementResponse {
    pub statement_handle: String,
    /// Absent for submissions that produce no result set (DDL and friends).
    pub result_set_meta_data: Option<ResultSetMetaData>,
    pub data: Option<Arc<StringTable>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultSetMetaData {
    pub num_rows: Option<usize>,
    pub row_type: Vec<ColumnType>,
    /// Only the length matters here: one entry per partition.
    pub partition_info: Vec<PartitionInfo>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct PartitionInfo {
    //pub row_count: usize,
    //pub uncompressed_size: usize,
}

#[derive(Deserialize, Debug)]
pub(crate) struct PartitionResponse {
    pub data: Arc<StringTable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_response_parses_metadata_and_first_partition() {
        let body = r#"{
            "statementHandle": "01b7-0604",
            "resultSetMetaData": {
                "numRows": 3,
                "format": "jsonv2",
                "rowType": [
                    {"name": "ID", "type": "fixed", "scale": 0, "nullable": false},
                    {"name": "NAME", "type": "text"}
                ],
                "partitionInfo": [{"rowCount": 2}, {"rowCount": 1}]
            },
            "data": [["1", "a"], ["2", null]]
        }"#;
        let parsed: StatementResponse = serde_json::from_str(body).unwrap();
        let meta = parsed.result_set_meta_data.unwrap();
        assert_eq!(meta.num_rows, Some(3));
        assert_eq!(meta.row_type.len(), 2);
        assert_eq!(meta.partition_info.len(), 2);
        let data = parsed.data.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1][1], None);
    }

    #[test]
    fn submission_response_without_metadata_parses() {
        let parsed: StatementResponse =
            serde_json::from_str(r#"{"statementHandle": "01b7-0605"}"#).unwrap();
        assert!(parsed.result_set_meta_data.is_none());
        assert!(parsed.data.is_none());
    }
}
