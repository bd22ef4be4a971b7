//! A keypair-JWT client for the Snowflake SQL REST API.
//!
//! Statements go out over `POST /api/v2/statements`; the partitioned result
//! set comes back either fully materialized, with a bounded number of
//! concurrent partition fetches, or as a strictly lazy stream that only
//! requests a partition once iteration reaches it. Cells are decoded into
//! typed values on access.
//!
//! ```rust,no_run
//! use snowflake_rest_client::{Cell, ClientConfig, SnowflakeClient, SnowflakeError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SnowflakeError> {
//!     let pem = std::fs::read_to_string("rsa_key.p8").expect("key file");
//!     let config = ClientConfig::new(
//!         "https://myorg-myaccount.snowflakecomputing.com",
//!         pem,
//!         "myorg",
//!         "myaccount",
//!         "MY_USER",
//!         "MY_WH",
//!     );
//!     let client = SnowflakeClient::new(config)?;
//!
//!     let result = client.query("SELECT id, name FROM users").await?;
//!     for row in result.rows() {
//!         match row.get_by_name("id") {
//!             Some(Cell::Int(id)) => println!("id = {id}"),
//!             other => println!("something else: {other:?}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod cells;
mod errors;
mod jwt;
mod pool;
mod response;
mod result;
mod statement;
mod token;
mod transport;

pub use cells::{Cell, ColumnType};
pub use errors::{SnowflakeError, SnowflakeResult};
pub use result::{QueryResult, Row, StreamingResult};
pub use statement::Statement;

use std::sync::Arc;
use std::time::Duration;

use crate::jwt::JwtMinter;
use crate::pool::ConnectionPool;
use crate::token::TokenCache;
use crate::transport::RequestExecutor;

pub const DEFAULT_JWT_TTL_SECS: u64 = 3600;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;
pub const DEFAULT_MAX_THREADS_PER_QUERY: usize = 8;
pub const DEFAULT_THREAD_SCALE_FACTOR: usize = 4;
pub const DEFAULT_HTTP_RETRIES: u32 = 2;

/// Everything a [`SnowflakeClient`] needs; read-only once the client is
/// constructed.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// e.g. `https://myorg-myaccount.snowflakecomputing.com`
    pub base_url: String,
    /// PKCS#8 PEM of the RSA private key registered with the user
    pub private_key_pem: String,
    pub organization: String,
    pub account: String,
    pub user: String,
    pub default_warehouse: String,
    pub jwt_ttl_secs: u64,
    /// How long a request may wait for a pooled connection
    pub connection_timeout_secs: u64,
    pub max_connections: usize,
    pub max_threads_per_query: usize,
    /// Partitions per worker; more partitions mean more workers, up to
    /// `max_threads_per_query`
    pub thread_scale_factor: usize,
    pub http_retries: u32,
}

impl ClientConfig {
    /// A config with the required identity fields set and every tunable at
    /// its default. The fields are public; adjust them before handing the
    /// config to [`SnowflakeClient::new`].
    pub fn new(
        base_url: impl Into<String>,
        private_key_pem: impl Into<String>,
        organization: impl Into<String>,
        account: impl Into<String>,
        user: impl Into<String>,
        default_warehouse: impl Into<String>,
    ) -> ClientConfig {
        ClientConfig {
            base_url: base_url.into(),
            private_key_pem: private_key_pem.into(),
            organization: organization.into(),
            account: account.into(),
            user: user.into(),
            default_warehouse: default_warehouse.into(),
            jwt_ttl_secs: DEFAULT_JWT_TTL_SECS,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_threads_per_query: DEFAULT_MAX_THREADS_PER_QUERY,
            thread_scale_factor: DEFAULT_THREAD_SCALE_FACTOR,
            http_retries: DEFAULT_HTTP_RETRIES,
        }
    }
}

/// The entry point: owns the connection pool and the token cache, and is
/// cheap to clone and safe to share across tasks.
#[derive(Clone, Debug)]
pub struct SnowflakeClient {
    config: Arc<ClientConfig>,
    executor: Arc<RequestExecutor>,
}

impl SnowflakeClient {
    /// Validate the configuration and build a client. The private key and
    /// base URL are parsed here, so a bad configuration fails before the
    /// first query does.
    pub fn new(config: ClientConfig) -> SnowflakeResult<SnowflakeClient> {
        let base_url = reqwest::Url::parse(&config.base_url).map_err(|e| {
            SnowflakeError::Config(format!("malformed base URL {:?}: {e}", config.base_url))
        })?;
        if config.thread_scale_factor == 0 || config.max_threads_per_query == 0 {
            return Err(SnowflakeError::Config(
                "thread_scale_factor and max_threads_per_query must be at least 1".to_owned(),
            ));
        }
        // Partition fetches and submissions share one pool; a query may
        // hold max_threads_per_query connections at once.
        if config.max_connections < config.max_threads_per_query + 1 {
            return Err(SnowflakeError::Config(format!(
                "max_connections ({}) must exceed max_threads_per_query ({})",
                config.max_connections, config.max_threads_per_query
            )));
        }
        let minter = JwtMinter::new(
            &config.private_key_pem,
            &config.organization,
            &config.account,
            &config.user,
        )?;
        let tokens = TokenCache::new(minter, config.jwt_ttl_secs);
        let pool = ConnectionPool::new(
            config.max_connections,
            Duration::from_secs(config.connection_timeout_secs),
        );
        let executor = Arc::new(RequestExecutor::new(
            base_url,
            pool,
            tokens,
            config.http_retries,
        ));
        Ok(SnowflakeClient {
            config: Arc::new(config),
            executor,
        })
    }

    /// Build a client from the `SNOWFLAKE_*` environment variables:
    /// `SNOWFLAKE_URI`, `SNOWFLAKE_PRIVATE_KEY` (or
    /// `SNOWFLAKE_PRIVATE_KEY_PATH`), `SNOWFLAKE_ORGANIZATION`,
    /// `SNOWFLAKE_ACCOUNT`, `SNOWFLAKE_USER`,
    /// `SNOWFLAKE_DEFAULT_WAREHOUSE`.
    pub fn connect() -> SnowflakeResult<SnowflakeClient> {
        let require = |name: &str| {
            std::env::var(name).map_err(|_| SnowflakeError::Config(format!("{name} is not set")))
        };
        let private_key_pem = match std::env::var("SNOWFLAKE_PRIVATE_KEY") {
            Ok(pem) => pem,
            Err(_) => {
                let path = require("SNOWFLAKE_PRIVATE_KEY_PATH")?;
                std::fs::read_to_string(&path).map_err(|e| {
                    SnowflakeError::Config(format!("could not read {path}: {e}"))
                })?
            }
        };
        SnowflakeClient::new(ClientConfig::new(
            require("SNOWFLAKE_URI")?,
            private_key_pem,
            require("SNOWFLAKE_ORGANIZATION")?,
            require("SNOWFLAKE_ACCOUNT")?,
            require("SNOWFLAKE_USER")?,
            require("SNOWFLAKE_DEFAULT_WAREHOUSE")?,
        ))
    }

    /// Prepare a statement for the configured default warehouse.
    pub fn prepare(&self, sql: &str) -> Statement {
        Statement::new(self.executor.clone(), self.config.clone(), sql)
    }

    /// Submit `sql` against the default warehouse and materialize the
    /// whole result.
    pub async fn query(&self, sql: &str) -> SnowflakeResult<QueryResult> {
        self.prepare(sql).query().await
    }

    /// Submit `sql` and stream the result lazily.
    pub async fn query_streaming(&self, sql: &str) -> SnowflakeResult<StreamingResult> {
        self.prepare(sql).query_streaming().await
    }
}
