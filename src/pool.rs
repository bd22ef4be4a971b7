use std::time::Duration;

use tokio::sync::{OnceCell, Semaphore};

use crate::errors::{SnowflakeError, SnowflakeResult};

/// Bounds how many requests may be on the wire at once.
///
/// reqwest keeps its own keep-alive pool per host; what it does not provide
/// is a bounded checkout with a deadline, so a semaphore permit here stands
/// for "one of the `max_connections` connections". A permit is held for the
/// full lifetime of one request, including reading the body. The underlying
/// client is not built until the first checkout.
#[derive(Debug)]
pub(crate) struct ConnectionPool {
    permits: Semaphore,
    checkout_timeout: Duration,
    max_connections: usize,
    client: OnceCell<reqwest::Client>,
}

impl ConnectionPool {
    pub fn new(max_connections: usize, checkout_timeout: Duration) -> ConnectionPool {
        ConnectionPool {
            permits: Semaphore::new(max_connections),
            checkout_timeout,
            max_connections,
            client: OnceCell::new(),
        }
    }

    /// Run `f` with a checked-out connection.
    ///
    /// The permit is released on every exit path, including errors inside
    /// `f`. A transport error inside `f` leaves the broken connection to be
    /// dropped by reqwest rather than returned to its pool.
    pub async fn with<T, F, Fut>(&self, f: F) -> SnowflakeResult<T>
    where
        F: FnOnce(reqwest::Client) -> Fut,
        Fut: std::future::Future<Output = SnowflakeResult<T>>,
    {
        let _permit = tokio::time::timeout(self.checkout_timeout, self.permits.acquire())
            .await
            .map_err(|_| SnowflakeError::ConnectionStarved {
                waited_secs: self.checkout_timeout.as_secs(),
            })?
            .map_err(|_| SnowflakeError::Request("connection pool is closed".to_owned()))?;
        let client = self
            .client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .pool_max_idle_per_host(self.max_connections)
                    .build()
            })
            .await?;
        f(client.clone()).await
    }
}
