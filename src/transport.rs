use std::time::Instant;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{SnowflakeError, SnowflakeResult};
use crate::pool::ConnectionPool;
use crate::token::TokenCache;

const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";

/// Sends one logical request, retrying over the status codes this Service
/// treats as transient.
#[derive(Debug)]
pub(crate) struct RequestExecutor {
    base_url: Url,
    pool: ConnectionPool,
    tokens: TokenCache,
    http_retries: u32,
}

/// The set is Snowflake-specific: 400 and 405 show up transiently there, and
/// 403 is what it answers when a token expired while the request was in
/// flight. The token is re-read on every attempt, so a retried 403 goes out
/// with a fresh JWT.
fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 403 | 405 | 408 | 429) || status.is_server_error()
}

impl RequestExecutor {
    pub fn new(
        base_url: Url,
        pool: ConnectionPool,
        tokens: TokenCache,
        http_retries: u32,
    ) -> RequestExecutor {
        RequestExecutor {
            base_url,
            pool,
            tokens,
            http_retries,
        }
    }

    /// Send `method` to `path_and_query` under the base URL and deserialize
    /// the 200 response body as `T`.
    ///
    /// Non-200 statuses in the retryable set are attempted up to
    /// `http_retries + 1` times in total; everything else fails immediately
    /// with the status and body. Transport errors are never retried.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<&impl Serialize>,
    ) -> SnowflakeResult<T> {
        let url = self.base_url.join(path_and_query).map_err(|e| {
            SnowflakeError::Request(format!("bad request path {path_and_query}: {e}"))
        })?;
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| SnowflakeError::Request(format!("unserializable body: {e}")))?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let token = self.tokens.current_token().await?;
            let started = Instant::now();
            let (status, text) = self
                .pool
                .with(|client| {
                    let mut request = client
                        .request(method.clone(), url.clone())
                        .header(CONTENT_TYPE, "application/json")
                        .header(ACCEPT, "application/json")
                        .header(AUTHORIZATION, format!("Bearer {token}"))
                        .header(TOKEN_TYPE_HEADER, "KEYPAIR_JWT");
                    if let Some(body) = &body {
                        request = request.body(body.clone());
                    }
                    async move {
                        let response = request.send().await?;
                        let status = response.status();
                        let text = response.text().await?;
                        Ok((status, text))
                    }
                })
                .await?;
            log::debug!(
                "{method} {} -> {status} in {:?}",
                url.path(),
                started.elapsed()
            );

            if status == StatusCode::OK {
                return serde_json::from_str(&text).map_err(|e| {
                    log::debug!("Unparseable 200 response: {e}");
                    SnowflakeError::BadResponse {
                        status: status.as_u16(),
                        body: text,
                    }
                });
            }
            let error = SnowflakeError::BadResponse {
                status: status.as_u16(),
                body: text,
            };
            if is_retryable(status) && attempt <= self.http_retries {
                log::info!("Retry attempt {attempt} because {error}");
                continue;
            }
            return Err(error);
        }
    }
}
