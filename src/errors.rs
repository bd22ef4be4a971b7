#[derive(thiserror::Error, Debug)]
pub enum SnowflakeError {
    /// The client was constructed with an unusable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The transport failed before a response could be classified.
    #[error("connection failure: {0}")]
    Connection(#[from] reqwest::Error),

    /// No pooled connection became available within the checkout deadline.
    #[error("no connection available after {waited_secs}s")]
    ConnectionStarved { waited_secs: u64 },

    /// Snowflake answered with a terminal status, or retries ran out.
    #[error("Snowflake returned HTTP {status}: {body}")]
    BadResponse { status: u16, body: String },

    /// The request could not be put together in the first place.
    #[error("could not build request: {0}")]
    Request(String),
}

pub type SnowflakeResult<T> = Result<T, SnowflakeError>;
