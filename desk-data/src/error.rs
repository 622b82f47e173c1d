use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// All errors generated in `desk-data`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum DataError {
    /// Transport fault while querying the store for `feed`.
    #[error("range query for {feed} failed: {message}")]
    Fetch {
        feed: String,
        message: String,
        transient: bool,
    },

    #[error("range query timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to deserialise range query response: {0}")]
    Deserialise(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid time window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl DataError {
    /// Determine if a caller could reasonably retry the operation that produced this error.
    ///
    /// The streaming engine itself never retries, this classification is for the remote store
    /// collaborator or the consumer.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::Timeout { .. } | DataError::Http(_) => true,
            DataError::Status { status, .. } => *status == 429 || *status >= 500,
            DataError::Fetch { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Http(format!("timeout: {value}"));
        }
        Self::Http(value.to_string())
    }
}

impl From<url::ParseError> for DataError {
    fn from(value: url::ParseError) -> Self {
        Self::Config(format!("invalid url: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_is_retryable() {
        struct TestCase {
            input: DataError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: timeout is retryable
                input: DataError::Timeout {
                    after: Duration::from_secs(30),
                },
                expected: true,
            },
            TestCase {
                // TC1: transport error is retryable
                input: DataError::Http("error sending request".to_string()),
                expected: true,
            },
            TestCase {
                // TC2: 503 is retryable
                input: DataError::Status {
                    status: 503,
                    body: String::new(),
                },
                expected: true,
            },
            TestCase {
                // TC3: 400 is not retryable
                input: DataError::Status {
                    status: 400,
                    body: "column market_data.pricee does not exist".to_string(),
                },
                expected: false,
            },
            TestCase {
                // TC4: transient fetch fault is retryable
                input: DataError::Fetch {
                    feed: "bitkub".to_string(),
                    message: "error sending request".to_string(),
                    transient: true,
                },
                expected: true,
            },
            TestCase {
                // TC5: fetch fault reading a truncated body is not retryable
                input: DataError::Fetch {
                    feed: "bitkub".to_string(),
                    message: "error decoding response body".to_string(),
                    transient: false,
                },
                expected: false,
            },
            TestCase {
                // TC6: config error is not retryable
                input: DataError::Config("PUBLIC_SUPABASE_URL not set".to_string()),
                expected: false,
            },
            TestCase {
                // TC7: malformed payload is not retryable
                input: DataError::Deserialise("expected value at line 1".to_string()),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_retryable();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
