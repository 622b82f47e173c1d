use crate::error::DataError;
use serde::Deserialize;
use std::time::Duration;

/// Default number of samples requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default ceiling on samples fetched by a single streamer run.
pub const DEFAULT_SAFETY_LIMIT: usize = 500_000;

/// Default timeout applied to each page fetch.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default Supabase table the ingest bridge inserts ticks into.
pub const DEFAULT_TABLE: &str = "market_data";

/// Default timestamp column of [`DEFAULT_TABLE`].
pub const DEFAULT_TIME_COLUMN: &str = "created_at";

/// Paginated Range Streamer configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum samples requested per page
    pub page_size: usize,
    /// Maximum samples fetched across all pages of one run
    pub safety_limit: usize,
    /// Timeout for each page fetch, `None` waits indefinitely
    pub page_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            safety_limit: DEFAULT_SAFETY_LIMIT,
            page_timeout: Some(DEFAULT_PAGE_TIMEOUT),
        }
    }
}

impl StreamConfig {
    /// Set page size, clamped to at least one sample
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set safety limit, clamped to at least one sample
    pub fn with_safety_limit(mut self, safety_limit: usize) -> Self {
        self.safety_limit = safety_limit.max(1);
        self
    }

    /// Set page timeout
    pub fn with_page_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Page size and safety limit with deserialised zero values lifted to one.
    pub(crate) fn effective_limits(&self) -> (usize, usize) {
        (self.page_size.max(1), self.safety_limit.max(1))
    }
}

/// Series engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stream: StreamConfig,
}

impl EngineConfig {
    pub fn new(stream: StreamConfig) -> Self {
        Self { stream }
    }

    /// Set stream config
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }
}

/// Connection settings for the Supabase (PostgREST) price-tick table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupabaseConfig {
    /// Project url, eg/ `https://xyzcompany.supabase.co`
    pub url: String,
    /// Anon or service role key
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_time_column")]
    pub time_column: String,
    /// Secondary sort column giving samples that share a timestamp a stable order, eg/ `id`
    #[serde(default)]
    pub tiebreak_column: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_time_column() -> String {
    DEFAULT_TIME_COLUMN.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: default_table(),
            time_column: default_time_column(),
            tiebreak_column: None,
            request_timeout: default_request_timeout(),
        }
    }

    /// Load from `PUBLIC_SUPABASE_URL`, `PUBLIC_SUPABASE_ANON_KEY` and the optional
    /// `DESK_DATA_TABLE` and `DESK_DATA_TIEBREAK_COLUMN` environment variables.
    pub fn from_env() -> Result<Self, DataError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, DataError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| DataError::Config(format!("{key} not set")))
        };

        let mut config = Self::new(
            required("PUBLIC_SUPABASE_URL")?,
            required("PUBLIC_SUPABASE_ANON_KEY")?,
        );
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(table) = optional("DESK_DATA_TABLE") {
            config.table = table;
        }
        config.tiebreak_column = optional("DESK_DATA_TIEBREAK_COLUMN");

        Ok(config)
    }

    /// Set tiebreak column
    pub fn with_tiebreak_column(mut self, column: impl Into<String>) -> Self {
        self.tiebreak_column = Some(column.into());
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_stream_config_builders_clamp() {
        let config = StreamConfig::default()
            .with_page_size(0)
            .with_safety_limit(0)
            .with_page_timeout(None);

        assert_eq!(config.page_size, 1);
        assert_eq!(config.safety_limit, 1);
        assert_eq!(config.page_timeout, None);
    }

    #[test]
    fn test_stream_config_deserialise() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "stream": { "page_size": 250, "page_timeout": { "secs": 2, "nanos": 0 } } }"#,
        )
        .unwrap();

        assert_eq!(config.stream.page_size, 250);
        assert_eq!(config.stream.safety_limit, DEFAULT_SAFETY_LIMIT);
        assert_eq!(config.stream.page_timeout, Some(Duration::from_secs(2)));

        let zeroed: StreamConfig =
            serde_json::from_str(r#"{ "page_size": 0, "safety_limit": 0 }"#).unwrap();
        assert_eq!(zeroed.effective_limits(), (1, 1));
    }

    #[test]
    fn test_supabase_config_from_lookup() {
        struct TestCase {
            env: Vec<(&'static str, &'static str)>,
            expected: Result<(&'static str, &'static str, Option<&'static str>), DataError>,
        }

        let tests = vec![
            TestCase {
                // TC0: url and key present, default table
                env: vec![
                    ("PUBLIC_SUPABASE_URL", "https://desk.supabase.co"),
                    ("PUBLIC_SUPABASE_ANON_KEY", "anon"),
                ],
                expected: Ok(("https://desk.supabase.co", "market_data", None)),
            },
            TestCase {
                // TC1: table and tiebreak overrides
                env: vec![
                    ("PUBLIC_SUPABASE_URL", "https://desk.supabase.co"),
                    ("PUBLIC_SUPABASE_ANON_KEY", "anon"),
                    ("DESK_DATA_TABLE", "market_data_archive"),
                    ("DESK_DATA_TIEBREAK_COLUMN", "id"),
                ],
                expected: Ok(("https://desk.supabase.co", "market_data_archive", Some("id"))),
            },
            TestCase {
                // TC2: missing key
                env: vec![("PUBLIC_SUPABASE_URL", "https://desk.supabase.co")],
                expected: Err(DataError::Config(
                    "PUBLIC_SUPABASE_ANON_KEY not set".to_string(),
                )),
            },
            TestCase {
                // TC3: blank url
                env: vec![
                    ("PUBLIC_SUPABASE_URL", "  "),
                    ("PUBLIC_SUPABASE_ANON_KEY", "anon"),
                ],
                expected: Err(DataError::Config("PUBLIC_SUPABASE_URL not set".to_string())),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let env = test
                .env
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<HashMap<_, _>>();

            let actual = SupabaseConfig::from_lookup(|key| env.get(key).cloned())
                .map(|config| (config.url, config.table, config.tiebreak_column));
            let expected = test.expected.map(|(url, table, tiebreak)| {
                (url.to_string(), table.to_string(), tiebreak.map(str::to_string))
            });

            assert_eq!(actual, expected, "TC{} failed", index);
        }
    }
}
