use super::{RangeQuery, RangeRequest};
use crate::{
    config::SupabaseConfig,
    error::DataError,
    sample::{Sample, SourceId, SourceSelector},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Row shape of the tick table written by the ingest bridge.
///
/// `price` is nullable upstream (eg/ an empty order book side), such rows are filtered
/// server-side.
#[derive(Debug, Deserialize)]
struct TickRow {
    time: DateTime<Utc>,
    source: SourceId,
    price: Option<Decimal>,
}

/// Range queries over a Supabase table via its PostgREST interface.
///
/// See docs: <https://postgrest.org/en/stable/references/api/tables_views.html>
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    endpoint: Url,
    config: SupabaseConfig,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Self::with_client(config, client)
    }

    /// Resolve `rest/v1/{table}` beneath the configured url, keeping any path prefix of a
    /// self-hosted gateway.
    pub fn with_client(config: SupabaseConfig, client: Client) -> Result<Self, DataError> {
        let mut base = Url::parse(config.url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(&format!("rest/v1/{}", config.table))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// Build the PostgREST url for a [`RangeRequest`].
    pub fn request_url(&self, request: &RangeRequest) -> Url {
        let column = self.config.time_column.as_str();
        let order = match &self.config.tiebreak_column {
            Some(tiebreak) => format!("{column}.asc,{tiebreak}.asc"),
            None => format!("{column}.asc"),
        };
        let source = match &request.selector {
            SourceSelector::Single(source) => format!("eq.{source}"),
            SourceSelector::Set(sources) => format!("in.({})", sources.iter().join(",")),
        };

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("select", &format!("time:{column},source,price"))
            .append_pair("source", &source)
            .append_pair(column, &format!("gte.{}", format_time(request.lower)))
            .append_pair(column, &format!("lte.{}", format_time(request.upper)))
            .append_pair("price", "not.is.null")
            .append_pair("order", &order)
            .append_pair("limit", &request.limit.to_string());
        url
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Wrap a transport fault with the feed it was fetching for.
fn fetch_fault(selector: &SourceSelector, error: reqwest::Error) -> DataError {
    DataError::Fetch {
        feed: selector.to_string(),
        transient: error.is_timeout() || error.is_connect() || error.is_request(),
        message: error.to_string(),
    }
}

fn parse_rows(body: &str) -> Result<Vec<Sample>, DataError> {
    let rows = serde_json::from_str::<Vec<TickRow>>(body)
        .map_err(|error| DataError::Deserialise(error.to_string()))?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            row.price
                .map(|price| Sample::new(row.time, row.source, price))
        })
        .collect())
}

#[async_trait]
impl RangeQuery for SupabaseStore {
    async fn query(&self, request: &RangeRequest) -> Result<Vec<Sample>, DataError> {
        let url = self.request_url(request);
        debug!(selector = %request.selector, lower = %request.lower, limit = request.limit, "querying Supabase range");

        let response = self
            .client
            .get(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|error| fetch_fault(&request.selector, error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| fetch_fault(&request.selector, error))?;

        if !status.is_success() {
            return Err(DataError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_rows(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_request_url() {
        struct TestCase {
            config: SupabaseConfig,
            request: RangeRequest,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: single source
                config: SupabaseConfig::new("https://desk.supabase.co/", "anon"),
                request: RangeRequest {
                    selector: SourceSelector::Single(SourceId::from("bitkub")),
                    lower: at(1_700_000_000),
                    upper: at(1_700_003_600),
                    limit: 1000,
                },
                expected: "https://desk.supabase.co/rest/v1/market_data?\
                    select=time%3Acreated_at%2Csource%2Cprice&\
                    source=eq.bitkub&\
                    created_at=gte.2023-11-14T22%3A13%3A20Z&\
                    created_at=lte.2023-11-14T23%3A13%3A20Z&\
                    price=not.is.null&\
                    order=created_at.asc&\
                    limit=1000",
            },
            TestCase {
                // TC1: source set ordered with a tiebreak column
                config: SupabaseConfig::new("https://desk.supabase.co", "anon")
                    .with_tiebreak_column("id"),
                request: RangeRequest {
                    selector: SourceSelector::Set(vec![
                        SourceId::from("bitkub"),
                        SourceId::from("binance_th"),
                    ]),
                    lower: at(1_700_000_000),
                    upper: at(1_700_003_600),
                    limit: 10,
                },
                expected: "https://desk.supabase.co/rest/v1/market_data?\
                    select=time%3Acreated_at%2Csource%2Cprice&\
                    source=in.%28bitkub%2Cbinance_th%29&\
                    created_at=gte.2023-11-14T22%3A13%3A20Z&\
                    created_at=lte.2023-11-14T23%3A13%3A20Z&\
                    price=not.is.null&\
                    order=created_at.asc%2Cid.asc&\
                    limit=10",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let store = SupabaseStore::new(test.config).unwrap();
            let actual = store.request_url(&test.request);
            let expected = test.expected.split_whitespace().collect::<String>();
            assert_eq!(actual.as_str(), expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_endpoint_keeps_gateway_path_prefix() {
        struct TestCase {
            url: &'static str,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: bare project url
                url: "https://desk.supabase.co",
                expected: "https://desk.supabase.co/rest/v1/market_data",
            },
            TestCase {
                // TC1: self-hosted gateway prefix without trailing slash
                url: "https://desk.internal/supabase",
                expected: "https://desk.internal/supabase/rest/v1/market_data",
            },
            TestCase {
                // TC2: self-hosted gateway prefix with trailing slash
                url: "https://desk.internal/supabase/",
                expected: "https://desk.internal/supabase/rest/v1/market_data",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let store = SupabaseStore::new(SupabaseConfig::new(test.url, "anon")).unwrap();
            assert_eq!(store.endpoint.as_str(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_parse_rows() {
        let body = r#"[
            { "time": "2024-03-01T08:00:00.123456+00:00", "source": "bitkub", "price": 35.91 },
            { "time": "2024-03-01T08:00:01+00:00", "source": "maxbit", "price": null },
            { "time": "2024-03-01T08:00:02+00:00", "source": "binance_th", "price": "35.88" }
        ]"#;

        let samples = parse_rows(body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].source, SourceId::from("bitkub"));
        assert_eq!(samples[0].price, dec!(35.91));
        assert_eq!(samples[0].time.timestamp_subsec_micros(), 123_456);
        assert_eq!(samples[1].source, SourceId::from("binance_th"));
        assert_eq!(samples[1].price, dec!(35.88));
    }

    #[test]
    fn test_parse_rows_invalid() {
        assert!(matches!(
            parse_rows(r#"{ "message": "JWT expired" }"#),
            Err(DataError::Deserialise(_))
        ));
    }

    #[tokio::test]
    async fn test_query_connection_refused_is_transient_fetch_fault() {
        // Nothing listens on the discard port of the loopback interface
        let store = SupabaseStore::new(SupabaseConfig::new("http://127.0.0.1:9", "anon")).unwrap();
        let request = RangeRequest {
            selector: SourceSelector::Single(SourceId::from("maxbit")),
            lower: at(0),
            upper: at(60),
            limit: 10,
        };

        let error = store.query(&request).await.unwrap_err();
        assert!(error.is_retryable());
        assert!(matches!(error, DataError::Fetch { ref feed, .. } if feed == "maxbit"));
    }
}
