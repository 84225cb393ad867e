//! Finnhub market-data client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::domain::error::SentinelError;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::{MarketDataPort, Quote, SymbolMatch, MIN_SEARCH_LEN};

pub const FINNHUB_API_URL: &str = "https://finnhub.io/api/v1";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SymbolMatch>,
}

pub struct FinnhubAdapter {
    http: Client,
    base_url: String,
    api_key: String,
}

impl FinnhubAdapter {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, SentinelError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(market_err)?;
        Ok(Self {
            http,
            base_url: FINNHUB_API_URL.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SentinelError> {
        let api_key = config
            .get_string("market_data", "finnhub_api_key")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SentinelError::ConfigMissing {
                section: "market_data".into(),
                key: "finnhub_api_key".into(),
            })?;
        let timeout = config.get_int("market_data", "timeout_secs", 5).max(1) as u64;
        let base_url = config.get_string_or("market_data", "base_url", FINNHUB_API_URL);

        Ok(Self::new(api_key, Duration::from_secs(timeout))?.with_base_url(base_url))
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SentinelError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "finnhub request");

        self.http
            .get(&url)
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(market_err)?
            .json::<T>()
            .await
            .map_err(market_err)
    }
}

fn market_err(e: reqwest::Error) -> SentinelError {
    SentinelError::MarketData {
        reason: e.to_string(),
    }
}

/// Finnhub answers unknown symbols with an all-zero quote.
fn known_quote(quote: Quote) -> Option<Quote> {
    (quote.current > 0.0).then_some(quote)
}

#[async_trait]
impl MarketDataPort for FinnhubAdapter {
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, SentinelError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Ok(Vec::new());
        }
        let response: SearchResponse = self.get("/search", &[("q", query)]).await?;
        Ok(response.result)
    }

    async fn quote(&self, symbol: &str) -> Result<Option<Quote>, SentinelError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Ok(None);
        }
        let quote: Quote = self.get("/quote", &[("symbol", symbol.as_str())]).await?;
        Ok(known_quote(quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapConfig(HashMap<(&'static str, &'static str), &'static str>);

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section, key)).map(|v| v.to_string())
        }
        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = MapConfig(HashMap::from([(("market_data", "finnhub_api_key"), "  ")]));
        match FinnhubAdapter::from_config(&config) {
            Err(SentinelError::ConfigMissing { section, key }) => {
                assert_eq!(section, "market_data");
                assert_eq!(key, "finnhub_api_key");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn from_config_uses_custom_base_url() {
        let config = MapConfig(HashMap::from([
            (("market_data", "finnhub_api_key"), "abc"),
            (("market_data", "base_url"), "http://localhost:9999/api/"),
        ]));
        let adapter = FinnhubAdapter::from_config(&config).unwrap();
        assert_eq!(adapter.base_url(), "http://localhost:9999/api");
    }

    #[test]
    fn zero_quote_means_unknown_symbol() {
        let zero: Quote =
            serde_json::from_str(r#"{"c":0,"h":0,"l":0,"o":0,"pc":0,"t":0}"#).unwrap();
        assert!(known_quote(zero).is_none());
    }

    #[test]
    fn search_response_tolerates_missing_result() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"count":0}"#).unwrap();
        assert!(parsed.result.is_empty());
    }

    #[tokio::test]
    async fn short_queries_skip_the_network() {
        let adapter = FinnhubAdapter::new("abc", Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(adapter.search_symbols(" a ").await.unwrap().is_empty());
        assert!(adapter.quote("  ").await.unwrap().is_none());
    }
}
