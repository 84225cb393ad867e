//! Market-data port: symbol search and quotes used to prefill the trade form.

use async_trait::async_trait;

use crate::domain::error::SentinelError;

/// Queries shorter than this return no matches.
pub const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SymbolMatch {
    #[serde(rename = "displaySymbol")]
    pub display_symbol: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Quote {
    #[serde(rename = "c")]
    pub current: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "pc")]
    pub previous_close: f64,
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// Advisory only: callers must treat errors as "no data", never as a reason
/// to reject a trade.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, SentinelError>;

    async fn quote(&self, symbol: &str) -> Result<Option<Quote>, SentinelError>;
}

/// Used when no market-data provider is configured.
pub struct NoMarketData;

#[async_trait]
impl MarketDataPort for NoMarketData {
    async fn search_symbols(&self, _query: &str) -> Result<Vec<SymbolMatch>, SentinelError> {
        Ok(Vec::new())
    }

    async fn quote(&self, _symbol: &str) -> Result<Option<Quote>, SentinelError> {
        Ok(None)
    }
}
