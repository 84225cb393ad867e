#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use sentinel::adapters::sqlite_adapter::SqliteAdapter;
use sentinel::domain::account::Account;
use sentinel::domain::error::SentinelError;
use sentinel::domain::rules::{RuleConfig, TradingWindow};
use sentinel::domain::trade::{Direction, ProposedTrade};
use sentinel::ports::config_port::ConfigPort;
use sentinel::ports::market_data_port::{MarketDataPort, Quote, SymbolMatch};
use sentinel::ports::trade_store::TradeStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SESSION_SECRET: &str = "00000000000000000000000000000001\
                                  00000000000000000000000000000001\
                                  00000000000000000000000000000001\
                                  00000000000000000000000000000001";

pub fn memory_store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
}

/// Stores an account with a placeholder hash and returns its id.
pub fn seed_account(store: &dyn TradeStore, email: &str) -> String {
    let account = Account::new(email, "Test Trader", "not-a-real-hash".to_string()).unwrap();
    store.create_account(&account).unwrap();
    account.id
}

pub fn rules(max_trades: i64, max_loss: f64, window: Option<(&str, &str)>) -> RuleConfig {
    RuleConfig {
        max_daily_loss: max_loss,
        max_trades_per_day: max_trades,
        trading_window: window.map(|(s, e)| TradingWindow::parse(s, e).unwrap()),
        setup_complete: true,
        ..RuleConfig::default()
    }
}

pub fn long(symbol: &str, entry: f64, stop: f64, size: f64, exit: Option<f64>) -> ProposedTrade {
    ProposedTrade::new(symbol, Direction::Long, size, entry, stop, exit).unwrap()
}

pub fn short(symbol: &str, entry: f64, stop: f64, size: f64, exit: Option<f64>) -> ProposedTrade {
    ProposedTrade::new(symbol, Direction::Short, size, entry, stop, exit).unwrap()
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// In-memory config answering from a `(section, key) -> value` map.
#[derive(Default)]
pub struct MockConfigPort {
    values: HashMap<(String, String), String>,
}

impl MockConfigPort {
    pub fn new() -> Self {
        Self::default().with("auth", "session_secret", SESSION_SECRET)
    }

    pub fn with(mut self, section: &str, key: &str, value: &str) -> Self {
        self.values
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl ConfigPort for MockConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

/// Canned market data; a symbol listed in `failing` returns an error.
#[derive(Default)]
pub struct StubMarketData {
    pub quotes: HashMap<String, Quote>,
    pub matches: Vec<SymbolMatch>,
    pub failing: Vec<String>,
    /// Number of quote lookups served, shared with clones of the handle.
    pub quote_calls: Arc<AtomicUsize>,
}

impl StubMarketData {
    pub fn with_quote(mut self, symbol: &str, current: f64) -> Self {
        self.quotes.insert(
            symbol.to_string(),
            Quote {
                current,
                high: current + 1.0,
                low: current - 1.0,
                open: current,
                previous_close: current - 0.5,
                timestamp: 1_700_000_000,
            },
        );
        self
    }

    pub fn with_match(mut self, symbol: &str, description: &str) -> Self {
        self.matches.push(SymbolMatch {
            symbol: symbol.to_string(),
            description: description.to_string(),
            display_symbol: symbol.to_string(),
            kind: "Common Stock".to_string(),
        });
        self
    }

    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_string());
        self
    }
}

#[async_trait]
impl MarketDataPort for StubMarketData {
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, SentinelError> {
        let query = query.to_uppercase();
        Ok(self
            .matches
            .iter()
            .filter(|m| m.symbol.contains(&query))
            .cloned()
            .collect())
    }

    async fn quote(&self, symbol: &str) -> Result<Option<Quote>, SentinelError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let symbol = symbol.to_uppercase();
        if self.failing.contains(&symbol) {
            return Err(SentinelError::MarketData {
                reason: "provider unavailable".into(),
            });
        }
        Ok(self.quotes.get(&symbol).copied())
    }
}
