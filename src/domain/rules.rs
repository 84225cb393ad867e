//! Per-user risk rule configuration and trading-window arithmetic.

use chrono::{NaiveTime, Timelike};
use chrono_tz::Tz;

use super::error::SentinelError;

pub const DEFAULT_MAX_DAILY_LOSS: f64 = 500.0;
pub const DEFAULT_MAX_TRADES_PER_DAY: i64 = 5;
pub const DEFAULT_MAX_RISK_PERCENT: f64 = 1.0;

// Fallbacks applied when the settings form carries a non-numeric value.
const SETTINGS_FALLBACK_MAX_RISK: f64 = 1.0;
const SETTINGS_FALLBACK_MAX_LOSS: f64 = 100.0;
const SETTINGS_FALLBACK_MAX_TRADES: i64 = 5;

/// Parses `HH:MM` (seconds are accepted and kept).
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, SentinelError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| SentinelError::invalid("time", format!("'{raw}' is not a HH:MM time")))
}

fn minutes_since_midnight(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// A daily trading window, inclusive on both ends. `end < start` wraps past
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, SentinelError> {
        Ok(Self::new(parse_time_of_day(start)?, parse_time_of_day(end)?))
    }

    pub fn is_overnight(&self) -> bool {
        minutes_since_midnight(self.end) < minutes_since_midnight(self.start)
    }

    /// Compares at minute resolution, so 16:00:45 still counts as 16:00.
    pub fn is_open_at(&self, now: NaiveTime) -> bool {
        let now = minutes_since_midnight(now);
        let start = minutes_since_midnight(self.start);
        let end = minutes_since_midnight(self.end);
        if end < start {
            !(now > end && now < start)
        } else {
            !(now < start || now > end)
        }
    }

    /// `HH:MM-HH:MM`, as recorded on time-window violations.
    pub fn label(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    pub max_risk_per_trade_percent: f64,
    pub max_daily_loss: f64,
    pub max_trades_per_day: i64,
    pub trading_window: Option<TradingWindow>,
    pub timezone: Tz,
    pub setup_complete: bool,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade_percent: DEFAULT_MAX_RISK_PERCENT,
            max_daily_loss: DEFAULT_MAX_DAILY_LOSS,
            max_trades_per_day: DEFAULT_MAX_TRADES_PER_DAY,
            trading_window: None,
            timezone: Tz::UTC,
            setup_complete: false,
        }
    }
}

impl RuleConfig {
    /// Running PnL at or below this value trips the daily loss rule.
    pub fn loss_floor(&self) -> f64 {
        -self.max_daily_loss.abs()
    }

    pub fn window_start(&self) -> Option<NaiveTime> {
        self.trading_window.map(|w| w.start)
    }

    pub fn window_end(&self) -> Option<NaiveTime> {
        self.trading_window.map(|w| w.end)
    }
}

pub fn parse_timezone(raw: &str) -> Result<Tz, SentinelError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Tz::UTC);
    }
    raw.parse::<Tz>()
        .map_err(|_| SentinelError::invalid("timezone", format!("unknown timezone '{raw}'")))
}

/// Settings form as submitted from onboarding or the settings page.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub max_risk_per_trade_percent: String,
    pub max_daily_loss: String,
    pub max_trades_per_day: String,
    pub trading_window_start: String,
    pub trading_window_end: String,
    pub timezone: String,
    pub setup_complete: Option<bool>,
}

impl RuleSettings {
    /// Coerces the form into a [`RuleConfig`].
    ///
    /// Non-numeric limits fall back to conservative defaults; a half-configured
    /// window or an unknown timezone is an input error.
    pub fn into_config(self) -> Result<RuleConfig, SentinelError> {
        let max_risk = self
            .max_risk_per_trade_percent
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(SETTINGS_FALLBACK_MAX_RISK);
        let max_loss = self
            .max_daily_loss
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(SETTINGS_FALLBACK_MAX_LOSS);
        let max_trades = self
            .max_trades_per_day
            .trim()
            .parse::<i64>()
            .unwrap_or(SETTINGS_FALLBACK_MAX_TRADES);

        if max_risk < 0.0 {
            return Err(SentinelError::invalid(
                "max_risk_per_trade_percent",
                "must not be negative",
            ));
        }
        if max_trades < 0 {
            return Err(SentinelError::invalid(
                "max_trades_per_day",
                "must not be negative",
            ));
        }

        let start = self.trading_window_start.trim();
        let end = self.trading_window_end.trim();
        let trading_window = match (start.is_empty(), end.is_empty()) {
            (true, true) => None,
            (false, false) => Some(TradingWindow::parse(start, end)?),
            _ => {
                return Err(SentinelError::invalid(
                    "trading_window",
                    "both start and end are required",
                ));
            }
        };

        Ok(RuleConfig {
            max_risk_per_trade_percent: max_risk,
            max_daily_loss: max_loss.abs(),
            max_trades_per_day: max_trades,
            trading_window,
            timezone: parse_timezone(&self.timezone)?,
            setup_complete: self.setup_complete.unwrap_or(true),
        })
    }
}

impl From<&RuleConfig> for RuleSettings {
    fn from(rules: &RuleConfig) -> Self {
        let hhmm = |t: Option<NaiveTime>| {
            t.map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default()
        };
        Self {
            max_risk_per_trade_percent: rules.max_risk_per_trade_percent.to_string(),
            max_daily_loss: rules.max_daily_loss.to_string(),
            max_trades_per_day: rules.max_trades_per_day.to_string(),
            trading_window_start: hhmm(rules.window_start()),
            trading_window_end: hhmm(rules.window_end()),
            timezone: rules.timezone.name().to_string(),
            setup_complete: Some(rules.setup_complete),
        }
    }
}
