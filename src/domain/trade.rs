//! Trade model, input validation and risk arithmetic.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::error::SentinelError;

const MAX_SYMBOL_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            "" => Err(SentinelError::invalid("direction", "is required")),
            other => Err(SentinelError::invalid(
                "direction",
                format!("unknown direction '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Ok(TradeStatus::Open),
            "CLOSED" => Ok(TradeStatus::Closed),
            other => Err(SentinelError::invalid(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

/// `|entry - stop| * size`: the currency amount at risk if the stop is hit.
pub fn risk_amount(entry_price: f64, stop_loss: f64, size: f64) -> f64 {
    (entry_price - stop_loss).abs() * size
}

pub fn realized_pnl(direction: Direction, entry_price: f64, exit_price: f64, size: f64) -> f64 {
    match direction {
        Direction::Long => (exit_price - entry_price) * size,
        Direction::Short => (entry_price - exit_price) * size,
    }
}

/// Back-calculates the stop loss from a stored risk amount.
///
/// Returns `None` when the size is zero and the stop cannot be recovered.
pub fn recover_stop_loss(
    direction: Direction,
    entry_price: f64,
    risk_amount: f64,
    size: f64,
) -> Option<f64> {
    if size == 0.0 || !size.is_finite() {
        return None;
    }
    let distance = risk_amount / size;
    Some(match direction {
        Direction::Long => entry_price - distance,
        Direction::Short => entry_price + distance,
    })
}

/// Raw trade-entry fields exactly as submitted. Empty strings mean "missing".
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct TradeTicket {
    pub symbol: String,
    pub direction: String,
    pub size: String,
    pub entry_price: String,
    pub stop_loss: String,
    pub exit_price: String,
}

impl TradeTicket {
    /// Parses and validates the ticket into a [`ProposedTrade`].
    pub fn validate(&self) -> Result<ProposedTrade, SentinelError> {
        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(SentinelError::invalid("symbol", "is required"));
        }
        if symbol.len() > MAX_SYMBOL_LEN {
            return Err(SentinelError::invalid(
                "symbol",
                format!("must be at most {MAX_SYMBOL_LEN} characters"),
            ));
        }

        let direction: Direction = self.direction.parse()?;
        let entry_price = parse_positive("entry_price", &self.entry_price)?;
        let stop_loss = parse_positive("stop_loss", &self.stop_loss)?;
        let size = parse_positive("size", &self.size)?;
        let exit_price = if self.exit_price.trim().is_empty() {
            None
        } else {
            Some(parse_positive("exit_price", &self.exit_price)?)
        };

        ProposedTrade::new(symbol, direction, size, entry_price, stop_loss, exit_price)
    }
}

pub fn parse_positive(field: &str, raw: &str) -> Result<f64, SentinelError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SentinelError::invalid(field, "is required"));
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| SentinelError::invalid(field, format!("'{raw}' is not a number")))?;
    if !value.is_finite() {
        return Err(SentinelError::invalid(field, format!("'{raw}' is not a number")));
    }
    if value <= 0.0 {
        return Err(SentinelError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

/// A validated trade that has not been persisted yet.
///
/// Construction enforces stop-loss geometry, so every value of this type has a
/// non-negative risk amount consistent with its direction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedTrade {
    symbol: String,
    direction: Direction,
    size: f64,
    entry_price: f64,
    stop_loss: f64,
    exit_price: Option<f64>,
}

impl ProposedTrade {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        size: f64,
        entry_price: f64,
        stop_loss: f64,
        exit_price: Option<f64>,
    ) -> Result<Self, SentinelError> {
        match direction {
            Direction::Long if stop_loss >= entry_price => {
                return Err(SentinelError::invalid(
                    "stop_loss",
                    "for LONG trades the stop loss must be below the entry price",
                ));
            }
            Direction::Short if stop_loss <= entry_price => {
                return Err(SentinelError::invalid(
                    "stop_loss",
                    "for SHORT trades the stop loss must be above the entry price",
                ));
            }
            _ => {}
        }

        let trade = Self {
            symbol: symbol.into(),
            direction,
            size,
            entry_price,
            stop_loss,
            exit_price,
        };
        if !trade.risk_amount().is_finite() {
            return Err(SentinelError::invalid("size", "risk amount is out of range"));
        }
        if trade.pnl().is_some_and(|pnl| !pnl.is_finite()) {
            return Err(SentinelError::invalid("exit_price", "PnL is out of range"));
        }
        Ok(trade)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    pub fn status(&self) -> TradeStatus {
        if self.exit_price.is_some() {
            TradeStatus::Closed
        } else {
            TradeStatus::Open
        }
    }

    pub fn risk_amount(&self) -> f64 {
        risk_amount(self.entry_price, self.stop_loss, self.size)
    }

    /// Realized PnL, present only for closed trades.
    pub fn pnl(&self) -> Option<f64> {
        self.exit_price
            .map(|exit| realized_pnl(self.direction, self.entry_price, exit, self.size))
    }
}

/// A persisted trade.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Trade {
    pub id: i64,
    pub user_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub size: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub status: TradeStatus,
    pub risk_amount: f64,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn is_closed(&self) -> bool {
        self.status == TradeStatus::Closed
    }

    pub fn is_win(&self) -> bool {
        self.is_closed() && self.pnl.is_some_and(|p| p > 0.0)
    }

    /// Stop loss as shown on the edit form, derived from the stored risk amount.
    pub fn display_stop_loss(&self) -> f64 {
        recover_stop_loss(self.direction, self.entry_price, self.risk_amount, self.size)
            .unwrap_or(self.stop_loss)
    }

    /// Closes the trade at `exit_price`, returning the realized PnL.
    pub fn close_pnl(&self, exit_price: f64) -> Result<f64, SentinelError> {
        if self.is_closed() {
            return Err(SentinelError::invalid("trade", "is already closed"));
        }
        Ok(realized_pnl(self.direction, self.entry_price, exit_price, self.size))
    }
}

/// Prefills the edit form. The stop is recovered from the stored risk amount.
impl From<&Trade> for TradeTicket {
    fn from(trade: &Trade) -> Self {
        Self {
            symbol: trade.symbol.clone(),
            direction: trade.direction.as_str().to_string(),
            size: trade.size.to_string(),
            entry_price: trade.entry_price.to_string(),
            stop_loss: trade.display_stop_loss().to_string(),
            exit_price: trade.exit_price.map(|p| p.to_string()).unwrap_or_default(),
        }
    }
}
