//! Trade admission evaluator.
//!
//! Pure decision logic over plain data: rule configuration, today's
//! aggregates, the lock flag and the time of day. Persistence of the outcome
//! is performed by the caller (see [`super::submission`]).
//!
//! Rules are checked in a fixed order and the first match wins:
//!
//! 1. an existing lock for the reference day
//! 2. the trade-count cap
//! 3. the trading window
//!
//! The daily-loss cap is evaluated after the trade is written, see
//! [`check_daily_loss`].

use chrono::NaiveTime;
use serde_json::json;

use super::rules::RuleConfig;
use super::trade::{ProposedTrade, TradeStatus};
use super::violation::ViolationReason;

/// Aggregates over the trades executed since the start of the reference day.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DayStats {
    pub realized_pnl: f64,
    pub trade_count: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AdmissionContext<'a> {
    pub rules: &'a RuleConfig,
    pub stats: DayStats,
    pub locked: bool,
    pub time_of_day: NaiveTime,
}

/// A rejected (or, for the daily-loss rule, flagged) action.
#[derive(Debug, Clone, PartialEq)]
pub struct Blocked {
    pub reason: ViolationReason,
    pub details: serde_json::Value,
}

impl Blocked {
    fn new(reason: ViolationReason, details: serde_json::Value) -> Self {
        Self { reason, details }
    }

    /// Whether a daily lock must accompany the violation record.
    pub fn creates_lock(&self) -> bool {
        self.reason.locks_session()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    Allowed,
    Blocked(Blocked),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }
}

/// Decides whether `trade` may be written.
pub fn evaluate(trade: &ProposedTrade, ctx: &AdmissionContext<'_>) -> AdmissionDecision {
    if ctx.locked {
        return AdmissionDecision::Blocked(Blocked::new(
            ViolationReason::LockedSessionAttempt,
            json!({ "symbol": trade.symbol() }),
        ));
    }

    if ctx.stats.trade_count >= ctx.rules.max_trades_per_day {
        return AdmissionDecision::Blocked(Blocked::new(
            ViolationReason::MaxTradesExceeded,
            json!({
                "limit": ctx.rules.max_trades_per_day,
                "current": ctx.stats.trade_count,
            }),
        ));
    }

    if let Some(window) = ctx.rules.trading_window {
        if !window.is_open_at(ctx.time_of_day) {
            return AdmissionDecision::Blocked(Blocked::new(
                ViolationReason::TimeWindowViolation,
                json!({ "window": window.label() }),
            ));
        }
    }

    AdmissionDecision::Allowed
}

/// Post-insert check: does this closing loss push the day past the cap?
///
/// `before` must be the aggregates read before the trade was written. Only a
/// closed trade with a negative PnL can trip the rule.
pub fn check_daily_loss(
    trade: &ProposedTrade,
    rules: &RuleConfig,
    before: DayStats,
) -> Option<Blocked> {
    if trade.status() != TradeStatus::Closed {
        return None;
    }
    let pnl = trade.pnl()?;
    if pnl >= 0.0 {
        return None;
    }

    let running = before.realized_pnl + pnl;
    if running <= rules.loss_floor() {
        Some(Blocked::new(
            ViolationReason::MaxLossHit,
            json!({ "limit": rules.max_daily_loss, "current": running }),
        ))
    } else {
        None
    }
}
