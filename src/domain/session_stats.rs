//! Dashboard view of the current trading session.

use super::clock::ReferenceClock;
use super::rules::RuleConfig;
use super::trade::Trade;
use super::violation::{DailyLock, ViolationReason};

pub const RECENT_TRADES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Locked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Locked => "LOCKED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub daily_pnl: f64,
    pub trade_count: i64,
    pub closed_count: usize,
    /// Percentage of today's closed trades with positive PnL, rounded.
    pub win_rate: u32,
    pub loss_limit_hit: bool,
    pub trade_limit_hit: bool,
    pub outside_window: bool,
    pub lock_reason: Option<ViolationReason>,
}

impl SessionStats {
    /// `trades` may include older rows; only those executed since the
    /// reference-day start are counted.
    pub fn compute(
        trades: &[Trade],
        rules: &RuleConfig,
        clock: &ReferenceClock,
        lock: Option<&DailyLock>,
    ) -> Self {
        let day_start = clock.day_start();
        let today: Vec<&Trade> = trades.iter().filter(|t| t.executed_at >= day_start).collect();

        let daily_pnl: f64 = today.iter().filter_map(|t| t.pnl).sum();
        let trade_count = today.len() as i64;
        let closed: Vec<&&Trade> = today.iter().filter(|t| t.is_closed()).collect();
        let wins = closed.iter().filter(|t| t.is_win()).count();
        let win_rate = if closed.is_empty() {
            0
        } else {
            ((wins as f64 / closed.len() as f64) * 100.0).round() as u32
        };

        let outside_window = rules
            .trading_window
            .is_some_and(|w| !w.is_open_at(clock.local_time()));

        Self {
            daily_pnl,
            trade_count,
            closed_count: closed.len(),
            win_rate,
            loss_limit_hit: daily_pnl <= rules.loss_floor(),
            trade_limit_hit: trade_count >= rules.max_trades_per_day,
            outside_window,
            lock_reason: lock.map(|l| l.reason),
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.loss_limit_hit
            || self.trade_limit_hit
            || self.outside_window
            || self.lock_reason.is_some()
        {
            SessionStatus::Locked
        } else {
            SessionStatus::Active
        }
    }

    /// Share of the loss cap already used, clamped to 0..=100.
    pub fn loss_usage_percent(&self, rules: &RuleConfig) -> f64 {
        let cap = rules.max_daily_loss.abs();
        if cap == 0.0 || self.daily_pnl >= 0.0 {
            return 0.0;
        }
        (self.daily_pnl.abs() / cap * 100.0).min(100.0)
    }
}

/// The newest trades first, at most [`RECENT_TRADES`].
pub fn recent_trades(trades: &[Trade]) -> Vec<Trade> {
    let mut sorted = trades.to_vec();
    sorted.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
    sorted.truncate(RECENT_TRADES);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::TradingWindow;
    use crate::domain::trade::{Direction, TradeStatus};
    use chrono::{DateTime, Duration, Utc};
    use chrono_tz::Tz;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn trade(id: i64, at: &str, pnl: Option<f64>) -> Trade {
        Trade {
            id,
            user_id: "u".into(),
            symbol: "AAPL".into(),
            direction: Direction::Long,
            size: 1.0,
            entry_price: 100.0,
            stop_loss: 95.0,
            exit_price: pnl.map(|p| 100.0 + p),
            pnl,
            status: if pnl.is_some() {
                TradeStatus::Closed
            } else {
                TradeStatus::Open
            },
            risk_amount: 5.0,
            executed_at: utc(at),
        }
    }

    #[test]
    fn counts_only_todays_trades() {
        let clock = ReferenceClock::new(utc("2024-03-05T12:00:00Z"), Tz::UTC);
        let trades = vec![
            trade(1, "2024-03-04T23:59:00Z", Some(-400.0)),
            trade(2, "2024-03-05T09:00:00Z", Some(50.0)),
            trade(3, "2024-03-05T10:00:00Z", Some(-20.0)),
            trade(4, "2024-03-05T11:00:00Z", None),
        ];
        let stats = SessionStats::compute(&trades, &RuleConfig::default(), &clock, None);
        assert_eq!(stats.trade_count, 3);
        assert_eq!(stats.closed_count, 2);
        assert_eq!(stats.daily_pnl, 30.0);
        assert_eq!(stats.win_rate, 50);
        assert_eq!(stats.status(), SessionStatus::Active);
    }

    #[test]
    fn any_tripped_rule_locks_status() {
        let clock = ReferenceClock::new(utc("2024-03-05T20:00:00Z"), Tz::UTC);
        let rules = RuleConfig {
            trading_window: Some(TradingWindow::parse("09:30", "16:00").unwrap()),
            ..RuleConfig::default()
        };
        let stats = SessionStats::compute(&[], &rules, &clock, None);
        assert!(stats.outside_window);
        assert_eq!(stats.status(), SessionStatus::Locked);

        let lock = DailyLock {
            user_id: "u".into(),
            lock_date: clock.reference_day(),
            reason: ViolationReason::EmotionalCheckFailed,
            created_at: clock.now(),
        };
        let stats = SessionStats::compute(&[], &RuleConfig::default(), &clock, Some(&lock));
        assert_eq!(stats.lock_reason, Some(ViolationReason::EmotionalCheckFailed));
        assert_eq!(stats.status(), SessionStatus::Locked);
    }

    #[test]
    fn loss_usage_is_clamped() {
        let rules = RuleConfig::default();
        let clock = ReferenceClock::new(utc("2024-03-05T12:00:00Z"), Tz::UTC);
        let trades = vec![trade(1, "2024-03-05T09:00:00Z", Some(-750.0))];
        let stats = SessionStats::compute(&trades, &rules, &clock, None);
        assert!(stats.loss_limit_hit);
        assert_eq!(stats.loss_usage_percent(&rules), 100.0);
    }

    #[test]
    fn recent_trades_are_newest_first_and_capped() {
        let base = utc("2024-03-05T09:00:00Z");
        let trades: Vec<Trade> = (0..8)
            .map(|i| Trade {
                executed_at: base + Duration::minutes(i),
                ..trade(i, "2024-03-05T09:00:00Z", None)
            })
            .collect();
        let recent = recent_trades(&trades);
        assert_eq!(recent.len(), RECENT_TRADES);
        assert_eq!(recent[0].id, 7);
        assert_eq!(recent[4].id, 3);
    }
}
