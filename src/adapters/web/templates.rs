//! HTML templates using Askama.
//!
//! Every page template carries a [`Page`]; when `page.htmx` is set the
//! layout includes are skipped and only the content fragment is rendered.

use askama::Template;
use chrono_tz::Tz;

use crate::domain::emotional_gate::QUESTIONS;
use crate::domain::rules::{RuleConfig, RuleSettings};
use crate::domain::session_stats::SessionStats;
use crate::domain::trade::{Trade, TradeTicket};
use crate::domain::violation::{DailyLock, Violation};
use crate::ports::market_data_port::{Quote, SymbolMatch};

pub struct Page {
    pub title: &'static str,
    pub htmx: bool,
    pub signed_in: bool,
}

impl Page {
    pub fn new(title: &'static str, htmx: bool) -> Self {
        Self {
            title,
            htmx,
            signed_in: true,
        }
    }

    pub fn public(title: &'static str, htmx: bool) -> Self {
        Self {
            title,
            htmx,
            signed_in: false,
        }
    }
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn signed_money(value: f64) -> String {
    format!("{value:+.2}")
}

fn pnl_class(value: f64) -> &'static str {
    if value > 0.0 {
        "gain"
    } else if value < 0.0 {
        "loss"
    } else {
        "flat"
    }
}

pub struct TradeRow {
    pub id: i64,
    pub executed_at: String,
    pub symbol: String,
    pub direction: &'static str,
    pub size: String,
    pub entry_price: String,
    pub stop_loss: String,
    pub exit_price: String,
    pub risk_amount: String,
    pub pnl: String,
    pub pnl_class: &'static str,
    pub status: &'static str,
    pub is_open: bool,
}

impl TradeRow {
    pub fn new(trade: &Trade, tz: Tz) -> Self {
        Self {
            id: trade.id,
            executed_at: trade
                .executed_at
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            symbol: trade.symbol.clone(),
            direction: trade.direction.as_str(),
            size: trade.size.to_string(),
            entry_price: money(trade.entry_price),
            stop_loss: money(trade.display_stop_loss()),
            exit_price: trade.exit_price.map(money).unwrap_or_default(),
            risk_amount: money(trade.risk_amount),
            pnl: trade.pnl.map(signed_money).unwrap_or_default(),
            pnl_class: trade.pnl.map(pnl_class).unwrap_or("flat"),
            status: trade.status.as_str(),
            is_open: !trade.is_closed(),
        }
    }

    pub fn list(trades: &[Trade], tz: Tz) -> Vec<Self> {
        trades.iter().map(|t| Self::new(t, tz)).collect()
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub page: Page,
    pub message: &'a str,
    pub status: u16,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate<'a> {
    pub page: Page,
    pub email: &'a str,
    pub error: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate<'a> {
    pub page: Page,
    pub email: &'a str,
    pub name: &'a str,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate<'a> {
    pub page: Page,
    pub user_name: &'a str,
    pub status: &'static str,
    pub lock_reason: Option<&'static str>,
    pub daily_pnl: String,
    pub daily_pnl_class: &'static str,
    pub max_daily_loss: String,
    pub loss_usage: String,
    pub trade_count: i64,
    pub max_trades: i64,
    pub win_rate: u32,
    pub closed_count: usize,
    pub window: String,
    pub loss_limit_hit: bool,
    pub trade_limit_hit: bool,
    pub outside_window: bool,
    pub recent: Vec<TradeRow>,
    pub outcome: Option<OutcomeView>,
}

impl<'a> DashboardTemplate<'a> {
    pub fn new(
        page: Page,
        user_name: &'a str,
        stats: &SessionStats,
        rules: &RuleConfig,
        recent: Vec<TradeRow>,
    ) -> Self {
        Self {
            page,
            user_name,
            status: stats.status().as_str(),
            lock_reason: stats.lock_reason.map(|r| r.label()),
            daily_pnl: signed_money(stats.daily_pnl),
            daily_pnl_class: pnl_class(stats.daily_pnl),
            max_daily_loss: money(rules.max_daily_loss),
            loss_usage: format!("{:.0}", stats.loss_usage_percent(rules)),
            trade_count: stats.trade_count,
            max_trades: rules.max_trades_per_day,
            win_rate: stats.win_rate,
            closed_count: stats.closed_count,
            window: rules
                .trading_window
                .map(|w| w.label())
                .unwrap_or_else(|| "Any time".to_string()),
            loss_limit_hit: stats.loss_limit_hit,
            trade_limit_hit: stats.trade_limit_hit,
            outside_window: stats.outside_window,
            recent,
            outcome: None,
        }
    }
}

#[derive(Template)]
#[template(path = "settings.html")]
pub struct SettingsTemplate {
    pub page: Page,
    pub form: RuleSettings,
    pub onboarding: bool,
    pub error: Option<String>,
}

pub struct GateRow {
    pub index: usize,
    pub prompt: &'static str,
    pub hint: &'static str,
}

#[derive(Template)]
#[template(path = "gate.html")]
pub struct GateTemplate {
    pub page: Page,
    pub questions: Vec<GateRow>,
    pub symbol: String,
    pub error: Option<String>,
    pub locked_message: Option<&'static str>,
}

impl GateTemplate {
    pub fn new(page: Page, symbol: String) -> Self {
        Self {
            page,
            questions: QUESTIONS
                .iter()
                .enumerate()
                .map(|(index, q)| GateRow {
                    index,
                    prompt: q.prompt,
                    hint: q.hint,
                })
                .collect(),
            symbol,
            error: None,
            locked_message: None,
        }
    }
}

pub struct OutcomeView {
    pub status: &'static str,
    pub message: String,
}

pub struct QuoteView {
    pub current: String,
    pub high: String,
    pub low: String,
    pub previous_close: String,
}

impl From<Quote> for QuoteView {
    fn from(q: Quote) -> Self {
        Self {
            current: money(q.current),
            high: money(q.high),
            low: money(q.low),
            previous_close: money(q.previous_close),
        }
    }
}

#[derive(Template)]
#[template(path = "trade_form.html")]
pub struct TradeFormTemplate {
    pub page: Page,
    pub ticket: TradeTicket,
    pub outcome: Option<OutcomeView>,
    pub quote: Option<QuoteView>,
    pub max_risk_percent: String,
}

/// Close and edit forms for one stored trade.
#[derive(Template)]
#[template(path = "trade_edit.html")]
pub struct EditTradeTemplate {
    pub page: Page,
    pub trade: TradeRow,
    pub ticket: TradeTicket,
    pub exit_price: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "history.html")]
pub struct HistoryTemplate {
    pub page: Page,
    pub trades: Vec<TradeRow>,
}

pub struct ViolationRow {
    pub code: &'static str,
    pub label: &'static str,
    pub details: String,
    pub created_at: String,
}

impl ViolationRow {
    pub fn new(v: &Violation, tz: Tz) -> Self {
        Self {
            code: v.reason.as_str(),
            label: v.reason.label(),
            details: v.details_summary(),
            created_at: v
                .created_at
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
        }
    }
}

pub struct LockRow {
    pub date: String,
    pub reason: &'static str,
}

impl From<&DailyLock> for LockRow {
    fn from(lock: &DailyLock) -> Self {
        Self {
            date: lock.lock_date.format("%Y-%m-%d").to_string(),
            reason: lock.reason.label(),
        }
    }
}

#[derive(Template)]
#[template(path = "violations.html")]
pub struct ViolationsTemplate {
    pub page: Page,
    pub violations: Vec<ViolationRow>,
    pub locks: Vec<LockRow>,
}

#[derive(Template)]
#[template(path = "market_results.html")]
pub struct MarketResultsTemplate {
    pub matches: Vec<SymbolMatch>,
}
