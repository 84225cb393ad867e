//! Persistence port for trades, rules, violations, locks and accounts.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::account::Account;
use crate::domain::admission::DayStats;
use crate::domain::error::SentinelError;
use crate::domain::rules::RuleConfig;
use crate::domain::trade::{ProposedTrade, Trade};
use crate::domain::violation::{DailyLock, Violation, ViolationReason};

/// Operations available inside one per-user transaction.
pub trait LedgerTx {
    fn rules(&mut self, user_id: &str) -> Result<Option<RuleConfig>, SentinelError>;

    fn find_lock(
        &mut self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyLock>, SentinelError>;

    /// Sum of PnL and count of trades executed at or after `since`.
    fn day_stats(&mut self, user_id: &str, since: DateTime<Utc>)
    -> Result<DayStats, SentinelError>;

    /// Returns the new trade id.
    fn insert_trade(
        &mut self,
        user_id: &str,
        trade: &ProposedTrade,
        executed_at: DateTime<Utc>,
    ) -> Result<i64, SentinelError>;

    fn insert_violation(
        &mut self,
        user_id: &str,
        reason: ViolationReason,
        details: &serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<(), SentinelError>;

    /// Conditional insert keyed on (user, day). Returns `false` when a lock
    /// already existed; the existing row is left untouched.
    fn insert_lock_if_absent(
        &mut self,
        user_id: &str,
        day: NaiveDate,
        reason: ViolationReason,
        created_at: DateTime<Utc>,
    ) -> Result<bool, SentinelError>;
}

pub trait TradeStore {
    fn initialize_schema(&self) -> Result<(), SentinelError>;

    /// Runs `work` in a single transaction serialized against other
    /// transactions for the same user. Commits when `work` returns `Ok`,
    /// rolls back otherwise.
    fn in_user_transaction(
        &self,
        user_id: &str,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), SentinelError>,
    ) -> Result<(), SentinelError>;

    fn rules(&self, user_id: &str) -> Result<Option<RuleConfig>, SentinelError>;

    /// Insert or replace the user's single rule record.
    fn save_rules(&self, user_id: &str, rules: &RuleConfig) -> Result<(), SentinelError>;

    fn find_lock(&self, user_id: &str, day: NaiveDate)
    -> Result<Option<DailyLock>, SentinelError>;

    /// Locks dated on or after `since`, newest first.
    fn recent_locks(&self, user_id: &str, since: NaiveDate)
    -> Result<Vec<DailyLock>, SentinelError>;

    fn find_trade(&self, user_id: &str, trade_id: i64) -> Result<Option<Trade>, SentinelError>;

    /// Newest first. `since` bounds `executed_at` from below when given.
    fn list_trades(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>, SentinelError>;

    /// Sets exit price and PnL on an open trade. Returns `false` when no open
    /// trade with that id belongs to the user.
    fn close_trade(
        &self,
        user_id: &str,
        trade_id: i64,
        exit_price: f64,
        pnl: f64,
    ) -> Result<bool, SentinelError>;

    /// Replaces the editable fields of a trade with a revalidated version,
    /// keeping its id and execution time. Returns `false` when no trade with
    /// that id belongs to the user.
    fn update_trade(
        &self,
        user_id: &str,
        trade_id: i64,
        trade: &ProposedTrade,
    ) -> Result<bool, SentinelError>;

    fn delete_trade(&self, user_id: &str, trade_id: i64) -> Result<bool, SentinelError>;

    /// Newest first.
    fn list_violations(&self, user_id: &str) -> Result<Vec<Violation>, SentinelError>;

    fn create_account(&self, account: &Account) -> Result<(), SentinelError>;

    fn find_account(&self, account_id: &str) -> Result<Option<Account>, SentinelError>;

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, SentinelError>;
}
