//! SQLite trade store.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::domain::account::Account;
use crate::domain::admission::DayStats;
use crate::domain::error::SentinelError;
use crate::domain::rules::{parse_timezone, RuleConfig, TradingWindow};
use crate::domain::trade::{ProposedTrade, Trade};
use crate::domain::violation::{DailyLock, Violation, ViolationReason};
use crate::ports::config_port::ConfigPort;
use crate::ports::trade_store::{LedgerTx, TradeStore};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";

const TRADE_COLUMNS: &str = "id, user_id, symbol, direction, size, entry_price, stop_loss, \
                             exit_price, pnl, status, risk_amount, executed_at";

const RULE_COLUMNS: &str = "max_risk_per_trade_percent, max_daily_loss, max_trades_per_day, \
                            trading_window_start, trading_window_end, timezone, setup_complete";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS rules (
    user_id TEXT PRIMARY KEY,
    max_risk_per_trade_percent REAL NOT NULL,
    max_daily_loss REAL NOT NULL,
    max_trades_per_day INTEGER NOT NULL,
    trading_window_start TEXT,
    trading_window_end TEXT,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    setup_complete INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('LONG', 'SHORT')),
    size REAL NOT NULL,
    entry_price REAL NOT NULL,
    stop_loss REAL NOT NULL,
    exit_price REAL,
    pnl REAL,
    status TEXT NOT NULL CHECK (status IN ('OPEN', 'CLOSED')),
    risk_amount REAL NOT NULL CHECK (risk_amount >= 0),
    executed_at TEXT NOT NULL,
    CHECK ((status = 'OPEN') = (pnl IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_trades_user_executed ON trades(user_id, executed_at);
CREATE TABLE IF NOT EXISTS violations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_violations_user_created ON violations(user_id, created_at);
CREATE TABLE IF NOT EXISTS daily_locks (
    user_id TEXT NOT NULL,
    lock_date TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, lock_date)
);";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SentinelError> {
        let db_path = config
            .get_string("database", "sqlite_path")
            .ok_or_else(|| SentinelError::ConfigMissing {
                section: "database".into(),
                key: "sqlite_path".into(),
            })?;

        if db_path == ":memory:" {
            return Self::in_memory();
        }

        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    /// Single-connection pool, so every checkout sees the same database.
    pub fn in_memory() -> Result<Self, SentinelError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, SentinelError> {
        self.pool.get().map_err(pool_err)
    }
}

fn pool_err(e: r2d2::Error) -> SentinelError {
    SentinelError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SentinelError {
    SentinelError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FMT).map_err(|e| conversion(idx, e))
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let direction: String = row.get(3)?;
    let status: String = row.get(9)?;
    let executed_at: String = row.get(11)?;
    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        direction: direction.parse().map_err(|e| conversion(3, e))?,
        size: row.get(4)?,
        entry_price: row.get(5)?,
        stop_loss: row.get(6)?,
        exit_price: row.get(7)?,
        pnl: row.get(8)?,
        status: status.parse().map_err(|e| conversion(9, e))?,
        risk_amount: row.get(10)?,
        executed_at: parse_timestamp(11, &executed_at)?,
    })
}

fn rules_from_row(row: &Row<'_>) -> rusqlite::Result<RuleConfig> {
    let start: Option<String> = row.get(3)?;
    let end: Option<String> = row.get(4)?;
    let timezone: String = row.get(5)?;
    let trading_window = match (start, end) {
        (Some(s), Some(e)) => Some(TradingWindow::parse(&s, &e).map_err(|e| conversion(3, e))?),
        _ => None,
    };
    Ok(RuleConfig {
        max_risk_per_trade_percent: row.get(0)?,
        max_daily_loss: row.get(1)?,
        max_trades_per_day: row.get(2)?,
        trading_window,
        timezone: parse_timezone(&timezone).map_err(|e| conversion(5, e))?,
        setup_complete: row.get(6)?,
    })
}

fn lock_from_row(row: &Row<'_>) -> rusqlite::Result<DailyLock> {
    let lock_date: String = row.get(1)?;
    let reason: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    Ok(DailyLock {
        user_id: row.get(0)?,
        lock_date: parse_date(1, &lock_date)?,
        reason: reason.parse().map_err(|e| conversion(2, e))?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}

fn violation_from_row(row: &Row<'_>) -> rusqlite::Result<Violation> {
    let reason: String = row.get(2)?;
    let details: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(Violation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        reason: reason.parse().map_err(|e| conversion(2, e))?,
        details: serde_json::from_str(&details).map_err(|e| conversion(3, e))?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let created_at: String = row.get(4)?;
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

fn load_rules(conn: &Connection, user_id: &str) -> Result<Option<RuleConfig>, SentinelError> {
    conn.query_row(
        &format!("SELECT {RULE_COLUMNS} FROM rules WHERE user_id = ?1"),
        params![user_id],
        rules_from_row,
    )
    .optional()
    .map_err(query_err)
}

fn load_lock(
    conn: &Connection,
    user_id: &str,
    day: NaiveDate,
) -> Result<Option<DailyLock>, SentinelError> {
    conn.query_row(
        "SELECT user_id, lock_date, reason, created_at FROM daily_locks \
         WHERE user_id = ?1 AND lock_date = ?2",
        params![user_id, day.format(DATE_FMT).to_string()],
        lock_from_row,
    )
    .optional()
    .map_err(query_err)
}

/// Borrowed connection inside an open transaction.
struct SqliteLedger<'a> {
    conn: &'a Connection,
}

impl LedgerTx for SqliteLedger<'_> {
    fn rules(&mut self, user_id: &str) -> Result<Option<RuleConfig>, SentinelError> {
        load_rules(self.conn, user_id)
    }

    fn find_lock(
        &mut self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyLock>, SentinelError> {
        load_lock(self.conn, user_id, day)
    }

    fn day_stats(
        &mut self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<DayStats, SentinelError> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(pnl), 0.0), COUNT(*) FROM trades \
                 WHERE user_id = ?1 AND executed_at >= ?2",
                params![user_id, timestamp(&since)],
                |row| {
                    Ok(DayStats {
                        realized_pnl: row.get(0)?,
                        trade_count: row.get(1)?,
                    })
                },
            )
            .map_err(query_err)
    }

    fn insert_trade(
        &mut self,
        user_id: &str,
        trade: &ProposedTrade,
        executed_at: DateTime<Utc>,
    ) -> Result<i64, SentinelError> {
        self.conn
            .execute(
                "INSERT INTO trades (user_id, symbol, direction, size, entry_price, stop_loss, \
                                     exit_price, pnl, status, risk_amount, executed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    user_id,
                    trade.symbol(),
                    trade.direction().as_str(),
                    trade.size(),
                    trade.entry_price(),
                    trade.stop_loss(),
                    trade.exit_price(),
                    trade.pnl(),
                    trade.status().as_str(),
                    trade.risk_amount(),
                    timestamp(&executed_at),
                ],
            )
            .map_err(query_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_violation(
        &mut self,
        user_id: &str,
        reason: ViolationReason,
        details: &serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<(), SentinelError> {
        self.conn
            .execute(
                "INSERT INTO violations (user_id, reason, details, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    reason.as_str(),
                    details.to_string(),
                    timestamp(&created_at)
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn insert_lock_if_absent(
        &mut self,
        user_id: &str,
        day: NaiveDate,
        reason: ViolationReason,
        created_at: DateTime<Utc>,
    ) -> Result<bool, SentinelError> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO daily_locks (user_id, lock_date, reason, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    day.format(DATE_FMT).to_string(),
                    reason.as_str(),
                    timestamp(&created_at)
                ],
            )
            .map_err(query_err)?;
        Ok(inserted > 0)
    }
}

impl TradeStore for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), SentinelError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    fn in_user_transaction(
        &self,
        _user_id: &str,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), SentinelError>,
    ) -> Result<(), SentinelError> {
        // IMMEDIATE takes the write lock up front, serializing submissions.
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;
        let mut ledger = SqliteLedger { conn: &tx };
        work(&mut ledger)?;
        tx.commit().map_err(query_err)
    }

    fn rules(&self, user_id: &str) -> Result<Option<RuleConfig>, SentinelError> {
        load_rules(&*self.conn()?, user_id)
    }

    fn save_rules(&self, user_id: &str, rules: &RuleConfig) -> Result<(), SentinelError> {
        self.conn()?
            .execute(
                "INSERT INTO rules (user_id, max_risk_per_trade_percent, max_daily_loss, \
                                    max_trades_per_day, trading_window_start, trading_window_end, \
                                    timezone, setup_complete) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(user_id) DO UPDATE SET \
                     max_risk_per_trade_percent = excluded.max_risk_per_trade_percent, \
                     max_daily_loss = excluded.max_daily_loss, \
                     max_trades_per_day = excluded.max_trades_per_day, \
                     trading_window_start = excluded.trading_window_start, \
                     trading_window_end = excluded.trading_window_end, \
                     timezone = excluded.timezone, \
                     setup_complete = excluded.setup_complete",
                params![
                    user_id,
                    rules.max_risk_per_trade_percent,
                    rules.max_daily_loss,
                    rules.max_trades_per_day,
                    rules.window_start().map(|t| t.format(TIME_FMT).to_string()),
                    rules.window_end().map(|t| t.format(TIME_FMT).to_string()),
                    rules.timezone.name(),
                    rules.setup_complete,
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn find_lock(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyLock>, SentinelError> {
        load_lock(&*self.conn()?, user_id, day)
    }

    fn recent_locks(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<DailyLock>, SentinelError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, lock_date, reason, created_at FROM daily_locks \
                 WHERE user_id = ?1 AND lock_date >= ?2 ORDER BY lock_date DESC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![user_id, since.format(DATE_FMT).to_string()],
                lock_from_row,
            )
            .map_err(query_err)?;
        let locks = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        Ok(locks)
    }

    fn find_trade(&self, user_id: &str, trade_id: i64) -> Result<Option<Trade>, SentinelError> {
        self.conn()?
            .query_row(
                &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1 AND user_id = ?2"),
                params![trade_id, user_id],
                trade_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn list_trades(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>, SentinelError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TRADE_COLUMNS} FROM trades \
                 WHERE user_id = ?1 AND (?2 IS NULL OR executed_at >= ?2) \
                 ORDER BY executed_at DESC, id DESC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id, since.as_ref().map(timestamp)], trade_from_row)
            .map_err(query_err)?;
        let trades = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        Ok(trades)
    }

    fn close_trade(
        &self,
        user_id: &str,
        trade_id: i64,
        exit_price: f64,
        pnl: f64,
    ) -> Result<bool, SentinelError> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE trades SET exit_price = ?1, pnl = ?2, status = 'CLOSED' \
                 WHERE id = ?3 AND user_id = ?4 AND status = 'OPEN'",
                params![exit_price, pnl, trade_id, user_id],
            )
            .map_err(query_err)?;
        Ok(updated > 0)
    }

    fn update_trade(
        &self,
        user_id: &str,
        trade_id: i64,
        trade: &ProposedTrade,
    ) -> Result<bool, SentinelError> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE trades SET symbol = ?1, direction = ?2, size = ?3, entry_price = ?4, \
                                   stop_loss = ?5, exit_price = ?6, pnl = ?7, status = ?8, \
                                   risk_amount = ?9 \
                 WHERE id = ?10 AND user_id = ?11",
                params![
                    trade.symbol(),
                    trade.direction().as_str(),
                    trade.size(),
                    trade.entry_price(),
                    trade.stop_loss(),
                    trade.exit_price(),
                    trade.pnl(),
                    trade.status().as_str(),
                    trade.risk_amount(),
                    trade_id,
                    user_id,
                ],
            )
            .map_err(query_err)?;
        Ok(updated > 0)
    }

    fn delete_trade(&self, user_id: &str, trade_id: i64) -> Result<bool, SentinelError> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM trades WHERE id = ?1 AND user_id = ?2",
                params![trade_id, user_id],
            )
            .map_err(query_err)?;
        Ok(deleted > 0)
    }

    fn list_violations(&self, user_id: &str) -> Result<Vec<Violation>, SentinelError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, reason, details, created_at FROM violations \
                 WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id], violation_from_row)
            .map_err(query_err)?;
        let violations = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        Ok(violations)
    }

    fn create_account(&self, account: &Account) -> Result<(), SentinelError> {
        self.conn()?
            .execute(
                "INSERT INTO accounts (id, email, name, password_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    account.id,
                    account.email,
                    account.name,
                    account.password_hash,
                    timestamp(&account.created_at)
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn find_account(&self, account_id: &str) -> Result<Option<Account>, SentinelError> {
        self.conn()?
            .query_row(
                "SELECT id, email, name, password_hash, created_at FROM accounts WHERE id = ?1",
                params![account_id],
                account_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, SentinelError> {
        self.conn()?
            .query_row(
                "SELECT id, email, name, password_hash, created_at FROM accounts WHERE email = ?1",
                params![email],
                account_from_row,
            )
            .optional()
            .map_err(query_err)
    }
}
