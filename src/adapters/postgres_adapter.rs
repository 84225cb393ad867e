//! PostgreSQL trade store.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use postgres::types::ToSql;
use postgres::{GenericClient, NoTls, Row};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;

use crate::domain::account::Account;
use crate::domain::admission::DayStats;
use crate::domain::error::SentinelError;
use crate::domain::rules::{parse_timezone, RuleConfig, TradingWindow};
use crate::domain::trade::{ProposedTrade, Trade};
use crate::domain::violation::{DailyLock, Violation, ViolationReason};
use crate::ports::config_port::ConfigPort;
use crate::ports::trade_store::{LedgerTx, TradeStore};

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

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
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS rules (
    user_id TEXT PRIMARY KEY,
    max_risk_per_trade_percent DOUBLE PRECISION NOT NULL,
    max_daily_loss DOUBLE PRECISION NOT NULL,
    max_trades_per_day BIGINT NOT NULL,
    trading_window_start TIME,
    trading_window_end TIME,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    setup_complete BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE TABLE IF NOT EXISTS trades (
    id BIGSERIAL PRIMARY KEY,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('LONG', 'SHORT')),
    size DOUBLE PRECISION NOT NULL,
    entry_price DOUBLE PRECISION NOT NULL,
    stop_loss DOUBLE PRECISION NOT NULL,
    exit_price DOUBLE PRECISION,
    pnl DOUBLE PRECISION,
    status TEXT NOT NULL CHECK (status IN ('OPEN', 'CLOSED')),
    risk_amount DOUBLE PRECISION NOT NULL CHECK (risk_amount >= 0),
    executed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CHECK ((status = 'OPEN') = (pnl IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_trades_user_executed ON trades(user_id, executed_at);
CREATE TABLE IF NOT EXISTS violations (
    id BIGSERIAL PRIMARY KEY,
    user_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    details JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_violations_user_created ON violations(user_id, created_at);
CREATE TABLE IF NOT EXISTS daily_locks (
    user_id TEXT NOT NULL,
    lock_date DATE NOT NULL,
    reason TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (user_id, lock_date)
);";

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SentinelError> {
        // Try [postgres] connection_string first, fall back to [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| SentinelError::ConfigMissing {
                section: "database".into(),
                key: "conninfo".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| SentinelError::ConfigInvalid {
                section: "database".into(),
                key: "conninfo".into(),
                reason: e.to_string(),
            })?;
        let pool_size = config.get_int("database", "pool_size", 8).max(1) as u32;

        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn client(
        &self,
    ) -> Result<r2d2::PooledConnection<PostgresConnectionManager<NoTls>>, SentinelError> {
        self.pool.get().map_err(pool_err)
    }
}

fn pool_err(e: r2d2::Error) -> SentinelError {
    SentinelError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> SentinelError {
    SentinelError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn query_opt<C: GenericClient, T>(
    client: &mut C,
    sql: &str,
    params: Params<'_>,
    map: fn(&Row) -> Result<T, SentinelError>,
) -> Result<Option<T>, SentinelError> {
    client
        .query_opt(sql, params)
        .map_err(query_err)?
        .as_ref()
        .map(map)
        .transpose()
}

fn query_all<C: GenericClient, T>(
    client: &mut C,
    sql: &str,
    params: Params<'_>,
    map: fn(&Row) -> Result<T, SentinelError>,
) -> Result<Vec<T>, SentinelError> {
    client
        .query(sql, params)
        .map_err(query_err)?
        .iter()
        .map(map)
        .collect()
}

fn trade_from_row(row: &Row) -> Result<Trade, SentinelError> {
    let direction: String = row.try_get(3).map_err(query_err)?;
    let status: String = row.try_get(9).map_err(query_err)?;
    Ok(Trade {
        id: row.try_get(0).map_err(query_err)?,
        user_id: row.try_get(1).map_err(query_err)?,
        symbol: row.try_get(2).map_err(query_err)?,
        direction: direction.parse()?,
        size: row.try_get(4).map_err(query_err)?,
        entry_price: row.try_get(5).map_err(query_err)?,
        stop_loss: row.try_get(6).map_err(query_err)?,
        exit_price: row.try_get(7).map_err(query_err)?,
        pnl: row.try_get(8).map_err(query_err)?,
        status: status.parse()?,
        risk_amount: row.try_get(10).map_err(query_err)?,
        executed_at: row.try_get(11).map_err(query_err)?,
    })
}

fn rules_from_row(row: &Row) -> Result<RuleConfig, SentinelError> {
    let start: Option<NaiveTime> = row.try_get(3).map_err(query_err)?;
    let end: Option<NaiveTime> = row.try_get(4).map_err(query_err)?;
    let timezone: String = row.try_get(5).map_err(query_err)?;
    Ok(RuleConfig {
        max_risk_per_trade_percent: row.try_get(0).map_err(query_err)?,
        max_daily_loss: row.try_get(1).map_err(query_err)?,
        max_trades_per_day: row.try_get(2).map_err(query_err)?,
        trading_window: start.zip(end).map(|(s, e)| TradingWindow::new(s, e)),
        timezone: parse_timezone(&timezone)?,
        setup_complete: row.try_get(6).map_err(query_err)?,
    })
}

fn lock_from_row(row: &Row) -> Result<DailyLock, SentinelError> {
    let reason: String = row.try_get(2).map_err(query_err)?;
    Ok(DailyLock {
        user_id: row.try_get(0).map_err(query_err)?,
        lock_date: row.try_get(1).map_err(query_err)?,
        reason: reason.parse()?,
        created_at: row.try_get(3).map_err(query_err)?,
    })
}

fn violation_from_row(row: &Row) -> Result<Violation, SentinelError> {
    let reason: String = row.try_get(2).map_err(query_err)?;
    Ok(Violation {
        id: row.try_get(0).map_err(query_err)?,
        user_id: row.try_get(1).map_err(query_err)?,
        reason: reason.parse()?,
        details: row.try_get(3).map_err(query_err)?,
        created_at: row.try_get(4).map_err(query_err)?,
    })
}

fn account_from_row(row: &Row) -> Result<Account, SentinelError> {
    Ok(Account {
        id: row.try_get(0).map_err(query_err)?,
        email: row.try_get(1).map_err(query_err)?,
        name: row.try_get(2).map_err(query_err)?,
        password_hash: row.try_get(3).map_err(query_err)?,
        created_at: row.try_get(4).map_err(query_err)?,
    })
}

fn load_rules<C: GenericClient>(
    client: &mut C,
    user_id: &str,
) -> Result<Option<RuleConfig>, SentinelError> {
    query_opt(
        client,
        &format!("SELECT {RULE_COLUMNS} FROM rules WHERE user_id = $1"),
        &[&user_id],
        rules_from_row,
    )
}

fn load_lock<C: GenericClient>(
    client: &mut C,
    user_id: &str,
    day: NaiveDate,
) -> Result<Option<DailyLock>, SentinelError> {
    query_opt(
        client,
        "SELECT user_id, lock_date, reason, created_at FROM daily_locks \
         WHERE user_id = $1 AND lock_date = $2",
        &[&user_id, &day],
        lock_from_row,
    )
}

struct PostgresLedger<'a, 'b> {
    tx: &'a mut postgres::Transaction<'b>,
}

impl LedgerTx for PostgresLedger<'_, '_> {
    fn rules(&mut self, user_id: &str) -> Result<Option<RuleConfig>, SentinelError> {
        load_rules(&mut *self.tx, user_id)
    }

    fn find_lock(
        &mut self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyLock>, SentinelError> {
        load_lock(&mut *self.tx, user_id, day)
    }

    fn day_stats(
        &mut self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<DayStats, SentinelError> {
        let row = self
            .tx
            .query_one(
                "SELECT COALESCE(SUM(pnl), 0)::double precision, COUNT(*) FROM trades \
                 WHERE user_id = $1 AND executed_at >= $2",
                &[&user_id, &since],
            )
            .map_err(query_err)?;
        Ok(DayStats {
            realized_pnl: row.try_get(0).map_err(query_err)?,
            trade_count: row.try_get(1).map_err(query_err)?,
        })
    }

    fn insert_trade(
        &mut self,
        user_id: &str,
        trade: &ProposedTrade,
        executed_at: DateTime<Utc>,
    ) -> Result<i64, SentinelError> {
        let row = self
            .tx
            .query_one(
                "INSERT INTO trades (user_id, symbol, direction, size, entry_price, stop_loss, \
                                     exit_price, pnl, status, risk_amount, executed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
                &[
                    &user_id,
                    &trade.symbol(),
                    &trade.direction().as_str(),
                    &trade.size(),
                    &trade.entry_price(),
                    &trade.stop_loss(),
                    &trade.exit_price(),
                    &trade.pnl(),
                    &trade.status().as_str(),
                    &trade.risk_amount(),
                    &executed_at,
                ],
            )
            .map_err(query_err)?;
        row.try_get(0).map_err(query_err)
    }

    fn insert_violation(
        &mut self,
        user_id: &str,
        reason: ViolationReason,
        details: &serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<(), SentinelError> {
        self.tx
            .execute(
                "INSERT INTO violations (user_id, reason, details, created_at) \
                 VALUES ($1, $2, $3, $4)",
                &[&user_id, &reason.as_str(), details, &created_at],
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
            .tx
            .execute(
                "INSERT INTO daily_locks (user_id, lock_date, reason, created_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (user_id, lock_date) DO NOTHING",
                &[&user_id, &day, &reason.as_str(), &created_at],
            )
            .map_err(query_err)?;
        Ok(inserted > 0)
    }
}

impl TradeStore for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), SentinelError> {
        self.client()?.batch_execute(SCHEMA).map_err(query_err)
    }

    fn in_user_transaction(
        &self,
        user_id: &str,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), SentinelError>,
    ) -> Result<(), SentinelError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        // Held until commit or rollback.
        tx.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&user_id])
            .map_err(query_err)?;
        work(&mut PostgresLedger { tx: &mut tx })?;
        tx.commit().map_err(query_err)
    }

    fn rules(&self, user_id: &str) -> Result<Option<RuleConfig>, SentinelError> {
        load_rules(&mut *self.client()?, user_id)
    }

    fn save_rules(&self, user_id: &str, rules: &RuleConfig) -> Result<(), SentinelError> {
        self.client()?
            .execute(
                "INSERT INTO rules (user_id, max_risk_per_trade_percent, max_daily_loss, \
                                    max_trades_per_day, trading_window_start, trading_window_end, \
                                    timezone, setup_complete) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                     max_risk_per_trade_percent = EXCLUDED.max_risk_per_trade_percent, \
                     max_daily_loss = EXCLUDED.max_daily_loss, \
                     max_trades_per_day = EXCLUDED.max_trades_per_day, \
                     trading_window_start = EXCLUDED.trading_window_start, \
                     trading_window_end = EXCLUDED.trading_window_end, \
                     timezone = EXCLUDED.timezone, \
                     setup_complete = EXCLUDED.setup_complete",
                &[
                    &user_id,
                    &rules.max_risk_per_trade_percent,
                    &rules.max_daily_loss,
                    &rules.max_trades_per_day,
                    &rules.window_start(),
                    &rules.window_end(),
                    &rules.timezone.name(),
                    &rules.setup_complete,
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
        load_lock(&mut *self.client()?, user_id, day)
    }

    fn recent_locks(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<DailyLock>, SentinelError> {
        query_all(
            &mut *self.client()?,
            "SELECT user_id, lock_date, reason, created_at FROM daily_locks \
             WHERE user_id = $1 AND lock_date >= $2 ORDER BY lock_date DESC",
            &[&user_id, &since],
            lock_from_row,
        )
    }

    fn find_trade(&self, user_id: &str, trade_id: i64) -> Result<Option<Trade>, SentinelError> {
        query_opt(
            &mut *self.client()?,
            &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = $1 AND user_id = $2"),
            &[&trade_id, &user_id],
            trade_from_row,
        )
    }

    fn list_trades(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>, SentinelError> {
        query_all(
            &mut *self.client()?,
            &format!(
                "SELECT {TRADE_COLUMNS} FROM trades \
                 WHERE user_id = $1 AND ($2::timestamptz IS NULL OR executed_at >= $2) \
                 ORDER BY executed_at DESC, id DESC"
            ),
            &[&user_id, &since],
            trade_from_row,
        )
    }

    fn close_trade(
        &self,
        user_id: &str,
        trade_id: i64,
        exit_price: f64,
        pnl: f64,
    ) -> Result<bool, SentinelError> {
        let updated = self
            .client()?
            .execute(
                "UPDATE trades SET exit_price = $1, pnl = $2, status = 'CLOSED' \
                 WHERE id = $3 AND user_id = $4 AND status = 'OPEN'",
                &[&exit_price, &pnl, &trade_id, &user_id],
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
            .client()?
            .execute(
                "UPDATE trades SET symbol = $1, direction = $2, size = $3, entry_price = $4, \
                                   stop_loss = $5, exit_price = $6, pnl = $7, status = $8, \
                                   risk_amount = $9 \
                 WHERE id = $10 AND user_id = $11",
                &[
                    &trade.symbol(),
                    &trade.direction().as_str(),
                    &trade.size(),
                    &trade.entry_price(),
                    &trade.stop_loss(),
                    &trade.exit_price(),
                    &trade.pnl(),
                    &trade.status().as_str(),
                    &trade.risk_amount(),
                    &trade_id,
                    &user_id,
                ],
            )
            .map_err(query_err)?;
        Ok(updated > 0)
    }

    fn delete_trade(&self, user_id: &str, trade_id: i64) -> Result<bool, SentinelError> {
        let deleted = self
            .client()?
            .execute(
                "DELETE FROM trades WHERE id = $1 AND user_id = $2",
                &[&trade_id, &user_id],
            )
            .map_err(query_err)?;
        Ok(deleted > 0)
    }

    fn list_violations(&self, user_id: &str) -> Result<Vec<Violation>, SentinelError> {
        query_all(
            &mut *self.client()?,
            "SELECT id, user_id, reason, details, created_at FROM violations \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            &[&user_id],
            violation_from_row,
        )
    }

    fn create_account(&self, account: &Account) -> Result<(), SentinelError> {
        self.client()?
            .execute(
                "INSERT INTO accounts (id, email, name, password_hash, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &account.id,
                    &account.email,
                    &account.name,
                    &account.password_hash,
                    &account.created_at,
                ],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn find_account(&self, account_id: &str) -> Result<Option<Account>, SentinelError> {
        query_opt(
            &mut *self.client()?,
            "SELECT id, email, name, password_hash, created_at FROM accounts WHERE id = $1",
            &[&account_id],
            account_from_row,
        )
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, SentinelError> {
        query_opt(
            &mut *self.client()?,
            "SELECT id, email, name, password_hash, created_at FROM accounts WHERE email = $1",
            &[&email],
            account_from_row,
        )
    }
}
