//! Effectful side of trade admission: runs the evaluator against stored
//! state and persists its outcome.

use chrono::{DateTime, NaiveTime, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::admission::{self, AdmissionContext, AdmissionDecision, Blocked};
use super::clock::ReferenceClock;
use super::emotional_gate::{self, Answer, GateResult};
use super::error::SentinelError;
use super::trade::{parse_positive, ProposedTrade, TradeTicket};
use super::violation::ViolationReason;
use crate::ports::trade_store::{LedgerTx, TradeStore};

/// Which clock the trading-window rule trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeAuthority {
    /// Honour a browser-supplied local time instead of the server clock.
    pub trust_client_time: bool,
}

impl TimeAuthority {
    pub fn time_of_day(&self, clock: &ReferenceClock, client_time: Option<NaiveTime>) -> NaiveTime {
        match client_time {
            Some(t) if self.trust_client_time => t,
            _ => clock.local_time(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// The trade row was written. `locked` is set when this trade tripped the
    /// daily loss cap.
    Logged { trade_id: i64, locked: bool },
    Blocked { reason: ViolationReason },
}

impl SubmissionOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            SubmissionOutcome::Logged { .. } => "SUCCESS",
            SubmissionOutcome::Blocked { .. } => "BLOCKED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SubmissionOutcome::Logged { locked: false, .. } => "Trade logged successfully.",
            SubmissionOutcome::Logged { locked: true, .. } => {
                "Trade logged. DAILY LOSS LIMIT HIT. Account Locked."
            }
            SubmissionOutcome::Blocked { reason } => reason.message(),
        }
    }

    pub fn is_logged(&self) -> bool {
        matches!(self, SubmissionOutcome::Logged { .. })
    }
}

fn record_violation(
    tx: &mut dyn LedgerTx,
    user_id: &str,
    clock: &ReferenceClock,
    blocked: &Blocked,
) -> Result<(), SentinelError> {
    tx.insert_violation(user_id, blocked.reason, &blocked.details, clock.now())?;
    if blocked.creates_lock() {
        let created = tx.insert_lock_if_absent(
            user_id,
            clock.reference_day(),
            blocked.reason,
            clock.now(),
        )?;
        if created {
            info!(user_id, reason = %blocked.reason, day = %clock.reference_day(), "session locked");
        }
    }
    Ok(())
}

/// Admits or rejects `trade` for `user_id` at instant `now`.
///
/// Lock lookup, aggregate reads, the trade insert and the daily-loss
/// re-check all happen inside one per-user transaction.
pub fn submit_trade(
    store: &dyn TradeStore,
    user_id: &str,
    trade: &ProposedTrade,
    now: DateTime<Utc>,
    client_time: Option<NaiveTime>,
    authority: TimeAuthority,
) -> Result<SubmissionOutcome, SentinelError> {
    let mut outcome = None;

    store.in_user_transaction(user_id, &mut |tx: &mut dyn LedgerTx| {
        let rules = tx.rules(user_id)?.unwrap_or_default();
        let clock = ReferenceClock::new(now, rules.timezone);
        let locked = tx.find_lock(user_id, clock.reference_day())?.is_some();
        let stats = tx.day_stats(user_id, clock.day_start())?;

        let ctx = AdmissionContext {
            rules: &rules,
            stats,
            locked,
            time_of_day: authority.time_of_day(&clock, client_time),
        };

        match admission::evaluate(trade, &ctx) {
            AdmissionDecision::Blocked(blocked) => {
                record_violation(tx, user_id, &clock, &blocked)?;
                warn!(user_id, symbol = trade.symbol(), reason = %blocked.reason, "trade blocked");
                outcome = Some(SubmissionOutcome::Blocked {
                    reason: blocked.reason,
                });
            }
            AdmissionDecision::Allowed => {
                let trade_id = tx.insert_trade(user_id, trade, now)?;
                let loss = admission::check_daily_loss(trade, &rules, stats);
                if let Some(blocked) = &loss {
                    record_violation(tx, user_id, &clock, blocked)?;
                }
                info!(user_id, trade_id, symbol = trade.symbol(), status = %trade.status(), "trade logged");
                outcome = Some(SubmissionOutcome::Logged {
                    trade_id,
                    locked: loss.is_some(),
                });
            }
        }
        Ok(())
    })?;

    outcome.ok_or_else(|| SentinelError::Database {
        reason: "transaction finished without an admission outcome".into(),
    })
}

/// Idempotently locks the user's session for the reference day.
///
/// Returns `false` when a lock already existed.
pub fn lock_session(
    store: &dyn TradeStore,
    user_id: &str,
    clock: &ReferenceClock,
    reason: ViolationReason,
) -> Result<bool, SentinelError> {
    let mut created = false;
    store.in_user_transaction(user_id, &mut |tx: &mut dyn LedgerTx| {
        let clock = match tx.rules(user_id)? {
            Some(rules) => clock.in_timezone(rules.timezone),
            None => *clock,
        };
        created =
            tx.insert_lock_if_absent(user_id, clock.reference_day(), reason, clock.now())?;
        Ok(())
    })?;
    if created {
        info!(user_id, reason = %reason, "session locked on request");
    }
    Ok(created)
}

/// Evaluates the emotional gate and, on failure, records the violation and
/// locks the session.
pub fn run_emotional_gate(
    store: &dyn TradeStore,
    user_id: &str,
    clock: &ReferenceClock,
    answers: &BTreeMap<usize, Answer>,
) -> Result<GateResult, SentinelError> {
    let result = emotional_gate::evaluate(answers)?;
    if result == GateResult::Pass {
        return Ok(result);
    }

    let failed: Vec<usize> = answers
        .iter()
        .filter(|(_, a)| **a == Answer::Yes)
        .map(|(i, _)| *i)
        .collect();
    let blocked = Blocked {
        reason: ViolationReason::EmotionalCheckFailed,
        details: serde_json::json!({ "questions": failed }),
    };

    store.in_user_transaction(user_id, &mut |tx: &mut dyn LedgerTx| {
        let clock = match tx.rules(user_id)? {
            Some(rules) => clock.in_timezone(rules.timezone),
            None => *clock,
        };
        record_violation(tx, user_id, &clock, &blocked)
    })?;
    warn!(user_id, "emotional gate failed");
    Ok(result)
}

/// Closes an open trade at `exit_price`. Admission rules are not re-run.
pub fn close_trade(
    store: &dyn TradeStore,
    user_id: &str,
    trade_id: i64,
    exit_price: &str,
) -> Result<f64, SentinelError> {
    let exit_price = parse_positive("exit_price", exit_price)?;
    let trade = store
        .find_trade(user_id, trade_id)?
        .ok_or_else(|| SentinelError::not_found("trade", trade_id))?;
    let pnl = trade.close_pnl(exit_price)?;
    if !store.close_trade(user_id, trade_id, exit_price, pnl)? {
        return Err(SentinelError::invalid("trade", "is already closed"));
    }
    info!(user_id, trade_id, pnl, "trade closed");
    Ok(pnl)
}

/// Rewrites a stored trade from an edited ticket. Geometry is revalidated and
/// risk and PnL recomputed; admission rules are not re-run.
pub fn edit_trade(
    store: &dyn TradeStore,
    user_id: &str,
    trade_id: i64,
    ticket: &TradeTicket,
) -> Result<ProposedTrade, SentinelError> {
    let trade = ticket.validate()?;
    if !store.update_trade(user_id, trade_id, &trade)? {
        return Err(SentinelError::not_found("trade", trade_id));
    }
    info!(user_id, trade_id, symbol = trade.symbol(), "trade edited");
    Ok(trade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    #[test]
    fn server_clock_is_authoritative_by_default() {
        let clock = ReferenceClock::new(Utc.with_ymd_and_hms(2024, 3, 5, 20, 0, 0).unwrap(), Tz::UTC);
        let client = NaiveTime::from_hms_opt(10, 0, 0);
        let t = TimeAuthority::default().time_of_day(&clock, client);
        assert_eq!(t, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
    }

    #[test]
    fn client_time_used_when_trusted() {
        let clock = ReferenceClock::new(Utc.with_ymd_and_hms(2024, 3, 5, 20, 0, 0).unwrap(), Tz::UTC);
        let authority = TimeAuthority {
            trust_client_time: true,
        };
        let client = NaiveTime::from_hms_opt(10, 0, 0);
        assert_eq!(authority.time_of_day(&clock, client), client.unwrap());
        assert_eq!(
            authority.time_of_day(&clock, None),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap()
        );
    }

    #[test]
    fn outcome_messages() {
        let ok = SubmissionOutcome::Logged {
            trade_id: 1,
            locked: false,
        };
        assert_eq!(ok.status(), "SUCCESS");
        assert_eq!(ok.message(), "Trade logged successfully.");

        let locked = SubmissionOutcome::Logged {
            trade_id: 1,
            locked: true,
        };
        assert!(locked.message().contains("DAILY LOSS LIMIT HIT"));

        let blocked = SubmissionOutcome::Blocked {
            reason: ViolationReason::TimeWindowViolation,
        };
        assert_eq!(blocked.status(), "BLOCKED");
        assert_eq!(blocked.message(), "Trading window closed.");
    }
}
