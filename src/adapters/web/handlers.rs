//! HTTP request handlers for web adapter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::{Days, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::domain::account::{check_password_strength, normalize_email, Account};
use crate::domain::clock::ReferenceClock;
use crate::domain::emotional_gate::{Answer, GateResult};
use crate::domain::error::SentinelError;
use crate::domain::rules::{parse_time_of_day, parse_timezone, RuleConfig, RuleSettings};
use crate::domain::session_stats::{recent_trades, SessionStats};
use crate::domain::submission::{self, TimeAuthority};
use crate::domain::trade::TradeTicket;
use crate::domain::violation::ViolationReason;
use crate::ports::market_data_port::Quote;

use super::auth::{hash_password, Backend, Credentials, User};
use super::templates::{
    DashboardTemplate, EditTradeTemplate, GateTemplate, HistoryTemplate, LockRow,
    LoginTemplate, MarketResultsTemplate, OutcomeView, Page, QuoteView, SettingsTemplate,
    SignupTemplate, TradeFormTemplate, TradeRow, ViolationRow, ViolationsTemplate,
};
use super::{is_htmx_request, AppState, WebError};

type AuthSession = axum_login::AuthSession<Backend>;

const MAX_SEARCH_RESULTS: usize = 10;

fn render<T: Template>(template: &T) -> Result<Response, WebError> {
    template
        .render()
        .map(|html| Html(html).into_response())
        .map_err(|e| WebError::internal(e.to_string()))
}

/// 303 for plain requests; HTMX requests get `HX-Redirect` so the whole page
/// navigates instead of swapping a fragment.
fn redirect(headers: &HeaderMap, to: &'static str) -> Response {
    if is_htmx_request(headers) {
        (StatusCode::OK, [("HX-Redirect", to)]).into_response()
    } else {
        Redirect::to(to).into_response()
    }
}

fn current_user(auth: &AuthSession) -> Result<User, WebError> {
    auth.user
        .clone()
        .ok_or_else(|| WebError::from(SentinelError::Unauthorized))
}

fn user_rules(state: &AppState, user_id: &str) -> Result<RuleConfig, WebError> {
    Ok(state.store.rules(user_id)?.unwrap_or_default())
}

fn time_authority(state: &AppState) -> TimeAuthority {
    TimeAuthority {
        trust_client_time: state.config.get_bool("rules", "trust_client_time", false),
    }
}

async fn lookup_quote(state: &AppState, symbol: &str) -> Option<Quote> {
    if symbol.trim().is_empty() {
        return None;
    }
    match state.market_data.quote(symbol).await {
        Ok(quote) => quote,
        Err(e) => {
            warn!(error = %e, symbol, "quote lookup failed");
            None
        }
    }
}

// --- auth ---

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub email: String,
    pub name: String,
    pub password: String,
}

pub async fn login_form(headers: HeaderMap) -> Result<Response, WebError> {
    render(&LoginTemplate {
        page: Page::public("Login", is_htmx_request(&headers)),
        email: "",
        error: None,
    })
}

pub async fn login(
    mut auth: AuthSession,
    headers: HeaderMap,
    Form(creds): Form<Credentials>,
) -> Result<Response, WebError> {
    let email = creds.email.clone();
    let user = match auth.authenticate(creds).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return render(&LoginTemplate {
                page: Page::public("Login", is_htmx_request(&headers)),
                email: &email,
                error: Some("Invalid email or password."),
            });
        }
        Err(e) => return Err(WebError::internal(e.to_string())),
    };

    auth.login(&user)
        .await
        .map_err(|e| WebError::internal(e.to_string()))?;
    info!(user_id = %user.id, "signed in");
    Ok(redirect(&headers, "/"))
}

fn register(state: &AppState, form: &SignupForm) -> Result<Account, SentinelError> {
    check_password_strength(&form.password)?;
    let email = normalize_email(&form.email)?;
    if state.store.find_account_by_email(&email)?.is_some() {
        return Err(SentinelError::invalid("email", "is already registered"));
    }

    let account = Account::new(&email, &form.name, hash_password(&form.password)?)?;
    state.store.create_account(&account)?;

    // Onboarding starts from the defaults in the configured timezone.
    let timezone = parse_timezone(&state.config.get_string_or("rules", "default_timezone", "UTC"))
        .unwrap_or(Tz::UTC);
    let rules = RuleConfig {
        timezone,
        ..RuleConfig::default()
    };
    state.store.save_rules(&account.id, &rules)?;
    Ok(account)
}

pub async fn signup_form(headers: HeaderMap) -> Result<Response, WebError> {
    render(&SignupTemplate {
        page: Page::public("Sign up", is_htmx_request(&headers)),
        email: "",
        name: "",
        error: None,
    })
}

pub async fn signup(
    mut auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SignupForm>,
) -> Result<Response, WebError> {
    let account = match register(&state, &form) {
        Ok(account) => account,
        Err(e) if e.is_invalid_input() => {
            return render(&SignupTemplate {
                page: Page::public("Sign up", is_htmx_request(&headers)),
                email: &form.email,
                name: &form.name,
                error: Some(e.to_string()),
            });
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %account.id, "account created");
    auth.login(&User::from(account))
        .await
        .map_err(|e| WebError::internal(e.to_string()))?;
    Ok(redirect(&headers, "/settings"))
}

pub async fn logout(mut auth: AuthSession) -> Result<Response, WebError> {
    auth.logout()
        .await
        .map_err(|e| WebError::internal(e.to_string()))?;
    Ok(Redirect::to("/login").into_response())
}

// --- dashboard & settings ---

pub async fn dashboard(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let rules = state.store.rules(&user.id)?;
    if rules.as_ref().is_some_and(|r| !r.setup_complete) {
        return Ok(redirect(&headers, "/settings"));
    }
    dashboard_page(
        &state,
        &user,
        &rules.unwrap_or_default(),
        Page::new("Dashboard", is_htmx_request(&headers)),
        None,
    )
}

fn dashboard_page(
    state: &AppState,
    user: &User,
    rules: &RuleConfig,
    page: Page,
    outcome: Option<OutcomeView>,
) -> Result<Response, WebError> {
    let clock = ReferenceClock::system(rules.timezone);
    let trades = state.store.list_trades(&user.id, None)?;
    let lock = state.store.find_lock(&user.id, clock.reference_day())?;
    let stats = SessionStats::compute(&trades, rules, &clock, lock.as_ref());
    let recent = TradeRow::list(&recent_trades(&trades), rules.timezone);

    let mut template = DashboardTemplate::new(page, &user.name, &stats, rules, recent);
    template.outcome = outcome;
    render(&template)
}

pub async fn settings_form(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let rules = user_rules(&state, &user.id)?;
    render(&SettingsTemplate {
        page: Page::new("Rules & Settings", is_htmx_request(&headers)),
        form: RuleSettings::from(&rules),
        onboarding: !rules.setup_complete,
        error: None,
    })
}

pub async fn save_settings(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<RuleSettings>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    match form.clone().into_config() {
        Ok(rules) => {
            state.store.save_rules(&user.id, &rules)?;
            info!(user_id = %user.id, max_trades = rules.max_trades_per_day, max_loss = rules.max_daily_loss, "rules saved");
            Ok(redirect(&headers, "/"))
        }
        Err(e) if e.is_invalid_input() => render(&SettingsTemplate {
            page: Page::new("Rules & Settings", is_htmx_request(&headers)),
            form,
            onboarding: false,
            error: Some(e.to_string()),
        }),
        Err(e) => Err(e.into()),
    }
}

// --- trade entry ---

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SymbolQuery {
    pub symbol: String,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TradeForm {
    #[serde(flatten)]
    pub ticket: TradeTicket,
    /// Browser-local `HH:MM`, only honoured when client time is trusted.
    pub client_time: String,
}

fn parse_answers(form: &HashMap<String, String>) -> Result<BTreeMap<usize, Answer>, SentinelError> {
    let mut answers = BTreeMap::new();
    for (key, value) in form {
        let Some(index) = key.strip_prefix('q').and_then(|i| i.parse::<usize>().ok()) else {
            continue;
        };
        answers.insert(index, value.parse::<Answer>()?);
    }
    Ok(answers)
}

fn trade_form(
    page: Page,
    ticket: TradeTicket,
    outcome: Option<OutcomeView>,
    quote: Option<Quote>,
    rules: &RuleConfig,
) -> Result<Response, WebError> {
    render(&TradeFormTemplate {
        page,
        ticket,
        outcome,
        quote: quote.map(QuoteView::from),
        max_risk_percent: rules.max_risk_per_trade_percent.to_string(),
    })
}

/// The emotional gate, shown before the trade form.
pub async fn new_trade(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SymbolQuery>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let rules = user_rules(&state, &user.id)?;
    let clock = ReferenceClock::system(rules.timezone);

    let mut template = GateTemplate::new(
        Page::new("Pre-trade check", is_htmx_request(&headers)),
        query.symbol.trim().to_uppercase(),
    );
    if state
        .store
        .find_lock(&user.id, clock.reference_day())?
        .is_some()
    {
        template.locked_message = Some(ViolationReason::LockedSessionAttempt.message());
    }
    render(&template)
}

pub async fn submit_gate(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let htmx = is_htmx_request(&headers);
    let symbol = form
        .get("symbol")
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_default();

    let result = parse_answers(&form).and_then(|answers| {
        submission::run_emotional_gate(
            state.store.as_ref(),
            &user.id,
            &ReferenceClock::system(Tz::UTC),
            &answers,
        )
    });

    match result {
        Ok(GateResult::Pass) => {
            let rules = user_rules(&state, &user.id)?;
            let quote = lookup_quote(&state, &symbol).await;
            let ticket = TradeTicket {
                entry_price: quote.map(|q| format!("{:.2}", q.current)).unwrap_or_default(),
                symbol,
                ..TradeTicket::default()
            };
            trade_form(Page::new("Log a trade", htmx), ticket, None, quote, &rules)
        }
        Ok(GateResult::Fail) => {
            let mut template = GateTemplate::new(Page::new("Pre-trade check", htmx), symbol);
            template.locked_message = Some(ViolationReason::EmotionalCheckFailed.message());
            render(&template)
        }
        Err(e) if e.is_invalid_input() => {
            let mut template = GateTemplate::new(Page::new("Pre-trade check", htmx), symbol);
            template.error = Some(e.to_string());
            render(&template)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn submit_trade(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TradeForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let rules = user_rules(&state, &user.id)?;
    let htmx = is_htmx_request(&headers);
    let page = Page::new("Log a trade", htmx);

    let trade = match form.ticket.validate() {
        Ok(trade) => trade,
        Err(e) if e.is_invalid_input() => {
            let outcome = OutcomeView {
                status: "ERROR",
                message: e.to_string(),
            };
            let quote = lookup_quote(&state, &form.ticket.symbol).await;
            return trade_form(page, form.ticket, Some(outcome), quote, &rules);
        }
        Err(e) => return Err(e.into()),
    };

    let result = submission::submit_trade(
        state.store.as_ref(),
        &user.id,
        &trade,
        Utc::now(),
        parse_time_of_day(&form.client_time).ok(),
        time_authority(&state),
    )?;

    let outcome = OutcomeView {
        status: result.status(),
        message: result.message().to_string(),
    };
    // A logged trade closes the form; the next one starts at the gate again.
    if result.is_logged() {
        return dashboard_page(&state, &user, &rules, Page::new("Dashboard", htmx), Some(outcome));
    }
    let quote = lookup_quote(&state, trade.symbol()).await;
    trade_form(page, form.ticket, Some(outcome), quote, &rules)
}

// --- trade management ---

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CloseForm {
    pub exit_price: String,
}

struct EditInput {
    ticket: Option<TradeTicket>,
    exit_price: String,
    error: Option<String>,
}

fn edit_page(
    state: &AppState,
    user_id: &str,
    trade_id: i64,
    page: Page,
    input: EditInput,
) -> Result<Response, WebError> {
    let trade = state
        .store
        .find_trade(user_id, trade_id)?
        .ok_or_else(|| SentinelError::not_found("trade", trade_id))?;
    let rules = user_rules(state, user_id)?;
    render(&EditTradeTemplate {
        page,
        ticket: input.ticket.unwrap_or_else(|| TradeTicket::from(&trade)),
        trade: TradeRow::new(&trade, rules.timezone),
        exit_price: input.exit_price,
        error: input.error,
    })
}

pub async fn edit_trade(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trade_id): Path<i64>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let page = Page::new("Edit trade", is_htmx_request(&headers));
    let input = EditInput {
        ticket: None,
        exit_price: String::new(),
        error: None,
    };
    edit_page(&state, &user.id, trade_id, page, input)
}

pub async fn update_trade(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trade_id): Path<i64>,
    Form(ticket): Form<TradeTicket>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    match submission::edit_trade(state.store.as_ref(), &user.id, trade_id, &ticket) {
        Ok(_) => Ok(redirect(&headers, "/history")),
        Err(e) if e.is_invalid_input() => {
            let page = Page::new("Edit trade", is_htmx_request(&headers));
            let input = EditInput {
                error: Some(e.to_string()),
                ticket: Some(ticket),
                exit_price: String::new(),
            };
            edit_page(&state, &user.id, trade_id, page, input)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn close_trade(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trade_id): Path<i64>,
    Form(form): Form<CloseForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    match submission::close_trade(state.store.as_ref(), &user.id, trade_id, &form.exit_price) {
        Ok(_) => Ok(redirect(&headers, "/")),
        Err(e) if e.is_invalid_input() => {
            let page = Page::new("Edit trade", is_htmx_request(&headers));
            let input = EditInput {
                error: Some(e.to_string()),
                ticket: None,
                exit_price: form.exit_price,
            };
            edit_page(&state, &user.id, trade_id, page, input)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_trade(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trade_id): Path<i64>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    if !state.store.delete_trade(&user.id, trade_id)? {
        return Err(SentinelError::not_found("trade", trade_id).into());
    }
    info!(user_id = %user.id, trade_id, "trade deleted");
    Ok(redirect(&headers, "/history"))
}

pub async fn history(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let rules = user_rules(&state, &user.id)?;
    let trades = state.store.list_trades(&user.id, None)?;
    render(&HistoryTemplate {
        page: Page::new("History", is_htmx_request(&headers)),
        trades: TradeRow::list(&trades, rules.timezone),
    })
}

pub async fn violations(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let rules = user_rules(&state, &user.id)?;
    let today = ReferenceClock::system(rules.timezone).reference_day();
    let since = today.checked_sub_days(Days::new(1)).unwrap_or(today);

    let violations = state.store.list_violations(&user.id)?;
    let locks = state.store.recent_locks(&user.id, since)?;
    render(&ViolationsTemplate {
        page: Page::new("Violations", is_htmx_request(&headers)),
        violations: violations
            .iter()
            .map(|v| ViolationRow::new(v, rules.timezone))
            .collect(),
        locks: locks.iter().map(LockRow::from).collect(),
    })
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LockForm {
    pub reason: String,
}

/// Self-imposed lock for the rest of the reference day.
pub async fn lock(
    auth: AuthSession,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LockForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth)?;
    let reason = match form.reason.trim() {
        "" => ViolationReason::EmotionalCheckFailed,
        raw => raw.parse::<ViolationReason>()?,
    };
    submission::lock_session(
        state.store.as_ref(),
        &user.id,
        &ReferenceClock::system(Tz::UTC),
        reason,
    )?;
    Ok(redirect(&headers, "/"))
}

// --- market data ---

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn market_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, WebError> {
    let mut matches = match state.market_data.search_symbols(&query.q).await {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, query = %query.q, "symbol search failed");
            Vec::new()
        }
    };
    matches.truncate(MAX_SEARCH_RESULTS);
    render(&MarketResultsTemplate { matches })
}

pub async fn market_quote(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SymbolQuery>,
) -> Json<Option<Quote>> {
    Json(lookup_quote(&state, &query.symbol).await)
}

pub async fn not_found() -> WebError {
    WebError::not_found("Page not found")
}
