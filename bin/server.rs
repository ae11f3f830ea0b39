// Money Splitter - HTTP API
// JSON over the same SplitBook the CLI and TUI use

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use clap::Parser;
use money_splitter::{
    open_database, Debt, Expense, ExpenseCategory, ExpenseIssue, NetBalances, Person, PersonId,
    PersonSummary, SplitBook, Transaction, CURRENT_USER_ID,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "splitter-server", version, about = "Money Splitter JSON API")]
struct Config {
    /// SQLite database file
    #[arg(long, env = "MONEY_SPLITTER_DB", default_value = "money-splitter.db")]
    db: PathBuf,

    /// Address to listen on
    #[arg(long, env = "MONEY_SPLITTER_BIND", default_value = "127.0.0.1:3000")]
    bind: String,

    /// Log filter
    #[arg(long, env = "MONEY_SPLITTER_LOG", default_value = "info")]
    log_level: String,

    /// Person id used for "you" views
    #[arg(long, env = "MONEY_SPLITTER_ME", default_value = CURRENT_USER_ID)]
    me: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    book: Arc<SplitBook>,
    me: String,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error: logged, then reported in the response wrapper
enum ApiError {
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(err) => {
                tracing::error!("request failed: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Request / Response bodies
// ============================================================================

#[derive(Deserialize)]
struct NewExpense {
    description: String,
    amount: f64,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    category: Option<ExpenseCategory>,
    paid_by: BTreeMap<PersonId, f64>,
    /// Explicit shares; when empty, `split_equally` is used
    #[serde(default)]
    participants: BTreeMap<PersonId, f64>,
    #[serde(default)]
    split_equally: Vec<PersonId>,
}

#[derive(Serialize)]
struct CreatedExpense {
    expense: Expense,
    issues: Vec<ExpenseIssue>,
}

#[derive(Deserialize)]
struct SettlePairRequest {
    debtor: PersonId,
    creditor: PersonId,
}

#[derive(Serialize)]
struct SettledCount {
    settled: usize,
}

#[derive(Serialize)]
struct BalancesResponse {
    balances: NetBalances,
    you: PersonSummary,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/people
async fn get_people(State(state): State<AppState>) -> Json<ApiResponse<Vec<Person>>> {
    Json(ApiResponse::ok(state.book.snapshot().people.all()))
}

/// GET /api/expenses
async fn get_expenses(State(state): State<AppState>) -> Json<ApiResponse<Vec<Expense>>> {
    Json(ApiResponse::ok(state.book.snapshot().expenses.clone()))
}

/// GET /api/balances
async fn get_balances(State(state): State<AppState>) -> Json<ApiResponse<BalancesResponse>> {
    let snapshot = state.book.snapshot();
    Json(ApiResponse::ok(BalancesResponse {
        balances: snapshot.net_balances(),
        you: snapshot.person_summary(&state.me),
    }))
}

/// GET /api/settlement - Pending settle-up plan
async fn get_settlement(State(state): State<AppState>) -> Json<ApiResponse<Vec<Transaction>>> {
    Json(ApiResponse::ok(state.book.settlement_plan()))
}

/// GET /api/debts - Pairwise who-owes-whom
async fn get_debts(State(state): State<AppState>) -> Json<ApiResponse<Vec<Debt>>> {
    Json(ApiResponse::ok(state.book.pairwise_debts()))
}

/// GET /api/transactions - Plan plus settled history
async fn get_transactions(State(state): State<AppState>) -> Json<ApiResponse<Vec<Transaction>>> {
    Json(ApiResponse::ok(state.book.snapshot().transactions.clone()))
}

/// POST /api/expenses
async fn create_expense(
    State(state): State<AppState>,
    Json(body): Json<NewExpense>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedExpense>>), ApiError> {
    let participants = if body.participants.is_empty() {
        Expense::equal_shares(&body.split_equally, body.amount)
    } else {
        body.participants
    };

    let expense = Expense::new(
        &body.description,
        body.amount,
        body.date.unwrap_or_else(|| Local::now().date_naive()),
        body.paid_by,
        participants,
    )
    .with_category(body.category.unwrap_or_default());

    let issues = expense.validate();
    state.book.add_expense(expense.clone())?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(CreatedExpense { expense, issues }))))
}

/// DELETE /api/expenses/:id
async fn delete_expense(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    if state.book.delete_expense(&id)? {
        Ok(Json(ApiResponse::ok(id)))
    } else {
        Err(ApiError::NotFound(format!("expense {} not found", id)))
    }
}

/// POST /api/transactions/:id/settle
///
/// Settling an already-settled transaction is a no-op and still succeeds.
async fn settle_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Transaction> {
    state.book.settle(&id)?;

    let snapshot = state.book.snapshot();
    snapshot
        .transactions
        .iter()
        .find(|tx| tx.id == id)
        .cloned()
        .map(|tx| Json(ApiResponse::ok(tx)))
        .ok_or_else(|| ApiError::NotFound(format!("transaction {} not found", id)))
}

/// POST /api/settle-pair
async fn settle_pair(
    State(state): State<AppState>,
    Json(body): Json<SettlePairRequest>,
) -> ApiResult<SettledCount> {
    let settled = state.book.settle_by_pair(&body.debtor, &body.creditor)?;
    Ok(Json(ApiResponse::ok(SettledCount { settled })))
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/people", get(get_people))
        .route("/expenses", get(get_expenses).post(create_expense))
        .route("/expenses/:id", delete(delete_expense))
        .route("/balances", get(get_balances))
        .route("/settlement", get(get_settlement))
        .route("/debts", get(get_debts))
        .route("/transactions", get(get_transactions))
        .route("/transactions/:id/settle", post(settle_transaction))
        .route("/settle-pair", post(settle_pair))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let conn = open_database(&config.db)?;
    let book = SplitBook::open(conn)?.with_actor(&config.me);
    tracing::info!(db = %config.db.display(), "database opened");

    let state = AppState {
        book: Arc::new(book),
        me: config.me.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("server running on http://{}", config.bind);
    tracing::info!("API: http://{}/api/settlement", config.bind);

    axum::serve(listener, router(state)).await?;

    Ok(())
}
