// Warehouse Ledger - Web Server
// JSON API over the movement engine with Axum

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use warehouse_ledger::db::{self, Direction};
use warehouse_ledger::{
    authenticate, create_variant, execute_movement, logging, open_database, variants, Config,
    LedgerError, MovementForm, SessionContext, VariantDraft,
};

const USER_HEADER: &str = "x-warehouse-user";
const PASSWORD_HEADER: &str = "x-warehouse-password";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panicked handler cannot leave a half-applied movement behind (transactions roll back)
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Error body
#[derive(Serialize)]
struct ApiError {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    message: String,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Integrity(_) | LedgerError::Rejected(_) => StatusCode::CONFLICT,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::Unauthorized => StatusCode::UNAUTHORIZED,
        LedgerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: LedgerError) -> Response {
    if !err.is_recoverable() {
        error!("request failed: {}", err);
    }
    let message = match &err {
        LedgerError::Validation(v) => v.message.clone(),
        other => other.to_string(),
    };
    (
        status_for(&err),
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError {
                kind: err.kind(),
                field: err.field(),
                message,
            }),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(result: Result<T, LedgerError>) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(err) => failure(err),
    }
}

/// Credentials come from two headers and are checked on every write.
fn session_from(conn: &Connection, headers: &HeaderMap) -> Result<SessionContext, LedgerError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let (Some(user), Some(password)) = (header(USER_HEADER), header(PASSWORD_HEADER)) else {
        return Err(LedgerError::Unauthorized);
    };
    let operator = authenticate(conn, user, password)?;
    Ok(SessionContext::new(operator))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

#[derive(Deserialize)]
struct StockQuery {
    #[serde(default)]
    below_minimum: bool,
}

/// GET /api/stock - All items (or only those below minimum)
async fn get_stock(State(state): State<AppState>, Query(query): Query<StockQuery>) -> Response {
    let conn = state.conn();
    let result = db::list_stock(&conn).map(|items| {
        items
            .into_iter()
            .filter(|item| !query.below_minimum || item.is_below_minimum())
            .collect::<Vec<_>>()
    });
    respond(result)
}

/// GET /api/stock/:id - One item
async fn get_item(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let conn = state.conn();
    respond(db::get_stock_item(&conn, id))
}

/// Movement request body: direction plus the raw form fields.
#[derive(Deserialize)]
struct MovementRequest {
    direction: Direction,
    #[serde(flatten)]
    form: MovementForm,
}

/// POST /api/stock/:id/movements - Receive or issue
async fn post_movement(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<MovementRequest>,
) -> Response {
    let mut conn = state.conn();
    let result = session_from(&conn, &headers).and_then(|session| {
        execute_movement(&mut conn, &session, id, request.direction, &request.form)
    });
    respond(result)
}

#[derive(Deserialize)]
struct AuditQuery {
    item: Option<i64>,
}

/// GET /api/audit - Audit log, optionally for one item
async fn get_audit(State(state): State<AppState>, Query(query): Query<AuditQuery>) -> Response {
    let conn = state.conn();
    respond(match query.item {
        Some(id) => db::audit_entries_for_item(&conn, id),
        None => db::list_audit_log(&conn),
    })
}

/// GET /api/variants - Variant listing, optionally for one item
async fn get_variants(State(state): State<AppState>, Query(query): Query<AuditQuery>) -> Response {
    let conn = state.conn();
    respond(match query.item {
        Some(id) => variants::variants_for_item(&conn, id),
        None => variants::list_variants(&conn),
    })
}

/// POST /api/variants - Create a variant from a (completed) draft
async fn post_variant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<VariantDraft>,
) -> Response {
    let conn = state.conn();
    let result = session_from(&conn, &headers).and_then(|_| create_variant(&conn, draft));
    respond(result)
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stock", get(get_stock))
        .route("/stock/:id", get(get_item))
        .route("/stock/:id/movements", axum::routing::post(post_movement))
        .route("/audit", get(get_audit))
        .route("/variants", get(get_variants).post(post_variant))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    logging::init(&config.logging);

    println!("🌐 Warehouse Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    println!("✓ Database opened: {:?}", config.database_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let app = Router::new()
        .nest("/api", api_routes(state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!(bind = %config.server.bind, "server listening");
    println!("\n🚀 Server running on http://{}", config.server.bind);
    println!("   API: http://{}/api/stock", config.server.bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server stopped with an error")?;
    Ok(())
}
