//! HTTP boundary.
//!
//! | Route | Response |
//! |---|---|
//! | `POST /clients/:client_id/transactions` | `{"limit", "balance"}` |
//! | `GET /clients/:client_id/statement` | `{"balance", "latest_transactions"}` |
//! | `GET /health` | `{"ok": true}` |
//! | `GET /metrics` | Prometheus text |
//!
//! Unknown clients map to 404. Limit breaches and every kind of malformed
//! input map to 422. Store failures, timeouts and shutdown map to 503.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use creditledger_common::{to_iso8601, Entry, LedgerError, Statement};

use crate::service::{LedgerService, ServiceError};

/// Body of `POST /clients/:client_id/transactions`.
#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub value: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Balance after a committed entry.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub limit: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct StatementBalance {
    pub total: i64,
    pub limit: i64,
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct StatementTransaction {
    pub value: i64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: String,
    pub executed_at: String,
}

#[derive(Debug, Serialize)]
pub struct StatementResponse {
    pub balance: StatementBalance,
    pub latest_transactions: Vec<StatementTransaction>,
}

impl From<&Entry> for StatementTransaction {
    fn from(entry: &Entry) -> Self {
        Self {
            value: entry.amount.get(),
            kind: entry.kind.code(),
            description: entry.description.as_str().to_string(),
            executed_at: to_iso8601(entry.recorded_at),
        }
    }
}

impl From<Statement> for StatementResponse {
    fn from(statement: Statement) -> Self {
        Self {
            balance: StatementBalance {
                total: statement.balance.total,
                limit: statement.balance.limit,
                date: to_iso8601(statement.balance.as_of),
            },
            latest_transactions: statement.entries.iter().map(Into::into).collect(),
        }
    }
}

/// Build the application router.
pub fn router(service: Arc<LedgerService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/clients/:client_id/transactions", post(submit_transaction))
        .route("/clients/:client_id/statement", get(statement))
        .with_state(service)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn status_for(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::ClientNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::LimitExceeded { .. } | LedgerError::Validation { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::Store(_) | LedgerError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::Unavailable(_) => json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                self.to_string(),
            ),
            ServiceError::Ledger(e) => json_error(status_for(&e), e.error_code(), e.to_string()),
        }
    }
}

fn reject(service: &LedgerService, field: &str, message: String) -> Response {
    let error = LedgerError::validation(field, message);
    service.record_rejected(&error);
    ServiceError::Ledger(error).into_response()
}

fn reject_submission(service: &LedgerService, field: &str, message: String) -> Response {
    let error = LedgerError::validation(field, message);
    service.record_rejected_submission(&error);
    ServiceError::Ledger(error).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn metrics(State(service): State<Arc<LedgerService>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.metrics().to_prometheus(),
    )
        .into_response()
}

async fn submit_transaction(
    State(service): State<Arc<LedgerService>>,
    client_id: Result<Path<i32>, PathRejection>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> Response {
    let Path(client_id) = match client_id {
        Ok(path) => path,
        Err(rejection) => return reject_submission(&service, "client_id", rejection.body_text()),
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return reject_submission(&service, "body", rejection.body_text()),
    };

    match service
        .submit_entry(client_id, body.value, &body.kind, body.description)
        .await
    {
        Ok(after) => Json(TransactionResponse {
            limit: after.limit,
            balance: after.balance,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn statement(
    State(service): State<Arc<LedgerService>>,
    client_id: Result<Path<i32>, PathRejection>,
) -> Response {
    let Path(client_id) = match client_id {
        Ok(path) => path,
        Err(rejection) => return reject(&service, "client_id", rejection.body_text()),
    };

    match service.statement(client_id).await {
        Ok(statement) => Json(StatementResponse::from(statement)).into_response(),
        Err(e) => e.into_response(),
    }
}
