use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::{CounterpartyStatus, DebtDirection};
use crate::error::AppError;
use crate::handlers::double_option;
use crate::middleware::AuthUser;
use crate::services::debt::{
    CreateCounterparty, CreateDebtTransaction, DebtHistoryFilter, UpdateCounterparty,
    UpdateDebtTransaction,
};
use crate::utils::page::PageParams;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCounterpartyRequest {
    pub name: String,
    pub color: Option<String>,
    pub currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCounterpartyRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListCounterpartiesQuery {
    pub status: Option<CounterpartyStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDebtTransactionRequest {
    pub counterparty_id: Uuid,
    pub wallet_id: Uuid,
    pub direction: DebtDirection,
    pub amount: BigDecimal,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDebtTransactionRequest {
    pub counterparty_id: Option<Uuid>,
    pub wallet_id: Option<Uuid>,
    pub direction: Option<DebtDirection>,
    pub amount: Option<BigDecimal>,
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub direction: Option<DebtDirection>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

// --- Counterparties ---

pub async fn create_counterparty(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateCounterpartyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let counterparty = state
        .debts
        .create_counterparty(
            user.user_id,
            CreateCounterparty {
                name: req.name,
                color: req.color,
                currency_code: req.currency_code,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(counterparty)))
}

pub async fn get_counterparty(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let counterparty = state.debts.get_counterparty(user.user_id, id).await?;
    Ok(Json(counterparty))
}

pub async fn list_counterparties(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListCounterpartiesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let counterparties = state
        .debts
        .list_counterparties(user.user_id, query.status)
        .await?;
    Ok(Json(counterparties))
}

pub async fn update_counterparty(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCounterpartyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let counterparty = state
        .debts
        .update_counterparty(
            user.user_id,
            id,
            UpdateCounterparty {
                name: req.name,
                color: req.color,
            },
        )
        .await?;
    Ok(Json(counterparty))
}

pub async fn archive_counterparty(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let counterparty = state
        .debts
        .set_counterparty_status(user.user_id, id, CounterpartyStatus::Archived)
        .await?;
    Ok(Json(counterparty))
}

pub async fn restore_counterparty(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let counterparty = state
        .debts
        .set_counterparty_status(user.user_id, id, CounterpartyStatus::Active)
        .await?;
    Ok(Json(counterparty))
}

pub async fn delete_counterparty(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.debts.delete_counterparty(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn counterparty_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let params = PageParams {
        page: query.page.unwrap_or(0),
        size: query.size.unwrap_or(0),
    };
    let filter = DebtHistoryFilter {
        direction: query.direction,
        occurred_from: query.occurred_from,
        occurred_to: query.occurred_to,
    };
    let page = state
        .debts
        .list_transactions(user.user_id, id, filter, params)
        .await?;
    Ok(Json(page))
}

pub async fn summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.debts.summary(user.user_id).await?;
    Ok(Json(summary))
}

// --- Debt transactions ---

pub async fn create_debt_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateDebtTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .debts
        .create_transaction(
            user.user_id,
            CreateDebtTransaction {
                counterparty_id: req.counterparty_id,
                wallet_id: req.wallet_id,
                direction: req.direction,
                amount: req.amount,
                occurred_at: req.occurred_at,
                description: req.description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_debt_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state.debts.get_transaction(user.user_id, id).await?;
    Ok(Json(transaction))
}

pub async fn update_debt_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDebtTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .debts
        .update_transaction(
            user.user_id,
            id,
            UpdateDebtTransaction {
                counterparty_id: req.counterparty_id,
                wallet_id: req.wallet_id,
                direction: req.direction,
                amount: req.amount,
                occurred_at: req.occurred_at,
                description: req.description,
            },
        )
        .await?;
    Ok(Json(transaction))
}

pub async fn delete_debt_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.debts.delete_transaction(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
