use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::TransactionKind;
use crate::error::AppError;
use crate::handlers::double_option;
use crate::middleware::AuthUser;
use crate::services::category_tx::{
    CreateCategoryTransaction, ListTransactions, UpdateCategoryTransaction,
};
use crate::utils::page::PageParams;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub wallet_id: Uuid,
    pub category_id: Uuid,
    pub subcategory_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransactionRequest {
    pub wallet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub subcategory_id: Option<Option<Uuid>>,
    pub kind: Option<TransactionKind>,
    pub amount: Option<BigDecimal>,
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub wallet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .transactions
        .create(
            user.user_id,
            CreateCategoryTransaction {
                wallet_id: req.wallet_id,
                category_id: req.category_id,
                subcategory_id: req.subcategory_id,
                kind: req.kind,
                amount: req.amount,
                occurred_at: req.occurred_at,
                description: req.description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state.transactions.get(user.user_id, id).await?;
    Ok(Json(transaction))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .transactions
        .list(
            user.user_id,
            ListTransactions {
                wallet_id: query.wallet_id,
                category_id: query.category_id,
                subcategory_id: query.subcategory_id,
                kind: query.kind,
                occurred_from: query.occurred_from,
                occurred_to: query.occurred_to,
                page: PageParams {
                    page: query.page.unwrap_or(0),
                    size: query.size.unwrap_or(0),
                },
            },
        )
        .await?;
    Ok(Json(page))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .transactions
        .update(
            user.user_id,
            id,
            UpdateCategoryTransaction {
                wallet_id: req.wallet_id,
                category_id: req.category_id,
                subcategory_id: req.subcategory_id,
                kind: req.kind,
                amount: req.amount,
                occurred_at: req.occurred_at,
                description: req.description,
            },
        )
        .await?;
    Ok(Json(transaction))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.transactions.delete(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
