use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::double_option;
use crate::middleware::AuthUser;
use crate::services::transfers::{CreateTransfer, UpdateTransfer};
use crate::utils::page::PageParams;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransferRequest {
    pub amount: Option<BigDecimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListTransfersQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub async fn create_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateTransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = state
        .transfers
        .create_transfer(
            user.user_id,
            CreateTransfer {
                from_wallet_id: req.from_wallet_id,
                to_wallet_id: req.to_wallet_id,
                amount: req.amount,
                description: req.description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = state.transfers.get_transfer(user.user_id, id).await?;
    Ok(Json(transfer))
}

pub async fn update_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = state
        .transfers
        .update_transfer(
            user.user_id,
            id,
            UpdateTransfer {
                amount: req.amount,
                description: req.description,
            },
        )
        .await?;
    Ok(Json(transfer))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListTransfersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let params = PageParams {
        page: query.page.unwrap_or(0),
        size: query.size.unwrap_or(0),
    };
    let page = state.transfers.list_transfers(user.user_id, params).await?;
    Ok(Json(page))
}

pub async fn delete_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.transfers.delete_transfer(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
