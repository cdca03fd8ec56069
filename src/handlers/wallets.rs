use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::WalletStatus;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::services::wallets::{CreateWallet, UpdateWallet};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub name: String,
    pub currency_code: String,
    pub initial_balance: Option<BigDecimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWalletRequest {
    pub name: Option<String>,
    pub status: Option<WalletStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ListWalletsQuery {
    pub status: Option<WalletStatus>,
}

pub async fn create_wallet(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state
        .wallets
        .create_wallet(
            user.user_id,
            CreateWallet {
                name: req.name,
                currency_code: req.currency_code,
                initial_balance: req.initial_balance,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.wallets.get_wallet(user.user_id, id).await?;
    Ok(Json(wallet))
}

pub async fn list_wallets(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListWalletsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let wallets = state.wallets.list_wallets(user.user_id, query.status).await?;
    Ok(Json(wallets))
}

pub async fn wallet_balances(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let balances = state.wallets.currency_balances(user.user_id).await?;
    Ok(Json(balances))
}

pub async fn update_wallet(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state
        .wallets
        .update_wallet(
            user.user_id,
            id,
            UpdateWallet {
                name: req.name,
                status: req.status,
            },
        )
        .await?;
    Ok(Json(wallet))
}

pub async fn delete_wallet(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.wallets.delete_wallet(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
