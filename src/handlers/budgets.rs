use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::{BudgetPeriodType, BudgetStatus, BudgetType};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::services::budgets::{BudgetListFilter, CreateBudget, UpdateBudget};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    pub name: String,
    pub period_type: BudgetPeriodType,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub budget_type: BudgetType,
    pub currency_code: String,
    pub amount_limit: BigDecimal,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBudgetRequest {
    pub name: Option<String>,
    pub amount_limit: Option<BigDecimal>,
    pub category_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct ListBudgetsQuery {
    pub status: Option<BudgetStatus>,
    pub period_type: Option<BudgetPeriodType>,
    pub budget_type: Option<BudgetType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn create_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateBudgetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let budget = state
        .budgets
        .create_budget(
            user.user_id,
            CreateBudget {
                name: req.name,
                period_type: req.period_type,
                period_start: req.period_start,
                period_end: req.period_end,
                budget_type: req.budget_type,
                currency_code: req.currency_code,
                amount_limit: req.amount_limit,
                category_ids: req.category_ids,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(budget)))
}

pub async fn get_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let budget = state.budgets.get_budget(user.user_id, id).await?;
    Ok(Json(budget))
}

pub async fn list_budgets(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListBudgetsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let budgets = state
        .budgets
        .list_budgets(
            user.user_id,
            BudgetListFilter {
                status: query.status,
                period_type: query.period_type,
                budget_type: query.budget_type,
                overlaps_from: query.from,
                overlaps_to: query.to,
            },
        )
        .await?;
    Ok(Json(budgets))
}

pub async fn update_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBudgetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let budget = state
        .budgets
        .update_budget(
            user.user_id,
            id,
            UpdateBudget {
                name: req.name,
                amount_limit: req.amount_limit,
                category_ids: req.category_ids,
            },
        )
        .await?;
    Ok(Json(budget))
}

pub async fn close_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let budget = state.budgets.close_budget(user.user_id, id).await?;
    Ok(Json(budget))
}

pub async fn delete_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.budgets.delete_budget(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
