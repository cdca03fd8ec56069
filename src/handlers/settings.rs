use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AppSettings;
use crate::db::queries;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::validation;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub main_currency: String,
    pub supported_currencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeMainCurrencyRequest {
    pub currency_code: String,
}

pub async fn get_settings(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let supported_currencies = queries::list_active_currencies(&state.db).await?;
    Ok(Json(SettingsResponse {
        main_currency: state.settings.main_currency(),
        supported_currencies,
    }))
}

/// Switches the main currency. Every aggregate denominated in the old
/// currency is stale afterwards, so the change runs the recalculation batch
/// before the response returns: stored analytics snapshots are converted
/// into the new currency and the caller's active budget spending is
/// recomputed.
pub async fn change_main_currency(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChangeMainCurrencyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let currency_code = validation::normalize_currency_code("currency_code", &req.currency_code)?;
    if !queries::currency_is_active(&state.db, &currency_code).await? {
        return Err(AppError::Validation(format!(
            "currency {} is not supported",
            currency_code
        )));
    }

    state.settings.store(AppSettings {
        main_currency: currency_code.clone(),
    });

    state.analytics.recalculate_all_summaries(&currency_code).await?;
    state.budgets.recompute_all_for_user(user.user_id).await?;

    info!(main_currency = %currency_code, "main currency changed, aggregates recalculated");

    let supported_currencies = queries::list_active_currencies(&state.db).await?;
    Ok(Json(SettingsResponse {
        main_currency: currency_code,
        supported_currencies,
    }))
}
