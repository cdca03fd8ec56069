use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::services::analytics::AnalyticsQuery;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GetAnalyticsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Comma-separated category ids.
    pub category_ids: Option<String>,
}

fn parse_category_ids(raw: &str) -> Result<Vec<Uuid>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|_| AppError::Validation("category_ids must be a comma-separated list of uuids".to_string()))
        })
        .collect()
}

pub async fn get_analytics(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<GetAnalyticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let category_ids = query
        .category_ids
        .as_deref()
        .map(parse_category_ids)
        .transpose()?;

    let report = state
        .analytics
        .get_analytics(
            user.user_id,
            AnalyticsQuery {
                from: query.from,
                to: query.to,
                category_ids,
            },
        )
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_ids_parse_from_comma_list() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let parsed = parse_category_ids(&format!("{}, {}", a, b)).unwrap();
        assert_eq!(parsed, vec![a, b]);
        assert!(parse_category_ids("not-a-uuid").is_err());
        assert!(parse_category_ids("").unwrap().is_empty());
    }
}
