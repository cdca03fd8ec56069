use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::info;
use uuid::Uuid;

use crate::crypto::AmountCodec;
use crate::db::models::{Budget, BudgetPeriodType, BudgetRow, BudgetStatus, BudgetType};
use crate::db::queries;
use crate::error::AppError;
use crate::money;
use crate::services::rates::ExchangeRateService;
use crate::validation;

#[derive(Debug)]
pub struct CreateBudget {
    pub name: String,
    pub period_type: BudgetPeriodType,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub budget_type: BudgetType,
    pub currency_code: String,
    pub amount_limit: BigDecimal,
    pub category_ids: Vec<Uuid>,
}

#[derive(Debug)]
pub struct UpdateBudget {
    pub name: Option<String>,
    pub amount_limit: Option<BigDecimal>,
    pub category_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Default)]
pub struct BudgetListFilter {
    pub status: Option<BudgetStatus>,
    pub period_type: Option<BudgetPeriodType>,
    pub budget_type: Option<BudgetType>,
    pub overlaps_from: Option<DateTime<Utc>>,
    pub overlaps_to: Option<DateTime<Utc>>,
}

/// Budget plus the non-empty set of categories it watches.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetView {
    #[serde(flatten)]
    pub budget: Budget,
    pub category_ids: Vec<Uuid>,
}

/// Resolves the calendar window a budget covers, anchored at `reference`.
/// Weeks run Monday through Sunday; month and year windows end on the last
/// millisecond of their final day.
pub fn resolve_period(
    period_type: BudgetPeriodType,
    reference: DateTime<Utc>,
    custom_start: Option<DateTime<Utc>>,
    custom_end: Option<DateTime<Utc>>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let date = reference.date_naive();
    match period_type {
        BudgetPeriodType::Week => {
            let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
            Ok((start_of_day(monday), end_of_day(monday + Duration::days(6))))
        }
        BudgetPeriodType::Month => {
            let first = date.with_day(1).expect("day 1 always exists");
            let last = first + Months::new(1) - Duration::days(1);
            Ok((start_of_day(first), end_of_day(last)))
        }
        BudgetPeriodType::Year => {
            let first = NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("jan 1 always exists");
            let last = NaiveDate::from_ymd_opt(date.year(), 12, 31).expect("dec 31 always exists");
            Ok((start_of_day(first), end_of_day(last)))
        }
        BudgetPeriodType::Custom => {
            let (start, end) = match (custom_start, custom_end) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    return Err(AppError::Validation(
                        "custom budgets require period_start and period_end".to_string(),
                    ))
                }
            };
            if start >= end {
                return Err(AppError::Validation(
                    "period_start must precede period_end".to_string(),
                ));
            }
            Ok((start, end))
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("midnight always exists").and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .expect("end of day always exists")
        .and_utc()
}

/// Window the successor of an expired recurring budget covers: the standard
/// calendar window containing the instant after the old period, or for
/// custom periods the same span shifted forward.
fn successor_period(
    expired: &BudgetRow,
    period_type: BudgetPeriodType,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    match period_type {
        BudgetPeriodType::Custom => {
            let start = expired.period_end + Duration::seconds(1);
            let span = expired.period_end - expired.period_start;
            Ok((start, start + span))
        }
        other => resolve_period(other, expired.period_end + Duration::milliseconds(1), None, None),
    }
}

pub struct BudgetService {
    pool: PgPool,
    codec: AmountCodec,
    rates: Arc<ExchangeRateService>,
}

impl BudgetService {
    pub fn new(pool: PgPool, codec: AmountCodec, rates: Arc<ExchangeRateService>) -> Self {
        Self { pool, codec, rates }
    }

    pub async fn create_budget(
        &self,
        user_id: Uuid,
        req: CreateBudget,
    ) -> Result<BudgetView, AppError> {
        let name = validation::sanitize_string(&req.name);
        validation::validate_required("name", &name)?;
        validation::validate_max_len("name", &name, validation::NAME_MAX_LEN)?;
        validation::validate_positive_amount("amount_limit", &req.amount_limit)?;
        let currency_code = validation::normalize_currency_code("currency_code", &req.currency_code)?;

        if !queries::currency_is_active(&self.pool, &currency_code).await? {
            return Err(AppError::Validation(format!(
                "currency {} is not supported",
                currency_code
            )));
        }
        if req.category_ids.is_empty() {
            return Err(AppError::Validation(
                "budget must watch at least one category".to_string(),
            ));
        }
        for category_id in &req.category_ids {
            queries::get_category(&self.pool, *category_id, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound("category not found".to_string()))?;
        }

        let (period_start, period_end) =
            resolve_period(req.period_type, Utc::now(), req.period_start, req.period_end)?;

        let now = Utc::now();
        let row = BudgetRow {
            id: Uuid::new_v4(),
            user_id,
            name,
            period_type: req.period_type.as_str().to_string(),
            period_start,
            period_end,
            budget_type: req.budget_type.as_str().to_string(),
            currency_code,
            amount_limit: self.codec.encode(&money::round_amount(&req.amount_limit))?,
            spent_amount: self.codec.encode(&money::zero_amount())?,
            percent_spent: money::zero_amount(),
            status: BudgetStatus::Active.as_str().to_string(),
            closed_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut transaction = self.pool.begin().await?;
        let inserted = queries::insert_budget(&mut transaction, &row).await?;
        queries::replace_budget_categories(&mut transaction, inserted.id, &req.category_ids)
            .await?;
        let recomputed = self.recompute_locked(&mut transaction, inserted).await?;
        let category_ids = queries::budget_category_ids(&mut transaction, recomputed.id).await?;
        transaction.commit().await?;

        info!(budget_id = %recomputed.id, "budget created");
        Ok(BudgetView {
            budget: recomputed.into_domain(&self.codec)?,
            category_ids,
        })
    }

    pub async fn get_budget(&self, user_id: Uuid, id: Uuid) -> Result<BudgetView, AppError> {
        let row = queries::get_budget(&self.pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("budget not found".to_string()))?;

        let mut transaction = self.pool.begin().await?;
        let category_ids = queries::budget_category_ids(&mut transaction, row.id).await?;
        transaction.commit().await?;

        Ok(BudgetView {
            budget: row.into_domain(&self.codec)?,
            category_ids,
        })
    }

    /// Listing sweeps the user's expired budgets first so the response
    /// never shows an ACTIVE budget whose period has already ended.
    pub async fn list_budgets(
        &self,
        user_id: Uuid,
        filter: BudgetListFilter,
    ) -> Result<Vec<BudgetView>, AppError> {
        self.sweep_expired_for_user(user_id).await?;

        let query_filter = queries::BudgetFilter {
            status: filter.status.map(|s| s.as_str().to_string()),
            period_type: filter.period_type.map(|p| p.as_str().to_string()),
            budget_type: filter.budget_type.map(|b| b.as_str().to_string()),
            overlaps_from: filter.overlaps_from,
            overlaps_to: filter.overlaps_to,
        };
        let rows = queries::list_budgets(&self.pool, user_id, &query_filter).await?;

        let mut transaction = self.pool.begin().await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let category_ids = queries::budget_category_ids(&mut transaction, row.id).await?;
            views.push(BudgetView {
                budget: row.into_domain(&self.codec)?,
                category_ids,
            });
        }
        transaction.commit().await?;

        Ok(views)
    }

    /// Edits always end in a full recompute; incremental arithmetic cannot
    /// survive a category-set or limit change.
    pub async fn update_budget(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateBudget,
    ) -> Result<BudgetView, AppError> {
        let mut transaction = self.pool.begin().await?;
        let mut row = queries::get_budget_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("budget not found".to_string()))?;

        if row.status == BudgetStatus::Closed.as_str() {
            return Err(AppError::Validation("budget is closed".to_string()));
        }

        if let Some(name) = req.name {
            let name = validation::sanitize_string(&name);
            validation::validate_required("name", &name)?;
            validation::validate_max_len("name", &name, validation::NAME_MAX_LEN)?;
            row.name = name;
        }
        if let Some(limit) = req.amount_limit {
            validation::validate_positive_amount("amount_limit", &limit)?;
            row.amount_limit = self.codec.encode(&money::round_amount(&limit))?;
        }
        if let Some(category_ids) = req.category_ids {
            if category_ids.is_empty() {
                return Err(AppError::Validation(
                    "budget must watch at least one category".to_string(),
                ));
            }
            for category_id in &category_ids {
                queries::get_category(&self.pool, *category_id, user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("category not found".to_string()))?;
            }
            queries::replace_budget_categories(&mut transaction, row.id, &category_ids).await?;
        }

        let updated = queries::update_budget(&mut transaction, &row).await?;
        let recomputed = self.recompute_locked(&mut transaction, updated).await?;
        let category_ids = queries::budget_category_ids(&mut transaction, recomputed.id).await?;
        transaction.commit().await?;

        Ok(BudgetView {
            budget: recomputed.into_domain(&self.codec)?,
            category_ids,
        })
    }

    pub async fn close_budget(&self, user_id: Uuid, id: Uuid) -> Result<BudgetView, AppError> {
        let mut transaction = self.pool.begin().await?;
        let mut row = queries::get_budget_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("budget not found".to_string()))?;

        if row.status == BudgetStatus::Closed.as_str() {
            return Err(AppError::Validation("budget is already closed".to_string()));
        }

        row.status = BudgetStatus::Closed.as_str().to_string();
        row.closed_at = Some(Utc::now());
        let updated = queries::update_budget(&mut transaction, &row).await?;
        let category_ids = queries::budget_category_ids(&mut transaction, updated.id).await?;
        transaction.commit().await?;

        info!(budget_id = %id, "budget closed");
        Ok(BudgetView {
            budget: updated.into_domain(&self.codec)?,
            category_ids,
        })
    }

    pub async fn delete_budget(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut transaction = self.pool.begin().await?;
        queries::get_budget_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("budget not found".to_string()))?;
        queries::delete_budget(&mut transaction, id).await?;
        transaction.commit().await?;
        Ok(())
    }

    /// Incremental hook for the transaction engine: adds `delta` (already
    /// signed, in `currency`) to every locked active budget covering the
    /// category at `occurred_at`. Spent amounts clamp at zero so reverts
    /// cannot drive them negative.
    pub async fn apply_expense_delta(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        user_id: Uuid,
        category_id: Uuid,
        occurred_at: DateTime<Utc>,
        delta: &BigDecimal,
        currency: &str,
    ) -> Result<(), AppError> {
        let budgets =
            queries::active_budgets_for_category(executor, user_id, category_id, occurred_at)
                .await?;

        for budget in budgets {
            let rate = self.rates.get_rate(currency, &budget.currency_code).await?;
            let converted = money::round_amount(&(delta * &rate));
            let current = self.codec.decode(&budget.spent_amount)?;
            let limit = self.codec.decode(&budget.amount_limit)?;
            let mut spent = money::round_amount(&(&current + &converted));
            if spent < money::zero_amount() {
                spent = money::zero_amount();
            }
            let percent = money::percent_of_limit(&spent, &limit);
            queries::update_budget_spending(
                executor,
                budget.id,
                &self.codec.encode(&spent)?,
                &percent,
            )
            .await?;
        }

        Ok(())
    }

    /// Rebuilds spent/percent for one locked budget from its matching
    /// expense rows.
    pub async fn recompute_locked(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        budget: BudgetRow,
    ) -> Result<BudgetRow, AppError> {
        let category_ids = queries::budget_category_ids(executor, budget.id).await?;
        let rows = queries::list_expense_transactions_for_budget(
            executor,
            budget.user_id,
            &category_ids,
            budget.period_start,
            budget.period_end,
        )
        .await?;

        let mut spent = money::zero_amount();
        for row in rows {
            let amount = self.codec.decode(&row.amount)?;
            let rate = self
                .rates
                .get_rate(&row.currency_code, &budget.currency_code)
                .await?;
            spent += money::round_amount(&(&amount * &rate));
        }
        let spent = money::round_amount(&spent);
        let limit = self.codec.decode(&budget.amount_limit)?;
        let percent = money::percent_of_limit(&spent, &limit);

        let stored = self.codec.encode(&spent)?;
        queries::update_budget_spending(executor, budget.id, &stored, &percent).await?;
        let mut updated = budget;
        updated.spent_amount = stored;
        updated.percent_spent = percent;
        Ok(updated)
    }

    /// Full recompute of every active budget the user has. Used after bulk
    /// changes such as a main-currency switch.
    pub async fn recompute_all_for_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut transaction = self.pool.begin().await?;
        let ids = queries::list_active_budget_ids(&mut transaction, user_id).await?;
        for id in ids {
            if let Some(row) =
                queries::get_budget_for_update(&mut transaction, id, user_id).await?
            {
                self.recompute_locked(&mut transaction, row).await?;
            }
        }
        transaction.commit().await?;
        Ok(())
    }

    /// Closes budgets whose period has ended. Recurring budgets spawn a
    /// successor covering the next window, with spending recomputed from
    /// whatever rows already fall inside it. Safe to run repeatedly.
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut transaction = self.pool.begin().await?;
        let expired = queries::list_expired_active_budgets(&mut transaction, now).await?;
        let closed = self.close_and_roll(&mut transaction, expired, now).await?;
        transaction.commit().await?;

        if closed > 0 {
            info!(closed, "expired budgets swept");
        }
        Ok(closed)
    }

    /// Same sweep scoped to one user, run before listing their budgets.
    pub async fn sweep_expired_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut transaction = self.pool.begin().await?;
        let expired =
            queries::list_expired_active_budgets_for_user(&mut transaction, user_id, now).await?;
        let closed = self.close_and_roll(&mut transaction, expired, now).await?;
        transaction.commit().await?;
        Ok(closed)
    }

    async fn close_and_roll(
        &self,
        transaction: &mut SqlxTransaction<'_, Postgres>,
        expired: Vec<BudgetRow>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut closed = 0u64;

        for mut budget in expired {
            budget.status = BudgetStatus::Closed.as_str().to_string();
            budget.closed_at = Some(now);
            let budget = queries::update_budget(transaction, &budget).await?;
            closed += 1;

            if budget.budget_type == BudgetType::Recurring.as_str() {
                let period_type = BudgetPeriodType::parse(&budget.period_type)?;
                let (period_start, period_end) = successor_period(&budget, period_type)?;
                let category_ids = queries::budget_category_ids(transaction, budget.id).await?;

                let successor = BudgetRow {
                    id: Uuid::new_v4(),
                    user_id: budget.user_id,
                    name: budget.name.clone(),
                    period_type: budget.period_type.clone(),
                    period_start,
                    period_end,
                    budget_type: budget.budget_type.clone(),
                    currency_code: budget.currency_code.clone(),
                    amount_limit: budget.amount_limit.clone(),
                    spent_amount: self.codec.encode(&money::zero_amount())?,
                    percent_spent: money::zero_amount(),
                    status: BudgetStatus::Active.as_str().to_string(),
                    closed_at: None,
                    created_at: now,
                    updated_at: now,
                };
                let inserted = queries::insert_budget(transaction, &successor).await?;
                queries::replace_budget_categories(transaction, inserted.id, &category_ids)
                    .await?;
                self.recompute_locked(transaction, inserted).await?;
            }
        }

        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn week_runs_monday_through_sunday() {
        // 2026-08-26 is a Wednesday.
        let (start, end) =
            resolve_period(BudgetPeriodType::Week, utc(2026, 8, 26, 15, 30, 0), None, None)
                .unwrap();
        assert_eq!(start, utc(2026, 8, 24, 0, 0, 0));
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2026, 8, 30).unwrap());
        assert_eq!(end.timestamp_millis() % 1000, 999);
    }

    #[test]
    fn month_covers_whole_calendar_month() {
        let (start, end) =
            resolve_period(BudgetPeriodType::Month, utc(2026, 2, 10, 12, 0, 0), None, None)
                .unwrap();
        assert_eq!(start, utc(2026, 2, 1, 0, 0, 0));
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn year_covers_whole_calendar_year() {
        let (start, end) =
            resolve_period(BudgetPeriodType::Year, utc(2026, 6, 15, 0, 0, 0), None, None)
                .unwrap();
        assert_eq!(start, utc(2026, 1, 1, 0, 0, 0));
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
    }

    #[test]
    fn custom_requires_ordered_bounds() {
        let start = utc(2026, 3, 1, 0, 0, 0);
        let end = utc(2026, 3, 15, 0, 0, 0);
        assert!(resolve_period(BudgetPeriodType::Custom, Utc::now(), Some(start), Some(end)).is_ok());
        assert!(resolve_period(BudgetPeriodType::Custom, Utc::now(), Some(end), Some(start)).is_err());
        assert!(resolve_period(BudgetPeriodType::Custom, Utc::now(), Some(start), None).is_err());
    }

    #[test]
    fn successor_follows_the_expired_window() {
        let expired = BudgetRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "groceries".to_string(),
            period_type: "MONTH".to_string(),
            period_start: utc(2026, 7, 1, 0, 0, 0),
            period_end: utc(2026, 7, 31, 23, 59, 59),
            budget_type: "RECURRING".to_string(),
            currency_code: "USD".to_string(),
            amount_limit: "500.00".to_string(),
            spent_amount: "0.00".to_string(),
            percent_spent: money::zero_amount(),
            status: "ACTIVE".to_string(),
            closed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let (start, end) = successor_period(&expired, BudgetPeriodType::Month).unwrap();
        assert_eq!(start, utc(2026, 8, 1, 0, 0, 0));
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2026, 8, 31).unwrap());

        let (cstart, cend) = successor_period(&expired, BudgetPeriodType::Custom).unwrap();
        assert_eq!(cstart, expired.period_end + Duration::seconds(1));
        assert_eq!(cend - cstart, expired.period_end - expired.period_start);
    }
}
