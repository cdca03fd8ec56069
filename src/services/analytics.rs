use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SettingsHandle;
use crate::crypto::AmountCodec;
use crate::db::models::{
    CategoryBreakdown, MonthlyAnalytics, MonthlyAnalyticsRow, TransactionKind,
};
use crate::db::queries;
use crate::error::AppError;
use crate::money;
use crate::services::rates::ExchangeRateService;

/// First millisecond of the calendar month containing `at`.
pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let first = at.date_naive().with_day(1).expect("day 1 always exists");
    first.and_hms_opt(0, 0, 0).expect("midnight always exists").and_utc()
}

fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::Validation("invalid year or month".to_string()))?;
    let last = first + Months::new(1) - Duration::days(1);
    let start = first.and_hms_opt(0, 0, 0).expect("midnight always exists").and_utc();
    let end = last
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("end of day always exists")
        .and_utc();
    Ok((start, end))
}

#[derive(Debug, Default)]
pub struct AnalyticsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    #[serde(flatten)]
    pub summary: MonthlyAnalytics,
    pub top_categories: Vec<CategoryBreakdown>,
}

const TOP_CATEGORY_COUNT: usize = 3;

fn report(summary: MonthlyAnalytics) -> AnalyticsReport {
    let top_categories = summary
        .expense_breakdown
        .iter()
        .take(TOP_CATEGORY_COUNT)
        .cloned()
        .collect();
    AnalyticsReport {
        summary,
        top_categories,
    }
}

/// A snapshot claiming spending in a category it counted no transactions
/// for has drifted from the underlying rows.
fn snapshot_inconsistent(
    codec: &AmountCodec,
    row: &MonthlyAnalyticsRow,
) -> Result<bool, AppError> {
    for entry in &row.expense_breakdown.0 {
        if entry.transaction_count <= 0 && codec.decode(&entry.amount)? > money::zero_amount() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Spending analytics in the user's main currency. Unfiltered requests for
/// the current month are served from cached snapshots; a snapshot whose
/// currency no longer matches the main currency or whose breakdown
/// contradicts itself is dropped and rebuilt. Filtered requests always
/// compute live and never persist.
pub struct AnalyticsService {
    pool: PgPool,
    codec: AmountCodec,
    rates: Arc<ExchangeRateService>,
    settings: SettingsHandle,
}

impl AnalyticsService {
    pub fn new(
        pool: PgPool,
        codec: AmountCodec,
        rates: Arc<ExchangeRateService>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            pool,
            codec,
            rates,
            settings,
        }
    }

    pub async fn get_analytics(
        &self,
        user_id: Uuid,
        query: AnalyticsQuery,
    ) -> Result<AnalyticsReport, AppError> {
        let category_ids = query.category_ids.filter(|ids| !ids.is_empty());
        let explicit_window = query.from.is_some() || query.to.is_some();

        let (period_start, period_end) = match (query.from, query.to) {
            (Some(from), Some(to)) => {
                if to < from {
                    return Err(AppError::Validation(
                        "from must precede to".to_string(),
                    ));
                }
                (from, to)
            }
            (None, None) => {
                let now = Utc::now();
                month_bounds(now.year(), now.month())?
            }
            _ => {
                return Err(AppError::Validation(
                    "from and to must be provided together".to_string(),
                ))
            }
        };

        let main_currency = self.settings.main_currency();
        let mut transaction = self.pool.begin().await?;

        // Filtered views are partial by definition and never touch the
        // snapshot cache.
        if explicit_window || category_ids.is_some() {
            let row = self
                .compute(
                    &mut transaction,
                    user_id,
                    period_start,
                    period_end,
                    &main_currency,
                    category_ids.as_deref(),
                )
                .await?;
            transaction.commit().await?;
            return Ok(report(row.into_domain(&self.codec)?));
        }

        if let Some(snapshot) = queries::get_snapshot(&mut transaction, user_id, period_start).await?
        {
            if snapshot.currency_code == main_currency
                && !snapshot_inconsistent(&self.codec, &snapshot)?
            {
                transaction.commit().await?;
                return Ok(report(snapshot.into_domain(&self.codec)?));
            }
            warn!(
                user_id = %user_id,
                snapshot_currency = %snapshot.currency_code,
                "inconsistent snapshot dropped, recomputing"
            );
            queries::delete_snapshot(&mut transaction, user_id, period_start).await?;
        }

        let row = self
            .compute(&mut transaction, user_id, period_start, period_end, &main_currency, None)
            .await?;

        // Months with no activity are not worth a cache row.
        let zero = money::zero_amount();
        let has_activity = self.codec.decode(&row.total_income)? != zero
            || self.codec.decode(&row.total_expense)? != zero;
        let stored = if has_activity {
            queries::upsert_snapshot(&mut transaction, &row).await?
        } else {
            row
        };
        transaction.commit().await?;

        Ok(report(stored.into_domain(&self.codec)?))
    }

    /// Drops the cached snapshot for the month containing `occurred_at`.
    /// Runs inside the caller's transaction so the invalidation commits or
    /// rolls back together with the mutation that caused it.
    pub async fn invalidate_month(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        user_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        queries::delete_snapshot(executor, user_id, month_start(occurred_at)).await?;
        Ok(())
    }

    /// Prebuilds last month's snapshot for every user who recorded activity
    /// in it. Users who already have a row are skipped so a rerun never
    /// overwrites a snapshot built (or repaired) since.
    pub async fn build_previous_month_snapshots(&self) -> Result<u64, AppError> {
        let current = month_start(Utc::now());
        let previous_start = month_start(current - Duration::days(1));
        let previous_end = current - Duration::milliseconds(1);
        let main_currency = self.settings.main_currency();

        let users =
            queries::distinct_users_with_transactions_in(&self.pool, previous_start, previous_end)
                .await?;
        let mut built = 0u64;

        for user_id in users {
            let mut transaction = self.pool.begin().await?;
            if queries::get_snapshot(&mut transaction, user_id, previous_start)
                .await?
                .is_some()
            {
                continue;
            }
            let row = self
                .compute(
                    &mut transaction,
                    user_id,
                    previous_start,
                    previous_end,
                    &main_currency,
                    None,
                )
                .await?;
            queries::upsert_snapshot(&mut transaction, &row).await?;
            transaction.commit().await?;
            built += 1;
        }

        info!(built, "previous month snapshots prebuilt");
        Ok(built)
    }

    /// Converts every stored snapshot into the new main currency in one
    /// batch. Amounts are rescaled by the old-to-new rate; percentages are
    /// ratios and survive the conversion unchanged.
    pub async fn recalculate_all_summaries(&self, new_currency: &str) -> Result<u64, AppError> {
        let mut transaction = self.pool.begin().await?;
        let snapshots =
            queries::list_snapshots_not_in_currency(&mut transaction, new_currency).await?;
        let mut converted = 0u64;

        for mut snapshot in snapshots {
            let rate = self
                .rates
                .get_rate(&snapshot.currency_code, new_currency)
                .await?;

            let total_expense =
                money::round_amount(&(&self.codec.decode(&snapshot.total_expense)? * &rate));
            let total_income =
                money::round_amount(&(&self.codec.decode(&snapshot.total_income)? * &rate));
            let cash_flow =
                money::round_amount(&(&self.codec.decode(&snapshot.cash_flow_amount)? * &rate));
            snapshot.total_expense = self.codec.encode(&total_expense)?;
            snapshot.total_income = self.codec.encode(&total_income)?;
            snapshot.cash_flow_amount = self.codec.encode(&cash_flow)?;
            for entry in &mut snapshot.expense_breakdown.0 {
                let amount = money::round_amount(&(&self.codec.decode(&entry.amount)? * &rate));
                entry.amount = self.codec.encode(&amount)?;
            }
            snapshot.currency_code = new_currency.to_string();

            queries::upsert_snapshot(&mut transaction, &snapshot).await?;
            converted += 1;
        }

        transaction.commit().await?;
        info!(converted, currency = new_currency, "snapshots converted to new main currency");
        Ok(converted)
    }

    async fn compute(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        main_currency: &str,
        category_filter: Option<&[Uuid]>,
    ) -> Result<MonthlyAnalyticsRow, AppError> {
        let rows =
            queries::list_transactions_in_period(executor, user_id, period_start, period_end)
                .await?;

        let mut total_income = money::zero_amount();
        let mut total_expense = money::zero_amount();
        let mut per_category: HashMap<Uuid, (BigDecimal, i64)> = HashMap::new();

        for row in rows {
            if let Some(filter) = category_filter {
                if !filter.contains(&row.category_id) {
                    continue;
                }
            }
            let amount = self.codec.decode(&row.amount)?;
            let rate = self.rates.get_rate(&row.currency_code, main_currency).await?;
            let converted = money::round_amount(&(&amount * &rate));

            match TransactionKind::parse(&row.kind)? {
                TransactionKind::Income => total_income += converted,
                TransactionKind::Expense => {
                    total_expense += &converted;
                    let entry = per_category
                        .entry(row.category_id)
                        .or_insert_with(|| (money::zero_amount(), 0));
                    entry.0 += converted;
                    entry.1 += 1;
                }
            }
        }

        let total_income = money::round_amount(&total_income);
        let total_expense = money::round_amount(&total_expense);

        let category_ids: Vec<Uuid> = per_category.keys().copied().collect();
        let categories = queries::list_categories_by_ids(&self.pool, &category_ids).await?;
        let names: HashMap<Uuid, _> = categories.into_iter().map(|c| (c.id, c)).collect();

        let mut breakdown: Vec<CategoryBreakdown> = per_category
            .into_iter()
            .map(|(category_id, (amount, transaction_count))| {
                let category = names.get(&category_id);
                let amount = money::round_amount(&amount);
                CategoryBreakdown {
                    category_id,
                    category_name: category
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                    category_color: category.and_then(|c| c.color.clone()),
                    category_icon: category.and_then(|c| c.icon.clone()),
                    percent: money::percent_share(&amount, &total_expense),
                    amount,
                    transaction_count,
                }
            })
            .collect();
        breakdown.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.category_name.cmp(&b.category_name)));
        let records = breakdown
            .into_iter()
            .map(|entry| entry.into_record(&self.codec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MonthlyAnalyticsRow {
            id: Uuid::new_v4(),
            user_id,
            period_start,
            period_end,
            currency_code: main_currency.to_string(),
            total_expense: self.codec.encode(&total_expense)?,
            total_income: self.codec.encode(&total_income)?,
            cash_flow_amount: self.codec.encode(&money::round_amount(&(&total_income - &total_expense)))?,
            cash_flow_percent: money::cash_flow_percent(&total_income, &total_expense),
            expense_breakdown: Json(records),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_start_truncates_to_first_millisecond() {
        let at = Utc.with_ymd_and_hms(2026, 8, 19, 14, 30, 45).unwrap();
        assert_eq!(month_start(at), Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_bounds_cover_the_calendar_month() {
        let (start, end) = month_bounds(2026, 2).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        assert!(month_bounds(2026, 13).is_err());
        assert!(month_bounds(2026, 0).is_err());
    }

    use crate::db::models::CategoryBreakdownRecord;

    fn codec() -> AmountCodec {
        AmountCodec::from_secret("analytics-test-secret")
    }

    fn breakdown_entry(codec: &AmountCodec, amount: &str, transaction_count: i64) -> CategoryBreakdownRecord {
        use std::str::FromStr;
        CategoryBreakdownRecord {
            category_id: Uuid::new_v4(),
            category_name: "food".to_string(),
            category_color: None,
            category_icon: None,
            amount: codec.encode(&BigDecimal::from_str(amount).unwrap()).unwrap(),
            percent: money::zero_amount(),
            transaction_count,
        }
    }

    fn snapshot_with(codec: &AmountCodec, breakdown: Vec<CategoryBreakdownRecord>) -> MonthlyAnalyticsRow {
        MonthlyAnalyticsRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            period_start: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            period_end: Utc.with_ymd_and_hms(2026, 7, 31, 23, 59, 59).unwrap(),
            currency_code: "USD".to_string(),
            total_expense: codec.encode(&money::zero_amount()).unwrap(),
            total_income: codec.encode(&money::zero_amount()).unwrap(),
            cash_flow_amount: codec.encode(&money::zero_amount()).unwrap(),
            cash_flow_percent: money::zero_amount(),
            expense_breakdown: Json(breakdown),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn spending_without_transactions_marks_a_snapshot_inconsistent() {
        let codec = codec();
        let drifted = snapshot_with(&codec, vec![breakdown_entry(&codec, "42.00", 0)]);
        assert!(snapshot_inconsistent(&codec, &drifted).unwrap());

        let healthy = snapshot_with(
            &codec,
            vec![
                breakdown_entry(&codec, "42.00", 3),
                breakdown_entry(&codec, "0.00", 0),
            ],
        );
        assert!(!snapshot_inconsistent(&codec, &healthy).unwrap());
        assert!(!snapshot_inconsistent(&codec, &snapshot_with(&codec, vec![])).unwrap());
    }

    #[test]
    fn report_lists_at_most_three_top_categories() {
        let codec = codec();
        let breakdown = vec![
            breakdown_entry(&codec, "40.00", 2),
            breakdown_entry(&codec, "30.00", 1),
            breakdown_entry(&codec, "20.00", 1),
            breakdown_entry(&codec, "10.00", 1),
        ];
        let summary = snapshot_with(&codec, breakdown).into_domain(&codec).unwrap();
        let report = report(summary);
        assert_eq!(report.top_categories.len(), 3);
        assert_eq!(report.top_categories[0].amount, report.summary.expense_breakdown[0].amount);
    }
}
