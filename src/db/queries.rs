use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{
    BudgetRow, Category, CategoryTransactionRow, DebtCounterpartyRow, DebtTransactionRow,
    ExchangeRate, MonthlyAnalyticsRow, Subcategory, WalletRow, WalletTransferRow,
};

// --- Currencies ---

pub async fn currency_is_active(pool: &PgPool, code: &str) -> Result<bool> {
    let row: Option<(bool,)> =
        sqlx::query_as("SELECT active FROM currencies WHERE code = $1")
            .bind(code)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(active,)| active).unwrap_or(false))
}

pub async fn list_active_currencies(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT code FROM currencies WHERE active = TRUE ORDER BY code")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(code,)| code).collect())
}

// --- Exchange rates ---

pub async fn latest_rate(
    pool: &PgPool,
    base: &str,
    target: &str,
    not_before: DateTime<Utc>,
) -> Result<Option<ExchangeRate>> {
    sqlx::query_as::<_, ExchangeRate>(
        r#"
        SELECT * FROM exchange_rates
        WHERE base_currency = $1 AND target_currency = $2 AND fetched_at >= $3
        ORDER BY fetched_at DESC
        LIMIT 1
        "#,
    )
    .bind(base)
    .bind(target)
    .bind(not_before)
    .fetch_optional(pool)
    .await
}

/// Inserts a refreshed rate batch atomically so readers never observe a
/// half-written snapshot.
pub async fn insert_rates_batch(pool: &PgPool, rates: &[ExchangeRate]) -> Result<()> {
    let mut transaction = pool.begin().await?;

    for rate in rates {
        sqlx::query(
            r#"
            INSERT INTO exchange_rates (id, base_currency, target_currency, rate, fetched_at, source)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(rate.id)
        .bind(&rate.base_currency)
        .bind(&rate.target_currency)
        .bind(&rate.rate)
        .bind(rate.fetched_at)
        .bind(&rate.source)
        .execute(&mut *transaction)
        .await?;
    }

    transaction.commit().await?;
    Ok(())
}

// --- Wallets ---

pub async fn insert_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet: &WalletRow,
) -> Result<WalletRow> {
    sqlx::query_as::<_, WalletRow>(
        r#"
        INSERT INTO wallets (id, user_id, name, currency_code, balance, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(wallet.id)
    .bind(wallet.user_id)
    .bind(&wallet.name)
    .bind(&wallet.currency_code)
    .bind(&wallet.balance)
    .bind(&wallet.status)
    .bind(wallet.created_at)
    .bind(wallet.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_wallet(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Unscoped by user so the caller can tell "absent" from "owned by someone
/// else" and answer with 404 or 403 accordingly.
pub async fn get_wallet_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **executor)
        .await
}

pub async fn list_wallets(
    pool: &PgPool,
    user_id: Uuid,
    status: Option<&str>,
) -> Result<Vec<WalletRow>> {
    sqlx::query_as::<_, WalletRow>(
        r#"
        SELECT * FROM wallets
        WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at
        "#,
    )
    .bind(user_id)
    .bind(status)
    .fetch_all(pool)
    .await
}

pub async fn update_wallet_balance(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    balance: &str,
) -> Result<()> {
    sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(balance)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

pub async fn update_wallet_meta(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    name: &str,
    status: &str,
) -> Result<WalletRow> {
    sqlx::query_as::<_, WalletRow>(
        r#"
        UPDATE wallets SET name = $2, status = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(status)
    .fetch_one(&mut **executor)
    .await
}

pub async fn wallet_has_activity(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (SELECT 1 FROM category_transactions WHERE wallet_id = $1)
            OR EXISTS (SELECT 1 FROM debt_transactions WHERE wallet_id = $1)
            OR EXISTS (SELECT 1 FROM wallet_transfers WHERE from_wallet_id = $1 OR to_wallet_id = $1)
        "#,
    )
    .bind(wallet_id)
    .fetch_one(&mut **executor)
    .await?;
    Ok(row.0)
}

pub async fn delete_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query("DELETE FROM wallets WHERE id = $1")
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

// --- Category catalogue ---

pub async fn get_category(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<Category>> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_subcategory(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<Subcategory>> {
    sqlx::query_as::<_, Subcategory>(
        "SELECT * FROM subcategories WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_categories_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Category>> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
}

// --- Category transactions ---

#[derive(Debug, Clone, Default)]
pub struct CategoryTransactionFilter {
    pub wallet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub kind: Option<String>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
}

pub async fn insert_category_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &CategoryTransactionRow,
) -> Result<CategoryTransactionRow> {
    sqlx::query_as::<_, CategoryTransactionRow>(
        r#"
        INSERT INTO category_transactions (
            id, user_id, wallet_id, category_id, subcategory_id, kind,
            amount, currency_code, occurred_at, description, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(tx.wallet_id)
    .bind(tx.category_id)
    .bind(tx.subcategory_id)
    .bind(&tx.kind)
    .bind(&tx.amount)
    .bind(&tx.currency_code)
    .bind(tx.occurred_at)
    .bind(&tx.description)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_category_transaction(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<CategoryTransactionRow>> {
    sqlx::query_as::<_, CategoryTransactionRow>(
        "SELECT * FROM category_transactions WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_category_transaction_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<CategoryTransactionRow>> {
    sqlx::query_as::<_, CategoryTransactionRow>(
        "SELECT * FROM category_transactions WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn update_category_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &CategoryTransactionRow,
) -> Result<CategoryTransactionRow> {
    sqlx::query_as::<_, CategoryTransactionRow>(
        r#"
        UPDATE category_transactions SET
            wallet_id = $2, category_id = $3, subcategory_id = $4, kind = $5,
            amount = $6, currency_code = $7, occurred_at = $8, description = $9,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.wallet_id)
    .bind(tx.category_id)
    .bind(tx.subcategory_id)
    .bind(&tx.kind)
    .bind(&tx.amount)
    .bind(&tx.currency_code)
    .bind(tx.occurred_at)
    .bind(&tx.description)
    .fetch_one(&mut **executor)
    .await
}

pub async fn delete_category_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query("DELETE FROM category_transactions WHERE id = $1")
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

pub async fn list_category_transactions(
    pool: &PgPool,
    user_id: Uuid,
    filter: &CategoryTransactionFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<CategoryTransactionRow>> {
    sqlx::query_as::<_, CategoryTransactionRow>(
        r#"
        SELECT * FROM category_transactions
        WHERE user_id = $1
          AND ($2::uuid IS NULL OR wallet_id = $2)
          AND ($3::uuid IS NULL OR category_id = $3)
          AND ($4::uuid IS NULL OR subcategory_id = $4)
          AND ($5::text IS NULL OR kind = $5)
          AND ($6::timestamptz IS NULL OR occurred_at >= $6)
          AND ($7::timestamptz IS NULL OR occurred_at <= $7)
        ORDER BY occurred_at DESC, id DESC
        LIMIT $8 OFFSET $9
        "#,
    )
    .bind(user_id)
    .bind(filter.wallet_id)
    .bind(filter.category_id)
    .bind(filter.subcategory_id)
    .bind(&filter.kind)
    .bind(filter.occurred_from)
    .bind(filter.occurred_to)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_category_transactions(
    pool: &PgPool,
    user_id: Uuid,
    filter: &CategoryTransactionFilter,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM category_transactions
        WHERE user_id = $1
          AND ($2::uuid IS NULL OR wallet_id = $2)
          AND ($3::uuid IS NULL OR category_id = $3)
          AND ($4::uuid IS NULL OR subcategory_id = $4)
          AND ($5::text IS NULL OR kind = $5)
          AND ($6::timestamptz IS NULL OR occurred_at >= $6)
          AND ($7::timestamptz IS NULL OR occurred_at <= $7)
        "#,
    )
    .bind(user_id)
    .bind(filter.wallet_id)
    .bind(filter.category_id)
    .bind(filter.subcategory_id)
    .bind(&filter.kind)
    .bind(filter.occurred_from)
    .bind(filter.occurred_to)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Expense rows whose category falls inside a budget's category set and
/// whose timestamp falls inside its period. Amounts are ciphertext, so
/// summation happens after decode, not in SQL.
pub async fn list_expense_transactions_for_budget(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    category_ids: &[Uuid],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Vec<CategoryTransactionRow>> {
    sqlx::query_as::<_, CategoryTransactionRow>(
        r#"
        SELECT * FROM category_transactions
        WHERE user_id = $1
          AND kind = 'EXPENSE'
          AND category_id = ANY($2)
          AND occurred_at >= $3 AND occurred_at <= $4
        "#,
    )
    .bind(user_id)
    .bind(category_ids)
    .bind(period_start)
    .bind(period_end)
    .fetch_all(&mut **executor)
    .await
}

pub async fn list_transactions_in_period(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Vec<CategoryTransactionRow>> {
    sqlx::query_as::<_, CategoryTransactionRow>(
        r#"
        SELECT * FROM category_transactions
        WHERE user_id = $1 AND occurred_at >= $2 AND occurred_at <= $3
        "#,
    )
    .bind(user_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_all(&mut **executor)
    .await
}

pub async fn distinct_users_with_transactions_in(
    pool: &PgPool,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT user_id FROM category_transactions
        WHERE occurred_at >= $1 AND occurred_at <= $2
        "#,
    )
    .bind(period_start)
    .bind(period_end)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// --- Debt counterparties ---

pub async fn insert_counterparty(
    executor: &mut SqlxTransaction<'_, Postgres>,
    counterparty: &DebtCounterpartyRow,
) -> Result<DebtCounterpartyRow> {
    sqlx::query_as::<_, DebtCounterpartyRow>(
        r#"
        INSERT INTO debt_counterparties (
            id, user_id, name, color, currency_code, owed_to_me, i_owe,
            status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(counterparty.id)
    .bind(counterparty.user_id)
    .bind(&counterparty.name)
    .bind(&counterparty.color)
    .bind(&counterparty.currency_code)
    .bind(&counterparty.owed_to_me)
    .bind(&counterparty.i_owe)
    .bind(&counterparty.status)
    .bind(counterparty.created_at)
    .bind(counterparty.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_counterparty(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<DebtCounterpartyRow>> {
    sqlx::query_as::<_, DebtCounterpartyRow>(
        "SELECT * FROM debt_counterparties WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Unscoped by user for the same 404-versus-403 distinction as wallets.
pub async fn get_counterparty_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<DebtCounterpartyRow>> {
    sqlx::query_as::<_, DebtCounterpartyRow>(
        "SELECT * FROM debt_counterparties WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn list_counterparties(
    pool: &PgPool,
    user_id: Uuid,
    status: Option<&str>,
) -> Result<Vec<DebtCounterpartyRow>> {
    sqlx::query_as::<_, DebtCounterpartyRow>(
        r#"
        SELECT * FROM debt_counterparties
        WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at
        "#,
    )
    .bind(user_id)
    .bind(status)
    .fetch_all(pool)
    .await
}

pub async fn update_counterparty_meta(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    name: &str,
    color: Option<&str>,
    status: &str,
) -> Result<DebtCounterpartyRow> {
    sqlx::query_as::<_, DebtCounterpartyRow>(
        r#"
        UPDATE debt_counterparties SET name = $2, color = $3, status = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(color)
    .bind(status)
    .fetch_one(&mut **executor)
    .await
}

pub async fn update_counterparty_totals(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    owed_to_me: &str,
    i_owe: &str,
) -> Result<DebtCounterpartyRow> {
    sqlx::query_as::<_, DebtCounterpartyRow>(
        r#"
        UPDATE debt_counterparties SET owed_to_me = $2, i_owe = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owed_to_me)
    .bind(i_owe)
    .fetch_one(&mut **executor)
    .await
}

// --- Debt transactions ---

pub async fn insert_debt_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &DebtTransactionRow,
) -> Result<DebtTransactionRow> {
    sqlx::query_as::<_, DebtTransactionRow>(
        r#"
        INSERT INTO debt_transactions (
            id, user_id, counterparty_id, wallet_id, direction, amount,
            currency_code, occurred_at, description, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(tx.counterparty_id)
    .bind(tx.wallet_id)
    .bind(&tx.direction)
    .bind(&tx.amount)
    .bind(&tx.currency_code)
    .bind(tx.occurred_at)
    .bind(&tx.description)
    .bind(tx.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_debt_transaction(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<DebtTransactionRow>> {
    sqlx::query_as::<_, DebtTransactionRow>(
        "SELECT * FROM debt_transactions WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_debt_transaction_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<DebtTransactionRow>> {
    sqlx::query_as::<_, DebtTransactionRow>(
        "SELECT * FROM debt_transactions WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn update_debt_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &DebtTransactionRow,
) -> Result<DebtTransactionRow> {
    sqlx::query_as::<_, DebtTransactionRow>(
        r#"
        UPDATE debt_transactions SET
            counterparty_id = $2, wallet_id = $3, direction = $4, amount = $5,
            currency_code = $6, occurred_at = $7, description = $8
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.counterparty_id)
    .bind(tx.wallet_id)
    .bind(&tx.direction)
    .bind(&tx.amount)
    .bind(&tx.currency_code)
    .bind(tx.occurred_at)
    .bind(&tx.description)
    .fetch_one(&mut **executor)
    .await
}

pub async fn delete_debt_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query("DELETE FROM debt_transactions WHERE id = $1")
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct DebtTransactionFilter {
    pub direction: Option<String>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
}

pub async fn list_debt_transactions_page(
    pool: &PgPool,
    user_id: Uuid,
    counterparty_id: Uuid,
    filter: &DebtTransactionFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<DebtTransactionRow>> {
    sqlx::query_as::<_, DebtTransactionRow>(
        r#"
        SELECT * FROM debt_transactions
        WHERE user_id = $1 AND counterparty_id = $2
          AND ($3::text IS NULL OR direction = $3)
          AND ($4::timestamptz IS NULL OR occurred_at >= $4)
          AND ($5::timestamptz IS NULL OR occurred_at <= $5)
        ORDER BY occurred_at DESC, id DESC
        LIMIT $6 OFFSET $7
        "#,
    )
    .bind(user_id)
    .bind(counterparty_id)
    .bind(&filter.direction)
    .bind(filter.occurred_from)
    .bind(filter.occurred_to)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_debt_transactions(
    pool: &PgPool,
    user_id: Uuid,
    counterparty_id: Uuid,
    filter: &DebtTransactionFilter,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM debt_transactions
        WHERE user_id = $1 AND counterparty_id = $2
          AND ($3::text IS NULL OR direction = $3)
          AND ($4::timestamptz IS NULL OR occurred_at >= $4)
          AND ($5::timestamptz IS NULL OR occurred_at <= $5)
        "#,
    )
    .bind(user_id)
    .bind(counterparty_id)
    .bind(&filter.direction)
    .bind(filter.occurred_from)
    .bind(filter.occurred_to)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Full chronological history for a counterparty, used when accumulators
/// must be rebuilt from scratch.
pub async fn list_debt_transactions_chronological(
    executor: &mut SqlxTransaction<'_, Postgres>,
    counterparty_id: Uuid,
) -> Result<Vec<DebtTransactionRow>> {
    sqlx::query_as::<_, DebtTransactionRow>(
        r#"
        SELECT * FROM debt_transactions
        WHERE counterparty_id = $1
        ORDER BY occurred_at, created_at, id
        "#,
    )
    .bind(counterparty_id)
    .fetch_all(&mut **executor)
    .await
}

pub async fn counterparty_has_transactions(
    executor: &mut SqlxTransaction<'_, Postgres>,
    counterparty_id: Uuid,
) -> Result<bool> {
    let row: (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM debt_transactions WHERE counterparty_id = $1)")
            .bind(counterparty_id)
            .fetch_one(&mut **executor)
            .await?;
    Ok(row.0)
}

pub async fn delete_counterparty(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query("DELETE FROM debt_counterparties WHERE id = $1")
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

// --- Budgets ---

pub async fn insert_budget(
    executor: &mut SqlxTransaction<'_, Postgres>,
    budget: &BudgetRow,
) -> Result<BudgetRow> {
    sqlx::query_as::<_, BudgetRow>(
        r#"
        INSERT INTO budgets (
            id, user_id, name, period_type, period_start, period_end, budget_type,
            currency_code, amount_limit, spent_amount, percent_spent, status,
            closed_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING *
        "#,
    )
    .bind(budget.id)
    .bind(budget.user_id)
    .bind(&budget.name)
    .bind(&budget.period_type)
    .bind(budget.period_start)
    .bind(budget.period_end)
    .bind(&budget.budget_type)
    .bind(&budget.currency_code)
    .bind(&budget.amount_limit)
    .bind(&budget.spent_amount)
    .bind(&budget.percent_spent)
    .bind(&budget.status)
    .bind(budget.closed_at)
    .bind(budget.created_at)
    .bind(budget.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_budget(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<BudgetRow>> {
    sqlx::query_as::<_, BudgetRow>("SELECT * FROM budgets WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_budget_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<BudgetRow>> {
    sqlx::query_as::<_, BudgetRow>(
        "SELECT * FROM budgets WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut **executor)
    .await
}

#[derive(Debug, Clone, Default)]
pub struct BudgetFilter {
    pub status: Option<String>,
    pub period_type: Option<String>,
    pub budget_type: Option<String>,
    pub overlaps_from: Option<DateTime<Utc>>,
    pub overlaps_to: Option<DateTime<Utc>>,
}

pub async fn list_budgets(
    pool: &PgPool,
    user_id: Uuid,
    filter: &BudgetFilter,
) -> Result<Vec<BudgetRow>> {
    sqlx::query_as::<_, BudgetRow>(
        r#"
        SELECT * FROM budgets
        WHERE user_id = $1
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL OR period_type = $3)
          AND ($4::text IS NULL OR budget_type = $4)
          AND ($5::timestamptz IS NULL OR period_end >= $5)
          AND ($6::timestamptz IS NULL OR period_start <= $6)
        ORDER BY period_start DESC, created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(&filter.status)
    .bind(&filter.period_type)
    .bind(&filter.budget_type)
    .bind(filter.overlaps_from)
    .bind(filter.overlaps_to)
    .fetch_all(pool)
    .await
}

pub async fn list_active_budget_ids(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT id FROM budgets WHERE user_id = $1 AND status = 'ACTIVE'")
            .bind(user_id)
            .fetch_all(&mut **executor)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Active budgets whose period covers `at` and whose category set contains
/// the category. Rows come back locked so spending updates serialize with
/// recomputes.
pub async fn active_budgets_for_category(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    category_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Vec<BudgetRow>> {
    sqlx::query_as::<_, BudgetRow>(
        r#"
        SELECT b.* FROM budgets b
        WHERE b.user_id = $1
          AND b.status = 'ACTIVE'
          AND $3 >= b.period_start AND $3 <= b.period_end
          AND EXISTS (SELECT 1 FROM budget_categories bc
                      WHERE bc.budget_id = b.id AND bc.category_id = $2)
        ORDER BY b.id
        FOR UPDATE OF b
        "#,
    )
    .bind(user_id)
    .bind(category_id)
    .bind(at)
    .fetch_all(&mut **executor)
    .await
}

pub async fn list_expired_active_budgets(
    executor: &mut SqlxTransaction<'_, Postgres>,
    now: DateTime<Utc>,
) -> Result<Vec<BudgetRow>> {
    sqlx::query_as::<_, BudgetRow>(
        "SELECT * FROM budgets WHERE status = 'ACTIVE' AND period_end < $1 ORDER BY id FOR UPDATE",
    )
    .bind(now)
    .fetch_all(&mut **executor)
    .await
}

pub async fn list_expired_active_budgets_for_user(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<BudgetRow>> {
    sqlx::query_as::<_, BudgetRow>(
        r#"
        SELECT * FROM budgets
        WHERE user_id = $1 AND status = 'ACTIVE' AND period_end < $2
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_all(&mut **executor)
    .await
}

pub async fn budget_category_ids(
    executor: &mut SqlxTransaction<'_, Postgres>,
    budget_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT category_id FROM budget_categories WHERE budget_id = $1")
            .bind(budget_id)
            .fetch_all(&mut **executor)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn replace_budget_categories(
    executor: &mut SqlxTransaction<'_, Postgres>,
    budget_id: Uuid,
    category_ids: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM budget_categories WHERE budget_id = $1")
        .bind(budget_id)
        .execute(&mut **executor)
        .await?;

    for category_id in category_ids {
        sqlx::query("INSERT INTO budget_categories (budget_id, category_id) VALUES ($1, $2)")
            .bind(budget_id)
            .bind(category_id)
            .execute(&mut **executor)
            .await?;
    }

    Ok(())
}

pub async fn update_budget(
    executor: &mut SqlxTransaction<'_, Postgres>,
    budget: &BudgetRow,
) -> Result<BudgetRow> {
    sqlx::query_as::<_, BudgetRow>(
        r#"
        UPDATE budgets SET
            name = $2, period_type = $3, period_start = $4, period_end = $5,
            budget_type = $6, amount_limit = $7, spent_amount = $8,
            percent_spent = $9, status = $10, closed_at = $11, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(budget.id)
    .bind(&budget.name)
    .bind(&budget.period_type)
    .bind(budget.period_start)
    .bind(budget.period_end)
    .bind(&budget.budget_type)
    .bind(&budget.amount_limit)
    .bind(&budget.spent_amount)
    .bind(&budget.percent_spent)
    .bind(&budget.status)
    .bind(budget.closed_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn update_budget_spending(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    spent_amount: &str,
    percent_spent: &bigdecimal::BigDecimal,
) -> Result<()> {
    sqlx::query(
        "UPDATE budgets SET spent_amount = $2, percent_spent = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(spent_amount)
    .bind(percent_spent)
    .execute(&mut **executor)
    .await?;
    Ok(())
}

pub async fn delete_budget(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query("DELETE FROM budgets WHERE id = $1")
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

// --- Wallet transfers ---

pub async fn insert_transfer(
    executor: &mut SqlxTransaction<'_, Postgres>,
    transfer: &WalletTransferRow,
) -> Result<WalletTransferRow> {
    sqlx::query_as::<_, WalletTransferRow>(
        r#"
        INSERT INTO wallet_transfers (
            id, user_id, from_wallet_id, to_wallet_id, source_currency, target_currency,
            source_amount, target_amount, exchange_rate, executed_at, description, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(transfer.id)
    .bind(transfer.user_id)
    .bind(transfer.from_wallet_id)
    .bind(transfer.to_wallet_id)
    .bind(&transfer.source_currency)
    .bind(&transfer.target_currency)
    .bind(&transfer.source_amount)
    .bind(&transfer.target_amount)
    .bind(&transfer.exchange_rate)
    .bind(transfer.executed_at)
    .bind(&transfer.description)
    .bind(transfer.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_transfer(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<WalletTransferRow>> {
    sqlx::query_as::<_, WalletTransferRow>(
        "SELECT * FROM wallet_transfers WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_transfer_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<WalletTransferRow>> {
    sqlx::query_as::<_, WalletTransferRow>(
        "SELECT * FROM wallet_transfers WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn update_transfer(
    executor: &mut SqlxTransaction<'_, Postgres>,
    transfer: &WalletTransferRow,
) -> Result<WalletTransferRow> {
    sqlx::query_as::<_, WalletTransferRow>(
        r#"
        UPDATE wallet_transfers SET
            source_amount = $2, target_amount = $3, exchange_rate = $4, description = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(transfer.id)
    .bind(&transfer.source_amount)
    .bind(&transfer.target_amount)
    .bind(&transfer.exchange_rate)
    .bind(&transfer.description)
    .fetch_one(&mut **executor)
    .await
}

pub async fn list_transfers_page(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<WalletTransferRow>> {
    sqlx::query_as::<_, WalletTransferRow>(
        r#"
        SELECT * FROM wallet_transfers
        WHERE user_id = $1
        ORDER BY executed_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_transfers(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM wallet_transfers WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

pub async fn delete_transfer(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query("DELETE FROM wallet_transfers WHERE id = $1")
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

// --- Monthly analytics snapshots ---

pub async fn get_snapshot(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    period_start: DateTime<Utc>,
) -> Result<Option<MonthlyAnalyticsRow>> {
    sqlx::query_as::<_, MonthlyAnalyticsRow>(
        "SELECT * FROM monthly_analytics WHERE user_id = $1 AND period_start = $2",
    )
    .bind(user_id)
    .bind(period_start)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn upsert_snapshot(
    executor: &mut SqlxTransaction<'_, Postgres>,
    snapshot: &MonthlyAnalyticsRow,
) -> Result<MonthlyAnalyticsRow> {
    sqlx::query_as::<_, MonthlyAnalyticsRow>(
        r#"
        INSERT INTO monthly_analytics (
            id, user_id, period_start, period_end, currency_code, total_expense,
            total_income, cash_flow_amount, cash_flow_percent, expense_breakdown, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (user_id, period_start) DO UPDATE SET
            period_end = EXCLUDED.period_end,
            currency_code = EXCLUDED.currency_code,
            total_expense = EXCLUDED.total_expense,
            total_income = EXCLUDED.total_income,
            cash_flow_amount = EXCLUDED.cash_flow_amount,
            cash_flow_percent = EXCLUDED.cash_flow_percent,
            expense_breakdown = EXCLUDED.expense_breakdown,
            created_at = EXCLUDED.created_at
        RETURNING *
        "#,
    )
    .bind(snapshot.id)
    .bind(snapshot.user_id)
    .bind(snapshot.period_start)
    .bind(snapshot.period_end)
    .bind(&snapshot.currency_code)
    .bind(&snapshot.total_expense)
    .bind(&snapshot.total_income)
    .bind(&snapshot.cash_flow_amount)
    .bind(&snapshot.cash_flow_percent)
    .bind(&snapshot.expense_breakdown)
    .bind(snapshot.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn delete_snapshot(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    period_start: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("DELETE FROM monthly_analytics WHERE user_id = $1 AND period_start = $2")
        .bind(user_id)
        .bind(period_start)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

/// Snapshots still denominated in some other currency, locked for the
/// batch conversion that follows a main-currency change.
pub async fn list_snapshots_not_in_currency(
    executor: &mut SqlxTransaction<'_, Postgres>,
    currency_code: &str,
) -> Result<Vec<MonthlyAnalyticsRow>> {
    sqlx::query_as::<_, MonthlyAnalyticsRow>(
        "SELECT * FROM monthly_analytics WHERE currency_code <> $1 ORDER BY id FOR UPDATE",
    )
    .bind(currency_code)
    .fetch_all(&mut **executor)
    .await
}
