use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::info;
use uuid::Uuid;

use crate::crypto::AmountCodec;
use crate::db::models::{CategoryTransaction, CategoryTransactionRow, TransactionKind};
use crate::db::queries::{self, CategoryTransactionFilter};
use crate::error::AppError;
use crate::money;
use crate::services::analytics::AnalyticsService;
use crate::services::budgets::BudgetService;
use crate::services::wallets::WalletService;
use crate::utils::page::{PageParams, PageResponse};
use crate::validation;

#[derive(Debug)]
pub struct CreateCategoryTransaction {
    pub wallet_id: Uuid,
    pub category_id: Uuid,
    pub subcategory_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct UpdateCategoryTransaction {
    pub wallet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Option<Uuid>>,
    pub kind: Option<TransactionKind>,
    pub amount: Option<BigDecimal>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct ListTransactions {
    pub wallet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
    pub page: PageParams,
}

fn signed(kind: TransactionKind, amount: &BigDecimal) -> BigDecimal {
    match kind {
        TransactionKind::Expense => -amount,
        TransactionKind::Income => amount.clone(),
    }
}

/// Every mutation runs as one database transaction covering the wallet
/// balance, the transaction row, affected budgets and the analytics
/// snapshot cache, so a crash leaves all four consistent.
pub struct CategoryTransactionService {
    pool: PgPool,
    codec: AmountCodec,
    wallets: Arc<WalletService>,
    budgets: Arc<BudgetService>,
    analytics: Arc<AnalyticsService>,
}

impl CategoryTransactionService {
    pub fn new(
        pool: PgPool,
        codec: AmountCodec,
        wallets: Arc<WalletService>,
        budgets: Arc<BudgetService>,
        analytics: Arc<AnalyticsService>,
    ) -> Self {
        Self {
            pool,
            codec,
            wallets,
            budgets,
            analytics,
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        req: CreateCategoryTransaction,
    ) -> Result<CategoryTransaction, AppError> {
        validation::validate_positive_amount("amount", &req.amount)?;
        let description = req.description.map(|d| validation::sanitize_string(&d));
        if let Some(description) = &description {
            validation::validate_max_len(
                "description",
                description,
                validation::DESCRIPTION_MAX_LEN,
            )?;
        }
        self.check_category(user_id, req.category_id, req.subcategory_id)
            .await?;

        let amount = money::round_amount(&req.amount);

        let mut transaction = self.pool.begin().await?;
        let wallet = self
            .wallets
            .apply_delta_active(
                &mut transaction,
                user_id,
                req.wallet_id,
                &signed(req.kind, &amount),
            )
            .await?;

        let now = Utc::now();
        let row = CategoryTransactionRow {
            id: Uuid::new_v4(),
            user_id,
            wallet_id: req.wallet_id,
            category_id: req.category_id,
            subcategory_id: req.subcategory_id,
            kind: req.kind.as_str().to_string(),
            amount: self.codec.encode(&amount)?,
            currency_code: wallet.currency_code.clone(),
            occurred_at: req.occurred_at,
            description,
            created_at: now,
            updated_at: now,
        };
        let inserted = queries::insert_category_transaction(&mut transaction, &row).await?;

        if req.kind == TransactionKind::Expense {
            self.budgets
                .apply_expense_delta(
                    &mut transaction,
                    user_id,
                    req.category_id,
                    req.occurred_at,
                    &amount,
                    &wallet.currency_code,
                )
                .await?;
        }
        self.analytics
            .invalidate_month(&mut transaction, user_id, req.occurred_at)
            .await?;

        transaction.commit().await?;
        info!(transaction_id = %inserted.id, "category transaction recorded");
        inserted.into_domain(&self.codec)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<CategoryTransaction, AppError> {
        queries::get_category_transaction(&self.pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("transaction not found".to_string()))?
            .into_domain(&self.codec)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        req: ListTransactions,
    ) -> Result<PageResponse<CategoryTransaction>, AppError> {
        let filter = CategoryTransactionFilter {
            wallet_id: req.wallet_id,
            category_id: req.category_id,
            subcategory_id: req.subcategory_id,
            kind: req.kind.map(|k| k.as_str().to_string()),
            occurred_from: req.occurred_from,
            occurred_to: req.occurred_to,
        };

        let rows = queries::list_category_transactions(
            &self.pool,
            user_id,
            &filter,
            req.page.limit(),
            req.page.offset(),
        )
        .await?;
        let total = queries::count_category_transactions(&self.pool, user_id, &filter).await?;

        let content = rows
            .into_iter()
            .map(|row| row.into_domain(&self.codec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(content, &req.page, total))
    }

    /// Edits revert the old row's effects and apply the new ones inside a
    /// single database transaction. Both the old and new month's snapshots
    /// are invalidated since either may have changed.
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateCategoryTransaction,
    ) -> Result<CategoryTransaction, AppError> {
        let mut transaction = self.pool.begin().await?;
        let old = queries::get_category_transaction_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("transaction not found".to_string()))?;

        let old_kind = TransactionKind::parse(&old.kind)?;
        let old_amount = self.codec.decode(&old.amount)?;

        let new_kind = req.kind.unwrap_or(old_kind);
        let new_amount = match req.amount {
            Some(amount) => {
                validation::validate_positive_amount("amount", &amount)?;
                money::round_amount(&amount)
            }
            None => old_amount.clone(),
        };
        let new_wallet_id = req.wallet_id.unwrap_or(old.wallet_id);
        let new_category_id = req.category_id.unwrap_or(old.category_id);
        let new_subcategory_id = req.subcategory_id.unwrap_or(old.subcategory_id);
        let new_occurred_at = req.occurred_at.unwrap_or(old.occurred_at);
        let new_description = match req.description {
            Some(description) => description.map(|d| validation::sanitize_string(&d)),
            None => old.description.clone(),
        };
        if let Some(description) = &new_description {
            validation::validate_max_len(
                "description",
                description,
                validation::DESCRIPTION_MAX_LEN,
            )?;
        }
        self.check_category(user_id, new_category_id, new_subcategory_id)
            .await?;

        self.revert_effects(&mut transaction, &old, old_kind, &old_amount)
            .await?;

        let wallet = self
            .wallets
            .apply_delta(
                &mut transaction,
                user_id,
                new_wallet_id,
                &signed(new_kind, &new_amount),
            )
            .await?;

        let updated_row = CategoryTransactionRow {
            id: old.id,
            user_id,
            wallet_id: new_wallet_id,
            category_id: new_category_id,
            subcategory_id: new_subcategory_id,
            kind: new_kind.as_str().to_string(),
            amount: self.codec.encode(&new_amount)?,
            currency_code: wallet.currency_code.clone(),
            occurred_at: new_occurred_at,
            description: new_description,
            created_at: old.created_at,
            updated_at: Utc::now(),
        };
        let saved = queries::update_category_transaction(&mut transaction, &updated_row).await?;

        if new_kind == TransactionKind::Expense {
            self.budgets
                .apply_expense_delta(
                    &mut transaction,
                    user_id,
                    new_category_id,
                    new_occurred_at,
                    &new_amount,
                    &wallet.currency_code,
                )
                .await?;
        }

        self.analytics
            .invalidate_month(&mut transaction, user_id, old.occurred_at)
            .await?;
        self.analytics
            .invalidate_month(&mut transaction, user_id, new_occurred_at)
            .await?;

        transaction.commit().await?;
        saved.into_domain(&self.codec)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut transaction = self.pool.begin().await?;
        let old = queries::get_category_transaction_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("transaction not found".to_string()))?;

        let kind = TransactionKind::parse(&old.kind)?;
        let amount = self.codec.decode(&old.amount)?;

        self.revert_effects(&mut transaction, &old, kind, &amount)
            .await?;
        queries::delete_category_transaction(&mut transaction, id).await?;
        self.analytics
            .invalidate_month(&mut transaction, user_id, old.occurred_at)
            .await?;

        transaction.commit().await?;
        info!(transaction_id = %id, "category transaction deleted");
        Ok(())
    }

    /// Undoes a row's wallet and budget effects. Works on archived wallets;
    /// history must stay revertible after archival.
    async fn revert_effects(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        row: &CategoryTransactionRow,
        kind: TransactionKind,
        amount: &BigDecimal,
    ) -> Result<(), AppError> {
        self.wallets
            .apply_delta(executor, row.user_id, row.wallet_id, &-signed(kind, amount))
            .await?;

        if kind == TransactionKind::Expense {
            self.budgets
                .apply_expense_delta(
                    executor,
                    row.user_id,
                    row.category_id,
                    row.occurred_at,
                    &-amount,
                    &row.currency_code,
                )
                .await?;
        }
        Ok(())
    }

    async fn check_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        subcategory_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        queries::get_category(&self.pool, category_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("category not found".to_string()))?;

        if let Some(subcategory_id) = subcategory_id {
            let subcategory = queries::get_subcategory(&self.pool, subcategory_id, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound("subcategory not found".to_string()))?;
            if subcategory.category_id != category_id {
                return Err(AppError::Validation(
                    "subcategory does not belong to the category".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn expense_debits_and_income_credits() {
        let amount = BigDecimal::from_str("25.50").unwrap();
        assert_eq!(
            signed(TransactionKind::Expense, &amount),
            BigDecimal::from_str("-25.50").unwrap()
        );
        assert_eq!(signed(TransactionKind::Income, &amount), amount);
    }
}
