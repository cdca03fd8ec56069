use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::info;
use uuid::Uuid;

use crate::config::SettingsHandle;
use crate::crypto::AmountCodec;
use crate::db::models::{
    CounterpartyStatus, DebtCounterparty, DebtCounterpartyRow, DebtDirection, DebtTransaction,
    DebtTransactionRow,
};
use crate::db::queries;
use crate::error::AppError;
use crate::money::{self, TwoSidedPosition};
use crate::services::rates::ExchangeRateService;
use crate::services::wallets::WalletService;
use crate::utils::page::{PageParams, PageResponse};
use crate::validation;

#[derive(Debug)]
pub struct CreateCounterparty {
    pub name: String,
    pub color: Option<String>,
    /// Defaults to the current main currency.
    pub currency_code: Option<String>,
}

#[derive(Debug)]
pub struct UpdateCounterparty {
    pub name: Option<String>,
    pub color: Option<Option<String>>,
}

#[derive(Debug)]
pub struct CreateDebtTransaction {
    pub counterparty_id: Uuid,
    pub wallet_id: Uuid,
    pub direction: DebtDirection,
    pub amount: BigDecimal,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct UpdateDebtTransaction {
    pub counterparty_id: Option<Uuid>,
    pub wallet_id: Option<Uuid>,
    pub direction: Option<DebtDirection>,
    pub amount: Option<BigDecimal>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub description: Option<Option<String>>,
}

#[derive(Debug)]
pub struct DebtHistoryFilter {
    pub direction: Option<DebtDirection>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtSummary {
    pub currency_code: String,
    pub total_owed_to_me: BigDecimal,
    pub total_i_owe: BigDecimal,
    pub counterparties: Vec<DebtSummaryEntry>,
}

/// One counterparty's slice of the summary: its accumulators converted into
/// the summary currency plus its percentage share of each total.
#[derive(Debug, Clone, Serialize)]
pub struct DebtSummaryEntry {
    #[serde(flatten)]
    pub counterparty: DebtCounterparty,
    pub converted_owed_to_me: BigDecimal,
    pub converted_i_owe: BigDecimal,
    pub owed_to_me_share: BigDecimal,
    pub i_owe_share: BigDecimal,
}

fn wallet_delta(direction: DebtDirection, amount: &BigDecimal) -> BigDecimal {
    match direction {
        DebtDirection::Lent => -amount,
        DebtDirection::Borrowed => amount.clone(),
    }
}

fn apply_direction(position: TwoSidedPosition, direction: DebtDirection, amount: &BigDecimal) -> TwoSidedPosition {
    match direction {
        DebtDirection::Lent => position.apply_lent(amount),
        DebtDirection::Borrowed => position.apply_borrowed(amount),
    }
}

/// Debt ledger. Counterparty accumulators clamp at zero (lending to someone
/// you owe pays the debt down first and only the excess becomes owed to
/// you), which makes single transactions non-invertible; edits and deletes
/// therefore rebuild the accumulators from the full history. Rows keep the
/// funding wallet's currency; accumulators keep the counterparty's, so
/// every applied or replayed amount is converted between the two.
pub struct DebtService {
    pool: PgPool,
    codec: AmountCodec,
    wallets: Arc<WalletService>,
    rates: Arc<ExchangeRateService>,
    settings: SettingsHandle,
}

impl DebtService {
    pub fn new(
        pool: PgPool,
        codec: AmountCodec,
        wallets: Arc<WalletService>,
        rates: Arc<ExchangeRateService>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            pool,
            codec,
            wallets,
            rates,
            settings,
        }
    }

    // --- Counterparties ---

    pub async fn create_counterparty(
        &self,
        user_id: Uuid,
        req: CreateCounterparty,
    ) -> Result<DebtCounterparty, AppError> {
        let name = validation::sanitize_string(&req.name);
        validation::validate_required("name", &name)?;
        validation::validate_max_len("name", &name, validation::NAME_MAX_LEN)?;
        let currency_code = match req.currency_code {
            Some(code) => validation::normalize_currency_code("currency_code", &code)?,
            None => self.settings.main_currency(),
        };

        if !queries::currency_is_active(&self.pool, &currency_code).await? {
            return Err(AppError::Validation(format!(
                "currency {} is not supported",
                currency_code
            )));
        }

        let now = Utc::now();
        let row = DebtCounterpartyRow {
            id: Uuid::new_v4(),
            user_id,
            name,
            color: req.color.map(|c| validation::sanitize_string(&c)),
            currency_code,
            owed_to_me: self.codec.encode(&money::zero_amount())?,
            i_owe: self.codec.encode(&money::zero_amount())?,
            status: CounterpartyStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut transaction = self.pool.begin().await?;
        let inserted = queries::insert_counterparty(&mut transaction, &row).await?;
        transaction.commit().await?;

        info!(counterparty_id = %inserted.id, "debt counterparty created");
        inserted.into_domain(&self.codec)
    }

    pub async fn get_counterparty(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<DebtCounterparty, AppError> {
        queries::get_counterparty(&self.pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("counterparty not found".to_string()))?
            .into_domain(&self.codec)
    }

    pub async fn list_counterparties(
        &self,
        user_id: Uuid,
        status: Option<CounterpartyStatus>,
    ) -> Result<Vec<DebtCounterparty>, AppError> {
        let rows =
            queries::list_counterparties(&self.pool, user_id, status.map(|s| s.as_str())).await?;
        rows.into_iter().map(|row| row.into_domain(&self.codec)).collect()
    }

    pub async fn update_counterparty(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateCounterparty,
    ) -> Result<DebtCounterparty, AppError> {
        let mut transaction = self.pool.begin().await?;
        let current = lock_owned_counterparty(&mut transaction, user_id, id).await?;

        let name = match req.name {
            Some(name) => {
                let name = validation::sanitize_string(&name);
                validation::validate_required("name", &name)?;
                validation::validate_max_len("name", &name, validation::NAME_MAX_LEN)?;
                name
            }
            None => current.name.clone(),
        };
        let color = match req.color {
            Some(color) => color.map(|c| validation::sanitize_string(&c)),
            None => current.color.clone(),
        };

        let updated = queries::update_counterparty_meta(
            &mut transaction,
            id,
            &name,
            color.as_deref(),
            &current.status,
        )
        .await?;
        transaction.commit().await?;

        updated.into_domain(&self.codec)
    }

    pub async fn set_counterparty_status(
        &self,
        user_id: Uuid,
        id: Uuid,
        status: CounterpartyStatus,
    ) -> Result<DebtCounterparty, AppError> {
        let mut transaction = self.pool.begin().await?;
        let current = lock_owned_counterparty(&mut transaction, user_id, id).await?;

        let updated = queries::update_counterparty_meta(
            &mut transaction,
            id,
            &current.name,
            current.color.as_deref(),
            status.as_str(),
        )
        .await?;
        transaction.commit().await?;

        info!(counterparty_id = %id, status = status.as_str(), "counterparty status changed");
        updated.into_domain(&self.codec)
    }

    pub async fn delete_counterparty(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut transaction = self.pool.begin().await?;
        lock_owned_counterparty(&mut transaction, user_id, id).await?;

        if queries::counterparty_has_transactions(&mut transaction, id).await? {
            return Err(AppError::Validation(
                "counterparty has recorded debts and can only be archived".to_string(),
            ));
        }

        queries::delete_counterparty(&mut transaction, id).await?;
        transaction.commit().await?;
        Ok(())
    }

    // --- Debt transactions ---

    pub async fn create_transaction(
        &self,
        user_id: Uuid,
        req: CreateDebtTransaction,
    ) -> Result<DebtTransaction, AppError> {
        validation::validate_positive_amount("amount", &req.amount)?;
        let description = req.description.map(|d| validation::sanitize_string(&d));
        if let Some(description) = &description {
            validation::validate_max_len(
                "description",
                description,
                validation::DESCRIPTION_MAX_LEN,
            )?;
        }
        let amount = money::round_amount(&req.amount);

        let mut transaction = self.pool.begin().await?;
        let counterparty =
            lock_owned_counterparty(&mut transaction, user_id, req.counterparty_id).await?;

        if counterparty.status != CounterpartyStatus::Active.as_str() {
            return Err(AppError::Validation("counterparty is archived".to_string()));
        }

        let wallet = self
            .wallets
            .apply_delta_active(
                &mut transaction,
                user_id,
                req.wallet_id,
                &wallet_delta(req.direction, &amount),
            )
            .await?;

        // The wallet moves by the amount in its own currency; the
        // accumulators move by its value in the counterparty's currency.
        let converted = self
            .rates
            .convert(&amount, &wallet.currency_code, &counterparty.currency_code)
            .await?;

        let position = TwoSidedPosition {
            owed_to_me: self.codec.decode(&counterparty.owed_to_me)?,
            i_owe: self.codec.decode(&counterparty.i_owe)?,
        };
        let position = apply_direction(position, req.direction, &converted);
        queries::update_counterparty_totals(
            &mut transaction,
            counterparty.id,
            &self.codec.encode(&position.owed_to_me)?,
            &self.codec.encode(&position.i_owe)?,
        )
        .await?;

        let row = DebtTransactionRow {
            id: Uuid::new_v4(),
            user_id,
            counterparty_id: req.counterparty_id,
            wallet_id: req.wallet_id,
            direction: req.direction.as_str().to_string(),
            amount: self.codec.encode(&amount)?,
            currency_code: wallet.currency_code.clone(),
            occurred_at: req.occurred_at,
            description,
            created_at: Utc::now(),
        };
        let inserted = queries::insert_debt_transaction(&mut transaction, &row).await?;
        transaction.commit().await?;

        info!(debt_transaction_id = %inserted.id, "debt transaction recorded");
        inserted.into_domain(&self.codec)
    }

    pub async fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateDebtTransaction,
    ) -> Result<DebtTransaction, AppError> {
        let mut transaction = self.pool.begin().await?;
        let old = queries::get_debt_transaction_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("debt transaction not found".to_string()))?;

        let new_counterparty_id = req.counterparty_id.unwrap_or(old.counterparty_id);
        // Both counterparties are locked in ascending id order when the debt
        // moves, same deadlock discipline as wallet pairs.
        let (counterparty, moved_from) = if new_counterparty_id == old.counterparty_id {
            let row =
                lock_owned_counterparty(&mut transaction, user_id, old.counterparty_id).await?;
            (row, None)
        } else {
            let (first, second) = if old.counterparty_id < new_counterparty_id {
                (old.counterparty_id, new_counterparty_id)
            } else {
                (new_counterparty_id, old.counterparty_id)
            };
            let first_row = lock_owned_counterparty(&mut transaction, user_id, first).await?;
            let second_row = lock_owned_counterparty(&mut transaction, user_id, second).await?;
            if first_row.id == new_counterparty_id {
                (first_row, Some(second_row))
            } else {
                (second_row, Some(first_row))
            }
        };
        if moved_from.is_some() && counterparty.status != CounterpartyStatus::Active.as_str() {
            return Err(AppError::Validation("counterparty is archived".to_string()));
        }

        let old_direction = DebtDirection::parse(&old.direction)?;
        let old_amount = self.codec.decode(&old.amount)?;
        let new_direction = req.direction.unwrap_or(old_direction);
        let new_amount = match req.amount {
            Some(amount) => {
                validation::validate_positive_amount("amount", &amount)?;
                money::round_amount(&amount)
            }
            None => old_amount.clone(),
        };
        let new_wallet_id = req.wallet_id.unwrap_or(old.wallet_id);
        let new_occurred_at = req.occurred_at.unwrap_or(old.occurred_at);
        let new_description = match req.description {
            Some(description) => description.map(|d| validation::sanitize_string(&d)),
            None => old.description.clone(),
        };

        self.wallets
            .apply_delta(
                &mut transaction,
                user_id,
                old.wallet_id,
                &-wallet_delta(old_direction, &old_amount),
            )
            .await?;
        let wallet = self
            .wallets
            .apply_delta(
                &mut transaction,
                user_id,
                new_wallet_id,
                &wallet_delta(new_direction, &new_amount),
            )
            .await?;

        let updated_row = DebtTransactionRow {
            id: old.id,
            user_id,
            counterparty_id: new_counterparty_id,
            wallet_id: new_wallet_id,
            direction: new_direction.as_str().to_string(),
            amount: self.codec.encode(&new_amount)?,
            currency_code: wallet.currency_code.clone(),
            occurred_at: new_occurred_at,
            description: new_description,
            created_at: old.created_at,
        };
        let saved = queries::update_debt_transaction(&mut transaction, &updated_row).await?;

        self.rebuild_totals(&mut transaction, &counterparty).await?;
        if let Some(previous) = &moved_from {
            self.rebuild_totals(&mut transaction, previous).await?;
        }
        transaction.commit().await?;

        saved.into_domain(&self.codec)
    }

    pub async fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut transaction = self.pool.begin().await?;
        let old = queries::get_debt_transaction_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("debt transaction not found".to_string()))?;
        let counterparty =
            lock_owned_counterparty(&mut transaction, user_id, old.counterparty_id).await?;

        let direction = DebtDirection::parse(&old.direction)?;
        let old_amount = self.codec.decode(&old.amount)?;
        self.wallets
            .apply_delta(
                &mut transaction,
                user_id,
                old.wallet_id,
                &-wallet_delta(direction, &old_amount),
            )
            .await?;

        queries::delete_debt_transaction(&mut transaction, id).await?;
        self.rebuild_totals(&mut transaction, &counterparty).await?;
        transaction.commit().await?;

        info!(debt_transaction_id = %id, "debt transaction deleted");
        Ok(())
    }

    pub async fn get_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<DebtTransaction, AppError> {
        queries::get_debt_transaction(&self.pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("debt transaction not found".to_string()))?
            .into_domain(&self.codec)
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        counterparty_id: Uuid,
        filter: DebtHistoryFilter,
        params: PageParams,
    ) -> Result<PageResponse<DebtTransaction>, AppError> {
        queries::get_counterparty(&self.pool, counterparty_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("counterparty not found".to_string()))?;

        let filter = queries::DebtTransactionFilter {
            direction: filter.direction.map(|d| d.as_str().to_string()),
            occurred_from: filter.occurred_from,
            occurred_to: filter.occurred_to,
        };
        let rows = queries::list_debt_transactions_page(
            &self.pool,
            user_id,
            counterparty_id,
            &filter,
            params.limit(),
            params.offset(),
        )
        .await?;
        let total =
            queries::count_debt_transactions(&self.pool, user_id, counterparty_id, &filter).await?;

        let content = rows
            .into_iter()
            .map(|row| row.into_domain(&self.codec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(content, &params, total))
    }

    /// Totals across all active counterparties, converted into the first
    /// counterparty's currency, or the main currency when there are none.
    pub async fn summary(&self, user_id: Uuid) -> Result<DebtSummary, AppError> {
        let rows = queries::list_counterparties(
            &self.pool,
            user_id,
            Some(CounterpartyStatus::Active.as_str()),
        )
        .await?;
        let counterparties = rows
            .into_iter()
            .map(|row| row.into_domain(&self.codec))
            .collect::<Result<Vec<_>, _>>()?;

        let currency_code = counterparties
            .first()
            .map(|c| c.currency_code.clone())
            .unwrap_or_else(|| self.settings.main_currency());

        let mut total_owed_to_me = money::zero_amount();
        let mut total_i_owe = money::zero_amount();
        let mut converted: Vec<(DebtCounterparty, BigDecimal, BigDecimal)> = Vec::new();
        for counterparty in counterparties {
            let rate = self
                .rates
                .get_rate(&counterparty.currency_code, &currency_code)
                .await?;
            let owed_to_me = money::round_amount(&(&counterparty.owed_to_me * &rate));
            let i_owe = money::round_amount(&(&counterparty.i_owe * &rate));
            total_owed_to_me += &owed_to_me;
            total_i_owe += &i_owe;
            converted.push((counterparty, owed_to_me, i_owe));
        }
        let total_owed_to_me = money::round_amount(&total_owed_to_me);
        let total_i_owe = money::round_amount(&total_i_owe);

        let counterparties = converted
            .into_iter()
            .map(|(counterparty, owed_to_me, i_owe)| DebtSummaryEntry {
                owed_to_me_share: money::percent_share(&owed_to_me, &total_owed_to_me),
                i_owe_share: money::percent_share(&i_owe, &total_i_owe),
                converted_owed_to_me: owed_to_me,
                converted_i_owe: i_owe,
                counterparty,
            })
            .collect();

        Ok(DebtSummary {
            currency_code,
            total_owed_to_me,
            total_i_owe,
            counterparties,
        })
    }

    /// Replays the full chronological history into fresh accumulators,
    /// converting each row from its own currency into the counterparty's.
    async fn rebuild_totals(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        counterparty: &DebtCounterpartyRow,
    ) -> Result<(), AppError> {
        let rows =
            queries::list_debt_transactions_chronological(executor, counterparty.id).await?;

        let mut total_lent = money::zero_amount();
        let mut total_borrowed = money::zero_amount();
        for row in rows {
            let amount = self.codec.decode(&row.amount)?;
            let converted = self
                .rates
                .convert(&amount, &row.currency_code, &counterparty.currency_code)
                .await?;
            match DebtDirection::parse(&row.direction)? {
                DebtDirection::Lent => total_lent += converted,
                DebtDirection::Borrowed => total_borrowed += converted,
            }
        }
        let position = TwoSidedPosition::from_totals(&total_lent, &total_borrowed);

        queries::update_counterparty_totals(
            executor,
            counterparty.id,
            &self.codec.encode(&position.owed_to_me)?,
            &self.codec.encode(&position.i_owe)?,
        )
        .await?;
        Ok(())
    }
}

/// Locks a counterparty row and checks ownership. Missing rows are a 404;
/// rows owned by another user are a 403.
async fn lock_owned_counterparty(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    id: Uuid,
) -> Result<DebtCounterpartyRow, AppError> {
    let row = queries::get_counterparty_for_update(executor, id)
        .await?
        .ok_or_else(|| AppError::NotFound("counterparty not found".to_string()))?;
    if row.user_id != user_id {
        return Err(AppError::Forbidden(
            "counterparty belongs to another user".to_string(),
        ));
    }
    Ok(row)
}
