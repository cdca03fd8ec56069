use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::info;
use uuid::Uuid;

use crate::crypto::AmountCodec;
use crate::db::models::{WalletStatus, WalletTransfer, WalletTransferRow};
use crate::db::queries;
use crate::error::AppError;
use crate::money;
use crate::services::rates::ExchangeRateService;
use crate::utils::page::{PageParams, PageResponse};
use crate::validation;

#[derive(Debug)]
pub struct CreateTransfer {
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct UpdateTransfer {
    pub amount: Option<BigDecimal>,
    pub description: Option<Option<String>>,
}

pub struct TransferService {
    pool: PgPool,
    codec: AmountCodec,
    rates: Arc<ExchangeRateService>,
}

impl TransferService {
    pub fn new(pool: PgPool, codec: AmountCodec, rates: Arc<ExchangeRateService>) -> Self {
        Self { pool, codec, rates }
    }

    /// Moves money between two of the user's wallets. The exchange rate is
    /// resolved once and frozen on the transfer row so reverting replays the
    /// exact original amounts no matter how rates have moved since.
    pub async fn create_transfer(
        &self,
        user_id: Uuid,
        req: CreateTransfer,
    ) -> Result<WalletTransfer, AppError> {
        if req.from_wallet_id == req.to_wallet_id {
            return Err(AppError::Validation(
                "source and target wallets must differ".to_string(),
            ));
        }
        validation::validate_positive_amount("amount", &req.amount)?;
        let description = req.description.map(|d| validation::sanitize_string(&d));
        if let Some(description) = &description {
            validation::validate_max_len(
                "description",
                description,
                validation::DESCRIPTION_MAX_LEN,
            )?;
        }

        let source_amount = money::round_amount(&req.amount);

        let mut transaction = self.pool.begin().await?;
        let (from, to) =
            lock_wallet_pair(&mut transaction, user_id, req.from_wallet_id, req.to_wallet_id)
                .await?;

        if from.status != WalletStatus::Active.as_str()
            || to.status != WalletStatus::Active.as_str()
        {
            return Err(AppError::Validation(
                "transfers require both wallets to be active".to_string(),
            ));
        }

        let rate = self
            .rates
            .get_rate(&from.currency_code, &to.currency_code)
            .await?;
        let target_amount = money::round_amount(&(&source_amount * &rate));

        self.shift_balance(&mut transaction, from.id, &from.balance, &-&source_amount)
            .await?;
        self.shift_balance(&mut transaction, to.id, &to.balance, &target_amount)
            .await?;

        let now = Utc::now();
        let row = WalletTransferRow {
            id: Uuid::new_v4(),
            user_id,
            from_wallet_id: from.id,
            to_wallet_id: to.id,
            source_currency: from.currency_code.clone(),
            target_currency: to.currency_code.clone(),
            source_amount: self.codec.encode(&source_amount)?,
            target_amount: self.codec.encode(&target_amount)?,
            exchange_rate: rate,
            executed_at: now,
            description,
            created_at: now,
        };
        let inserted = queries::insert_transfer(&mut transaction, &row).await?;
        transaction.commit().await?;

        info!(transfer_id = %inserted.id, "wallet transfer executed");
        inserted.into_domain(&self.codec)
    }

    pub async fn get_transfer(&self, user_id: Uuid, id: Uuid) -> Result<WalletTransfer, AppError> {
        queries::get_transfer(&self.pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("transfer not found".to_string()))?
            .into_domain(&self.codec)
    }

    pub async fn list_transfers(
        &self,
        user_id: Uuid,
        params: PageParams,
    ) -> Result<PageResponse<WalletTransfer>, AppError> {
        let rows =
            queries::list_transfers_page(&self.pool, user_id, params.limit(), params.offset())
                .await?;
        let total = queries::count_transfers(&self.pool, user_id).await?;

        let content = rows
            .into_iter()
            .map(|row| row.into_domain(&self.codec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(content, &params, total))
    }

    /// Re-executes a transfer with a new amount: the stored amounts are
    /// reverted from both wallets, the target side is recomputed at the
    /// current rate, and the new pair is applied. Each wallet moves by one
    /// combined delta so its balance is read and written exactly once.
    pub async fn update_transfer(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateTransfer,
    ) -> Result<WalletTransfer, AppError> {
        let mut transaction = self.pool.begin().await?;
        let mut transfer = queries::get_transfer_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("transfer not found".to_string()))?;

        let old_source = self.codec.decode(&transfer.source_amount)?;
        let old_target = self.codec.decode(&transfer.target_amount)?;

        let new_source = match req.amount {
            Some(amount) => {
                validation::validate_positive_amount("amount", &amount)?;
                money::round_amount(&amount)
            }
            None => old_source.clone(),
        };
        if let Some(description) = req.description {
            let description = description.map(|d| validation::sanitize_string(&d));
            if let Some(description) = &description {
                validation::validate_max_len(
                    "description",
                    description,
                    validation::DESCRIPTION_MAX_LEN,
                )?;
            }
            transfer.description = description;
        }

        let (from, to) = lock_wallet_pair(
            &mut transaction,
            user_id,
            transfer.from_wallet_id,
            transfer.to_wallet_id,
        )
        .await?;

        if from.status != WalletStatus::Active.as_str()
            || to.status != WalletStatus::Active.as_str()
        {
            return Err(AppError::Validation(
                "transfers require both wallets to be active".to_string(),
            ));
        }

        let rate = self
            .rates
            .get_rate(&from.currency_code, &to.currency_code)
            .await?;
        let new_target = money::round_amount(&(&new_source * &rate));

        self.shift_balance(&mut transaction, from.id, &from.balance, &(&old_source - &new_source))
            .await?;
        self.shift_balance(&mut transaction, to.id, &to.balance, &(&new_target - &old_target))
            .await?;

        transfer.source_amount = self.codec.encode(&new_source)?;
        transfer.target_amount = self.codec.encode(&new_target)?;
        transfer.exchange_rate = rate;
        let updated = queries::update_transfer(&mut transaction, &transfer).await?;
        transaction.commit().await?;

        info!(transfer_id = %id, "wallet transfer re-executed");
        updated.into_domain(&self.codec)
    }

    /// Reverts and removes a transfer using the amounts stored on the row,
    /// never a re-resolved rate.
    pub async fn delete_transfer(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut transaction = self.pool.begin().await?;
        let transfer = queries::get_transfer_for_update(&mut transaction, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("transfer not found".to_string()))?;

        let source_amount = self.codec.decode(&transfer.source_amount)?;
        let target_amount = self.codec.decode(&transfer.target_amount)?;

        let (from, to) = lock_wallet_pair(
            &mut transaction,
            user_id,
            transfer.from_wallet_id,
            transfer.to_wallet_id,
        )
        .await?;

        self.shift_balance(&mut transaction, from.id, &from.balance, &source_amount)
            .await?;
        self.shift_balance(&mut transaction, to.id, &to.balance, &-&target_amount)
            .await?;

        queries::delete_transfer(&mut transaction, id).await?;
        transaction.commit().await?;

        info!(transfer_id = %id, "wallet transfer reverted");
        Ok(())
    }

    async fn shift_balance(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        wallet_id: Uuid,
        stored_balance: &str,
        delta: &BigDecimal,
    ) -> Result<(), AppError> {
        let balance = self.codec.decode(stored_balance)?;
        let next = money::round_amount(&(balance + delta));
        queries::update_wallet_balance(executor, wallet_id, &self.codec.encode(&next)?).await?;
        Ok(())
    }
}

/// Locks both wallet rows in ascending id order so two concurrent transfers
/// touching the same pair cannot deadlock, then returns them as
/// (source, target).
async fn lock_wallet_pair(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    from_id: Uuid,
    to_id: Uuid,
) -> Result<(crate::db::models::WalletRow, crate::db::models::WalletRow), AppError> {
    let (first, second) = if from_id < to_id {
        (from_id, to_id)
    } else {
        (to_id, from_id)
    };

    let first_row = crate::services::wallets::lock_owned_wallet(executor, user_id, first).await?;
    let second_row = crate::services::wallets::lock_owned_wallet(executor, user_id, second).await?;

    if first_row.id == from_id {
        Ok((first_row, second_row))
    } else {
        Ok((second_row, first_row))
    }
}
