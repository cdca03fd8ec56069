use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::info;
use uuid::Uuid;

use crate::crypto::AmountCodec;
use crate::db::models::{Wallet, WalletRow, WalletStatus};
use crate::db::queries;
use crate::error::AppError;
use crate::money;
use crate::validation;

#[derive(Debug)]
pub struct CreateWallet {
    pub name: String,
    pub currency_code: String,
    pub initial_balance: Option<BigDecimal>,
}

#[derive(Debug)]
pub struct UpdateWallet {
    pub name: Option<String>,
    pub status: Option<WalletStatus>,
}

/// Total balance across the user's active wallets in one currency.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CurrencyBalance {
    pub currency_code: String,
    pub total_balance: BigDecimal,
}

pub struct WalletService {
    pool: PgPool,
    codec: AmountCodec,
}

impl WalletService {
    pub fn new(pool: PgPool, codec: AmountCodec) -> Self {
        Self { pool, codec }
    }

    pub async fn create_wallet(&self, user_id: Uuid, req: CreateWallet) -> Result<Wallet, AppError> {
        let name = validation::sanitize_string(&req.name);
        validation::validate_required("name", &name)?;
        validation::validate_max_len("name", &name, validation::NAME_MAX_LEN)?;
        let currency_code = validation::normalize_currency_code("currency_code", &req.currency_code)?;

        if !queries::currency_is_active(&self.pool, &currency_code).await? {
            return Err(AppError::Validation(format!(
                "currency {} is not supported",
                currency_code
            )));
        }

        let balance = money::round_amount(&req.initial_balance.unwrap_or_else(money::zero_amount));
        let now = Utc::now();
        let row = WalletRow {
            id: Uuid::new_v4(),
            user_id,
            name,
            currency_code,
            balance: self.codec.encode(&balance)?,
            status: WalletStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut transaction = self.pool.begin().await?;
        let inserted = queries::insert_wallet(&mut transaction, &row).await?;
        transaction.commit().await?;

        info!(wallet_id = %inserted.id, "wallet created");
        inserted.into_domain(&self.codec)
    }

    pub async fn get_wallet(&self, user_id: Uuid, id: Uuid) -> Result<Wallet, AppError> {
        queries::get_wallet(&self.pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("wallet not found".to_string()))?
            .into_domain(&self.codec)
    }

    pub async fn list_wallets(
        &self,
        user_id: Uuid,
        status: Option<WalletStatus>,
    ) -> Result<Vec<Wallet>, AppError> {
        let rows =
            queries::list_wallets(&self.pool, user_id, status.map(|s| s.as_str())).await?;
        rows.into_iter()
            .map(|row| row.into_domain(&self.codec))
            .collect()
    }

    /// Active balances grouped by currency, ordered by code. Summation
    /// happens after decode since stored balances are ciphertext.
    pub async fn currency_balances(&self, user_id: Uuid) -> Result<Vec<CurrencyBalance>, AppError> {
        let rows = queries::list_wallets(
            &self.pool,
            user_id,
            Some(WalletStatus::Active.as_str()),
        )
        .await?;

        let mut totals: std::collections::BTreeMap<String, BigDecimal> =
            std::collections::BTreeMap::new();
        for row in rows {
            let balance = self.codec.decode(&row.balance)?;
            *totals
                .entry(row.currency_code)
                .or_insert_with(money::zero_amount) += balance;
        }

        Ok(totals
            .into_iter()
            .map(|(currency_code, total)| CurrencyBalance {
                currency_code,
                total_balance: money::round_amount(&total),
            })
            .collect())
    }

    pub async fn update_wallet(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateWallet,
    ) -> Result<Wallet, AppError> {
        let mut transaction = self.pool.begin().await?;
        let current = lock_owned_wallet(&mut transaction, user_id, id).await?;

        let name = match req.name {
            Some(name) => {
                let name = validation::sanitize_string(&name);
                validation::validate_required("name", &name)?;
                validation::validate_max_len("name", &name, validation::NAME_MAX_LEN)?;
                name
            }
            None => current.name.clone(),
        };
        let status = req
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| current.status.clone());

        let updated = queries::update_wallet_meta(&mut transaction, id, &name, &status).await?;
        transaction.commit().await?;

        updated.into_domain(&self.codec)
    }

    /// Deleting a wallet with recorded activity would orphan its history,
    /// so those wallets can only be archived.
    pub async fn delete_wallet(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut transaction = self.pool.begin().await?;
        lock_owned_wallet(&mut transaction, user_id, id).await?;

        if queries::wallet_has_activity(&mut transaction, id).await? {
            return Err(AppError::Validation(
                "wallet has recorded activity and can only be archived".to_string(),
            ));
        }

        queries::delete_wallet(&mut transaction, id).await?;
        transaction.commit().await?;

        info!(wallet_id = %id, "wallet deleted");
        Ok(())
    }

    /// Core balance primitive: locks the wallet row, decodes the stored
    /// balance, applies the signed delta and writes the re-encrypted result.
    /// Returns the wallet after the update. Balances may go negative; the
    /// ledger records what happened rather than judging it.
    pub async fn apply_delta(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        user_id: Uuid,
        wallet_id: Uuid,
        delta: &BigDecimal,
    ) -> Result<Wallet, AppError> {
        let row = lock_owned_wallet(executor, user_id, wallet_id).await?;

        let balance = self.codec.decode(&row.balance)?;
        let next = money::round_amount(&(balance + delta));
        queries::update_wallet_balance(executor, wallet_id, &self.codec.encode(&next)?).await?;

        let mut updated = row;
        updated.balance = self.codec.encode(&next)?;
        updated.into_domain(&self.codec)
    }

    /// Same as [`apply_delta`] but requires the wallet to be active;
    /// new activity is rejected on archived wallets while reverts of
    /// historical activity still go through.
    pub async fn apply_delta_active(
        &self,
        executor: &mut SqlxTransaction<'_, Postgres>,
        user_id: Uuid,
        wallet_id: Uuid,
        delta: &BigDecimal,
    ) -> Result<Wallet, AppError> {
        let row = lock_owned_wallet(executor, user_id, wallet_id).await?;

        if row.status != WalletStatus::Active.as_str() {
            return Err(AppError::Validation("wallet is archived".to_string()));
        }

        let balance = self.codec.decode(&row.balance)?;
        let next = money::round_amount(&(balance + delta));
        queries::update_wallet_balance(executor, wallet_id, &self.codec.encode(&next)?).await?;

        let mut updated = row;
        updated.balance = self.codec.encode(&next)?;
        updated.into_domain(&self.codec)
    }
}

/// Locks a wallet row and checks ownership. A missing wallet is a 404; a
/// wallet that exists but belongs to someone else is a 403.
pub(crate) async fn lock_owned_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    wallet_id: Uuid,
) -> Result<WalletRow, AppError> {
    let row = queries::get_wallet_for_update(executor, wallet_id)
        .await?
        .ok_or_else(|| AppError::NotFound("wallet not found".to_string()))?;
    if row.user_id != user_id {
        return Err(AppError::Forbidden(
            "wallet belongs to another user".to_string(),
        ));
    }
    Ok(row)
}
