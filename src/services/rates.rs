use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration as StdDuration, Instant};

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::ExchangeRate;
use crate::db::queries;
use crate::error::AppError;
use crate::money;
use crate::rates::RateProviderClient;

pub const PIVOT_CURRENCY: &str = "USD";

/// Stored rates older than this are considered stale and trigger a
/// provider refresh.
const DB_TTL_HOURS: i64 = 12;

/// In-process cache TTL. Much shorter than the DB TTL so a refreshed
/// snapshot propagates to every worker within minutes.
const CACHE_TTL: StdDuration = StdDuration::from_secs(15 * 60);

struct CachedRate {
    rate: BigDecimal,
    cached_at: Instant,
}

/// Resolves exchange rates through the USD pivot: every stored row is
/// USD -> X, and a cross rate is (USD->to) / (USD->from) at 6 digits.
pub struct ExchangeRateService {
    pool: PgPool,
    client: RateProviderClient,
    cache: RwLock<HashMap<(String, String), CachedRate>>,
    refresh_lock: Mutex<()>,
}

impl ExchangeRateService {
    pub fn new(pool: PgPool, client: RateProviderClient) -> Self {
        Self {
            pool,
            client,
            cache: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Rate from `from` to `to`, rounded to 6 digits. Identical codes
    /// short-circuit to 1.000000 without touching storage.
    pub async fn get_rate(&self, from: &str, to: &str) -> Result<BigDecimal, AppError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(money::one_rate());
        }

        let key = (from.to_string(), to.to_string());
        if let Some(rate) = self.cached(&key) {
            return Ok(rate);
        }

        let from_pivot = self.pivot_rate(from).await?;
        let to_pivot = self.pivot_rate(to).await?;
        let rate = money::cross_rate(&from_pivot, &to_pivot);

        self.cache
            .write()
            .expect("rate cache poisoned")
            .insert(key, CachedRate { rate: rate.clone(), cached_at: Instant::now() });

        Ok(rate)
    }

    /// Converts `amount` between currencies, rounding half-up to 2 digits.
    pub async fn convert(
        &self,
        amount: &BigDecimal,
        from: &str,
        to: &str,
    ) -> Result<BigDecimal, AppError> {
        let rate = self.get_rate(from, to).await?;
        Ok(money::round_amount(&(amount * &rate)))
    }

    fn cached(&self, key: &(String, String)) -> Option<BigDecimal> {
        let cache = self.cache.read().expect("rate cache poisoned");
        cache
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < CACHE_TTL)
            .map(|entry| entry.rate.clone())
    }

    /// USD -> code rate from storage, refreshing from the provider when the
    /// freshest stored row is past its TTL.
    async fn pivot_rate(&self, code: &str) -> Result<BigDecimal, AppError> {
        if code == PIVOT_CURRENCY {
            return Ok(money::one_rate());
        }

        let not_before = Utc::now() - Duration::hours(DB_TTL_HOURS);
        if let Some(row) =
            queries::latest_rate(&self.pool, PIVOT_CURRENCY, code, not_before).await?
        {
            return Ok(row.rate);
        }

        self.refresh_rates(code).await?;

        match queries::latest_rate(&self.pool, PIVOT_CURRENCY, code, not_before).await? {
            Some(row) => Ok(row.rate),
            None => {
                warn!(currency = code, "rate missing after provider refresh");
                Err(AppError::RateUnavailable(format!(
                    "no exchange rate available for {}",
                    code
                )))
            }
        }
    }

    /// Fetches a full USD-based snapshot from the provider and stores it
    /// atomically. Single-flight: concurrent callers queue on the lock, and
    /// the freshness re-check is for the currency the caller actually wants,
    /// so a late caller asking for a currency the last refresh predates (a
    /// newly activated one, say) still triggers a fetch.
    async fn refresh_rates(&self, code: &str) -> Result<(), AppError> {
        let _guard = self.refresh_lock.lock().await;

        let not_before = Utc::now() - Duration::hours(DB_TTL_HOURS);
        let symbols = queries::list_active_currencies(&self.pool).await?;

        let already_fresh = queries::latest_rate(&self.pool, PIVOT_CURRENCY, code, not_before)
            .await?
            .is_some();
        if already_fresh {
            return Ok(());
        }

        let response = self.client.fetch_latest(PIVOT_CURRENCY, &symbols).await?;
        let fetched_at = Utc::now();

        let rows: Vec<ExchangeRate> = response
            .rates
            .into_iter()
            .filter(|(code, _)| code != PIVOT_CURRENCY)
            .map(|(code, rate)| ExchangeRate {
                id: Uuid::new_v4(),
                base_currency: PIVOT_CURRENCY.to_string(),
                target_currency: code,
                rate: money::round_rate(&rate),
                fetched_at,
                source: self.client.source_name().to_string(),
            })
            .collect();

        info!(count = rows.len(), "storing refreshed exchange rates");
        queries::insert_rates_batch(&self.pool, &rows).await?;

        self.cache.write().expect("rate cache poisoned").clear();
        Ok(())
    }
}
