use std::env;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub rates_base_url: String,
    pub rates_api_key: String,
    pub encryption_secret: String,
    pub main_currency: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            rates_base_url: env::var("RATES_BASE_URL")
                .unwrap_or_else(|_| "https://api.exchangerate.host".to_string()),
            rates_api_key: env::var("RATES_API_KEY")?,
            encryption_secret: env::var("AMOUNT_ENCRYPTION_SECRET")?,
            main_currency: env::var("MAIN_CURRENCY")
                .unwrap_or_else(|_| "USD".to_string())
                .to_uppercase(),
        })
    }
}

/// Application-level settings that can change at runtime. Conversion-heavy
/// code reads a point-in-time snapshot instead of ambient global state;
/// changing the main currency goes through [`SettingsHandle::store`] plus
/// the explicit recalculation batch jobs.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub main_currency: String,
}

#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<ArcSwap<AppSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn load(&self) -> Arc<AppSettings> {
        self.inner.load_full()
    }

    pub fn main_currency(&self) -> String {
        self.inner.load().main_currency.clone()
    }

    pub fn store(&self, settings: AppSettings) {
        self.inner.store(Arc::new(settings));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_handle_swaps_main_currency() {
        let handle = SettingsHandle::new(AppSettings {
            main_currency: "USD".to_string(),
        });
        assert_eq!(handle.main_currency(), "USD");

        handle.store(AppSettings {
            main_currency: "EUR".to_string(),
        });
        assert_eq!(handle.main_currency(), "EUR");
    }
}
