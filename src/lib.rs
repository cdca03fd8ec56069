pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod money;
pub mod rates;
pub mod services;
pub mod utils;
pub mod validation;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::config::{AppSettings, Config, SettingsHandle};
use crate::crypto::AmountCodec;
use crate::rates::RateProviderClient;
use crate::services::{
    AnalyticsService, BudgetService, CategoryTransactionService, DebtService,
    ExchangeRateService, TransferService, WalletService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub settings: SettingsHandle,
    pub rate_client: RateProviderClient,
    pub rates: Arc<ExchangeRateService>,
    pub wallets: Arc<WalletService>,
    pub transfers: Arc<TransferService>,
    pub transactions: Arc<CategoryTransactionService>,
    pub debts: Arc<DebtService>,
    pub budgets: Arc<BudgetService>,
    pub analytics: Arc<AnalyticsService>,
}

impl AppState {
    pub fn build(config: &Config, db: sqlx::PgPool) -> Self {
        let codec = AmountCodec::from_secret(&config.encryption_secret);
        let settings = SettingsHandle::new(AppSettings {
            main_currency: config.main_currency.clone(),
        });

        let rate_client =
            RateProviderClient::new(config.rates_base_url.clone(), config.rates_api_key.clone());
        let rates = Arc::new(ExchangeRateService::new(db.clone(), rate_client.clone()));
        let wallets = Arc::new(WalletService::new(db.clone(), codec.clone()));
        let transfers = Arc::new(TransferService::new(
            db.clone(),
            codec.clone(),
            Arc::clone(&rates),
        ));
        let budgets = Arc::new(BudgetService::new(
            db.clone(),
            codec.clone(),
            Arc::clone(&rates),
        ));
        let analytics = Arc::new(AnalyticsService::new(
            db.clone(),
            codec.clone(),
            Arc::clone(&rates),
            settings.clone(),
        ));
        let transactions = Arc::new(CategoryTransactionService::new(
            db.clone(),
            codec.clone(),
            Arc::clone(&wallets),
            Arc::clone(&budgets),
            Arc::clone(&analytics),
        ));
        let debts = Arc::new(DebtService::new(
            db.clone(),
            codec.clone(),
            Arc::clone(&wallets),
            Arc::clone(&rates),
            settings.clone(),
        ));

        AppState {
            db,
            settings,
            rate_client,
            rates,
            wallets,
            transfers,
            transactions,
            debts,
            budgets,
            analytics,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/wallets",
            post(handlers::wallets::create_wallet).get(handlers::wallets::list_wallets),
        )
        .route("/wallets/balances", get(handlers::wallets::wallet_balances))
        .route(
            "/wallets/:id",
            get(handlers::wallets::get_wallet)
                .patch(handlers::wallets::update_wallet)
                .delete(handlers::wallets::delete_wallet),
        )
        .route(
            "/transfers",
            post(handlers::transfers::create_transfer).get(handlers::transfers::list_transfers),
        )
        .route(
            "/transfers/:id",
            get(handlers::transfers::get_transfer)
                .patch(handlers::transfers::update_transfer)
                .delete(handlers::transfers::delete_transfer),
        )
        .route(
            "/transactions",
            post(handlers::transactions::create_transaction)
                .get(handlers::transactions::list_transactions),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction)
                .patch(handlers::transactions::update_transaction)
                .delete(handlers::transactions::delete_transaction),
        )
        .route(
            "/debts/counterparties",
            post(handlers::debts::create_counterparty).get(handlers::debts::list_counterparties),
        )
        .route(
            "/debts/counterparties/:id",
            get(handlers::debts::get_counterparty)
                .patch(handlers::debts::update_counterparty)
                .delete(handlers::debts::delete_counterparty),
        )
        .route(
            "/debts/counterparties/:id/archive",
            post(handlers::debts::archive_counterparty),
        )
        .route(
            "/debts/counterparties/:id/restore",
            post(handlers::debts::restore_counterparty),
        )
        .route(
            "/debts/counterparties/:id/transactions",
            get(handlers::debts::counterparty_history),
        )
        .route("/debts/summary", get(handlers::debts::summary))
        .route(
            "/debts/transactions",
            post(handlers::debts::create_debt_transaction),
        )
        .route(
            "/debts/transactions/:id",
            get(handlers::debts::get_debt_transaction)
                .patch(handlers::debts::update_debt_transaction)
                .delete(handlers::debts::delete_debt_transaction),
        )
        .route(
            "/budgets",
            post(handlers::budgets::create_budget).get(handlers::budgets::list_budgets),
        )
        .route(
            "/budgets/:id",
            get(handlers::budgets::get_budget)
                .patch(handlers::budgets::update_budget)
                .delete(handlers::budgets::delete_budget),
        )
        .route("/budgets/:id/close", post(handlers::budgets::close_budget))
        .route("/analytics", get(handlers::analytics::get_analytics))
        .route("/settings", get(handlers::settings::get_settings))
        .route(
            "/settings/main-currency",
            put(handlers::settings::change_main_currency),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
