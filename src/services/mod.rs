pub mod analytics;
pub mod budgets;
pub mod category_tx;
pub mod debt;
pub mod rates;
pub mod scheduler;
pub mod transfers;
pub mod wallets;

pub use analytics::AnalyticsService;
pub use budgets::BudgetService;
pub use category_tx::CategoryTransactionService;
pub use debt::DebtService;
pub use rates::ExchangeRateService;
pub use scheduler::Scheduler;
pub use transfers::TransferService;
pub use wallets::WalletService;
