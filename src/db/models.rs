use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::crypto::AmountCodec;
use crate::error::AppError;

// --- Enums ---
//
// All enums are stored as their uppercase wire form in TEXT columns and
// parsed back on read; an unknown stored value is corrupt data, not a
// client error.

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Result<Self, AppError> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(AppError::Internal(format!(
                        concat!("unknown ", stringify!($name), " value: {}"),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(TransactionKind {
    Expense => "EXPENSE",
    Income => "INCOME",
});

text_enum!(DebtDirection {
    Lent => "LENT",
    Borrowed => "BORROWED",
});

text_enum!(WalletStatus {
    Active => "ACTIVE",
    Archived => "ARCHIVED",
});

text_enum!(CounterpartyStatus {
    Active => "ACTIVE",
    Archived => "ARCHIVED",
});

text_enum!(BudgetStatus {
    Active => "ACTIVE",
    Closed => "CLOSED",
});

text_enum!(BudgetPeriodType {
    Week => "WEEK",
    Month => "MONTH",
    Year => "YEAR",
    Custom => "CUSTOM",
});

text_enum!(BudgetType {
    OneOff => "ONE_OFF",
    Recurring => "RECURRING",
});

// --- Wallets ---

/// Raw wallet row; `balance` is ciphertext (or legacy plaintext).
#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub currency_code: String,
    pub balance: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub currency_code: String,
    pub balance: BigDecimal,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRow {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<Wallet, AppError> {
        Ok(Wallet {
            balance: codec.decode(&self.balance)?,
            status: WalletStatus::parse(&self.status)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            currency_code: self.currency_code,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// --- Category catalogue (external, read-only) ---

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Subcategory {
    pub id: Uuid,
    pub category_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}

// --- Category transactions ---

#[derive(Debug, FromRow)]
pub struct CategoryTransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub category_id: Uuid,
    pub subcategory_id: Option<Uuid>,
    pub kind: String,
    pub amount: String,
    pub currency_code: String,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub category_id: Uuid,
    pub subcategory_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub currency_code: String,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategoryTransactionRow {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<CategoryTransaction, AppError> {
        Ok(CategoryTransaction {
            amount: codec.decode(&self.amount)?,
            kind: TransactionKind::parse(&self.kind)?,
            id: self.id,
            user_id: self.user_id,
            wallet_id: self.wallet_id,
            category_id: self.category_id,
            subcategory_id: self.subcategory_id,
            currency_code: self.currency_code,
            occurred_at: self.occurred_at,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// --- Debts ---

/// Raw counterparty row; both accumulators are ciphertext.
#[derive(Debug, FromRow)]
pub struct DebtCounterpartyRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub currency_code: String,
    pub owed_to_me: String,
    pub i_owe: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtCounterparty {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub currency_code: String,
    pub owed_to_me: BigDecimal,
    pub i_owe: BigDecimal,
    pub status: CounterpartyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DebtCounterpartyRow {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<DebtCounterparty, AppError> {
        Ok(DebtCounterparty {
            owed_to_me: codec.decode(&self.owed_to_me)?,
            i_owe: codec.decode(&self.i_owe)?,
            status: CounterpartyStatus::parse(&self.status)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            color: self.color,
            currency_code: self.currency_code,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct DebtTransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub counterparty_id: Uuid,
    pub wallet_id: Uuid,
    pub direction: String,
    pub amount: String,
    pub currency_code: String,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub counterparty_id: Uuid,
    pub wallet_id: Uuid,
    pub direction: DebtDirection,
    pub amount: BigDecimal,
    pub currency_code: String,
    pub occurred_at: DateTime<Utc>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DebtTransactionRow {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<DebtTransaction, AppError> {
        Ok(DebtTransaction {
            amount: codec.decode(&self.amount)?,
            direction: DebtDirection::parse(&self.direction)?,
            id: self.id,
            user_id: self.user_id,
            counterparty_id: self.counterparty_id,
            wallet_id: self.wallet_id,
            currency_code: self.currency_code,
            occurred_at: self.occurred_at,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

// --- Budgets ---

/// Raw budget row; the limit and spent amounts are ciphertext. The percent
/// is a ratio, not an amount, and stays numeric.
#[derive(Debug, FromRow)]
pub struct BudgetRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub period_type: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub budget_type: String,
    pub currency_code: String,
    pub amount_limit: String,
    pub spent_amount: String,
    pub percent_spent: BigDecimal,
    pub status: String,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Budget {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub period_type: BudgetPeriodType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub budget_type: BudgetType,
    pub currency_code: String,
    pub amount_limit: BigDecimal,
    pub spent_amount: BigDecimal,
    pub percent_spent: BigDecimal,
    pub status: BudgetStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetRow {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<Budget, AppError> {
        Ok(Budget {
            amount_limit: codec.decode(&self.amount_limit)?,
            spent_amount: codec.decode(&self.spent_amount)?,
            period_type: BudgetPeriodType::parse(&self.period_type)?,
            budget_type: BudgetType::parse(&self.budget_type)?,
            status: BudgetStatus::parse(&self.status)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            period_start: self.period_start,
            period_end: self.period_end,
            currency_code: self.currency_code,
            percent_spent: self.percent_spent,
            closed_at: self.closed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// --- Wallet transfers ---

#[derive(Debug, FromRow)]
pub struct WalletTransferRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub source_currency: String,
    pub target_currency: String,
    pub source_amount: String,
    pub target_amount: String,
    pub exchange_rate: BigDecimal,
    pub executed_at: DateTime<Utc>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletTransfer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub source_currency: String,
    pub target_currency: String,
    pub source_amount: BigDecimal,
    pub target_amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub executed_at: DateTime<Utc>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransferRow {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<WalletTransfer, AppError> {
        Ok(WalletTransfer {
            source_amount: codec.decode(&self.source_amount)?,
            target_amount: codec.decode(&self.target_amount)?,
            id: self.id,
            user_id: self.user_id,
            from_wallet_id: self.from_wallet_id,
            to_wallet_id: self.to_wallet_id,
            source_currency: self.source_currency,
            target_currency: self.target_currency,
            exchange_rate: self.exchange_rate,
            executed_at: self.executed_at,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

// --- Exchange rates ---

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExchangeRate {
    pub id: Uuid,
    pub base_currency: String,
    pub target_currency: String,
    pub rate: BigDecimal,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
}

// --- Monthly analytics snapshots ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryBreakdown {
    pub category_id: Uuid,
    pub category_name: String,
    pub category_color: Option<String>,
    pub category_icon: Option<String>,
    pub amount: BigDecimal,
    pub percent: BigDecimal,
    pub transaction_count: i64,
}

impl CategoryBreakdown {
    pub fn into_record(self, codec: &AmountCodec) -> Result<CategoryBreakdownRecord, AppError> {
        Ok(CategoryBreakdownRecord {
            amount: codec.encode(&self.amount)?,
            category_id: self.category_id,
            category_name: self.category_name,
            category_color: self.category_color,
            category_icon: self.category_icon,
            percent: self.percent,
            transaction_count: self.transaction_count,
        })
    }
}

/// Stored form of a breakdown entry inside the snapshot JSONB; the amount
/// is ciphertext like every other monetary column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryBreakdownRecord {
    pub category_id: Uuid,
    pub category_name: String,
    pub category_color: Option<String>,
    pub category_icon: Option<String>,
    pub amount: String,
    pub percent: BigDecimal,
    pub transaction_count: i64,
}

impl CategoryBreakdownRecord {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<CategoryBreakdown, AppError> {
        Ok(CategoryBreakdown {
            amount: codec.decode(&self.amount)?,
            category_id: self.category_id,
            category_name: self.category_name,
            category_color: self.category_color,
            category_icon: self.category_icon,
            percent: self.percent,
            transaction_count: self.transaction_count,
        })
    }
}

/// Raw snapshot row; totals and breakdown amounts are ciphertext, the
/// cash-flow percent is a ratio and stays numeric.
#[derive(Debug, FromRow)]
pub struct MonthlyAnalyticsRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub currency_code: String,
    pub total_expense: String,
    pub total_income: String,
    pub cash_flow_amount: String,
    pub cash_flow_percent: BigDecimal,
    pub expense_breakdown: Json<Vec<CategoryBreakdownRecord>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyAnalytics {
    pub id: Uuid,
    pub user_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub currency_code: String,
    pub total_expense: BigDecimal,
    pub total_income: BigDecimal,
    pub cash_flow_amount: BigDecimal,
    pub cash_flow_percent: BigDecimal,
    pub expense_breakdown: Vec<CategoryBreakdown>,
    pub created_at: DateTime<Utc>,
}

impl MonthlyAnalyticsRow {
    pub fn into_domain(self, codec: &AmountCodec) -> Result<MonthlyAnalytics, AppError> {
        Ok(MonthlyAnalytics {
            total_expense: codec.decode(&self.total_expense)?,
            total_income: codec.decode(&self.total_income)?,
            cash_flow_amount: codec.decode(&self.cash_flow_amount)?,
            expense_breakdown: self
                .expense_breakdown
                .0
                .into_iter()
                .map(|record| record.into_domain(codec))
                .collect::<Result<Vec<_>, _>>()?,
            id: self.id,
            user_id: self.user_id,
            period_start: self.period_start,
            period_end: self.period_end,
            currency_code: self.currency_code,
            cash_flow_percent: self.cash_flow_percent,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_text() {
        assert_eq!(TransactionKind::parse("EXPENSE").unwrap(), TransactionKind::Expense);
        assert_eq!(TransactionKind::Income.as_str(), "INCOME");
        assert_eq!(DebtDirection::parse("BORROWED").unwrap(), DebtDirection::Borrowed);
        assert_eq!(BudgetPeriodType::parse("CUSTOM").unwrap(), BudgetPeriodType::Custom);
        assert_eq!(BudgetType::OneOff.as_str(), "ONE_OFF");
        assert!(TransactionKind::parse("TRANSFER").is_err());
    }

    #[test]
    fn serde_uses_wire_form() {
        let json = serde_json::to_string(&TransactionKind::Expense).unwrap();
        assert_eq!(json, "\"EXPENSE\"");
        let parsed: BudgetType = serde_json::from_str("\"ONE_OFF\"").unwrap();
        assert_eq!(parsed, BudgetType::OneOff);
    }
}
