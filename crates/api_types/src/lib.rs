use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Types of the budgeting ledger API (YNAB v1 wire format).
///
/// Amounts are integer milliunits: 1 currency unit = 1000 milliunits.
pub mod ledger {
    use super::*;

    /// Error body returned by the ledger inside the `error` envelope.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ApiErrorBody {
        pub id: String,
        pub name: String,
        pub detail: String,
    }

    /// Every ledger response is wrapped either in `data` or in `error`.
    #[derive(Debug, Deserialize)]
    pub struct Envelope<T> {
        pub data: Option<T>,
        pub error: Option<ApiErrorBody>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BudgetsResponse {
        pub budgets: Vec<BudgetSummary>,
        #[serde(default)]
        pub default_budget: Option<BudgetSummary>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BudgetSummary {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub last_modified_on: Option<DateTime<Utc>>,
        #[serde(default)]
        pub currency_format: Option<CurrencyFormat>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CurrencyFormat {
        pub iso_code: String,
        pub decimal_digits: u8,
        pub decimal_separator: String,
        pub currency_symbol: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CategoriesResponse {
        pub category_groups: Vec<CategoryGroup>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CategoryGroup {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub hidden: bool,
        #[serde(default)]
        pub deleted: bool,
        #[serde(default)]
        pub categories: Vec<Category>,
    }

    /// A ledger category. The id is assigned by the ledger and stable; the
    /// name is human readable and may collide across groups.
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Category {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub category_group_id: Option<String>,
        #[serde(default)]
        pub hidden: bool,
        #[serde(default)]
        pub deleted: bool,
    }

    /// Transaction as sent to and returned by the ledger.
    ///
    /// Sign convention for `amount`: negative is an outflow owed by the
    /// user, positive an inflow owed to the user.
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Transaction {
        #[serde(default)]
        pub account_id: String,
        pub date: NaiveDate,
        pub amount: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub payee_id: Option<String>,
        #[serde(default)]
        pub payee_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub category_id: Option<String>,
        #[serde(default)]
        pub memo: Option<String>,
        /// Stable external identifier used by the ledger to drop duplicates.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub import_id: Option<String>,
        #[serde(default)]
        pub approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub flag_color: Option<String>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionsResponse {
        pub transactions: Vec<Transaction>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CreateTransactions {
        pub transactions: Vec<Transaction>,
    }

    /// Result of a batch creation. Import ids already known to the ledger are
    /// rejected and listed in `duplicate_import_ids`.
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionsCreated {
        #[serde(default)]
        pub transaction_ids: Vec<String>,
        #[serde(default)]
        pub transactions: Vec<Transaction>,
        #[serde(default)]
        pub duplicate_import_ids: Vec<String>,
    }
}

/// Types of the expense-splitting service API (Splitwise v3.0 wire format).
pub mod splitwise {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct User {
        pub id: u64,
        pub first_name: String,
        #[serde(default)]
        pub last_name: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct CurrentUserResponse {
        pub user: User,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Category {
        pub id: u64,
        pub name: String,
    }

    /// A participant of an expense with their shares as decimal strings.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ExpenseUser {
        pub user_id: u64,
        pub user: User,
        pub net_balance: String,
        #[serde(default)]
        pub owed_share: Option<String>,
        #[serde(default)]
        pub paid_share: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Expense {
        pub id: u64,
        pub created_at: DateTime<Utc>,
        #[serde(default)]
        pub updated_at: Option<DateTime<Utc>>,
        /// Set when the expense was soft-deleted.
        #[serde(default)]
        pub deleted_at: Option<DateTime<Utc>>,
        #[serde(default)]
        pub category: Category,
        #[serde(default)]
        pub cost: Option<String>,
        pub description: String,
        pub users: Vec<ExpenseUser>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ExpensesResponse {
        #[serde(default)]
        pub expenses: Vec<Expense>,
    }

    /// Error body the service returns on failures.
    #[derive(Debug, Deserialize)]
    pub struct ErrorResponse {
        #[serde(default)]
        pub error: Option<String>,
        #[serde(default)]
        pub errors: Option<serde_json::Value>,
    }
}
