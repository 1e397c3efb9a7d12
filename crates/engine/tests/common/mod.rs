#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use api_types::{
    ledger::{
        BudgetSummary, BudgetsResponse, CategoriesResponse, Category, CategoryGroup, Transaction,
        TransactionsCreated, TransactionsResponse,
    },
    splitwise::{Expense, ExpensesResponse, User},
};
use async_trait::async_trait;
use engine::{
    Context, EngineError, LedgerHint, Ledger, NamedProvider, TransactionProvider,
    ledger::TransactionsRequest,
    splitwise::{ExpensesRequest, SplitwiseApi},
};

pub const USER_ID: u64 = 456;
pub const ACCOUNT_ID: &str = "account-splitwise";
pub const BUDGET_ID: &str = "budget-1";
pub const GROCERIES_ID: &str = "category-groceries";

#[derive(Default)]
pub struct LedgerState {
    pub budgets: Vec<BudgetSummary>,
    pub default_budget: Option<BudgetSummary>,
    pub categories: Vec<Category>,
    pub transactions: Vec<Transaction>,
    pub transaction_requests: Vec<TransactionsRequest>,
    pub create_calls: usize,
}

/// In-memory ledger rejecting import ids it already stores.
#[derive(Clone, Default)]
pub struct FakeLedger {
    pub state: Arc<Mutex<LedgerState>>,
}

pub fn budget(id: &str) -> BudgetSummary {
    BudgetSummary {
        id: id.to_string(),
        name: format!("Budget {id}"),
        last_modified_on: None,
        currency_format: None,
    }
}

impl FakeLedger {
    /// One budget with a single "Groceries" category.
    pub fn new() -> Self {
        let ledger = Self::default();
        {
            let mut state = ledger.state.lock().unwrap();
            state.budgets = vec![budget(BUDGET_ID)];
            state.categories = vec![Category {
                id: GROCERIES_ID.to_string(),
                name: "Groceries".to_string(),
                ..Category::default()
            }];
        }
        ledger
    }

    pub fn stored(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().transactions.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn budgets(&self) -> Result<BudgetsResponse, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(BudgetsResponse {
            budgets: state.budgets.clone(),
            default_budget: state.default_budget.clone(),
        })
    }

    async fn categories(&self, _budget_id: &str) -> Result<CategoriesResponse, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(CategoriesResponse {
            category_groups: vec![CategoryGroup {
                id: "group-1".to_string(),
                name: "Everyday".to_string(),
                hidden: false,
                deleted: false,
                categories: state.categories.clone(),
            }],
        })
    }

    async fn transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<TransactionsResponse, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.transaction_requests.push(request.clone());
        let transactions = state
            .transactions
            .iter()
            .filter(|tx| {
                request
                    .account_id
                    .as_ref()
                    .is_none_or(|account_id| &tx.account_id == account_id)
            })
            .filter(|tx| request.since_date.is_none_or(|since| tx.date >= since))
            .cloned()
            .collect();
        Ok(TransactionsResponse { transactions })
    }

    async fn create_transactions(
        &self,
        _budget_id: &str,
        transactions: Vec<Transaction>,
    ) -> Result<TransactionsCreated, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;

        let mut created = TransactionsCreated::default();
        for tx in transactions {
            let duplicate = tx.import_id.as_ref().is_some_and(|import_id| {
                state
                    .transactions
                    .iter()
                    .any(|stored| stored.import_id.as_ref() == Some(import_id))
            });
            if duplicate {
                created
                    .duplicate_import_ids
                    .extend(tx.import_id.clone());
                continue;
            }
            created
                .transaction_ids
                .push(format!("tx-{}", state.transactions.len() + 1));
            created.transactions.push(tx.clone());
            state.transactions.push(tx);
        }
        Ok(created)
    }
}

/// Expense listing served from a fixture, one page at a time.
pub struct FakeSplitwise {
    pub expenses: Vec<Expense>,
    pub requests: Arc<Mutex<Vec<ExpensesRequest>>>,
}

pub fn fixture_expenses() -> Vec<Expense> {
    let body = include_str!("../fixtures/mock_expenses.json");
    let res: ExpensesResponse = serde_json::from_str(body).unwrap();
    res.expenses
}

impl FakeSplitwise {
    pub fn new(expenses: Vec<Expense>) -> Self {
        Self {
            expenses,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_fixture() -> Self {
        Self::new(fixture_expenses())
    }
}

#[async_trait]
impl SplitwiseApi for FakeSplitwise {
    async fn current_user(&self, _ctx: &Context) -> Result<User, EngineError> {
        Ok(User {
            id: USER_ID,
            first_name: "Sam".to_string(),
            last_name: None,
        })
    }

    async fn expenses(
        &self,
        _ctx: &Context,
        request: &ExpensesRequest,
    ) -> Result<Vec<Expense>, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self
            .expenses
            .iter()
            .filter(|e| {
                request
                    .dated_after
                    .is_none_or(|after| e.created_at.date_naive() > after)
            })
            .skip(request.offset)
            .take(request.limit)
            .cloned()
            .collect())
    }
}

/// Provider returning fixed transactions, or failing.
pub struct StaticProvider(pub Result<Vec<Transaction>, EngineError>);

#[async_trait]
impl TransactionProvider for StaticProvider {
    async fn transactions(
        &self,
        _ctx: &Context,
        _hint: &LedgerHint,
    ) -> Result<Vec<Transaction>, EngineError> {
        match &self.0 {
            Ok(transactions) => Ok(transactions.clone()),
            Err(err) => Err(EngineError::Configuration(err.to_string())),
        }
    }
}

pub fn named(name: &str, provider: impl TransactionProvider + 'static) -> NamedProvider {
    NamedProvider {
        name: name.to_string(),
        account_id: ACCOUNT_ID.to_string(),
        provider: Box::new(provider),
    }
}
