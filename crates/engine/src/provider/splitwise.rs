//! Provider turning shared expenses into ledger transactions.

use std::time::Duration;

use api_types::{
    ledger::{Category, Transaction},
    splitwise::{Expense, ExpenseUser},
};
use async_trait::async_trait;
use chrono::Days;
use serde::{Deserialize, Serialize};

use super::{LedgerHint, NewProvider, TransactionProvider};
use crate::{
    Context, EngineError, Milliunits,
    auth::{LocalServerTokenSource, OAuthConfig, callback_addr},
    categories::CategoryMapping,
    splitwise::{DEFAULT_SPLITWISE_URL, ExpensesRequest, SplitwiseApi, SplitwiseClient},
    token::CachingTokenSource,
};

/// Days fetched before the hint, for expenses entered late.
pub const LOOKBEHIND_DAYS: u64 = 7;
pub const PAGE_SIZE: usize = 100;

fn default_token_cache() -> String {
    ".splitwise.token".to_string()
}

fn default_redirect_port() -> u16 {
    4000
}

fn default_auth_timeout_secs() -> u64 {
    300
}

/// Settings of the `splitwise` provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitwiseOptions {
    /// Acting user. Looked up through the API when unset.
    #[serde(default)]
    pub user_id: Option<u64>,
    pub client_key: String,
    pub client_secret: String,
    #[serde(default = "default_token_cache")]
    pub token_cache: String,
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub categories: CategoryMapping,
}

#[async_trait]
impl NewProvider for SplitwiseOptions {
    async fn new_provider(&self, ctx: &Context) -> Result<Box<dyn TransactionProvider>, EngineError> {
        if self.client_key.is_empty() || self.client_secret.is_empty() {
            return Err(EngineError::Configuration(
                "splitwise client_key and client_secret are required".to_string(),
            ));
        }

        let config = OAuthConfig::splitwise(&self.client_key, &self.client_secret, self.redirect_port);
        let addr = callback_addr(self.redirect_port);
        let token_source = CachingTokenSource::new(
            Box::new(LocalServerTokenSource::new(
                config,
                addr,
                Duration::from_secs(self.auth_timeout_secs),
            )),
            &self.token_cache,
        );
        let client = SplitwiseClient::new(
            self.base_url.as_deref().unwrap_or(DEFAULT_SPLITWISE_URL),
            Box::new(token_source),
        )?;

        let user_id = match self.user_id {
            Some(user_id) => user_id,
            None => {
                let user = client.current_user(ctx).await?;
                tracing::debug!(user_id = user.id, "resolved current user");
                user.id
            }
        };

        Ok(Box::new(SplitwiseProvider::new(
            user_id,
            Box::new(client),
            self.categories.clone(),
        )))
    }
}

pub struct SplitwiseProvider {
    user_id: u64,
    client: Box<dyn SplitwiseApi>,
    categories: CategoryMapping,
    page_size: usize,
}

impl SplitwiseProvider {
    pub fn new(user_id: u64, client: Box<dyn SplitwiseApi>, categories: CategoryMapping) -> Self {
        Self {
            user_id,
            client,
            categories,
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Builds the transaction of one expense, `None` when it does not
    /// concern the acting user.
    fn convert(
        &self,
        expense: &Expense,
        categories: &[Category],
    ) -> Result<Option<Transaction>, EngineError> {
        let (user, others) = partition_users(&expense.users, self.user_id);
        let Some(user) = user else {
            tracing::warn!(expense_id = expense.id, "expense without the acting user, skipping");
            return Ok(None);
        };
        if others.len() > 1 {
            return Err(EngineError::NotImplemented(format!(
                "expense {} is split between {} people",
                expense.id,
                others.len() + 1
            )));
        }
        let Some(other) = others.first() else {
            tracing::warn!(expense_id = expense.id, "expense without counterparty, skipping");
            return Ok(None);
        };

        let amount = -Milliunits::from_balance(&user.net_balance)?;
        let category_id = self
            .categories
            .categorize(categories, &expense.category.name)
            .map(str::to_string);

        Ok(Some(Transaction {
            date: expense.created_at.date_naive(),
            amount: amount.milliunits(),
            payee_name: Some(other.user.first_name.clone()),
            category_id,
            memo: Some(expense.description.clone()),
            import_id: Some(expense.id.to_string()),
            approved: false,
            ..Transaction::default()
        }))
    }
}

fn partition_users(users: &[ExpenseUser], user_id: u64) -> (Option<&ExpenseUser>, Vec<&ExpenseUser>) {
    let mut user = None;
    let mut others = Vec::new();
    for u in users {
        if u.user_id == user_id {
            user = Some(u);
        } else {
            others.push(u);
        }
    }
    (user, others)
}

#[async_trait]
impl TransactionProvider for SplitwiseProvider {
    async fn transactions(
        &self,
        ctx: &Context,
        hint: &LedgerHint,
    ) -> Result<Vec<Transaction>, EngineError> {
        let dated_after = hint
            .since
            .checked_sub_days(Days::new(LOOKBEHIND_DAYS))
            .unwrap_or(hint.since);

        let mut transactions = Vec::new();
        let mut offset = 0;
        loop {
            let request = ExpensesRequest {
                dated_after: Some(dated_after),
                offset,
                limit: self.page_size,
            };
            let page = self.client.expenses(ctx, &request).await?;
            tracing::debug!(offset, count = page.len(), "fetched expenses page");
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for expense in page.iter().filter(|e| e.deleted_at.is_none()) {
                if let Some(tx) = self.convert(expense, &hint.categories)? {
                    transactions.push(tx);
                }
            }
        }

        Ok(transactions)
    }
}
