//! Client side of the budgeting ledger.
//!
//! [`Ledger`] is the logical surface the sync engine consumes. [`LedgerClient`]
//! speaks the REST API; [`CachingLedger`] keeps budgets and categories in a
//! [`KeyedCache`] so later runs do not fetch them again.

use std::sync::Arc;

use api_types::ledger::{
    BudgetsResponse, CategoriesResponse, Category, CreateTransactions, Envelope, Transaction,
    TransactionsCreated, TransactionsResponse,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, Url};
use serde::{Serialize, de::DeserializeOwned};

use crate::{ApiError, EngineError, KeyedCache, http::execute};

pub const DEFAULT_LEDGER_URL: &str = "https://api.ynab.com/v1/";

/// Filter for [`Ledger::transactions`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionsRequest {
    pub budget_id: String,
    /// Restricts the listing to one account.
    pub account_id: Option<String>,
    /// Only transactions dated on or after this day.
    pub since_date: Option<NaiveDate>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn budgets(&self) -> Result<BudgetsResponse, EngineError>;

    async fn categories(&self, budget_id: &str) -> Result<CategoriesResponse, EngineError>;

    async fn transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<TransactionsResponse, EngineError>;

    /// Creates all `transactions` in one call. The ledger skips those whose
    /// import id it already knows and reports them as duplicates.
    async fn create_transactions(
        &self,
        budget_id: &str,
        transactions: Vec<Transaction>,
    ) -> Result<TransactionsCreated, EngineError>;
}

/// Flattens the category groups into the list of usable categories.
///
/// Deleted groups and deleted categories are left out.
pub fn flatten_categories(response: CategoriesResponse) -> Vec<Category> {
    response
        .category_groups
        .into_iter()
        .filter(|group| !group.deleted)
        .flat_map(|group| group.categories)
        .filter(|category| !category.deleted)
        .collect()
}

/// REST client of the ledger, authenticated with a personal access token.
#[derive(Clone, Debug)]
pub struct LedgerClient {
    base_url: Url,
    access_token: String,
    http: reqwest::Client,
}

impl LedgerClient {
    pub fn new(base_url: &str, access_token: &str) -> Result<Self, EngineError> {
        // `Url::join` drops the last segment unless the base ends with '/'.
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base_url)
            .map_err(|err| EngineError::Configuration(format!("invalid ledger url: {err}")))?;
        Ok(Self {
            base_url,
            access_token: access_token.to_string(),
            http: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Decode(format!("invalid path {path}: {err}")))
    }

    async fn request<TReq: Serialize + ?Sized, TResp: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&TReq>,
    ) -> Result<TResp, ApiError> {
        let mut req = self
            .http
            .request(method, url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = execute(&self.http, req.build()?).await?;
        let envelope = serde_json::from_slice::<Envelope<TResp>>(&res.body);

        match envelope {
            Ok(Envelope {
                error: Some(error), ..
            }) => Err(ApiError::Server {
                status: res.status,
                message: format!("{} ({})", error.detail, error.name),
            }),
            Ok(Envelope {
                data: Some(data), ..
            }) if res.status.is_success() => Ok(data),
            Ok(_) if !res.status.is_success() => Err(ApiError::Server {
                status: res.status,
                message: res.text(),
            }),
            Ok(_) => Err(ApiError::Decode("response without data".to_string())),
            Err(_) if !res.status.is_success() => Err(ApiError::Server {
                status: res.status,
                message: res.text(),
            }),
            Err(err) => Err(ApiError::Decode(err.to_string())),
        }
    }

    async fn get<TResp: DeserializeOwned>(&self, url: Url) -> Result<TResp, ApiError> {
        self.request::<(), TResp>(Method::GET, url, None).await
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn budgets(&self) -> Result<BudgetsResponse, EngineError> {
        let url = self.url("budgets")?;
        Ok(self.get(url).await?)
    }

    async fn categories(&self, budget_id: &str) -> Result<CategoriesResponse, EngineError> {
        let url = self.url(&format!("budgets/{budget_id}/categories"))?;
        Ok(self.get(url).await?)
    }

    async fn transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<TransactionsResponse, EngineError> {
        if request.budget_id.is_empty() {
            return Err(EngineError::Configuration("missing budget id".to_string()));
        }
        let path = match &request.account_id {
            Some(account_id) => format!(
                "budgets/{}/accounts/{account_id}/transactions",
                request.budget_id
            ),
            None => format!("budgets/{}/transactions", request.budget_id),
        };
        let mut url = self.url(&path)?;
        if let Some(since) = request.since_date {
            url.query_pairs_mut()
                .append_pair("since_date", &since.format("%Y-%m-%d").to_string());
        }
        Ok(self.get(url).await?)
    }

    async fn create_transactions(
        &self,
        budget_id: &str,
        transactions: Vec<Transaction>,
    ) -> Result<TransactionsCreated, EngineError> {
        let url = self.url(&format!("budgets/{budget_id}/transactions"))?;
        let body = CreateTransactions { transactions };
        Ok(self.request(Method::POST, url, Some(&body)).await?)
    }
}

/// Ledger whose budgets and categories go through a [`KeyedCache`].
///
/// Transactions are never cached.
pub struct CachingLedger<L> {
    inner: L,
    cache: Arc<KeyedCache>,
}

impl<L: Ledger> CachingLedger<L> {
    pub fn new(inner: L, cache: Arc<KeyedCache>) -> Self {
        Self { inner, cache }
    }
}

pub fn categories_key(budget_id: &str) -> String {
    format!("categories/{budget_id}")
}

pub const BUDGETS_KEY: &str = "budgets";

#[async_trait]
impl<L: Ledger> Ledger for CachingLedger<L> {
    async fn budgets(&self) -> Result<BudgetsResponse, EngineError> {
        self.cache
            .fetch_or_cache(BUDGETS_KEY, || self.inner.budgets())
            .await
    }

    async fn categories(&self, budget_id: &str) -> Result<CategoriesResponse, EngineError> {
        self.cache
            .fetch_or_cache(&categories_key(budget_id), || {
                self.inner.categories(budget_id)
            })
            .await
    }

    async fn transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<TransactionsResponse, EngineError> {
        self.inner.transactions(request).await
    }

    async fn create_transactions(
        &self,
        budget_id: &str,
        transactions: Vec<Transaction>,
    ) -> Result<TransactionsCreated, EngineError> {
        self.inner.create_transactions(budget_id, transactions).await
    }
}
