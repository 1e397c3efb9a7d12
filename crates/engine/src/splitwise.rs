//! Client side of the expense-splitting service.

use api_types::splitwise::{CurrentUserResponse, ErrorResponse, Expense, ExpensesResponse, User};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::{
    ApiError, Context, EngineError,
    http::execute,
    token::{Token, TokenSource},
};

pub const DEFAULT_SPLITWISE_URL: &str = "https://secure.splitwise.com/api/v3.0/";

/// One page of the expense listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpensesRequest {
    pub dated_after: Option<NaiveDate>,
    pub offset: usize,
    pub limit: usize,
}

#[async_trait]
pub trait SplitwiseApi: Send + Sync {
    async fn current_user(&self, ctx: &Context) -> Result<User, EngineError>;

    /// Returns one page of expenses; an empty page means there are no more.
    async fn expenses(
        &self,
        ctx: &Context,
        request: &ExpensesRequest,
    ) -> Result<Vec<Expense>, EngineError>;
}

/// REST client authenticated with a token obtained once per process.
pub struct SplitwiseClient {
    base_url: Url,
    http: reqwest::Client,
    token_source: Box<dyn TokenSource>,
    token: OnceCell<Token>,
}

impl SplitwiseClient {
    pub fn new(base_url: &str, token_source: Box<dyn TokenSource>) -> Result<Self, EngineError> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base_url)
            .map_err(|err| EngineError::Configuration(format!("invalid splitwise url: {err}")))?;
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            token_source,
            token: OnceCell::new(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, ctx: &Context, url: Url) -> Result<T, EngineError> {
        let token = self
            .token
            .get_or_try_init(|| self.token_source.token(ctx))
            .await?;

        let request = self
            .http
            .get(url)
            .bearer_auth(&token.access_token)
            .build()
            .map_err(ApiError::from)?;
        let res = ctx.run(execute(&self.http, request)).await?;

        if !res.status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&res.body)
                .ok()
                .and_then(|body| {
                    body.error
                        .or_else(|| body.errors.map(|errors| errors.to_string()))
                })
                .unwrap_or_else(|| "server error".to_string());
            return Err(ApiError::Server {
                status: res.status,
                message,
            }
            .into());
        }

        serde_json::from_slice(&res.body)
            .map_err(|err| ApiError::Decode(err.to_string()).into())
    }

    fn url(&self, path: &str) -> Result<Url, EngineError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Decode(format!("invalid path {path}: {err}")).into())
    }
}

#[async_trait]
impl SplitwiseApi for SplitwiseClient {
    async fn current_user(&self, ctx: &Context) -> Result<User, EngineError> {
        let url = self.url("get_current_user")?;
        let res: CurrentUserResponse = self.get(ctx, url).await?;
        Ok(res.user)
    }

    async fn expenses(
        &self,
        ctx: &Context,
        request: &ExpensesRequest,
    ) -> Result<Vec<Expense>, EngineError> {
        let mut url = self.url("get_expenses")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(dated_after) = request.dated_after {
                query.append_pair("dated_after", &dated_after.format("%Y-%m-%d").to_string());
            }
            query.append_pair("offset", &request.offset.to_string());
            if request.limit > 0 {
                query.append_pair("limit", &request.limit.to_string());
            }
        }
        let res: ExpensesResponse = self.get(ctx, url).await?;
        Ok(res.expenses)
    }
}
