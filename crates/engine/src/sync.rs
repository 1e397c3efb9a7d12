//! One reconciliation pass from the providers into the ledger.

use std::collections::HashSet;

use api_types::ledger::{BudgetsResponse, Category, Transaction};
use chrono::{Days, NaiveDate, Utc};
use tracing::Instrument;

use crate::{
    Context, EngineError, Milliunits,
    ledger::{Ledger, TransactionsRequest, flatten_categories},
    provider::{LedgerHint, NamedProvider},
};

pub const DEFAULT_LOOKBACK_DAYS: u64 = 30;

/// Outcome of [`SyncEngine::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub budget_id: String,
    /// Transactions collected from all providers.
    pub candidates: usize,
    pub created: usize,
    /// Import ids the ledger already knew.
    pub duplicates: usize,
    /// Providers whose contribution was skipped.
    pub failed_providers: Vec<String>,
    pub dry_run: bool,
}

pub struct SyncEngine {
    ledger: Box<dyn Ledger>,
    budget_id: Option<String>,
    lookback_days: u64,
    providers: Vec<NamedProvider>,
    since: Option<NaiveDate>,
    today: Option<NaiveDate>,
    dry_run: bool,
}

impl SyncEngine {
    /// Return a builder for `SyncEngine`.
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    pub async fn run(&self, ctx: &Context) -> Result<SyncReport, EngineError> {
        let span = tracing::info_span!("sync", dry_run = self.dry_run);
        self.run_inner(ctx).instrument(span).await
    }

    async fn run_inner(&self, ctx: &Context) -> Result<SyncReport, EngineError> {
        let budget_id = match &self.budget_id {
            Some(budget_id) => budget_id.clone(),
            None => resolve_budget(ctx.run(self.ledger.budgets()).await?)?,
        };
        tracing::info!(budget_id = %budget_id, "syncing budget");

        let categories = flatten_categories(ctx.run(self.ledger.categories(&budget_id)).await?);
        tracing::debug!(count = categories.len(), "loaded ledger categories");

        let mut report = SyncReport {
            budget_id: budget_id.clone(),
            dry_run: self.dry_run,
            ..SyncReport::default()
        };
        let mut aggregate = Vec::new();

        for named in &self.providers {
            let span = tracing::info_span!("provider", name = %named.name);
            let res = self
                .collect(ctx, &budget_id, named, &categories)
                .instrument(span)
                .await;
            match res {
                Ok(transactions) => aggregate.extend(transactions),
                Err(err @ (EngineError::Cancelled | EngineError::DeadlineExceeded)) => {
                    return Err(err);
                }
                Err(err) => {
                    tracing::error!(provider = %named.name, "provider failed, skipping: {err}");
                    report.failed_providers.push(named.name.clone());
                }
            }
        }
        report.candidates = aggregate.len();

        if self.dry_run {
            for tx in &aggregate {
                log_candidate(tx, &categories);
            }
            tracing::info!(candidates = report.candidates, "dry run, nothing submitted");
            return Ok(report);
        }

        if aggregate.is_empty() {
            tracing::info!("no transactions to submit");
            return Ok(report);
        }

        let created = ctx
            .run(self.ledger.create_transactions(&budget_id, aggregate))
            .await?;
        for tx in &created.transactions {
            tracing::debug!(
                date = %tx.date,
                amount = %Milliunits::new(tx.amount),
                memo = tx.memo.as_deref().unwrap_or_default(),
                "created transaction"
            );
        }
        report.created = created.transaction_ids.len().max(created.transactions.len());
        report.duplicates = created.duplicate_import_ids.len();
        tracing::info!(
            created = report.created,
            duplicates = report.duplicates,
            "submitted transactions"
        );

        Ok(report)
    }

    /// Runs one provider and stamps its transactions with the account id.
    async fn collect(
        &self,
        ctx: &Context,
        budget_id: &str,
        named: &NamedProvider,
        categories: &[Category],
    ) -> Result<Vec<Transaction>, EngineError> {
        let since = match self.since {
            Some(since) => since,
            None => self.since_hint(ctx, budget_id, &named.account_id).await?,
        };
        tracing::debug!(%since, "fetching transactions");

        let hint = LedgerHint {
            since,
            categories: categories.to_vec(),
        };
        let mut transactions = named.provider.transactions(ctx, &hint).await?;

        let known: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();
        for tx in &mut transactions {
            tx.account_id = named.account_id.clone();
            if let Some(category_id) = &tx.category_id
                && !known.contains(category_id.as_str())
            {
                tracing::warn!(category_id = %category_id, "dropping unknown category");
                tx.category_id = None;
            }
        }
        tracing::info!(count = transactions.len(), "provider returned transactions");

        Ok(transactions)
    }

    /// Earliest date of the account's recent ledger transactions, or the
    /// start of the lookback window when there are none.
    async fn since_hint(
        &self,
        ctx: &Context,
        budget_id: &str,
        account_id: &str,
    ) -> Result<NaiveDate, EngineError> {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let window_start = today
            .checked_sub_days(Days::new(self.lookback_days))
            .unwrap_or(today);

        let request = TransactionsRequest {
            budget_id: budget_id.to_string(),
            account_id: Some(account_id.to_string()),
            since_date: Some(window_start),
        };
        let existing = ctx.run(self.ledger.transactions(&request)).await?;

        Ok(existing
            .transactions
            .iter()
            .map(|tx| tx.date)
            .min()
            .unwrap_or(window_start))
    }
}

/// Picks the only budget, or the default one when there are several.
fn resolve_budget(response: BudgetsResponse) -> Result<String, EngineError> {
    if let [budget] = response.budgets.as_slice() {
        return Ok(budget.id.clone());
    }
    response
        .default_budget
        .map(|budget| budget.id)
        .ok_or(EngineError::NoDefaultBudget)
}

fn log_candidate(tx: &Transaction, categories: &[Category]) {
    let category = tx
        .category_id
        .as_deref()
        .and_then(|id| categories.iter().find(|c| c.id == id))
        .map(|c| c.name.as_str())
        .unwrap_or_default();
    tracing::info!(
        date = %tx.date,
        memo = tx.memo.as_deref().unwrap_or_default(),
        amount = %Milliunits::new(tx.amount),
        payee = tx.payee_name.as_deref().unwrap_or_default(),
        import_id = tx.import_id.as_deref().unwrap_or_default(),
        category_id = tx.category_id.as_deref().unwrap_or_default(),
        category,
        "would create transaction"
    );
}

pub struct SyncEngineBuilder {
    ledger: Option<Box<dyn Ledger>>,
    budget_id: Option<String>,
    lookback_days: u64,
    providers: Vec<NamedProvider>,
    since: Option<NaiveDate>,
    today: Option<NaiveDate>,
    dry_run: bool,
}

impl Default for SyncEngineBuilder {
    fn default() -> Self {
        Self {
            ledger: None,
            budget_id: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            providers: Vec::new(),
            since: None,
            today: None,
            dry_run: false,
        }
    }
}

impl SyncEngineBuilder {
    /// Pass the required ledger
    pub fn ledger(mut self, ledger: Box<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Budget to sync into. Resolved from the ledger when unset or empty.
    pub fn budget_id(mut self, budget_id: Option<String>) -> Self {
        self.budget_id = budget_id.filter(|id| !id.is_empty());
        self
    }

    pub fn lookback_days(mut self, days: u64) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn provider(mut self, provider: NamedProvider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = NamedProvider>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Overrides the since hint of every provider.
    pub fn since(mut self, since: Option<NaiveDate>) -> Self {
        self.since = since;
        self
    }

    /// Fixes the current day the lookback window is computed from.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Construct `SyncEngine`
    pub fn build(self) -> Result<SyncEngine, EngineError> {
        let ledger = self
            .ledger
            .ok_or_else(|| EngineError::Configuration("missing ledger".to_string()))?;
        Ok(SyncEngine {
            ledger,
            budget_id: self.budget_id,
            lookback_days: self.lookback_days,
            providers: self.providers,
            since: self.since,
            today: self.today,
            dry_run: self.dry_run,
        })
    }
}
