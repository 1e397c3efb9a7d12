//! Pluggable sources of ledger transactions.
//!
//! A provider is declared in the settings by the name it was registered
//! under. The [`ProviderRegistry`] maps that name to a constructor that
//! deserializes the provider's options; the options then build the
//! [`TransactionProvider`] itself, which may talk to the network.

use std::collections::HashMap;

use api_types::ledger::{Category, Transaction};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Context, EngineError};

pub mod splitwise;

/// What the ledger tells a provider before it fetches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerHint {
    /// Fetch transactions since this day. Providers may widen the window.
    pub since: NaiveDate,
    /// Every category of the target budget.
    pub categories: Vec<Category>,
}

/// Loads the latest transactions from one source.
///
/// A provider that sets categories must only use ids found in
/// [`LedgerHint::categories`]; it may leave the category unset.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn transactions(
        &self,
        ctx: &Context,
        hint: &LedgerHint,
    ) -> Result<Vec<Transaction>, EngineError>;
}

/// Options of a provider, deserialized from the settings.
#[async_trait]
pub trait NewProvider: Send + Sync {
    async fn new_provider(&self, ctx: &Context) -> Result<Box<dyn TransactionProvider>, EngineError>;
}

type Constructor = Box<dyn Fn(Value) -> Result<Box<dyn NewProvider>, EngineError> + Send + Sync>;

/// Provider options resolved from the settings, not yet constructed.
pub struct ProviderConfig {
    pub name: String,
    /// Ledger account the transactions of this provider are created in.
    pub account_id: String,
    pub options: Box<dyn NewProvider>,
}

/// A constructed provider bound to its ledger account.
pub struct NamedProvider {
    pub name: String,
    pub account_id: String,
    pub provider: Box<dyn TransactionProvider>,
}

#[derive(Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every provider shipped with the engine.
    pub fn builtin() -> Result<Self, EngineError> {
        let mut registry = Self::new();
        registry.register::<splitwise::SplitwiseOptions>("splitwise")?;
        Ok(registry)
    }

    /// Registers `T` as the options type of the provider called `name`.
    pub fn register<T>(&mut self, name: &str) -> Result<(), EngineError>
    where
        T: NewProvider + DeserializeOwned + 'static,
    {
        self.register_with(name, |value| {
            let options: T = serde_json::from_value(value)?;
            Ok(Box::new(options) as Box<dyn NewProvider>)
        })
    }

    /// Registers an explicit constructor for the provider called `name`.
    pub fn register_with<F>(&mut self, name: &str, constructor: F) -> Result<(), EngineError>
    where
        F: Fn(Value) -> Result<Box<dyn NewProvider>, EngineError> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(name) {
            return Err(EngineError::Configuration(format!(
                "the name '{name}' is already registered"
            )));
        }
        self.constructors
            .insert(name.to_string(), Box::new(constructor));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Resolves the provider tables of the settings, keeping their order.
    ///
    /// Each table needs an `account_id`; the remaining keys are the options
    /// of the provider. Unknown names and invalid options fail here, before
    /// any network activity.
    pub fn resolve(
        &self,
        providers: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Vec<ProviderConfig>, EngineError> {
        providers
            .into_iter()
            .map(|(name, value)| self.resolve_one(name, value))
            .collect()
    }

    fn resolve_one(&self, name: String, value: Value) -> Result<ProviderConfig, EngineError> {
        let constructor = self
            .constructors
            .get(&name)
            .ok_or_else(|| EngineError::Configuration(format!("unknown provider '{name}'")))?;

        let Value::Object(mut table) = value else {
            return Err(EngineError::Configuration(format!(
                "provider '{name}' must be a table"
            )));
        };
        let account_id = match table.remove("account_id") {
            Some(Value::String(account_id)) if !account_id.is_empty() => account_id,
            _ => {
                return Err(EngineError::Configuration(format!(
                    "provider '{name}' is missing account_id"
                )));
            }
        };

        let options = constructor(Value::Object(table)).map_err(|err| match err {
            EngineError::Configuration(msg) => {
                EngineError::Configuration(format!("provider '{name}': {msg}"))
            }
            EngineError::Json(err) => {
                EngineError::Configuration(format!("provider '{name}': {err}"))
            }
            other => other,
        })?;

        Ok(ProviderConfig {
            name,
            account_id,
            options,
        })
    }
}

/// Constructs every configured provider in order.
///
/// A provider that fails to initialize is logged and left out; the others
/// still run.
pub async fn init_all(ctx: &Context, configs: Vec<ProviderConfig>) -> Vec<NamedProvider> {
    let mut providers = Vec::with_capacity(configs.len());
    for config in configs {
        tracing::debug!(provider = %config.name, "initialize provider");
        match config.options.new_provider(ctx).await {
            Ok(provider) => providers.push(NamedProvider {
                name: config.name,
                account_id: config.account_id,
                provider,
            }),
            Err(err) => {
                tracing::error!(provider = %config.name, "initialize failed: {err}");
            }
        }
    }
    providers
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct StaticOptions {
        memo: String,
        #[serde(default)]
        fail: bool,
    }

    struct StaticProvider {
        memo: String,
    }

    #[async_trait]
    impl TransactionProvider for StaticProvider {
        async fn transactions(
            &self,
            _ctx: &Context,
            hint: &LedgerHint,
        ) -> Result<Vec<Transaction>, EngineError> {
            Ok(vec![Transaction {
                date: hint.since,
                memo: Some(self.memo.clone()),
                ..Transaction::default()
            }])
        }
    }

    #[async_trait]
    impl NewProvider for StaticOptions {
        async fn new_provider(
            &self,
            _ctx: &Context,
        ) -> Result<Box<dyn TransactionProvider>, EngineError> {
            if self.fail {
                return Err(EngineError::Authorization("denied".to_string()));
            }
            Ok(Box::new(StaticProvider {
                memo: self.memo.clone(),
            }))
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register::<StaticOptions>("static").unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        let err = registry.register::<StaticOptions>("static").unwrap_err();
        assert_eq!(
            err,
            EngineError::Configuration("the name 'static' is already registered".to_string())
        );
    }

    #[test]
    fn builtin_registry_knows_splitwise() {
        assert!(ProviderRegistry::builtin().unwrap().contains("splitwise"));
    }

    #[test]
    fn unknown_provider_fails_resolution() {
        let err = registry()
            .resolve([("paypal".to_string(), json!({ "account_id": "a" }))])
            .err()
            .unwrap();
        assert_eq!(
            err,
            EngineError::Configuration("unknown provider 'paypal'".to_string())
        );
    }

    #[test]
    fn missing_account_id_fails_resolution() {
        let err = registry()
            .resolve([("static".to_string(), json!({ "memo": "m" }))])
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Configuration(msg) if msg.contains("account_id")));
    }

    #[test]
    fn invalid_options_fail_resolution() {
        let err = registry()
            .resolve([("static".to_string(), json!({ "account_id": "a", "memo": 3 }))])
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Configuration(msg) if msg.starts_with("provider 'static'")));
    }

    #[tokio::test]
    async fn resolved_providers_keep_order_and_skip_failures() {
        let mut registry = registry();
        registry
            .register_with("other", |value| {
                let options: StaticOptions = serde_json::from_value(value)?;
                Ok(Box::new(options) as Box<dyn NewProvider>)
            })
            .unwrap();

        let configs = registry
            .resolve([
                (
                    "other".to_string(),
                    json!({ "account_id": "acc-2", "memo": "second" }),
                ),
                (
                    "static".to_string(),
                    json!({ "account_id": "acc-1", "memo": "first", "fail": true }),
                ),
            ])
            .unwrap();
        assert_eq!(configs[0].name, "other");
        assert_eq!(configs[1].account_id, "acc-1");

        let ctx = Context::new();
        let providers = init_all(&ctx, configs).await;
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "other");
        assert_eq!(providers[0].account_id, "acc-2");

        let hint = LedgerHint::default();
        let txs = providers[0].provider.transactions(&ctx, &hint).await.unwrap();
        assert_eq!(txs[0].memo.as_deref(), Some("second"));
    }
}
