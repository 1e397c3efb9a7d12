//! Reconciles shared expenses into a budgeting ledger.
//!
//! A [`SyncEngine`] resolves the target budget, asks every configured
//! provider for the transactions it knows since a hint derived from the
//! ledger's own history, and creates them in one batch. The ledger drops
//! transactions whose import id it has already seen, so running a sync
//! twice creates nothing the second time.

pub use cache::KeyedCache;
pub use categories::{CategoryMapping, CategoryMappingEntry, CategorySpec};
pub use context::Context;
pub use error::{ApiError, CacheError, EngineError};
pub use ledger::{CachingLedger, Ledger, LedgerClient};
pub use money::Milliunits;
pub use provider::{
    LedgerHint, NamedProvider, NewProvider, ProviderConfig, ProviderRegistry, TransactionProvider,
    init_all,
};
pub use sync::{SyncEngine, SyncEngineBuilder, SyncReport};
pub use token::{CachingTokenSource, StaticTokenSource, Token, TokenSource};

pub mod auth;
mod cache;
mod categories;
mod context;
mod error;
mod http;
pub mod ledger;
mod money;
pub mod provider;
pub mod splitwise;
mod sync;
mod token;
