use std::{path::Path, process::ExitCode, sync::Arc, time::Duration};

use engine::{
    CachingLedger, Context, EngineError, KeyedCache, LedgerClient, ProviderRegistry, SyncEngine,
    SyncReport, init_all,
};

mod settings;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CACHE_FILE: &str = "cache.json";

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load settings: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "budgetbridge={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let ctx = match settings.timeout_secs {
        Some(secs) => Context::new().with_timeout(Duration::from_secs(secs)),
        None => Context::new(),
    };
    let on_interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling...");
            on_interrupt.cancel();
        }
    });

    match run(settings, &ctx).await {
        Ok(report) => {
            tracing::info!(
                budget_id = %report.budget_id,
                candidates = report.candidates,
                created = report.created,
                duplicates = report.duplicates,
                failed = report.failed_providers.len(),
                "sync finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log_error(&*err);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: settings::Settings, ctx: &Context) -> Result<SyncReport, BoxError> {
    if settings.ledger.access_token.is_empty() {
        return Err(EngineError::Configuration("ledger.access_token is empty".to_string()).into());
    }

    let cache = Arc::new(open_cache(&settings.cache)?);
    let client = LedgerClient::new(&settings.ledger.base_url, &settings.ledger.access_token)?;
    let ledger = CachingLedger::new(client, cache.clone());

    let registry = ProviderRegistry::builtin()?;
    let configs = registry.resolve(settings.providers)?;
    if configs.is_empty() {
        tracing::warn!("no providers configured");
    }
    let providers = init_all(ctx, configs).await;

    let engine = SyncEngine::builder()
        .ledger(Box::new(ledger))
        .budget_id(settings.budget_id)
        .lookback_days(settings.lookback_days)
        .providers(providers)
        .since(settings.since)
        .dry_run(settings.dry_run)
        .build()?;

    let report = engine.run(ctx).await;
    let closed = cache.close();

    let report = report?;
    closed?;
    Ok(report)
}

fn open_cache(settings: &settings::Cache) -> Result<KeyedCache, BoxError> {
    match (&settings.dir, settings.categories) {
        (Some(dir), true) => {
            let path = Path::new(dir).join(CACHE_FILE);
            tracing::debug!(path = %path.display(), "opening cache");
            Ok(KeyedCache::open(path, settings.create_missing_dir)?)
        }
        _ => Ok(KeyedCache::in_memory()),
    }
}

fn log_error(err: &(dyn std::error::Error + 'static)) {
    tracing::error!("{err}");
    let mut source = err.source();
    while let Some(cause) = source {
        tracing::error!("caused by: {cause}");
        source = cause.source();
    }
}
