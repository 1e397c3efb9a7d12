//! OAuth tokens and the sources that produce them.

use std::{fs, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Context, EngineError};

/// OAuth token as returned by the token endpoint.
///
/// Fields the engine does not know about are kept in `extra` so a persisted
/// token is written back verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
            extra: Map::new(),
        }
    }
}

/// Something able to hand out a token, possibly by asking the user.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, ctx: &Context) -> Result<Token, EngineError>;
}

/// A fixed token, e.g. a personal access token from the settings.
#[derive(Clone, Debug)]
pub struct StaticTokenSource(Token);

impl StaticTokenSource {
    pub fn new(token: Token) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self, _ctx: &Context) -> Result<Token, EngineError> {
        Ok(self.0.clone())
    }
}

/// Persists the token of an inner source to a file and serves it on
/// subsequent runs without asking the inner source again.
///
/// The persisted token is returned as is: its expiry is never checked.
pub struct CachingTokenSource {
    inner: Box<dyn TokenSource>,
    path: PathBuf,
}

impl CachingTokenSource {
    pub fn new(inner: Box<dyn TokenSource>, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }

    fn get(&self) -> Result<Option<Token>, EngineError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&self, token: &Token) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(token)?)?;
        Ok(())
    }
}

#[async_trait]
impl TokenSource for CachingTokenSource {
    async fn token(&self, ctx: &Context) -> Result<Token, EngineError> {
        if let Some(token) = self.get()? {
            tracing::debug!(path = %self.path.display(), "using persisted token");
            return Ok(token);
        }

        let token = self.inner.token(ctx).await?;
        self.put(&token)?;
        tracing::info!(path = %self.path.display(), "token persisted");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn token(&self, _ctx: &Context) -> Result<Token, EngineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Token::bearer(format!("token-{n}")))
        }
    }

    fn caching(path: PathBuf) -> (CachingTokenSource, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CachingTokenSource::new(
            Box::new(CountingSource {
                calls: calls.clone(),
            }),
            path,
        );
        (source, calls)
    }

    #[tokio::test]
    async fn asks_inner_source_once_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splitwise.token");
        let ctx = Context::new();

        let (first_run, calls) = caching(path.clone());
        assert_eq!(first_run.token(&ctx).await.unwrap().access_token, "token-0");
        assert!(path.is_file());

        let (second_run, second_calls) = caching(path);
        assert_eq!(second_run.token(&ctx).await.unwrap().access_token, "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_is_returned_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"access_token":"old","token_type":"bearer","expiry":"2001-01-01T00:00:00Z","scope":"all"}"#,
        )
        .unwrap();

        let (source, calls) = caching(path.clone());
        let token = source.token(&Context::new()).await.unwrap();
        assert_eq!(token.access_token, "old");
        assert_eq!(token.extra.get("scope"), Some(&Value::from("all")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_token_is_an_error_not_a_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "garbage").unwrap();

        let (source, calls) = caching(path);
        let err = source.token(&Context::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Json(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn token_round_trips_unknown_fields() {
        let raw = r#"{"access_token":"a","token_type":"bearer","expires_in":3600}"#;
        let token: Token = serde_json::from_str(raw).unwrap();
        let back: Value = serde_json::to_value(&token).unwrap();
        assert_eq!(back["expires_in"], 3600);
        assert_eq!(back["access_token"], "a");
    }
}
