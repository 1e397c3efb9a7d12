//! Interactive OAuth authorization-code flow.
//!
//! The user opens the printed authorization URL in a browser; the service
//! redirects back to a listener bound on the loopback address, which hands the code to
//! the flow before being shut down.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    Context, EngineError,
    http::execute,
    token::{Token, TokenSource},
};

pub const SPLITWISE_AUTH_URL: &str = "https://secure.splitwise.com/oauth/authorize";
pub const SPLITWISE_TOKEN_URL: &str = "https://secure.splitwise.com/oauth/token";

const CALLBACK_PATH: &str = "/auth_redirect";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Client registration and endpoints of an OAuth provider.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
}

/// Address the callback listener binds for `redirect_port`. The redirect
/// URL names the same address, so the browser cannot pick another loopback.
pub fn callback_addr(redirect_port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], redirect_port))
}

impl OAuthConfig {
    /// Splitwise endpoints with the redirect pointing at the local listener.
    pub fn splitwise(client_id: &str, client_secret: &str, redirect_port: u16) -> Self {
        let addr = callback_addr(redirect_port);
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_url: SPLITWISE_AUTH_URL.to_string(),
            token_url: SPLITWISE_TOKEN_URL.to_string(),
            redirect_url: format!("http://{addr}{CALLBACK_PATH}"),
        }
    }

    /// URL the user has to open to grant access.
    pub fn auth_code_url(&self, state: &str) -> Result<Url, EngineError> {
        Url::parse_with_params(
            &self.auth_url,
            &[
                ("access_type", "offline"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("state", state),
            ],
        )
        .map_err(|err| EngineError::Configuration(format!("invalid auth url: {err}")))
    }

    /// Exchanges an authorization code for a token.
    pub async fn exchange(&self, http: &reqwest::Client, code: &str) -> Result<Token, EngineError> {
        let request = http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_url.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .build()
            .map_err(crate::ApiError::from)?;

        let res = execute(http, request).await?;
        if !res.status.is_success() {
            return Err(EngineError::Authorization(format!(
                "token exchange failed with {}: {}",
                res.status,
                res.text()
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&res.body)?;
        Ok(token.into())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<TokenResponse> for Token {
    fn from(res: TokenResponse) -> Self {
        Self {
            access_token: res.access_token,
            token_type: res.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: res.refresh_token,
            expiry: res
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            extra: res.extra,
        }
    }
}

/// Generates the anti-forgery state of one authorization flow: 24 random
/// bytes, URL-safe base64.
pub fn new_state() -> String {
    let mut buf = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE.encode(buf)
}

/// Query parameters of the redirect callback.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub error: Option<String>,
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

async fn handle_callback(
    State(sender): State<CallbackSender>,
    Query(params): Query<CallbackParams>,
) -> &'static str {
    let sender = sender
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(params);
    }
    "✅ Go back to your terminal."
}

/// Serves `listener` until the first callback arrives or `ctx` is done.
///
/// The listener is shut down before returning, whatever the outcome.
pub async fn wait_for_callback(
    ctx: &Context,
    listener: TcpListener,
) -> Result<CallbackParams, EngineError> {
    let (tx, rx) = oneshot::channel();
    let app = Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(Arc::new(Mutex::new(Some(tx))));

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    });

    let res = tokio::select! {
        err = ctx.done() => Err(err),
        params = rx => params.map_err(|_| {
            EngineError::Authorization("callback listener stopped".to_string())
        }),
    };

    shutdown.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(Ok(Ok(()))) => tracing::debug!("callback listener stopped"),
        Ok(Ok(Err(err))) => tracing::warn!("callback listener failed: {err}"),
        Ok(Err(err)) => tracing::warn!("callback listener task failed: {err}"),
        Err(_) => {
            tracing::warn!("callback listener did not stop in time, aborting");
            server.abort();
        }
    }

    res
}

/// Runs the authorization-code flow through a listener on the loopback address.
pub struct LocalServerTokenSource {
    config: OAuthConfig,
    addr: SocketAddr,
    timeout: Duration,
    http: reqwest::Client,
}

impl LocalServerTokenSource {
    pub fn new(config: OAuthConfig, addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            config,
            addr,
            timeout,
            http: reqwest::Client::new(),
        }
    }

    /// Waits for the callback on `listener`, checks `state` and exchanges
    /// the code.
    pub async fn complete(
        &self,
        ctx: &Context,
        listener: TcpListener,
        state: &str,
    ) -> Result<Token, EngineError> {
        let callback = match wait_for_callback(&ctx.with_timeout(self.timeout), listener).await {
            Err(EngineError::DeadlineExceeded) if !ctx.is_cancelled() => {
                return Err(EngineError::AuthorizationTimeout);
            }
            res => res?,
        };

        if callback.state != state {
            return Err(EngineError::StateMismatch);
        }
        if let Some(error) = callback.error {
            return Err(EngineError::Authorization(error));
        }
        if callback.code.is_empty() {
            return Err(EngineError::Authorization(
                "callback without authorization code".to_string(),
            ));
        }

        ctx.run(self.config.exchange(&self.http, &callback.code))
            .await
    }
}

#[async_trait]
impl TokenSource for LocalServerTokenSource {
    async fn token(&self, ctx: &Context) -> Result<Token, EngineError> {
        let state = new_state();
        let url = self.config.auth_code_url(&state)?;
        let listener = TcpListener::bind(self.addr).await?;

        tracing::info!(addr = %self.addr, "waiting for the authorization callback");
        println!("Open this URL in the browser to authenticate.\n\n{url}\n");

        self.complete(ctx, listener, &state).await
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, routing::post};

    use super::*;

    async fn local_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn config_for(token_url: String, redirect: SocketAddr) -> OAuthConfig {
        OAuthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            auth_url: SPLITWISE_AUTH_URL.to_string(),
            token_url,
            redirect_url: format!("http://{redirect}{CALLBACK_PATH}"),
        }
    }

    async fn token_endpoint() -> String {
        async fn issue() -> Json<Value> {
            Json(serde_json::json!({
                "access_token": "issued",
                "token_type": "bearer",
                "expires_in": 3600,
            }))
        }
        let (listener, addr) = local_listener().await;
        let app = Router::new().route("/oauth/token", post(issue));
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}/oauth/token")
    }

    #[test]
    fn state_is_url_safe_and_random() {
        let a = new_state();
        let b = new_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, b);
    }

    #[test]
    fn auth_code_url_carries_state_and_redirect() {
        let config = OAuthConfig::splitwise("key", "secret", 4000);
        let url = config.auth_code_url("abc").unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("state".to_string(), "abc".to_string())));
        assert!(query.contains(&("client_id".to_string(), "key".to_string())));
        assert!(query.contains(&(
            "redirect_uri".to_string(),
            "http://127.0.0.1:4000/auth_redirect".to_string()
        )));
    }

    #[test]
    fn redirect_names_the_bound_address() {
        let config = OAuthConfig::splitwise("key", "secret", 4123);
        let redirect = Url::parse(&config.redirect_url).unwrap();
        let addr = callback_addr(4123);
        assert_eq!(redirect.host_str(), Some(addr.ip().to_string().as_str()));
        assert_eq!(redirect.port(), Some(addr.port()));
        assert_eq!(redirect.path(), CALLBACK_PATH);
    }

    #[tokio::test]
    async fn callback_code_is_exchanged_for_a_token() {
        let token_url = token_endpoint().await;
        let (listener, addr) = local_listener().await;
        let source = LocalServerTokenSource::new(
            config_for(token_url, addr),
            addr,
            Duration::from_secs(5),
        );

        let browser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            reqwest::get(format!(
                "http://{addr}{CALLBACK_PATH}?code=the-code&state=expected"
            ))
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
        });

        let token = source
            .complete(&Context::new(), listener, "expected")
            .await
            .unwrap();
        assert_eq!(token.access_token, "issued");
        assert!(token.expiry.is_some());
        assert!(browser.await.unwrap().contains("Go back to your terminal"));
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected() {
        let (listener, addr) = local_listener().await;
        let source = LocalServerTokenSource::new(
            config_for("http://127.0.0.1:9/unused".to_string(), addr),
            addr,
            Duration::from_secs(5),
        );

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = reqwest::get(format!(
                "http://{addr}{CALLBACK_PATH}?code=c&state=forged"
            ))
            .await;
        });

        let err = source
            .complete(&Context::new(), listener, "expected")
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::StateMismatch);
    }

    #[tokio::test]
    async fn missing_callback_times_out_and_frees_the_port() {
        let (listener, addr) = local_listener().await;
        let source = LocalServerTokenSource::new(
            config_for("http://127.0.0.1:9/unused".to_string(), addr),
            addr,
            Duration::from_millis(50),
        );

        let err = source
            .complete(&Context::new(), listener, "expected")
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::AuthorizationTimeout);
        assert!(TcpListener::bind(addr).await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_stops_the_listener() {
        let (listener, _addr) = local_listener().await;
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = wait_for_callback(&ctx, listener).await.unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }
}
