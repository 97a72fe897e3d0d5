//! OAuth2 client-credentials authentication as an [`HttpExecutor`] decorator.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::{Method, Request, Response};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::body::{ResponseBody, read_all_body};
use crate::clock::{Clock, SystemClock};
use crate::error::{BoxError, Error};
use crate::transport::HttpExecutor;
use crate::util::truncate_body;

/// Tokens are refreshed this long before the server-announced expiry.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Clone)]
pub struct OAuthCredentials {
    client_id: String,
    client_secret: String,
    token_url: String,
    scopes: Vec<String>,
    resource: Option<String>,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("resource", &self.resource)
            .finish()
    }
}

impl OAuthCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
            scopes: Vec::new(),
            resource: None,
        }
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Resource (for example an account URN) the token is requested for.
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn form_body(&self) -> Result<String, Error> {
        let scope = self.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }
        if let Some(resource) = &self.resource {
            form.push(("resource", resource.as_str()));
        }
        serde_urlencoded::to_string(&form).map_err(|source| Error::OAuth {
            message: format!("failed to encode token request: {source}"),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct CachedToken {
    header: HeaderValue,
    expires_at: SystemTime,
}

/// Adds a bearer token to every request, fetching and caching it on demand.
pub struct OAuth2Executor<E> {
    inner: E,
    credentials: OAuthCredentials,
    clock: Arc<dyn Clock>,
    token: Mutex<Option<CachedToken>>,
}

impl<E> fmt::Debug for OAuth2Executor<E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OAuth2Executor")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl<E> OAuth2Executor<E>
where
    E: HttpExecutor,
{
    pub fn new(inner: E, credentials: OAuthCredentials) -> Self {
        Self::with_clock(inner, credentials, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: E, credentials: OAuthCredentials, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            credentials,
            clock,
            token: Mutex::new(None),
        }
    }

    async fn bearer(&self) -> Result<HeaderValue, Error> {
        let mut cached = self.token.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref()
            && now + TOKEN_REFRESH_MARGIN < token.expires_at
        {
            return Ok(token.header.clone());
        }

        let token = self.fetch_token(now).await?;
        let header = token.header.clone();
        *cached = Some(token);
        Ok(header)
    }

    async fn fetch_token(&self, now: SystemTime) -> Result<CachedToken, Error> {
        debug!(token_url = %self.credentials.token_url, "requesting oauth token");
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.credentials.token_url.as_str())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(Bytes::from(self.credentials.form_body()?))
            .map_err(|source| Error::OAuth {
                message: format!("invalid token request: {source}"),
            })?;

        let response = self.inner.execute(request).await.map_err(|source| Error::OAuth {
            message: format!("token endpoint unreachable: {source}"),
        })?;
        let status = response.status();
        let body = read_all_body(response.into_body())
            .await
            .map_err(|source| Error::OAuth {
                message: format!("failed to read token response: {source}"),
            })?;
        if !status.is_success() {
            return Err(Error::OAuth {
                message: format!(
                    "token endpoint returned {}: {}",
                    status.as_u16(),
                    truncate_body(&body)
                ),
            });
        }

        let token: TokenResponse = serde_json::from_slice(&body).map_err(|source| Error::OAuth {
            message: format!("malformed token response: {source}"),
        })?;
        let mut header = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(|_| Error::OAuth {
                message: "access token is not a valid header value".to_owned(),
            })?;
        header.set_sensitive(true);
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let expires_at = now.checked_add(lifetime).unwrap_or_else(|| {
            debug!(
                expires_in = token.expires_in,
                "token lifetime out of range; using default lifetime"
            );
            now + DEFAULT_TOKEN_LIFETIME
        });
        Ok(CachedToken { header, expires_at })
    }
}

impl<E> HttpExecutor for OAuth2Executor<E>
where
    E: HttpExecutor,
{
    fn execute(
        &self,
        mut request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, BoxError>> {
        Box::pin(async move {
            let bearer = self.bearer().await?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
            self.inner.execute(request).await
        })
    }
}
