//! One-stop construction of an authenticated client and its resource clients.

use std::sync::Arc;
use std::time::Duration;

use http::header::USER_AGENT;
use tracing::debug;

use crate::ConfResult;
use crate::client::{Client, TransportConfig};
use crate::clients::{BucketsClient, DocumentsClient, PermissionsClient, SegmentsClient, SlosClient};
use crate::clock::{Clock, SystemClock};
use crate::oauth::{OAuth2Executor, OAuthCredentials};
use crate::recorder::Recorder;
use crate::retry::RetryOptions;
use crate::transport::{HttpExecutor, HyperExecutor};
use crate::util::parse_header_value;

pub const DEFAULT_USER_AGENT: &str = concat!("confclient/", env!("CARGO_PKG_VERSION"));

/// Builder for [`PlatformClients`].
///
/// ```no_run
/// use confclient::{CallContext, ClientFactory, OAuthCredentials};
///
/// # async fn run() -> confclient::ConfResult<()> {
/// let clients = ClientFactory::new("https://abc123.apps.example.com")
///     .oauth(OAuthCredentials::new(
///         "client-id",
///         "client-secret",
///         "https://sso.example.com/sso/oauth2/token",
///     ))
///     .concurrent_requests(8)
///     .rate_limiter(true)
///     .build()?;
///
/// let slos = clients.slos().list(&CallContext::background()).await?;
/// println!("{} slos", slos.all()?.len());
/// # Ok(())
/// # }
/// ```
pub struct ClientFactory {
    platform_url: String,
    credentials: Option<OAuthCredentials>,
    executor: Option<Arc<dyn HttpExecutor>>,
    clock: Arc<dyn Clock>,
    config: TransportConfig,
    user_agent: String,
}

impl ClientFactory {
    pub fn new(platform_url: impl Into<String>) -> Self {
        Self {
            platform_url: platform_url.into(),
            credentials: None,
            executor: None,
            clock: Arc::new(SystemClock),
            config: TransportConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Authenticates every request with the client-credentials flow.
    pub fn oauth(mut self, credentials: OAuthCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replaces the default hyper executor. OAuth, when configured, wraps it.
    pub fn executor(mut self, executor: impl HttpExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn concurrent_requests(mut self, concurrent_requests: i64) -> Self {
        self.config.concurrent_requests = concurrent_requests;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = Some(request_timeout);
        self
    }

    pub fn retry_options(mut self, retry: RetryOptions) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn recorder(mut self, recorder: impl Recorder + 'static) -> Self {
        self.config.recorder = Some(Arc::new(recorder));
        self
    }

    pub fn rate_limiter(mut self, enabled: bool) -> Self {
        self.config.rate_limiter = enabled;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> ConfResult<PlatformClients> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HyperExecutor::new()?),
        };
        let executor: Arc<dyn HttpExecutor> = match self.credentials {
            Some(credentials) => {
                debug!(client_id = credentials.client_id(), "using oauth client credentials");
                Arc::new(OAuth2Executor::with_clock(
                    executor,
                    credentials,
                    Arc::clone(&self.clock),
                ))
            }
            None => executor,
        };

        let mut config = self.config;
        config.headers.insert(
            USER_AGENT,
            parse_header_value(USER_AGENT.as_str(), &self.user_agent)?,
        );
        let client = Client::builder(self.platform_url)
            .config(config)
            .shared_executor(executor)
            .clock(self.clock)
            .try_build()?;
        Ok(PlatformClients { client })
    }
}

/// Resource clients sharing one transport and its limiter state.
#[derive(Clone, Debug)]
pub struct PlatformClients {
    client: Client,
}

impl PlatformClients {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn buckets(&self) -> BucketsClient {
        BucketsClient::new(self.client.clone())
    }

    pub fn documents(&self) -> DocumentsClient {
        DocumentsClient::new(self.client.clone())
    }

    pub fn segments(&self) -> SegmentsClient {
        SegmentsClient::new(self.client.clone())
    }

    pub fn slos(&self) -> SlosClient {
        SlosClient::new(self.client.clone())
    }

    pub fn permissions(&self) -> PermissionsClient {
        PermissionsClient::new(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use http::header::{AUTHORIZATION, USER_AGENT};
    use http::{HeaderMap, Request, Response};

    use super::{ClientFactory, DEFAULT_USER_AGENT};
    use crate::body::{ResponseBody, full_body};
    use crate::context::CallContext;
    use crate::error::{BoxError, ErrorCode};
    use crate::oauth::OAuthCredentials;

    #[derive(Default)]
    struct PlatformStub {
        seen: Mutex<Vec<(String, HeaderMap)>>,
    }

    impl crate::transport::HttpExecutor for PlatformStub {
        fn execute(
            &self,
            request: Request<Bytes>,
        ) -> BoxFuture<'_, Result<Response<ResponseBody>, BoxError>> {
            let (parts, _) = request.into_parts();
            let uri = parts.uri.to_string();
            let body = if uri.contains("/oauth2/token") {
                r#"{"access_token":"t-1","expires_in":600}"#
            } else {
                r#"{"slos":[{"id":"a"}]}"#
            };
            self.seen.lock().expect("lock").push((uri, parts.headers));
            Box::pin(async move {
                Ok(Response::builder()
                    .status(200)
                    .body(full_body(body))
                    .expect("response"))
            })
        }
    }

    #[tokio::test]
    async fn factory_authenticates_and_sets_user_agent() {
        let stub = Arc::new(PlatformStub::default());
        let clients = ClientFactory::new("https://abc.apps.example.com")
            .oauth(OAuthCredentials::new(
                "id",
                "secret",
                "https://sso.example.com/oauth2/token",
            ))
            .executor(Arc::clone(&stub))
            .build()
            .expect("factory");

        let list = clients
            .slos()
            .list(&CallContext::background())
            .await
            .expect("slos");
        assert_eq!(list.all().expect("items").len(), 1);

        let seen = stub.seen.lock().expect("lock").clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].0.ends_with("/oauth2/token"));
        assert_eq!(seen[1].0, "https://abc.apps.example.com/platform/slo/v1/slos");
        assert_eq!(
            seen[1].1.get(AUTHORIZATION).and_then(|value| value.to_str().ok()),
            Some("Bearer t-1")
        );
        assert_eq!(
            seen[1].1.get(USER_AGENT).and_then(|value| value.to_str().ok()),
            Some(DEFAULT_USER_AGENT)
        );
    }

    #[tokio::test]
    async fn factory_without_credentials_sends_no_authorization() {
        let stub = Arc::new(PlatformStub::default());
        let clients = ClientFactory::new("https://abc.apps.example.com")
            .executor(Arc::clone(&stub))
            .user_agent("deploy-tool/2.0")
            .build()
            .expect("factory");

        clients
            .client()
            .get(
                &CallContext::background(),
                "/platform/slo/v1/slos",
                &Default::default(),
            )
            .await
            .expect("response");

        let seen = stub.seen.lock().expect("lock").clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1.get(AUTHORIZATION).is_none());
        assert_eq!(
            seen[0].1.get(USER_AGENT).and_then(|value| value.to_str().ok()),
            Some("deploy-tool/2.0")
        );
    }

    #[test]
    fn factory_rejects_invalid_platform_url() {
        let error = ClientFactory::new("not a url")
            .executor(Arc::new(PlatformStub::default()))
            .build()
            .expect_err("invalid url");
        assert_eq!(error.code(), ErrorCode::InvalidUri);
    }
}
