use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tracing::{Instrument, debug, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::ConfResult;
use crate::body::{ResponseBody, build_http_request, read_all_body};
use crate::clock::{Clock, SystemClock};
use crate::context::CallContext;
use crate::error::{Error, RequestInfo};
use crate::limiters::ConcurrencyLimiter;
use crate::rate_limit::RateLimiter;
use crate::recorder::{RecordedEvent, RecordedRequest, RecordedResponse, Recorder};
use crate::request::RequestOptions;
use crate::response::Response;
use crate::retry::{RetryOptions, RetryState, RetryStep};
use crate::transport::{HttpExecutor, HyperExecutor};
use crate::util::{
    build_target_url, classify_executor_error, parse_header_name, parse_header_value,
    redact_uri_for_logs, validate_base_url,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
const DEFAULT_CLIENT_NAME: &str = "confclient";

/// Construction-time settings of a [`Client`].
#[derive(Clone)]
pub struct TransportConfig {
    /// Maximum concurrent requests; zero or negative means unlimited.
    pub concurrent_requests: i64,
    /// Bound for one attempt's network exchange; `None` disables it.
    pub request_timeout: Option<Duration>,
    pub retry: RetryOptions,
    pub recorder: Option<Arc<dyn Recorder>>,
    /// Installs the header-driven rate limiter.
    pub rate_limiter: bool,
    /// Sent with every request.
    pub headers: HeaderMap,
    /// Identifies the client in tracing spans.
    pub client_name: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: 0,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            retry: RetryOptions::default(),
            recorder: None,
            rate_limiter: false,
            headers: HeaderMap::new(),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TransportConfig")
            .field("concurrent_requests", &self.concurrent_requests)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("recorder", &self.recorder.is_some())
            .field("rate_limiter", &self.rate_limiter)
            .field("headers", &self.headers)
            .field("client_name", &self.client_name)
            .finish()
    }
}

pub struct ClientBuilder {
    base_url: String,
    config: TransportConfig,
    executor: Option<Arc<dyn HttpExecutor>>,
    clock: Arc<dyn Clock>,
}

impl ClientBuilder {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            config: TransportConfig::default(),
            executor: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, executor: impl HttpExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn shared_executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn concurrent_requests(mut self, concurrent_requests: i64) -> Self {
        self.config.concurrent_requests = concurrent_requests;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = Some(request_timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn no_request_timeout(mut self) -> Self {
        self.config.request_timeout = None;
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

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> ConfResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.config.client_name = client_name.into();
        self
    }

    /// Time source for the rate limiter and retry delays.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn try_build(self) -> ConfResult<Client> {
        validate_base_url(&self.base_url)?;
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HyperExecutor::new()?),
        };
        let config = self.config;
        let rate_limiter = config
            .rate_limiter
            .then(|| RateLimiter::new(Arc::clone(&self.clock)));

        Ok(Client {
            inner: Arc::new(ClientInner {
                base_url: self.base_url,
                headers: config.headers,
                request_timeout: config.request_timeout,
                retry: config.retry,
                recorder: config.recorder,
                rate_limiter,
                concurrency: ConcurrencyLimiter::new(config.concurrent_requests),
                executor,
                clock: self.clock,
                client_name: config.client_name,
            }),
        })
    }

    pub fn build(self) -> Client {
        self.try_build()
            .unwrap_or_else(|error| panic!("failed to build confclient client: {error}"))
    }
}

struct ClientInner {
    base_url: String,
    headers: HeaderMap,
    request_timeout: Option<Duration>,
    retry: RetryOptions,
    recorder: Option<Arc<dyn Recorder>>,
    rate_limiter: Option<RateLimiter>,
    concurrency: ConcurrencyLimiter,
    executor: Arc<dyn HttpExecutor>,
    clock: Arc<dyn Clock>,
    client_name: String,
}

/// Shared transport for all resource clients.
///
/// Every call goes through the same sequence per attempt: rate limiter wait,
/// concurrency slot, request, recording, rate limiter update. The retry
/// policy then decides whether the attempt is repeated. Cloning is cheap and
/// all clones share limiter state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("client_name", &self.inner.client_name)
            .field("request_timeout", &self.inner.request_timeout)
            .field("retry", &self.inner.retry)
            .field("rate_limiter", &self.inner.rate_limiter.is_some())
            .field("concurrency_limit", &self.inner.concurrency.limit())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.inner.rate_limiter.as_ref()
    }

    pub fn concurrency_limiter(&self) -> &ConcurrencyLimiter {
        &self.inner.concurrency
    }

    pub async fn get(
        &self,
        context: &CallContext,
        path: &str,
        options: &RequestOptions,
    ) -> ConfResult<Response> {
        self.request(context, Method::GET, path, Bytes::new(), options)
            .await
    }

    pub async fn post(
        &self,
        context: &CallContext,
        path: &str,
        body: impl Into<Bytes>,
        options: &RequestOptions,
    ) -> ConfResult<Response> {
        self.request(context, Method::POST, path, body.into(), options)
            .await
    }

    pub async fn put(
        &self,
        context: &CallContext,
        path: &str,
        body: impl Into<Bytes>,
        options: &RequestOptions,
    ) -> ConfResult<Response> {
        self.request(context, Method::PUT, path, body.into(), options)
            .await
    }

    pub async fn patch(
        &self,
        context: &CallContext,
        path: &str,
        body: impl Into<Bytes>,
        options: &RequestOptions,
    ) -> ConfResult<Response> {
        self.request(context, Method::PATCH, path, body.into(), options)
            .await
    }

    pub async fn delete(
        &self,
        context: &CallContext,
        path: &str,
        options: &RequestOptions,
    ) -> ConfResult<Response> {
        self.request(context, Method::DELETE, path, Bytes::new(), options)
            .await
    }

    /// Sends one logical request, repeating it while the retry policy asks.
    ///
    /// Any HTTP status is returned as `Ok`; only failures to obtain a response
    /// are errors, and those are never retried.
    pub async fn request(
        &self,
        context: &CallContext,
        method: Method,
        path: &str,
        body: Bytes,
        options: &RequestOptions,
    ) -> ConfResult<Response> {
        let url = build_target_url(
            &self.inner.base_url,
            options.effective_path(path),
            options.query(),
        )?;
        let headers = self.request_headers(options)?;
        let redacted_uri = redact_uri_for_logs(&url);
        let mut retry = RetryState::new(options.effective_retry(&self.inner.retry));

        loop {
            let span = info_span!(
                "confclient.request",
                client = %self.inner.client_name,
                method = %method,
                uri = %redacted_uri,
                attempt = retry.attempt()
            );
            let response = self
                .attempt(context, &method, &url, &headers, &body)
                .instrument(span.clone())
                .await?;

            match retry.evaluate(&response) {
                RetryStep::Done => return Ok(response),
                RetryStep::Retry { delay } => {
                    span.in_scope(|| {
                        debug!(
                            status = response.status().as_u16(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying request"
                        );
                    });
                    context.run(self.inner.clock.sleep(delay)).await?;
                }
            }
        }
    }

    fn request_headers(&self, options: &RequestOptions) -> ConfResult<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(self.inner.headers.len() + 1);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        for (name, value) in &self.inner.headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(content_type) = options.content_type_override() {
            headers.insert(
                CONTENT_TYPE,
                parse_header_value(CONTENT_TYPE.as_str(), content_type)?,
            );
        }
        Ok(headers)
    }

    async fn attempt(
        &self,
        context: &CallContext,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> ConfResult<Response> {
        if let Some(rate_limiter) = &self.inner.rate_limiter {
            rate_limiter.wait(context).await?;
        }
        let _permit = self.inner.concurrency.acquire_permit(context).await?;

        let request = build_http_request(method.clone(), url, headers, body.clone())?;
        let event_id = Uuid::new_v4();
        self.record(|now| {
            RecordedEvent::request(
                event_id,
                now,
                RecordedRequest {
                    method: method.clone(),
                    url: url.to_string(),
                    headers: request.headers().clone(),
                    body: body.clone(),
                },
            )
        });

        debug!("sending request");
        let started = Instant::now();
        let deadline = self
            .inner
            .request_timeout
            .and_then(|timeout| {
                tokio::time::Instant::now()
                    .checked_add(timeout)
                    .map(|at| (at, timeout))
            });

        let exchange = self.inner.executor.execute(request);
        let outcome = self
            .bounded(context, deadline, method, url, exchange)
            .await
            .and_then(|outcome| {
                outcome.map_err(|source| {
                    classify_executor_error(source, method, &redact_uri_for_logs(url))
                })
            });
        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "request failed");
                self.record(|now| RecordedEvent::error(event_id, now, &error));
                return Err(error);
            }
        };

        let (parts, response_body) = response.into_parts();
        if let Some(rate_limiter) = &self.inner.rate_limiter {
            rate_limiter.update(parts.status, &parts.headers);
        }
        let body = match self
            .read_body(context, deadline, method, url, response_body)
            .await
        {
            Ok(body) => body,
            Err(error) => {
                self.record(|now| RecordedEvent::error(event_id, now, &error));
                return Err(error);
            }
        };

        self.record(|now| {
            RecordedEvent::response(
                event_id,
                now,
                RecordedResponse {
                    status: parts.status,
                    headers: parts.headers.clone(),
                    body: body.clone(),
                },
            )
        });

        debug!(
            status = parts.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        Ok(Response::new(
            parts.status,
            parts.headers,
            body,
            RequestInfo::new(method.clone(), url.as_str()),
        ))
    }

    /// Reads the whole body; a failing stream degrades to an empty body.
    async fn read_body(
        &self,
        context: &CallContext,
        deadline: Option<(tokio::time::Instant, Duration)>,
        method: &Method,
        url: &Url,
        body: ResponseBody,
    ) -> ConfResult<Bytes> {
        match self
            .bounded(context, deadline, method, url, read_all_body(body))
            .await?
        {
            Ok(body) => Ok(body),
            Err(source) => {
                warn!(error = %source, "failed to read response body; using empty body");
                Ok(Bytes::new())
            }
        }
    }

    async fn bounded<F>(
        &self,
        context: &CallContext,
        deadline: Option<(tokio::time::Instant, Duration)>,
        method: &Method,
        url: &Url,
        future: F,
    ) -> ConfResult<F::Output>
    where
        F: Future,
    {
        let Some((deadline, timeout)) = deadline else {
            return context.run(future).await;
        };
        context
            .run(tokio::time::timeout_at(deadline, future))
            .await?
            .map_err(|_| Error::Timeout {
                timeout_ms: timeout.as_millis(),
                method: method.clone(),
                uri: redact_uri_for_logs(url),
            })
    }

    fn record(&self, event: impl FnOnce(std::time::SystemTime) -> RecordedEvent) {
        if let Some(recorder) = &self.inner.recorder {
            recorder.record(event(self.inner.clock.now()));
        }
    }
}
