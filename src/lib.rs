//! `confclient` is an HTTP client for a configuration-management platform API.
//!
//! The [`Client`] transport sits beneath every resource client and applies,
//! per attempt, a header-driven rate limiter, a concurrency limit, optional
//! request/response recording and a retry policy evaluated on the response.
//! Resource clients ([`BucketsClient`], [`DocumentsClient`], [`SegmentsClient`],
//! [`SlosClient`], [`PermissionsClient`]) build the multi-step platform
//! protocols (optimistic locking, pagination, upserts) on top of it.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use confclient::prelude::{CallContext, Client, RequestOptions, RetryOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder("https://abc123.apps.example.com")
//!         .concurrent_requests(4)
//!         .rate_limiter(true)
//!         .retry_options(RetryOptions::standard().delay_after_retry(Duration::from_millis(250)))
//!         .try_build()?;
//!
//!     let context = CallContext::with_timeout(Duration::from_secs(20));
//!     let response = client
//!         .get(
//!             &context,
//!             "/platform/slo/v1/slos",
//!             &RequestOptions::new().query_param("page-size", "50"),
//!         )
//!         .await?
//!         .into_result()?;
//!
//!     println!("{}", response.text_lossy());
//!     Ok(())
//! }
//! ```
//!
//! Any HTTP status comes back from [`Client`] as a [`Response`]; call
//! [`Response::into_result`] to turn 4xx/5xx into [`Error::Api`]. Resource
//! clients do that for you.

mod body;
mod client;
mod clients;
mod clock;
mod context;
mod error;
mod factory;
mod limiters;
mod oauth;
mod rate_limit;
mod recorder;
mod request;
mod response;
mod retry;
mod transport;
mod util;

pub use tokio_util::sync::CancellationToken;

pub use crate::body::{ResponseBody, empty_body, full_body};
pub use crate::client::{
    Client, ClientBuilder, DEFAULT_CONTENT_TYPE, DEFAULT_REQUEST_TIMEOUT, TransportConfig,
};
pub use crate::clients::{
    BUCKETS_PATH, BucketsClient, DOCUMENTS_PATH, Document, DocumentUpdate, DocumentsClient,
    ListResponse, NewDocument, PERMISSIONS_PATH, PermissionsClient, ResourceRef, SEGMENTS_PATH,
    SLOS_PATH, SegmentsClient, SlosClient, TRASH_PATH,
};
pub use crate::clock::{Clock, SystemClock, TestClock};
pub use crate::context::CallContext;
pub use crate::error::{ApiError, BoxError, Error, ErrorCode, RequestInfo, TransportErrorKind};
pub use crate::factory::{ClientFactory, DEFAULT_USER_AGENT, PlatformClients};
pub use crate::limiters::{ConcurrencyLimiter, ConcurrencyPermit};
pub use crate::oauth::{OAuth2Executor, OAuthCredentials, TOKEN_REFRESH_MARGIN};
pub use crate::rate_limit::{
    DEFAULT_HARD_LIMIT_TIMEOUT, RATE_LIMIT_HEADER, RATE_LIMIT_RESET_HEADER, RateLimiter,
};
pub use crate::recorder::{
    ChannelRecorder, RecordedError, RecordedEvent, RecordedRequest, RecordedResponse, Recorder,
};
pub use crate::request::RequestOptions;
pub use crate::response::Response;
pub use crate::retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, RetryIfNotSuccess, RetryIfTooManyRequests,
    RetryOnFailureExcept404, RetryOptions, RetryPredicate,
};
pub use crate::transport::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_POOL_IDLE_TIMEOUT, HttpExecutor, HyperExecutor,
};

pub type ConfResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        ApiError, CallContext, CancellationToken, Client, ClientFactory, ConfResult, Error,
        ErrorCode, HttpExecutor, ListResponse, PlatformClients, Recorder, RequestOptions,
        Response, RetryOptions, RetryPredicate, TransportConfig,
    };
}
