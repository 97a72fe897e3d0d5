use std::fmt;

use bytes::Bytes;
use http::{Method, StatusCode};
use thiserror::Error;

use crate::util::truncate_body;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Method and full URL of the request a response or error belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestInfo {
    method: Method,
    url: String,
}

impl RequestInfo {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.method, self.url)
    }
}

/// A 4xx or 5xx answer from the platform.
#[derive(Clone, Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Bytes,
    request: RequestInfo,
}

impl ApiError {
    pub fn new(status: StatusCode, body: Bytes, request: RequestInfo) -> Self {
        Self {
            status,
            body,
            request,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn is_4xx_error(&self) -> bool {
        (400..=499).contains(&self.status.as_u16())
    }

    pub fn is_5xx_error(&self) -> bool {
        (500..=599).contains(&self.status.as_u16())
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    pub fn is_conflict(&self) -> bool {
        self.status == StatusCode::CONFLICT
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "api error {} for {}: {}",
            self.status.as_u16(),
            self.request,
            truncate_body(&self.body)
        )
    }
}

impl std::error::Error for ApiError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    InvalidHeaderName,
    InvalidHeaderValue,
    RequestBuild,
    Transport,
    ConnectionClosed,
    Timeout,
    Canceled,
    DeadlineExceeded,
    ConcurrencyLimitClosed,
    Api,
    Validation,
    Runtime,
    SerializeJson,
    Deserialize,
    OAuth,
    TlsBackendInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::RequestBuild => "request_build",
            Self::Transport => "transport",
            Self::ConnectionClosed => "connection_closed",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ConcurrencyLimitClosed => "concurrency_limit_closed",
            Self::Api => "api",
            Self::Validation => "validation",
            Self::Runtime => "runtime",
            Self::SerializeJson => "serialize_json",
            Self::Deserialize => "deserialize",
            Self::OAuth => "oauth",
            Self::TlsBackendInit => "tls_backend_init",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("connection closed unexpectedly by the server for {method} {uri}: {source}")]
    ConnectionClosed {
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http request timed out after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("operation canceled by caller")]
    Canceled,
    #[error("call deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u128 },
    #[error("request concurrency limiter is closed")]
    ConcurrencyLimitClosed,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid {resource} request: {field} {reason}")]
    Validation {
        resource: String,
        field: String,
        reason: String,
    },
    #[error("unexpected {resource} response for {identifier}: {reason}")]
    Runtime {
        resource: String,
        identifier: String,
        reason: String,
    },
    #[error("failed to serialize request json: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("failed to obtain oauth token: {message}")]
    OAuth { message: String },
    #[error("failed to initialize tls backend: {message}")]
    TlsBackendInit { message: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::ConnectionClosed { .. } => ErrorCode::ConnectionClosed,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Canceled => ErrorCode::Canceled,
            Self::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
            Self::ConcurrencyLimitClosed => ErrorCode::ConcurrencyLimitClosed,
            Self::Api(_) => ErrorCode::Api,
            Self::Validation { .. } => ErrorCode::Validation,
            Self::Runtime { .. } => ErrorCode::Runtime,
            Self::Serialize { .. } => ErrorCode::SerializeJson,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::OAuth { .. } => ErrorCode::OAuth,
            Self::TlsBackendInit { .. } => ErrorCode::TlsBackendInit,
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(error) => Some(error),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.api_error().map(ApiError::status)
    }

    pub fn is_not_found(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_not_found)
    }

    /// True for failures that happened before the platform answered.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::ConnectionClosed { .. }
                | Self::Timeout { .. }
                | Self::Canceled
                | Self::DeadlineExceeded { .. }
        )
    }

    pub(crate) fn validation(
        resource: &str,
        field: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.to_owned(),
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn runtime(
        resource: &str,
        identifier: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Runtime {
            resource: resource.to_owned(),
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}
