use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::body::ResponseBody;
use crate::error::{BoxError, Error};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Sends one fully built request and returns the response head with its body.
///
/// Implementations decide authentication and connection handling. Errors
/// that are already [`Error`] values reach the caller unchanged; anything else
/// is classified as a transport failure.
pub trait HttpExecutor: Send + Sync {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, BoxError>>;
}

impl<T> HttpExecutor for Arc<T>
where
    T: HttpExecutor + ?Sized,
{
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, BoxError>> {
        (**self).execute(request)
    }
}

#[cfg(feature = "tls-rustls-ring")]
type Connector = hyper_rustls::HttpsConnector<HttpConnector>;
#[cfg(not(feature = "tls-rustls-ring"))]
type Connector = HttpConnector;

/// Pooled HTTP/1.1 and HTTP/2 executor on the hyper legacy client.
#[derive(Clone, Debug)]
pub struct HyperExecutor {
    client: LegacyClient<Connector, Full<Bytes>>,
}

impl HyperExecutor {
    pub fn new() -> Result<Self, Error> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_POOL_IDLE_TIMEOUT)
    }

    pub fn with_timeouts(
        connect_timeout: Duration,
        pool_idle_timeout: Duration,
    ) -> Result<Self, Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(connect_timeout));
        http.set_nodelay(true);

        let connector = build_connector(http)?;
        let client = LegacyClient::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(DEFAULT_POOL_MAX_IDLE_PER_HOST)
            .build(connector);
        Ok(Self { client })
    }
}

#[cfg(feature = "tls-rustls-ring")]
fn build_connector(http: HttpConnector) -> Result<Connector, Error> {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
        .map_err(|source| Error::TlsBackendInit {
            message: source.to_string(),
        })?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http);
    Ok(connector)
}

#[cfg(not(feature = "tls-rustls-ring"))]
fn build_connector(http: HttpConnector) -> Result<Connector, Error> {
    Ok(http)
}

impl HttpExecutor for HyperExecutor {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, BoxError>> {
        let request = request.map(Full::new);
        Box::pin(async move {
            let response = self.client.request(request).await?;
            Ok(response.map(|body| body.map_err(|error| Box::new(error) as BoxError).boxed()))
        })
    }
}
