use std::convert::Infallible;

use bytes::Bytes;
use http::{HeaderMap, Method, Request};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use url::Url;

use crate::error::{BoxError, Error};

/// Response body handed back by an [`HttpExecutor`](crate::HttpExecutor).
pub type ResponseBody = BoxBody<Bytes, BoxError>;

fn map_infallible_to_box_error(never: Infallible) -> BoxError {
    match never {}
}

/// Wraps an in-memory payload as a [`ResponseBody`].
pub fn full_body(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into())
        .map_err(map_infallible_to_box_error)
        .boxed()
}

pub fn empty_body() -> ResponseBody {
    full_body(Bytes::new())
}

pub(crate) fn build_http_request(
    method: Method,
    url: &Url,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Request<Bytes>, Error> {
    let mut request_builder = Request::builder().method(method).uri(url.as_str());
    for (name, value) in headers {
        request_builder = request_builder.header(name, value);
    }
    request_builder
        .body(body)
        .map_err(|source| Error::RequestBuild { source })
}

pub(crate) async fn read_all_body(body: ResponseBody) -> Result<Bytes, BoxError> {
    Ok(body.collect().await?.to_bytes())
}
