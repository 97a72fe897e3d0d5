use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::ConfResult;
use crate::error::{ApiError, Error, RequestInfo};
use crate::util::truncate_body;

/// A fully buffered platform response.
///
/// 4xx and 5xx answers are still responses; [`Response::into_result`] turns
/// them into [`Error::Api`].
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    request: RequestInfo,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, request: RequestInfo) -> Self {
        Self {
            status,
            headers,
            body,
            request,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status.as_u16())
    }

    pub fn is_4xx_error(&self) -> bool {
        (400..=499).contains(&self.status.as_u16())
    }

    pub fn is_5xx_error(&self) -> bool {
        (500..=599).contains(&self.status.as_u16())
    }

    pub fn into_result(self) -> ConfResult<Self> {
        if self.is_4xx_error() || self.is_5xx_error() {
            return Err(Error::Api(ApiError::new(
                self.status,
                self.body,
                self.request,
            )));
        }
        Ok(self)
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> ConfResult<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&self.body),
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use serde::Deserialize;

    use super::Response;
    use crate::error::{ErrorCode, RequestInfo};

    fn response(status: u16, body: &'static str) -> Response {
        Response::new(
            StatusCode::from_u16(status).expect("valid status"),
            HeaderMap::new(),
            Bytes::from_static(body.as_bytes()),
            RequestInfo::new(Method::GET, "https://platform.example.com/x"),
        )
    }

    #[test]
    fn status_classes_are_mutually_exclusive() {
        for status in [100_u16, 200, 204, 299, 301, 400, 404, 429, 499, 500, 503, 599] {
            let response = response(status, "");
            let classes = [
                response.is_success(),
                response.is_4xx_error(),
                response.is_5xx_error(),
            ];
            assert!(
                classes.iter().filter(|flag| **flag).count() <= 1,
                "status {status} matched more than one class"
            );
            assert_eq!(response.is_success(), (200..300).contains(&status));
            assert_eq!(response.is_4xx_error(), (400..500).contains(&status));
            assert_eq!(response.is_5xx_error(), (500..600).contains(&status));
        }
    }

    #[test]
    fn into_result_maps_error_statuses_to_api_error() {
        let ok = response(201, "{}").into_result().expect("2xx is ok");
        assert_eq!(ok.status(), StatusCode::CREATED);

        let error = response(404, "missing")
            .into_result()
            .expect_err("404 is an api error");
        assert_eq!(error.code(), ErrorCode::Api);
        assert!(error.is_not_found());
        let api = error.api_error().expect("api error payload");
        assert_eq!(api.body().as_ref(), b"missing");
        assert_eq!(api.request().method(), Method::GET);
    }

    #[test]
    fn redirects_are_not_api_errors() {
        assert!(response(304, "").into_result().is_ok());
    }

    #[test]
    fn json_decodes_and_reports_body_on_failure() {
        #[derive(Deserialize)]
        struct Bucket {
            #[serde(rename = "bucketName")]
            bucket_name: String,
        }

        let bucket: Bucket = response(200, r#"{"bucketName":"logs"}"#)
            .json()
            .expect("valid json");
        assert_eq!(bucket.bucket_name, "logs");

        let error = response(200, "not json")
            .json::<Bucket>()
            .err()
            .expect("invalid json");
        assert_eq!(error.code(), ErrorCode::Deserialize);
        assert!(error.to_string().contains("not json"));
    }
}
