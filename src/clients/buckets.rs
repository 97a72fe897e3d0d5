use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use super::{ListResponse, extract_version, item_path, require, versioned, with_fields};
use crate::ConfResult;
use crate::client::Client;
use crate::context::CallContext;
use crate::request::RequestOptions;
use crate::response::Response;

pub const BUCKETS_PATH: &str = "/platform/storage/management/v1/bucket-definitions";
const RESOURCE: &str = "bucket";

/// Storage bucket definitions, addressed by bucket name.
#[derive(Clone, Debug)]
pub struct BucketsClient {
    client: Client,
}

impl BucketsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, context: &CallContext, name: &str) -> ConfResult<Response> {
        require(RESOURCE, "bucketName", name)?;
        self.client
            .get(context, &item_path(BUCKETS_PATH, name), &RequestOptions::new())
            .await?
            .into_result()
    }

    pub async fn list(&self, context: &CallContext) -> ConfResult<ListResponse> {
        let page = self
            .client
            .get(context, BUCKETS_PATH, &RequestOptions::new())
            .await?
            .into_result()?;
        let mut list = ListResponse::new("buckets");
        list.pages.push(page);
        Ok(list)
    }

    /// Creates the bucket; `bucketName` in `data` is set to `name`.
    pub async fn create(
        &self,
        context: &CallContext,
        name: &str,
        data: &[u8],
    ) -> ConfResult<Response> {
        require(RESOURCE, "bucketName", name)?;
        let body = with_fields(RESOURCE, data, [("bucketName", Value::from(name))])?;
        self.client
            .post(context, BUCKETS_PATH, body, &RequestOptions::new())
            .await?
            .into_result()
    }

    /// Replaces the definition of an existing bucket at its current version.
    pub async fn update(
        &self,
        context: &CallContext,
        name: &str,
        data: &[u8],
    ) -> ConfResult<Response> {
        require(RESOURCE, "bucketName", name)?;
        let current = self.get(context, name).await?;
        let version = extract_version(RESOURCE, name, &current)?;
        let body: Bytes = with_fields(
            RESOURCE,
            data,
            [
                ("bucketName", Value::from(name)),
                ("version", version.to_json()),
            ],
        )?;
        self.client
            .put(
                context,
                &item_path(BUCKETS_PATH, name),
                body,
                &versioned(&version),
            )
            .await?
            .into_result()
    }

    /// Creates the bucket, or updates it when it already exists.
    pub async fn upsert(
        &self,
        context: &CallContext,
        name: &str,
        data: &[u8],
    ) -> ConfResult<Response> {
        match self.create(context, name, data).await {
            Err(error) if error.api_error().is_some_and(|api| api.is_conflict()) => {
                debug!(bucket = name, "bucket exists; updating");
                self.update(context, name, data).await
            }
            result => result,
        }
    }

    pub async fn delete(&self, context: &CallContext, name: &str) -> ConfResult<Response> {
        require(RESOURCE, "bucketName", name)?;
        self.client
            .delete(context, &item_path(BUCKETS_PATH, name), &RequestOptions::new())
            .await?
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::Method;
    use serde_json::json;

    use super::{BUCKETS_PATH, BucketsClient};
    use crate::clients::testing::{ScriptedExecutor, client_with};
    use crate::context::CallContext;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn create_injects_bucket_name() {
        let executor = Arc::new(ScriptedExecutor::new([(201, "{}")]));
        let buckets = BucketsClient::new(client_with(Arc::clone(&executor)));

        buckets
            .create(
                &CallContext::background(),
                "logs",
                br#"{"table":"logs","retentionDays":35}"#,
            )
            .await
            .expect("created");

        let seen = executor.seen();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].path_and_query(), BUCKETS_PATH);
        assert_eq!(
            seen[0].json(),
            json!({"bucketName":"logs","table":"logs","retentionDays":35})
        );
    }

    #[tokio::test]
    async fn upsert_updates_on_conflict_with_current_version() {
        let executor = Arc::new(ScriptedExecutor::new([
            (409, r#"{"error":"exists"}"#),
            (200, r#"{"bucketName":"logs","version":4}"#),
            (200, r#"{"bucketName":"logs","version":5}"#),
        ]));
        let buckets = BucketsClient::new(client_with(Arc::clone(&executor)));

        let response = buckets
            .upsert(&CallContext::background(), "logs", br#"{"table":"logs"}"#)
            .await
            .expect("updated");
        assert!(response.is_success());

        let seen = executor.seen();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].method, Method::GET);
        assert_eq!(seen[1].path_and_query(), format!("{BUCKETS_PATH}/logs"));
        assert_eq!(seen[2].method, Method::PUT);
        assert_eq!(
            seen[2].path_and_query(),
            format!("{BUCKETS_PATH}/logs?optimistic-locking-version=4")
        );
        assert_eq!(
            seen[2].json(),
            json!({"bucketName":"logs","table":"logs","version":4})
        );
    }

    #[tokio::test]
    async fn upsert_surfaces_other_create_failures() {
        let executor = Arc::new(ScriptedExecutor::new([(400, r#"{"error":"bad"}"#)]));
        let buckets = BucketsClient::new(client_with(Arc::clone(&executor)));

        let error = buckets
            .upsert(&CallContext::background(), "logs", b"{}")
            .await
            .expect_err("bad request");
        assert_eq!(error.status().map(|status| status.as_u16()), Some(400));
        assert_eq!(executor.seen().len(), 1);
    }

    #[tokio::test]
    async fn update_without_version_is_a_runtime_error() {
        let executor = Arc::new(ScriptedExecutor::new([(200, r#"{"bucketName":"logs"}"#)]));
        let buckets = BucketsClient::new(client_with(Arc::clone(&executor)));

        let error = buckets
            .update(&CallContext::background(), "logs", b"{}")
            .await
            .expect_err("missing version");
        assert_eq!(error.code(), ErrorCode::Runtime);
        assert_eq!(executor.seen().len(), 1);
    }

    #[tokio::test]
    async fn empty_name_fails_before_any_request() {
        let executor = Arc::new(ScriptedExecutor::default());
        let buckets = BucketsClient::new(client_with(Arc::clone(&executor)));

        let error = buckets
            .delete(&CallContext::background(), "")
            .await
            .expect_err("validation");
        assert_eq!(error.code(), ErrorCode::Validation);
        assert!(executor.seen().is_empty());
    }
}
