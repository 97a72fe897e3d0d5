use serde_json::Value;
use tracing::debug;

use super::{ListResponse, extract_version, item_path, require, versioned, with_fields};
use crate::ConfResult;
use crate::client::Client;
use crate::context::CallContext;
use crate::request::RequestOptions;
use crate::response::Response;

pub const SEGMENTS_PATH: &str = "/platform/storage/filter-segments/v1/filter-segments";
const RESOURCE: &str = "segment";
const ADD_FIELDS: [&str; 4] = ["INCLUDES", "VARIABLES", "EXTERNALID", "RESOURCECONTEXT"];

fn with_all_fields() -> RequestOptions {
    RequestOptions::new().query_param("add-fields", ADD_FIELDS.join(","))
}

/// Filter segments, addressed by uid.
#[derive(Clone, Debug)]
pub struct SegmentsClient {
    client: Client,
}

impl SegmentsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn list(&self, context: &CallContext) -> ConfResult<ListResponse> {
        let page = self
            .client
            .get(context, SEGMENTS_PATH, &with_all_fields())
            .await?
            .into_result()?;
        let mut list = ListResponse::new("filterSegments");
        list.pages.push(page);
        Ok(list)
    }

    pub async fn get(&self, context: &CallContext, id: &str) -> ConfResult<Response> {
        require(RESOURCE, "uid", id)?;
        self.client
            .get(context, &item_path(SEGMENTS_PATH, id), &with_all_fields())
            .await?
            .into_result()
    }

    pub async fn create(&self, context: &CallContext, data: &[u8]) -> ConfResult<Response> {
        self.client
            .post(
                context,
                SEGMENTS_PATH,
                bytes::Bytes::copy_from_slice(data),
                &RequestOptions::new(),
            )
            .await?
            .into_result()
    }

    pub async fn update(
        &self,
        context: &CallContext,
        id: &str,
        data: &[u8],
    ) -> ConfResult<Response> {
        let current = self.get(context, id).await?;
        self.put_at_version(context, id, data, &current).await
    }

    /// Updates the segment, or creates it under `id` when it does not exist.
    pub async fn upsert(
        &self,
        context: &CallContext,
        id: &str,
        data: &[u8],
    ) -> ConfResult<Response> {
        match self.get(context, id).await {
            Ok(current) => self.put_at_version(context, id, data, &current).await,
            Err(error) if error.is_not_found() => {
                debug!(segment = id, "segment not found; creating");
                let body = with_fields(RESOURCE, data, [("uid", Value::from(id))])?;
                self.create(context, &body).await
            }
            Err(error) => Err(error),
        }
    }

    pub async fn delete(&self, context: &CallContext, id: &str) -> ConfResult<Response> {
        require(RESOURCE, "uid", id)?;
        self.client
            .delete(context, &item_path(SEGMENTS_PATH, id), &RequestOptions::new())
            .await?
            .into_result()
    }

    async fn put_at_version(
        &self,
        context: &CallContext,
        id: &str,
        data: &[u8],
        current: &Response,
    ) -> ConfResult<Response> {
        let version = extract_version(RESOURCE, id, current)?;
        let body = with_fields(RESOURCE, data, [("uid", Value::from(id))])?;
        self.client
            .put(context, &item_path(SEGMENTS_PATH, id), body, &versioned(&version))
            .await?
            .into_result()
    }
}
