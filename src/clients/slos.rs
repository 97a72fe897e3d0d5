use bytes::Bytes;

use super::{ListResponse, extract_version, item_path, list_paginated, require, versioned};
use crate::ConfResult;
use crate::client::Client;
use crate::context::CallContext;
use crate::request::RequestOptions;
use crate::response::Response;

pub const SLOS_PATH: &str = "/platform/slo/v1/slos";
const RESOURCE: &str = "slo";

#[derive(Clone, Debug)]
pub struct SlosClient {
    client: Client,
}

impl SlosClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn list(&self, context: &CallContext) -> ConfResult<ListResponse> {
        list_paginated(
            &self.client,
            context,
            SLOS_PATH,
            RequestOptions::new(),
            "slos",
        )
        .await
    }

    pub async fn get(&self, context: &CallContext, id: &str) -> ConfResult<Response> {
        require(RESOURCE, "id", id)?;
        self.client
            .get(context, &item_path(SLOS_PATH, id), &RequestOptions::new())
            .await?
            .into_result()
    }

    pub async fn create(&self, context: &CallContext, data: &[u8]) -> ConfResult<Response> {
        self.client
            .post(
                context,
                SLOS_PATH,
                Bytes::copy_from_slice(data),
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
        let version = extract_version(RESOURCE, id, &current)?;
        self.client
            .put(
                context,
                &item_path(SLOS_PATH, id),
                Bytes::copy_from_slice(data),
                &versioned(&version),
            )
            .await?
            .into_result()
    }

    pub async fn delete(&self, context: &CallContext, id: &str) -> ConfResult<Response> {
        let current = self.get(context, id).await?;
        let version = extract_version(RESOURCE, id, &current)?;
        self.client
            .delete(context, &item_path(SLOS_PATH, id), &versioned(&version))
            .await?
            .into_result()
    }
}
