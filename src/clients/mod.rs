//! Typed clients for the platform resources.
//!
//! Each client turns resource operations into calls on the shared
//! [`Client`](crate::Client). Payloads stay raw JSON; results are the 2xx
//! [`Response`] or an [`Error`].

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::ConfResult;
use crate::client::Client;
use crate::context::CallContext;
use crate::error::Error;
use crate::request::RequestOptions;
use crate::response::Response;
use crate::util::encode_path_segment;

mod buckets;
mod documents;
mod permissions;
mod segments;
mod slos;

pub use buckets::{BUCKETS_PATH, BucketsClient};
pub use documents::{
    DOCUMENTS_PATH, Document, DocumentUpdate, DocumentsClient, NewDocument, TRASH_PATH,
};
pub use permissions::{PERMISSIONS_PATH, PermissionsClient, ResourceRef};
pub use segments::{SEGMENTS_PATH, SegmentsClient};
pub use slos::{SLOS_PATH, SlosClient};

pub(crate) const OPTIMISTIC_LOCKING_VERSION: &str = "optimistic-locking-version";
pub(crate) const PAGE_KEY: &str = "page-key";
const NEXT_PAGE_KEY: &str = "nextPageKey";

/// All pages returned by a list operation.
#[derive(Clone, Debug)]
pub struct ListResponse {
    pub pages: Vec<Response>,
    items_key: &'static str,
}

impl ListResponse {
    pub(crate) fn new(items_key: &'static str) -> Self {
        Self {
            pages: Vec::new(),
            items_key,
        }
    }

    /// Every item of every page, in page order.
    pub fn all(&self) -> ConfResult<Vec<Value>> {
        let mut items = Vec::new();
        for page in &self.pages {
            let body: Value = page.json()?;
            if let Some(Value::Array(page_items)) = body.get(self.items_key) {
                items.extend(page_items.iter().cloned());
            }
        }
        Ok(items)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Optimistic-locking version read from a resource representation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Version(Value);

impl Version {
    pub(crate) fn as_query(&self) -> String {
        match &self.0 {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        self.0.clone()
    }
}

pub(crate) fn require(resource: &str, field: &str, value: &str) -> ConfResult<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(resource, field, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn item_path(base: &str, id: &str) -> String {
    format!("{base}/{}", encode_path_segment(id))
}

/// Reads `version` from the body, at the top level or under `documentMetadata`.
pub(crate) fn extract_version(
    resource: &str,
    identifier: &str,
    response: &Response,
) -> ConfResult<Version> {
    let body: Value = serde_json::from_slice(response.body()).map_err(|source| {
        Error::runtime(
            resource,
            identifier,
            format!("response is not valid json: {source}"),
        )
    })?;
    let version = body
        .get("version")
        .or_else(|| body.get("documentMetadata").and_then(|meta| meta.get("version")));
    match version {
        Some(value @ (Value::Number(_) | Value::String(_))) => Ok(Version(value.clone())),
        Some(other) => Err(Error::runtime(
            resource,
            identifier,
            format!("version has unexpected type: {other}"),
        )),
        None => Err(Error::runtime(resource, identifier, "response has no version")),
    }
}

/// Parses `data` as a JSON object and sets the given fields on it.
pub(crate) fn with_fields(
    resource: &str,
    data: &[u8],
    fields: impl IntoIterator<Item = (&'static str, Value)>,
) -> ConfResult<Bytes> {
    let mut object: Map<String, Value> = if data.is_empty() {
        Map::new()
    } else {
        serde_json::from_slice(data).map_err(|source| {
            Error::validation(resource, "payload", format!("is not a json object: {source}"))
        })?
    };
    for (name, value) in fields {
        object.insert(name.to_owned(), value);
    }
    serde_json::to_vec(&object)
        .map(Bytes::from)
        .map_err(|source| Error::Serialize { source })
}

pub(crate) fn versioned(version: &Version) -> RequestOptions {
    RequestOptions::new().query_param(OPTIMISTIC_LOCKING_VERSION, version.as_query())
}

/// Follows `nextPageKey` until the last page.
///
/// Follow-up pages are requested with only the page key; the platform
/// rejects other parameters next to it.
pub(crate) async fn list_paginated(
    client: &Client,
    context: &CallContext,
    path: &str,
    first_page: RequestOptions,
    items_key: &'static str,
) -> ConfResult<ListResponse> {
    let mut list = ListResponse::new(items_key);
    let mut options = first_page;
    loop {
        let page = client.get(context, path, &options).await?.into_result()?;
        let next_page_key = next_page_key(&page)?;
        list.pages.push(page);
        match next_page_key {
            Some(key) => options = RequestOptions::new().query_param(PAGE_KEY, key),
            None => return Ok(list),
        }
    }
}

fn next_page_key(page: &Response) -> ConfResult<Option<String>> {
    let body: Value = page.json()?;
    Ok(body
        .get(NEXT_PAGE_KEY)
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
        .map(str::to_owned))
}
