use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;
use uuid::Uuid;

use super::{ListResponse, extract_version, item_path, list_paginated, require, versioned};
use crate::ConfResult;
use crate::client::Client;
use crate::context::CallContext;
use crate::request::RequestOptions;
use crate::response::Response;

pub const DOCUMENTS_PATH: &str = "/platform/document/v1/documents";
pub const TRASH_PATH: &str = "/platform/document/v1/trash/documents";
const RESOURCE: &str = "document";

/// A document's metadata together with its content.
#[derive(Clone, Debug)]
pub struct Document {
    pub metadata: Response,
    pub content: Response,
}

#[derive(Clone, Debug)]
pub struct NewDocument {
    pub name: String,
    pub document_type: String,
    pub is_private: bool,
    pub external_id: Option<String>,
    pub content: Bytes,
}

#[derive(Clone, Debug)]
pub struct DocumentUpdate {
    pub name: String,
    pub document_type: String,
    pub is_private: bool,
    pub content: Bytes,
}

#[derive(Clone, Debug)]
pub struct DocumentsClient {
    client: Client,
}

impl DocumentsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, context: &CallContext, id: &str) -> ConfResult<Document> {
        let metadata = self.metadata(context, id).await?;
        let content = self
            .client
            .get(
                context,
                &format!("{}/content", item_path(DOCUMENTS_PATH, id)),
                &RequestOptions::new(),
            )
            .await?
            .into_result()?;
        Ok(Document { metadata, content })
    }

    /// Lists documents, optionally restricted by a platform filter expression.
    pub async fn list(
        &self,
        context: &CallContext,
        filter: Option<&str>,
    ) -> ConfResult<ListResponse> {
        let mut first_page = RequestOptions::new();
        if let Some(filter) = filter.filter(|filter| !filter.is_empty()) {
            first_page = first_page.query_param("filter", filter);
        }
        list_paginated(
            &self.client,
            context,
            DOCUMENTS_PATH,
            first_page,
            "documents",
        )
        .await
    }

    pub async fn create(
        &self,
        context: &CallContext,
        document: &NewDocument,
    ) -> ConfResult<Response> {
        require(RESOURCE, "name", &document.name)?;
        require(RESOURCE, "type", &document.document_type)?;

        let mut form = MultipartForm::new();
        form.text("name", &document.name);
        form.text("type", &document.document_type);
        form.text("isPrivate", bool_text(document.is_private));
        if let Some(external_id) = &document.external_id {
            form.text("externalId", external_id);
        }
        form.file("content", &document.name, &document.content);
        let (content_type, body) = form.finish();

        self.client
            .post(
                context,
                DOCUMENTS_PATH,
                body,
                &RequestOptions::new().content_type(content_type),
            )
            .await?
            .into_result()
    }

    /// Updates metadata, then content, each guarded by the version it expects.
    pub async fn update(
        &self,
        context: &CallContext,
        id: &str,
        update: &DocumentUpdate,
    ) -> ConfResult<Response> {
        require(RESOURCE, "name", &update.name)?;
        let current = self.metadata(context, id).await?;
        let version = extract_version(RESOURCE, id, &current)?;

        let mut form = MultipartForm::new();
        form.text("name", &update.name);
        form.text("type", &update.document_type);
        form.text("isPrivate", bool_text(update.is_private));
        let (content_type, body) = form.finish();
        let metadata = self
            .client
            .patch(
                context,
                &format!("{}/metadata", item_path(DOCUMENTS_PATH, id)),
                body,
                &versioned(&version).content_type(content_type),
            )
            .await?
            .into_result()?;
        let version = extract_version(RESOURCE, id, &metadata)?;

        let mut form = MultipartForm::new();
        form.file("content", &update.name, &update.content);
        let (content_type, body) = form.finish();
        self.client
            .put(
                context,
                &format!("{}/content", item_path(DOCUMENTS_PATH, id)),
                body,
                &versioned(&version).content_type(content_type),
            )
            .await?
            .into_result()
    }

    /// Deletes the document and purges it from the trash.
    pub async fn delete(&self, context: &CallContext, id: &str) -> ConfResult<Response> {
        let current = self.metadata(context, id).await?;
        let version = extract_version(RESOURCE, id, &current)?;
        let deleted = self
            .client
            .delete(context, &item_path(DOCUMENTS_PATH, id), &versioned(&version))
            .await?
            .into_result()?;

        let purge = self
            .client
            .delete(context, &item_path(TRASH_PATH, id), &RequestOptions::new())
            .await?;
        if purge.status() == http::StatusCode::NOT_FOUND {
            debug!(document = id, "document already gone from trash");
            return Ok(deleted);
        }
        purge.into_result()?;
        Ok(deleted)
    }

    async fn metadata(&self, context: &CallContext, id: &str) -> ConfResult<Response> {
        require(RESOURCE, "id", id)?;
        self.client
            .get(context, &item_path(DOCUMENTS_PATH, id), &RequestOptions::new())
            .await?
            .into_result()
    }
}

fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Minimal `multipart/form-data` encoder for in-memory parts.
struct MultipartForm {
    boundary: String,
    body: BytesMut,
}

impl MultipartForm {
    fn new() -> Self {
        Self {
            boundary: format!("confclient-{}", Uuid::new_v4().simple()),
            body: BytesMut::new(),
        }
    }

    fn text(&mut self, name: &str, value: &str) {
        self.part_header(name, None, None);
        self.body.put_slice(value.as_bytes());
        self.body.put_slice(b"\r\n");
    }

    fn file(&mut self, name: &str, filename: &str, content: &[u8]) {
        self.part_header(name, Some(filename), Some("application/json"));
        self.body.put_slice(content);
        self.body.put_slice(b"\r\n");
    }

    fn part_header(&mut self, name: &str, filename: Option<&str>, content_type: Option<&str>) {
        let mut header = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.boundary,
            escape_quoted(name)
        );
        if let Some(filename) = filename {
            header.push_str(&format!("; filename=\"{}\"", escape_quoted(filename)));
        }
        header.push_str("\r\n");
        if let Some(content_type) = content_type {
            header.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        header.push_str("\r\n");
        self.body.put_slice(header.as_bytes());
    }

    fn finish(mut self) -> (String, Bytes) {
        self.body
            .put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body.freeze(),
        )
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}
