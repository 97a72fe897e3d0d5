use bytes::Bytes;

use super::require;
use crate::ConfResult;
use crate::client::Client;
use crate::context::CallContext;
use crate::request::RequestOptions;
use crate::response::Response;
use crate::util::encode_path_segment;

pub const PERMISSIONS_PATH: &str = "/platform/iam/v1/resources";
const RESOURCE: &str = "permission";

/// A platform object whose access permissions are managed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    pub resource_type: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    fn permissions_path(&self) -> ConfResult<String> {
        require(RESOURCE, "resourceType", &self.resource_type)?;
        require(RESOURCE, "resourceId", &self.id)?;
        Ok(format!(
            "{PERMISSIONS_PATH}/{}/{}/permissions",
            encode_path_segment(&self.resource_type),
            encode_path_segment(&self.id)
        ))
    }
}

#[derive(Clone, Debug)]
pub struct PermissionsClient {
    client: Client,
}

impl PermissionsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, context: &CallContext, resource: &ResourceRef) -> ConfResult<Response> {
        let path = resource.permissions_path()?;
        self.client
            .get(context, &path, &RequestOptions::new())
            .await?
            .into_result()
    }

    /// Replaces all permissions of the resource.
    pub async fn set(
        &self,
        context: &CallContext,
        resource: &ResourceRef,
        data: &[u8],
    ) -> ConfResult<Response> {
        let path = resource.permissions_path()?;
        self.client
            .put(
                context,
                &path,
                Bytes::copy_from_slice(data),
                &RequestOptions::new(),
            )
            .await?
            .into_result()
    }

    pub async fn delete(
        &self,
        context: &CallContext,
        resource: &ResourceRef,
    ) -> ConfResult<Response> {
        let path = resource.permissions_path()?;
        self.client
            .delete(context, &path, &RequestOptions::new())
            .await?
            .into_result()
    }
}
