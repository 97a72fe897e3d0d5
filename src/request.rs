use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::{RetryOptions, RetryPredicate};

/// Per-call settings for one transport operation.
///
/// A retry setting given here replaces the client's retry policy as a whole
/// for this call; fields not set take the values of [`RetryOptions::default`].
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    query: BTreeMap<String, Vec<String>>,
    content_type: Option<String>,
    resource_path: Option<String>,
    retry: Option<RetryOptions>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one value to a (possibly repeated) query parameter.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn query_params<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (name, value) in pairs {
            self = self.query_param(name, value);
        }
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sends the request to this path instead of the one passed to the call.
    pub fn resource_path(mut self, resource_path: impl Into<String>) -> Self {
        self.resource_path = Some(resource_path.into());
        self
    }

    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry = Some(self.retry.take().unwrap_or_default().max_retries(max_retries));
        self
    }

    pub fn delay_after_retry(mut self, delay: Duration) -> Self {
        self.retry = Some(self.retry.take().unwrap_or_default().delay_after_retry(delay));
        self
    }

    pub fn should_retry(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.retry = Some(self.retry.take().unwrap_or_default().should_retry(predicate));
        self
    }

    pub fn query(&self) -> &BTreeMap<String, Vec<String>> {
        &self.query
    }

    pub fn content_type_override(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn resource_path_override(&self) -> Option<&str> {
        self.resource_path.as_deref()
    }

    pub fn retry_override(&self) -> Option<&RetryOptions> {
        self.retry.as_ref()
    }

    pub(crate) fn effective_path<'a>(&'a self, path: &'a str) -> &'a str {
        self.resource_path.as_deref().unwrap_or(path)
    }

    pub(crate) fn effective_retry(&self, client_default: &RetryOptions) -> RetryOptions {
        self.retry
            .clone()
            .unwrap_or_else(|| client_default.clone())
    }
}
