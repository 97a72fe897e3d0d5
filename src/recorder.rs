//! Observation of every request the transport sends and every outcome it
//! receives.
//!
//! A recorder runs synchronously on the task making the call, so slow
//! recorders slow down requests. [`ChannelRecorder`] hands events to an
//! unbounded channel when the consumer should run elsewhere.

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, ErrorCode};

pub trait Recorder: Send + Sync {
    fn record(&self, event: RecordedEvent);
}

impl<F> Recorder for F
where
    F: Fn(RecordedEvent) + Send + Sync,
{
    fn record(&self, event: RecordedEvent) {
        self(event)
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Debug)]
pub struct RecordedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Debug)]
pub struct RecordedError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&Error> for RecordedError {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// One observation. The request event and the outcome event of the same
/// attempt share `id`.
#[derive(Clone, Debug)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub timestamp: SystemTime,
    pub request: Option<RecordedRequest>,
    pub response: Option<RecordedResponse>,
    pub error: Option<RecordedError>,
}

impl RecordedEvent {
    pub(crate) fn request(id: Uuid, timestamp: SystemTime, request: RecordedRequest) -> Self {
        Self {
            id,
            timestamp,
            request: Some(request),
            response: None,
            error: None,
        }
    }

    pub(crate) fn response(id: Uuid, timestamp: SystemTime, response: RecordedResponse) -> Self {
        Self {
            id,
            timestamp,
            request: None,
            response: Some(response),
            error: None,
        }
    }

    pub(crate) fn error(id: Uuid, timestamp: SystemTime, error: &Error) -> Self {
        Self {
            id,
            timestamp,
            request: None,
            response: None,
            error: Some(error.into()),
        }
    }

    pub fn is_request(&self) -> bool {
        self.request.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Forwards events into a tokio channel; sends to a closed channel are dropped.
#[derive(Clone)]
pub struct ChannelRecorder {
    sender: mpsc::UnboundedSender<RecordedEvent>,
}

impl fmt::Debug for ChannelRecorder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ChannelRecorder")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl ChannelRecorder {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RecordedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Recorder for ChannelRecorder {
    fn record(&self, event: RecordedEvent) {
        let _ = self.sender.send(event);
    }
}
