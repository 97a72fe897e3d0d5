mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use confclient::prelude::{CallContext, Client, ErrorCode, RequestOptions, RetryOptions};
use confclient::{ChannelRecorder, RecordedEvent, Response};
use http::StatusCode;

use common::{MockResponse, MockServer};

fn quick_retry(max_retries: u32) -> RetryOptions {
    RetryOptions::standard()
        .max_retries(max_retries)
        .delay_after_retry(Duration::from_millis(20))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_once_until_ok_on_real_connection() {
    let server = MockServer::start(vec![
        MockResponse::new(400, r#"{"error":"bad"}"#),
        MockResponse::new(200, r#"{"ok":true}"#),
    ]);
    let client = Client::builder(server.base_url())
        .retry_options(
            quick_retry(1).should_retry(|response: &Response| response.status() != StatusCode::OK),
        )
        .build();

    let response = client
        .get(&CallContext::background(), "/v1/items", &RequestOptions::new())
        .await
        .expect("second attempt should succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), br#"{"ok":true}"#);
    assert_eq!(server.served_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retry_budget_ends_with_final_error_response() {
    let server = MockServer::start(vec![
        MockResponse::new(503, "one"),
        MockResponse::new(503, "two"),
        MockResponse::new(503, "three"),
    ]);
    let client = Client::builder(server.base_url())
        .retry_options(quick_retry(2))
        .build();

    let response = client
        .get(&CallContext::background(), "/v1/items", &RequestOptions::new())
        .await
        .expect("status responses are not transport errors");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text_lossy(), "three");
    assert_eq!(server.served_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recorder_receives_two_events_per_call() {
    let server = MockServer::start(vec![
        MockResponse::new(200, r#"{"id":"a"}"#),
        MockResponse::new(201, r#"{"id":"b"}"#),
    ]);
    let (recorder, mut receiver) = ChannelRecorder::channel();
    let client = Client::builder(server.base_url())
        .recorder(recorder)
        .build();
    let context = CallContext::background();

    let fetched = client
        .get(&context, "/v1/items/a", &RequestOptions::new())
        .await
        .expect("get");
    assert_eq!(fetched.body().as_ref(), br#"{"id":"a"}"#);
    client
        .post(&context, "/v1/items", r#"{"id":"b"}"#, &RequestOptions::new())
        .await
        .expect("post");

    let mut events: Vec<RecordedEvent> = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 4);
    assert!(events[0].is_request() && events[1].is_response());
    assert!(events[2].is_request() && events[3].is_response());
    assert_eq!(events[0].id, events[1].id);
    assert_eq!(events[2].id, events[3].id);
    assert_eq!(
        events[1].response.as_ref().map(|response| response.body.clone()),
        Some(fetched.body().clone())
    );
    assert_eq!(
        events[2].request.as_ref().map(|request| request.body.clone()),
        Some(bytes::Bytes::from_static(br#"{"id":"b"}"#))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hang_up_is_reported_as_connection_closed() {
    let server = MockServer::start(vec![MockResponse::hang_up()]);
    let events: Arc<Mutex<Vec<RecordedEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    let client = Client::builder(server.base_url())
        .retry_options(quick_retry(3))
        .recorder(move |event: RecordedEvent| sink.lock().expect("lock").push(event))
        .build();

    let error = client
        .get(&CallContext::background(), "/v1/items", &RequestOptions::new())
        .await
        .expect_err("server closed without answering");

    assert_eq!(error.code(), ErrorCode::ConnectionClosed);
    assert!(error.to_string().contains("connection closed"));
    assert_eq!(server.served_count(), 1);
    let events = events.lock().expect("lock");
    assert_eq!(events.len(), 2);
    assert!(events[1].is_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn headers_query_and_body_reach_the_server() {
    let server = MockServer::start(vec![
        MockResponse::new(200, "{}"),
        MockResponse::new(200, "{}"),
    ]);
    let client = Client::builder(server.base_url())
        .try_header("x-request-source", "integration")
        .expect("valid header")
        .build();
    let context = CallContext::background();

    client
        .get(
            &context,
            "/v1/segments",
            &RequestOptions::new()
                .query_param("add-fields", "INCLUDES,VARIABLES")
                .query_param("filter", "a b"),
        )
        .await
        .expect("get");
    client
        .put(
            &context,
            "/v1/raw",
            "name: x",
            &RequestOptions::new().content_type("application/yaml"),
        )
        .await
        .expect("put");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].path,
        "/v1/segments?add-fields=INCLUDES%2CVARIABLES&filter=a+b"
    );
    assert_eq!(
        requests[0].headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
    assert_eq!(
        requests[0].headers.get("x-request-source").map(String::as_str),
        Some("integration")
    );
    assert_eq!(requests[1].method, "PUT");
    assert_eq!(requests[1].body, b"name: x");
    assert_eq!(
        requests[1].headers.get("content-type").map(String::as_str),
        Some("application/yaml")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_timeout_interrupts_slow_server() {
    let server = MockServer::start(vec![
        MockResponse::new(200, "late").delay(Duration::from_millis(400)),
    ]);
    let client = Client::builder(server.base_url())
        .request_timeout(Duration::from_millis(80))
        .build();

    let error = client
        .get(&CallContext::background(), "/v1/slow", &RequestOptions::new())
        .await
        .expect_err("slow server");
    assert_eq!(error.code(), ErrorCode::Timeout);
}
