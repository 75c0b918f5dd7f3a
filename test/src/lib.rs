//! Shared helpers for mooring integration tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde_json::Value;

use mooring_client::{ClientConfig, HttpRequest, HttpTransport, LoadConfig, TransportError};

/// Client configuration against a fake endpoint, with identity configured.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        endpoint: "https://db.test".to_string(),
        api_path: None,
        token: "test-token".to_string(),
        user_id: Some("user-1".to_string()),
        fingerprint: Some("stable-device-fingerprint".to_string()),
        load: LoadConfig::default(),
    }
}

/// Yields to the executor exactly once, so a mock request spans more than
/// one poll and overlapping dispatch would be observable.
pub struct YieldOnce {
    yielded: bool,
}

impl YieldOnce {
    pub fn new() -> Self {
        Self { yielded: false }
    }
}

impl Default for YieldOnce {
    fn default() -> Self {
        Self::new()
    }
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Scripted transport: records every request, answers from a FIFO of canned
/// responses, and tracks how many sends were ever in flight at once.
pub struct MockTransport {
    requests: RefCell<Vec<HttpRequest>>,
    responses: RefCell<VecDeque<Result<Value, TransportError>>>,
    in_flight: Cell<usize>,
    max_in_flight: Cell<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            responses: RefCell::new(VecDeque::new()),
            in_flight: Cell::new(0),
            max_in_flight: Cell::new(0),
        }
    }

    pub fn respond_with(&self, response: Value) {
        self.responses.borrow_mut().push_back(Ok(response));
    }

    pub fn fail_with(&self, error: TransportError) {
        self.responses.borrow_mut().push_back(Err(error));
    }

    /// Requests seen so far, in dispatch order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Highest number of concurrently in-flight sends observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.get()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value, TransportError> {
        self.requests.borrow_mut().push(request);

        let current = self.in_flight.get() + 1;
        self.in_flight.set(current);
        self.max_in_flight
            .set(self.max_in_flight.get().max(current));

        // Hold the request "on the wire" across a poll boundary.
        YieldOnce::new().await;

        self.in_flight.set(self.in_flight.get() - 1);
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }
}
