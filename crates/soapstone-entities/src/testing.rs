//! In-process executors for driving hooks without a server.
//!
//! [`ScriptedExecutor`] parks every request until the test answers it, which
//! makes the state between an optimistic change and its settlement
//! observable. [`QueuedExecutor`] answers immediately from a queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::{ApiResponse, EntityRequest, RequestError, RequestExecutor};

/// A request waiting for its scripted answer.
///
/// Dropping it without answering fails the request with a transport error.
#[derive(Debug)]
pub struct PendingRequest {
    pub request: EntityRequest,
    responder: oneshot::Sender<Result<ApiResponse, RequestError>>,
}

impl PendingRequest {
    pub fn respond(self, result: Result<ApiResponse, RequestError>) {
        // The caller may have gone away; nothing to do then.
        let _ = self.responder.send(result);
    }

    /// Answer `200 OK` with a JSON body.
    pub fn ok(self, body: serde_json::Value) {
        self.respond(Ok(ApiResponse::json(body)));
    }

    /// Answer `204 No Content`.
    pub fn ok_empty(self) {
        self.respond(Ok(ApiResponse::empty()));
    }

    /// Answer with an error status.
    pub fn fail(self, status: u16) {
        self.respond(Err(RequestError::Status { status, body: None }));
    }
}

/// Executor whose requests are answered one by one by the test.
pub struct ScriptedExecutor {
    tx: mpsc::UnboundedSender<PendingRequest>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PendingRequest>>,
    logged_in: AtomicBool,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            logged_in: AtomicBool::new(true),
        })
    }

    /// Wait for the next request a hook sends.
    pub async fn next_request(&self) -> Option<PendingRequest> {
        self.rx.lock().await.recv().await
    }

    /// A request already sent, if any, without waiting.
    pub fn try_next_request(&self) -> Option<PendingRequest> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(&self, request: &EntityRequest) -> Result<ApiResponse, RequestError> {
        let (responder, response) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                request: request.clone(),
                responder,
            })
            .map_err(|_| RequestError::Transport("scripted executor closed".to_string()))?;
        response
            .await
            .map_err(|_| RequestError::Transport("request dropped without a response".to_string()))?
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}

/// Executor that answers from a queue of canned responses and records
/// every request it sees.
pub struct QueuedExecutor {
    responses: Mutex<VecDeque<Result<ApiResponse, RequestError>>>,
    requests: Mutex<Vec<EntityRequest>>,
    logged_in: AtomicBool,
}

impl QueuedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            logged_in: AtomicBool::new(true),
        })
    }

    pub fn push(&self, result: Result<ApiResponse, RequestError>) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
        self
    }

    pub fn push_json(&self, body: serde_json::Value) -> &Self {
        self.push(Ok(ApiResponse::json(body)))
    }

    pub fn push_status(&self, status: u16) -> &Self {
        self.push(Err(RequestError::Status { status, body: None }))
    }

    /// Every request executed so far, oldest first.
    pub fn requests(&self) -> Vec<EntityRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestExecutor for QueuedExecutor {
    async fn execute(&self, request: &EntityRequest) -> Result<ApiResponse, RequestError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(RequestError::Transport("no queued response".to_string())))
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}
