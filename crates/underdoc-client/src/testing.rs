use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use underdoc_core::error::{Result, UnderdocError};
use underdoc_core::transport::{RawResponse, Transport, TransportRequest};

/// In-memory transport replaying canned responses in order.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value>>>,
    repeat: Option<Value>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<Value>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with the same payload.
    pub fn repeating(response: Value) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.path.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        let value = match (next, &self.repeat) {
            (Some(result), _) => result?,
            (None, Some(value)) => value.clone(),
            (None, None) => {
                return Err(UnderdocError::Protocol(
                    "scripted transport ran out of responses".into(),
                ))
            }
        };
        value
            .as_object()
            .cloned()
            .ok_or_else(|| UnderdocError::Protocol("scripted response is not an object".into()))
    }
}
