//! Shared test doubles for integration tests.

use async_trait::async_trait;
use edgeflow::{ApiGateway, ApiRequest, ApiResponse, GatewayError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One scripted reply for a route.
#[derive(Clone)]
pub enum Scripted {
    Ok(Value),
    Status(u16, Value),
}

/// Programmable in-memory gateway.
///
/// Routes are keyed by `"METHOD path"`. Each route holds a queue of scripted
/// replies; the last reply repeats once the queue is drained, which makes
/// poll loops easy to script.
#[derive(Default)]
pub struct MockGateway {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: &str, path: &str, body: Value) -> &Self {
        self.push(method, path, Scripted::Ok(body));
        self
    }

    pub fn respond_seq(&self, method: &str, path: &str, bodies: Vec<Value>) -> &Self {
        for body in bodies {
            self.push(method, path, Scripted::Ok(body));
        }
        self
    }

    pub fn fail(&self, method: &str, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, Scripted::Status(status, body));
        self
    }

    pub fn fail_times(&self, method: &str, path: &str, status: u16, times: usize) -> &Self {
        for _ in 0..times {
            self.push(method, path, Scripted::Status(status, Value::Null));
        }
        self
    }

    fn push(&self, method: &str, path: &str, reply: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry(format!("{method} {path}"))
            .or_default()
            .push_back(reply);
    }

    /// Total requests seen.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests seen for one route.
    pub fn calls_to(&self, method: &str, path: &str) -> usize {
        let key = format!("{method} {path}");
        self.calls.lock().unwrap().iter().filter(|c| **c == key).count()
    }
}

#[async_trait]
impl ApiGateway for MockGateway {
    async fn request(&self, req: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let key = format!("{} {}", req.method.as_str(), req.path);
        self.calls.lock().unwrap().push(key.clone());

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            let queue = routes
                .get_mut(&key)
                .unwrap_or_else(|| panic!("no scripted reply for {key}"));
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or_else(|| panic!("route {key} exhausted"))
            }
        };

        match reply {
            Scripted::Ok(body) => Ok(ApiResponse { status: 200, body }),
            Scripted::Status(status, body) => Err(GatewayError::from_status(status, body)),
        }
    }
}
