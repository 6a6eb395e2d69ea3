//! Scripted `Transport` shared by the unit and integration tests.
//!
//! The including module provides `Transport`, `CellFetchError` and `Result`.

use super::{CellFetchError, Result, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

#[derive(Clone)]
struct Route {
    body: std::result::Result<Bytes, String>,
    delay: Duration,
    gate: Option<Arc<Notify>>,
}

/// Transport answering from a fixed routing table.
///
/// A gated route waits for `Notify::notify_one` before answering, which lets
/// tests cancel or supersede a fetch while it is in flight. Delays run on
/// tokio time. Unknown URLs get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    pub fn respond(&self, url: &str, body: impl Into<Bytes>) {
        self.respond_after(url, body, Duration::ZERO);
    }

    pub fn respond_after(&self, url: &str, body: impl Into<Bytes>, delay: Duration) {
        self.route(
            url,
            Route {
                body: Ok(body.into()),
                delay,
                gate: None,
            },
        );
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.fail_after(url, message, Duration::ZERO);
    }

    pub fn fail_after(&self, url: &str, message: &str, delay: Duration) {
        self.route(
            url,
            Route {
                body: Err(message.to_string()),
                delay,
                gate: None,
            },
        );
    }

    /// Respond with `body` once the returned gate is notified.
    pub fn respond_gated(&self, url: &str, body: impl Into<Bytes>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.route(
            url,
            Route {
                body: Ok(body.into()),
                delay: Duration::ZERO,
                gate: Some(gate.clone()),
            },
        );
        gate
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform_request(&self, url: &Url, _timeout: Duration) -> Result<Bytes> {
        self.calls.lock().unwrap().push(url.to_string());

        let route = self.routes.lock().unwrap().get(url.as_str()).cloned();
        let Some(route) = route else {
            return Err(CellFetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            });
        };

        if let Some(gate) = &route.gate {
            gate.notified().await;
        }
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }

        route.body.map_err(CellFetchError::Other)
    }
}
