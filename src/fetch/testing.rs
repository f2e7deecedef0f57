//! Scripted origin used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::fetch::{FetchError, FetchMode, OriginFetch, OriginResponse, ResponseKind};

#[derive(Debug, Clone)]
enum Outcome {
    Serve { status: u16, body: Bytes },
    Opaque { body: Bytes },
    Fail,
}

#[derive(Debug, Clone)]
struct Plan {
    failures_left: usize,
    outcome: Outcome,
}

/// An origin answering from a fixed script; unknown URLs fail.
#[derive(Debug, Default)]
pub struct ScriptedOrigin {
    plans: Mutex<HashMap<String, Plan>>,
    calls: Mutex<Vec<(String, FetchMode)>>,
}

impl ScriptedOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    fn plan(self, url: &str, failures_left: usize, outcome: Outcome) -> Self {
        self.plans.lock().unwrap().insert(
            url.to_string(),
            Plan {
                failures_left,
                outcome,
            },
        );
        self
    }

    pub fn serve(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.serve_after_failures(url, 0, body)
    }

    pub fn serve_after_failures(self, url: &str, failures: usize, body: impl Into<Bytes>) -> Self {
        let outcome = Outcome::Serve {
            status: 200,
            body: body.into(),
        };
        self.plan(url, failures, outcome)
    }

    pub fn serve_status(self, url: &str, status: u16) -> Self {
        let outcome = Outcome::Serve {
            status,
            body: Bytes::new(),
        };
        self.plan(url, 0, outcome)
    }

    /// Fails CORS requests, answers no-cors ones with an opaque body.
    pub fn serve_opaque(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.plan(url, 0, Outcome::Opaque { body: body.into() })
    }

    pub fn always_fail(self, url: &str) -> Self {
        self.plan(url, 0, Outcome::Fail)
    }

    pub fn calls(&self) -> Vec<(String, FetchMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }
}

#[async_trait]
impl OriginFetch for ScriptedOrigin {
    async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<OriginResponse, FetchError> {
        self.calls.lock().unwrap().push((url.to_string(), mode));

        let outcome = {
            let mut plans = self.plans.lock().unwrap();
            match plans.get_mut(url.as_str()) {
                Some(plan) if plan.failures_left > 0 => {
                    plan.failures_left -= 1;
                    Outcome::Fail
                }
                Some(plan) => plan.outcome.clone(),
                None => Outcome::Fail,
            }
        };

        match (outcome, mode) {
            (Outcome::Serve { status, body }, _) => Ok(OriginResponse::from_bytes(
                status,
                ResponseKind::Basic,
                Some("image/jpeg".to_string()),
                body,
            )),
            (Outcome::Opaque { body }, FetchMode::NoCors) => Ok(OriginResponse::from_bytes(
                0,
                ResponseKind::Opaque,
                None,
                body,
            )),
            (Outcome::Opaque { .. }, FetchMode::Cors) => Err(FetchError::Cors(url.to_string())),
            (Outcome::Fail, _) => Err(FetchError::Network(format!("scripted failure for {}", url))),
        }
    }
}
