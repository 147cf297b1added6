use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::client::GitHubApi;

/// In-memory [`GitHubApi`] that records every call.
#[derive(Default)]
pub struct FakeGitHub {
    responses: HashMap<String, Value>,
    fail_posts: bool,
    calls: Mutex<Vec<(String, String)>>,
    posted: Mutex<Vec<(String, Value)>>,
}

impl FakeGitHub {
    pub fn with_response(mut self, endpoint: &str, value: Value) -> Self {
        self.responses.insert(endpoint.to_string(), value);
        self
    }

    pub fn failing_posts(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    /// `(method, endpoint)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<(String, Value)> {
        self.posted.lock().unwrap().clone()
    }

    fn record(&self, method: &str, endpoint: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), endpoint.to_string()));
    }

    fn lookup(&self, endpoint: &str) -> Result<Value> {
        self.responses
            .get(endpoint)
            .cloned()
            .ok_or_else(|| anyhow!("gh api {} failed: HTTP 404: Not Found", endpoint))
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn get(&self, endpoint: &str) -> Result<Value> {
        self.record("GET", endpoint);
        self.lookup(endpoint)
    }

    async fn get_paginated(&self, endpoint: &str) -> Result<Vec<Value>> {
        self.record("GET", endpoint);
        match self.lookup(endpoint)? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.record("POST", endpoint);
        if self.fail_posts {
            return Err(anyhow!("gh api {} failed: HTTP 403: Forbidden", endpoint));
        }
        self.posted
            .lock()
            .unwrap()
            .push((endpoint.to_string(), body.clone()));
        Ok(serde_json::json!({ "id": 1 }))
    }
}
