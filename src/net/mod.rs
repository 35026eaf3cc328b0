//! HTTP collaborator: request drafts and the reqwest send path.
//!
//! The engine only needs two things from this layer: a way to turn a
//! draft into a fired request, and the decoded response body as the
//! opaque result that sequence expansion navigates.

pub mod catalog;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::env::{self, EnvManager};
use crate::error::{HttpError, ShellError};

/// A request under construction. Placeholders stay unexpanded until
/// finalize so drafts can be built before their variables exist.
#[derive(Debug, Clone, Default)]
pub struct RequestDraft {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub payload: Option<Value>,
}

/// Fully expanded, ready-to-send request.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub method: reqwest::Method,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub payload: Option<Value>,
}

impl RequestDraft {
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = Some(method.into());
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn set_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query.insert(name.into(), value.into());
    }

    /// Expand `{{var}}` placeholders and validate; url and method are
    /// mandatory. Unknown variables stay literal here, matching draft
    /// semantics.
    pub fn finalize(&self, envs: &EnvManager) -> Result<PreparedRequest, ShellError> {
        let url = self.url.as_deref().ok_or(HttpError::DraftIncomplete)?;
        let method = self.method.as_deref().ok_or(HttpError::DraftIncomplete)?;

        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| HttpError::BadMethod(method.to_string()))?;

        let vars = envs.active_vars();
        let expand = |s: &str| env::expand_placeholders(s, &vars);

        let mut headers = HashMap::new();
        for (k, v) in &self.headers {
            headers.insert(k.clone(), expand(v)?);
        }
        let mut query = HashMap::new();
        for (k, v) in &self.query {
            query.insert(k.clone(), expand(v)?);
        }

        Ok(PreparedRequest {
            url: expand(url)?,
            method,
            headers,
            query,
            payload: self.payload.clone(),
        })
    }
}

/// A finished HTTP exchange. `body` is the decoded JSON body when the
/// response parses as JSON, otherwise the raw text as a JSON string.
#[derive(Debug, Clone)]
pub struct CompletedResponse {
    pub status: u16,
    pub reason: String,
    pub body: Value,
    pub elapsed: Duration,
}

impl CompletedResponse {
    pub fn summary(&self) -> String {
        format!(
            "{} {} ({:.2}s)",
            self.status,
            self.reason,
            self.elapsed.as_secs_f64()
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared reqwest client wrapper, constructed once at startup.
pub struct RequestManager {
    client: reqwest::Client,
}

impl RequestManager {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn build_and_send(
        &self,
        prepared: PreparedRequest,
    ) -> Result<CompletedResponse, HttpError> {
        debug!(method = %prepared.method, url = %prepared.url, "sending request");
        let started = std::time::Instant::now();

        let mut req = self
            .client
            .request(prepared.method, &prepared.url)
            .query(&prepared.query);
        for (name, value) in &prepared.headers {
            req = req.header(name, value);
        }
        if let Some(payload) = &prepared.payload {
            req = req.json(payload);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(CompletedResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
            elapsed: started.elapsed(),
        })
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_requires_url_and_method() {
        let draft = RequestDraft::default();
        assert!(draft.finalize(&EnvManager::new()).is_err());
    }

    #[test]
    fn test_finalize_expands_variables() {
        let envs = EnvManager::new();
        envs.set_var("host", "api.local");
        envs.set_var("token", "abc");

        let mut draft = RequestDraft::default();
        draft.set_url("https://{{host}}/users");
        draft.set_method("get");
        draft.set_header("Authorization", "Bearer {{token}}");

        let prepared = draft.finalize(&envs).unwrap();
        assert_eq!(prepared.url, "https://api.local/users");
        assert_eq!(prepared.method, reqwest::Method::GET);
        assert_eq!(
            prepared.headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
    }

    #[test]
    fn test_bad_method_rejected() {
        let mut draft = RequestDraft::default();
        draft.set_url("https://api.local");
        draft.set_method("FETCH ME");
        let err = draft.finalize(&EnvManager::new()).unwrap_err();
        assert!(err.to_string().contains("unsupported http method"));
    }

    #[test]
    fn test_summary_format() {
        let resp = CompletedResponse {
            status: 200,
            reason: "OK".into(),
            body: Value::Null,
            elapsed: Duration::from_millis(340),
        };
        assert_eq!(resp.summary(), "200 OK (0.34s)");
        assert!(resp.is_success());
    }
}
