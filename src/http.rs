//! HTTP Adapter port (spec.md §4.5's transport seam).
//!
//! `HttpAdapter` abstracts the single thing the API layer needs from a
//! transport: send a request, get back a status code and body. Retry and
//! backoff logic in `crate::api` is tested against an in-memory adapter
//! double instead of real sockets. The default `ReqwestAdapter` maps
//! connection failures to the synthetic status `0` and timeouts to `408`,
//! so `crate::api`'s retry classifier never needs to inspect transport-level
//! error types directly.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Transport-level outcome: always a status code plus a body, even for
/// failures that never reached a server.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpAdapter: Send + Sync {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> HttpResponse;

    async fn post(&self, url: &str, headers: &HashMap<String, String>, body: &Value) -> HttpResponse;
}

/// Default transport, backed by `reqwest`.
pub struct ReqwestAdapter {
    client: reqwest::Client,
}

impl ReqwestAdapter {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }

    fn apply_headers(
        mut builder: reqwest::RequestBuilder,
        headers: &HashMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        builder
    }

    async fn to_response(result: Result<reqwest::Response, reqwest::Error>) -> HttpResponse {
        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .json::<Value>()
                    .await
                    .unwrap_or(Value::Null);
                HttpResponse { status, body }
            }
            Err(e) if e.is_timeout() => HttpResponse {
                status: 408,
                body: Value::String(e.to_string()),
            },
            Err(e) => HttpResponse {
                status: 0,
                body: Value::String(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl HttpAdapter for ReqwestAdapter {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> HttpResponse {
        let builder = Self::apply_headers(self.client.get(url), headers);
        Self::to_response(builder.send().await).await
    }

    async fn post(&self, url: &str, headers: &HashMap<String, String>, body: &Value) -> HttpResponse {
        let builder = Self::apply_headers(self.client.post(url), headers).json(body);
        Self::to_response(builder.send().await).await
    }
}

/// In-memory adapter double for tests: a scripted queue of responses per
/// method+path, with every call recorded for assertions.
#[cfg(test)]
pub mod test_double {
    use super::*;
    use std::sync::Mutex;

    pub struct RecordedCall {
        pub method: &'static str,
        pub url: String,
        pub body: Option<Value>,
    }

    #[derive(Default)]
    pub struct ScriptedAdapter {
        responses: Mutex<std::collections::VecDeque<HttpResponse>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, response: HttpResponse) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Snapshot of the most recent recorded call, for assertions on the
        /// URL/body a higher-level client actually sent.
        pub fn last_call(&self) -> Option<(&'static str, String, Option<Value>)> {
            self.calls
                .lock()
                .unwrap()
                .last()
                .map(|c| (c.method, c.url.clone(), c.body.clone()))
        }
    }

    #[async_trait]
    impl HttpAdapter for ScriptedAdapter {
        async fn get(&self, url: &str, _headers: &HashMap<String, String>) -> HttpResponse {
            self.calls.lock().unwrap().push(RecordedCall {
                method: "GET",
                url: url.to_string(),
                body: None,
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(HttpResponse { status: 0, body: Value::Null })
        }

        async fn post(&self, url: &str, _headers: &HashMap<String, String>, body: &Value) -> HttpResponse {
            self.calls.lock().unwrap().push(RecordedCall {
                method: "POST",
                url: url.to_string(),
                body: Some(body.clone()),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(HttpResponse { status: 0, body: Value::Null })
        }
    }

    #[tokio::test]
    async fn scripted_adapter_replays_responses_in_order() {
        let adapter = ScriptedAdapter::new();
        adapter.push_response(HttpResponse { status: 500, body: Value::Null });
        adapter.push_response(HttpResponse { status: 200, body: Value::Null });

        let headers = HashMap::new();
        let first = adapter.get("https://example.test/a", &headers).await;
        let second = adapter.get("https://example.test/a", &headers).await;

        assert_eq!(first.status, 500);
        assert_eq!(second.status, 200);
        assert_eq!(adapter.call_count(), 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_success_covers_2xx_only() {
        assert!(HttpResponse { status: 200, body: Value::Null }.is_success());
        assert!(HttpResponse { status: 299, body: Value::Null }.is_success());
        assert!(!HttpResponse { status: 301, body: Value::Null }.is_success());
        assert!(!HttpResponse { status: 404, body: Value::Null }.is_success());
        assert!(!HttpResponse { status: 0, body: Value::Null }.is_success());
    }
}
