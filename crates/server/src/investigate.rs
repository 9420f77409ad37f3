use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use dossier_agent::InvestigationRuntime;
use dossier_core::{
    InterfaceError, InvestigationFailure, InvestigationId, InvestigationLog, InvestigationRequest,
    InvestigationResult, LogSink,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::AppState;

/// Runs one investigation. Implemented by the agent runtime; swapped for a stub in tests.
#[async_trait]
pub trait Investigator: Send + Sync {
    async fn investigate(
        &self,
        request: &InvestigationRequest,
        log: InvestigationLog,
    ) -> Result<InvestigationResult, InvestigationFailure>;
}

#[async_trait]
impl Investigator for InvestigationRuntime {
    async fn investigate(
        &self,
        request: &InvestigationRequest,
        log: InvestigationLog,
    ) -> Result<InvestigationResult, InvestigationFailure> {
        InvestigationRuntime::investigate(self, request, log).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Log { message: String },
    Result { data: InvestigationResult },
    Error { error: String, logs: Vec<String> },
}

struct ChannelSink {
    sender: UnboundedSender<StreamEvent>,
}

impl LogSink for ChannelSink {
    fn emit(&self, line: &str) {
        // A closed channel means the client went away; the investigation carries on.
        let _ = self.sender.send(StreamEvent::Log { message: line.to_string() });
    }
}

pub async fn investigate(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let id = InvestigationId::generate();
    let request = match parse_request(body, &id) {
        Ok(request) => request,
        Err(error) => return interface_error(error),
    };
    info!(
        event_name = "http.investigate.accepted",
        correlation_id = %id,
        "investigation request accepted"
    );

    // Spawned so a dropped connection cannot cancel the investigation or skip session release.
    let investigator = Arc::clone(&state.investigator);
    let log = InvestigationLog::new(id.as_str());
    let task = tokio::spawn(async move { investigator.investigate(&request, log).await });

    match task.await {
        Ok(Ok(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(Err(failure)) => (StatusCode::INTERNAL_SERVER_ERROR, Json(failure)).into_response(),
        Err(error) => {
            warn!(
                event_name = "http.investigate.task_failed",
                correlation_id = %id,
                error = %error,
                "investigation task did not complete"
            );
            let failure = InvestigationFailure {
                error: format!("investigation task failed: {error}"),
                logs: Vec::new(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(failure)).into_response()
        }
    }
}

pub async fn investigate_stream(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let id = InvestigationId::generate();
    let request = match parse_request(body, &id) {
        Ok(request) => request,
        Err(error) => return interface_error(error),
    };
    info!(
        event_name = "http.investigate_stream.accepted",
        correlation_id = %id,
        "streaming investigation request accepted"
    );

    let (sender, receiver) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink { sender: sender.clone() });
    let investigator = Arc::clone(&state.investigator);

    // Spawned so a disconnected client does not cancel the investigation.
    tokio::spawn(async move {
        let log = InvestigationLog::with_sink(id.as_str(), sink);
        let last = match investigator.investigate(&request, log).await {
            Ok(result) => StreamEvent::Result { data: result },
            Err(failure) => StreamEvent::Error { error: failure.error, logs: failure.logs },
        };
        if sender.send(last).is_err() {
            warn!(
                event_name = "http.investigate_stream.client_gone",
                correlation_id = %id,
                "client disconnected before the result was delivered"
            );
        }
    });

    Sse::new(event_stream(UnboundedReceiverStream::new(receiver))).into_response()
}

fn event_stream(
    events: UnboundedReceiverStream<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    events.map(|event| {
        Ok(Event::default().json_data(&event).unwrap_or_else(|_| Event::default().data("{}")))
    })
}

pub async fn method_not_allowed() -> Response {
    interface_error(InterfaceError::MethodNotAllowed {
        correlation_id: InvestigationId::generate().to_string(),
    })
}

fn parse_request(
    body: Result<Json<Value>, JsonRejection>,
    id: &InvestigationId,
) -> Result<InvestigationRequest, InterfaceError> {
    let bad_request = |message: String| InterfaceError::BadRequest {
        message,
        correlation_id: id.to_string(),
    };

    let Json(body) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    InvestigationRequest::new(
        text_field(&body, "address").unwrap_or_default(),
        text_field(&body, "price").unwrap_or_default(),
    )
    .map_err(|error| bad_request(error.to_string()))
}

/// Accepts strings and bare numbers, so `"price": 1200000` works like `"price": "1200000"`.
fn text_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn interface_error(error: InterfaceError) -> Response {
    warn!(
        event_name = "http.investigate.rejected",
        correlation_id = %error.correlation_id(),
        status = error.status_code(),
        error = %error,
        "request rejected"
    );
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": error.user_message() }))).into_response()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use dossier_core::config::CredentialStatus;
    use dossier_core::{
        InvestigationFailure, InvestigationLog, InvestigationRequest, InvestigationResult,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::Investigator;
    use crate::{router, AppState};

    struct StubInvestigator {
        fail: bool,
    }

    #[async_trait]
    impl Investigator for StubInvestigator {
        async fn investigate(
            &self,
            request: &InvestigationRequest,
            mut log: InvestigationLog,
        ) -> Result<InvestigationResult, InvestigationFailure> {
            log.push("🚀 Starting investigation...");
            log.push(format!("📍 Address: {}", request.address()));
            if self.fail {
                log.warn("❌ CRITICAL ERROR: sandbox provisioning failed: quota");
                return Err(InvestigationFailure {
                    error: "sandbox provisioning failed: quota".to_string(),
                    logs: log.into_lines(),
                });
            }
            Ok(InvestigationResult {
                evidence: vec!["- Loud parties: complaints...".to_string()],
                email: "Dear seller...".to_string(),
                risk_score: 72,
                savings: 120_000,
                savings_verified: true,
                offer_price: 1_080_000,
                sandbox_id: "sbx-1".to_string(),
                sandbox_logs: log.into_lines(),
            })
        }
    }

    struct SlowInvestigator {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Investigator for SlowInvestigator {
        async fn investigate(
            &self,
            _request: &InvestigationRequest,
            log: InvestigationLog,
        ) -> Result<InvestigationResult, InvestigationFailure> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.finished.store(true, Ordering::SeqCst);
            Err(InvestigationFailure { error: "done".to_string(), logs: log.into_lines() })
        }
    }

    fn app(fail: bool) -> axum::Router {
        router(AppState {
            investigator: Arc::new(StubInvestigator { fail }),
            credentials: CredentialStatus { sandbox: true, search: true, llm: true },
        })
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn successful_investigation_returns_result() {
        let response = app(false)
            .oneshot(post("/api/investigate", r#"{"address":"520 Leavenworth St","price":"1,200,000"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["offer_price"], 1_080_000);
        assert_eq!(body["risk_score"], 72);
        assert_eq!(body["sandbox_logs"][1], "📍 Address: 520 Leavenworth St");
    }

    #[tokio::test]
    async fn investigation_runs_to_completion_after_client_disconnects() {
        let finished = Arc::new(AtomicBool::new(false));
        let app = router(AppState {
            investigator: Arc::new(SlowInvestigator { finished: Arc::clone(&finished) }),
            credentials: CredentialStatus { sandbox: true, search: true, llm: true },
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await });

        let body = r#"{"address":"1 Main St","price":"500000"}"#;
        let mut client = TcpStream::connect(address).expect("connect");
        write!(
            client,
            "POST /api/investigate HTTP/1.1\r\nHost: {address}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .expect("write request");

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(client);
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert!(finished.load(Ordering::SeqCst), "investigation stopped when the client went away");
    }

    #[tokio::test]
    async fn numeric_price_is_accepted() {
        let response = app(false)
            .oneshot(post("/api/investigate", r#"{"address":"1 Main St","price":1200000}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn failure_returns_error_and_logs() {
        let response = app(true)
            .oneshot(post("/api/investigate", r#"{"address":"1 Main St","price":"500000"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "sandbox provisioning failed: quota");
        assert_eq!(body["logs"][0], "🚀 Starting investigation...");
    }

    #[tokio::test]
    async fn missing_or_blank_fields_are_bad_requests() {
        for body in [
            r#"{"address":"1 Main St"}"#,
            r#"{"price":"500000"}"#,
            r#"{"address":"","price":"500000"}"#,
            r#"{"address":"1 Main St","price":"   "}"#,
            r#"{"address":"1 Main St","price":null}"#,
            "not json",
        ] {
            let response =
                app(false).oneshot(post("/api/investigate", body)).await.expect("response");

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(json_body(response).await, json!({"error": "Address and price are required"}));
        }
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let request = Request::builder()
                .method(method.clone())
                .uri("/api/investigate")
                .body(Body::empty())
                .expect("request");
            let response = app(false).oneshot(request).await.expect("response");

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(json_body(response).await, json!({"error": "Method not allowed"}));
        }
    }

    #[tokio::test]
    async fn stream_emits_log_lines_then_result() {
        let response = app(false)
            .oneshot(post("/api/investigate/stream", r#"{"address":"1 Main St","price":"500000"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()),
            Some("text/event-stream")
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let events: Vec<Value> = String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).expect("event json"))
            .collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], json!({"type": "log", "message": "🚀 Starting investigation..."}));
        assert_eq!(events[1]["message"], "📍 Address: 1 Main St");
        assert_eq!(events[2]["type"], "result");
        assert_eq!(events[2]["data"]["risk_score"], 72);
    }

    #[tokio::test]
    async fn stream_reports_failures_as_error_events() {
        let response = app(true)
            .oneshot(post("/api/investigate/stream", r#"{"address":"1 Main St","price":"500000"}"#))
            .await
            .expect("response");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8_lossy(&bytes).to_string();
        let last = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .last()
            .expect("final event");
        let event: Value = serde_json::from_str(last).expect("event json");

        assert_eq!(event["type"], "error");
        assert_eq!(event["error"], "sandbox provisioning failed: quota");
        assert_eq!(event["logs"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn stream_validates_like_the_json_route() {
        let response = app(false)
            .oneshot(post("/api/investigate/stream", r#"{"address":"1 Main St"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
