//! The HTTP surface: `/start` runs one `test-process` instance to completion.

use crate::Client;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// BPMN process id of the deployed process definition.
pub const PROCESS_ID: &str = "test-process";

const GREETED_NAME: &str = "Josh Wulf";

/// Variables every started process instance begins with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InitialVariables {
    /// Who the process greets
    pub name: String,
}

impl Default for InitialVariables {
    fn default() -> Self {
        InitialVariables {
            name: GREETED_NAME.to_string(),
        }
    }
}

/// A failed `/start` request.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// The broker rejected or failed the command.
    #[error("process instance failed: {0}")]
    Broker(#[from] crate::Error),
    /// The finished instance has no `say` variable.
    #[error("process result has no `say` variable")]
    MissingSay,
    /// The server is shutting down.
    #[error("service is shutting down")]
    ShuttingDown,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Broker(err) => match err.grpc_code() {
                Some(tonic::Code::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
                Some(tonic::Code::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::MissingSay => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!(status = status.as_u16(), error = %self, "start request failed");
        (status, self.to_string()).into_response()
    }
}

/// Shared state of the HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    client: Client,
    permits: Arc<Semaphore>,
    request_timeout_ms: u64,
}

impl AppState {
    /// Allow `concurrency` simultaneous `/start` calls, each waiting up to
    /// `request_timeout` for the instance (zero leaves it to the gateway).
    pub fn new(client: Client, concurrency: usize, request_timeout: Duration) -> Self {
        AppState {
            client,
            permits: Arc::new(Semaphore::new(concurrency)),
            request_timeout_ms: u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", any(start_process))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start_process(State(state): State<AppState>) -> Result<String, ApiError> {
    let _permit = state
        .permits
        .acquire()
        .await
        .map_err(|_| ApiError::ShuttingDown)?;

    let response = state
        .client
        .create_process_instance_with_result()
        .with_bpmn_process_id(PROCESS_ID)
        .with_latest_version()
        .with_variables_from(&InitialVariables::default())?
        .with_request_timeout(state.request_timeout_ms)
        .send()
        .await?;
    debug!(
        process_instance = response.process_instance_key(),
        version = response.version(),
        "process instance completed"
    );

    match response.variables().get("say") {
        Some(Value::String(say)) => Ok(say.clone()),
        Some(say) => Ok(say.to_string()),
        None => Err(ApiError::MissingSay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockGateway};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    async fn call(gateway: MockGateway, method: Method) -> (StatusCode, String) {
        call_with_timeout(gateway, method, Duration::ZERO).await
    }

    async fn call_with_timeout(
        gateway: MockGateway,
        method: Method,
        request_timeout: Duration,
    ) -> (StatusCode, String) {
        let client = gateway.serve().await;
        let app = router(AppState::new(client, 4, request_timeout));

        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn start_returns_greeting() {
        let gateway =
            MockGateway::new().with_result_variables(json!({"say": "Hello Josh Wulf"}));

        let (status, body) = call(gateway.clone(), Method::GET).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello Josh Wulf");
        assert_eq!(
            gateway.calls(),
            vec![Call::CreateProcessInstanceWithResult {
                bpmn_process_id: "test-process".to_string(),
                version: -1,
                variables: json!({"name": "Josh Wulf"}),
                request_timeout: 0,
            }]
        );
    }

    #[tokio::test]
    async fn start_passes_request_timeout_in_millis() {
        let gateway = MockGateway::new().with_result_variables(json!({"say": "Hi"}));

        call_with_timeout(
            gateway.clone(),
            Method::GET,
            Duration::from_micros(2_500_900),
        )
        .await;

        assert!(matches!(
            gateway.calls().as_slice(),
            [Call::CreateProcessInstanceWithResult {
                request_timeout: 2500,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn huge_request_timeout_saturates() {
        let client = MockGateway::new().serve().await;

        let state = AppState::new(client, 1, Duration::MAX);

        assert_eq!(state.request_timeout_ms, u64::MAX);
    }

    #[tokio::test]
    async fn start_accepts_any_method() {
        let gateway = MockGateway::new().with_result_variables(json!({"say": "Hi"}));

        let (status, body) = call(gateway, Method::POST).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hi");
    }

    #[tokio::test]
    async fn non_string_say_is_written_as_json() {
        let gateway = MockGateway::new().with_result_variables(json!({"say": 42}));

        let (status, body) = call(gateway, Method::GET).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "42");
    }

    #[tokio::test]
    async fn missing_say_is_a_server_error() {
        let gateway = MockGateway::new().with_result_variables(json!({"name": "Josh Wulf"}));

        let (status, _) = call(gateway, Method::GET).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn broker_status_maps_to_http_status() {
        let cases = [
            (tonic::Code::DeadlineExceeded, StatusCode::GATEWAY_TIMEOUT),
            (tonic::Code::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
            (tonic::Code::NotFound, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (code, expected) in cases {
            let (status, _) = call(MockGateway::new().with_create_error(code), Method::GET).await;
            assert_eq!(status, expected, "{:?}", code);
        }
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let client = MockGateway::new().serve().await;
        let app = router(AppState::new(client, 1, Duration::ZERO));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
