use crate::{
    error::ServiceError,
    model::{InferParams, LlmBackend},
    prompt::interview_messages,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};

/// What the chat endpoint answers with when generation fails for any reason.
pub const APOLOGY: &str = "Sorry, I encountered an error.";

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub user_input: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub ai_response: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateResponse {
    pub response: String,
}

pub struct ChatState<B> {
    backend: B,
    params: InferParams,
    status: String,
}

pub struct GenerateState<B> {
    /// `None` when the model failed to load at startup.
    backend: Option<B>,
    system_prompt: String,
    params: InferParams,
}

fn record(service: &'static str, outcome: &'static str, started: Instant) {
    metrics::counter!("llm_requests_total", "service" => service, "outcome" => outcome).increment(1);
    metrics::histogram!("llm_request_seconds", "service" => service)
        .record(started.elapsed().as_secs_f64());
}

/// Raw-completion service: `POST /chat` and `GET /`.
pub fn chat_routes<B: LlmBackend>(backend: B, params: InferParams, model_name: &str) -> Router {
    let state = Arc::new(ChatState {
        backend,
        params,
        status: format!("Interview LLM Service is running with {model_name}"),
    });
    Router::new()
        .route("/", get(status::<B>))
        .route("/chat", post(chat::<B>))
        .with_state(state)
}

async fn status<B: LlmBackend>(State(state): State<Arc<ChatState<B>>>) -> Json<StatusResponse> {
    Json(StatusResponse { status: state.status.clone() })
}

async fn chat<B: LlmBackend>(
    State(state): State<Arc<ChatState<B>>>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let started = Instant::now();
    match state.backend.complete(&req.user_input, &state.params).await {
        Ok(ai_response) => {
            tracing::debug!(user_input = %req.user_input, ai_response = %ai_response, "chat turn");
            record("chat", "ok", started);
            Json(ChatResponse { ai_response })
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "error during chat generation");
            record("chat", "error", started);
            Json(ChatResponse { ai_response: APOLOGY.to_string() })
        }
    }
}

/// Chat-template service: `POST /generate`.
pub fn generate_routes<B: LlmBackend>(
    backend: Option<B>,
    system_prompt: String,
    params: InferParams,
) -> Router {
    let state = Arc::new(GenerateState { backend, system_prompt, params });
    Router::new()
        .route("/generate", post(generate::<B>))
        .with_state(state)
}

async fn generate<B: LlmBackend>(
    State(state): State<Arc<GenerateState<B>>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServiceError> {
    let started = Instant::now();
    let Some(backend) = state.backend.as_ref() else {
        record("generate", "unavailable", started);
        return Err(ServiceError::ModelUnavailable);
    };

    let messages = interview_messages(&state.system_prompt, &req.prompt);
    match backend.chat(&messages, &state.params).await {
        Ok(response) => {
            record("generate", "ok", started);
            Ok(Json(GenerateResponse { response }))
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "error during generation");
            record("generate", "error", started);
            Err(e.into())
        }
    }
}

/// `GET /metrics` in Prometheus text format.
pub fn metrics_routes(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || std::future::ready(handle.render())))
}
