use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::HTTP_TRANSPORT;
use crate::context::{new_id, ConquerorContext, ContextError};
use crate::dispatch::{InboundRequest, Messaging};
use crate::error::MessagingError;
use crate::pipeline::TransportType;
use crate::transport::{CONTEXT_HEADER, MESSAGE_ID_HEADER, TRACE_ID_HEADER};

/// Build an axum `Router` that handles messages registered with `messaging`.
pub fn router(messaging: Messaging) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/:message", post(message_handler))
        .with_state(messaging)
}

/// Serve messages over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve(messaging: Messaging, addr: &str) -> Result<(), std::io::Error> {
    let app = router(messaging);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "serving messages over http");
    axum::serve(listener, app).await
}

/// `GET /health` returns `{ "ok": true, "messages": [...] }`.
async fn health_handler(State(messaging): State<Messaging>) -> impl IntoResponse {
    let mut messages: Vec<&str> = messaging
        .registry()
        .registrations()
        .map(|registration| registration.descriptor.name)
        .collect();
    messages.sort_unstable();
    Json(json!({ "ok": true, "messages": messages }))
}

/// `POST /:message`: decode context from headers, run the handler, return JSON.
async fn message_handler(
    State(messaging): State<Messaging>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(registration) = messaging.registry().registration_by_name(&name) else {
        return error_response(&MessagingError::HandlerNotFound(name));
    };

    let context = match context_from_headers(&headers) {
        Ok(context) => context,
        Err(e) => return error_response(&MessagingError::Context(e)),
    };

    let request = InboundRequest {
        conqueror_context: context.clone(),
        transport_type: TransportType::server(HTTP_TRANSPORT),
        cancellation: CancellationToken::new(),
    };

    match registration
        .invoker()
        .invoke_json(&messaging, &body, request)
        .await
    {
        Ok(value) => {
            let mut response = (StatusCode::OK, Json(value)).into_response();
            if let Some(encoded) = context.encode_upstream() {
                if let Ok(header) = HeaderValue::from_str(&encoded) {
                    response.headers_mut().insert(CONTEXT_HEADER, header);
                }
            }
            response
        }
        Err(e) => {
            if e.status_code() >= 500 {
                tracing::error!(message = %name, trace_id = context.trace_id(), error = %e, "message failed");
            } else {
                tracing::warn!(message = %name, trace_id = context.trace_id(), error = %e, "message failed");
            }
            error_response(&e)
        }
    }
}

/// Build the server-side context from request headers.
///
/// Every `conqueror-context` header value is decoded; a value that is not
/// valid UTF-8 counts as malformed context data.
fn context_from_headers(headers: &HeaderMap) -> Result<ConquerorContext, ContextError> {
    let context = match header_str(headers, TRACE_ID_HEADER) {
        Some(trace_id) => ConquerorContext::with_trace_id(trace_id),
        None => ConquerorContext::new(),
    };
    context.set_message_id(header_str(headers, MESSAGE_ID_HEADER).unwrap_or_else(new_id));

    let values = headers
        .get_all(CONTEXT_HEADER)
        .iter()
        .map(|value| value.to_str().map_err(|_| ContextError::FormattedContextDataInvalid))
        .collect::<Result<Vec<&str>, ContextError>>()?;
    context.decode_into(values)?;
    Ok(context)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Client errors carry their message; server errors get a generic body.
fn error_response(e: &MessagingError) -> Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = if status.is_server_error() {
        "internal server error".to_string()
    } else {
        e.to_string()
    };
    (status, Json(json!({ "error": message }))).into_response()
}
