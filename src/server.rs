use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;

use crate::{
    queue::QueueHandle,
    settings::Settings,
    webhook::{self, PushEvent, SignatureError},
};

struct AppState {
    settings: Arc<Settings>,
    queue: QueueHandle,
}

pub fn router(settings: Arc<Settings>, queue: QueueHandle) -> Router {
    Router::new()
        .route("/hook", post(hook))
        .with_state(Arc::new(AppState { settings, queue }))
}

pub async fn serve(settings: Arc<Settings>, queue: QueueHandle) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&settings.listen)
        .await
        .with_context(|| format!("couldn't listen on {}", settings.listen))?;
    info!("listening for webhooks on {}", settings.listen);

    axum::serve(listener, router(settings, queue)).await?;
    Ok(())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn hook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = header(&headers, webhook::SIGNATURE_256_HEADER)
        .or_else(|| header(&headers, webhook::SIGNATURE_HEADER));

    match webhook::verify_signature(state.settings.hook_secret.as_bytes(), signature, &body) {
        Ok(()) => (),
        Err(SignatureError::UnsupportedDigest(digest)) => {
            warn!("unsupported signature digest {}", digest);
            return StatusCode::NOT_IMPLEMENTED.into_response();
        }
        Err(err) => {
            warn!("rejected webhook: {:?}", err);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match header(&headers, webhook::EVENT_HEADER) {
        Some("ping") => Json(json!({ "msg": "pong" })).into_response(),
        Some("push") => {
            let event: PushEvent = match serde_json::from_value(payload) {
                Ok(event) => event,
                Err(_) => return StatusCode::BAD_REQUEST.into_response(),
            };

            match event.build_request() {
                Some(request) => {
                    info!("got push for branch {}", request.branch);
                    if let Err(err) = state.queue.submit(request) {
                        warn!("{:#}", err);
                        return StatusCode::SERVICE_UNAVAILABLE.into_response();
                    }
                }
                None => info!("ignoring push to {}", event.reference),
            }

            "ok".into_response()
        }
        _ => "ok".into_response(),
    }
}
