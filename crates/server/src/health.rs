use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use citabot_store::SessionStore;

/// Which outside collaborators this process was started with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Collaborators {
    pub llm: bool,
    pub sheets: bool,
    pub calendar: bool,
    pub outbound: bool,
}

#[derive(Clone)]
pub struct HealthState {
    sessions: Arc<dyn SessionStore>,
    collaborators: Collaborators,
}

impl HealthState {
    pub fn new(sessions: Arc<dyn SessionStore>, collaborators: Collaborators) -> Self {
        Self { sessions, collaborators }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub collaborators: Collaborators,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Degraded when no backend can record appointments; the dialog still runs.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let collaborators = state.collaborators;
    let status = if collaborators.sheets || collaborators.calendar { "ready" } else { "degraded" };

    let payload = HealthResponse {
        status,
        active_sessions: state.sessions.len().await,
        collaborators,
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use citabot_store::{InMemorySessionStore, SessionStore};

    use super::{router, Collaborators, HealthState};

    #[tokio::test]
    async fn health_reports_sessions_and_collaborators() {
        let sessions = Arc::new(InMemorySessionStore::default());
        sessions.get_or_create("5215550001").await;
        sessions.get_or_create("5215550002").await;
        let collaborators = Collaborators { llm: false, sheets: true, calendar: false, outbound: true };

        let response = router(HealthState::new(sessions, collaborators))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["active_sessions"], 2);
        assert_eq!(payload["collaborators"]["sheets"], true);
        assert_eq!(payload["collaborators"]["llm"], false);
    }

    #[tokio::test]
    async fn health_is_degraded_without_backends() {
        let (status, axum::Json(payload)) = super::health(axum::extract::State(HealthState::new(
            Arc::new(InMemorySessionStore::default()),
            Collaborators::default(),
        )))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.active_sessions, 0);
    }
}
