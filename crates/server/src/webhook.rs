use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use citabot_core::config::TransportConfig;
use citabot_transport::{InboundMessage, MessageSender, MessageTransport, TransportError};

pub const SECRET_HEADER: &str = "x-citabot-secret";
const INBOX_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct WebhookState {
    inbox: mpsc::Sender<InboundMessage>,
    secret: Option<SecretString>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub id: String,
}

/// Inbound side fed by the webhook route. The stream ends once every route
/// handle is dropped, which happens when the HTTP server shuts down.
pub struct WebhookTransport {
    inbox: Mutex<mpsc::Receiver<InboundMessage>>,
}

/// Builds the connected route state and transport pair.
pub fn channel(secret: Option<SecretString>) -> (WebhookState, WebhookTransport) {
    let (sender, receiver) = mpsc::channel(INBOX_CAPACITY);
    (
        WebhookState { inbox: sender, secret },
        WebhookTransport { inbox: Mutex::new(receiver) },
    )
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook/messages", post(receive)).with_state(state)
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    state: WebhookState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.webhook.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "webhook endpoint started"
    );

    Ok(tokio::spawn(async move {
        let graceful = async move {
            let _ = shutdown.changed().await;
        };
        if let Err(error) = axum::serve(listener, router(state)).with_graceful_shutdown(graceful).await {
            error!(
                event_name = "system.webhook.error",
                correlation_id = "bootstrap",
                error = %error,
                "webhook endpoint terminated unexpectedly"
            );
        }
    }))
}

pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(mut message): Json<InboundMessage>,
) -> (StatusCode, Json<WebhookAck>) {
    if message.id.trim().is_empty() {
        message.id = uuid::Uuid::new_v4().to_string();
    }
    let id = message.id.clone();

    if !secret_matches(state.secret.as_ref(), &headers) {
        warn!(
            event_name = "transport.webhook_rejected",
            correlation_id = %id,
            "webhook delivery carried a missing or wrong shared secret"
        );
        return (StatusCode::UNAUTHORIZED, Json(WebhookAck { status: "rejected", id }));
    }

    match state.inbox.send(message).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(WebhookAck { status: "accepted", id })),
        Err(_) => {
            warn!(
                event_name = "transport.webhook_closed",
                correlation_id = %id,
                "webhook delivery arrived after the transport stopped"
            );
            (StatusCode::SERVICE_UNAVAILABLE, Json(WebhookAck { status: "unavailable", id }))
        }
    }
}

fn secret_matches(expected: Option<&SecretString>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected.expose_secret())
}

#[async_trait]
impl MessageTransport for WebhookTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
        Ok(self.inbox.lock().await.recv().await)
    }

    async fn acknowledge(&self, message_id: &str) -> Result<(), TransportError> {
        // The HTTP response already acknowledged the delivery.
        debug!(correlation_id = %message_id, "webhook delivery dequeued");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inbox.lock().await.close();
        Ok(())
    }
}

/// Posts `{to, text}` to the configured outbound URL.
pub struct HttpMessageSender {
    http: Client,
    url: String,
    token: Option<SecretString>,
}

#[derive(Debug, Serialize)]
struct OutboundText<'a> {
    to: &'a str,
    text: &'a str,
}

impl HttpMessageSender {
    pub fn new(url: String, token: Option<SecretString>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self { http: Client::builder().timeout(timeout).build()?, url, token })
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError> {
        let mut call = self.http.post(&self.url).json(&OutboundText { to, text });
        if let Some(token) = &self.token {
            call = call.bearer_auth(token.expose_secret());
        }

        let response = call.send().await.map_err(|error| TransportError::Send(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Send(format!("outbound endpoint answered {}", status.as_u16())));
        }
        Ok(())
    }
}

/// Used when no outbound URL is configured: replies only reach the log.
pub struct LogOnlySender;

#[async_trait]
impl MessageSender for LogOnlySender {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError> {
        info!(
            event_name = "transport.reply_logged",
            recipient = %to,
            "no outbound url configured; reply not delivered"
        );
        debug!(recipient = %to, text = %text, "undelivered reply");
        Ok(())
    }
}

pub fn sender_from_config(
    config: &TransportConfig,
    timeout: Duration,
) -> Result<Arc<dyn MessageSender>, reqwest::Error> {
    match config.outbound_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => Ok(Arc::new(HttpMessageSender::new(
            url.to_owned(),
            config.outbound_token.clone(),
            timeout,
        )?)),
        None => Ok(Arc::new(LogOnlySender)),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use secrecy::SecretString;
    use tower::ServiceExt;

    use citabot_transport::{MessageKind, MessageTransport};

    use super::{channel, router, SECRET_HEADER};

    fn delivery(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook/messages")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    #[tokio::test]
    async fn accepted_delivery_reaches_the_transport() {
        let (state, transport) = channel(None);
        let response = router(state)
            .oneshot(delivery(
                r#"{"id":"wamid-1","from":"5215550001","name":"Ana","text":"quiero una cita"}"#,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let message = transport.next_message().await.expect("receive").expect("message");
        assert_eq!(message.id, "wamid-1");
        assert_eq!(message.kind, MessageKind::Text);
        assert!(!message.is_group);
    }

    #[tokio::test]
    async fn blank_ids_are_replaced() {
        let (state, transport) = channel(None);
        let response = router(state)
            .oneshot(delivery(r#"{"id":"","from":"5215550001","text":"hola"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let message = transport.next_message().await.expect("receive").expect("message");
        assert!(!message.id.is_empty());
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let (state, transport) = channel(Some(SecretString::from("s3cret".to_owned())));
        let app = router(state);

        let mut request = delivery(r#"{"id":"m-1","from":"5215550001","text":"hola"}"#);
        request.headers_mut().insert(SECRET_HEADER, "nope".parse().expect("header"));
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = delivery(r#"{"id":"m-2","from":"5215550001","text":"hola"}"#);
        request.headers_mut().insert(SECRET_HEADER, "s3cret".parse().expect("header"));
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = transport.next_message().await.expect("receive").expect("message");
        assert_eq!(message.id, "m-2");
    }

    #[tokio::test]
    async fn stream_ends_when_routes_are_dropped() {
        let (state, transport) = channel(None);
        drop(router(state));

        assert!(transport.next_message().await.expect("receive").is_none());
    }
}
