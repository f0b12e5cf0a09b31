use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::message::{InboundMessage, IncomingText};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("message handler failure: {0}")]
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageContext {
    pub correlation_id: String,
}

/// Inbound side of a messaging network.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `None` means the stream closed cleanly.
    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError>;
    async fn acknowledge(&self, message_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Outbound side. Fire-and-forget: errors are only reported for logging.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Returns the reply to deliver, or `None` to stay silent.
    async fn handle(
        &self,
        message: &IncomingText,
        ctx: &MessageContext,
    ) -> Result<Option<String>, HandlerError>;
}

pub struct TransportRunner {
    transport: Arc<dyn MessageTransport>,
    sender: Arc<dyn MessageSender>,
    handler: Arc<dyn MessageHandler>,
    reconnect_policy: ReconnectPolicy,
}

impl TransportRunner {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        sender: Arc<dyn MessageSender>,
        handler: Arc<dyn MessageHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, sender, handler, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "message transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "message transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening message transport connection");
        self.transport.connect().await?;
        info!(attempt, "message transport connected");

        let mut in_flight = JoinSet::new();
        let outcome = self.pump(&mut in_flight).await;

        while let Some(joined) = in_flight.join_next().await {
            if let Err(error) = joined {
                warn!(error = %error, "message task terminated abnormally");
            }
        }

        outcome
    }

    async fn pump(&self, in_flight: &mut JoinSet<()>) -> Result<(), TransportError> {
        loop {
            let Some(message) = self.transport.next_message().await? else {
                info!("message transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            if let Err(error) = self.transport.acknowledge(&message.id).await {
                warn!(
                    event_name = "transport.ack_sent",
                    correlation_id = %message.id,
                    error = %error,
                    "failed to acknowledge inbound message"
                );
            }

            let incoming = match message.accept() {
                Ok(incoming) => incoming,
                Err(rejection) => {
                    debug!(
                        event_name = "transport.message_filtered",
                        correlation_id = %message.id,
                        reason = rejection.as_str(),
                        "inbound message filtered upstream of dialog"
                    );
                    continue;
                }
            };

            info!(
                event_name = "transport.message_received",
                correlation_id = %incoming.message_id,
                sender = %incoming.sender,
                "received inbound text message"
            );

            let handler = Arc::clone(&self.handler);
            let sender = Arc::clone(&self.sender);
            in_flight.spawn(async move {
                deliver(handler.as_ref(), sender.as_ref(), &incoming).await;
            });

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(error) = joined {
                    warn!(error = %error, "message task terminated abnormally");
                }
            }
        }
    }
}

/// Handles one delivery end to end. Failures are logged, never propagated.
pub async fn deliver(
    handler: &dyn MessageHandler,
    sender: &dyn MessageSender,
    incoming: &IncomingText,
) {
    let ctx = MessageContext { correlation_id: incoming.message_id.clone() };

    let reply = match handler.handle(incoming, &ctx).await {
        Ok(Some(reply)) => reply,
        Ok(None) => {
            debug!(
                event_name = "transport.reply_suppressed",
                correlation_id = %ctx.correlation_id,
                sender = %incoming.sender,
                "handler produced no reply"
            );
            return;
        }
        Err(error) => {
            warn!(
                event_name = "transport.handler_failed",
                correlation_id = %ctx.correlation_id,
                sender = %incoming.sender,
                error = %error,
                "message handler failed; continuing transport loop"
            );
            return;
        }
    };

    if let Err(error) = sender.send_text(&incoming.sender, &reply).await {
        warn!(
            event_name = "transport.send_failed",
            correlation_id = %ctx.correlation_id,
            sender = %incoming.sender,
            error = %error,
            "failed to deliver reply"
        );
    }
}
