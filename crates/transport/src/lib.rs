//! Chat transport plumbing for citabot.
//!
//! - **Messages** (`message`) - inbound delivery model and upstream filtering
//! - **Runner** (`runner`) - receive loop with reconnection, one task per delivery
//!
//! ```text
//! Transport → TransportRunner → MessageHandler (dialog engine) → MessageSender
//! ```

pub mod message;
pub mod runner;

pub use message::{InboundMessage, IncomingText, MessageKind, Rejection};
pub use runner::{
    HandlerError, MessageContext, MessageHandler, MessageSender, MessageTransport,
    ReconnectPolicy, TransportError, TransportRunner,
};
