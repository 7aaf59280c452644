//! Non-blocking HTTP client core that runs inside somebody else's event loop.
//!
//! An [`HttpClientEngine`] owns a [`Transport`] doing the actual network I/O
//! and mirrors the transport's socket and timer interest into a host
//! [`EventLoop`]. The host reports readiness back, and each request's
//! [`ResponseHandler`] eventually receives either the full body or an error
//! message.
mod error;
pub use error::{Error, ResponseError, Result, TransferFailure};

pub mod config;
pub mod engine;
pub mod event_loop;
pub mod request;
pub mod transfer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use engine::{HttpClientEngine, Starter};
#[cfg(feature = "polling")]
pub use event_loop::PollingLoop;
pub use event_loop::{EventLoop, Interest};
pub use request::{ChannelHandler, ResponseHandler, ResponseReceiver};
pub use transfer::{Method, RequestId, RequestOptions, Token, TransferHandle};
#[cfg(feature = "curl")]
pub use transport::CurlTransport;
pub use transport::{Transport, TransferEvents};
