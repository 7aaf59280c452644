//! The transport engine seam.
//!
//! A [`Transport`] performs the network I/O of many transfers at once and is
//! driven entirely from the outside: the engine tells it which descriptor
//! became ready (or that its timer fired) and the transport calls back into
//! [`TransferEvents`] to change socket interest, move its deadline, hand over
//! response bytes and fill error buffers. Callbacks only happen
//! synchronously, from inside one of the `Transport` methods.
#[cfg(feature = "curl")]
mod curl_multi;

use std::{os::fd::RawFd, time::Duration};

#[cfg(feature = "curl")]
pub use curl_multi::CurlTransport;
use crate::{
    error::TransferFailure,
    event_loop::Interest,
    transfer::{Token, TransferHandle},
};

/// What a transport wants watched on one of its sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketAction {
    Readable,
    Writable,
    Both,
    Remove,
}

impl SocketAction {
    /// Interest to register, `None` for [`SocketAction::Remove`].
    #[inline]
    pub fn interest(self) -> Option<Interest> {
        match self {
            SocketAction::Readable => Some(Interest::READABLE),
            SocketAction::Writable => Some(Interest::WRITABLE),
            SocketAction::Both => Some(Interest::READABLE | Interest::WRITABLE),
            SocketAction::Remove => None,
        }
    }
}

/// Why the transport is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTarget {
    Socket {
        fd: RawFd,
        readable: bool,
        writable: bool,
    },
    Timeout,
}

/// `Ok` carries the HTTP status the transfer ended with.
pub type TransferResult = Result<u32, TransferFailure>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub token: Token,
    pub result: TransferResult,
}

impl Completion {
    #[inline]
    pub fn new(token: Token, result: TransferResult) -> Self {
        Self { token, result }
    }
}

/// Callbacks a transport invokes while it is being driven.
pub trait TransferEvents {
    /// Mirror a socket interest change into the host loop.
    fn socket(&mut self, fd: RawFd, action: SocketAction);

    /// Replace the single pending deadline; `None` cancels it.
    fn timer(&mut self, timeout: Option<Duration>);

    /// Deliver response bytes. Returns how many were accepted; anything
    /// short of `data.len()` must abort the transfer.
    fn write(&mut self, token: Token, data: &[u8]) -> usize;

    /// Store a failure message in the transfer's error buffer.
    fn error(&mut self, token: Token, message: &str);
}

pub trait Transport {
    /// Activate a configured transfer. May register sockets or a timer.
    fn add(
        &mut self,
        handle: &TransferHandle,
        events: &mut dyn TransferEvents,
    ) -> crate::Result<()>;

    /// Feed readiness or a timer expiry. An `Err` is a fatal condition of
    /// the transport itself, not of any single transfer.
    fn action(
        &mut self,
        target: ActionTarget,
        events: &mut dyn TransferEvents,
    ) -> crate::Result<()>;

    /// Pop the next finished transfer, if any.
    fn next_completion(&mut self, events: &mut dyn TransferEvents) -> Option<Completion>;

    /// Detach a transfer without reporting a completion for it.
    fn remove(&mut self, token: Token, events: &mut dyn TransferEvents);
}
