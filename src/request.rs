//! One in-flight request and the handler it reports to.
use std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use bytes::{Bytes, BytesMut};

use crate::{
    error::ResponseError,
    transfer::{ErrorBuffer, Token, TransferHandle},
    transport::TransferResult,
};

/// Receives the outcome of a request. Exactly one of the two methods is
/// called, exactly once.
pub trait ResponseHandler {
    fn on_success(&mut self, body: Bytes);
    fn on_error(&mut self, message: String);
}

impl<H: ResponseHandler + ?Sized> ResponseHandler for Box<H> {
    #[inline]
    fn on_success(&mut self, body: Bytes) {
        (**self).on_success(body)
    }

    #[inline]
    fn on_error(&mut self, message: String) {
        (**self).on_error(message)
    }
}

/// Lets a caller keep its handler and inspect it after completion.
impl<H: ResponseHandler> ResponseHandler for Rc<RefCell<H>> {
    #[inline]
    fn on_success(&mut self, body: Bytes) {
        self.borrow_mut().on_success(body)
    }

    #[inline]
    fn on_error(&mut self, message: String) {
        self.borrow_mut().on_error(message)
    }
}

pub type ResponseReceiver = local_sync::oneshot::Receiver<Result<Bytes, ResponseError>>;

/// Forwards the outcome into a oneshot channel, for async callers.
pub struct ChannelHandler {
    tx: Option<local_sync::oneshot::Sender<Result<Bytes, ResponseError>>>,
}

impl ChannelHandler {
    pub fn new() -> (Self, ResponseReceiver) {
        let (tx, rx) = local_sync::oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    fn send(&mut self, outcome: Result<Bytes, ResponseError>) {
        if let Some(tx) = self.tx.take() {
            // The receiver may have been dropped; nobody is waiting then.
            let _ = tx.send(outcome);
        }
    }
}

impl ResponseHandler for ChannelHandler {
    fn on_success(&mut self, body: Bytes) {
        self.send(Ok(body));
    }

    fn on_error(&mut self, message: String) {
        self.send(Err(ResponseError(message)));
    }
}

/// Lifecycle of a request. States are only ever visited in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestState {
    Created,
    Active,
    Completing,
    Destroyed,
}

pub(crate) struct HttpRequest {
    handle: TransferHandle,
    handler: Box<dyn ResponseHandler>,
    response: BytesMut,
    error: ErrorBuffer,
    state: RequestState,
    max_response_size: Option<usize>,
}

impl HttpRequest {
    pub(crate) fn new(
        handle: TransferHandle,
        handler: Box<dyn ResponseHandler>,
        max_response_size: Option<usize>,
    ) -> Self {
        Self {
            handle,
            handler,
            response: BytesMut::new(),
            error: ErrorBuffer::new(),
            state: RequestState::Created,
            max_response_size,
        }
    }

    #[inline]
    pub fn handle(&self) -> &TransferHandle {
        &self.handle
    }

    #[inline]
    pub fn token(&self) -> Token {
        self.handle.token()
    }

    #[cfg(test)]
    pub fn state(&self) -> RequestState {
        self.state
    }

    #[cfg(test)]
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    pub(crate) fn activate(&mut self) {
        debug_assert_eq!(self.state, RequestState::Created);
        self.state = RequestState::Active;
    }

    /// Append response bytes. Returns the number accepted, which is short of
    /// `data.len()` only when the request is not active or the response cap
    /// would be exceeded.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.state != RequestState::Active {
            return 0;
        }
        if let Some(limit) = self.max_response_size {
            if self.response.len() + data.len() > limit {
                #[cfg(feature = "logging")]
                tracing::warn!(
                    "request {} response exceeds {} bytes, rejecting",
                    self.token(),
                    limit
                );
                return 0;
            }
        }
        self.response.extend_from_slice(data);
        data.len()
    }

    pub(crate) fn set_error(&mut self, message: &str) {
        self.error.set(message);
    }

    /// Report the outcome to the handler, then drop the request.
    pub(crate) fn done(mut self, result: TransferResult) {
        debug_assert_eq!(self.state, RequestState::Active);
        self.state = RequestState::Completing;

        let outcome = self.check_response(result);
        let body = self.response.split().freeze();
        let handler = &mut self.handler;
        let dispatched = panic::catch_unwind(AssertUnwindSafe(|| match outcome {
            Ok(()) => handler.on_success(body),
            Err(message) => handler.on_error(message),
        }));
        if dispatched.is_err() {
            #[cfg(feature = "logging")]
            tracing::error!("response handler of request {} panicked", self.token());
        }

        self.state = RequestState::Destroyed;
    }

    fn check_response(&self, result: TransferResult) -> Result<(), String> {
        match result {
            Ok(status) if (200..300).contains(&status) => Ok(()),
            Ok(status) => Err(format!("got HTTP status {status}")),
            Err(_) if !self.error.is_empty() => Err(self.error.as_str().to_owned()),
            Err(failure) => Err(failure.description),
        }
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("token", &self.token())
            .field("url", &self.handle.url())
            .field("state", &self.state)
            .field("received", &self.response.len())
            .finish()
    }
}
