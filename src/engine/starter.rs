use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use crate::{
    error::Error,
    request::{ChannelHandler, ResponseHandler, ResponseReceiver},
    transfer::{RequestId, RequestOptions, Token},
};

pub(crate) struct Queued {
    pub(crate) token: Token,
    pub(crate) options: RequestOptions,
    pub(crate) handler: Box<dyn ResponseHandler>,
}

/// Token allocation and the start queue, shared by an engine and its
/// [`Starter`]s.
#[derive(Default)]
pub(crate) struct Shared {
    next_token: Cell<usize>,
    queue: RefCell<VecDeque<Queued>>,
    closed: Cell<bool>,
}

impl Shared {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            next_token: Cell::new(1),
            ..Self::default()
        })
    }

    pub(crate) fn next_token(&self) -> Token {
        let token = self.next_token.get();
        self.next_token.set(token + 1);
        Token(token)
    }

    pub(crate) fn pop(&self) -> Option<Queued> {
        self.queue.borrow_mut().pop_front()
    }

    pub(crate) fn take_all(&self) -> VecDeque<Queued> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    #[inline]
    pub(crate) fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    pub(crate) fn close(&self) {
        self.closed.set(true);
    }
}

/// Starts requests without borrowing the engine, typically from inside a
/// [`ResponseHandler`] that wants to issue a follow-up request.
///
/// Queued requests are handed to the transport as soon as the engine
/// finishes the callback that is running, or on the next call into the
/// engine. Once the engine is dropped, new requests fail right away.
#[derive(Clone)]
pub struct Starter {
    shared: Rc<Shared>,
}

impl Starter {
    pub(crate) fn new(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    pub fn start<H>(&self, options: RequestOptions, handler: H) -> RequestId
    where
        H: ResponseHandler + 'static,
    {
        let token = self.shared.next_token();
        if self.shared.closed.get() {
            let mut handler = handler;
            handler.on_error(Error::ShutDown.to_string());
            return token;
        }
        #[cfg(feature = "logging")]
        tracing::debug!("request {} queued {}", token, options.url);
        self.shared.queue.borrow_mut().push_back(Queued {
            token,
            options,
            handler: Box::new(handler),
        });
        token
    }

    pub fn fetch(&self, options: RequestOptions) -> ResponseReceiver {
        let (handler, rx) = ChannelHandler::new();
        self.start(options, handler);
        rx
    }
}

impl std::fmt::Debug for Starter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Starter")
            .field("queued", &self.shared.queued())
            .field("closed", &self.shared.closed.get())
            .finish()
    }
}
