//! The engine ties a [`Transport`] to a host [`EventLoop`].
//!
//! It owns the transport and every in-flight request. The host loop calls
//! [`on_socket_ready`](HttpClientEngine::on_socket_ready) and
//! [`on_timeout`](HttpClientEngine::on_timeout); both drive the transport once
//! and then dispatch every completion it reports before returning, so a
//! single readiness event may finish several requests.
//!
//! Requests that fail before reaching the transport (bad URL, transport
//! refused the transfer, a pending fatal transport error) are never failed
//! from inside [`start`](HttpClientEngine::start). They are queued and the
//! host timer is armed with a zero delay, so their handlers run on the next
//! loop turn like any other completion.
//!
//! A handler cannot reach the engine while it is being called. Follow-up
//! requests go through a [`Starter`], whose queue the engine drains after
//! every batch of callbacks.
mod registry;
mod starter;

use std::{
    collections::{HashMap, VecDeque},
    os::fd::RawFd,
    rc::Rc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use http::HeaderMap;

pub use self::starter::Starter;
use self::{
    registry::{Change, Registry},
    starter::Shared,
};
use crate::{
    config::Config,
    error::{Error, TransferFailure},
    event_loop::{EventLoop, Interest},
    request::{ChannelHandler, HttpRequest, ResponseHandler, ResponseReceiver},
    transfer::{Method, RequestId, RequestOptions, Token, TransferHandle},
    transport::{ActionTarget, SocketAction, TransferEvents, Transport},
};

pub struct HttpClientEngine<T: Transport, L: EventLoop> {
    transport: T,
    state: EngineState<L>,
    shared: Rc<Shared>,
    fatal: Option<Error>,
    max_response_size: Option<usize>,
}

/// The part of the engine a transport reaches through [`TransferEvents`].
struct EngineState<L> {
    event_loop: L,
    registry: Registry,
    requests: HashMap<Token, HttpRequest>,
    deferred: VecDeque<(HttpRequest, String)>,
    // transport deadline
    deadline: Option<Instant>,
    timer_armed: bool,
}

impl<L: EventLoop> EngineState<L> {
    fn new(event_loop: L) -> Self {
        Self {
            event_loop,
            registry: Registry::default(),
            requests: HashMap::new(),
            deferred: VecDeque::new(),
            deadline: None,
            timer_armed: false,
        }
    }

    #[inline]
    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Replace the host timer. Deferred failures take precedence over the
    /// transport deadline and ask for an immediate wakeup.
    fn arm(&mut self, transport_timeout: Option<Duration>) {
        let next = if self.deferred.is_empty() {
            transport_timeout
        } else {
            Some(Duration::ZERO)
        };
        if self.timer_armed {
            self.event_loop.cancel_timeout();
            self.timer_armed = false;
        }
        if let Some(after) = next {
            self.event_loop.schedule_timeout(after);
            self.timer_armed = true;
        }
    }

    fn defer(&mut self, mut request: HttpRequest, message: String) {
        #[cfg(feature = "logging")]
        tracing::debug!("request {} failed early: {}", request.token(), message);

        request.activate();
        self.deferred.push_back((request, message));
        if self.deferred.len() == 1 {
            let remaining = self.remaining();
            self.arm(remaining);
        }
    }
}

impl<L: EventLoop> TransferEvents for EngineState<L> {
    fn socket(&mut self, fd: RawFd, action: SocketAction) {
        let change = self.registry.apply(fd, action);
        #[cfg(feature = "logging")]
        tracing::trace!("socket {} {:?} -> {:?}", fd, action, change);

        let result = match change {
            Change::Register(interest) => self.event_loop.register(fd, interest),
            Change::Reregister(interest) => self.event_loop.reregister(fd, interest),
            Change::Deregister => self.event_loop.deregister(fd),
            Change::Unchanged => Ok(()),
        };
        if let Err(_err) = result {
            #[cfg(feature = "logging")]
            tracing::error!("host loop rejected socket {} change: {}", fd, _err);
        }
    }

    fn timer(&mut self, timeout: Option<Duration>) {
        #[cfg(feature = "logging")]
        tracing::trace!("transport timer {:?}", timeout);

        self.deadline = timeout.map(|after| Instant::now() + after);
        self.arm(timeout);
    }

    fn write(&mut self, token: Token, data: &[u8]) -> usize {
        match self.requests.get_mut(&token) {
            Some(request) => request.write(data),
            None => {
                #[cfg(feature = "logging")]
                tracing::warn!("{} bytes for unknown transfer {}", data.len(), token);
                0
            }
        }
    }

    fn error(&mut self, token: Token, message: &str) {
        if let Some(request) = self.requests.get_mut(&token) {
            request.set_error(message);
        }
    }
}

impl<T: Transport, L: EventLoop> HttpClientEngine<T, L> {
    pub fn new(transport: T, event_loop: L) -> Self {
        Self::with_config(transport, event_loop, &Config::default())
    }

    pub fn with_config(transport: T, event_loop: L, config: &Config) -> Self {
        Self {
            transport,
            state: EngineState::new(event_loop),
            shared: Shared::new(),
            fatal: None,
            max_response_size: config.max_response_size,
        }
    }

    /// Start a request. The outcome, including an immediate failure such as
    /// a malformed URL, is always reported to `handler` from a later loop
    /// callback, never from inside this call.
    pub fn start_request<H>(
        &mut self,
        url: &str,
        method: Method,
        body: Option<Bytes>,
        handler: H,
    ) -> RequestId
    where
        H: ResponseHandler + 'static,
    {
        self.start(
            RequestOptions {
                url: url.to_owned(),
                method,
                body,
                headers: HeaderMap::new(),
            },
            handler,
        )
    }

    pub fn start<H>(&mut self, options: RequestOptions, handler: H) -> RequestId
    where
        H: ResponseHandler + 'static,
    {
        let token = self.shared.next_token();
        self.launch(token, options, Box::new(handler));
        self.start_queued();
        token
    }

    /// A handle that starts requests without borrowing the engine.
    pub fn starter(&self) -> Starter {
        Starter::new(self.shared.clone())
    }

    /// Hand every request queued through a [`Starter`] to the transport.
    /// Runs after every engine callback on its own; call it directly only for
    /// requests queued from outside a handler.
    pub fn start_queued(&mut self) {
        while let Some(queued) = self.shared.pop() {
            self.launch(queued.token, queued.options, queued.handler);
        }
    }

    fn launch(&mut self, token: Token, options: RequestOptions, handler: Box<dyn ResponseHandler>) {
        let handle = TransferHandle::new(token, options);
        let mut request = HttpRequest::new(handle, handler, self.max_response_size);
        #[cfg(feature = "logging")]
        tracing::debug!(
            "request {} {} {}",
            token,
            request.handle().method(),
            request.handle().url()
        );

        if let Some(err) = self.fatal.take() {
            self.state.defer(request, err.to_string());
            return;
        }
        if let Err(err) = request.handle().validate() {
            self.state.defer(request, err.to_string());
            return;
        }
        if let Err(err) = self.transport.add(request.handle(), &mut self.state) {
            self.state.defer(request, err.to_string());
            return;
        }

        request.activate();
        self.state.requests.insert(token, request);
        self.drain_completions();
    }

    /// Start a request whose outcome is delivered through a channel.
    pub fn fetch(&mut self, options: RequestOptions) -> ResponseReceiver {
        let (handler, rx) = ChannelHandler::new();
        self.start(options, handler);
        rx
    }

    /// A registered descriptor became ready.
    pub fn on_socket_ready(&mut self, fd: RawFd, readable: bool, writable: bool) {
        self.drive(ActionTarget::Socket {
            fd,
            readable,
            writable,
        });
    }

    /// The host timer fired.
    pub fn on_timeout(&mut self) {
        self.state.timer_armed = false;
        if matches!(self.state.deadline, Some(deadline) if deadline <= Instant::now()) {
            self.state.deadline = None;
        }

        self.drive(ActionTarget::Timeout);

        if !self.state.timer_armed {
            let remaining = self.state.remaining();
            self.state.arm(remaining);
        }
    }

    /// Fail every outstanding request and release all host loop resources.
    /// Also runs on drop.
    pub fn shutdown(&mut self) {
        let mut tokens: Vec<Token> = self.state.requests.keys().copied().collect();
        tokens.sort_unstable();
        for token in tokens {
            self.transport.remove(token, &mut self.state);
            if let Some(request) = self.state.requests.remove(&token) {
                request.done(Err(TransferFailure::engine(Error::ShutDown.to_string())));
            }
        }
        while let Some((request, message)) = self.state.deferred.pop_front() {
            request.done(Err(TransferFailure::engine(message)));
        }
        // Only what is queued now; handlers above may queue more.
        for queued in self.shared.take_all() {
            let handle = TransferHandle::new(queued.token, queued.options);
            let mut request = HttpRequest::new(handle, queued.handler, self.max_response_size);
            request.activate();
            request.done(Err(TransferFailure::engine(Error::ShutDown.to_string())));
        }

        let fds: Vec<RawFd> = self.state.registry.drain().collect();
        for fd in fds {
            let _ = self.state.event_loop.deregister(fd);
        }
        if self.state.timer_armed {
            self.state.event_loop.cancel_timeout();
            self.state.timer_armed = false;
        }
        self.state.deadline = None;
    }

    /// Requests started and not yet reported.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.state.requests.len() + self.state.deferred.len() + self.shared.queued()
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    #[inline]
    pub fn registered(&self, fd: RawFd) -> Option<Interest> {
        self.state.registry.get(fd)
    }

    #[inline]
    pub fn registered_count(&self) -> usize {
        self.state.registry.len()
    }

    /// When the transport next wants to be driven by a timeout.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }

    #[inline]
    pub fn event_loop(&self) -> &L {
        &self.state.event_loop
    }

    #[inline]
    pub fn event_loop_mut(&mut self) -> &mut L {
        &mut self.state.event_loop
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn drive(&mut self, target: ActionTarget) {
        if let Err(err) = self.transport.action(target, &mut self.state) {
            #[cfg(feature = "logging")]
            tracing::error!("transport failed on {:?}: {}", target, err);
            self.fatal = Some(err);
        }
        self.drain_completions();
        self.flush_deferred();
        self.start_queued();
    }

    fn drain_completions(&mut self) {
        while let Some(completion) = self.transport.next_completion(&mut self.state) {
            match self.state.requests.remove(&completion.token) {
                Some(request) => {
                    #[cfg(feature = "logging")]
                    tracing::debug!("request {} done: {:?}", completion.token, completion.result);
                    request.done(completion.result);
                }
                None => {
                    #[cfg(feature = "logging")]
                    tracing::warn!("completion for unknown transfer {}", completion.token);
                }
            }
        }
    }

    fn flush_deferred(&mut self) {
        if self.state.deferred.is_empty() {
            return;
        }
        while let Some((request, message)) = self.state.deferred.pop_front() {
            request.done(Err(TransferFailure::engine(message)));
        }
        let remaining = self.state.remaining();
        self.state.arm(remaining);
    }
}

impl<T: Transport, L: EventLoop> Drop for HttpClientEngine<T, L> {
    fn drop(&mut self) {
        self.shared.close();
        self.shutdown();
    }
}
