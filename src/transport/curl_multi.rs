//! [`Transport`] over the libcurl multi socket interface.
//!
//! libcurl reports socket interest, timer changes and body data through
//! callbacks that must be `'static`. Those callbacks only queue [`Event`]s;
//! the queue is flushed into [`TransferEvents`] before every `Transport`
//! method returns, so the engine still sees them synchronously.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use curl::{
    easy::{Easy2, Handler, List, WriteError},
    multi::{Easy2Handle, Events, Multi, Socket, SocketEvents},
};

use super::{ActionTarget, Completion, SocketAction, TransferEvents, TransferResult, Transport};
use crate::{
    config::Config,
    error::TransferFailure,
    transfer::{Method, Token, TransferHandle},
};

/// `CURLE_WRITE_ERROR`
const WRITE_ERROR: u32 = 23;

#[derive(Debug)]
enum Event {
    Socket(Socket, SocketAction),
    Timer(Option<Duration>),
    Data(Token, Vec<u8>),
}

type Queue = Arc<Mutex<VecDeque<Event>>>;

#[inline]
fn push(queue: &Queue, event: Event) {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push_back(event);
}

struct Sink {
    token: Token,
    queue: Queue,
    aborted: bool,
}

impl Handler for Sink {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.aborted {
            return Ok(0);
        }
        push(&self.queue, Event::Data(self.token, data.to_vec()));
        Ok(data.len())
    }
}

fn socket_action(events: &SocketEvents) -> SocketAction {
    if events.remove() {
        SocketAction::Remove
    } else if events.input_and_output() {
        SocketAction::Both
    } else if events.input() {
        SocketAction::Readable
    } else {
        SocketAction::Writable
    }
}

pub struct CurlTransport {
    // dropped before `multi`
    handles: HashMap<Token, Easy2Handle<Sink>>,
    multi: Multi,
    queue: Queue,
    completions: VecDeque<Completion>,
    config: Config,
}

impl CurlTransport {
    /// Create a multi handle configured from `config`.
    ///
    /// `https://` needs a TLS-capable libcurl. The bundled build has TLS only
    /// with the `ssl` feature; without it such transfers fail with
    /// "Unsupported protocol".
    pub fn new(config: &Config) -> crate::Result<Self> {
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
        let mut multi = Multi::new();

        let sockets = queue.clone();
        multi.socket_function(move |socket, events, _token| {
            push(&sockets, Event::Socket(socket, socket_action(&events)));
        })?;
        let timers = queue.clone();
        multi.timer_function(move |timeout| {
            push(&timers, Event::Timer(timeout));
            true
        })?;

        Ok(Self {
            handles: HashMap::new(),
            multi,
            queue,
            completions: VecDeque::new(),
            config: config.clone(),
        })
    }

    /// Transfers currently attached to the multi handle.
    #[inline]
    pub fn active(&self) -> usize {
        self.handles.len()
    }

    fn configure(&self, handle: &TransferHandle) -> crate::Result<Easy2<Sink>> {
        let mut easy = Easy2::new(Sink {
            token: handle.token(),
            queue: self.queue.clone(),
            aborted: false,
        });
        easy.signal(false)?;
        easy.url(handle.url())?;
        match handle.method() {
            Method::Get => easy.get(true)?,
            Method::Post => {
                easy.post(true)?;
                easy.post_fields_copy(handle.body().map(|b| &b[..]).unwrap_or_default())?;
            }
        }

        if !handle.headers().is_empty() {
            let mut list = List::new();
            for (name, value) in handle.headers() {
                list.append(&format!(
                    "{}: {}",
                    name,
                    String::from_utf8_lossy(value.as_bytes())
                ))?;
            }
            easy.http_headers(list)?;
        }

        let config = &self.config;
        easy.useragent(config.user_agent())?;
        easy.follow_location(config.follow_redirects)?;
        if config.follow_redirects {
            easy.max_redirections(config.max_redirects)?;
        }
        if let Some(timeout) = config.connect_timeout() {
            easy.connect_timeout(timeout)?;
        }
        if let Some(timeout) = config.timeout() {
            easy.timeout(timeout)?;
        }
        if let Some(proxy) = &config.proxy {
            easy.proxy(proxy)?;
        }
        easy.verbose(config.verbose)?;
        Ok(easy)
    }

    /// Forward everything the callbacks queued.
    fn flush(&mut self, events: &mut dyn TransferEvents) {
        let pending: Vec<Event> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for event in pending {
            match event {
                Event::Socket(fd, action) => events.socket(fd, action),
                Event::Timer(timeout) => events.timer(timeout),
                Event::Data(token, data) => {
                    let Some(handle) = self.handles.get_mut(&token) else {
                        continue;
                    };
                    if handle.get_ref().aborted {
                        continue;
                    }
                    if events.write(token, &data) < data.len() {
                        #[cfg(feature = "logging")]
                        tracing::debug!("transfer {} refused data, aborting", token);
                        handle.get_mut().aborted = true;
                    }
                }
            }
        }
    }

    fn collect_messages(&mut self, events: &mut dyn TransferEvents) {
        let mut finished = Vec::new();
        let handles = &self.handles;
        // `result_for2` carries libcurl's error buffer text along.
        self.multi.messages(|message| {
            let Ok(token) = message.token().map(Token) else {
                return;
            };
            if let Some(result) = handles
                .get(&token)
                .and_then(|handle| message.result_for2(handle))
            {
                finished.push((token, result));
            }
        });

        for (token, result) in finished {
            let Some(handle) = self.handles.remove(&token) else {
                continue;
            };
            let easy = match self.multi.remove2(handle) {
                Ok(easy) => easy,
                Err(_err) => {
                    #[cfg(feature = "logging")]
                    tracing::error!("unable to detach transfer {}: {}", token, _err);
                    self.completions.push_back(Completion::new(
                        token,
                        Err(TransferFailure::engine("unable to detach transfer")),
                    ));
                    continue;
                }
            };

            let result: TransferResult = match result {
                Err(err) => {
                    if let Some(extra) = err.extra_description() {
                        events.error(token, extra);
                    }
                    Err(TransferFailure::new(err.code() as u32, err.description()))
                }
                Ok(()) if easy.get_ref().aborted => Err(TransferFailure::new(
                    WRITE_ERROR,
                    "Failure writing output to destination",
                )),
                Ok(()) => easy
                    .response_code()
                    .map_err(|err| TransferFailure::new(err.code() as u32, err.description())),
            };
            self.completions.push_back(Completion::new(token, result));
        }
    }
}

impl Transport for CurlTransport {
    fn add(
        &mut self,
        handle: &TransferHandle,
        events: &mut dyn TransferEvents,
    ) -> crate::Result<()> {
        let easy = self.configure(handle)?;
        let mut attached = self.multi.add2(easy)?;
        attached.set_token(handle.token().0)?;
        self.handles.insert(handle.token(), attached);
        self.flush(events);
        Ok(())
    }

    fn action(
        &mut self,
        target: ActionTarget,
        events: &mut dyn TransferEvents,
    ) -> crate::Result<()> {
        let driven = match target {
            ActionTarget::Socket {
                fd,
                readable,
                writable,
            } => {
                let mut ready = Events::new();
                ready.input(readable).output(writable);
                self.multi.action(fd, &ready)
            }
            ActionTarget::Timeout => self.multi.timeout(),
        };
        // Data and socket changes produced before a failure still count.
        self.flush(events);
        driven?;
        self.collect_messages(events);
        self.flush(events);
        Ok(())
    }

    fn next_completion(&mut self, events: &mut dyn TransferEvents) -> Option<Completion> {
        self.flush(events);
        self.completions.pop_front()
    }

    fn remove(&mut self, token: Token, events: &mut dyn TransferEvents) {
        if let Some(handle) = self.handles.remove(&token) {
            if let Err(_err) = self.multi.remove2(handle) {
                #[cfg(feature = "logging")]
                tracing::warn!("unable to detach transfer {}: {}", token, _err);
            }
        }
        self.completions.retain(|completion| completion.token != token);
        self.flush(events);
    }
}

impl std::fmt::Debug for CurlTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurlTransport")
            .field("active", &self.handles.len())
            .field("completions", &self.completions.len())
            .finish()
    }
}
