//! Doubles for the transport and host loop seams, shared by unit tests.
use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io,
    os::fd::RawFd,
    rc::Rc,
    time::Duration,
};

use bytes::Bytes;

use crate::{
    event_loop::{EventLoop, Interest},
    request::ResponseHandler,
    transfer::{Method, Token, TransferHandle},
    transport::{
        ActionTarget, Completion, SocketAction, TransferEvents, TransferResult, Transport,
    },
    Error,
};

/// One scripted transport reaction, replayed on the next `add` or `action`.
#[derive(Debug)]
pub(crate) enum Step {
    Socket(RawFd, SocketAction),
    Timer(Option<Duration>),
    Write(Token, &'static [u8]),
    Error(Token, &'static str),
    Complete(Token, TransferResult),
    Fatal(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Added {
    pub(crate) token: Token,
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) body: Option<Bytes>,
}

#[derive(Debug, Default)]
pub(crate) struct Script {
    pub(crate) added: Vec<Added>,
    pub(crate) actions: Vec<ActionTarget>,
    pub(crate) removed: Vec<Token>,
    /// Return values of every `write` callback, in order.
    pub(crate) accepted: Vec<(Token, usize)>,
    pub(crate) reject_add: Option<&'static str>,
    pending: VecDeque<Step>,
    completions: VecDeque<Completion>,
}

impl Script {
    pub(crate) fn push(&mut self, step: Step) -> &mut Self {
        self.pending.push_back(step);
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> (Self, Rc<RefCell<Script>>) {
        let transport = Self::default();
        let script = transport.script.clone();
        (transport, script)
    }

    fn replay(&self, events: &mut dyn TransferEvents) -> crate::Result<()> {
        loop {
            let step = self.script.borrow_mut().pending.pop_front();
            let Some(step) = step else {
                return Ok(());
            };
            match step {
                Step::Socket(fd, action) => events.socket(fd, action),
                Step::Timer(timeout) => events.timer(timeout),
                Step::Write(token, data) => {
                    let accepted = events.write(token, data);
                    self.script.borrow_mut().accepted.push((token, accepted));
                }
                Step::Error(token, message) => events.error(token, message),
                Step::Complete(token, result) => self
                    .script
                    .borrow_mut()
                    .completions
                    .push_back(Completion::new(token, result)),
                Step::Fatal(message) => return Err(Error::Transport(message.to_owned())),
            }
        }
    }
}

impl Transport for ScriptedTransport {
    fn add(
        &mut self,
        handle: &TransferHandle,
        events: &mut dyn TransferEvents,
    ) -> crate::Result<()> {
        {
            let mut script = self.script.borrow_mut();
            if let Some(message) = script.reject_add.take() {
                return Err(Error::Transport(message.to_owned()));
            }
            script.added.push(Added {
                token: handle.token(),
                url: handle.url().to_owned(),
                method: handle.method(),
                body: handle.body().cloned(),
            });
        }
        self.replay(events)
    }

    fn action(
        &mut self,
        target: ActionTarget,
        events: &mut dyn TransferEvents,
    ) -> crate::Result<()> {
        self.script.borrow_mut().actions.push(target);
        self.replay(events)
    }

    fn next_completion(&mut self, _events: &mut dyn TransferEvents) -> Option<Completion> {
        self.script.borrow_mut().completions.pop_front()
    }

    fn remove(&mut self, token: Token, _events: &mut dyn TransferEvents) {
        self.script.borrow_mut().removed.push(token);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoopCall {
    Register(RawFd, Interest),
    Reregister(RawFd, Interest),
    Deregister(RawFd),
    Schedule(Duration),
    Cancel,
}

/// Host loop that only records what it was asked to do.
#[derive(Debug, Default)]
pub(crate) struct RecordingLoop {
    pub(crate) registered: HashMap<RawFd, Interest>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) calls: Vec<LoopCall>,
}

impl EventLoop for RecordingLoop {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if self.registered.contains_key(&fd) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "descriptor already registered",
            ));
        }
        self.registered.insert(fd, interest);
        self.calls.push(LoopCall::Register(fd, interest));
        Ok(())
    }

    fn reregister(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.registered.get_mut(&fd) {
            Some(current) => *current = interest,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "descriptor not registered",
                ))
            }
        }
        self.calls.push(LoopCall::Reregister(fd, interest));
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.registered.remove(&fd);
        self.calls.push(LoopCall::Deregister(fd));
        Ok(())
    }

    fn schedule_timeout(&mut self, after: Duration) {
        self.timeout = Some(after);
        self.calls.push(LoopCall::Schedule(after));
    }

    fn cancel_timeout(&mut self) {
        self.timeout = None;
        self.calls.push(LoopCall::Cancel);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success(Bytes),
    Error(String),
}

/// Collects handler callbacks from any number of requests, in call order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    log: Rc<RefCell<Vec<(&'static str, Outcome)>>>,
}

impl Recorder {
    pub(crate) fn handler(&self, name: &'static str) -> RecordingHandler {
        RecordingHandler {
            name,
            log: self.log.clone(),
        }
    }

    pub(crate) fn outcomes(&self) -> Vec<(&'static str, Outcome)> {
        self.log.borrow().clone()
    }
}

pub(crate) struct RecordingHandler {
    name: &'static str,
    log: Rc<RefCell<Vec<(&'static str, Outcome)>>>,
}

impl ResponseHandler for RecordingHandler {
    fn on_success(&mut self, body: Bytes) {
        self.log.borrow_mut().push((self.name, Outcome::Success(body)));
    }

    fn on_error(&mut self, message: String) {
        self.log.borrow_mut().push((self.name, Outcome::Error(message)));
    }
}
