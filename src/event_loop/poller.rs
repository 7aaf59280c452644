//! A ready-made host loop over the `polling` crate (epoll, kqueue).
//!
//! Registrations are one-shot in `polling` 2.x, so every descriptor that
//! fires is re-armed with its current interest before the turn returns.
use std::{
    collections::HashMap,
    io,
    os::fd::RawFd,
    time::{Duration, Instant},
};

use polling::{Event, Poller};

use super::{EventLoop, Interest};
use crate::{engine::HttpClientEngine, transport::Transport, Error};

/// One descriptor reported ready by [`PollingLoop::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
}

/// Result of a single wait.
#[derive(Debug, Default)]
pub struct Turn {
    pub ready: Vec<Readiness>,
    /// The scheduled timeout expired during this turn.
    pub timed_out: bool,
}

pub struct PollingLoop {
    poller: Poller,
    events: Vec<Event>,
    sources: HashMap<RawFd, Interest>,
    deadline: Option<Instant>,
}

#[inline]
fn poll_event(fd: RawFd, interest: Interest) -> Event {
    let key = fd as usize;
    match (interest.is_readable(), interest.is_writable()) {
        (true, true) => Event::all(key),
        (true, false) => Event::readable(key),
        (false, true) => Event::writable(key),
        (false, false) => Event::none(key),
    }
}

impl PollingLoop {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            events: Vec::with_capacity(64),
            sources: HashMap::new(),
            deadline: None,
        })
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    pub fn registered(&self) -> usize {
        self.sources.len()
    }

    /// Block until a registered descriptor is ready, the scheduled timeout
    /// expires or `max_wait` elapses, whichever comes first.
    pub fn wait(&mut self, max_wait: Option<Duration>) -> io::Result<Turn> {
        let until_deadline = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        let timeout = match (until_deadline, max_wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        self.events.clear();
        self.poller.wait(&mut self.events, timeout)?;

        let mut turn = Turn::default();
        for event in &self.events {
            let fd = event.key as RawFd;
            let Some(&interest) = self.sources.get(&fd) else {
                continue;
            };
            self.poller.modify(fd, poll_event(fd, interest))?;
            turn.ready.push(Readiness {
                fd,
                readable: event.readable,
                writable: event.writable,
            });
        }

        if matches!(self.deadline, Some(deadline) if deadline <= Instant::now()) {
            self.deadline = None;
            turn.timed_out = true;
        }
        Ok(turn)
    }
}

impl EventLoop for PollingLoop {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if self.sources.contains_key(&fd) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "descriptor already registered",
            ));
        }
        self.poller.add(fd, poll_event(fd, interest))?;
        self.sources.insert(fd, interest);
        Ok(())
    }

    fn reregister(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let current = self
            .sources
            .get_mut(&fd)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "descriptor not registered"))?;
        self.poller.modify(fd, poll_event(fd, interest))?;
        *current = interest;
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        // The descriptor may already be closed, which removes it from the
        // poller on its own.
        if self.sources.remove(&fd).is_none() {
            return Ok(());
        }
        self.poller.delete(fd)
    }

    fn schedule_timeout(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    fn cancel_timeout(&mut self) {
        self.deadline = None;
    }
}

impl std::fmt::Debug for PollingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingLoop")
            .field("sources", &self.sources)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl<T: Transport> HttpClientEngine<T, PollingLoop> {
    /// Wait once on the poller and feed what happened into the engine.
    pub fn turn(&mut self, max_wait: Option<Duration>) -> io::Result<()> {
        self.start_queued();
        let turn = self.event_loop_mut().wait(max_wait)?;
        for ready in turn.ready {
            // An earlier readiness in this turn may have closed it.
            if self.registered(ready.fd).is_some() {
                self.on_socket_ready(ready.fd, ready.readable, ready.writable);
            }
        }
        if turn.timed_out {
            self.on_timeout();
        }
        Ok(())
    }

    /// Turn the loop until no request is outstanding. Fails with a
    /// `TimedOut` I/O error if `limit` elapses first.
    pub fn run_until_idle(&mut self, limit: Option<Duration>) -> crate::Result<()> {
        let started = Instant::now();
        while !self.is_idle() {
            let max_wait = match limit {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        return Err(Error::Io(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "requests still in flight",
                        )));
                    }
                    Some(limit - elapsed)
                }
                None => None,
            };
            self.turn(max_wait)?;
        }
        Ok(())
    }
}
