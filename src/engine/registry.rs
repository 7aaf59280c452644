use std::{collections::HashMap, os::fd::RawFd};

use crate::{event_loop::Interest, transport::SocketAction};

/// What the host loop has to do to reflect a socket action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    Register(Interest),
    Reregister(Interest),
    Deregister,
    Unchanged,
}

/// Descriptors currently registered with the host loop.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    sockets: HashMap<RawFd, Interest>,
}

impl Registry {
    pub(crate) fn apply(&mut self, fd: RawFd, action: SocketAction) -> Change {
        match action.interest() {
            Some(interest) => match self.sockets.insert(fd, interest) {
                None => Change::Register(interest),
                Some(old) if old == interest => Change::Unchanged,
                Some(_) => Change::Reregister(interest),
            },
            None => match self.sockets.remove(&fd) {
                Some(_) => Change::Deregister,
                None => Change::Unchanged,
            },
        }
    }

    #[inline]
    pub(crate) fn get(&self, fd: RawFd) -> Option<Interest> {
        self.sockets.get(&fd).copied()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.sockets.len()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = RawFd> + '_ {
        self.sockets.drain().map(|(fd, _)| fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_change_mask() {
        let mut registry = Registry::default();
        assert_eq!(
            registry.apply(5, SocketAction::Readable),
            Change::Register(Interest::READABLE)
        );
        assert_eq!(
            registry.apply(5, SocketAction::Both),
            Change::Reregister(Interest::READABLE | Interest::WRITABLE)
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(5),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
    }

    #[test]
    fn same_mask_twice_is_unchanged() {
        let mut registry = Registry::default();
        registry.apply(5, SocketAction::Writable);
        assert_eq!(registry.apply(5, SocketAction::Writable), Change::Unchanged);
    }

    #[test]
    fn removing_unknown_descriptor_is_noop() {
        let mut registry = Registry::default();
        assert_eq!(registry.apply(9, SocketAction::Remove), Change::Unchanged);
        registry.apply(9, SocketAction::Readable);
        assert_eq!(registry.apply(9, SocketAction::Remove), Change::Deregister);
        assert_eq!(registry.get(9), None);
        assert_eq!(registry.len(), 0);
    }
}
