//! The host event loop seam.
//!
//! The engine never waits on anything itself. It asks an [`EventLoop`] to
//! watch descriptors and to run one countdown timer, and the loop calls
//! [`on_socket_ready`](crate::HttpClientEngine::on_socket_ready) and
//! [`on_timeout`](crate::HttpClientEngine::on_timeout) back.
#[cfg(feature = "polling")]
mod poller;

use std::{
    io,
    ops::{BitOr, BitOrAssign},
    os::fd::RawFd,
    time::Duration,
};

#[cfg(feature = "polling")]
pub use poller::{PollingLoop, Readiness, Turn};

/// Readiness a descriptor is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Self = Self(0);
    pub const READABLE: Self = Self(1 << 0);
    pub const WRITABLE: Self = Self(1 << 1);

    #[inline]
    pub const fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    #[inline]
    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Interest {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

pub trait EventLoop {
    /// Start watching a descriptor that is not registered yet.
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Replace the interest of an already registered descriptor.
    fn reregister(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.deregister(fd)?;
        self.register(fd, interest)
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Arm the single timer. Arming it again replaces the previous deadline.
    fn schedule_timeout(&mut self, after: Duration);

    fn cancel_timeout(&mut self);
}
