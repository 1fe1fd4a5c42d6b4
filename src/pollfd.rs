use std::fmt::{self, Debug, Formatter};
use std::os::unix::io::RawFd;

use crate::{Interest, Readiness};

/// Transparent wrapper around `libc::pollfd`, used to support `Debug` without
/// adding the `extra_traits` feature of `libc`.
///
/// A `PollFd` describes one descriptor a source wants polled. Callers that
/// register through [`Session::source_add_pollfd`] own the descriptor entry;
/// its address doubles as the source key, so it must not move between the
/// add and the matching remove.
///
/// [`Session::source_add_pollfd`]: crate::Session::source_add_pollfd
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct PollFd(libc::pollfd);

impl PollFd {
    /// Describe `fd` with the given readiness interest.
    pub fn new(fd: RawFd, interest: Interest) -> PollFd {
        PollFd(libc::pollfd {
            fd,
            events: interest.to_poll_events(),
            revents: 0,
        })
    }

    /// The wrapped descriptor.
    pub fn fd(&self) -> RawFd {
        self.0.fd
    }

    /// Readiness reported by the most recent poll.
    pub fn readiness(&self) -> Readiness {
        Readiness::from_poll_events(self.0.revents)
    }
}

impl Debug for PollFd {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("pollfd")
            .field("fd", &self.0.fd)
            .field("events", &self.0.events)
            .field("revents", &self.0.revents)
            .finish()
    }
}
