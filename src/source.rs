use std::cell::RefCell;
use std::fmt;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::{Error, PollFd, Readiness, Result, Session};

/// Identity of an event source within a session.
///
/// The key space is tagged: raw descriptors, caller-owned object addresses
/// and foreign backend handles never collide, even when their numeric
/// values coincide. Negative descriptors are legitimate keys for pure timer
/// sources.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceKey {
    /// A raw file descriptor, or a negative value for a timer-only source.
    Fd(RawFd),
    /// The address of a caller-owned descriptor or I/O channel object.
    Ptr(usize),
    /// The handle of a foreign backend providing its own timeout hints.
    Backend(usize),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Fd(fd) => write!(f, "fd {}", fd),
            SourceKey::Ptr(addr) => write!(f, "object {:#x}", addr),
            SourceKey::Backend(addr) => write!(f, "backend {:#x}", addr),
        }
    }
}

/// Out-of-band deadline hints for a foreign backend source.
///
/// Some backends (a USB library, typically) keep internal transfer timers
/// the session cannot see through its descriptors alone. A provider
/// attached to a source is asked for its next deadline once per loop
/// iteration; the nearer of the provider's deadline and the source's own
/// is used to decide when the source fires.
pub trait TimeoutProvider {
    /// Time until the backend next needs servicing, if any.
    fn next_timeout(&self) -> Option<Duration>;
}

/// Callback invoked when a source has I/O readiness or its timeout expires.
///
/// Returning `false` removes the source from the session.
pub type SourceCallback = dyn FnMut(&Session, RawFd, Readiness) -> bool;

pub(crate) struct Source {
    pub(crate) key: SourceKey,
    /// Period between timeout callbacks; `None` for pure I/O sources.
    pub(crate) interval: Option<Duration>,
    /// Deadline of the next timeout callback; `None` means never.
    pub(crate) due: Option<Instant>,
    /// Number of consecutive entries this source owns in the descriptor
    /// array. 0 for pure timers, 1 for ordinary I/O, more for backends.
    pub(crate) num_fds: usize,
    /// Set once the source has fired in the current loop iteration.
    pub(crate) triggered: bool,
    pub(crate) callback: Rc<RefCell<SourceCallback>>,
    pub(crate) provider: Option<Rc<dyn TimeoutProvider>>,
}

/// The ordered set of event sources, with the flat descriptor array handed
/// to `poll(2)` kept in lockstep: source `i` owns the `num_fds` entries
/// starting at the sum of its predecessors' `num_fds`.
pub(crate) struct Sources {
    pub(crate) entries: Vec<Source>,
    pub(crate) poll_fds: Vec<PollFd>,
}

impl Sources {
    pub(crate) fn new() -> Sources {
        Sources {
            entries: Vec::new(),
            poll_fds: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install a source. The key must be unique across the registry, and a
    /// source with no descriptors must carry a timeout, since it could
    /// never fire otherwise.
    pub(crate) fn add(
        &mut self,
        key: SourceKey,
        descriptors: &[PollFd],
        timeout: Option<Duration>,
        provider: Option<Rc<dyn TimeoutProvider>>,
        callback: Rc<RefCell<SourceCallback>>,
    ) -> Result<()> {
        if descriptors.is_empty() && timeout.is_none() {
            error!("timer source without timeout would block indefinitely");
            return Err(Error::BadArg("timer source without timeout"));
        }
        if self.entries.iter().any(|source| source.key == key) {
            error!("event source {} already installed", key);
            return Err(Error::AlreadyInstalled);
        }

        debug!(
            "installing event source {} with {} FDs and timeout {:?}",
            key,
            descriptors.len(),
            timeout
        );
        for pollfd in descriptors {
            debug!("registering poll {:?}", pollfd);
        }

        self.entries.push(Source {
            key,
            interval: timeout,
            due: timeout.map(|t| Instant::now() + t),
            num_fds: descriptors.len(),
            triggered: false,
            callback,
            provider,
        });
        self.poll_fds.extend_from_slice(descriptors);

        Ok(())
    }

    /// Remove the source matching `key` along with its descriptor slice.
    ///
    /// Removing a key that is not installed is reported but deliberately
    /// non-fatal: the handle may have been reused after an earlier removal.
    pub(crate) fn remove(&mut self, key: SourceKey) -> Result<()> {
        let mut fd_index = 0;

        for i in 0..self.entries.len() {
            let source = &self.entries[i];
            if source.key == key {
                let num_fds = source.num_fds;
                self.poll_fds.drain(fd_index..fd_index + num_fds);
                self.entries.remove(i);
                debug!("removed event source {}", key);
                return Ok(());
            }
            fd_index += source.num_fds;
        }

        warn!("cannot remove non-existing event source {}", key);
        Err(Error::NotFound)
    }

    /// Clear the per-iteration dispatch guard on every source.
    pub(crate) fn clear_triggered(&mut self) {
        for source in &mut self.entries {
            source.triggered = false;
        }
    }

    /// The nearest deadline across all sources, ignoring provider hints.
    pub(crate) fn min_due(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter_map(|source| source.due)
            .min()
    }
}
