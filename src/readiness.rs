use std::{fmt, ops};

/// Readiness reported for an event source.
///
/// Source callbacks receive the aggregated `poll(2)` result bits for all
/// descriptors belonging to the source. A callback invoked because the
/// source's timeout elapsed receives [`Readiness::EMPTY`].
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct Readiness(libc::c_short);

impl Readiness {
    /// No readiness; the callback was invoked on a timeout.
    pub const EMPTY: Readiness = Readiness(0);

    pub(crate) fn from_poll_events(events: libc::c_short) -> Readiness {
        Readiness(events)
    }

    /// Returns true if no readiness condition is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The source is ready to be read.
    pub const fn is_readable(self) -> bool {
        (self.0 & (libc::POLLIN | libc::POLLPRI)) != 0
    }

    /// The source is ready to be written.
    pub const fn is_writable(self) -> bool {
        (self.0 & libc::POLLOUT) != 0
    }

    /// Urgent out-of-band data is available.
    pub const fn is_priority(self) -> bool {
        (self.0 & libc::POLLPRI) != 0
    }

    /// An error condition is pending on the source.
    pub const fn is_error(self) -> bool {
        (self.0 & libc::POLLERR) != 0
    }

    /// The peer closed its end of the source.
    pub const fn is_hangup(self) -> bool {
        (self.0 & libc::POLLHUP) != 0
    }

    /// The descriptor is not open.
    pub const fn is_invalid(self) -> bool {
        (self.0 & libc::POLLNVAL) != 0
    }
}

impl ops::BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, other: Readiness) -> Readiness {
        Readiness(self.0 | other.0)
    }
}

impl ops::BitOrAssign for Readiness {
    fn bitor_assign(&mut self, other: Readiness) {
        self.0 |= other.0;
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut one = false;
        for (bit, name) in [
            (libc::POLLIN, "POLLIN"),
            (libc::POLLPRI, "POLLPRI"),
            (libc::POLLOUT, "POLLOUT"),
            (libc::POLLERR, "POLLERR"),
            (libc::POLLHUP, "POLLHUP"),
            (libc::POLLNVAL, "POLLNVAL"),
        ] {
            if (self.0 & bit) != 0 {
                if one {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                one = true;
            }
        }
        if !one {
            write!(f, "(empty)")?;
        }
        Ok(())
    }
}
