use std::num::NonZeroU8;
use std::{fmt, ops};

/// Readiness interest used when registering an event source.
///
/// Interest tells the session which conditions on a descriptor should wake
/// the event loop. Pure timer sources carry no descriptors, so their
/// interest is ignored.
///
/// The size of `Option<Interest>` is identical to itself.
///
/// ```
/// use std::mem::size_of;
/// use sigflow::Interest;
///
/// assert_eq!(size_of::<Option<Interest>>(), size_of::<Interest>());
/// ```
#[derive(Copy, PartialEq, Eq, Clone, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Interest(NonZeroU8);

// These must be unique.
const READABLE: u8 = 0b001;
const WRITABLE: u8 = 0b010;
const PRIORITY: u8 = 0b100;

impl Interest {
    /// Interest in read readiness.
    pub const READABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(READABLE) });

    /// Interest in write readiness.
    pub const WRITABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(WRITABLE) });

    /// Interest in urgent out-of-band data.
    pub const PRIORITY: Interest = Interest(unsafe { NonZeroU8::new_unchecked(PRIORITY) });

    /// Add together two `Interest`s.
    ///
    /// This does the same thing as the `BitOr` implementation, but is a
    /// constant function.
    #[allow(clippy::should_implement_trait)]
    pub const fn add(self, other: Interest) -> Interest {
        Interest(unsafe { NonZeroU8::new_unchecked(self.0.get() | other.0.get()) })
    }

    /// Returns true if the value includes readable interest.
    pub const fn is_readable(self) -> bool {
        (self.0.get() & READABLE) != 0
    }

    /// Returns true if the value includes writable interest.
    pub const fn is_writable(self) -> bool {
        (self.0.get() & WRITABLE) != 0
    }

    /// Returns true if the value includes priority interest.
    pub const fn is_priority(self) -> bool {
        (self.0.get() & PRIORITY) != 0
    }

    /// The `poll(2)` event mask matching this interest.
    pub(crate) fn to_poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.is_readable() {
            events |= libc::POLLIN;
        }
        if self.is_writable() {
            events |= libc::POLLOUT;
        }
        if self.is_priority() {
            events |= libc::POLLPRI;
        }
        events
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;

    fn bitor(self, other: Interest) -> Interest {
        self.add(other)
    }
}

impl ops::BitOrAssign for Interest {
    fn bitor_assign(&mut self, other: Interest) {
        *self = self.add(other);
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut one = false;
        if self.is_readable() {
            write!(f, "READABLE")?;
            one = true;
        }
        if self.is_writable() {
            if one {
                write!(f, " | ")?;
            }
            write!(f, "WRITABLE")?;
            one = true;
        }
        if self.is_priority() {
            if one {
                write!(f, " | ")?;
            }
            write!(f, "PRIORITY")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Interest;

    #[test]
    fn combining() {
        let interest = Interest::READABLE | Interest::WRITABLE;
        assert!(interest.is_readable());
        assert!(interest.is_writable());
        assert!(!interest.is_priority());
    }

    #[test]
    fn poll_events() {
        assert_eq!(Interest::READABLE.to_poll_events(), libc::POLLIN);
        assert_eq!(
            (Interest::WRITABLE | Interest::PRIORITY).to_poll_events(),
            libc::POLLOUT | libc::POLLPRI
        );
    }
}
