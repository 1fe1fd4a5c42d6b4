use std::io;
use std::time::Instant;

use crate::PollFd;

/// Helper macro to execute a system call that returns an `io::Result`.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// Milliseconds until `deadline`, in the form `poll(2)` expects.
///
/// `None` maps to -1 (block forever) and an expired deadline maps to 0.
/// Fractional milliseconds are rounded up so the kernel never wakes the
/// loop before the deadline; the result is clamped to `c_int::MAX`.
fn timeout_for(deadline: Option<Instant>) -> libc::c_int {
    let deadline = match deadline {
        Some(deadline) => deadline,
        None => return -1,
    };
    let remaining = deadline.saturating_duration_since(Instant::now());

    let mut millis = remaining.as_millis();
    if remaining.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}

/// Helper function to call poll.
pub(crate) fn poll(fds: &mut [PollFd], deadline: Option<Instant>) -> io::Result<usize> {
    let num_events = syscall!(poll(
        fds.as_mut_ptr() as *mut libc::pollfd,
        fds.len() as libc::nfds_t,
        timeout_for(deadline),
    ))?;

    Ok(num_events as usize)
}
