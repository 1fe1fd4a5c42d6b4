//! Session runtime for signal-acquisition devices.
//!
//! A [`Session`] binds a set of acquisition devices to a cooperative event
//! loop. Drivers register event sources — file descriptors, timers and
//! foreign backends — which the loop multiplexes over a single `poll(2)`
//! call, dispatching callbacks as descriptors become ready or per-source
//! timeouts expire. Packets produced during acquisition flow through an
//! ordered chain of [`Transform`]s and are fanned out to every registered
//! subscriber.
//!
//! Everything runs on the thread driving [`Session::run`]; the one
//! cross-thread operation is requesting a stop through [`Stopper`].
//!
//! # Examples
//!
//! Stream packets from a virtual device to a subscriber:
//!
//! ```
//! use sigflow::datafeed::Packet;
//! use sigflow::{Device, Session};
//!
//! # fn main() -> Result<(), sigflow::Error> {
//! let session = Session::new();
//! let device = Device::new(None, "demo", "virtual/0", Vec::new());
//! session.dev_add(&device)?;
//!
//! session.subscriber_add(|_device, packet| {
//!     println!("got {:?}", packet);
//! });
//!
//! session.send(&device, Packet::Trigger)?;
//! session.send(&device, Packet::End)?;
//! # Ok(())
//! # }
//! ```

pub mod datafeed;
mod device;
mod error;
mod interest;
mod pollfd;
mod readiness;
mod session;
mod source;
mod sys;
mod transform;
mod trigger;

pub use crate::device::{Channel, ChannelKind, Device, Driver};
pub use crate::error::{Error, Result};
pub use crate::interest::Interest;
pub use crate::pollfd::PollFd;
pub use crate::readiness::Readiness;
pub use crate::session::{Session, SessionId, Stopper};
pub use crate::source::{SourceKey, TimeoutProvider};
pub use crate::transform::Transform;
pub use crate::trigger::{MatchKind, Trigger, TriggerMatch, TriggerStage};
