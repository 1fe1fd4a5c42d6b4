use std::cell::RefCell;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{error, info, log_enabled, trace, Level};

use crate::datafeed::{self, Packet};
use crate::source::{SourceCallback, SourceKey, Sources, TimeoutProvider};
use crate::sys;
use crate::transform::Transform;
use crate::{Device, Error, Interest, PollFd, Readiness, Result, Trigger};

/// Unique id of a session within the process.
///
/// Devices carry the id of the session they are attached to; it is a
/// non-owning back-reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(usize);

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Default)]
struct StopState {
    stop_requested: bool,
    running: bool,
}

/// Cross-thread handle requesting a session to stop.
///
/// This is the only part of the session that may be used from a thread
/// other than the one driving [`Session::run`]. [`Stopper::stop`] flags the
/// request and returns immediately; the loop honors it at the next
/// dispatch boundary.
#[derive(Clone)]
pub struct Stopper {
    state: Arc<Mutex<StopState>>,
}

impl Stopper {
    /// Request the session to stop.
    pub fn stop(&self) {
        self.state.lock().unwrap().stop_requested = true;
    }
}

type Subscriber = Rc<RefCell<dyn FnMut(&Rc<Device>, &Packet)>>;

/// A signal-acquisition session.
///
/// A session binds a roster of devices to a cooperative event loop. Drivers
/// register event sources (descriptors, timers, foreign backends) while
/// acquisition runs; [`Session::run`] multiplexes them over a single
/// `poll(2)` call and dispatches callbacks until no source is left. Packets
/// produced by drivers travel through the transform chain and are fanned
/// out to every subscriber in registration order.
///
/// The session is single-threaded by design: callbacks, transforms and
/// subscribers all run on the thread calling `run`. The sole cross-thread
/// operation is stopping, through the handle returned by
/// [`Session::stopper`].
///
/// # Examples
///
/// A timer source that fires once and removes itself:
///
/// ```
/// use std::time::Duration;
/// use sigflow::{Interest, Session};
///
/// # fn main() -> Result<(), sigflow::Error> {
/// let session = Session::new();
/// session.source_add_fd(
///     -1,
///     Interest::READABLE,
///     Some(Duration::from_millis(10)),
///     |_session, _fd, _readiness| false,
/// )?;
/// session.run()?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    id: SessionId,
    devs: RefCell<Vec<Rc<Device>>>,
    owned_devs: RefCell<Vec<Rc<Device>>>,
    subscribers: RefCell<Vec<Subscriber>>,
    transforms: RefCell<Vec<Rc<RefCell<dyn Transform>>>>,
    trigger: RefCell<Option<Rc<Trigger>>>,
    sources: RefCell<Sources>,
    stop_state: Arc<Mutex<StopState>>,
}

impl Session {
    /// Create a new session with an empty roster.
    pub fn new() -> Session {
        Session {
            id: SessionId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            devs: RefCell::new(Vec::new()),
            owned_devs: RefCell::new(Vec::new()),
            subscribers: RefCell::new(Vec::new()),
            transforms: RefCell::new(Vec::new()),
            trigger: RefCell::new(None),
            sources: RefCell::new(Sources::new()),
            stop_state: Arc::new(Mutex::new(StopState::default())),
        }
    }

    /// This session's process-unique id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// A handle usable from any thread to request a stop.
    pub fn stopper(&self) -> Stopper {
        Stopper {
            state: Arc::clone(&self.stop_state),
        }
    }

    /// Request the session to stop.
    ///
    /// Equivalent to [`Stopper::stop`]; the request takes effect at the
    /// next dispatch boundary of the running loop, where every driver's
    /// `acquisition_stop` is invoked on the loop thread.
    pub fn stop(&self) {
        self.stop_state.lock().unwrap().stop_requested = true;
    }

    /// Whether the session is between a `run` and the completion of the
    /// stop sequence.
    pub fn is_running(&self) -> bool {
        self.stop_state.lock().unwrap().running
    }

    /// The trigger assigned to this session, if any.
    pub fn trigger(&self) -> Option<Rc<Trigger>> {
        self.trigger.borrow().clone()
    }

    /// Assign or clear the session's trigger.
    ///
    /// The trigger is validated when the session is started.
    pub fn set_trigger(&self, trigger: Option<Trigger>) {
        *self.trigger.borrow_mut() = trigger.map(Rc::new);
    }

    /* ===== Device roster ===== */

    /// Add a device instance to the session.
    ///
    /// A device already attached to a session (this one included) is
    /// rejected. A device without a driver is virtual and is merely
    /// enrolled. When a real device is added to a *running* session its
    /// configuration is committed and acquisition is started immediately;
    /// a failure of either is returned without un-enrolling the device.
    pub fn dev_add(&self, device: &Rc<Device>) -> Result<()> {
        // A device carrying a session id is in this or another session.
        if device.session_id().is_some() {
            error!("device already assigned to a session");
            return Err(Error::BadArg("device already assigned to a session"));
        }

        self.devs.borrow_mut().push(Rc::clone(device));
        device.bind(self.id);

        let driver = match device.driver() {
            Some(driver) => Rc::clone(driver),
            // No driver: a virtual device, nothing to start.
            None => return Ok(()),
        };

        if self.is_running() {
            // Adding a device to a running session. Commit settings and
            // start acquisition on that device now.
            if let Err(err) = driver.config_commit(device) {
                error!(
                    "failed to commit device settings before starting \
                     acquisition in running session ({})",
                    err
                );
                return Err(err);
            }
            if let Err(err) = driver.acquisition_start(device, self) {
                error!(
                    "failed to start acquisition of device in running session ({})",
                    err
                );
                return Err(err);
            }
        }

        Ok(())
    }

    /// Add a device whose lifetime the session manages.
    ///
    /// The device is enrolled like [`Session::dev_add`], and the session
    /// additionally keeps a strong reference to it until the session
    /// itself is dropped.
    pub fn dev_add_owned(&self, device: &Rc<Device>) -> Result<()> {
        self.dev_add(device)?;
        self.owned_devs.borrow_mut().push(Rc::clone(device));
        Ok(())
    }

    /// All device instances attached to the session.
    pub fn dev_list(&self) -> Vec<Rc<Device>> {
        self.devs.borrow().clone()
    }

    /// Remove all devices from the session.
    ///
    /// Every device's session back-reference is cleared; the devices
    /// themselves stay alive.
    pub fn dev_remove_all(&self) {
        let mut devs = self.devs.borrow_mut();
        for device in devs.iter() {
            device.unbind();
        }
        devs.clear();
    }

    /* ===== Datafeed bus ===== */

    /// Register a subscriber receiving every packet on the datafeed bus.
    ///
    /// Subscribers are invoked synchronously in registration order. A
    /// subscriber must not keep the packet beyond its return without
    /// cloning it.
    pub fn subscriber_add<F>(&self, callback: F)
    where
        F: FnMut(&Rc<Device>, &Packet) + 'static,
    {
        self.subscribers
            .borrow_mut()
            .push(Rc::new(RefCell::new(callback)));
    }

    /// Remove all datafeed subscribers from the session.
    pub fn subscriber_remove_all(&self) {
        self.subscribers.borrow_mut().clear();
    }

    /// Append a transform to the session's transform chain.
    pub fn transform_add<T>(&self, transform: T)
    where
        T: Transform + 'static,
    {
        self.transforms
            .borrow_mut()
            .push(Rc::new(RefCell::new(transform)));
    }

    /// Send a packet to whatever is listening on the datafeed bus.
    ///
    /// Drivers use this to hand a packet to the frontend. The packet runs
    /// through the transform chain in order; a transform may replace it,
    /// or consume it, in which case delivery stops silently. The survivor
    /// is delivered to every subscriber before `send` returns.
    pub fn send(&self, device: &Rc<Device>, packet: Packet) -> Result<()> {
        if device.session_id() != Some(self.id) {
            error!("device is not attached to this session");
            return Err(Error::Bug("device is not attached to this session"));
        }

        // Pass the packet to the first transform. Whatever it returns is
        // passed to the next transform in the list, and so on.
        let transforms = self.transforms.borrow().clone();
        let mut packet = packet;
        for transform in &transforms {
            trace!("running transform module");
            match transform.borrow_mut().receive(packet) {
                Ok(Some(out)) => packet = out,
                Ok(None) => {
                    trace!("transform module did not return a packet, aborting");
                    return Ok(());
                }
                Err(err) => {
                    error!("error while running transform module: {}", err);
                    return Err(err);
                }
            }
        }

        if log_enabled!(Level::Debug) {
            datafeed::dump(&packet);
        }
        let subscribers = self.subscribers.borrow().clone();
        for subscriber in &subscribers {
            (&mut *subscriber.borrow_mut())(device, &packet);
        }

        Ok(())
    }

    /* ===== Event sources ===== */

    /// Add an event source for a file descriptor.
    ///
    /// A negative `fd` registers a pure timer source that polls no
    /// descriptor at all; it then must carry a timeout, and the negative
    /// value is its key. With a timeout of `None` the callback is invoked
    /// on I/O readiness only; otherwise it is also invoked whenever
    /// `timeout` elapses without readiness.
    pub fn source_add_fd<F>(
        &self,
        fd: RawFd,
        interest: Interest,
        timeout: Option<Duration>,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&Session, RawFd, Readiness) -> bool + 'static,
    {
        let descriptors = if fd < 0 {
            Vec::new()
        } else {
            vec![PollFd::new(fd, interest)]
        };
        self.source_add(SourceKey::Fd(fd), &descriptors, timeout, None, callback)
    }

    /// Add an event source for a caller-owned poll descriptor.
    ///
    /// The descriptor's contents are copied into the session; its address
    /// is the source key, so the same `PollFd` must be passed to
    /// [`Session::source_remove_pollfd`].
    pub fn source_add_pollfd<F>(
        &self,
        pollfd: &PollFd,
        timeout: Option<Duration>,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&Session, RawFd, Readiness) -> bool + 'static,
    {
        let key = SourceKey::Ptr(pollfd as *const PollFd as usize);
        self.source_add(key, std::slice::from_ref(pollfd), timeout, None, callback)
    }

    /// Add an event source for an I/O channel.
    ///
    /// The channel's address is the source key; the channel object must
    /// outlive the registration and be passed unmoved to
    /// [`Session::source_remove_io`].
    pub fn source_add_io<T, F>(
        &self,
        channel: &T,
        interest: Interest,
        timeout: Option<Duration>,
        callback: F,
    ) -> Result<()>
    where
        T: AsRawFd,
        F: FnMut(&Session, RawFd, Readiness) -> bool + 'static,
    {
        let key = SourceKey::Ptr(channel as *const T as usize);
        let descriptors = [PollFd::new(channel.as_raw_fd(), interest)];
        self.source_add(key, &descriptors, timeout, None, callback)
    }

    /// Add an event source for a foreign backend.
    ///
    /// A backend source may poll several descriptors at once; its callback
    /// receives an invalid `fd` of `-1` when more than one descriptor is
    /// registered. The provider is consulted once per loop iteration for
    /// the backend's internal deadline, and the source fires when the
    /// nearer of that deadline and its own timeout expires. The provider's
    /// identity is the source key.
    pub fn source_add_backend<F>(
        &self,
        provider: &Rc<dyn TimeoutProvider>,
        descriptors: &[PollFd],
        timeout: Option<Duration>,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&Session, RawFd, Readiness) -> bool + 'static,
    {
        let key = SourceKey::Backend(Rc::as_ptr(provider) as *const () as usize);
        self.source_add(key, descriptors, timeout, Some(Rc::clone(provider)), callback)
    }

    fn source_add<F>(
        &self,
        key: SourceKey,
        descriptors: &[PollFd],
        timeout: Option<Duration>,
        provider: Option<Rc<dyn TimeoutProvider>>,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&Session, RawFd, Readiness) -> bool + 'static,
    {
        let callback: Rc<RefCell<SourceCallback>> = Rc::new(RefCell::new(callback));
        self.sources
            .borrow_mut()
            .add(key, descriptors, timeout, provider, callback)
    }

    /// Remove the source belonging to the given file descriptor.
    pub fn source_remove_fd(&self, fd: RawFd) -> Result<()> {
        self.sources.borrow_mut().remove(SourceKey::Fd(fd))
    }

    /// Remove the source belonging to the given poll descriptor.
    pub fn source_remove_pollfd(&self, pollfd: &PollFd) -> Result<()> {
        let key = SourceKey::Ptr(pollfd as *const PollFd as usize);
        self.sources.borrow_mut().remove(key)
    }

    /// Remove the source belonging to the given I/O channel.
    pub fn source_remove_io<T: AsRawFd>(&self, channel: &T) -> Result<()> {
        let key = SourceKey::Ptr(channel as *const T as usize);
        self.sources.borrow_mut().remove(key)
    }

    /// Remove the source belonging to the given backend provider.
    pub fn source_remove_backend(&self, provider: &Rc<dyn TimeoutProvider>) -> Result<()> {
        let key = SourceKey::Backend(Rc::as_ptr(provider) as *const () as usize);
        self.sources.borrow_mut().remove(key)
    }

    /* ===== Acquisition control ===== */

    /// Start acquisition on every device in the session.
    ///
    /// Requires at least one device. The trigger, if set, is validated
    /// first; then, for each device in roster order, at least one enabled
    /// channel is verified, configuration is committed and the driver's
    /// `acquisition_start` is invoked. The first failure halts the
    /// sequence and is returned; devices already started are not stopped.
    pub fn start(&self) -> Result<()> {
        let devs = self.devs.borrow().clone();
        if devs.is_empty() {
            error!("a session cannot be started without devices");
            return Err(Error::BadArg("session has no devices"));
        }

        if let Some(trigger) = self.trigger.borrow().as_ref() {
            trigger.validate()?;
        }

        info!("starting");

        for device in &devs {
            if !device.channels().iter().any(|channel| channel.enabled()) {
                error!(
                    "{} using connection {} has no enabled channels",
                    device.model(),
                    device.connection_id()
                );
                return Err(Error::BadArg("device has no enabled channels"));
            }

            if let Some(driver) = device.driver() {
                if let Err(err) = driver.config_commit(device) {
                    error!(
                        "failed to commit device settings before starting acquisition ({})",
                        err
                    );
                    return Err(err);
                }
                if let Err(err) = driver.acquisition_start(device, self) {
                    error!("could not start an acquisition ({})", err);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Run the session's event loop.
    ///
    /// Poll event sources and dispatch their callbacks until none are
    /// left. An empty registry returns immediately. Any thread may request
    /// a stop through [`Session::stopper`]; the loop then stops every
    /// device's acquisition and drains naturally once drivers have removed
    /// their sources.
    pub fn run(&self) -> Result<()> {
        self.stop_state.lock().unwrap().running = true;

        info!("running");

        // Poll event sources until none are left.
        while !self.sources.borrow().is_empty() {
            self.iteration()?;
        }
        Ok(())
    }

    /// Poll the session's event sources once and dispatch what is ready.
    fn iteration(&self) -> Result<()> {
        if self.sources.borrow().is_empty() {
            self.check_stopped();
            return Ok(());
        }

        let start_time = Instant::now();
        let mut provider_dues: Vec<(SourceKey, Instant)> = Vec::new();

        let ret = {
            let mut sources = self.sources.borrow_mut();
            sources.clear_triggered();
            let mut min_due = sources.min_due();

            // Merge in the deadline hints of backend sources.
            for source in &sources.entries {
                if let Some(provider) = &source.provider {
                    if let Some(hint) = provider.next_timeout() {
                        let due = start_time + hint;
                        trace!("poll: next backend timeout {:?}", hint);
                        min_due = Some(match min_due {
                            Some(min) => min.min(due),
                            None => due,
                        });
                        provider_dues.push((source.key, due));
                    }
                }
            }

            trace!(
                "poll enter: {} sources, {} fds, due {:?}",
                sources.len(),
                sources.poll_fds.len(),
                min_due.map(|due| due.saturating_duration_since(start_time))
            );

            match sys::poll(&mut sources.poll_fds, min_due) {
                Ok(num_events) => num_events as i64,
                // An interrupted poll reported no events; the next
                // iteration picks up where this one left off.
                Err(err) if err.raw_os_error() == Some(libc::EINTR) => 0,
                Err(err) => {
                    error!("error in poll: {}", err);
                    return Err(Error::Sys(err));
                }
            }
        };

        let stop_time = Instant::now();
        trace!(
            "poll leave: {:?} elapsed, {} events",
            stop_time - start_time,
            ret
        );

        let mut triggered = false;
        let mut stopped = false;

        loop {
            // Scan for the next source to fire. The scan restarts from the
            // beginning after every callback, since the callback may have
            // added or removed sources; the `triggered` flags bound each
            // source to one dispatch per iteration.
            let fired = {
                let mut sources = self.sources.borrow_mut();
                let mut fd_index = 0;
                let mut fired = None;

                for i in 0..sources.entries.len() {
                    let num_fds = sources.entries[i].num_fds;
                    let mut fd = match sources.entries[i].key {
                        SourceKey::Fd(fd) => fd,
                        _ => -1,
                    };
                    let mut revents = Readiness::EMPTY;
                    for k in 0..num_fds {
                        let pollfd = &sources.poll_fds[fd_index + k];
                        fd = pollfd.fd();
                        revents |= pollfd.readiness();
                    }
                    fd_index += num_fds;

                    let source = &mut sources.entries[i];
                    if source.triggered {
                        continue; // already handled
                    }
                    if ret > 0 && revents.is_empty() {
                        continue; // skip timeouts if any I/O event occurred
                    }

                    // Make invalid to avoid confusion in case of multiple FDs.
                    if num_fds > 1 {
                        fd = -1;
                    }
                    if ret <= 0 {
                        revents = Readiness::EMPTY;
                    }

                    let mut due = source.due;
                    if let Some(&(_, provider_due)) = provider_dues
                        .iter()
                        .find(|(key, _)| *key == source.key)
                    {
                        due = Some(match due {
                            Some(due) => due.min(provider_due),
                            None => provider_due,
                        });
                    }
                    if revents.is_empty() && due.map_or(true, |due| stop_time < due) {
                        continue; // not yet due
                    }

                    // The source may be gone once the callback returns, so
                    // reschedule it before the call.
                    if let Some(interval) = source.interval {
                        source.due = Some(stop_time + interval);
                    }
                    source.triggered = true;
                    fired = Some((source.key, Rc::clone(&source.callback), fd, revents));
                    break;
                }

                fired
            };

            let (key, callback, fd, revents) = match fired {
                Some(fired) => fired,
                None => break,
            };

            triggered = true;
            trace!("callback for event source {} with {:?}", key, revents);
            if !(&mut *callback.borrow_mut())(self, fd, revents) {
                let _ = self.sources.borrow_mut().remove(key);
            }

            // Take as little time as possible to stop when told to:
            // consult the flag after every source, not just once per
            // iteration.
            if !stopped {
                stopped = self.check_stopped();
            }
        }

        // Check for a stop request at least once per iteration.
        if !triggered {
            self.check_stopped();
        }

        Ok(())
    }

    /// Consume a pending stop request, running the stop sequence if one
    /// was made.
    fn check_stopped(&self) -> bool {
        let mut state = self.stop_state.lock().unwrap();
        let stop = state.stop_requested;
        if stop {
            self.stop_sync(&mut state);
            // But once is enough.
            state.stop_requested = false;
        }
        stop
    }

    /// Stop every device's acquisition and leave the running state.
    ///
    /// Always called on the loop thread, with the stop mutex held.
    fn stop_sync(&self, state: &mut StopState) {
        info!("stopping");

        let devs = self.devs.borrow().clone();
        for device in &devs {
            if let Some(driver) = device.driver() {
                if let Err(err) = driver.acquisition_stop(device, self) {
                    error!("{}: could not stop acquisition ({})", driver.name(), err);
                }
            }
        }
        state.running = false;
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dev_remove_all();
    }
}
