use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::session::SessionId;
use crate::{Result, Session};

/// The kind of data a channel produces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// Digital channel with binary samples.
    Logic,
    /// Analog channel with floating-point samples.
    Analog,
}

/// One acquisition channel of a device.
#[derive(Debug)]
pub struct Channel {
    index: u32,
    kind: ChannelKind,
    name: String,
    enabled: Cell<bool>,
}

impl Channel {
    /// Create a channel; channels start out enabled.
    pub fn new(index: u32, kind: ChannelKind, name: &str) -> Rc<Channel> {
        Rc::new(Channel {
            index,
            kind,
            name: name.to_owned(),
            enabled: Cell::new(true),
        })
    }

    /// The channel's index within its device.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The kind of data the channel produces.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// The channel's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the channel takes part in acquisition.
    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Enable or disable the channel.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

/// Capabilities a hardware driver exposes to the session.
///
/// `open` and `acquisition_start` are required of every driver;
/// `config_commit` and `acquisition_stop` default to no-ops for drivers
/// that have nothing to do at those points. During acquisition the driver
/// is handed the running [`Session`] so it can register and remove event
/// sources and send datafeed packets.
pub trait Driver {
    /// Short name identifying the driver.
    fn name(&self) -> &str;

    /// Open the device for use.
    fn open(&self, device: &Rc<Device>) -> Result<()>;

    /// Write accumulated configuration out to the hardware.
    fn config_commit(&self, _device: &Rc<Device>) -> Result<()> {
        Ok(())
    }

    /// Begin acquisition, registering the driver's event sources.
    fn acquisition_start(&self, device: &Rc<Device>, session: &Session) -> Result<()>;

    /// Halt acquisition and release the driver's event sources.
    fn acquisition_stop(&self, _device: &Rc<Device>, _session: &Session) -> Result<()> {
        Ok(())
    }
}

/// A device instance that can be attached to a session.
///
/// A device without a driver is "virtual": it is enrolled in the roster but
/// the session never drives acquisition for it. A device belongs to at most
/// one session at a time; the back-reference is non-owning.
pub struct Device {
    driver: Option<Rc<dyn Driver>>,
    model: String,
    connection_id: String,
    channels: Vec<Rc<Channel>>,
    session: Cell<Option<SessionId>>,
}

impl Device {
    /// Create a device instance.
    pub fn new(
        driver: Option<Rc<dyn Driver>>,
        model: &str,
        connection_id: &str,
        channels: Vec<Rc<Channel>>,
    ) -> Rc<Device> {
        Rc::new(Device {
            driver,
            model: model.to_owned(),
            connection_id: connection_id.to_owned(),
            channels,
            session: Cell::new(None),
        })
    }

    /// The driver bound to this device, or `None` for a virtual device.
    pub fn driver(&self) -> Option<&Rc<dyn Driver>> {
        self.driver.as_ref()
    }

    /// The device's model string.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Identification of the connection the device was found on.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// The device's channels.
    pub fn channels(&self) -> &[Rc<Channel>] {
        &self.channels
    }

    /// The session the device is currently attached to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.get()
    }

    pub(crate) fn bind(&self, session: SessionId) {
        self.session.set(Some(session));
    }

    pub(crate) fn unbind(&self) {
        self.session.set(None);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.driver.as_ref().map(|d| d.name().to_owned()))
            .field("model", &self.model)
            .field("connection_id", &self.connection_id)
            .field("channels", &self.channels.len())
            .field("session", &self.session.get())
            .finish()
    }
}
