//! Datafeed packets flowing from drivers to subscribers.
//!
//! Packets are tagged variants with value-type payloads. Cloning a packet
//! produces an independent deep copy: sample and logic buffers are
//! duplicated, channel references and meta values are shared by reference
//! count. Releasing a packet is ordinary `Drop`.

use std::fmt;
use std::ops;
use std::rc::Rc;
use std::time::SystemTime;

use log::debug;

use crate::Channel;

/// What a measured value describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Quantity {
    Voltage,
    Current,
    Power,
    Frequency,
    DutyCycle,
    Resistance,
    Capacitance,
    Temperature,
    Time,
    Gain,
}

/// The unit a measured value is expressed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Unit {
    Volt,
    Ampere,
    Watt,
    Hertz,
    Ohm,
    Farad,
    Celsius,
    Second,
    Percentage,
    Unitless,
}

/// Modifier flags attached to a measured quantity.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct QuantityFlags(u32);

impl QuantityFlags {
    /// No modifiers.
    pub const NONE: QuantityFlags = QuantityFlags(0);
    /// Alternating current.
    pub const AC: QuantityFlags = QuantityFlags(0b0_0001);
    /// Direct current.
    pub const DC: QuantityFlags = QuantityFlags(0b0_0010);
    /// Root-mean-square measurement.
    pub const RMS: QuantityFlags = QuantityFlags(0b0_0100);
    /// Value is relative to a reference.
    pub const RELATIVE: QuantityFlags = QuantityFlags(0b0_1000);
    /// Reading is held at the displayed value.
    pub const HOLD: QuantityFlags = QuantityFlags(0b1_0000);

    /// Returns true if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every flag in `other` is set in `self`.
    pub const fn contains(self, other: QuantityFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl ops::BitOr for QuantityFlags {
    type Output = QuantityFlags;

    fn bitor(self, other: QuantityFlags) -> QuantityFlags {
        QuantityFlags(self.0 | other.0)
    }
}

impl fmt::Debug for QuantityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuantityFlags({:#b})", self.0)
    }
}

/// Header sent once at the start of an acquisition.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Header {
    /// Version of the datafeed format.
    pub feed_version: i32,
    /// Wall-clock time the acquisition started.
    pub start_time: SystemTime,
}

/// Key identifying a configuration item in a meta packet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConfigKey(pub u32);

/// A configuration value carried by a meta packet.
///
/// Values are reference counted; copying a meta packet shares them.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

/// One key/value pair in a meta packet.
#[derive(Clone, Debug)]
pub struct MetaEntry {
    pub key: ConfigKey,
    pub value: Rc<MetaValue>,
}

/// Configuration changes announced mid-acquisition.
#[derive(Clone, Debug, Default)]
pub struct Meta {
    pub entries: Vec<MetaEntry>,
}

/// A chunk of logic samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Logic {
    /// Number of sample words in `data`.
    pub length: u64,
    /// Bytes per sample word.
    pub unit_size: u16,
    /// `length * unit_size` bytes of sample data.
    pub data: Vec<u8>,
}

impl Logic {
    /// Wrap a sample buffer; `data` must hold `length * unit_size` bytes.
    pub fn new(length: u64, unit_size: u16, data: Vec<u8>) -> Logic {
        debug_assert_eq!(data.len() as u64, length * u64::from(unit_size));
        Logic {
            length,
            unit_size,
            data,
        }
    }
}

/// A chunk of analog samples.
#[derive(Clone, Debug)]
pub struct Analog {
    /// Channels the samples belong to; shared, not copied, on clone.
    pub channels: Vec<Rc<Channel>>,
    /// Number of samples per channel in `data`.
    pub num_samples: usize,
    /// The measured quantity.
    pub mq: Quantity,
    /// The unit the samples are expressed in.
    pub unit: Unit,
    /// Modifier flags for the quantity.
    pub mq_flags: QuantityFlags,
    /// The sample values.
    pub data: Vec<f32>,
}

/// How the meaning of analog samples is described in the extended layout.
#[derive(Clone, Debug)]
pub struct Meaning {
    pub mq: Quantity,
    pub unit: Unit,
    pub mq_flags: QuantityFlags,
    pub channels: Vec<Rc<Channel>>,
}

/// How analog samples are encoded in the extended layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Encoding {
    pub unit_size: u16,
    pub is_float: bool,
    pub is_signed: bool,
    pub is_bigendian: bool,
    /// Number of significant digits after the decimal point.
    pub digits: i8,
}

/// Analog samples in the extended layout with separate meaning and
/// encoding descriptions.
#[derive(Clone, Debug)]
pub struct Analog2 {
    pub data: Vec<f32>,
    pub num_samples: usize,
    pub meaning: Meaning,
    pub encoding: Encoding,
}

/// A datafeed packet.
///
/// Produced by drivers, passed through the session's transform chain and
/// delivered to every subscriber. Ownership is transient: a subscriber
/// that wants to keep a packet beyond its callback must clone it.
#[derive(Clone, Debug)]
pub enum Packet {
    /// Start-of-acquisition header.
    Header(Header),
    /// End of acquisition; drivers send this last.
    End,
    /// The trigger point was reached.
    Trigger,
    /// Configuration changes.
    Meta(Meta),
    /// Beginning of a frame.
    FrameBegin,
    /// End of a frame.
    FrameEnd,
    /// Logic samples.
    Logic(Logic),
    /// Analog samples.
    Analog(Analog),
    /// Analog samples, extended layout.
    Analog2(Analog2),
}

/// Debug helper logging one line per packet on the bus.
pub(crate) fn dump(packet: &Packet) {
    match packet {
        Packet::Header(_) => debug!("bus: received header packet"),
        Packet::End => debug!("bus: received end packet"),
        Packet::Trigger => debug!("bus: received trigger packet"),
        Packet::Meta(meta) => debug!("bus: received meta packet ({} entries)", meta.entries.len()),
        Packet::FrameBegin => debug!("bus: received frame-begin packet"),
        Packet::FrameEnd => debug!("bus: received frame-end packet"),
        Packet::Logic(logic) => debug!(
            "bus: received logic packet ({} words, unit size {})",
            logic.length, logic.unit_size
        ),
        Packet::Analog(analog) => {
            debug!("bus: received analog packet ({} samples)", analog.num_samples)
        }
        Packet::Analog2(analog) => debug!(
            "bus: received extended analog packet ({} samples)",
            analog.num_samples
        ),
    }
}
