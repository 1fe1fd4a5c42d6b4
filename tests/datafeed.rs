use std::cell::RefCell;
use std::rc::Rc;
use std::time::SystemTime;

use sigflow::datafeed::{ConfigKey, Header, Meta, MetaEntry, MetaValue, Packet};
use sigflow::{Device, Error, Session, Transform};

mod util;

use util::init;

fn tag(packet: &Packet) -> &'static str {
    match packet {
        Packet::Header(_) => "header",
        Packet::End => "end",
        Packet::Trigger => "trigger",
        Packet::Meta(_) => "meta",
        Packet::FrameBegin => "frame-begin",
        Packet::FrameEnd => "frame-end",
        Packet::Logic(_) => "logic",
        Packet::Analog(_) => "analog",
        Packet::Analog2(_) => "analog2",
    }
}

fn header() -> Packet {
    Packet::Header(Header {
        feed_version: 1,
        start_time: SystemTime::now(),
    })
}

fn meta() -> Packet {
    Packet::Meta(Meta {
        entries: vec![MetaEntry {
            key: ConfigKey(1),
            value: Rc::new(MetaValue::UInt(1_000_000)),
        }],
    })
}

fn virtual_device(session: &Session) -> Rc<Device> {
    let device = Device::new(None, "demo", "virtual/0", Vec::new());
    session.dev_add(&device).unwrap();
    device
}

/// Transform consuming meta packets and passing everything else through.
struct DropMeta;

impl Transform for DropMeta {
    fn receive(&mut self, packet: Packet) -> sigflow::Result<Option<Packet>> {
        match packet {
            Packet::Meta(_) => Ok(None),
            other => Ok(Some(other)),
        }
    }
}

/// Transform failing on meta packets.
struct RejectMeta;

impl Transform for RejectMeta {
    fn receive(&mut self, packet: Packet) -> sigflow::Result<Option<Packet>> {
        match packet {
            Packet::Meta(_) => Err(Error::Transform(-1)),
            other => Ok(Some(other)),
        }
    }
}

/// Transform replacing every packet with a trigger marker.
struct MarkEverything;

impl Transform for MarkEverything {
    fn receive(&mut self, _packet: Packet) -> sigflow::Result<Option<Packet>> {
        Ok(Some(Packet::Trigger))
    }
}

#[test]
fn packets_reach_subscribers_in_registration_order() {
    init();

    let session = Session::new();
    let device = virtual_device(&session);
    let deliveries = Rc::new(RefCell::new(Vec::new()));

    for id in ["first", "second"] {
        let log = Rc::clone(&deliveries);
        session.subscriber_add(move |_device, packet| {
            log.borrow_mut().push((id, tag(packet)));
        });
    }

    session.send(&device, header()).unwrap();
    session.send(&device, Packet::End).unwrap();

    // Each packet is delivered to every subscriber before the next send.
    assert_eq!(
        *deliveries.borrow(),
        [
            ("first", "header"),
            ("second", "header"),
            ("first", "end"),
            ("second", "end"),
        ]
    );
}

#[test]
fn transform_drops_meta_packets() {
    init();

    let session = Session::new();
    let device = virtual_device(&session);
    session.transform_add(DropMeta);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    session.subscriber_add(move |_device, packet| {
        log.borrow_mut().push(tag(packet));
    });

    session.send(&device, meta()).unwrap();
    session.send(&device, header()).unwrap();

    assert_eq!(*seen.borrow(), ["header"]);
}

#[test]
fn transform_error_aborts_only_the_send() {
    init();

    let session = Session::new();
    let device = virtual_device(&session);
    session.transform_add(RejectMeta);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    session.subscriber_add(move |_device, packet| {
        log.borrow_mut().push(tag(packet));
    });

    assert!(matches!(
        session.send(&device, meta()),
        Err(Error::Transform(-1))
    ));
    assert!(seen.borrow().is_empty());

    // The session keeps working after a failed send.
    session.send(&device, header()).unwrap();
    assert_eq!(*seen.borrow(), ["header"]);
}

#[test]
fn transform_chain_runs_in_order() {
    init();

    let session = Session::new();
    let device = virtual_device(&session);

    // The first transform rewrites everything; the second would have
    // dropped the meta packet had it still been one.
    session.transform_add(MarkEverything);
    session.transform_add(DropMeta);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    session.subscriber_add(move |_device, packet| {
        log.borrow_mut().push(tag(packet));
    });

    session.send(&device, meta()).unwrap();

    assert_eq!(*seen.borrow(), ["trigger"]);
}

#[test]
fn send_requires_an_attached_device() {
    init();

    let session = Session::new();
    let stray = Device::new(None, "stray", "virtual/1", Vec::new());

    assert!(matches!(
        session.send(&stray, Packet::End),
        Err(Error::Bug(_))
    ));
}

#[test]
fn subscriber_remove_all_silences_the_bus() {
    init();

    let session = Session::new();
    let device = virtual_device(&session);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    session.subscriber_add(move |_device, packet| {
        log.borrow_mut().push(tag(packet));
    });

    session.send(&device, header()).unwrap();
    session.subscriber_remove_all();
    session.send(&device, Packet::End).unwrap();

    assert_eq!(*seen.borrow(), ["header"]);
}

#[test]
fn meta_values_survive_the_chain_by_reference() {
    init();

    let session = Session::new();
    let device = virtual_device(&session);

    let value = Rc::new(MetaValue::Bool(true));
    let observed = Rc::new(RefCell::new(None));

    let slot = Rc::clone(&observed);
    session.subscriber_add(move |_device, packet| {
        if let Packet::Meta(meta) = packet {
            *slot.borrow_mut() = Some(Rc::clone(&meta.entries[0].value));
        }
    });

    let packet = Packet::Meta(Meta {
        entries: vec![MetaEntry {
            key: ConfigKey(7),
            value: Rc::clone(&value),
        }],
    });
    session.send(&device, packet).unwrap();

    let observed = observed.borrow_mut().take().unwrap();
    assert!(Rc::ptr_eq(&observed, &value));
    assert_eq!(Rc::strong_count(&value), 2);
}
