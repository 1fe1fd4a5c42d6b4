use crate::datafeed::Packet;
use crate::Result;

/// An in-chain processor rewriting or dropping datafeed packets.
///
/// Transforms installed on a session form an ordered chain. Each packet a
/// driver sends is fed to the first transform; whatever it returns becomes
/// the input of the next, and the survivor of the whole chain is delivered
/// to the subscribers.
pub trait Transform {
    /// Process one packet.
    ///
    /// Returning `Ok(Some(packet))` passes a packet on (the same one, or a
    /// replacement). Returning `Ok(None)` consumes the packet: delivery
    /// stops silently and subscribers never see it. An error aborts the
    /// whole send.
    fn receive(&mut self, packet: Packet) -> Result<Option<Packet>>;
}
