//! The packet value type shared by every stage.

use typed_builder::TypedBuilder;

use crate::units::{Bytes, Clock, Seq};

/// A flow's index into the sender's/receiver's per-flow state vectors.
/// Flows are never compared by order or combined arithmetically, just
/// looked up by identity, so this carries only the derives that role
/// actually needs.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FlowId(usize);

impl FlowId {
    pub const ZERO: FlowId = Self::new(0);

    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    pub fn into_usize(self) -> usize {
        self.0
    }
}

/// A packet (or its returning ACK) as it travels around the ring.
///
/// Packets are small `Copy` values with no aliasing: each stage receives an
/// owned copy, mutates the fields relevant to its role, and passes it on.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct Packet {
    /// The flow this packet (or ACK) belongs to.
    pub flow: FlowId,
    /// Sequence number of the first byte of payload.
    #[builder(default = Seq::ZERO)]
    pub seq: Seq,
    /// Cumulative ACK number, set by the receiver.
    #[builder(default = Seq::ZERO)]
    pub ack_num: Seq,
    /// Length of the segment in bytes (header-only for a bare SYN/ACK).
    pub len: Bytes,
    /// Set on the flow's first packet.
    #[builder(default = false)]
    pub syn: bool,
    /// Set on a packet traveling receiver -> sender.
    #[builder(default = false)]
    pub ack: bool,
    /// Congestion Experienced, set by an AQM on a data segment.
    #[builder(default = false)]
    pub ce: bool,
    /// CE-Echo, set by the receiver when echoing a CE mark back to the sender.
    #[builder(default = false)]
    pub ece: bool,
    /// Some Congestion Experienced, set by an AQM on a data segment.
    #[builder(default = false)]
    pub sce: bool,
    /// SCE-Echo, set by the receiver when echoing an SCE mark back to the sender.
    #[builder(default = false)]
    pub esce: bool,
    /// Whether the sender marked this packet ECN-capable.
    #[builder(default = false)]
    pub ecn_capable: bool,
    /// Whether the sender marked this packet SCE-capable.
    #[builder(default = false)]
    pub sce_capable: bool,
    /// Whether this ACK was a delayed ACK (RTT samples are not taken from it).
    #[builder(default = false)]
    pub delayed: bool,
    /// Time the packet was transmitted by the sender; preserved across the ACK.
    #[builder(default = Clock::ZERO)]
    pub sent: Clock,
    /// Time the packet entered an AQM queue; set on enqueue.
    #[builder(default = Clock::ZERO)]
    pub enqueue: Clock,
}

impl Packet {
    /// Turn a data packet into the ACK the receiver sends back for it,
    /// translating CE/SCE marks into their echo bits per §4.6.
    pub fn into_ack(mut self, ack_num: Seq) -> Packet {
        self.ack = true;
        self.ack_num = ack_num;
        self.ece = self.ce;
        self.esce = self.sce;
        self.ce = false;
        self.sce = false;
        self
    }
}
