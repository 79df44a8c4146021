//! The FIFO packet store shared by every AQM variant.

use std::collections::VecDeque;

use delegate::delegate;

use crate::packet::Packet;
use crate::units::{Bytes, Clock};

/// A plain FIFO packet store with running byte-size accounting.
///
/// Grounded directly in the teacher's `queue.rs::FifoQ` / `port.rs::Queue`:
/// a `VecDeque<Packet>` plus a running `qsize`, with thin `delegate!`
/// forwarding for the parts that need no extra bookkeeping.
#[derive(Debug, Default, derive_new::new)]
pub(crate) struct FifoStore {
    #[new(default)]
    inner: VecDeque<Packet>,
    #[new(default)]
    qsize: Bytes,
}

impl FifoStore {
    pub(crate) fn enqueue(&mut self, mut pkt: Packet, now: Clock) -> Bytes {
        pkt.enqueue = now;
        self.qsize += pkt.len;
        self.inner.push_back(pkt);
        self.qsize
    }

    pub(crate) fn dequeue(&mut self) -> Option<Packet> {
        let pkt = self.inner.pop_front()?;
        self.qsize -= pkt.len;
        Some(pkt)
    }

    pub(crate) fn qsize(&self) -> Bytes {
        self.qsize
    }

    delegate! {
        to self.inner {
            #[call(front)]
            pub(crate) fn peek(&self) -> Option<&Packet>;
            pub(crate) fn len(&self) -> usize;
            pub(crate) fn is_empty(&self) -> bool;
        }
    }
}
