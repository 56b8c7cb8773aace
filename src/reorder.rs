//! Optional out-of-order datagram staging ahead of the merger.
//!
//! A transport like plain UDP can deliver packets out of wire-sequence
//! order; this buffer holds them keyed by their own sequence number and
//! releases a contiguous run starting at the next expected sequence once
//! it's available, so the merger always sees strictly increasing input.
//!
//! The drop policy under memory pressure is tail-drop by a configured byte
//! ceiling: a push that would exceed it
//! evicts the **oldest** (lowest-sequence) pending entries first.

use std::collections::BTreeMap;

use log::warn;

use crate::packet::{Pktd, SMALL_HEADER_LEN};

struct Entry {
    pkt: Pktd,
    size: usize,
}

/// Reorders packets by sequence number, bounded by a total byte ceiling.
pub struct ReorderBuffer {
    capacity_bytes: usize,
    used_bytes: usize,
    next_expected: u64,
    pending: BTreeMap<u64, Entry>,
}

impl ReorderBuffer {
    /// Creates an empty buffer bounded by `capacity_bytes`.
    pub fn new(capacity_bytes: usize) -> Self {
        ReorderBuffer {
            capacity_bytes,
            used_bytes: 0,
            next_expected: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Sets the sequence number the next [`drain_ready`] call should start
    /// releasing from, e.g. after the connection learns the first sequence
    /// of a freshly established session.
    pub fn set_next_expected(&mut self, seq: u64) {
        self.next_expected = seq;
    }

    fn entry_size(pkt: &Pktd) -> usize {
        SMALL_HEADER_LEN + pkt.payload.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Stages `pkt`, received at wire sequence `seq`. Evicts the oldest
    /// pending entries first if the buffer would otherwise exceed its byte
    /// ceiling.
    pub fn push(&mut self, seq: u64, pkt: Pktd) {
        let size = Self::entry_size(&pkt);

        while self.used_bytes + size > self.capacity_bytes {
            let Some((&oldest_seq, _)) = self.pending.iter().next() else {
                break;
            };
            let evicted = self.pending.remove(&oldest_seq).expect("key just observed");
            self.used_bytes -= evicted.size;
            warn!(
                "reorder buffer: evicting oldest pending sequence {oldest_seq} to stay under the {}-byte ceiling",
                self.capacity_bytes
            );
        }

        self.used_bytes += size;
        self.pending.insert(seq, Entry { pkt, size });
    }

    /// Returns the longest contiguous run of packets starting at the next
    /// expected sequence number, in order, advancing the expectation past
    /// them.
    pub fn drain_ready(&mut self) -> Vec<Pktd> {
        let mut out = Vec::new();
        while let Some(entry) = self.pending.remove(&self.next_expected) {
            self.used_bytes -= entry.size;
            out.push(entry.pkt);
            self.next_expected += 1;
        }
        out
    }

    /// Number of packets currently staged, waiting on a gap to close.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Total bytes currently staged across all pending packets.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::packet::Packet;

    fn pkt(len: usize) -> Pktd {
        Pktd::with_payload(0, Packet::Eos, Buffer::alloc(len))
    }

    #[test]
    fn releases_contiguous_run_in_order() {
        let mut r = ReorderBuffer::new(10_000);
        r.push(2, pkt(1));
        r.push(0, pkt(1));
        assert!(r.drain_ready().is_empty(), "seq 1 is still missing");
        r.push(1, pkt(1));
        let out = r.drain_ready();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn stops_releasing_at_first_gap() {
        let mut r = ReorderBuffer::new(10_000);
        r.push(0, pkt(1));
        r.push(1, pkt(1));
        r.push(3, pkt(1));
        let out = r.drain_ready();
        assert_eq!(out.len(), 2);
        assert_eq!(r.pending_count(), 1);
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let entry_size = SMALL_HEADER_LEN + 10;
        let mut r = ReorderBuffer::new(entry_size * 2);
        r.push(5, pkt(10));
        r.push(6, pkt(10));
        assert_eq!(r.pending_count(), 2);
        r.push(7, pkt(10));
        assert_eq!(r.pending_count(), 2, "oldest entry should have been evicted");
        assert!(r.used_bytes() <= entry_size * 2);
    }
}
