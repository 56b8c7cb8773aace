//! Bandwidth-aware multi-stream packet scheduler.
//!
//! Grounded on `libavtransport/scheduler.c`. Each registered stream gets its
//! own output [`PacketFifo`]; `push` splits payloads too large for the
//! transport MTU into `generic-segment` fragments (`scheduler_push_internal`
//! in the original), and `pop_ready` interleaves streams round-robin with a
//! quantum equal to the smallest packet size currently queued anywhere,
//! mirroring `avt_scheduler_pop`'s fairness rule. The round-robin body in
//! the original source is mostly sketched out under `#if 0`; the concrete
//! interleaving logic below is this crate's own, built to the contract
//! this crate's own design rather than transliterated from incomplete C.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bitrate::SlidingWindow;
use crate::buffer::Buffer;
use crate::error::Result;
use crate::fifo::PacketFifo;
use crate::packet::codec::encode_header;
use crate::packet::{GenericSegment, Packet, Pktd, SMALL_HEADER_LEN, SMALL_MESSAGE_LEN};

/// The scheduler's output rate limit.
///
/// `Unlimited` is a supported production mode, not a test-only escape
/// hatch: `libavtransport/scheduler.c` branches on it with ordinary control
/// flow, no debug gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    /// No rate limit; every call to [`Scheduler::pop_ready`] drains
    /// everything currently queued.
    Unlimited,
    /// Bits per second.
    Limited(u64),
}

struct StreamState {
    fifo: PacketFifo,
    bitrate: SlidingWindow,
}

impl StreamState {
    fn new() -> Self {
        StreamState {
            fifo: PacketFifo::new(),
            bitrate: SlidingWindow::new(Duration::from_secs(1)),
        }
    }
}

/// Interleaves per-stream packet queues into one output sequence, splitting
/// oversized payloads into MTU-sized segments along the way.
pub struct Scheduler {
    bandwidth: Bandwidth,
    sequence: Arc<AtomicU64>,
    mtu: u32,
    streams: HashMap<u16, StreamState>,
    order: VecDeque<u16>,
}

impl Scheduler {
    /// Creates a scheduler with its own fresh sequence counter starting at 0.
    pub fn new(mtu: u32, bandwidth: Bandwidth) -> Self {
        Scheduler::with_sequence_counter(mtu, bandwidth, Arc::new(AtomicU64::new(0)))
    }

    /// Shares a sequence counter with another component (e.g. a connection
    /// assigning sequence numbers to control packets out of band).
    pub fn with_sequence_counter(mtu: u32, bandwidth: Bandwidth, sequence: Arc<AtomicU64>) -> Self {
        Scheduler {
            bandwidth,
            sequence,
            mtu,
            streams: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// The MTU this scheduler was configured with.
    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    /// Registers `stream_id` with the round-robin rotation if it isn't
    /// already known; a no-op otherwise.
    pub fn register_stream(&mut self, stream_id: u16) {
        if !self.streams.contains_key(&stream_id) {
            self.streams.insert(stream_id, StreamState::new());
            self.order.push_back(stream_id);
        }
    }

    /// Drops a stream's queue and removes it from the round-robin rotation.
    pub fn remove_stream(&mut self, stream_id: u16) {
        self.streams.remove(&stream_id);
        self.order.retain(|&id| id != stream_id);
    }

    /// Achieved bitrate over the last second for `stream_id`, if it has any
    /// history.
    pub fn stream_bitrate_bps(&self, stream_id: u16) -> Option<f64> {
        self.streams.get(&stream_id)?.bitrate.bitrate_bps()
    }

    fn unsegmented_payload_cap(&self) -> usize {
        (self.mtu as usize).saturating_sub(SMALL_HEADER_LEN)
    }

    /// Queues `packet` (with optional `payload`) for `stream_id`, splitting
    /// it into `generic-segment` fragments if its payload doesn't fit in a
    /// single MTU-sized datagram.
    pub fn push(&mut self, stream_id: u16, packet: Packet, payload: Option<Buffer>) -> Result<()> {
        self.register_stream(stream_id);
        let payload = payload.unwrap_or_else(|| Buffer::alloc(0));
        let cap = self.unsegmented_payload_cap();

        if !packet.descriptor().is_segmentable() || payload.len() <= cap {
            let seq = self.next_seq();
            let state = self.streams.get_mut(&stream_id).expect("just registered");
            state.fifo.push(Pktd::with_payload(seq, packet, payload));
            return Ok(());
        }

        self.push_segmented(stream_id, packet, payload, cap)
    }

    /// The first emitted packet carries the full original
    /// descriptor with its segmented flag set (or, for the shared
    /// `PayloadHeader` variants, `payload_length` set to the prefix size)
    /// and a payload prefix of size `cap`; every later packet is a
    /// `generic-segment` of the same `target_seq`, scattering 4 bytes of
    /// the original header across each one's `header_7` slot so the
    /// receiver can reconstruct it even if the first packet is lost.
    fn push_segmented(&mut self, stream_id: u16, packet: Packet, payload: Buffer, cap: usize) -> Result<()> {
        let target_seq = self.next_seq();
        let total = payload.len() as u32;
        let first_len = (cap as u32).min(total);

        let header_bytes = encode_header(&packet, target_seq)?;
        let message: [u8; SMALL_MESSAGE_LEN] = header_bytes[..SMALL_MESSAGE_LEN].try_into().unwrap();

        let head_packet = mark_segment_start(packet, first_len);
        let head_chunk = payload.slice(0, first_len as usize)?;
        {
            let state = self.streams.get_mut(&stream_id).expect("just registered");
            state.fifo.push(Pktd::with_payload(target_seq, head_packet, head_chunk));
        }

        let mut offset = first_len;
        while offset < total {
            let seg_len = cap.min((total - offset) as usize) as u32;
            let own_seq = self.next_seq();
            let slot = (own_seq % 7) as usize;
            let fragment: [u8; 4] = message[slot * 4..slot * 4 + 4].try_into().unwrap();
            let is_final = offset + seg_len >= total;

            let seg = GenericSegment {
                target_seq: target_seq as u32,
                stream_id,
                seg_offset: offset,
                seg_length: seg_len,
                pkt_total_data: total,
                header_7: fragment,
                is_final,
            };
            let chunk = payload.slice(offset as usize, seg_len as usize)?;
            let state = self.streams.get_mut(&stream_id).expect("just registered");
            state.fifo.push(Pktd::with_payload(own_seq, Packet::GenericSegment(seg), chunk));
            offset += seg_len;
        }
        Ok(())
    }

    /// The round-robin quantum: the smallest wire size currently queued at
    /// the head of any non-empty stream, or the MTU if nothing is queued.
    fn round_robin_quantum(&self) -> usize {
        self.streams
            .values()
            .filter_map(|s| s.fifo.peek())
            .map(wire_size)
            .min()
            .unwrap_or(self.mtu as usize)
    }

    /// Pops packets round-robin across streams, bounded by the bandwidth
    /// budget accrued over `elapsed` (ignored under [`Bandwidth::Unlimited`],
    /// which always drains everything currently queued). `now` stamps the
    /// per-stream bitrate tracker.
    pub fn pop_ready(&mut self, now: Duration, elapsed: Duration) -> Vec<Pktd> {
        let budget = match self.bandwidth {
            Bandwidth::Unlimited => None,
            Bandwidth::Limited(bps) => Some((bps as f64 * elapsed.as_secs_f64() / 8.0) as u64),
        };
        let quantum = self.round_robin_quantum();
        let mut out = Vec::new();
        let mut consumed = 0u64;

        loop {
            let mut progressed = false;
            // Resets every round: a stream whose head exceeds the quantum
            // only waits for streams ahead of it *in this round*, not for
            // the rest of the call — otherwise it would starve forever
            // once any earlier round took anything at all.
            let mut round_consumed = 0u64;
            let ids: Vec<u16> = self.order.iter().copied().collect();
            for id in ids {
                if let Some(budget) = budget {
                    if consumed >= budget {
                        return out;
                    }
                }
                let Some(state) = self.streams.get_mut(&id) else { continue };
                let Some(head) = state.fifo.peek() else { continue };
                let size = wire_size(head);
                if let Some(budget) = budget {
                    if consumed > 0 && consumed + size as u64 > budget {
                        continue;
                    }
                }
                // Only take one quantum-sized (or smaller) unit per stream
                // per round, so no single stream monopolizes a round.
                if size > quantum && round_consumed > 0 {
                    continue;
                }
                let pkt = state.fifo.pop().expect("peeked Some above");
                consumed += size as u64;
                round_consumed += size as u64;
                state.bitrate.push(now, size as u64);
                out.push(pkt);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        out
    }

    /// Drains every queued packet regardless of bandwidth budget, used when
    /// tearing down a connection.
    pub fn flush(&mut self) -> Vec<Pktd> {
        let mut out = Vec::new();
        for id in self.order.clone() {
            if let Some(state) = self.streams.get_mut(&id) {
                while let Some(p) = state.fifo.pop() {
                    out.push(p);
                }
            }
        }
        out
    }
}

/// Marks `packet` as the head of a segmented series carrying only a
/// `first_len`-byte prefix of its payload.
fn mark_segment_start(packet: Packet, first_len: u32) -> Packet {
    match packet {
        Packet::StreamData(mut d) => {
            d.flags.segmented = true;
            Packet::StreamData(d)
        }
        Packet::LutIcc(mut h) => {
            h.payload_length = first_len;
            Packet::LutIcc(h)
        }
        Packet::FontData(mut h) => {
            h.payload_length = first_len;
            Packet::FontData(h)
        }
        Packet::UserData(mut h) => {
            h.payload_length = first_len;
            Packet::UserData(h)
        }
        Packet::Metadata(mut h) => {
            h.payload_length = first_len;
            Packet::Metadata(h)
        }
        Packet::StreamConfig(mut h) => {
            h.payload_length = first_len;
            Packet::StreamConfig(h)
        }
        other => other,
    }
}

fn wire_size(p: &Pktd) -> usize {
    let header_len = match &p.packet {
        Packet::VideoInfo(_) => crate::packet::LARGE_HEADER_LEN,
        _ => SMALL_HEADER_LEN.max(1),
    };
    header_len + p.payload.as_ref().map(|b| b.len()).unwrap_or(0)
}
