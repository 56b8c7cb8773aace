//! Segment merger: reassembles a logical packet from its generic-segment
//! wire fragments.
//!
//! Grounded on `libavtransport/merger.c`. One `Merger` tracks at most one
//! in-progress target sequence at a time (`AVTMerger`'s `target`/`active`
//! fields); `fill_ranges` is the range-consolidation pass over the payload
//! byte coverage, and `fill_phantom_header`/`hdr_mask` is the 7-slice
//! `header_7` reconstruction: each segment carries a 4-byte fragment of the
//! original packet's first 28 bytes, keyed by the *segment's own* wire
//! sequence number modulo 7 (not the constant target sequence the series
//! shares) — that way any 7 segments of a series, not necessarily
//! contiguous, cover all 7 header slots. The original header can then be
//! recovered purely from segments even if the authoritative (non-segmented)
//! header packet is lost.
//!
//! Once the header is available — whether
//! from a 7/7 mask or from an authoritative header packet — later
//! `header_7` fragments are never re-verified against it; a disagreement is
//! only logged.

use log::warn;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::packet::codec::decode_header;
use crate::packet::{GenericSegment, Packet, Pktd, SMALL_MESSAGE_LEN};

const FULL_MASK: u8 = 0x7F;

#[derive(Debug)]
struct Target {
    target_seq: u32,
    header_bytes: [u8; SMALL_MESSAGE_LEN],
    hdr_mask: u8,
    header: Option<Packet>,
    payload: Vec<u8>,
    total_len: Option<u32>,
    ranges: Vec<(u32, u32)>,
}

impl Target {
    fn new(target_seq: u32) -> Self {
        Target {
            target_seq,
            header_bytes: [0u8; SMALL_MESSAGE_LEN],
            hdr_mask: 0,
            header: None,
            payload: Vec::new(),
            total_len: None,
            ranges: Vec::new(),
        }
    }

    fn header_available(&self) -> bool {
        self.header.is_some()
    }

    fn ingest_header_7(&mut self, own_sequence: u32, fragment: [u8; 4]) {
        let slot = (own_sequence % 7) as usize;
        let bit = 1u8 << (6 - slot);

        if self.header_available() {
            if self.hdr_mask & bit == 0 {
                // Harmless: the header is already known, nothing to fill.
            } else if self.header_bytes[slot * 4..slot * 4 + 4] != fragment {
                warn!(
                    "merger: header_7 fragment at slot {slot} disagrees with already-available header for target {}",
                    self.target_seq
                );
            }
            return;
        }

        self.header_bytes[slot * 4..slot * 4 + 4].copy_from_slice(&fragment);
        self.hdr_mask |= bit;

        if self.hdr_mask == FULL_MASK {
            match decode_header(&self.header_bytes) {
                Ok((packet, _)) if packet.descriptor().is_segmentable() => {
                    self.header = Some(packet);
                }
                _ => {
                    // The reconstructed top slice doesn't decode to a
                    // segmentable type; treat it as corrupt and keep
                    // waiting for a fresh copy of that slot.
                    warn!(
                        "merger: reconstructed header_7 for target {} failed to decode, discarding top slice",
                        self.target_seq
                    );
                    self.hdr_mask &= !(1 << 6);
                }
            }
        }
    }

    fn ingest_payload(&mut self, offset: u32, data: &[u8]) {
        let end = offset as usize + data.len();
        if self.payload.len() < end {
            self.payload.resize(end, 0);
        }
        self.payload[offset as usize..end].copy_from_slice(data);
        insert_range(&mut self.ranges, offset, data.len() as u32);
    }

    fn is_complete(&self) -> bool {
        let Some(total) = self.total_len else {
            return false;
        };
        self.header_available() && self.ranges.len() == 1 && self.ranges[0] == (0, total)
    }
}

/// Merges the range list in place, combining `(offset, len)` with any
/// existing range it touches or overlaps. Mirrors `fill_ranges`.
fn insert_range(ranges: &mut Vec<(u32, u32)>, offset: u32, len: u32) {
    let mut start = offset;
    let mut end = offset + len;
    ranges.retain(|&(o, l)| {
        let (ro_start, ro_end) = (o, o + l);
        if ro_end < start || ro_start > end {
            true
        } else {
            start = start.min(ro_start);
            end = end.max(ro_end);
            false
        }
    });
    ranges.push((start, end - start));
    ranges.sort_unstable_by_key(|r| r.0);
}

/// Reassembles packets segmented across `generic-segment` wire fragments.
///
/// A `Merger` handles one target sequence at a time; pushing a segment for
/// a different target while one is in progress is an error (`Error::Busy`)
/// until [`Merger::done`] is called or the in-progress target completes.
#[derive(Debug, Default)]
pub struct Merger {
    target: Option<Target>,
}

impl Merger {
    /// Creates an idle merger with no target in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if a target is currently being assembled.
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Pushes one `generic-segment` fragment, received on the wire at
    /// `own_sequence` (the segment packet's own global sequence number,
    /// distinct from `seg.target_seq`). Returns the completed packet once
    /// every byte of the payload and the full header have arrived, or
    /// `Error::Again` if more segments are still needed.
    pub fn push(&mut self, seg: &GenericSegment, own_sequence: u32, payload: &[u8]) -> Result<Pktd> {
        if let Some(t) = &self.target {
            if t.target_seq != seg.target_seq {
                return Err(Error::Busy);
            }
        } else {
            self.target = Some(Target::new(seg.target_seq));
        }

        let target = self.target.as_mut().expect("just ensured present");
        target.total_len = Some(seg.pkt_total_data);
        target.ingest_header_7(own_sequence, seg.header_7);
        target.ingest_payload(seg.seg_offset, payload);

        if target.is_complete() {
            let target = self.target.take().expect("checked complete above");
            let header = target.header.expect("is_complete implies header_available");
            let buffer = Buffer::from_vec(target.payload);
            Ok(Pktd::with_payload(seg.target_seq as u64, header, buffer))
        } else {
            Err(Error::Again)
        }
    }

    /// Abandons any in-progress target, freeing it to accept a different
    /// one. Called explicitly by the caller after consuming a completed
    /// packet or to give up on a stalled one.
    pub fn done(&mut self) {
        self.target = None;
    }

    /// Pushes one packet as it arrived off the transport, first classifying
    /// it as: a `generic-segment` fragment, the
    /// authoritative header of a segmented series (carrying a payload
    /// prefix), or an ordinary, already-complete packet.
    ///
    /// Ordinary packets pass straight through. Segments and segment-starts
    /// are accumulated the same way [`Merger::push`] accumulates
    /// `generic-segment` fragments, keyed by the header packet's own
    /// sequence number as the target sequence.
    pub fn push_packet(&mut self, p: Pktd) -> Result<Pktd> {
        if let Packet::GenericSegment(seg) = &p.packet {
            let seg = *seg;
            let payload: Vec<u8> = p.payload.as_ref().map(|b| b.data().to_vec()).unwrap_or_default();
            return self.push(&seg, p.sequence as u32, &payload);
        }

        if !p.packet.is_segment_start() {
            return Ok(p);
        }

        let target_seq = p.sequence as u32;
        if let Some(t) = &self.target {
            if t.target_seq != target_seq {
                return Err(Error::Busy);
            }
        } else {
            self.target = Some(Target::new(target_seq));
        }

        let total = p
            .packet
            .total_payload_len()
            .expect("is_segment_start implies total_payload_len is Some");
        let target = self.target.as_mut().expect("just ensured present");
        target.total_len = Some(total);
        target.header = Some(p.packet.clone());
        target.hdr_mask = FULL_MASK;

        let payload: Vec<u8> = p.payload.as_ref().map(|b| b.data().to_vec()).unwrap_or_default();
        target.ingest_payload(0, &payload);

        if target.is_complete() {
            let target = self.target.take().expect("checked complete above");
            let header = target.header.expect("is_complete implies header_available");
            let buffer = Buffer::from_vec(target.payload);
            Ok(Pktd::with_payload(target_seq as u64, header, buffer))
        } else {
            Err(Error::Again)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Descriptor, PayloadHeader};

    fn metadata_header_bytes(seq: u32, stream_id: u16) -> [u8; SMALL_MESSAGE_LEN] {
        let pkt = Packet::Metadata(PayloadHeader {
            stream_id,
            pts: 0,
            payload_length: 8,
            total_payload_length: 8,
            compression: 0,
        });
        let hdr = crate::packet::codec::encode_header(&pkt, seq as u64).unwrap();
        assert_eq!(hdr[0..2], Descriptor::METADATA.0.to_be_bytes());
        hdr[..SMALL_MESSAGE_LEN].try_into().unwrap()
    }

    fn segment(target_seq: u32, slot_bytes: [u8; 4], offset: u32, len: u32, total: u32, is_final: bool) -> GenericSegment {
        GenericSegment {
            target_seq,
            stream_id: 1,
            seg_offset: offset,
            seg_length: len,
            pkt_total_data: total,
            header_7: slot_bytes,
            is_final,
        }
    }

    #[test]
    fn reassembles_payload_and_header_from_segments() {
        // The header describing the logical packet being reassembled is
        // identified by target_seq 77; its bytes are scattered across
        // segments keyed by each segment's own wire sequence (0..6).
        let header_bytes = metadata_header_bytes(77, 2);
        let mut merger = Merger::new();

        let payload = b"0123456789abcdef".to_vec();

        let mut result = None;
        for own_seq in 0..7u32 {
            let slot = (own_seq % 7) as usize;
            let frag: [u8; 4] = header_bytes[slot * 4..slot * 4 + 4].try_into().unwrap();
            let (offset, data): (u32, &[u8]) = if slot < 4 {
                (slot as u32 * 4, &payload[(slot * 4)..(slot * 4 + 4)])
            } else {
                (16, &payload[16..])
            };
            let seg = segment(77, frag, offset, data.len() as u32, payload.len() as u32, slot == 6);
            result = Some(merger.push(&seg, own_seq, data));
        }

        match result.unwrap() {
            Ok(pktd) => {
                assert_eq!(pktd.payload.unwrap().data(), payload.as_slice());
                assert!(matches!(pktd.packet, Packet::Metadata(_)));
            }
            Err(e) => panic!("expected completion, got {e:?}"),
        }
    }

    #[test]
    fn busy_with_different_target_until_done() {
        let header_bytes = metadata_header_bytes(1, 1);
        let mut merger = Merger::new();
        let frag: [u8; 4] = header_bytes[0..4].try_into().unwrap();
        let seg_a = segment(1, frag, 0, 4, 20, false);
        assert!(matches!(merger.push(&seg_a, 0, &[0, 0, 0, 0]), Err(Error::Again)));

        let seg_b = segment(2, frag, 0, 4, 20, false);
        assert!(matches!(merger.push(&seg_b, 0, &[0, 0, 0, 0]), Err(Error::Busy)));

        merger.done();
        assert!(matches!(merger.push(&seg_b, 0, &[0, 0, 0, 0]), Err(Error::Again)));
    }

    #[test]
    fn overlapping_ranges_consolidate() {
        let mut ranges = Vec::new();
        insert_range(&mut ranges, 0, 4);
        insert_range(&mut ranges, 8, 4);
        assert_eq!(ranges, vec![(0, 4), (8, 4)]);
        insert_range(&mut ranges, 4, 4);
        assert_eq!(ranges, vec![(0, 12)]);
    }

    #[test]
    fn start_packet_plus_one_segment_reassembles() {
        // Start packet (64-byte payload, total=128) + one segment
        // covering the remaining 64 bytes.
        let prefix = vec![0xAAu8; 64];
        let suffix = vec![0xBBu8; 64];

        let start_header = Packet::Metadata(PayloadHeader {
            stream_id: 5,
            pts: 0,
            payload_length: 64,
            total_payload_length: 128,
            compression: 0,
        });
        let start = Pktd::with_payload(42, start_header, Buffer::from_vec(prefix.clone()));

        let mut merger = Merger::new();
        assert!(matches!(merger.push_packet(start), Err(Error::Again)));

        let seg = segment(42, [0, 0, 0, 0], 64, 64, 128, true);
        let seg_pktd = Pktd::with_payload(43, Packet::GenericSegment(seg), Buffer::from_vec(suffix.clone()));

        let assembled = merger.push_packet(seg_pktd).unwrap();
        let mut expected = prefix;
        expected.extend(suffix);
        assert_eq!(assembled.payload.unwrap().data(), expected.as_slice());
        assert!(matches!(assembled.packet, Packet::Metadata(_)));
    }

    #[test]
    fn ordinary_complete_packet_passes_through_unchanged() {
        let header = Packet::Metadata(PayloadHeader {
            stream_id: 1,
            pts: 0,
            payload_length: 4,
            total_payload_length: 4,
            compression: 0,
        });
        let p = Pktd::with_payload(1, header.clone(), Buffer::from_vec(vec![1, 2, 3, 4]));
        let mut merger = Merger::new();
        let out = merger.push_packet(p).unwrap();
        assert_eq!(out.packet, header);
        assert_eq!(out.payload.unwrap().data(), &[1, 2, 3, 4]);
    }
}
