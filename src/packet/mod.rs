//! Packet descriptors and the header/payload pair exchanged on the wire.
//!
//! Grounded on `libavtransport/utils_packet.h` and `libavtransport/encode.c`:
//! every packet on the wire starts with a 16-bit descriptor tag and a
//! sequence number, followed by variant-specific fields. [`Descriptor`]
//! models the tag; [`Packet`] is the decoded, owned representation; [`Pktd`]
//! pairs an encoded header with its (possibly still-assembling) payload
//! buffer, the unit the scheduler and merger push around.

/// The header/payload byte codec.
pub mod codec;

use crate::buffer::Buffer;
use crate::rational::Rational;

/// Header size, in bytes, of the small (36-byte / 288-bit) FEC block used by
/// every segmentable packet type and by generic segments themselves.
pub const SMALL_HEADER_LEN: usize = 36;
/// Message portion of the small FEC block (the rest is the parity suffix).
pub const SMALL_MESSAGE_LEN: usize = 28;
/// Header size, in bytes, of the large (348-byte / 2784-bit) FEC block used
/// by `video-info`.
pub const LARGE_HEADER_LEN: usize = 348;
/// Message portion of the large FEC block.
pub const LARGE_MESSAGE_LEN: usize = 252;

/// A 16-bit packet descriptor tag.
///
/// Several descriptors (`stream-data`, `stream-data-segment`,
/// `stream-data-segment-end`, `user-data`) reserve their low byte as a
/// per-packet sub-field; matching one against a reference value compares
/// only the high byte in that case, the way `fill_phantom_header` does when
/// reconstructing a target descriptor from recovered header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub u16);

impl Descriptor {
    /// `session-start`.
    pub const SESSION_START: Descriptor = Descriptor(0x5170);
    /// `time-sync`.
    pub const TIME_SYNC: Descriptor = Descriptor(0x0001);
    /// `stream-registration`.
    pub const STREAM_REGISTRATION: Descriptor = Descriptor(0x0002);
    /// `lut-icc`.
    pub const LUT_ICC: Descriptor = Descriptor(0x0010);
    /// `font-data`.
    pub const FONT_DATA: Descriptor = Descriptor(0x0011);
    /// `metadata`.
    pub const METADATA: Descriptor = Descriptor(0x0012);
    /// `stream-config`.
    pub const STREAM_CONFIG: Descriptor = Descriptor(0x0013);
    /// `stream-index`.
    pub const STREAM_INDEX: Descriptor = Descriptor(0x0014);
    /// `video-info`.
    pub const VIDEO_INFO: Descriptor = Descriptor(0x0008);
    /// `video-orientation`.
    pub const VIDEO_ORIENTATION: Descriptor = Descriptor(0x0009);
    /// Low byte carries `pkt_segmented`/`pkt_in_fec_group`/`field_id`/
    /// `pkt_compression`, packed per [`StreamDataFlags`].
    pub const STREAM_DATA_BASE: u16 = 0x0100;
    /// High byte shared by every `user-data` descriptor.
    pub const USER_DATA_BASE: u16 = 0x4000;
    /// High byte shared by a non-final `generic-segment` descriptor.
    pub const STREAM_DATA_SEGMENT_BASE: u16 = 0xFE00;
    /// High byte shared by the final `generic-segment` of a series.
    pub const STREAM_DATA_SEGMENT_END_BASE: u16 = 0xFF00;
    /// `eos`.
    pub const EOS: Descriptor = Descriptor(0xFFFF);

    /// Compares only the high byte, the rule for descriptors whose low byte
    /// is a per-packet flag field.
    pub fn same_family(self, other: Descriptor) -> bool {
        self.0 & 0xFF00 == other.0 & 0xFF00
    }

    /// `true` for any `stream-data` descriptor (flag bits in the low byte).
    pub fn is_stream_data(self) -> bool {
        self.0 & 0xFF00 == Self::STREAM_DATA_BASE && self != Self::EOS
    }

    /// `true` for any `user-data` descriptor.
    pub fn is_user_data(self) -> bool {
        self.0 & 0xFF00 == Self::USER_DATA_BASE
    }

    /// `true` for any `generic-segment` descriptor, final or not.
    pub fn is_segment(self) -> bool {
        self.is_segment_continuation() || self.is_segment_end()
    }

    /// `true` for a non-final `generic-segment` descriptor.
    pub fn is_segment_continuation(self) -> bool {
        self.0 & 0xFF00 == Self::STREAM_DATA_SEGMENT_BASE
    }

    /// `true` for the final `generic-segment` of a series.
    pub fn is_segment_end(self) -> bool {
        self.0 & 0xFF00 == Self::STREAM_DATA_SEGMENT_END_BASE && self != Self::EOS
    }

    /// `true` for the types whose payload may be larger than a single
    /// transport MTU and is therefore carried across `GenericSegment` packets.
    pub fn is_segmentable(self) -> bool {
        self.is_stream_data()
            || self.is_user_data()
            || self == Self::LUT_ICC
            || self == Self::FONT_DATA
            || self == Self::METADATA
            || self == Self::STREAM_CONFIG
    }
}

/// Bitfield packed into the low byte of a `stream-data` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamDataFlags {
    /// `true` if this is the authoritative header of a segmented series.
    pub segmented: bool,
    /// `true` if this packet belongs to an LDPC FEC group.
    pub in_fec_group: bool,
    /// Interlaced field id (0, 1, or 2 for progressive).
    pub field_id: u8,
    /// Compression scheme applied to the payload.
    pub compression: u8,
}

impl StreamDataFlags {
    /// Packs the flags into the descriptor's low byte.
    pub fn pack(self) -> u8 {
        (self.segmented as u8)
            | ((self.in_fec_group as u8) << 1)
            | ((self.field_id & 0x3) << 2)
            | ((self.compression & 0xF) << 4)
    }

    /// Unpacks the flags from the descriptor's low byte.
    pub fn unpack(byte: u8) -> Self {
        StreamDataFlags {
            segmented: byte & 0x1 != 0,
            in_fec_group: byte & 0x2 != 0,
            field_id: (byte >> 2) & 0x3,
            compression: (byte >> 4) & 0xF,
        }
    }
}

/// `session-start`: sent once, first packet of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    /// Unique session identifier.
    pub session_uuid: [u8; 16],
    /// Session-level flag bits.
    pub session_flags: u8,
    /// Producer's major version.
    pub producer_major: u8,
    /// Producer's minor version.
    pub producer_minor: u8,
    /// Producer's micro/patch version.
    pub producer_micro: u8,
    /// Fixed 28-byte, NUL-padded UTF-8 producer name.
    pub producer_name: [u8; 28],
}

/// `time-sync`: clock base and epoch for a stream's `timebase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSync {
    /// Clock identifier.
    pub ts_clock_id: u8,
    /// Clock frequency in Hz.
    pub ts_clock_hz: u32,
    /// Secondary clock frequency in Hz, for dual-rate clocks.
    pub ts_clock_hz2: u32,
    /// Epoch timestamp.
    pub epoch: i64,
    /// Clock sequence number, incremented on a clock discontinuity.
    pub ts_clock_seq: u16,
}

/// `stream-registration`: declares a stream and its codec/timebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRegistration {
    /// Id of the stream being registered.
    pub stream_id: u16,
    /// Id of a related stream (e.g. an attached-picture's parent), if any.
    pub related_stream_id: u16,
    /// Id of a stream derived from this one, if any.
    pub derived_stream_id: u16,
    /// Nominal bandwidth in bits per second.
    pub bandwidth: u32,
    /// Stream-level flag bits.
    pub stream_flags: u16,
    /// Codec identifier.
    pub codec_id: u32,
    /// Timebase used by this stream's timestamps.
    pub timebase: Rational,
    /// Clock id this stream's timestamps are relative to.
    pub ts_clock_id: u8,
    /// Number of samples/frames to skip after a seek before valid output.
    pub skip_preroll: u32,
    /// Number of initialization packets that precede stream data.
    pub init_packets: u8,
}

/// `video-info`: fixed video stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    /// Stream this info applies to.
    pub stream_id: u16,
    /// Presentation timestamp.
    pub pts: i64,
    /// Frame width in pixels.
    pub width: u16,
    /// Frame height in pixels.
    pub height: u16,
    /// Pixel format.
    pub format: u8,
    /// Bit depth per component.
    pub bit_depth: u8,
    /// `true` if the video is interlaced.
    pub interlaced: bool,
    /// Colorspace.
    pub colorspace: u8,
    /// Color primaries.
    pub primaries: u8,
    /// Transfer characteristic.
    pub transfer: u8,
    /// Matrix coefficients.
    pub matrix: u8,
    /// Color range.
    pub range: u8,
    /// Pixel aspect ratio.
    pub pixel_aspect: Rational,
    /// Frame rate.
    pub framerate: Rational,
}

/// `video-orientation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoOrientation {
    /// Stream this orientation applies to.
    pub stream_id: u16,
    /// Presentation timestamp.
    pub pts: i64,
    /// Rotation in thousandths of a degree.
    pub rotation_deg_x1000: i32,
    /// `true` if the frame is flipped horizontally.
    pub flip_h: bool,
    /// `true` if the frame is flipped vertically.
    pub flip_v: bool,
}

/// `stream-data`: a (possibly segmented) media frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamData {
    /// Stream this frame belongs to.
    pub stream_id: u16,
    /// Presentation timestamp.
    pub pts: i64,
    /// Frame duration, in the stream's timebase.
    pub duration: i32,
    /// Frame type (e.g. keyframe vs delta).
    pub frame_type: u8,
    /// Flags packed into the descriptor's low byte.
    pub flags: StreamDataFlags,
    /// Total payload length across all segments.
    pub data_length: u32,
}

/// Shared header for `lut-icc`, `font-data`, `user-data`, `metadata`, and
/// `stream-config`: all four carry a stream id, pts, and total/partial
/// length pair and nothing else at the descriptor level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Stream this payload belongs to.
    pub stream_id: u16,
    /// Presentation timestamp.
    pub pts: i64,
    /// Length of the payload carried by this packet alone.
    pub payload_length: u32,
    /// Total logical payload length across all segments.
    pub total_payload_length: u32,
    /// Compression scheme applied to the payload.
    pub compression: u8,
}

/// `generic-segment`: one slice of a segmented packet's payload, carrying a
/// 4-byte fragment of the original header (`header_7`) for reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericSegment {
    /// Sequence number of the series' authoritative header packet.
    pub target_seq: u32,
    /// Stream this segment belongs to.
    pub stream_id: u16,
    /// Byte offset of this segment within the logical payload.
    pub seg_offset: u32,
    /// Length of this segment's data.
    pub seg_length: u32,
    /// Total logical payload length across all segments.
    pub pkt_total_data: u32,
    /// 4-byte fragment of the original header, keyed by this segment's own
    /// sequence number modulo 7.
    pub header_7: [u8; 4],
    /// `true` for the final segment of a series (wire descriptor `0xFFxx`).
    pub is_final: bool,
}

/// One `{seq, offset, pts}` random-access entry in a `stream-index` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Sequence number of the indexed packet.
    pub seq: u64,
    /// Byte offset of the indexed packet.
    pub offset: u64,
    /// Presentation timestamp of the indexed packet.
    pub pts: i64,
}

/// `stream-index`: a list of random-access points into a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIndex {
    /// Stream this index describes.
    pub stream_id: u16,
    /// Random-access entries, in ascending sequence order.
    pub entries: Vec<IndexEntry>,
}

/// A fully decoded packet header, tagged by its [`Descriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// First packet of a connection.
    SessionStart(SessionStart),
    /// Clock base and epoch for a stream's timebase.
    TimeSync(TimeSync),
    /// Declares a stream and its codec/timebase.
    StreamRegistration(StreamRegistration),
    /// Fixed video stream parameters.
    VideoInfo(VideoInfo),
    /// Video rotation/flip metadata.
    VideoOrientation(VideoOrientation),
    /// A (possibly segmented) media frame.
    StreamData(StreamData),
    /// A LUT/ICC color profile blob.
    LutIcc(PayloadHeader),
    /// An embedded font blob.
    FontData(PayloadHeader),
    /// Application-defined user data.
    UserData(PayloadHeader),
    /// Generic stream or session metadata.
    Metadata(PayloadHeader),
    /// Opaque codec configuration data.
    StreamConfig(PayloadHeader),
    /// One fragment of a segmented packet's payload.
    GenericSegment(GenericSegment),
    /// A list of random-access points into a stream.
    StreamIndex(StreamIndex),
    /// End of stream.
    Eos,
}

impl Packet {
    /// The wire descriptor for this packet's variant.
    pub fn descriptor(&self) -> Descriptor {
        match self {
            Packet::SessionStart(_) => Descriptor::SESSION_START,
            Packet::TimeSync(_) => Descriptor::TIME_SYNC,
            Packet::StreamRegistration(_) => Descriptor::STREAM_REGISTRATION,
            Packet::VideoInfo(_) => Descriptor::VIDEO_INFO,
            Packet::VideoOrientation(_) => Descriptor::VIDEO_ORIENTATION,
            Packet::StreamData(d) => Descriptor(Descriptor::STREAM_DATA_BASE | d.flags.pack() as u16),
            Packet::LutIcc(_) => Descriptor::LUT_ICC,
            Packet::FontData(_) => Descriptor::FONT_DATA,
            Packet::UserData(_) => Descriptor(Descriptor::USER_DATA_BASE),
            Packet::Metadata(_) => Descriptor::METADATA,
            Packet::StreamConfig(_) => Descriptor::STREAM_CONFIG,
            Packet::GenericSegment(s) => Descriptor(if s.is_final {
                Descriptor::STREAM_DATA_SEGMENT_END_BASE
            } else {
                Descriptor::STREAM_DATA_SEGMENT_BASE
            }),
            Packet::StreamIndex(_) => Descriptor::STREAM_INDEX,
            Packet::Eos => Descriptor::EOS,
        }
    }

    /// The full logical payload length this packet's variant declares, for
    /// the segmentable variants. `None` for packets that are never
    /// segmented.
    pub fn total_payload_len(&self) -> Option<u32> {
        match self {
            Packet::StreamData(d) => Some(d.data_length),
            Packet::LutIcc(h)
            | Packet::FontData(h)
            | Packet::UserData(h)
            | Packet::Metadata(h)
            | Packet::StreamConfig(h) => Some(h.total_payload_length),
            _ => None,
        }
    }

    /// `true` if this packet is the authoritative header of a segmented
    /// logical packet ("start-of-series"), i.e. it carries only a
    /// prefix of its declared total payload. `StreamData` signals this with
    /// its `segmented` flag bit (it has no separate partial-length field);
    /// the shared `PayloadHeader` variants signal it by `payload_length <
    /// total_payload_length`.
    pub fn is_segment_start(&self) -> bool {
        match self {
            Packet::StreamData(d) => d.flags.segmented,
            Packet::LutIcc(h)
            | Packet::FontData(h)
            | Packet::UserData(h)
            | Packet::Metadata(h)
            | Packet::StreamConfig(h) => h.payload_length < h.total_payload_length,
            _ => false,
        }
    }

    /// Stream this packet pertains to, if any (control packets like
    /// `session-start` and `time-sync` have none).
    pub fn stream_id(&self) -> Option<u16> {
        match self {
            Packet::VideoInfo(v) => Some(v.stream_id),
            Packet::VideoOrientation(v) => Some(v.stream_id),
            Packet::StreamData(d) => Some(d.stream_id),
            Packet::LutIcc(h) | Packet::FontData(h) | Packet::UserData(h) | Packet::Metadata(h) | Packet::StreamConfig(h) => {
                Some(h.stream_id)
            }
            Packet::GenericSegment(s) => Some(s.stream_id),
            Packet::StreamIndex(s) => Some(s.stream_id),
            _ => None,
        }
    }
}

/// A packet header paired with its payload buffer, the unit pushed through
/// the scheduler, FIFO, and merger. Mirrors `AVTPktd` in
/// `libavtransport/packet.h`.
#[derive(Debug, Clone)]
pub struct Pktd {
    /// Wire sequence number.
    pub sequence: u64,
    /// The decoded header.
    pub packet: Packet,
    /// The payload, if any.
    pub payload: Option<Buffer>,
}

impl Pktd {
    /// Creates a packet with no payload.
    pub fn new(sequence: u64, packet: Packet) -> Self {
        Pktd {
            sequence,
            packet,
            payload: None,
        }
    }

    /// Creates a packet carrying `payload`.
    pub fn with_payload(sequence: u64, packet: Packet, payload: Buffer) -> Self {
        Pktd {
            sequence,
            packet,
            payload: Some(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_data_descriptor_carries_flags_in_low_byte() {
        let flags = StreamDataFlags {
            segmented: true,
            in_fec_group: false,
            field_id: 1,
            compression: 3,
        };
        let pkt = Packet::StreamData(StreamData {
            stream_id: 1,
            pts: 0,
            duration: 0,
            frame_type: 0,
            flags,
            data_length: 0,
        });
        let d = pkt.descriptor();
        assert!(d.is_stream_data());
        assert_eq!(StreamDataFlags::unpack((d.0 & 0xFF) as u8), flags);
    }

    #[test]
    fn same_family_ignores_low_byte() {
        let a = Descriptor(Descriptor::STREAM_DATA_BASE | 0x01);
        let b = Descriptor(Descriptor::STREAM_DATA_BASE | 0xFE);
        assert!(a.same_family(b));
        assert_ne!(a, b);
    }

    #[test]
    fn eos_is_not_a_segment_end() {
        assert!(!Descriptor::EOS.is_segment_end());
        assert!(!Descriptor::EOS.is_stream_data());
    }
}
