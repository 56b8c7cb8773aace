//! Big-endian header codec.
//!
//! Grounded on `libavtransport/bytestream.h` (`AVT_RB16`/`AVT_WB32`-style
//! cursors) and the per-variant encoders in `libavtransport/encode.c`. Every
//! header starts with a 2-byte descriptor and a 4-byte (low 32 bits of the)
//! sequence number; segmentable packet types and `generic-segment` itself
//! are fixed at [`SMALL_HEADER_LEN`] bytes so the trailing 8 bytes can carry
//! an LDPC parity suffix, and `video-info` is fixed at [`LARGE_HEADER_LEN`]
//! bytes for the same reason with a 96-byte suffix. Control packets that are
//! never segmented (`session-start`, `time-sync`, `stream-registration`,
//! `video-orientation`, `stream-index`) aren't FEC-protected and use
//! whatever length their fields need.
//!
//! `encode_header` fills the parity suffix of FEC-protected variants via
//! [`crate::fec`] before returning; `decode_header` verifies it the same way
//! before trusting the decoded fields, rejecting the header with
//! [`Error::FecCheckFailed`] on a mismatch.

use crate::error::{Error, Result};
use crate::fec;
use crate::rational::Rational;

use super::{
    Descriptor, GenericSegment, IndexEntry, Packet, PayloadHeader, SessionStart, StreamData,
    StreamDataFlags, StreamIndex, StreamRegistration, TimeSync, VideoInfo, VideoOrientation,
    LARGE_HEADER_LEN, SMALL_HEADER_LEN,
};

/// A cursor over a byte slice, reading big-endian integers.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a cursor starting at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::Range(format!(
                "header read past end: need {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len()
            )));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a big-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    /// Reads a big-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// Reads a big-endian `u64`.
    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Reads a big-endian `i32`.
    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    /// Reads a big-endian `i64`.
    pub fn i64(&mut self) -> Result<i64> {
        Ok(self.u64()? as i64)
    }

    /// Reads 4 raw bytes.
    pub fn array4(&mut self) -> Result<[u8; 4]> {
        Ok(self.take(4)?.try_into().unwrap())
    }

    /// Reads 16 raw bytes.
    pub fn array16(&mut self) -> Result<[u8; 16]> {
        Ok(self.take(16)?.try_into().unwrap())
    }

    /// Reads 28 raw bytes.
    pub fn array28(&mut self) -> Result<[u8; 28]> {
        Ok(self.take(28)?.try_into().unwrap())
    }

    /// Advances the cursor by `n` bytes without returning them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n)?;
        Ok(())
    }

    /// Bytes left unread.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// An append-only big-endian byte writer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    /// Writes one byte.
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    /// Writes a big-endian `u16`.
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Writes a big-endian `u32`.
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Writes a big-endian `u64`.
    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Writes a big-endian `i32`.
    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.u32(v as u32)
    }

    /// Writes a big-endian `i64`.
    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.u64(v as u64)
    }

    /// Writes raw bytes verbatim.
    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// Writes `v`, NUL-padded (or truncated) to exactly `width` bytes.
    /// Mirrors `avt_bsw_fstr`.
    pub fn fixed_str(&mut self, v: &[u8], width: usize) -> &mut Self {
        let n = v.len().min(width);
        self.buf.extend_from_slice(&v[..n]);
        self.zpad(width - n)
    }

    /// Writes `n` zero bytes. Mirrors `avt_bsw_zpad`.
    pub fn zpad(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    /// Consumes the writer, returning the accumulated bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }
}

fn write_rational(w: &mut Writer, r: Rational) {
    w.i32(r.num);
    w.i32(r.den);
}

fn read_rational(r: &mut Reader) -> Result<Rational> {
    Ok(Rational::new(r.i32()?, r.i32()?))
}

/// Encodes `packet`'s header (not including any payload bytes) using
/// `sequence`'s low 32 bits, truncated to the wire field's width. The
/// trailing parity region of FEC-protected variants is computed and filled
/// in via [`crate::fec`] before this returns.
pub fn encode_header(packet: &Packet, sequence: u64) -> Result<Vec<u8>> {
    let seq32 = sequence as u32;
    let desc = packet.descriptor();
    let mut w = Writer::new();
    w.u16(desc.0);
    w.u32(seq32);

    match packet {
        Packet::SessionStart(s) => {
            w.bytes(&s.session_uuid);
            w.u8(s.session_flags);
            w.u8(s.producer_major);
            w.u8(s.producer_minor);
            w.u8(s.producer_micro);
            w.fixed_str(&s.producer_name, 28);
        }
        Packet::TimeSync(t) => {
            w.u8(t.ts_clock_id);
            w.u32(t.ts_clock_hz);
            w.u32(t.ts_clock_hz2);
            w.i64(t.epoch);
            w.u16(t.ts_clock_seq);
            pad_to(&mut w, SMALL_HEADER_LEN);
        }
        Packet::StreamRegistration(s) => {
            w.u16(s.stream_id);
            w.u16(s.related_stream_id);
            w.u16(s.derived_stream_id);
            w.u32(s.bandwidth);
            w.u16(s.stream_flags);
            w.u32(s.codec_id);
            write_rational(&mut w, s.timebase);
            w.u8(s.ts_clock_id);
            w.u32(s.skip_preroll);
            w.u8(s.init_packets);
        }
        Packet::VideoInfo(v) => {
            w.u16(v.stream_id);
            w.i64(v.pts);
            w.u16(v.width);
            w.u16(v.height);
            w.u8(v.format);
            w.u8(v.bit_depth);
            w.u8(v.interlaced as u8);
            w.u8(v.colorspace);
            w.u8(v.primaries);
            w.u8(v.transfer);
            w.u8(v.matrix);
            w.u8(v.range);
            write_rational(&mut w, v.pixel_aspect);
            write_rational(&mut w, v.framerate);
            pad_large_with_parity(&mut w);
        }
        Packet::VideoOrientation(v) => {
            w.u16(v.stream_id);
            w.i64(v.pts);
            w.i32(v.rotation_deg_x1000);
            w.u8(v.flip_h as u8);
            w.u8(v.flip_v as u8);
            pad_to(&mut w, SMALL_HEADER_LEN);
        }
        Packet::StreamData(d) => {
            w.u16(d.stream_id);
            w.i64(d.pts);
            w.i32(d.duration);
            w.u8(d.frame_type);
            w.u32(d.data_length);
            pad_small_with_parity(&mut w);
        }
        Packet::LutIcc(h) | Packet::FontData(h) | Packet::UserData(h) | Packet::Metadata(h) | Packet::StreamConfig(h) => {
            w.u16(h.stream_id);
            w.i64(h.pts);
            w.u32(h.payload_length);
            w.u32(h.total_payload_length);
            w.u8(h.compression);
            pad_small_with_parity(&mut w);
        }
        Packet::GenericSegment(s) => {
            w.u32(s.target_seq);
            w.u16(s.stream_id);
            w.u32(s.seg_offset);
            w.u32(s.seg_length);
            w.u32(s.pkt_total_data);
            w.bytes(&s.header_7);
            pad_small_with_parity(&mut w);
        }
        Packet::StreamIndex(idx) => {
            w.u16(idx.stream_id);
            w.u16(idx.entries.len() as u16);
            for e in &idx.entries {
                w.u64(e.seq);
                w.u64(e.offset);
                w.i64(e.pts);
            }
        }
        Packet::Eos => {}
    }

    if w.len() > LARGE_HEADER_LEN {
        return Err(Error::Range(format!(
            "encoded header of {} bytes exceeds the {LARGE_HEADER_LEN}-byte maximum",
            w.len()
        )));
    }
    let mut bytes = w.into_vec();
    if desc.is_segmentable() || desc.is_segment() {
        fec::protect_small(&mut bytes)?;
    } else if desc == Descriptor::VIDEO_INFO {
        fec::protect_large(&mut bytes)?;
    }
    Ok(bytes)
}

/// The on-wire byte length of `packet`'s header, for callers (e.g. the
/// connection pipeline) that need to know where a header ends and a
/// payload begins without re-threading the sequence number through.
pub fn header_len(packet: &Packet) -> Result<usize> {
    Ok(encode_header(packet, 0)?.len())
}

fn pad_to(w: &mut Writer, total: usize) {
    if w.len() < total {
        let n = total - w.len();
        w.zpad(n);
    }
}

/// Pads with reserved bytes up to `SMALL_HEADER_LEN - 8`, then reserves the
/// final 8 bytes for the LDPC parity suffix [`encode_header`] fills in
/// afterward.
fn pad_small_with_parity(w: &mut Writer) {
    pad_to(w, SMALL_HEADER_LEN - 8);
    w.zpad(8);
}

/// Pads with reserved bytes up to `LARGE_HEADER_LEN - 96`, then reserves the
/// final 96 bytes for the LDPC parity suffix [`encode_header`] fills in
/// afterward.
fn pad_large_with_parity(w: &mut Writer) {
    pad_to(w, LARGE_HEADER_LEN - 96);
    w.zpad(96);
}

/// Decodes a packet header from `buf`. `buf` must contain at least the
/// descriptor and sequence fields; callers typically pass the full
/// fixed-size header region for the descriptor's family.
pub fn decode_header(buf: &[u8]) -> Result<(Packet, u32)> {
    let mut r = Reader::new(buf);
    let desc = Descriptor(r.u16()?);
    let seq32 = r.u32()?;

    // Only checked when the full FEC block is present: callers that hand in
    // just the 28-/252-byte message portion (the merger's `header_7`
    // reconstruction, which never recovers the parity suffix) fall outside
    // this check rather than being rejected for "too short".
    if desc.is_segmentable() || desc.is_segment() {
        if buf.len() >= SMALL_HEADER_LEN && !fec::check_small(&buf[..SMALL_HEADER_LEN], fec::MAX_ITERATIONS)? {
            return Err(Error::FecCheckFailed(format!(
                "small header (descriptor 0x{:04x}) failed parity check",
                desc.0
            )));
        }
    } else if desc == Descriptor::VIDEO_INFO
        && buf.len() >= LARGE_HEADER_LEN
        && !fec::check_large(&buf[..LARGE_HEADER_LEN], fec::MAX_ITERATIONS)?
    {
        return Err(Error::FecCheckFailed(
            "video-info header failed parity check".into(),
        ));
    }

    let packet = if desc == Descriptor::EOS {
        Packet::Eos
    } else if desc == Descriptor::SESSION_START {
        Packet::SessionStart(SessionStart {
            session_uuid: r.array16()?,
            session_flags: r.u8()?,
            producer_major: r.u8()?,
            producer_minor: r.u8()?,
            producer_micro: r.u8()?,
            producer_name: r.array28()?,
        })
    } else if desc == Descriptor::TIME_SYNC {
        Packet::TimeSync(TimeSync {
            ts_clock_id: r.u8()?,
            ts_clock_hz: r.u32()?,
            ts_clock_hz2: r.u32()?,
            epoch: r.i64()?,
            ts_clock_seq: r.u16()?,
        })
    } else if desc == Descriptor::STREAM_REGISTRATION {
        Packet::StreamRegistration(StreamRegistration {
            stream_id: r.u16()?,
            related_stream_id: r.u16()?,
            derived_stream_id: r.u16()?,
            bandwidth: r.u32()?,
            stream_flags: r.u16()?,
            codec_id: r.u32()?,
            timebase: read_rational(&mut r)?,
            ts_clock_id: r.u8()?,
            skip_preroll: r.u32()?,
            init_packets: r.u8()?,
        })
    } else if desc == Descriptor::VIDEO_INFO {
        Packet::VideoInfo(VideoInfo {
            stream_id: r.u16()?,
            pts: r.i64()?,
            width: r.u16()?,
            height: r.u16()?,
            format: r.u8()?,
            bit_depth: r.u8()?,
            interlaced: r.u8()? != 0,
            colorspace: r.u8()?,
            primaries: r.u8()?,
            transfer: r.u8()?,
            matrix: r.u8()?,
            range: r.u8()?,
            pixel_aspect: read_rational(&mut r)?,
            framerate: read_rational(&mut r)?,
        })
    } else if desc == Descriptor::VIDEO_ORIENTATION {
        Packet::VideoOrientation(VideoOrientation {
            stream_id: r.u16()?,
            pts: r.i64()?,
            rotation_deg_x1000: r.i32()?,
            flip_h: r.u8()? != 0,
            flip_v: r.u8()? != 0,
        })
    } else if desc == Descriptor::LUT_ICC
        || desc == Descriptor::FONT_DATA
        || desc == Descriptor::METADATA
        || desc == Descriptor::STREAM_CONFIG
        || desc.is_user_data()
    {
        let h = PayloadHeader {
            stream_id: r.u16()?,
            pts: r.i64()?,
            payload_length: r.u32()?,
            total_payload_length: r.u32()?,
            compression: r.u8()?,
        };
        match () {
            _ if desc == Descriptor::LUT_ICC => Packet::LutIcc(h),
            _ if desc == Descriptor::FONT_DATA => Packet::FontData(h),
            _ if desc == Descriptor::METADATA => Packet::Metadata(h),
            _ if desc == Descriptor::STREAM_CONFIG => Packet::StreamConfig(h),
            _ => Packet::UserData(h),
        }
    } else if desc.is_stream_data() {
        Packet::StreamData(StreamData {
            stream_id: r.u16()?,
            pts: r.i64()?,
            duration: r.i32()?,
            frame_type: r.u8()?,
            flags: StreamDataFlags::unpack((desc.0 & 0xFF) as u8),
            data_length: r.u32()?,
        })
    } else if desc.is_segment() {
        Packet::GenericSegment(GenericSegment {
            target_seq: r.u32()?,
            stream_id: r.u16()?,
            seg_offset: r.u32()?,
            seg_length: r.u32()?,
            pkt_total_data: r.u32()?,
            header_7: r.array4()?,
            is_final: desc.is_segment_end(),
        })
    } else if desc == Descriptor::STREAM_INDEX {
        let stream_id = r.u16()?;
        let count = r.u16()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(IndexEntry {
                seq: r.u64()?,
                offset: r.u64()?,
                pts: r.i64()?,
            });
        }
        Packet::StreamIndex(StreamIndex { stream_id, entries })
    } else {
        return Err(Error::InvalidArgument(format!(
            "unknown packet descriptor 0x{:04x}",
            desc.0
        )));
    };

    Ok((packet, seq32))
}
