//! Connection pipeline: the glue between a caller's packets, the
//! scheduler/merger, and a concrete [`Transport`].
//!
//! Grounded on `libavtransport/connection.c`. `avt_connection_create` parses
//! the address, opens the I/O back-end, queries its MTU, and sends a
//! session-start packet; `avt_send_packet` forwards to the scheduler;
//! `avt_connection_process` pops one scheduled batch and hands it to the
//! transport, keeping a copy so a transient transport error doesn't lose
//! the packets; `avt_connection_flush` drains the scheduler before flushing
//! the transport; `avt_connection_destroy` is the non-cancellable teardown
//! path: it closes the transport without attempting a graceful drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::address::Address;
use crate::buffer::Buffer;
use crate::error::Result;
use crate::merger::Merger;
use crate::packet::codec::header_len;
use crate::packet::{Packet, Pktd, SessionStart};
use crate::scheduler::{Bandwidth, Scheduler};
use crate::transport::Transport;

/// Stream id reserved for control packets (`session-start`, `time-sync`,
/// `stream-registration`) that aren't tied to a particular media stream.
/// Distinct from the protocol-reserved `0xFFFF`.
pub const CONTROL_STREAM_ID: u16 = 0;

/// Caller-supplied parameters for a new [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Producer name, truncated/NUL-padded to 28 bytes on the wire.
    pub producer_name: String,
    /// `(major, minor, micro)` producer version.
    pub producer_version: (u8, u8, u8),
    /// The scheduler's interleaving budget.
    pub bandwidth: Bandwidth,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        ConnectionInfo {
            producer_name: "avtransport-rs".to_string(),
            producer_version: (0, 1, 0),
            bandwidth: Bandwidth::Unlimited,
        }
    }
}

fn fixed_producer_name(name: &str) -> [u8; 28] {
    let mut out = [0u8; 28];
    let bytes = name.as_bytes();
    let n = bytes.len().min(28);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Ties one [`Scheduler`] (send side) and one [`Merger`] (receive side) to
/// a concrete transport. One `Connection` is driven from a single task at a
/// time; nothing here is `Sync`.
pub struct Connection<T: Transport> {
    address: Address,
    transport: T,
    scheduler: Scheduler,
    merger: Merger,
    sequence: Arc<AtomicU64>,
    created_at: Instant,
    last_process: Instant,
}

impl<T: Transport> Connection<T> {
    /// Opens `transport` against `address`, queries its MTU, configures the
    /// scheduler, and sends the initial session-start packet. The packet's
    /// own sequence number is derived from the low 32 bits of the current
    /// monotonic time; the scheduler's counter continues from there so
    /// later sequence numbers stay strictly increasing.
    pub async fn create(mut transport: T, address: Address, info: ConnectionInfo) -> Result<Self> {
        let mtu = transport.max_pkt_len().await;
        let sequence = Arc::new(AtomicU64::new(0));
        let mut scheduler = Scheduler::with_sequence_counter(mtu, info.bandwidth, Arc::clone(&sequence));

        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let session_seq = now_ns & 0xFFFF_FFFF;
        sequence.store(session_seq, Ordering::Relaxed);

        let uuid = address.session_uuid.unwrap_or_else(Uuid::new_v4);
        let session_start = Packet::SessionStart(SessionStart {
            session_uuid: *uuid.as_bytes(),
            session_flags: 0,
            producer_major: info.producer_version.0,
            producer_minor: info.producer_version.1,
            producer_micro: info.producer_version.2,
            producer_name: fixed_producer_name(&info.producer_name),
        });
        scheduler.push(CONTROL_STREAM_ID, session_start, None)?;

        Ok(Connection {
            address,
            transport,
            scheduler,
            merger: Merger::new(),
            sequence,
            created_at: Instant::now(),
            last_process: Instant::now(),
        })
    }

    /// The address this connection was created against.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Registers a stream with the scheduler ahead of its first packet, so
    /// it immediately participates in round-robin interleaving.
    pub fn register_stream(&mut self, stream_id: u16) {
        self.scheduler.register_stream(stream_id);
    }

    /// Queues `packet` for `stream_id`. Forwards straight to
    /// [`Scheduler::push`].
    pub fn send(&mut self, stream_id: u16, packet: Packet, payload: Option<Buffer>) -> Result<()> {
        self.scheduler.push(stream_id, packet, payload)
    }

    /// Pops one scheduled batch, encodes it, and hands it to the transport.
    /// A pre-transport copy of the batch is kept so the caller can inspect
    /// what was attempted if the transport call fails; the assigned
    /// sequence range is not reused on failure — failed sequences are
    /// burned, not retried automatically.
    pub async fn process(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let now = self.created_at.elapsed();
        let elapsed = self.last_process.elapsed();
        self.last_process = Instant::now();

        let batch = self.scheduler.pop_ready(now, elapsed);
        if batch.is_empty() {
            return Ok(0);
        }
        let n = batch.len();
        let encoded = encode_batch(&batch)?;
        self.transport.write_vec(&encoded, timeout).await?;
        Ok(n)
    }

    /// Drains every packet still queued in the scheduler, regardless of
    /// bandwidth budget, and flushes the transport.
    pub async fn flush(&mut self, timeout: Option<Duration>) -> Result<()> {
        let batch = self.scheduler.flush();
        if !batch.is_empty() {
            let encoded = encode_batch(&batch)?;
            self.transport.write_vec(&encoded, timeout).await?;
        }
        self.transport.flush(timeout).await
    }

    /// Reads one on-wire packet and feeds it to the merger, returning a
    /// fully assembled logical packet once one completes. `Ok(None)` means
    /// the packet just read was a segment that didn't complete anything
    /// yet (`Error::Again` from the merger) — keep calling `recv`.
    pub async fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Pktd>> {
        let mtu = self.scheduler.mtu() as usize;
        let (buf, _offset) = self.transport.read_input(mtu, timeout).await?;
        let data = buf.data();
        let (packet, seq32) = crate::packet::codec::decode_header(data)?;
        let hlen = header_len(&packet)?;
        let payload = if data.len() > hlen {
            Some(Buffer::from_vec(data[hlen..].to_vec()))
        } else {
            None
        };
        let pktd = Pktd {
            sequence: seq32 as u64,
            packet,
            payload,
        };

        match self.merger.push_packet(pktd) {
            Ok(assembled) => Ok(Some(assembled)),
            Err(crate::error::Error::Again) => Ok(None),
            Err(crate::error::Error::Busy) => {
                // A stalled target is blocking a new one; give up on it so
                // forward progress resumes on the next call (the caller
                // must re-request any retransmission it needs).
                self.merger.done();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Closes the transport. Non-cancellable: completes synchronously and
    /// discards any pending scheduler state without transmission. Call
    /// [`Connection::flush`] first for a graceful shutdown.
    pub async fn destroy(mut self) -> Result<()> {
        self.transport.close().await
    }

    /// The connection's shared sequence counter, for components (e.g. a
    /// reorder buffer) that need to correlate wire sequences against it.
    pub fn sequence_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.sequence)
    }
}

fn encode_batch(batch: &[Pktd]) -> Result<Vec<(Pktd, Vec<u8>)>> {
    batch
        .iter()
        .map(|p| {
            let hdr = crate::packet::codec::encode_header(&p.packet, p.sequence)?;
            Ok((p.clone(), hdr))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PayloadHeader;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemTransport {
        mtu: u32,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        to_read: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl Transport for MemTransport {
        async fn max_pkt_len(&self) -> u32 {
            self.mtu
        }

        async fn write_pkt(&mut self, pkt: &Pktd, header: &[u8], _timeout: Option<Duration>) -> Result<u64> {
            let mut wire = header.to_vec();
            if let Some(payload) = &pkt.payload {
                wire.extend_from_slice(payload.data());
            }
            let len = wire.len() as u64;
            self.written.lock().unwrap().push(wire);
            Ok(len)
        }

        async fn read_input(&mut self, _len: usize, _timeout: Option<Duration>) -> Result<(Buffer, u64)> {
            let mut pending = self.to_read.lock().unwrap();
            if pending.is_empty() {
                return Err(crate::error::Error::Eof);
            }
            let bytes = pending.remove(0);
            let len = bytes.len() as u64;
            Ok((Buffer::from_vec(bytes), len))
        }

        async fn flush(&mut self, _timeout: Option<Duration>) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_sends_session_start_on_first_process() {
        let transport = MemTransport {
            mtu: 1400,
            ..Default::default()
        };
        let written = Arc::clone(&transport.written);
        let addr = Address::parse("udp://127.0.0.1:5170").unwrap();
        let mut conn = Connection::create(transport, addr, ConnectionInfo::default()).await.unwrap();

        let n = conn.process(Some(Duration::ZERO)).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_then_process_then_recv_round_trips_through_a_loopback_transport() {
        let to_read = Arc::new(Mutex::new(Vec::new()));
        let written = Arc::new(Mutex::new(Vec::new()));
        let transport = MemTransport {
            mtu: 1400,
            written: Arc::clone(&written),
            to_read: Arc::clone(&to_read),
        };
        let addr = Address::parse("udp://127.0.0.1:5170").unwrap();
        let mut conn = Connection::create(transport, addr, ConnectionInfo::default()).await.unwrap();
        // Drain the session-start packet first.
        conn.process(Some(Duration::ZERO)).await.unwrap();
        written.lock().unwrap().clear();

        let pkt = Packet::Metadata(PayloadHeader {
            stream_id: 1,
            pts: 0,
            payload_length: 4,
            total_payload_length: 4,
            compression: 0,
        });
        conn.send(1, pkt, Some(Buffer::from_vec(vec![9, 9, 9, 9]))).unwrap();
        conn.process(Some(Duration::ZERO)).await.unwrap();

        let sent = written.lock().unwrap().remove(0);
        to_read.lock().unwrap().push(sent);

        let assembled = conn.recv(Some(Duration::ZERO)).await.unwrap().expect("packet should assemble immediately");
        assert_eq!(assembled.payload.unwrap().data(), &[9, 9, 9, 9]);
    }
}
