//! The narrow I/O vtable the core consumes.
//!
//! Grounded on `libavtransport/io_common.h`'s `AVTIOContext`/`IOFuncs` table
//! and rendered the way `format::rtsp::RTSPClient` drives a connection
//! through `async-trait` rather than a raw function-pointer struct.
//! Concrete back-ends (file, fd, mmap, UDP/UDP-Lite/QUIC socket,
//! user callback) live outside this crate and implement this trait; the
//! [`crate::connection::Connection`] glue only ever calls through a narrow
//! write/read/seek/flush vtable and never reaches into a back-end directly.

use std::time::Duration;

use async_trait::async_trait;

use crate::address::Address;
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::packet::Pktd;

/// Blocking I/O back-end consumed by the connection pipeline.
///
/// `timeout: None` blocks indefinitely (`INT64_MAX` in nanoseconds);
/// `Some(Duration::ZERO)` is non-blocking (`DONTWAIT`). Every method that
/// can block takes one; the scheduler, merger, and codec never do.
#[async_trait]
pub trait Transport: Send {
    /// The transport's maximum on-wire packet size, used to configure the
    /// scheduler's segmentation cap.
    async fn max_pkt_len(&self) -> u32;

    /// Registers an additional multicast destination. Optional; back-ends
    /// that don't support it return `Error::Unsupported`.
    async fn add_dst(&mut self, addr: &Address) -> Result<()> {
        let _ = addr;
        Err(Error::Unsupported("add_dst is not supported by this transport".into()))
    }

    /// Unregisters a multicast destination previously added with
    /// [`Transport::add_dst`].
    async fn del_dst(&mut self, addr: &Address) -> Result<()> {
        let _ = addr;
        Err(Error::Unsupported("del_dst is not supported by this transport".into()))
    }

    /// Writes a single encoded packet, returning the new write offset.
    async fn write_pkt(&mut self, pkt: &Pktd, header: &[u8], timeout: Option<Duration>) -> Result<u64>;

    /// Writes a batch of encoded packets. The default implementation loops
    /// over [`Transport::write_pkt`]; scatter/gather is an optimization, not
    /// a requirement — back-ends without `writev`-like support fall back to
    /// this loop.
    async fn write_vec(&mut self, pkts: &[(Pktd, Vec<u8>)], timeout: Option<Duration>) -> Result<u64> {
        let mut offset = 0;
        for (pkt, header) in pkts {
            offset = self.write_pkt(pkt, header, timeout).await?;
        }
        Ok(offset)
    }

    /// Reads up to `len` bytes, returning the bytes read and the new read
    /// offset.
    async fn read_input(&mut self, len: usize, timeout: Option<Duration>) -> Result<(Buffer, u64)>;

    /// Seeks a seekable back-end to `offset`, returning the resulting
    /// offset. Non-seekable back-ends (sockets) return `Error::Unsupported`.
    async fn seek(&mut self, offset: u64) -> Result<u64> {
        let _ = offset;
        Err(Error::Unsupported("seek is not supported by this transport".into()))
    }

    /// Flushes any buffered output.
    async fn flush(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Closes the back-end. Idempotent; called at most once by
    /// [`crate::connection::Connection::destroy`].
    async fn close(&mut self) -> Result<()>;
}
