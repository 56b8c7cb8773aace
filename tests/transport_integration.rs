//! Integration tests exercising the `Transport` vtable against real I/O
//! back-ends: a file round trip and a UDP loopback, independent of the
//! scheduler/merger.
//!
//! The file and UDP transports here are test-only: concrete back-ends stay
//! out of the library itself, but the trait they implement is exactly
//! what a real back-end would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use avtransport::buffer::Buffer;
use avtransport::error::{Error, Result};
use avtransport::packet::Pktd;
use avtransport::transport::Transport;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::UdpSocket;

struct FileTransport {
    file: tokio::fs::File,
}

impl FileTransport {
    async fn open(path: &std::path::Path) -> Self {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
            .unwrap();
        FileTransport { file }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn max_pkt_len(&self) -> u32 {
        1376
    }

    async fn write_pkt(&mut self, _pkt: &Pktd, header: &[u8], _timeout: Option<Duration>) -> Result<u64> {
        self.file.write_all(header).await.map_err(Error::Os)?;
        Ok(self.file.stream_position().await.map_err(Error::Os)?)
    }

    async fn read_input(&mut self, len: usize, _timeout: Option<Duration>) -> Result<(Buffer, u64)> {
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).await.map_err(Error::Os)?;
        let pos = self.file.stream_position().await.map_err(Error::Os)?;
        Ok((Buffer::from_vec(buf), pos))
    }

    async fn seek(&mut self, offset: u64) -> Result<u64> {
        self.file
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(Error::Os)
    }

    async fn flush(&mut self, _timeout: Option<Duration>) -> Result<()> {
        self.file.flush().await.map_err(Error::Os)
    }

    async fn close(&mut self) -> Result<()> {
        self.file.flush().await.map_err(Error::Os)
    }
}

fn test_file_path(name: &str) -> std::path::PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("avtransport_test_{name}_{}_{n}.bin", std::process::id()))
}

fn raw_packet(seq: u8, filler: u8) -> Vec<u8> {
    let mut buf = vec![filler; 384];
    buf[0] = 0x40;
    buf[1] = seq;
    buf
}

#[tokio::test]
async fn file_io_round_trip_and_in_place_rewrite() {
    let path = test_file_path("file_io");
    let mut transport = FileTransport::open(&path).await;

    let packets: Vec<Vec<u8>> = (0..16u8).map(|i| raw_packet(i, i.wrapping_mul(7))).collect();
    for (i, bytes) in packets.iter().enumerate() {
        let dummy = Pktd::new(i as u64, avtransport::packet::Packet::Eos);
        transport.write_pkt(&dummy, bytes, None).await.unwrap();
    }
    transport.flush(None).await.unwrap();

    transport.seek(0).await.unwrap();
    for expected in &packets {
        let (buf, _) = transport.read_input(384, None).await.unwrap();
        assert_eq!(buf.data(), expected.as_slice());
    }

    let inverted: Vec<u8> = packets[0].iter().map(|b| !b).collect();
    transport.seek(0).await.unwrap();
    let dummy = Pktd::new(0, avtransport::packet::Packet::Eos);
    transport.write_pkt(&dummy, &inverted, None).await.unwrap();

    transport.seek(0).await.unwrap();
    let (buf, _) = transport.read_input(384, None).await.unwrap();
    assert_eq!(buf.data(), inverted.as_slice());

    transport.close().await.unwrap();
    let _ = tokio::fs::remove_file(&path).await;
}

struct UdpTransport {
    socket: UdpSocket,
}

#[async_trait]
impl Transport for UdpTransport {
    async fn max_pkt_len(&self) -> u32 {
        1376
    }

    async fn write_pkt(&mut self, _pkt: &Pktd, header: &[u8], _timeout: Option<Duration>) -> Result<u64> {
        let n = self.socket.send(header).await.map_err(Error::Os)?;
        Ok(n as u64)
    }

    async fn read_input(&mut self, len: usize, _timeout: Option<Duration>) -> Result<(Buffer, u64)> {
        let mut buf = vec![0u8; len];
        let n = self.socket.recv(&mut buf).await.map_err(Error::Os)?;
        buf.truncate(n);
        Ok((Buffer::from_vec(buf), n as u64))
    }

    async fn flush(&mut self, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn udp_loopback_each_packet_matches_exactly_one_sent() {
    let listener_sock = UdpSocket::bind("[::1]:0").await.unwrap();
    let listener_addr = listener_sock.local_addr().unwrap();

    let sender_sock = UdpSocket::bind("[::1]:0").await.unwrap();
    sender_sock.connect(listener_addr).await.unwrap();
    listener_sock.connect(sender_sock.local_addr().unwrap()).await.unwrap();

    let mut sender = UdpTransport { socket: sender_sock };
    let mut listener = UdpTransport { socket: listener_sock };

    let packets: Vec<Vec<u8>> = (0..16u8)
        .map(|i| raw_packet(i, i.wrapping_mul(31).wrapping_add(5)))
        .collect();

    let sender_task = tokio::spawn(async move {
        let batch: Vec<(Pktd, Vec<u8>)> = packets
            .iter()
            .map(|bytes| (Pktd::new(0, avtransport::packet::Packet::Eos), bytes.clone()))
            .collect();
        sender.write_vec(&batch, None).await.unwrap();
        packets
    });

    let mut received = Vec::new();
    for _ in 0..16 {
        let (buf, _) = listener.read_input(1376, Some(Duration::from_secs(5))).await.unwrap();
        received.push(buf.data().to_vec());
    }

    let sent = sender_task.await.unwrap();
    assert_eq!(received.len(), sent.len());
    for got in &received {
        assert!(sent.iter().any(|s| s == got), "received packet not found among sent packets");
    }
}
