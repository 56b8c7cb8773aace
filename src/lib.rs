#![doc(html_root_url = "https://docs.rs/avtransport/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # avtransport
//!
//! `avtransport` is a reference implementation of the AVTransport packet
//! pipeline: the code path that turns a caller-supplied logical packet into
//! a sequence of on-wire packets, and back again.
//!
//! It covers the parts of the protocol that carry all of its non-trivial
//! invariants — ordering, sequence-number allocation, MTU-aware
//! fragmentation, header reconstruction from damaged segments, zero-copy
//! buffer references, and deterministic reassembly under packet loss or
//! reordering — while treating concrete I/O back-ends (files, sockets,
//! QUIC) and forward error correction as interfaces the core consumes
//! rather than things it implements.
//!
//! ## Quick start
//!
//! ```rust
//! use avtransport::address::Address;
//! use avtransport::scheduler::{Bandwidth, Scheduler};
//!
//! # fn main() -> avtransport::Result<()> {
//! let addr = Address::parse("udp://239.1.1.1:5000")?;
//! let mut scheduler = Scheduler::new(1376, Bandwidth::Unlimited);
//! let _ = addr;
//! let _ = &mut scheduler;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module overview
//!
//! - [`buffer`]: ref-counted, sliceable byte buffer
//! - [`packet`]: packet descriptors and the bytestream codec
//! - [`fec`]: the LDPC-shaped forward-error-correction interface
//! - [`address`]: URL parsing into a connection address
//! - [`merger`]: segment reassembly, including partial-header recovery
//! - [`scheduler`]: bandwidth-aware multi-stream interleaving scheduler
//! - [`fifo`]: the owned packet queue shared between pipeline stages
//! - [`connection`]: the send/receive glue tying the above to a [`transport::Transport`]
//! - [`reorder`]: optional out-of-order datagram staging
//! - [`transport`]: the narrow I/O vtable the core consumes
//! - [`rational`]: timebase/rescale arithmetic shared by several packet fields
//! - [`bitrate`]: sliding-window achieved-bitrate tracking
//! - [`error`]: the library's error kinds
//! - [`config`]: process-wide defaults, overridable via environment variables

/// Address/URL parsing.
pub mod address;

/// Sliding-window achieved-bitrate tracking.
pub mod bitrate;

/// Ref-counted, sliceable byte buffers.
pub mod buffer;

/// Process-wide configuration defaults.
pub mod config;

/// Connection pipeline: caller packet <-> scheduler/merger <-> transport.
pub mod connection;

/// Error types and utilities.
pub mod error;

/// Forward error correction over packet headers.
pub mod fec;

/// Packet FIFO used between pipeline stages.
pub mod fifo;

/// Segment merger / reassembly engine.
pub mod merger;

/// Packet descriptors, the `Pktd` unit, and the bytestream codec.
pub mod packet;

/// Rational numbers for timebases and rescaling.
pub mod rational;

/// Out-of-order datagram reordering ahead of the merger.
pub mod reorder;

/// Bandwidth-aware multi-stream scheduler.
pub mod scheduler;

/// The transport vtable the core consumes.
pub mod transport;

pub use error::{Error, Result};
