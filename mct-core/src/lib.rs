//! Core primitives for the MCT log and trace infrastructure.
//!
//! # Overview
//!
//! MCT collects structured log and trace messages from many applications on
//! a host, multiplexes them into a single stream, and forwards that stream
//! to external receivers or on-disk storage. This crate contains the pieces
//! that the client library and the daemon must agree on bit-exactly:
//!
//! - the [wire codec][crate::header]: storage, standard, extra, and
//!   extended headers, plus the [typed argument payload][crate::payload];
//! - the [control-frame codec][crate::control] spoken over the local IPC
//!   channel between a logging process and the daemon;
//! - the framed byte [ring][crate::ring] used as the in-process overflow
//!   buffer and as the daemon's per-client buffer.
//!
//! This crate performs no I/O and holds no process-wide state; the
//! user-facing logging pipeline lives in the `mct` crate.
//!
//! # Wire format
//!
//! A message on the wire is layered as
//!
//! ```text
//! [storage header] standard header [extras] [extended header] payload
//! ```
//!
//! where the storage header appears only in on-disk files, and the extras
//! and extended header are selected by bits of the standard header's `htyp`
//! byte. Multi-byte fields in the standard and extended headers and in the
//! payload are big-endian when the `MSBF` bit of `htyp` is set and
//! little-endian otherwise; the standard header's length field is always
//! big-endian.
pub mod control;
pub mod header;
pub mod ident;
pub mod level;
pub mod message;
pub mod payload;
pub mod ring;

mod endian;
mod error;

pub use self::error::Error;
pub use self::ident::Id4;
pub use self::level::{LogLevel, TraceStatus};

/// A specialized `Result` type for codec and ring operations.
pub type Result<T> = core::result::Result<T, Error>;
