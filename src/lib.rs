//! TCP/IPv4 flow extraction from raw Ethernet frames.
//!
//! The decision core lives in [`packet`]: one captured frame goes in, and a
//! [`Verdict`] (a flow record or a reason to skip) or a [`ParseError`] comes
//! out. [`capture`] feeds it live frames from an AF_PACKET socket on Linux;
//! [`replay`] feeds it recorded frames from hex dumps.

pub mod capture;
pub mod cli;
pub mod error;
pub mod output;
pub mod packet;
pub mod replay;

pub use error::FlowtapError;
pub use packet::{decode_frame, DecodeStats, FlowRecord, FrameReader, ParseError, SkipReason, Verdict};
