use std::io::Write;

use crate::error::FlowtapError;
use crate::packet::{DecodeStats, FlowRecord};

// Widest endpoint is "255.255.255.255:65535".
const ENDPOINT_WIDTH: usize = 21;

/// Write one flow record as a human-readable line.
///
/// Endpoints are padded to a fixed width so a stream of records lines up
/// into columns.
pub fn write_record(record: &FlowRecord, writer: &mut impl Write) -> Result<(), FlowtapError> {
    write_record_inner(record, writer).map_err(FlowtapError::Serialization)
}

fn write_record_inner(record: &FlowRecord, w: &mut impl Write) -> Result<(), std::io::Error> {
    writeln!(
        w,
        "TCP {:<width$} -> {:<width$}  payload {} B @ {}",
        format!("{}:{}", record.src_addr, record.src_port),
        format!("{}:{}", record.dst_addr, record.dst_port),
        record.payload_len,
        record.payload_offset,
        width = ENDPOINT_WIDTH,
    )
}

/// Write the closing tally of everything seen on the stream.
pub fn write_summary(stats: &DecodeStats, writer: &mut impl Write) -> Result<(), FlowtapError> {
    write_summary_inner(stats, writer).map_err(FlowtapError::Serialization)
}

fn write_summary_inner(stats: &DecodeStats, w: &mut impl Write) -> Result<(), std::io::Error> {
    writeln!(w, "{}", "-".repeat(72))?;
    writeln!(
        w,
        "{} frames: {} flows, {} not IPv4, {} fragments, {} not TCP, \
         {} malformed, {} truncated",
        stats.frames,
        stats.flows,
        stats.not_ipv4,
        stats.fragments,
        stats.not_tcp,
        stats.malformed,
        stats.out_of_bounds,
    )
}
