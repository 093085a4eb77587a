pub mod json;
pub mod pretty;
pub mod tsv;

use std::io::Write;

use crate::cli::OutputFormat;
use crate::error::FlowtapError;
use crate::packet::{DecodeStats, FlowRecord};

/// Write whatever the format emits before the first record.
///
/// Only TSV has a preamble (the header row).
pub fn write_preamble(format: OutputFormat, writer: &mut impl Write) -> Result<(), FlowtapError> {
    match format {
        OutputFormat::Tsv => tsv::write_header(writer),
        OutputFormat::Json | OutputFormat::Pretty => Ok(()),
    }
}

/// Write one flow record in the specified format.
pub fn write_record(
    record: &FlowRecord,
    format: OutputFormat,
    writer: &mut impl Write,
) -> Result<(), FlowtapError> {
    match format {
        OutputFormat::Tsv => tsv::write_record(record, writer),
        OutputFormat::Json => json::write_record(record, writer),
        OutputFormat::Pretty => pretty::write_record(record, writer),
    }
}

/// Write the closing tally. Machine formats stay records-only.
pub fn write_summary(
    stats: &DecodeStats,
    format: OutputFormat,
    writer: &mut impl Write,
) -> Result<(), FlowtapError> {
    match format {
        OutputFormat::Pretty => pretty::write_summary(stats, writer),
        OutputFormat::Tsv | OutputFormat::Json => Ok(()),
    }
}
