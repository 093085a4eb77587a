use std::io::Write;

use crate::error::FlowtapError;
use crate::packet::FlowRecord;

/// Write the TSV header row.
///
/// Columns are tab-separated: src_addr, src_port, dst_addr, dst_port,
/// payload_offset, payload_len.
pub fn write_header(writer: &mut impl Write) -> Result<(), FlowtapError> {
    writeln!(
        writer,
        "src_addr\tsrc_port\tdst_addr\tdst_port\tpayload_offset\tpayload_len"
    )
    .map_err(FlowtapError::Serialization)
}

/// Write one flow record as a TSV row.
pub fn write_record(record: &FlowRecord, writer: &mut impl Write) -> Result<(), FlowtapError> {
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}",
        record.src_addr,
        record.src_port,
        record.dst_addr,
        record.dst_port,
        record.payload_offset,
        record.payload_len,
    )
    .map_err(FlowtapError::Serialization)
}
