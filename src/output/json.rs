use std::io::Write;

use crate::error::FlowtapError;
use crate::packet::FlowRecord;

/// Write one flow record as a single JSON object on its own line (NDJSON).
pub fn write_record(record: &FlowRecord, writer: &mut impl Write) -> Result<(), FlowtapError> {
    serde_json::to_writer(&mut *writer, record)
        .map_err(|e| FlowtapError::Serialization(std::io::Error::other(e.to_string())))?;
    writeln!(writer).map_err(FlowtapError::Serialization)
}
