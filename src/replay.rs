// Recorded-frame input: hex dumps, one frame per line.
//
// The accepted format is what `xxd -p` and tcpdump post-processing tend to
// produce: an even run of hex digits, optionally broken up by internal
// whitespace. Blank lines and lines starting with '#' are skipped. A line
// that is not valid hex aborts the whole read; the error carries the
// 1-based line number of the offender.

use std::io::BufRead;

use crate::error::FlowtapError;

/// Read hex-encoded frames from `reader`, one frame per line.
pub fn read_hex_frames(reader: impl BufRead) -> Result<Vec<Vec<u8>>, FlowtapError> {
    let mut frames = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(FlowtapError::Input)?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        frames.push(decode_hex_line(trimmed, line_no)?);
    }
    Ok(frames)
}

fn decode_hex_line(line: &str, line_no: usize) -> Result<Vec<u8>, FlowtapError> {
    let digits: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(FlowtapError::FrameRecord {
            line: line_no,
            detail: format!("odd number of hex digits ({})", digits.len()),
        });
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let hi = hex_value(pair[0]).ok_or_else(|| bad_digit(pair[0], line_no))?;
        let lo = hex_value(pair[1]).ok_or_else(|| bad_digit(pair[1], line_no))?;
        bytes.push((hi << 4) | lo);
    }
    Ok(bytes)
}

fn hex_value(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

fn bad_digit(c: char, line_no: usize) -> FlowtapError {
    FlowtapError::FrameRecord {
        line: line_no,
        detail: format!("'{c}' is not a hex digit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn ut_6_1_single_frame() {
        let frames = read_hex_frames(Cursor::new("080045")).unwrap();
        assert_eq!(frames, vec![vec![0x08, 0x00, 0x45]]);
    }

    #[test]
    fn ut_6_2_internal_whitespace() {
        let frames = read_hex_frames(Cursor::new("08 00  45\t00")).unwrap();
        assert_eq!(frames, vec![vec![0x08, 0x00, 0x45, 0x00]]);
    }

    #[test]
    fn ut_6_3_comments_and_blank_lines_skipped() {
        let input = "# syn from client\n\nDEAD\n   \n# trailing comment\nBEEF\n";
        let frames = read_hex_frames(Cursor::new(input)).unwrap();
        assert_eq!(frames, vec![vec![0xDE, 0xAD], vec![0xBE, 0xEF]]);
    }

    #[test]
    fn ut_6_4_odd_digit_count() {
        let err = read_hex_frames(Cursor::new("# header\n\nABC")).unwrap_err();
        match err {
            FlowtapError::FrameRecord { line, detail } => {
                // Line numbers count raw input lines, comments included.
                assert_eq!(line, 3);
                assert!(detail.contains("odd number"));
            }
            other => panic!("expected FrameRecord, got {other:?}"),
        }
    }

    #[test]
    fn ut_6_5_bad_digit() {
        let err = read_hex_frames(Cursor::new("08g0")).unwrap_err();
        match err {
            FlowtapError::FrameRecord { line, detail } => {
                assert_eq!(line, 1);
                assert!(detail.contains("'g'"));
            }
            other => panic!("expected FrameRecord, got {other:?}"),
        }
    }

    #[test]
    fn ut_6_6_empty_input() {
        let frames = read_hex_frames(Cursor::new("")).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn ut_6_7_case_insensitive() {
        let upper = read_hex_frames(Cursor::new("DEADBEEF")).unwrap();
        let lower = read_hex_frames(Cursor::new("deadbeef")).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn ut_6_8_crlf_line_endings() {
        let frames = read_hex_frames(Cursor::new("0800\r\n4500\r\n")).unwrap();
        assert_eq!(frames, vec![vec![0x08, 0x00], vec![0x45, 0x00]]);
    }

    #[test]
    fn ut_6_9_error_message_names_line() {
        let err = read_hex_frames(Cursor::new("0800\nzz\n")).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
