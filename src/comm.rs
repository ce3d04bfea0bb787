/// Serial transport helpers: NDJSON encode/decode and line framing.
///
/// The device prints `DeviceMessage`s as newline-delimited JSON on the console
/// and accepts `HostCommand`s on the same port.
use crate::protocol::{DeviceMessage, HostCommand, MsgBuffer, RawCommand, MAX_MSG_LEN};

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into a fresh [`MsgBuffer`] sized to the encoded line.
pub fn encode_message(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok()?;
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "trigger" => Some(HostCommand::Trigger),
        "classify" => Some(HostCommand::Classify),
        "status" => Some(HostCommand::GetStatus),
        _ => None,
    }
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Longest command line accepted.
const MAX_LINE_LEN: usize = 64;

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
/// A line longer than the buffer is dropped whole, up to its newline.
pub struct LineReader {
    buf: [u8; MAX_LINE_LEN],
    pos: usize,
    discarding: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_LINE_LEN],
            pos: 0,
            discarding: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.discarding {
                self.discarding = false;
                self.pos = 0;
                None
            } else if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.discarding {
            None
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: drop the rest of this line
            self.pos = 0;
            self.discarding = true;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && (data[end - 1] == b' ' || data[end - 1] == b'\n' || data[end - 1] == b'\r' || data[end - 1] == b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_commands() {
        assert_eq!(parse_command(br#"{"cmd":"trigger"}"#), Some(HostCommand::Trigger));
        assert_eq!(parse_command(br#"{"cmd":"classify"}"#), Some(HostCommand::Classify));
        assert_eq!(parse_command(br#"{"cmd":"status"}"#), Some(HostCommand::GetStatus));
    }

    #[test]
    fn parse_tolerates_trailing_whitespace() {
        assert_eq!(
            parse_command(b"{\"cmd\":\"trigger\"} \r\n"),
            Some(HostCommand::Trigger)
        );
    }

    #[test]
    fn parse_rejects_unknown_and_garbage() {
        assert_eq!(parse_command(br#"{"cmd":"reboot"}"#), None);
        assert_eq!(parse_command(b"not json"), None);
        assert_eq!(parse_command(b"   \n"), None);
    }

    #[test]
    fn line_reader_splits_on_newline() {
        let mut reader = LineReader::new();
        let mut lines = 0;
        for &b in b"{\"cmd\":\"status\"}\r\n\n{\"cmd\":\"trigger\"}\n" {
            if let Some(line) = reader.feed(b) {
                assert!(parse_command(line).is_some());
                lines += 1;
            }
        }
        assert_eq!(lines, 2);
    }

    #[test]
    fn line_reader_drops_overlong_line_whole() {
        let mut reader = LineReader::new();
        for _ in 0..MAX_LINE_LEN + 1 {
            assert!(reader.feed(b'x').is_none());
        }
        // The tail of an overlong line must not run as a command.
        for &b in br#"{"cmd":"trigger"}"# {
            assert!(reader.feed(b).is_none());
        }
        assert_eq!(reader.feed(b'\n'), None);

        let mut parsed = None;
        for &b in b"{\"cmd\":\"status\"}\n" {
            if let Some(line) = reader.feed(b) {
                parsed = parse_command(line);
            }
        }
        assert_eq!(parsed, Some(HostCommand::GetStatus));
    }

    #[test]
    fn line_reader_accepts_line_of_exact_capacity() {
        let mut reader = LineReader::new();
        for _ in 0..MAX_LINE_LEN {
            assert!(reader.feed(b'y').is_none());
        }
        assert_eq!(reader.feed(b'\n').map(|l| l.len()), Some(MAX_LINE_LEN));
    }

    #[test]
    fn encode_message_ends_with_newline() {
        let msg = DeviceMessage::Status {
            state: "running",
            runs: 0,
            capture_failures: 0,
            inference_failures: 0,
            sends_ok: 0,
            sends_failed: 0,
            uptime: 1,
            heap_free: 1,
            board: "b",
            version: "0.1.0",
        };
        let buf = encode_message(&msg).unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));
        assert!(buf.starts_with(b"{\"type\":\"status\""));
    }
}
