/// Wire formats.
///
/// Two protocols live here:
/// - the fixed binary [`NotificationPayload`] sent to the peer over the radio
///   when a run completes;
/// - the NDJSON serial protocol (`DeviceMessage` out, `HostCommand` in) used
///   by a host on the USB console. Uses `heapless` types for no_std/no-alloc
///   operation.
use core::fmt;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::defaults::RUN_LENGTH;
use crate::responder::OutcomeCode;

// ── Radio notification ─────────────────────────────────────────────────

/// First byte of every notification.
pub const PAYLOAD_MAGIC: u8 = 0x47;

/// Notification layout version.
pub const PAYLOAD_VERSION: u8 = 1;

/// Header bytes before the outcome codes.
const PAYLOAD_HEADER_LEN: usize = 4;

/// Encoded notification size. Always the same, whatever the codes are.
pub const PAYLOAD_LEN: usize = PAYLOAD_HEADER_LEN + RUN_LENGTH;

/// Run-complete notification.
///
/// ```text
/// 0      1        2    3          4 .. 4+RUN_LENGTH
/// magic  version  seq  run_len    outcome codes, capture order
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPayload {
    /// Run counter, wraps at 256.
    pub seq: u8,
    pub codes: [OutcomeCode; RUN_LENGTH],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    Length(usize),
    Magic(u8),
    Version(u8),
    RunLength(u8),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Length(n) => write!(f, "payload is {} bytes, expected {}", n, PAYLOAD_LEN),
            PayloadError::Magic(m) => write!(f, "bad payload magic 0x{:02X}", m),
            PayloadError::Version(v) => write!(f, "unsupported payload version {}", v),
            PayloadError::RunLength(n) => write!(f, "run length {} != {}", n, RUN_LENGTH),
        }
    }
}

impl NotificationPayload {
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let mut buf = [0u8; PAYLOAD_LEN];
        buf[0] = PAYLOAD_MAGIC;
        buf[1] = PAYLOAD_VERSION;
        buf[2] = self.seq;
        buf[3] = RUN_LENGTH as u8;
        buf[PAYLOAD_HEADER_LEN..].copy_from_slice(&self.codes);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        if data.len() != PAYLOAD_LEN {
            return Err(PayloadError::Length(data.len()));
        }
        if data[0] != PAYLOAD_MAGIC {
            return Err(PayloadError::Magic(data[0]));
        }
        if data[1] != PAYLOAD_VERSION {
            return Err(PayloadError::Version(data[1]));
        }
        if data[3] as usize != RUN_LENGTH {
            return Err(PayloadError::RunLength(data[3]));
        }
        let mut codes = [0; RUN_LENGTH];
        codes.copy_from_slice(&data[PAYLOAD_HEADER_LEN..]);
        Ok(Self { seq: data[2], codes })
    }
}

// ── Serial NDJSON ──────────────────────────────────────────────────────

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Messages sent from the device to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// One classification inside a run
    #[serde(rename = "detection")]
    Detection {
        /// Position in the run (0-based)
        idx: u8,
        code: OutcomeCode,
        /// Winning label, absent for no-detection
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<&'static str>,
        score: f32,
        /// Inference time in microseconds, when measured
        #[serde(skip_serializing_if = "Option::is_none")]
        us: Option<u32>,
        /// Uptime in milliseconds when captured
        ts: u32,
    },
    /// Run completed and handed to the radio
    #[serde(rename = "run")]
    Run {
        seq: u8,
        codes: &'a [OutcomeCode],
        /// Whether the radio accepted the notification
        sent: bool,
        /// Failed capture/inference attempts during the run
        retries: u32,
        ts: u32,
    },
    /// Single-shot classification result
    #[serde(rename = "classify")]
    Classify {
        code: OutcomeCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<&'static str>,
        scores: &'a [f32],
        #[serde(skip_serializing_if = "Option::is_none")]
        us: Option<u32>,
        ts: u32,
    },
    /// Device status report
    #[serde(rename = "status")]
    Status {
        /// Controller state: "idle", "armed", "running", "notifying"
        state: &'static str,
        runs: u32,
        capture_failures: u32,
        inference_failures: u32,
        sends_ok: u32,
        sends_failed: u32,
        /// Uptime in seconds
        uptime: u32,
        /// Free heap in bytes
        heap_free: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Commands sent from the host to the device.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostCommand {
    /// Arm a run, same as a trigger from the peer
    Trigger,
    /// Capture and classify one frame outside the run flow
    Classify,
    /// Request current status
    GetStatus,
}

/// Wire format for host commands: flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: heapless::String<16>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = heapless::Vec<u8, MAX_MSG_LEN>;
