/// Detector configuration.
///
/// Built from the compiled-in defaults. The device never changes it at runtime;
/// tests build their own to shorten delays.
use crate::board;
use crate::defaults;
use crate::peer::Peer;

#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Delay between consuming a trigger and the first capture (ms).
    pub settle_delay_ms: u32,
    /// Minimum winning score for a classification to count as a gesture.
    pub min_confidence: f32,
    /// Tensor arena size requested from the inference backend.
    pub arena_size: usize,
    /// Peer that receives run notifications.
    pub peer: Peer,
    /// Arm a run locally every N seconds. `None` = only remote or serial triggers.
    pub auto_trigger_secs: Option<u32>,
}

impl DetectorConfig {
    pub const fn new() -> Self {
        Self {
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            min_confidence: defaults::MIN_CONFIDENCE,
            arena_size: board::TENSOR_ARENA_SIZE,
            peer: defaults::PEER,
            auto_trigger_secs: None,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::new()
    }
}
