/// Compiled-in constants for the gesture model, the detection run, and the
/// notification peer.
///
/// Everything here is fixed at build time. Changing the model means changing
/// the frame format, the labels, and the operator list together.
use crate::frame::FrameFormat;
use crate::model::Op;
use crate::peer::Peer;

/// Camera frame fed to the model: 96×96 grayscale.
pub const FRAME_FORMAT: FrameFormat = FrameFormat {
    width: 96,
    height: 96,
    channels: 1,
};

/// Bytes in one raw frame.
pub const FRAME_LEN: usize = FRAME_FORMAT.len();

/// Number of gesture categories the model scores.
pub const CATEGORY_COUNT: usize = 4;

/// Category labels, in model output order.
pub static CATEGORY_LABELS: [&str; CATEGORY_COUNT] = ["background", "fist", "open_palm", "thumbs_up"];

/// Successful classifications that make up one run.
pub const RUN_LENGTH: usize = 5;

/// Pause between consuming a trigger and the first capture.
pub const SETTLE_DELAY_MS: u32 = 7000;

/// Winning scores below this produce [`crate::responder::NO_DETECTION`].
pub const MIN_CONFIDENCE: f32 = 0.6;

/// TFLite flatbuffer schema version the bundled interpreter understands.
pub const SCHEMA_VERSION: u32 = 3;

/// Peer that receives run notifications (the feather board).
pub const PEER: Peer = Peer {
    addr: [0x30, 0xAE, 0xA4, 0x1B, 0x93, 0xF4],
    // 0 = whatever channel the station interface is on
    channel: 0,
};

/// Kernels the gesture model graph needs. Registering only these keeps the
/// interpreter's code size down.
pub static MODEL_OPS: [Op; 11] = [
    Op::Quantize,
    Op::Reshape,
    Op::FullyConnected,
    Op::Softmax,
    Op::Dequantize,
    Op::Mean,
    Op::Conv2D,
    Op::DepthwiseConv2D,
    Op::MaxPool2D,
    Op::Mul,
    Op::Add,
];

/// Capacity of the operator resolver.
pub const MAX_OPS: usize = 11;
