//! One-time device bring-up.
//!
//! Order matters and is fixed: memory check, radio, peer, model, arena,
//! operators, engine, tensors, input binding, camera. The first failure is
//! logged and returned; the caller leaves the device idle instead of
//! starting the detection loop.
use core::fmt;

use crate::config::DetectorConfig;
use crate::controller::DetectionController;
use crate::defaults::{CATEGORY_COUNT, FRAME_LEN, MAX_OPS, MODEL_OPS, SCHEMA_VERSION};
use crate::frame::{AcquireError, FrameSource};
use crate::inference::{AllocError, BuildError, Engine, InferenceBackend, TensorError};
use crate::model::{Model, OpResolver, OpResolverError, SchemaError};
use crate::peer::{PeerRegistry, RegistrationError};
use crate::radio::{InitError, RadioContext, RadioTransport};
use crate::responder::DetectionResponder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    NoExtendedMemory { available: usize, required: usize },
    RadioInit(InitError),
    PeerRegistration(RegistrationError),
    Schema(SchemaError),
    Arena(AllocError),
    Ops(OpResolverError),
    EngineBuild(BuildError),
    Tensors(TensorError),
    InputShape { expected: usize, found: usize },
    OutputShape { expected: usize, found: usize },
    FrameSource(AcquireError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::NoExtendedMemory { available, required } => write!(
                f,
                "PSRAM not found or too small ({} bytes, need {})",
                available, required
            ),
            StartupError::RadioInit(e) => write!(f, "radio: {}", e),
            StartupError::PeerRegistration(e) => write!(f, "peer: {}", e),
            StartupError::Schema(e) => write!(f, "model: {}", e),
            StartupError::Arena(e) => write!(f, "arena: {}", e),
            StartupError::Ops(e) => write!(f, "ops: {}", e),
            StartupError::EngineBuild(e) => write!(f, "engine: {}", e),
            StartupError::Tensors(e) => write!(f, "{}", e),
            StartupError::InputShape { expected, found } => {
                write!(f, "input tensor holds {} elements, frame has {}", found, expected)
            }
            StartupError::OutputShape { expected, found } => {
                write!(f, "output tensor holds {} scores, need {}", found, expected)
            }
            StartupError::FrameSource(e) => write!(f, "InitCamera failed: {}", e),
        }
    }
}

/// Platform services handed to [`bring_up`]. Consumed by the controller.
pub struct Collaborators<B, R, F, D> {
    pub backend: B,
    pub radio: R,
    pub frames: F,
    pub responder: D,
}

/// Bring the device up and return a controller ready to poll.
///
/// `extended_memory` is the external RAM size reported by the platform.
pub fn bring_up<'a, B, R, F, D>(
    parts: Collaborators<B, R, F, D>,
    extended_memory: usize,
    model_bytes: &'static [u8],
    ctx: &'a RadioContext,
    config: DetectorConfig,
) -> Result<DetectionController<'a, B::Engine, F, D, R>, StartupError>
where
    B: InferenceBackend,
    R: RadioTransport,
    F: FrameSource,
    D: DetectionResponder,
{
    let Collaborators {
        mut backend,
        mut radio,
        mut frames,
        responder,
    } = parts;

    if extended_memory < config.arena_size {
        return Err(halt(StartupError::NoExtendedMemory {
            available: extended_memory,
            required: config.arena_size,
        }));
    }

    radio.init().map_err(|e| halt(StartupError::RadioInit(e)))?;
    log::info!("Radio link up");

    let mut registry = PeerRegistry::new(config.peer);
    registry
        .register(&mut radio)
        .map_err(|e| halt(StartupError::PeerRegistration(e)))?;

    let model = Model::load(model_bytes, SCHEMA_VERSION).map_err(|e| halt(StartupError::Schema(e)))?;
    log::info!("Model loaded: {} bytes, schema v{}", model_bytes.len(), model.version());

    let arena = backend
        .allocate_arena(config.arena_size)
        .map_err(|e| halt(StartupError::Arena(e)))?;

    let ops = OpResolver::<MAX_OPS>::from_ops(&MODEL_OPS).map_err(|e| halt(StartupError::Ops(e)))?;

    let mut engine = backend
        .build(model, &ops, arena)
        .map_err(|e| halt(StartupError::EngineBuild(e)))?;

    engine
        .allocate_tensors()
        .map_err(|e| halt(StartupError::Tensors(e)))?;

    let input_len = engine.input_tensor().len();
    if input_len != FRAME_LEN {
        return Err(halt(StartupError::InputShape {
            expected: FRAME_LEN,
            found: input_len,
        }));
    }
    let output_len = engine.output_tensor().len();
    if output_len < CATEGORY_COUNT {
        return Err(halt(StartupError::OutputShape {
            expected: CATEGORY_COUNT,
            found: output_len,
        }));
    }
    log::info!(
        "Engine ready: {} KiB arena, {} ops",
        config.arena_size / 1024,
        ops.ops().len()
    );

    frames.init().map_err(|e| halt(StartupError::FrameSource(e)))?;
    log::info!("Camera ready");

    Ok(DetectionController::new(
        engine, frames, responder, radio, registry, ctx, config,
    ))
}

fn halt(e: StartupError) -> StartupError {
    log::error!("Startup halted: {}", e);
    e
}
