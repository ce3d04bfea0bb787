/// Inference service boundary.
///
/// The interpreter, its kernels and the arena allocator are platform code.
/// The library only sees an [`InferenceBackend`] that hands out one arena and
/// one [`Engine`] during startup, and the engine's tensors afterwards.
use core::fmt;

use crate::defaults::CATEGORY_COUNT;
use crate::model::{Model, OpResolver};

/// One score per category, in label order.
pub type Scores = [f32; CATEGORY_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    pub size: usize,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "couldn't allocate memory of {} bytes", self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// The graph uses a kernel the resolver does not provide.
    MissingOp,
    Interpreter(i32),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MissingOp => write!(f, "model needs an unregistered op"),
            BuildError::Interpreter(code) => write!(f, "interpreter init failed ({})", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorError;

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllocateTensors() failed")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeError;

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invoke failed")
    }
}

/// Mutable view of the model's input tensor.
pub enum InputTensor<'a> {
    /// Quantized model: signed 8-bit pixels.
    Int8(&'a mut [i8]),
    /// Float model: pixels scaled to [-1, 1].
    Float32(&'a mut [f32]),
}

impl InputTensor<'_> {
    pub fn len(&self) -> usize {
        match self {
            InputTensor::Int8(t) => t.len(),
            InputTensor::Float32(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A built interpreter bound to its arena.
pub trait Engine {
    fn allocate_tensors(&mut self) -> Result<(), TensorError>;
    fn input_tensor(&mut self) -> InputTensor<'_>;
    fn invoke(&mut self) -> Result<(), InvokeError>;
    fn output_tensor(&self) -> &[f32];

    /// Wall time of the last successful `invoke`, in microseconds, for
    /// engines that can measure it.
    fn last_invoke_us(&self) -> Option<u32> {
        None
    }
}

/// Creates the arena and the engine. Used once, during startup.
pub trait InferenceBackend {
    type Arena;
    type Engine: Engine;

    fn allocate_arena(&mut self, size: usize) -> Result<Self::Arena, AllocError>;

    fn build<const N: usize>(
        &mut self,
        model: Model<'static>,
        ops: &OpResolver<N>,
        arena: Self::Arena,
    ) -> Result<Self::Engine, BuildError>;
}

/// Copy raw unsigned pixels into the input tensor, converting to the tensor's
/// element type. Extra elements on either side are left untouched.
pub fn fill_input(tensor: InputTensor<'_>, pixels: &[u8]) {
    match tensor {
        InputTensor::Int8(dst) => {
            for (d, &p) in dst.iter_mut().zip(pixels) {
                *d = (p as i16 - 128) as i8;
            }
        }
        InputTensor::Float32(dst) => {
            for (d, &p) in dst.iter_mut().zip(pixels) {
                *d = p as f32 / 127.5 - 1.0;
            }
        }
    }
}

/// Copy the first [`CATEGORY_COUNT`] outputs. Missing outputs read as 0.
pub fn read_scores(output: &[f32]) -> Scores {
    let mut scores = [0.0; CATEGORY_COUNT];
    for (s, &o) in scores.iter_mut().zip(output) {
        *s = o;
    }
    scores
}
