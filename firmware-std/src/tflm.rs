//! TensorFlow Lite Micro engine, driven through the `tflm_bridge` component.
//!
//! The arena comes from external RAM and lives as long as the engine, which
//! in practice is the life of the device.

use core::ptr::NonNull;

use esp_idf_svc::sys::tflm;
use esp_idf_svc::sys::{
    esp_timer_get_time, heap_caps_aligned_alloc, heap_caps_free, MALLOC_CAP_8BIT, MALLOC_CAP_SPIRAM,
};

use gesturecam::inference::{
    AllocError, BuildError, Engine, InferenceBackend, InputTensor, InvokeError, TensorError,
};
use gesturecam::model::{Model, OpResolver};

/// TFLM requires 16-byte aligned tensor arenas.
const ARENA_ALIGN: usize = 16;

// Bridge status codes, see tflm_bridge.h
const TFLM_OK: i32 = 0;
const TFLM_ERR_MISSING_OP: i32 = -2;

pub struct PsramArena {
    ptr: NonNull<u8>,
    len: usize,
}

impl Drop for PsramArena {
    fn drop(&mut self) {
        unsafe { heap_caps_free(self.ptr.as_ptr().cast()) };
    }
}

pub struct TflmBackend;

impl InferenceBackend for TflmBackend {
    type Arena = PsramArena;
    type Engine = TflmEngine;

    fn allocate_arena(&mut self, size: usize) -> Result<PsramArena, AllocError> {
        let raw = unsafe {
            heap_caps_aligned_alloc(ARENA_ALIGN, size, MALLOC_CAP_SPIRAM | MALLOC_CAP_8BIT)
        };
        let ptr = NonNull::new(raw.cast::<u8>()).ok_or(AllocError { size })?;
        log::info!("Tensor arena: {} KiB in PSRAM", size / 1024);
        Ok(PsramArena { ptr, len: size })
    }

    fn build<const N: usize>(
        &mut self,
        model: Model<'static>,
        ops: &OpResolver<N>,
        arena: PsramArena,
    ) -> Result<TflmEngine, BuildError> {
        let mut handle: *mut tflm::tflm_bridge_t = core::ptr::null_mut();
        let rc = unsafe {
            tflm::tflm_bridge_create(
                model.bytes().as_ptr(),
                arena.ptr.as_ptr(),
                arena.len,
                ops.mask(),
                &mut handle,
            )
        };
        match rc {
            TFLM_OK => {}
            TFLM_ERR_MISSING_OP => return Err(BuildError::MissingOp),
            code => return Err(BuildError::Interpreter(code)),
        }
        let handle = NonNull::new(handle).ok_or(BuildError::Interpreter(rc))?;
        Ok(TflmEngine {
            handle,
            last_invoke_us: None,
            _arena: arena,
        })
    }
}

pub struct TflmEngine {
    handle: NonNull<tflm::tflm_bridge_t>,
    last_invoke_us: Option<u32>,
    // Referenced by the interpreter; must outlive it.
    _arena: PsramArena,
}

impl Engine for TflmEngine {
    fn allocate_tensors(&mut self) -> Result<(), TensorError> {
        match unsafe { tflm::tflm_bridge_allocate_tensors(self.handle.as_ptr()) } {
            TFLM_OK => Ok(()),
            _ => Err(TensorError),
        }
    }

    fn input_tensor(&mut self) -> InputTensor<'_> {
        let mut kind: tflm::tflm_tensor_type_t = tflm::tflm_tensor_type_t_TFLM_TENSOR_UNSUPPORTED;
        let mut len: usize = 0;
        let data = unsafe { tflm::tflm_bridge_input(self.handle.as_ptr(), &mut kind, &mut len) };
        if data.is_null() {
            return InputTensor::Int8(&mut []);
        }
        // Safety: the tensor lives in the arena we own and is `len` elements
        // of the reported type. The &mut self borrow keeps it exclusive.
        unsafe {
            match kind {
                tflm::tflm_tensor_type_t_TFLM_TENSOR_INT8 => {
                    InputTensor::Int8(core::slice::from_raw_parts_mut(data.cast::<i8>(), len))
                }
                tflm::tflm_tensor_type_t_TFLM_TENSOR_FLOAT32 => {
                    InputTensor::Float32(core::slice::from_raw_parts_mut(data.cast::<f32>(), len))
                }
                _ => InputTensor::Int8(&mut []),
            }
        }
    }

    fn invoke(&mut self) -> Result<(), InvokeError> {
        let start = unsafe { esp_timer_get_time() };
        match unsafe { tflm::tflm_bridge_invoke(self.handle.as_ptr()) } {
            TFLM_OK => {
                let elapsed = unsafe { esp_timer_get_time() } - start;
                self.last_invoke_us = u32::try_from(elapsed).ok();
                Ok(())
            }
            _ => Err(InvokeError),
        }
    }

    fn output_tensor(&self) -> &[f32] {
        let mut len: usize = 0;
        let data = unsafe { tflm::tflm_bridge_output(self.handle.as_ptr(), &mut len) };
        if data.is_null() {
            return &[];
        }
        unsafe { core::slice::from_raw_parts(data, len) }
    }

    fn last_invoke_us(&self) -> Option<u32> {
        self.last_invoke_us
    }
}
