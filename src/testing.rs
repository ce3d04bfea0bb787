//! Stub collaborators for host tests.
//!
//! Every stub can share a [`Probe`] that records calls in order, so startup
//! tests can check both the bring-up sequence and where it stopped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;

use crate::defaults::FRAME_LEN;
use crate::frame::{AcquireError, FrameFormat, FrameSource};
use crate::inference::{
    AllocError, BuildError, Engine, InferenceBackend, InputTensor, InvokeError, TensorError,
};
use crate::model::{Model, OpResolver};
use crate::peer::{MacAddress, Peer, RegistrationError};
use crate::radio::{InitError, RadioTransport, SendError};

pub(crate) type Probe = Rc<RefCell<Vec<&'static str>>>;

fn record(probe: &Option<Probe>, call: &'static str) {
    if let Some(p) = probe {
        p.borrow_mut().push(call);
    }
}

// ── Radio ──────────────────────────────────────────────────────────────

pub(crate) struct StubRadio {
    pub probe: Option<Probe>,
    pub init_result: Result<(), InitError>,
    pub add_peer_result: Result<(), RegistrationError>,
    pub send_result: Result<(), SendError>,
    pub peers: Vec<Peer>,
    pub sent: Vec<(MacAddress, Vec<u8>)>,
}

impl StubRadio {
    pub fn new() -> Self {
        Self {
            probe: None,
            init_result: Ok(()),
            add_peer_result: Ok(()),
            send_result: Ok(()),
            peers: Vec::new(),
            sent: Vec::new(),
        }
    }
}

impl RadioTransport for StubRadio {
    fn init(&mut self) -> Result<(), InitError> {
        record(&self.probe, "radio.init");
        self.init_result
    }

    fn add_peer(&mut self, peer: &Peer) -> Result<(), RegistrationError> {
        record(&self.probe, "radio.add_peer");
        self.add_peer_result?;
        self.peers.push(*peer);
        Ok(())
    }

    fn send(&mut self, dst: &MacAddress, payload: &[u8]) -> Result<(), SendError> {
        record(&self.probe, "radio.send");
        self.send_result?;
        self.sent.push((*dst, payload.to_vec()));
        Ok(())
    }
}

// ── Frames ─────────────────────────────────────────────────────────────

pub(crate) struct StubFrames {
    pub probe: Option<Probe>,
    pub init_result: Result<(), AcquireError>,
    /// Fail this many upcoming acquisitions.
    pub fail_next: u32,
    pub acquired: u32,
    pub pixel: u8,
}

impl StubFrames {
    pub fn new() -> Self {
        Self {
            probe: None,
            init_result: Ok(()),
            fail_next: 0,
            acquired: 0,
            pixel: 128,
        }
    }
}

impl FrameSource for StubFrames {
    fn init(&mut self) -> Result<(), AcquireError> {
        record(&self.probe, "frames.init");
        self.init_result
    }

    fn acquire(&mut self, format: &FrameFormat, out: &mut [u8]) -> Result<(), AcquireError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(AcquireError::Timeout);
        }
        assert_eq!(out.len(), format.len());
        out.fill(self.pixel);
        self.acquired += 1;
        Ok(())
    }
}

// ── Inference ──────────────────────────────────────────────────────────

pub(crate) struct StubEngine {
    pub probe: Option<Probe>,
    pub allocate_result: Result<(), TensorError>,
    pub input: Vec<i8>,
    pub output: Vec<f32>,
    /// Fail this many upcoming invocations.
    pub fail_next: u32,
    pub invokes: u32,
    /// Reported as the invoke time of every successful call.
    pub invoke_us: Option<u32>,
}

impl StubEngine {
    pub fn with_output(output: &[f32]) -> Self {
        Self {
            probe: None,
            allocate_result: Ok(()),
            input: std::vec![0; FRAME_LEN],
            output: output.to_vec(),
            fail_next: 0,
            invokes: 0,
            invoke_us: None,
        }
    }
}

impl Engine for StubEngine {
    fn allocate_tensors(&mut self) -> Result<(), TensorError> {
        record(&self.probe, "engine.allocate_tensors");
        self.allocate_result
    }

    fn input_tensor(&mut self) -> InputTensor<'_> {
        InputTensor::Int8(&mut self.input)
    }

    fn invoke(&mut self) -> Result<(), InvokeError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(InvokeError);
        }
        self.invokes += 1;
        Ok(())
    }

    fn output_tensor(&self) -> &[f32] {
        &self.output
    }

    fn last_invoke_us(&self) -> Option<u32> {
        self.invoke_us
    }
}

pub(crate) struct StubArena {
    pub size: usize,
}

pub(crate) struct StubBackend {
    pub probe: Option<Probe>,
    pub arena_result: Result<(), AllocError>,
    pub build_result: Result<(), BuildError>,
    pub engine: Option<StubEngine>,
    /// Op mask the engine was built with. Shared so tests can read it after
    /// the backend has been consumed.
    pub built_ops: Rc<Cell<Option<u32>>>,
}

impl StubBackend {
    pub fn new(engine: StubEngine) -> Self {
        Self {
            probe: None,
            arena_result: Ok(()),
            build_result: Ok(()),
            engine: Some(engine),
            built_ops: Rc::default(),
        }
    }
}

impl InferenceBackend for StubBackend {
    type Arena = StubArena;
    type Engine = StubEngine;

    fn allocate_arena(&mut self, size: usize) -> Result<StubArena, AllocError> {
        record(&self.probe, "backend.allocate_arena");
        self.arena_result?;
        Ok(StubArena { size })
    }

    fn build<const N: usize>(
        &mut self,
        _model: Model<'static>,
        ops: &OpResolver<N>,
        arena: StubArena,
    ) -> Result<StubEngine, BuildError> {
        record(&self.probe, "backend.build");
        assert!(arena.size > 0);
        self.built_ops.set(Some(ops.mask()));
        self.build_result?;
        self.engine.take().ok_or(BuildError::Interpreter(-1))
    }
}
