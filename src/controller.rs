/// Detection controller: the trigger → run → notify state machine.
///
/// ```text
///            trigger taken            settle elapsed
///   Idle ───────────────────▶ Armed ─────────────────▶ Running ◀─┐
///    ▲                                                   │  │    │ attempt
///    │          send issued                 run full     │  └────┘ (ok or retry)
///    └──────────────────────── Notifying ◀───────────────┘
/// ```
///
/// The controller never sleeps. Each [`DetectionController::poll`] performs
/// one step and returns a [`Tick`] telling the caller how long to wait before
/// the next one, so the same code runs under a FreeRTOS thread and in tests.
///
/// Capture and inference failures inside a run are retried on the next poll
/// without limit. A run whose collaborators never recover never completes;
/// there is no watchdog here.
use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::config::DetectorConfig;
use crate::defaults::{CATEGORY_LABELS, FRAME_FORMAT, FRAME_LEN, RUN_LENGTH};
use crate::frame::{AcquireError, FrameBuffer, FrameSource};
use crate::inference::{fill_input, read_scores, Engine, InvokeError, Scores};
use crate::peer::PeerRegistry;
use crate::protocol::NotificationPayload;
use crate::radio::{LinkStats, RadioContext, RadioTransport, SendError};
use crate::responder::{DetectionResponder, OutcomeCode, NO_DETECTION};

/// Outcome codes collected during one run.
pub type RunBuffer = Vec<OutcomeCode, RUN_LENGTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Armed,
    Running,
    Notifying,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Armed => "armed",
            ControllerState::Running => "running",
            ControllerState::Notifying => "notifying",
        }
    }
}

/// One classification attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleError {
    Acquire(AcquireError),
    Invoke(InvokeError),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Acquire(e) => write!(f, "image capture failed: {}", e),
            CycleError::Invoke(e) => write!(f, "{}", e),
        }
    }
}

/// Scores and the responder's verdict for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub scores: Scores,
    pub outcome: OutcomeCode,
    /// Inference time, when the engine measures it.
    pub invoke_us: Option<u32>,
}

impl Classification {
    /// Label of the outcome, `None` for [`NO_DETECTION`].
    pub fn label(&self) -> Option<&'static str> {
        CATEGORY_LABELS.get(self.outcome as usize).copied()
    }

    /// Score of the winning category, 0 for [`NO_DETECTION`].
    pub fn score(&self) -> f32 {
        self.scores.get(self.outcome as usize).copied().unwrap_or(0.0)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub seq: u8,
    pub codes: [OutcomeCode; RUN_LENGTH],
    /// Whether the radio accepted the notification. Delivery is reported
    /// separately and never retried.
    pub sent: Result<(), SendError>,
    /// Failed attempts during the run.
    pub retries: u32,
}

/// What the caller should do before polling again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Nothing pending; wait one poll interval.
    Idle,
    /// Trigger consumed; wait this long before the run starts.
    Settle(Duration),
    /// An attempt failed and will be retried; yield briefly.
    Yield,
    /// An attempt succeeded; `idx` is its position in the run. Yield briefly.
    Classified { idx: u8, classification: Classification },
    /// Run finished and the notification was handed to the radio.
    Notified(RunReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub runs_completed: u32,
    pub capture_failures: u32,
    pub inference_failures: u32,
    /// Notifications the radio refused to queue.
    pub sends_rejected: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub stats: ControllerStats,
    pub link: LinkStats,
}

/// Owns the engine, the frame buffer and the radio for the life of the device.
pub struct DetectionController<'a, E, F, D, R> {
    state: ControllerState,
    engine: E,
    frames: F,
    responder: D,
    radio: R,
    registry: PeerRegistry,
    ctx: &'a RadioContext,
    config: DetectorConfig,
    frame: FrameBuffer,
    run: RunBuffer,
    seq: u8,
    run_retries: u32,
    stats: ControllerStats,
    link: LinkStats,
}

impl<'a, E, F, D, R> DetectionController<'a, E, F, D, R>
where
    E: Engine,
    F: FrameSource,
    D: DetectionResponder,
    R: RadioTransport,
{
    pub fn new(
        engine: E,
        frames: F,
        responder: D,
        radio: R,
        registry: PeerRegistry,
        ctx: &'a RadioContext,
        config: DetectorConfig,
    ) -> Self {
        Self {
            state: ControllerState::Idle,
            engine,
            frames,
            responder,
            radio,
            registry,
            ctx,
            config,
            frame: [0; FRAME_LEN],
            run: Vec::new(),
            seq: 0,
            run_retries: 0,
            stats: ControllerStats::default(),
            link: LinkStats::default(),
        }
    }

    /// Advance the state machine by one step.
    pub fn poll(&mut self) -> Tick {
        self.ctx.drain(&mut self.link);

        match self.state {
            ControllerState::Idle => {
                if !self.ctx.trigger().take() {
                    return Tick::Idle;
                }
                log::info!("Trigger taken, starting run {} in {} ms", self.seq, self.config.settle_delay_ms);
                self.state = ControllerState::Armed;
                Tick::Settle(Duration::from_millis(self.config.settle_delay_ms as u64))
            }
            ControllerState::Armed => {
                self.run.clear();
                self.run_retries = 0;
                self.state = ControllerState::Running;
                self.step_run()
            }
            ControllerState::Running => self.step_run(),
            ControllerState::Notifying => Tick::Notified(self.notify()),
        }
    }

    /// Poll until a run is notified or `max_ticks` polls have been made.
    /// Idle ticks count too. Returns `None` if the cap was hit first.
    pub fn run_to_completion(&mut self, max_ticks: usize) -> Option<RunReport> {
        for _ in 0..max_ticks {
            if let Tick::Notified(report) = self.poll() {
                return Some(report);
            }
        }
        None
    }

    /// Capture a fresh frame and classify it outside the run flow.
    /// Leaves the run buffer and state alone.
    pub fn classify_once(&mut self) -> Result<Classification, CycleError> {
        self.frames
            .acquire(&FRAME_FORMAT, &mut self.frame)
            .map_err(CycleError::Acquire)?;
        let c = infer(&mut self.engine, &mut self.responder, &self.frame)?;
        log_scores(&c);
        Ok(c)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Codes of the current run, or of the last completed run while idle.
    pub fn run_buffer(&self) -> &[OutcomeCode] {
        &self.run
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            stats: self.stats,
            link: self.link,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn radio(&self) -> &R {
        &self.radio
    }

    #[cfg(test)]
    pub(crate) fn frames_mut(&mut self) -> &mut F {
        &mut self.frames
    }

    #[cfg(test)]
    pub(crate) fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn step_run(&mut self) -> Tick {
        let attempt = self
            .frames
            .acquire(&FRAME_FORMAT, &mut self.frame)
            .map_err(CycleError::Acquire)
            .and_then(|()| infer(&mut self.engine, &mut self.responder, &self.frame));

        match attempt {
            Ok(classification) => {
                let idx = self.run.len() as u8;
                // Running is only entered with room left.
                let pushed = self.run.push(classification.outcome);
                debug_assert!(pushed.is_ok(), "run buffer overflow");
                if pushed.is_err() || self.run.is_full() {
                    self.state = ControllerState::Notifying;
                }
                Tick::Classified { idx, classification }
            }
            Err(e) => {
                match e {
                    CycleError::Acquire(_) => self.stats.capture_failures += 1,
                    CycleError::Invoke(_) => self.stats.inference_failures += 1,
                }
                self.run_retries += 1;
                log::warn!("Run {} attempt {} failed: {}", self.seq, self.run.len(), e);
                Tick::Yield
            }
        }
    }

    fn notify(&mut self) -> RunReport {
        let mut codes = [NO_DETECTION; RUN_LENGTH];
        for (dst, &code) in codes.iter_mut().zip(self.run.iter()) {
            *dst = code;
        }
        let payload = NotificationPayload { seq: self.seq, codes };

        let sent = if self.registry.is_registered() {
            self.radio.send(&self.registry.peer().addr, &payload.encode())
        } else {
            Err(SendError::NotRegistered)
        };
        match sent {
            Ok(()) => log::info!("Run {} complete, notification queued: {:?}", self.seq, codes),
            Err(e) => {
                self.stats.sends_rejected += 1;
                log::error!("Run {} complete, notification not sent: {}", self.seq, e);
            }
        }

        // Triggers that arrived during the run are dropped.
        self.ctx.trigger().clear();
        self.state = ControllerState::Idle;
        self.stats.runs_completed += 1;

        let report = RunReport {
            seq: self.seq,
            codes,
            sent,
            retries: self.run_retries,
        };
        self.seq = self.seq.wrapping_add(1);
        report
    }
}

/// Normalize `pixels` into the input tensor, invoke, and hand the scores to
/// the responder.
fn infer<E: Engine, D: DetectionResponder>(
    engine: &mut E,
    responder: &mut D,
    pixels: &[u8],
) -> Result<Classification, CycleError> {
    fill_input(engine.input_tensor(), pixels);
    engine.invoke().map_err(CycleError::Invoke)?;
    let scores = read_scores(engine.output_tensor());
    let outcome = responder.respond(&scores, &CATEGORY_LABELS);
    Ok(Classification {
        scores,
        outcome,
        invoke_us: engine.last_invoke_us(),
    })
}

fn log_scores(c: &Classification) {
    for (label, score) in CATEGORY_LABELS.iter().zip(&c.scores) {
        log::info!("Gesture \"{}\": {:.2}%", label, score * 100.0);
    }
    if let Some(us) = c.invoke_us {
        log::info!("Invoke took {} us", us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::PEER;
    use crate::protocol::PAYLOAD_LEN;
    use crate::responder::ArgmaxResponder;
    use crate::testing::{StubEngine, StubFrames, StubRadio};

    type TestController<'a> = DetectionController<'a, StubEngine, StubFrames, ArgmaxResponder, StubRadio>;

    const FAVOR_2: [f32; 4] = [0.05, 0.05, 0.85, 0.05];

    fn config() -> DetectorConfig {
        DetectorConfig {
            settle_delay_ms: 0,
            ..DetectorConfig::new()
        }
    }

    fn controller(ctx: &RadioContext) -> TestController<'_> {
        let mut radio = StubRadio::new();
        let mut registry = PeerRegistry::new(PEER);
        registry.register(&mut radio).unwrap();
        DetectionController::new(
            StubEngine::with_output(&FAVOR_2),
            StubFrames::new(),
            ArgmaxResponder::new(0.5),
            radio,
            registry,
            ctx,
            config(),
        )
    }

    #[test]
    fn idle_without_trigger() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        for _ in 0..10 {
            assert_eq!(c.poll(), Tick::Idle);
        }
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(c.frames_mut().acquired, 0);
    }

    #[test]
    fn trigger_arms_with_settle_delay() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        c.config.settle_delay_ms = 7000;
        ctx.on_receive(&PEER.addr, b"x");

        assert_eq!(c.poll(), Tick::Settle(Duration::from_millis(7000)));
        assert_eq!(c.state(), ControllerState::Armed);
        assert!(!ctx.trigger().is_set());
        assert_eq!(c.status().link.received, 1);
    }

    #[test]
    fn repeated_triggers_before_poll_arm_once() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        for _ in 0..5 {
            ctx.on_receive(&PEER.addr, b"x");
        }

        let report = c.run_to_completion(50).unwrap();
        assert_eq!(report.seq, 0);
        assert_eq!(c.run_to_completion(50), None);
        assert_eq!(c.status().stats.runs_completed, 1);
        assert_eq!(c.radio().sent.len(), 1);
    }

    #[test]
    fn end_to_end_run_notifies_peer_once() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        ctx.on_receive(&PEER.addr, &[1]);

        let report = c.run_to_completion(50).unwrap();

        assert_eq!(c.run_buffer(), &[2, 2, 2, 2, 2]);
        assert_eq!(report.codes, [2; RUN_LENGTH]);
        assert_eq!(report.sent, Ok(()));
        assert_eq!(report.retries, 0);
        assert_eq!(c.state(), ControllerState::Idle);

        let sent = &c.radio().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, PEER.addr);
        assert_eq!(sent[0].1.len(), PAYLOAD_LEN);
        assert_eq!(
            NotificationPayload::decode(&sent[0].1).unwrap(),
            NotificationPayload { seq: 0, codes: [2; RUN_LENGTH] }
        );
    }

    #[test]
    fn run_step_sequence() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        ctx.trigger().assert();

        assert!(matches!(c.poll(), Tick::Settle(_)));
        for i in 0..RUN_LENGTH as u8 {
            match c.poll() {
                Tick::Classified { idx, classification } => {
                    assert_eq!(idx, i);
                    assert_eq!(classification.outcome, 2);
                    assert_eq!(classification.label(), Some("open_palm"));
                }
                other => panic!("unexpected tick {:?}", other),
            }
        }
        assert_eq!(c.state(), ControllerState::Notifying);
        assert!(matches!(c.poll(), Tick::Notified(_)));
        assert_eq!(c.poll(), Tick::Idle);
    }

    #[test]
    fn failed_attempts_do_not_count_toward_run() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        c.frames_mut().fail_next = 3;
        c.engine_mut().fail_next = 4;
        ctx.trigger().assert();

        let report = c.run_to_completion(100).unwrap();

        assert_eq!(report.codes, [2; RUN_LENGTH]);
        assert_eq!(report.retries, 7);
        assert_eq!(c.engine_mut().invokes, RUN_LENGTH as u32);
        let stats = c.status().stats;
        assert_eq!(stats.capture_failures, 3);
        assert_eq!(stats.inference_failures, 4);
        assert_eq!(c.run_buffer().len(), RUN_LENGTH);
    }

    #[test]
    fn persistent_failure_stalls_run() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        c.frames_mut().fail_next = u32::MAX;
        ctx.trigger().assert();

        assert_eq!(c.run_to_completion(1000), None);
        assert_eq!(c.state(), ControllerState::Running);
        assert!(c.run_buffer().is_empty());
        assert!(c.radio().sent.is_empty());

        // Recovers once the camera does.
        c.frames_mut().fail_next = 0;
        let report = c.run_to_completion(10).unwrap();
        assert_eq!(report.codes, [2; RUN_LENGTH]);
    }

    #[test]
    fn trigger_flood_during_run_does_not_overlap() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        ctx.trigger().assert();

        let mut reports = 0;
        for _ in 0..40 {
            ctx.on_receive(&PEER.addr, b"again");
            if let Tick::Notified(report) = c.poll() {
                reports += 1;
                assert_eq!(report.codes.len(), RUN_LENGTH);
                assert_eq!(c.run_buffer().len(), RUN_LENGTH);
                break;
            }
            assert!(c.run_buffer().len() <= RUN_LENGTH);
        }
        assert_eq!(reports, 1);
        // Triggers received mid-run were discarded with the run.
        assert!(!ctx.trigger().is_set());
        assert_eq!(c.poll(), Tick::Idle);
        assert_eq!(c.radio().sent.len(), 1);
    }

    #[test]
    fn next_run_clears_buffer_and_bumps_seq() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);

        ctx.trigger().assert();
        assert_eq!(c.run_to_completion(20).unwrap().seq, 0);

        c.engine_mut().output = std::vec![0.9, 0.05, 0.03, 0.02];
        ctx.trigger().assert();
        assert!(matches!(c.poll(), Tick::Settle(_)));
        assert!(matches!(c.poll(), Tick::Classified { idx: 0, .. }));
        assert_eq!(c.run_buffer(), &[0]);

        let report = c.run_to_completion(20).unwrap();
        assert_eq!(report.seq, 1);
        assert_eq!(report.codes, [0; RUN_LENGTH]);
    }

    #[test]
    fn send_rejection_is_reported_not_retried() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        c.radio.send_result = Err(SendError::Driver(0x3069));
        ctx.trigger().assert();

        let report = c.run_to_completion(20).unwrap();
        assert_eq!(report.sent, Err(SendError::Driver(0x3069)));
        assert_eq!(c.status().stats.sends_rejected, 1);
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(c.run_to_completion(20), None);
    }

    #[test]
    fn unregistered_peer_is_never_sent_to() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = DetectionController::new(
            StubEngine::with_output(&FAVOR_2),
            StubFrames::new(),
            ArgmaxResponder::new(0.5),
            StubRadio::new(),
            PeerRegistry::new(PEER),
            &ctx,
            config(),
        );
        ctx.trigger().assert();

        let report = c.run_to_completion(20).unwrap();
        assert_eq!(report.sent, Err(SendError::NotRegistered));
        assert!(c.radio().sent.is_empty());
    }

    #[test]
    fn delivery_results_are_counted() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        ctx.on_send_complete(&PEER.addr, crate::radio::SendStatus::Fail);
        c.poll();
        assert_eq!(c.status().link.sends_failed, 1);
    }

    #[test]
    fn single_shot_leaves_run_untouched() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);

        let result = c.classify_once().unwrap();
        assert_eq!(result.outcome, 2);
        assert!((result.score() - 0.85).abs() < 1e-6);
        assert!(c.run_buffer().is_empty());
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(c.frames_mut().acquired, 1);

        // And mid-run.
        ctx.trigger().assert();
        c.poll();
        c.poll();
        assert_eq!(c.run_buffer().len(), 1);
        c.classify_once().unwrap();
        assert_eq!(c.run_buffer().len(), 1);
        assert_eq!(c.state(), ControllerState::Running);
    }

    #[test]
    fn single_shot_converts_fresh_frame() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        c.frames_mut().pixel = 200;

        let result = c.classify_once().unwrap();
        assert_eq!(result.outcome, 2);
        assert_eq!(c.engine_mut().input[0], 72);
        assert_eq!(c.engine_mut().input[FRAME_LEN - 1], 72);
        assert_eq!(c.engine_mut().invokes, 1);
        assert!(c.run_buffer().is_empty());
    }

    #[test]
    fn classification_carries_invoke_time() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        assert_eq!(c.classify_once().unwrap().invoke_us, None);

        c.engine_mut().invoke_us = Some(41_250);
        ctx.trigger().assert();
        c.poll();
        match c.poll() {
            Tick::Classified { classification, .. } => {
                assert_eq!(classification.invoke_us, Some(41_250));
            }
            other => panic!("unexpected tick {:?}", other),
        }
    }

    #[test]
    fn single_shot_failure_is_returned() {
        let ctx = RadioContext::new(PEER.addr);
        let mut c = controller(&ctx);
        c.engine_mut().fail_next = 1;
        assert_eq!(c.classify_once(), Err(CycleError::Invoke(InvokeError)));
        assert!(c.classify_once().is_ok());
    }

    #[test]
    fn no_detection_has_no_label() {
        let c = Classification {
            scores: [0.25; 4],
            outcome: NO_DETECTION,
            invoke_us: None,
        };
        assert_eq!(c.label(), None);
        assert_eq!(c.score(), 0.0);
    }
}
