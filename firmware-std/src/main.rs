//! gesturecam ESP-IDF std firmware
//!
//! FreeRTOS threads and std::sync::mpsc channels around the library's
//! detection controller. The main thread brings the device up and then runs
//! the detection loop forever; serial commands, NDJSON output, the status
//! LED and the optional auto-trigger live on their own threads.

#[cfg(not(any(feature = "xiao", feature = "esp32cam")))]
compile_error!("select a board feature: `xiao` or `esp32cam`");

mod camera;
mod espnow;
mod indicator;
mod tflm;

use std::io::Read;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::OutputPin;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{esp_get_free_heap_size, heap_caps_get_total_size, MALLOC_CAP_SPIRAM};

use gesturecam::comm::{self, LineReader};
use gesturecam::config::DetectorConfig;
use gesturecam::controller::{DetectionController, Tick};
use gesturecam::protocol::{DeviceMessage, HostCommand, MsgBuffer, VERSION};
use gesturecam::radio::RadioContext;
use gesturecam::responder::ArgmaxResponder;
use gesturecam::startup::{bring_up, Collaborators};
use gesturecam::{board, defaults};

use camera::CameraFrames;
use espnow::EspNowRadio;
use indicator::Signal;
use tflm::{TflmBackend, TflmEngine};

/// Model flatbuffer, baked in at build time.
static MODEL: &[u8] = include_bytes!(env!("GESTURECAM_MODEL_PATH"));

const CONFIG: DetectorConfig = DetectorConfig::new();

/// Shared with the ESP-NOW callbacks for the life of the device.
static RADIO: RadioContext = RadioContext::new(CONFIG.peer.addr);

/// Wait between polls while idle.
const IDLE_POLL: Duration = Duration::from_millis(50);
/// Wait between attempts inside a run.
const RUN_YIELD: Duration = Duration::from_millis(10);
/// Unprompted status report interval.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

type Controller = DetectionController<'static, TflmEngine, CameraFrames, ArgmaxResponder, EspNowRadio>;

/// Boot time, captured once in main, used for uptime calculation.
static BOOT_INSTANT: Mutex<Option<Instant>> = Mutex::new(None);

fn uptime_secs() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| boot.elapsed().as_secs() as u32))
        .unwrap_or(0)
}

fn uptime_millis_u32() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| (boot.elapsed().as_millis() & 0xFFFF_FFFF) as u32))
        .unwrap_or(0)
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();

    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Ok(mut boot) = BOOT_INSTANT.lock() {
        *boot = Some(Instant::now());
    }

    log::info!("gesturecam v{} starting on {} (std)", VERSION, board::BOARD_NAME);
    log::info!(
        "Run of {} frames, {} categories, settle {} ms",
        defaults::RUN_LENGTH,
        defaults::CATEGORY_COUNT,
        CONFIG.settle_delay_ms,
    );

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── Channels ─────────────────────────────────────────────────────

    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);
    let (cmd_tx, cmd_rx) = mpsc::sync_channel::<HostCommand>(4);
    let (signal_tx, signal_rx) = mpsc::sync_channel::<Signal>(4);

    // ── Indicator thread ─────────────────────────────────────────────

    #[cfg(feature = "xiao")]
    let led_pin = peripherals.pins.gpio21.downgrade_output();
    #[cfg(all(feature = "esp32cam", not(feature = "xiao")))]
    let led_pin = peripherals.pins.gpio33.downgrade_output();
    thread::Builder::new()
        .name("indicator".into())
        .stack_size(2048)
        .spawn(move || {
            indicator::indicator_thread(signal_rx, led_pin);
        })?;
    log::info!("Indicator thread spawned");

    // ── Output thread ────────────────────────────────────────────────

    thread::Builder::new()
        .name("output".into())
        .stack_size(4096)
        .spawn(move || {
            output_thread(output_rx);
        })?;
    log::info!("Output thread spawned");

    // ── Command thread ───────────────────────────────────────────────

    thread::Builder::new()
        .name("command".into())
        .stack_size(4096)
        .spawn(move || {
            command_thread(cmd_tx);
        })?;
    log::info!("Command thread spawned");

    // ── Auto-trigger thread ──────────────────────────────────────────

    if let Some(secs) = CONFIG.auto_trigger_secs {
        thread::Builder::new()
            .name("autotrig".into())
            .stack_size(2048)
            .spawn(move || loop {
                thread::sleep(Duration::from_secs(secs as u64));
                log::info!("Auto-trigger");
                RADIO.trigger().assert();
            })?;
        log::info!("Auto-trigger every {} s", secs);
    }

    // ── Bring-up ─────────────────────────────────────────────────────

    let parts = Collaborators {
        backend: TflmBackend,
        radio: EspNowRadio::new(peripherals.modem, sys_loop, nvs, &RADIO),
        frames: CameraFrames::new(board::CAMERA_PINS),
        responder: ArgmaxResponder::new(CONFIG.min_confidence),
    };
    let psram = unsafe { heap_caps_get_total_size(MALLOC_CAP_SPIRAM) };

    match bring_up(parts, psram, MODEL, &RADIO, CONFIG) {
        Ok(controller) => {
            log::info!("Waiting for trigger");
            detection_loop(controller, cmd_rx, output_tx, signal_tx)
        }
        Err(_) => {
            // bring_up has already logged the cause.
            let _ = signal_tx.try_send(Signal::Fault);
            loop {
                thread::sleep(Duration::from_secs(3600));
            }
        }
    }
}

// ── Detection loop ───────────────────────────────────────────────────

fn detection_loop(
    mut controller: Controller,
    cmd_rx: Receiver<HostCommand>,
    output_tx: SyncSender<MsgBuffer>,
    signal_tx: SyncSender<Signal>,
) -> ! {
    let mut resume_at = Instant::now();
    let mut last_status = Instant::now();

    loop {
        // Serve commands while waiting for the next poll.
        match cmd_rx.recv_timeout(resume_at.saturating_duration_since(Instant::now())) {
            Ok(cmd) => {
                handle_command(cmd, &mut controller, &output_tx);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(resume_at.saturating_duration_since(Instant::now()));
            }
        }

        let wait = match controller.poll() {
            Tick::Idle => IDLE_POLL,
            Tick::Settle(delay) => {
                let _ = signal_tx.try_send(Signal::Armed);
                delay
            }
            Tick::Yield => RUN_YIELD,
            Tick::Classified { idx, classification } => {
                let _ = signal_tx.try_send(Signal::Captured);
                emit(
                    &output_tx,
                    &DeviceMessage::Detection {
                        idx,
                        code: classification.outcome,
                        label: classification.label(),
                        score: classification.score(),
                        us: classification.invoke_us,
                        ts: uptime_millis_u32(),
                    },
                );
                RUN_YIELD
            }
            Tick::Notified(report) => {
                let _ = signal_tx.try_send(Signal::Notified {
                    sent: report.sent.is_ok(),
                });
                emit(
                    &output_tx,
                    &DeviceMessage::Run {
                        seq: report.seq,
                        codes: &report.codes,
                        sent: report.sent.is_ok(),
                        retries: report.retries,
                        ts: uptime_millis_u32(),
                    },
                );
                IDLE_POLL
            }
        };
        resume_at = Instant::now() + wait;

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            emit_status(&controller, &output_tx);
        }
    }
}

fn handle_command(cmd: HostCommand, controller: &mut Controller, output_tx: &SyncSender<MsgBuffer>) {
    match cmd {
        HostCommand::Trigger => {
            log::info!("Trigger from serial");
            RADIO.trigger().assert();
        }
        HostCommand::Classify => match controller.classify_once() {
            Ok(c) => emit(
                output_tx,
                &DeviceMessage::Classify {
                    code: c.outcome,
                    label: c.label(),
                    scores: &c.scores,
                    us: c.invoke_us,
                    ts: uptime_millis_u32(),
                },
            ),
            Err(e) => log::warn!("Classification failed: {}", e),
        },
        HostCommand::GetStatus => emit_status(controller, output_tx),
    }
}

fn emit_status(controller: &Controller, output_tx: &SyncSender<MsgBuffer>) {
    let status = controller.status();
    let heap_free = unsafe { esp_get_free_heap_size() };
    emit(
        output_tx,
        &DeviceMessage::Status {
            state: status.state.as_str(),
            runs: status.stats.runs_completed,
            capture_failures: status.stats.capture_failures,
            inference_failures: status.stats.inference_failures,
            sends_ok: status.link.sends_ok,
            sends_failed: status.link.sends_failed,
            uptime: uptime_secs(),
            heap_free,
            board: board::BOARD_NAME,
            version: VERSION,
        },
    );
}

fn emit(output_tx: &SyncSender<MsgBuffer>, msg: &DeviceMessage) {
    if let Some(buf) = comm::encode_message(msg) {
        let _ = output_tx.try_send(buf);
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: Receiver<MsgBuffer>) {
    log::info!("Output thread started");

    while let Ok(msg) = output_rx.recv() {
        if let Ok(s) = std::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

// ── Command thread ───────────────────────────────────────────────────

fn command_thread(cmd_tx: SyncSender<HostCommand>) {
    let mut reader = LineReader::new();
    let mut stdin = std::io::stdin();
    let mut buf = [0u8; 32];

    loop {
        match stdin.read(&mut buf) {
            Ok(n) if n > 0 => {
                for &byte in &buf[..n] {
                    if let Some(line) = reader.feed(byte) {
                        match comm::parse_command(line) {
                            Some(cmd) => {
                                let _ = cmd_tx.try_send(cmd);
                            }
                            None => log::warn!("Ignoring unknown command"),
                        }
                    }
                }
            }
            // Console has nothing buffered.
            _ => thread::sleep(Duration::from_millis(20)),
        }
    }
}
